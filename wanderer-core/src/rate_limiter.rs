//! Per-upstream token buckets. Refill is computed lazily from the elapsed
//! time since the last acquire rather than via a background ticker, so the
//! bucket never drifts while idle.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Upstream {
    Esi,
    Zkb,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A single token bucket: `capacity` tokens, refilled at `refill_rate`
/// tokens/sec, never exceeding `capacity`.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: u32) -> Self {
        Self {
            capacity: capacity as f64,
            refill_rate: refill_rate as f64,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_locked(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
            state.last_refill = now;
        }
    }

    /// Returns `Some(wait)` if the caller must wait `wait` before a token is
    /// available, or `None` if a token was taken immediately.
    fn try_acquire(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut state = self.state.lock();
        self.refill_locked(&mut state, now);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_rate))
        }
    }

    /// Consume one token, sleeping if none are currently available.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                None => return,
                Some(wait) => sleep(wait).await,
            }
        }
    }
}

/// Holds one token bucket per upstream. A process-wide singleton, shared via
/// `Arc` from `AppState`.
#[derive(Debug)]
pub struct RateLimiter {
    esi: TokenBucket,
    zkb: TokenBucket,
}

impl RateLimiter {
    pub fn new(esi_capacity: u32, esi_refill: u32, zkb_capacity: u32, zkb_refill: u32) -> Self {
        Self {
            esi: TokenBucket::new(esi_capacity, esi_refill),
            zkb: TokenBucket::new(zkb_capacity, zkb_refill),
        }
    }

    pub async fn acquire(&self, upstream: Upstream) {
        match upstream {
            Upstream::Esi => self.esi.acquire().await,
            Upstream::Zkb => self.zkb.acquire().await,
        }
    }
}
