//! TTL-keyed cache over ESI reference records (character/corporation/
//! alliance/type/group), with at-most-one-in-flight-upstream-call-per-key
//! coalescing so a burst of enrichment lookups for the same id only hits
//! ESI once (§4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Notify;
use tracing::debug;

use crate::config::UpstreamSection;
use crate::error::{CoreError, UpstreamError};
use crate::http_fetcher::{HttpFetcher, RetryPolicy};
use crate::models::{ReferenceKind, ReferenceRecord};
use crate::rate_limiter::{RateLimiter, Upstream};

/// Abstraction over "go fetch this record from ESI", so the cache can be
/// unit tested without a network.
#[async_trait]
pub trait EsiClient: Send + Sync {
    async fn fetch(&self, kind: ReferenceKind, id: i64) -> Result<Option<ReferenceRecord>, CoreError>;
}

pub struct HttpEsiClient {
    fetcher: HttpFetcher,
    limiter: Arc<RateLimiter>,
    config: UpstreamSection,
}

impl HttpEsiClient {
    pub fn new(fetcher: HttpFetcher, limiter: Arc<RateLimiter>, config: UpstreamSection) -> Self {
        Self {
            fetcher,
            limiter,
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EsiEntity {
    name: Option<String>,
    corporation_id: Option<i64>,
    alliance_id: Option<i64>,
    group_id: Option<i64>,
}

#[async_trait]
impl EsiClient for HttpEsiClient {
    async fn fetch(&self, kind: ReferenceKind, id: i64) -> Result<Option<ReferenceRecord>, CoreError> {
        let url = format!("{}{}", self.config.base_url, kind.esi_path(id));
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            base: self.config.retry_base,
            factor: self.config.retry_factor,
            max: self.config.retry_max,
        };
        match self.fetcher.get(&url, &self.limiter, Upstream::Esi, policy).await {
            Ok(body) => {
                let entity: EsiEntity = serde_json::from_str(&body)
                    .map_err(|e| CoreError::Upstream(UpstreamError::Esi(e.to_string())))?;
                Ok(Some(ReferenceRecord {
                    id,
                    name: entity.name,
                    corporation_id: entity.corporation_id,
                    alliance_id: entity.alliance_id,
                    group_id: entity.group_id,
                }))
            }
            Err(e) if !e.is_retryable() && matches!(e, crate::error::HttpError::HttpStatus(404)) => {
                Ok(None)
            }
            Err(e) => Err(CoreError::Upstream(UpstreamError::Esi(e.to_string()))),
        }
    }
}

#[derive(Clone)]
enum Slot {
    Ready { value: Option<ReferenceRecord>, expires_at: Instant },
    InFlight(Arc<Notify>),
}

pub struct ReferenceCache {
    entries: DashMap<(ReferenceKind, i64), Slot>,
    client: Arc<dyn EsiClient>,
    live_ttl: Duration,
    ship_type_ttl: Duration,
    negative_ttl: Duration,
}

impl ReferenceCache {
    pub fn new(
        client: Arc<dyn EsiClient>,
        live_ttl: Duration,
        ship_type_ttl: Duration,
        negative_ttl: Duration,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            client,
            live_ttl,
            ship_type_ttl,
            negative_ttl,
        }
    }

    fn ttl_for(&self, kind: ReferenceKind) -> Duration {
        match kind {
            ReferenceKind::Type | ReferenceKind::Group => self.ship_type_ttl,
            _ => self.live_ttl,
        }
    }

    /// Pre-populate a type/group entry from a ship-type CSV warm-up row.
    /// Never overwrites a fresher entry already present.
    pub fn warm_up(&self, kind: ReferenceKind, id: i64, record: ReferenceRecord) {
        let key = (kind, id);
        if self.entries.contains_key(&key) {
            return;
        }
        self.entries.insert(
            key,
            Slot::Ready {
                value: Some(record),
                expires_at: Instant::now() + self.ship_type_ttl,
            },
        );
    }

    pub async fn get(&self, kind: ReferenceKind, id: i64) -> Result<Option<ReferenceRecord>, CoreError> {
        let key = (kind, id);
        loop {
            match self.entries.get(&key).map(|e| e.clone()) {
                Some(Slot::Ready { value, expires_at }) if expires_at > Instant::now() => {
                    return Ok(value);
                }
                Some(Slot::InFlight(notify)) => {
                    // Build the `Notified` future before re-checking the slot.
                    // It captures the notifier's current generation at
                    // construction, so a `notify_waiters()` that lands in the
                    // gap between the read above and here still wakes this
                    // waiter instead of being missed permanently.
                    let notified = notify.notified();
                    if let Some(Slot::Ready { value, expires_at }) = self.entries.get(&key).map(|e| e.clone()) {
                        if expires_at > Instant::now() {
                            return Ok(value);
                        }
                    }
                    notified.await;
                    continue;
                }
                _ => {}
            }

            // Claim the slot for our fetch, unless someone beat us to it.
            let my_notify = Arc::new(Notify::new());
            let mut claimed = true;
            self.entries
                .entry(key)
                .and_modify(|slot| {
                    if matches!(slot, Slot::Ready { expires_at, .. } if *expires_at > Instant::now()) {
                        claimed = false;
                    } else if matches!(slot, Slot::InFlight(_)) {
                        claimed = false;
                    } else {
                        *slot = Slot::InFlight(my_notify.clone());
                    }
                })
                .or_insert_with(|| Slot::InFlight(my_notify.clone()));

            if !claimed {
                continue;
            }

            debug!(?kind, id, "reference cache miss, fetching from ESI");
            let result = self.client.fetch(kind, id).await;
            let ttl = match &result {
                Ok(None) => self.negative_ttl,
                _ => self.ttl_for(kind),
            };
            let value = result.clone().unwrap_or(None);
            self.entries.insert(
                key,
                Slot::Ready {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
            my_notify.notify_waiters();
            return result;
        }
    }
}

/// Minimal CSV row shape for the optional ship-type warm-up (§4.3).
#[derive(Debug, Deserialize)]
pub struct ShipTypeCsvRow {
    pub type_id: i64,
    pub group_id: i64,
    pub name: String,
}

/// Parses CSV text into `(type_id -> ReferenceRecord)` and `(group_id ->
/// ReferenceRecord)` pairs ready for [`ReferenceCache::warm_up`]. Never the
/// source of truth: a stale or missing row simply means the next lookup
/// falls through to ESI.
pub fn parse_ship_type_csv(csv_text: &str) -> HashMap<i64, ReferenceRecord> {
    let mut out = HashMap::new();
    let mut reader = csv_reader(csv_text);
    for line in reader.drain(..) {
        out.insert(
            line.type_id,
            ReferenceRecord {
                id: line.type_id,
                name: Some(line.name),
                corporation_id: None,
                alliance_id: None,
                group_id: Some(line.group_id),
            },
        );
    }
    out
}

fn csv_reader(text: &str) -> Vec<ShipTypeCsvRow> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if i == 0 || line.trim().is_empty() {
            continue; // header
        }
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 3 {
            continue;
        }
        if let (Ok(type_id), Ok(group_id)) = (parts[0].trim().parse(), parts[1].trim().parse()) {
            rows.push(ShipTypeCsvRow {
                type_id,
                group_id,
                name: parts[2].trim().to_string(),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClient {
        calls: AtomicUsize,
        record: ReferenceRecord,
    }

    #[async_trait]
    impl EsiClient for CountingClient {
        async fn fetch(&self, _kind: ReferenceKind, _id: i64) -> Result<Option<ReferenceRecord>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Some(self.record.clone()))
        }
    }

    #[tokio::test]
    async fn coalesces_concurrent_lookups_for_same_key() {
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
            record: ReferenceRecord {
                id: 100,
                name: Some("Test".into()),
                corporation_id: None,
                alliance_id: None,
                group_id: None,
            },
        });
        let cache = Arc::new(ReferenceCache::new(
            client.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.get(ReferenceKind::Character, 100).await.unwrap()
            }));
        }
        for h in handles {
            let result = h.await.unwrap();
            assert_eq!(result.unwrap().id, 100);
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parses_ship_type_csv_rows() {
        let csv = "type_id,group_id,name\n587,419,Rifter\n";
        let records = parse_ship_type_csv(csv);
        assert_eq!(records.len(), 1);
        assert_eq!(records[&587].name.as_deref(), Some("Rifter"));
    }
}
