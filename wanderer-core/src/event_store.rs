//! The per-system event log: monotonic event ids, per-client offsets, and
//! garbage collection (§4.6). Every operation here is infallible by
//! contract — an internal invariant violation is a programmer error and
//! panics rather than returning `Result`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::broker::Broker;
use crate::models::{Event, Killmail};

#[derive(Default)]
struct Inner {
    /// `event_id -> (system_id, killmail)`, insertion-ordered by key.
    events: BTreeMap<u64, (i64, Killmail)>,
    /// `killmail_id -> event_id`, used for the idempotence check.
    killmail_ids: HashMap<i64, u64>,
    /// `system_id -> killmail_ids observed`, newest first. Bounded by
    /// `max_events_per_system` and pruned on GC — not a kill count.
    system_kills: HashMap<i64, Vec<i64>>,
    /// `system_id -> total non-duplicate kills ever seen`. Monotonic: never
    /// shrinks on cap eviction or GC, unlike `system_kills`'s length.
    system_counts: HashMap<i64, u64>,
    /// `client_id -> (system_id -> last-delivered event_id)`.
    client_offsets: HashMap<String, HashMap<i64, u64>>,
    /// `system_id -> wall-clock instant last fetched from zKB`.
    fetch_timestamps: HashMap<i64, Instant>,
}

/// Concurrent-safe per-system event log. Cheap to clone (wraps `Arc`-like
/// sharing via an internal mutex plus an atomic counter); share one instance
/// via `Arc<EventStore>` across the process.
pub struct EventStore {
    inner: Mutex<Inner>,
    event_counter: AtomicU64,
    max_events_per_system: usize,
    broker: Arc<Broker>,
}

impl EventStore {
    pub fn new(broker: Broker, max_events_per_system: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            event_counter: AtomicU64::new(0),
            max_events_per_system,
            broker: Arc::new(broker),
        }
    }

    /// Assigns the next event id and stores the killmail under `system_id`.
    /// Idempotent by `killmail_id`: re-inserting the same killmail is a
    /// no-op that returns the original event id without re-publishing.
    pub fn insert(&self, system_id: i64, killmail: Killmail) -> u64 {
        let killmail_id = killmail.killmail_id;
        let mut inner = self.inner.lock();

        if let Some(&existing) = inner.killmail_ids.get(&killmail_id) {
            return existing;
        }

        // event_id assignment and the `events` insertion happen under the
        // same critical section as the dedupe check, so they appear atomic
        // to any observer racing a second insert of the same killmail.
        let event_id = self.event_counter.fetch_add(1, Ordering::SeqCst) + 1;
        inner.killmail_ids.insert(killmail_id, event_id);
        inner
            .system_kills
            .entry(system_id)
            .or_default()
            .insert(0, killmail_id);
        *inner.system_counts.entry(system_id).or_insert(0) += 1;
        inner.events.insert(event_id, (system_id, killmail.clone()));

        if inner.system_kills[&system_id].len() > self.max_events_per_system {
            if let Some(evicted) = inner.system_kills.get_mut(&system_id).and_then(Vec::pop) {
                debug!(system_id, evicted, "evicted oldest killmail id over cap");
            }
        }

        drop(inner);
        self.broker.publish(system_id, killmail);
        event_id
    }

    /// Shared fan-out broker backing this store's publishes. WebSocket
    /// sessions subscribe to it directly for system-topic delivery.
    pub fn broker(&self) -> Arc<Broker> {
        self.broker.clone()
    }

    /// All currently stored killmails for a system, newest first.
    pub fn list_by_system(&self, system_id: i64) -> Vec<Killmail> {
        let inner = self.inner.lock();
        let Some(ids) = inner.system_kills.get(&system_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| {
                let event_id = inner.killmail_ids.get(id)?;
                inner.events.get(event_id).map(|(_, km)| km.clone())
            })
            .collect()
    }

    pub fn kill_count(&self, system_id: i64) -> u64 {
        let inner = self.inner.lock();
        inner.system_counts.get(&system_id).copied().unwrap_or(0)
    }

    pub fn get_killmail(&self, killmail_id: i64) -> Option<Killmail> {
        let inner = self.inner.lock();
        let event_id = inner.killmail_ids.get(&killmail_id)?;
        inner.events.get(event_id).map(|(_, km)| km.clone())
    }

    /// Returns every event with `event_id > offset[sys]` for each requested
    /// system, ascending by event id, and commits the advanced offsets.
    /// Offsets only ever advance; a repeated call with no new events
    /// returns an empty list and leaves offsets untouched.
    pub fn fetch_for_client(&self, client_id: &str, system_ids: &[i64]) -> Vec<Event> {
        if system_ids.is_empty() {
            return Vec::new();
        }
        let mut inner = self.inner.lock();
        let mut results = Vec::new();
        let mut advances: HashMap<i64, u64> = HashMap::new();

        for &system_id in system_ids {
            let offset = inner
                .client_offsets
                .get(client_id)
                .and_then(|m| m.get(&system_id))
                .copied()
                .unwrap_or(0);

            let mut max_seen = offset;
            for (&event_id, (sys, killmail)) in inner.events.range((offset + 1)..) {
                if *sys != system_id {
                    continue;
                }
                results.push(Event {
                    event_id,
                    system_id,
                    killmail: killmail.clone(),
                });
                max_seen = max_seen.max(event_id);
            }
            if max_seen > offset {
                advances.insert(system_id, max_seen);
            }
        }

        results.sort_by_key(|e| e.event_id);

        let offsets = inner.client_offsets.entry(client_id.to_string()).or_default();
        for (system_id, new_offset) in advances {
            offsets.insert(system_id, new_offset);
        }

        results
    }

    /// Same semantics as `fetch_for_client` but returns only the
    /// smallest-event_id match and advances only that system's offset.
    pub fn fetch_one(&self, client_id: &str, system_ids: &[i64]) -> Option<Event> {
        if system_ids.is_empty() {
            return None;
        }
        let mut inner = self.inner.lock();
        let system_id_set: HashSet<i64> = system_ids.iter().copied().collect();

        let mut best: Option<(u64, i64, Killmail)> = None;
        for &system_id in system_ids {
            let offset = inner
                .client_offsets
                .get(client_id)
                .and_then(|m| m.get(&system_id))
                .copied()
                .unwrap_or(0);
            if let Some((&event_id, (sys, killmail))) = inner
                .events
                .range((offset + 1)..)
                .find(|(_, (sys, _))| system_id_set.contains(sys) && *sys == system_id)
            {
                if best.as_ref().map(|(id, ..)| event_id < *id).unwrap_or(true) {
                    best = Some((event_id, *sys, killmail.clone()));
                }
            }
        }

        let (event_id, system_id, killmail) = best?;
        let offsets = inner.client_offsets.entry(client_id.to_string()).or_default();
        offsets.insert(system_id, event_id);
        Some(Event {
            event_id,
            system_id,
            killmail,
        })
    }

    pub fn set_fetch_timestamp(&self, system_id: i64, at: Instant) {
        self.inner.lock().fetch_timestamps.insert(system_id, at);
    }

    pub fn get_fetch_timestamp(&self, system_id: i64) -> Option<Instant> {
        self.inner.lock().fetch_timestamps.get(&system_id).copied()
    }

    pub fn recently_fetched(&self, system_id: i64, threshold: std::time::Duration) -> bool {
        match self.get_fetch_timestamp(system_id) {
            Some(last) => last.elapsed() < threshold,
            None => false,
        }
    }

    /// Deletes events at or below the minimum offset across all known
    /// clients (or everything gated by no deletion if there are no
    /// clients), then enforces the per-system cap.
    pub fn garbage_collect(&self) {
        let mut inner = self.inner.lock();

        let min_offset = if inner.client_offsets.is_empty() {
            None
        } else {
            inner
                .client_offsets
                .values()
                .flat_map(|systems| systems.values().copied())
                .min()
                .or(Some(0))
        };

        if let Some(min_offset) = min_offset {
            if min_offset > 0 {
                let to_remove: Vec<u64> = inner
                    .events
                    .range(..=min_offset)
                    .map(|(id, _)| *id)
                    .collect();
                for event_id in to_remove {
                    inner.events.remove(&event_id);
                }
            }
        }

        // Reconcile killmail_ids / system_kills against what's left in
        // `events` so nothing references a garbage-collected event.
        let live_killmail_ids: HashSet<i64> = inner
            .events
            .values()
            .map(|(_, killmail)| killmail.killmail_id)
            .collect();
        inner.killmail_ids.retain(|id, _| live_killmail_ids.contains(id));
        for kills in inner.system_kills.values_mut() {
            kills.retain(|id| live_killmail_ids.contains(id));
        }

        let max = self.max_events_per_system;
        for kills in inner.system_kills.values_mut() {
            while kills.len() > max {
                kills.pop();
            }
        }

        info!(
            events_remaining = inner.events.len(),
            "event store garbage collection complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Killmail, Victim, ZkbMeta};

    fn sample_killmail(id: i64, system_id: i64) -> Killmail {
        Killmail {
            killmail_id: id,
            solar_system_id: system_id,
            kill_time: chrono::Utc::now(),
            victim: Victim::default(),
            attackers: Vec::new(),
            zkb: ZkbMeta {
                hash: "abc".into(),
                ..Default::default()
            },
            attacker_count: 0,
        }
    }

    fn store() -> EventStore {
        EventStore::new(Broker::new(), 10_000)
    }

    #[test]
    fn monotonic_event_ids() {
        let store = store();
        let a = store.insert(30000142, sample_killmail(1, 30000142));
        let b = store.insert(30000142, sample_killmail(2, 30000142));
        assert!(a < b);
    }

    #[test]
    fn insert_is_idempotent_by_killmail_id() {
        let store = store();
        let first = store.insert(30000142, sample_killmail(1001, 30000142));
        let second = store.insert(30000142, sample_killmail(1001, 30000142));
        assert_eq!(first, second);
        assert_eq!(store.list_by_system(30000142).len(), 1);
    }

    #[test]
    fn s1_insert_and_fetch() {
        let store = store();
        let event_id = store.insert(30000142, sample_killmail(1001, 30000142));
        assert_eq!(event_id, 1);

        let events = store.fetch_for_client("c1", &[30000142]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, 1);
        assert_eq!(events[0].system_id, 30000142);
        assert_eq!(events[0].killmail.killmail_id, 1001);

        let empty = store.fetch_for_client("c1", &[30000142]);
        assert!(empty.is_empty());
    }

    #[test]
    fn s2_two_systems_selective_fetch() {
        let store = store();
        store.insert(30000142, sample_killmail(2001, 30000142));
        store.insert(30000144, sample_killmail(2002, 30000144));

        let first = store.fetch_for_client("c2", &[30000144]);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].killmail.killmail_id, 2002);

        let second = store.fetch_for_client("c2", &[30000142, 30000144]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].killmail.killmail_id, 2001);
    }

    #[test]
    fn s4_gc_bounds() {
        let store = store();
        for i in 1..=200 {
            store.insert(30000142, sample_killmail(i, 30000142));
        }
        // c3 has fetched through event 50 and is the only client.
        let mut offsets = HashMap::new();
        offsets.insert(30000142, 50u64);
        store.inner.lock().client_offsets.insert("c3".to_string(), offsets);

        store.garbage_collect();

        let inner = store.inner.lock();
        assert!(inner.events.keys().all(|&id| id > 50));
        assert_eq!(inner.events.len(), 150);
    }

    #[test]
    fn offsets_never_regress() {
        let store = store();
        store.insert(30000142, sample_killmail(1, 30000142));
        store.insert(30000142, sample_killmail(2, 30000142));
        let first = store.fetch_for_client("c1", &[30000142]);
        assert_eq!(first.len(), 2);
        // Nothing new: offset must not move backwards or re-deliver.
        let second = store.fetch_for_client("c1", &[30000142]);
        assert!(second.is_empty());
    }

    #[test]
    fn fetch_one_returns_smallest_event_id_and_advances_only_that_system() {
        let store = store();
        store.insert(30000142, sample_killmail(1, 30000142));
        store.insert(30000144, sample_killmail(2, 30000144));

        let event = store.fetch_one("c1", &[30000142, 30000144]).unwrap();
        assert_eq!(event.system_id, 30000142);

        let next = store.fetch_one("c1", &[30000142, 30000144]).unwrap();
        assert_eq!(next.system_id, 30000144);

        assert!(store.fetch_one("c1", &[30000142, 30000144]).is_none());
    }
}
