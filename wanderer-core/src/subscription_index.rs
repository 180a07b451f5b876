//! Forward/reverse index mapping an entity id (system or character) to the
//! set of subscriptions interested in it, and back (§4.7). One instance is
//! built per entity kind; `Matcher` holds one of each.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use uuid::Uuid;

/// `entity_id -> set<subscription_id>` plus `subscription_id -> entity_ids`,
/// kept mutually consistent by construction: every mutating method updates
/// both sides under its own per-bucket lock, so concurrent add/update/remove
/// for distinct subscription ids never corrupt a shared bucket.
#[derive(Default)]
pub struct SubscriptionIndex {
    forward: DashMap<i64, HashSet<Uuid>>,
    reverse: DashMap<Uuid, HashSet<i64>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscription_id: Uuid, entity_ids: &HashSet<i64>) {
        for &entity_id in entity_ids {
            self.forward.entry(entity_id).or_default().insert(subscription_id);
        }
        self.reverse.insert(subscription_id, entity_ids.clone());
    }

    pub fn update(&self, subscription_id: Uuid, new_entity_ids: &HashSet<i64>) {
        let old_entity_ids = self
            .reverse
            .get(&subscription_id)
            .map(|e| e.clone())
            .unwrap_or_default();

        for entity_id in old_entity_ids.difference(new_entity_ids) {
            self.remove_from_forward(*entity_id, subscription_id);
        }
        for &entity_id in new_entity_ids.difference(&old_entity_ids) {
            self.forward.entry(entity_id).or_default().insert(subscription_id);
        }

        if new_entity_ids.is_empty() {
            self.reverse.remove(&subscription_id);
        } else {
            self.reverse.insert(subscription_id, new_entity_ids.clone());
        }
    }

    pub fn remove(&self, subscription_id: Uuid) {
        if let Some((_, entity_ids)) = self.reverse.remove(&subscription_id) {
            for entity_id in entity_ids {
                self.remove_from_forward(entity_id, subscription_id);
            }
        }
    }

    fn remove_from_forward(&self, entity_id: i64, subscription_id: Uuid) {
        let mut empty = false;
        if let Some(mut bucket) = self.forward.get_mut(&entity_id) {
            bucket.remove(&subscription_id);
            empty = bucket.is_empty();
        }
        if empty {
            self.forward.remove(&entity_id);
        }
    }

    pub fn lookup(&self, entity_id: i64) -> Vec<Uuid> {
        self.forward
            .get(&entity_id)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn lookup_many(&self, entity_ids: impl IntoIterator<Item = i64>) -> HashSet<Uuid> {
        let mut out = HashSet::new();
        for entity_id in entity_ids {
            if let Some(bucket) = self.forward.get(&entity_id) {
                out.extend(bucket.iter().copied());
            }
        }
        out
    }

    /// Safety-net sweep removing any forward bucket that ended up empty
    /// without being cleaned up inline (defensive against races between
    /// concurrent `update`/`remove` calls touching the same entity bucket).
    pub fn sweep_empty_buckets(&self) {
        let empty: Vec<i64> = self
            .forward
            .iter()
            .filter(|entry| entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect();
        for entity_id in empty {
            self.forward.remove_if(&entity_id, |_, v| v.is_empty());
        }
    }

    /// Checks forward/reverse consistency: every `(e, s)` pair present on
    /// one side is present on the other. Exposed for tests and invariant
    /// checks, not the production hot path.
    pub fn is_consistent(&self) -> bool {
        for entry in self.forward.iter() {
            let entity_id = *entry.key();
            for subscription_id in entry.value() {
                let Some(reverse_entities) = self.reverse.get(subscription_id) else {
                    return false;
                };
                if !reverse_entities.contains(&entity_id) {
                    return false;
                }
            }
        }
        for entry in self.reverse.iter() {
            let subscription_id = *entry.key();
            for entity_id in entry.value() {
                let Some(forward_subs) = self.forward.get(entity_id) else {
                    return false;
                };
                if !forward_subs.contains(&subscription_id) {
                    return false;
                }
            }
        }
        true
    }
}

/// Snapshot view used for tests/metrics without exposing the `DashMap`
/// internals.
pub fn forward_snapshot(index: &SubscriptionIndex) -> HashMap<i64, HashSet<Uuid>> {
    index
        .forward
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_lookup_round_trips() {
        let index = SubscriptionIndex::new();
        let sub = Uuid::new_v4();
        let entities: HashSet<i64> = [1, 2, 3].into_iter().collect();
        index.add(sub, &entities);
        assert_eq!(index.lookup(2), vec![sub]);
        assert!(index.is_consistent());
    }

    #[test]
    fn update_adds_and_removes_symmetrically() {
        let index = SubscriptionIndex::new();
        let sub = Uuid::new_v4();
        index.add(sub, &[1, 2].into_iter().collect());
        index.update(sub, &[2, 3].into_iter().collect());
        assert!(index.lookup(1).is_empty());
        assert_eq!(index.lookup(2), vec![sub]);
        assert_eq!(index.lookup(3), vec![sub]);
        assert!(index.is_consistent());
    }

    #[test]
    fn update_to_empty_removes_reverse_entry() {
        let index = SubscriptionIndex::new();
        let sub = Uuid::new_v4();
        index.add(sub, &[1].into_iter().collect());
        index.update(sub, &HashSet::new());
        assert!(index.lookup(1).is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn remove_clears_both_sides() {
        let index = SubscriptionIndex::new();
        let sub = Uuid::new_v4();
        index.add(sub, &[1, 2].into_iter().collect());
        index.remove(sub);
        assert!(index.lookup(1).is_empty());
        assert!(index.lookup(2).is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn lookup_many_deduplicates_across_entities() {
        let index = SubscriptionIndex::new();
        let sub_a = Uuid::new_v4();
        let sub_b = Uuid::new_v4();
        index.add(sub_a, &[1].into_iter().collect());
        index.add(sub_b, &[1, 2].into_iter().collect());
        let result = index.lookup_many([1, 2]);
        assert_eq!(result.len(), 2);
        assert!(result.contains(&sub_a));
        assert!(result.contains(&sub_b));
    }
}
