//! CRUD registry backing `/api/v1/subscriptions` (§4.11, §6). Wraps the two
//! core [`SubscriptionIndex`] instances (keyed by system id and character id)
//! with the bookkeeping the HTTP surface needs: a client-supplied
//! `subscriber_id` mapped to the server-generated `subscription_id`, and
//! enough state to list/delete by that external key.
//!
//! The HTTP contract requires at least one of `system_ids`/`character_ids`
//! per subscription, so a wildcard subscription (both empty) is never
//! created through this surface; `matching_subscriptions` still unions in a
//! wildcard set for parity with [`wanderer_core::matcher::Matcher`]'s
//! documented contract, in case a future admin surface wants one.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use uuid::Uuid;
use wanderer_core::error::{CoreError, ValidationError};
use wanderer_core::matcher::Matcher;
use wanderer_core::models::{
    Killmail, Subscription, SubscriptionSink, MAX_CHARACTER_ID, MAX_CHARACTER_IDS_PER_SUBSCRIPTION, MAX_SYSTEM_ID,
    MAX_SYSTEM_IDS_PER_SUBSCRIPTION,
};
use wanderer_core::subscription_index::SubscriptionIndex;

pub struct SubscriptionRegistry {
    system_index: Arc<SubscriptionIndex>,
    character_index: Arc<SubscriptionIndex>,
    by_subscriber: DashMap<String, Subscription>,
    wildcard: DashSet<Uuid>,
}

impl SubscriptionRegistry {
    pub fn new(system_index: Arc<SubscriptionIndex>, character_index: Arc<SubscriptionIndex>) -> Self {
        Self {
            system_index,
            character_index,
            by_subscriber: DashMap::new(),
            wildcard: DashSet::new(),
        }
    }

    /// Creates or replaces the subscription for `subscriber_id`. Returns the
    /// freshly generated `subscription_id`.
    pub fn create(
        &self,
        subscriber_id: String,
        system_ids: HashSet<i64>,
        character_ids: HashSet<i64>,
        callback_url: String,
        now: DateTime<Utc>,
    ) -> Result<Uuid, CoreError> {
        if system_ids.is_empty() && character_ids.is_empty() {
            return Err(CoreError::Validation(ValidationError::InvalidId(
                "subscription requires at least one of system_ids or character_ids".into(),
            )));
        }
        if system_ids.len() > MAX_SYSTEM_IDS_PER_SUBSCRIPTION {
            return Err(CoreError::Validation(ValidationError::TooManyEntries(format!(
                "system_ids exceeds {MAX_SYSTEM_IDS_PER_SUBSCRIPTION}"
            ))));
        }
        if character_ids.len() > MAX_CHARACTER_IDS_PER_SUBSCRIPTION {
            return Err(CoreError::Validation(ValidationError::TooManyEntries(format!(
                "character_ids exceeds {MAX_CHARACTER_IDS_PER_SUBSCRIPTION}"
            ))));
        }
        if let Some(bad) = system_ids.iter().find(|id| **id <= 0 || **id > MAX_SYSTEM_ID) {
            return Err(CoreError::Validation(ValidationError::OutOfRange(format!(
                "system id {bad} exceeds {MAX_SYSTEM_ID}"
            ))));
        }
        if let Some(bad) = character_ids.iter().find(|id| **id <= 0 || **id > MAX_CHARACTER_ID) {
            return Err(CoreError::Validation(ValidationError::OutOfRange(format!(
                "character id {bad} exceeds {MAX_CHARACTER_ID}"
            ))));
        }
        if !callback_url.starts_with("http://") && !callback_url.starts_with("https://") {
            return Err(CoreError::Validation(ValidationError::InvalidId(
                "callback_url must be http or https".into(),
            )));
        }

        if let Some((_, old)) = self.by_subscriber.remove(&subscriber_id) {
            self.system_index.remove(old.subscription_id);
            self.character_index.remove(old.subscription_id);
            self.wildcard.remove(&old.subscription_id);
        }

        let subscription_id = Uuid::new_v4();
        self.system_index.add(subscription_id, &system_ids);
        self.character_index.add(subscription_id, &character_ids);
        let subscription = Subscription {
            subscription_id,
            system_ids,
            character_ids,
            sink: SubscriptionSink::Webhook { callback_url },
            created_at: now,
        };
        self.by_subscriber.insert(subscriber_id, subscription);
        Ok(subscription_id)
    }

    pub fn list(&self) -> Vec<Subscription> {
        self.by_subscriber.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn remove(&self, subscriber_id: &str) -> Option<Subscription> {
        let (_, subscription) = self.by_subscriber.remove(subscriber_id)?;
        self.system_index.remove(subscription.subscription_id);
        self.character_index.remove(subscription.subscription_id);
        self.wildcard.remove(&subscription.subscription_id);
        Some(subscription)
    }

    pub fn count(&self) -> u64 {
        self.by_subscriber.len() as u64
    }

    /// Union of indexed matches and the wildcard set, mirroring
    /// `Matcher::matching_subscriptions` plus the wildcard subscriber gap it
    /// documents but deliberately leaves to its caller.
    pub fn matching_subscriptions(&self, killmail: &Killmail) -> HashSet<Uuid> {
        let matcher = Matcher::new(&self.system_index, &self.character_index);
        let mut matches = matcher.matching_subscriptions(killmail);
        matches.extend(self.wildcard.iter().map(|id| *id));
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wanderer_core::models::{Victim, ZkbMeta};

    fn killmail(system_id: i64, character_id: Option<i64>) -> Killmail {
        Killmail {
            killmail_id: 1,
            solar_system_id: system_id,
            kill_time: Utc::now(),
            victim: Victim {
                character_id,
                ..Default::default()
            },
            attackers: Vec::new(),
            zkb: ZkbMeta::default(),
            attacker_count: 0,
        }
    }

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(Arc::new(SubscriptionIndex::new()), Arc::new(SubscriptionIndex::new()))
    }

    #[test]
    fn create_rejects_subscription_with_no_entity_ids() {
        let registry = registry();
        let err = registry.create("sub-1".into(), HashSet::new(), HashSet::new(), "https://example.invalid".into(), Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn create_rejects_non_http_callback_url() {
        let registry = registry();
        let err = registry.create(
            "sub-1".into(),
            [30000142].into_iter().collect(),
            HashSet::new(),
            "ftp://example.invalid".into(),
            Utc::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn create_list_remove_round_trip() {
        let registry = registry();
        let id = registry
            .create(
                "sub-1".into(),
                [30000142].into_iter().collect(),
                HashSet::new(),
                "https://example.invalid/hook".into(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.list()[0].subscription_id, id);

        let km = killmail(30000142, None);
        assert!(registry.matching_subscriptions(&km).contains(&id));

        let removed = registry.remove("sub-1").unwrap();
        assert_eq!(removed.subscription_id, id);
        assert_eq!(registry.count(), 0);
        assert!(!registry.matching_subscriptions(&km).contains(&id));
    }

    #[test]
    fn re_creating_same_subscriber_replaces_the_old_subscription() {
        let registry = registry();
        let first = registry
            .create(
                "sub-1".into(),
                [30000142].into_iter().collect(),
                HashSet::new(),
                "https://example.invalid/hook".into(),
                Utc::now(),
            )
            .unwrap();
        let second = registry
            .create(
                "sub-1".into(),
                [30000999].into_iter().collect(),
                HashSet::new(),
                "https://example.invalid/hook".into(),
                Utc::now(),
            )
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.count(), 1);
        assert!(!registry.matching_subscriptions(&killmail(30000142, None)).contains(&first));
        assert!(registry.matching_subscriptions(&killmail(30000999, None)).contains(&second));
    }
}
