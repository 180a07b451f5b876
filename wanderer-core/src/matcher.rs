//! Evaluates a killmail against the system and character subscription
//! indexes to produce the set of matching subscription ids (§4.8).

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::models::Killmail;
use crate::subscription_index::SubscriptionIndex;

pub struct Matcher<'a> {
    pub system_index: &'a SubscriptionIndex,
    pub character_index: &'a SubscriptionIndex,
}

impl<'a> Matcher<'a> {
    pub fn new(system_index: &'a SubscriptionIndex, character_index: &'a SubscriptionIndex) -> Self {
        Self {
            system_index,
            character_index,
        }
    }

    /// `system_index.lookup(s) ∪ character_index.lookup_many(C)`.
    pub fn matching_subscriptions(&self, killmail: &Killmail) -> HashSet<Uuid> {
        let mut matches: HashSet<Uuid> =
            self.system_index.lookup(killmail.solar_system_id).into_iter().collect();
        matches.extend(self.character_index.lookup_many(killmail.character_ids()));
        matches
    }

    /// Groups a batch of killmails by the subscriptions they match.
    pub fn batch_filter(&self, killmails: &[Killmail]) -> HashMap<Uuid, Vec<Killmail>> {
        let mut out: HashMap<Uuid, Vec<Killmail>> = HashMap::new();
        for killmail in killmails {
            for subscription_id in self.matching_subscriptions(killmail) {
                out.entry(subscription_id).or_default().push(killmail.clone());
            }
        }
        out
    }
}
