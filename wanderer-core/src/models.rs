//! Domain types: killmails, events, subscriptions, and reference records.
//!
//! Killmails are immutable once enriched; every field populated by the
//! enrichment pipeline is `Option` so a failed lookup degrades gracefully
//! instead of failing the whole killmail (see [`crate::enricher`]).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_SYSTEM_IDS_PER_SUBSCRIPTION: usize = 10_000;
pub const MAX_CHARACTER_IDS_PER_SUBSCRIPTION: usize = 50_000;
pub const MAX_SYSTEM_ID: i64 = 50_000_000;
pub const MAX_CHARACTER_ID: i64 = 3_000_000_000;
pub const MIN_POLLABLE_SYSTEM_ID: i64 = 30_000_000;
pub const MAX_POLLABLE_SYSTEM_ID: i64 = 50_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReferenceRecord {
    pub id: i64,
    pub name: Option<String>,
    /// Present on character records.
    pub corporation_id: Option<i64>,
    /// Present on character/corporation records.
    pub alliance_id: Option<i64>,
    /// Present on ship-type records.
    pub group_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EntityRefs {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub ship_type_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Enrichment {
    pub character: Option<ReferenceRecord>,
    pub corporation: Option<ReferenceRecord>,
    pub alliance: Option<ReferenceRecord>,
    pub ship: Option<ReferenceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Victim {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub damage_taken: Option<i64>,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub enrichment: Enrichment,
}

impl Victim {
    pub fn refs(&self) -> EntityRefs {
        EntityRefs {
            character_id: self.character_id,
            corporation_id: self.corporation_id,
            alliance_id: self.alliance_id,
            ship_type_id: self.ship_type_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Attacker {
    pub character_id: Option<i64>,
    pub corporation_id: Option<i64>,
    pub alliance_id: Option<i64>,
    pub ship_type_id: Option<i64>,
    pub weapon_type_id: Option<i64>,
    pub damage_done: Option<i64>,
    #[serde(default)]
    pub final_blow: bool,
    pub security_status: Option<f64>,
    #[serde(default)]
    pub enrichment: Enrichment,
}

impl Attacker {
    pub fn refs(&self) -> EntityRefs {
        EntityRefs {
            character_id: self.character_id,
            corporation_id: self.corporation_id,
            alliance_id: self.alliance_id,
            ship_type_id: self.ship_type_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ZkbMeta {
    pub hash: String,
    #[serde(default)]
    pub total_value: f64,
    #[serde(default)]
    pub npc: bool,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A fully parsed (and, after the enrichment pipeline runs, enriched)
/// killmail. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Killmail {
    pub killmail_id: i64,
    pub solar_system_id: i64,
    pub kill_time: DateTime<Utc>,
    pub victim: Victim,
    pub attackers: Vec<Attacker>,
    pub zkb: ZkbMeta,
    /// Populated during stage 8 of the enrichment pipeline.
    pub attacker_count: usize,
}

impl Killmail {
    /// Victim id plus every attacker id, deduplicated, nils omitted.
    /// Used by the matcher to evaluate character-based subscriptions.
    pub fn character_ids(&self) -> HashSet<i64> {
        let mut ids = HashSet::new();
        if let Some(id) = self.victim.character_id {
            ids.insert(id);
        }
        for attacker in &self.attackers {
            if let Some(id) = attacker.character_id {
                ids.insert(id);
            }
        }
        ids
    }
}

/// A stored killmail paired with its process-global monotonic event id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: u64,
    pub system_id: i64,
    pub killmail: Killmail,
}

/// A durable (for the connection's lifetime) interest in systems and/or
/// characters, with a delivery sink. Empty sets on both sides is a wildcard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub system_ids: HashSet<i64>,
    pub character_ids: HashSet<i64>,
    pub sink: SubscriptionSink,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubscriptionSink {
    WebSocket { connection_id: Uuid },
    Webhook { callback_url: String },
}

impl Subscription {
    pub fn is_wildcard(&self) -> bool {
        self.system_ids.is_empty() && self.character_ids.is_empty()
    }

    pub fn matches(&self, system_id: i64, character_ids: &HashSet<i64>) -> bool {
        if self.is_wildcard() {
            return true;
        }
        if self.system_ids.contains(&system_id) {
            return true;
        }
        self.character_ids.iter().any(|id| character_ids.contains(id))
    }
}

/// The two entity kinds subscriptions can be indexed by (`system_id`,
/// `character_id`). Used as a discriminant for metrics and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    System,
    Character,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::System => write!(f, "system"),
            EntityKind::Character => write!(f, "character"),
        }
    }
}

/// Key into the reference cache: `(kind, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Character,
    Corporation,
    Alliance,
    Type,
    Group,
}

impl ReferenceKind {
    pub fn esi_path(&self, id: i64) -> String {
        match self {
            ReferenceKind::Character => format!("/characters/{id}/"),
            ReferenceKind::Corporation => format!("/corporations/{id}/"),
            ReferenceKind::Alliance => format!("/alliances/{id}/"),
            ReferenceKind::Type => format!("/universe/types/{id}/"),
            ReferenceKind::Group => format!("/universe/groups/{id}/"),
        }
    }
}
