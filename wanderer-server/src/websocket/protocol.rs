//! Wire types for `/socket/websocket`, channel `killmails:lobby` (§4.10).
//! Tagged the way the reference architecture tags its own session protocol:
//! a `event` discriminant plus per-variant payload fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wanderer_core::models::Killmail;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    Join {
        #[serde(default)]
        systems: Option<Vec<i64>>,
    },
    SubscribeSystems {
        systems: Vec<i64>,
    },
    UnsubscribeSystems {
        systems: Vec<i64>,
    },
    GetStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        subscription_id: Uuid,
        subscribed_systems: Vec<i64>,
        status: &'static str,
    },
    SubscribedSystems {
        subscribed_systems: Vec<i64>,
    },
    UnsubscribedSystems {
        subscribed_systems: Vec<i64>,
    },
    Status {
        subscription_id: Uuid,
        subscribed_systems: Vec<i64>,
        connected_at: DateTime<Utc>,
        user_id: Option<Uuid>,
    },
    KillmailUpdate {
        system_id: i64,
        killmails: Vec<Killmail>,
        timestamp: DateTime<Utc>,
        preload: bool,
    },
    KillCountUpdate {
        system_id: i64,
        count: u64,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}
