//! A single live WebSocket connection: outbound channel, subscribed-system
//! set, and one forwarder task per subscribed system (§4.10). Mirrors the
//! reference architecture's connection/session split — bookkeeping lives
//! here, framing and the receive loop live in the handler.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use wanderer_core::broker::{Broker, Topic};
use wanderer_core::event_store::EventStore;
use wanderer_core::metrics::Metrics;

use super::protocol::ServerEvent;

const PRELOAD_LIMIT: usize = 5;

pub struct Session {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<ServerEvent>,
    subscribed_systems: RwLock<HashSet<i64>>,
    forwarders: RwLock<HashMap<i64, JoinHandle<()>>>,
    last_activity: RwLock<DateTime<Utc>>,
    broker: Arc<Broker>,
    event_store: Arc<EventStore>,
    metrics: Arc<Metrics>,
}

impl Session {
    pub fn new(sender: mpsc::Sender<ServerEvent>, broker: Arc<Broker>, event_store: Arc<EventStore>, metrics: Arc<Metrics>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            connected_at: now,
            sender,
            subscribed_systems: RwLock::new(HashSet::new()),
            forwarders: RwLock::new(HashMap::new()),
            last_activity: RwLock::new(now),
            broker,
            event_store,
            metrics,
        }
    }

    pub async fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }

    pub async fn subscribed_systems(&self) -> Vec<i64> {
        self.subscribed_systems.read().await.iter().copied().collect()
    }

    pub async fn touch(&self) {
        *self.last_activity.write().await = Utc::now();
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().await
    }

    pub async fn is_healthy(&self, max_idle: chrono::Duration) -> bool {
        Utc::now() - self.last_activity().await < max_idle
    }


    /// Adds `systems` to the subscribed set, spawns a forwarder per
    /// newly-added system, and pushes a `preload:true` `killmail_update` for
    /// each with up to the last five stored killmails.
    pub async fn subscribe_systems(self: &Arc<Self>, systems: &[i64]) -> Vec<i64> {
        let mut added = Vec::new();
        {
            let mut subscribed = self.subscribed_systems.write().await;
            for &system_id in systems {
                if subscribed.insert(system_id) {
                    added.push(system_id);
                }
            }
        }

        for system_id in &added {
            self.spawn_forwarder(*system_id).await;
            let recent: Vec<_> = self.event_store.list_by_system(*system_id).into_iter().take(PRELOAD_LIMIT).collect();
            if !recent.is_empty() {
                let _ = self
                    .send(ServerEvent::KillmailUpdate {
                        system_id: *system_id,
                        killmails: recent,
                        timestamp: Utc::now(),
                        preload: true,
                    })
                    .await;
            }
        }

        self.subscribed_systems().await
    }

    pub async fn unsubscribe_systems(&self, systems: &[i64]) -> Vec<i64> {
        let mut forwarders = self.forwarders.write().await;
        let mut subscribed = self.subscribed_systems.write().await;
        for system_id in systems {
            subscribed.remove(system_id);
            if let Some(handle) = forwarders.remove(system_id) {
                handle.abort();
            }
        }
        subscribed.iter().copied().collect()
    }

    pub async fn shutdown(&self) {
        let mut forwarders = self.forwarders.write().await;
        for (_, handle) in forwarders.drain() {
            handle.abort();
        }
        self.subscribed_systems.write().await.clear();
    }

    async fn spawn_forwarder(self: &Arc<Self>, system_id: i64) {
        let mut rx = self.broker.subscribe(&Topic::System(system_id));
        let sender = self.sender.clone();
        let metrics = self.metrics.clone();
        let event_store = self.event_store.clone();
        let session_id = self.id;
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => {
                        let timestamp = Utc::now();
                        let event = ServerEvent::KillmailUpdate {
                            system_id: frame.system_id,
                            killmails: vec![(*frame.killmail).clone()],
                            timestamp,
                            preload: false,
                        };
                        if sender.send(event).await.is_err() {
                            break;
                        }
                        let count_event = ServerEvent::KillCountUpdate {
                            system_id: frame.system_id,
                            count: event_store.kill_count(frame.system_id),
                            timestamp,
                        };
                        if sender.send(count_event).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        metrics.record_broker_lagged(n);
                        debug!(%session_id, system_id, lagged = n, "session forwarder lagged, dropped oldest frames");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.forwarders.write().await.insert(system_id, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wanderer_core::broker::Broker as CoreBroker;
    use wanderer_core::models::{Victim, ZkbMeta};

    fn killmail(id: i64, system_id: i64) -> wanderer_core::models::Killmail {
        wanderer_core::models::Killmail {
            killmail_id: id,
            solar_system_id: system_id,
            kill_time: Utc::now(),
            victim: Victim::default(),
            attackers: Vec::new(),
            zkb: ZkbMeta::default(),
            attacker_count: 0,
        }
    }

    #[tokio::test]
    async fn subscribing_preloads_recent_kills() {
        let broker = Arc::new(CoreBroker::new());
        let store = Arc::new(EventStore::new(CoreBroker::new(), 10_000));
        store.insert(30000142, killmail(1, 30000142));
        store.insert(30000142, killmail(2, 30000142));

        let (tx, mut rx) = mpsc::channel(16);
        let session = Arc::new(Session::new(tx, broker, store, Arc::new(Metrics::new())));
        let subscribed = session.subscribe_systems(&[30000142]).await;
        assert_eq!(subscribed, vec![30000142]);

        let event = rx.recv().await.unwrap();
        match event {
            ServerEvent::KillmailUpdate { killmails, preload, .. } => {
                assert!(preload);
                assert_eq!(killmails.len(), 2);
            }
            _ => panic!("expected killmail_update"),
        }
    }

    #[tokio::test]
    async fn unsubscribing_stops_forwarding() {
        let broker = Arc::new(CoreBroker::new());
        let store = Arc::new(EventStore::new(CoreBroker::new(), 10_000));
        let (tx, _rx) = mpsc::channel(16);
        let session = Arc::new(Session::new(tx, broker.clone(), store, Arc::new(Metrics::new())));
        session.subscribe_systems(&[30000142]).await;
        let remaining = session.unsubscribe_systems(&[30000142]).await;
        assert!(remaining.is_empty());
    }
}
