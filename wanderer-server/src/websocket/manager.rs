//! Tracks every live WebSocket session, keyed by connection id, the way the
//! reference architecture's `ConnectionManager` tracks its connections.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::session::Session;

#[derive(Default)]
pub struct ConnectionManager {
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, session: Arc<Session>) {
        self.sessions.insert(session.id, session);
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, session)| session)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn count(&self) -> u64 {
        self.sessions.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use wanderer_core::broker::Broker;
    use wanderer_core::event_store::EventStore;
    use wanderer_core::metrics::Metrics;

    #[tokio::test]
    async fn add_get_remove_round_trip() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(8);
        let store = Arc::new(EventStore::new(Broker::new(), 10_000));
        let session = Arc::new(Session::new(tx, store.broker(), store, Arc::new(Metrics::new())));
        let id = session.id;

        manager.add(session);
        assert!(manager.get(id).is_some());
        assert_eq!(manager.count(), 1);

        manager.remove(id);
        assert!(manager.get(id).is_none());
        assert_eq!(manager.count(), 0);
    }
}
