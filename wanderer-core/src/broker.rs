//! In-process publish/subscribe over topics `system:<id>` (and a
//! `:detailed` variant), one `broadcast` channel per topic. Delivery is
//! best-effort in order per subscriber: a lagging receiver drops the oldest
//! unread frames rather than blocking the publisher (§4.9).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::warn;

use crate::models::Killmail;

const TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    System(i64),
    SystemDetailed(i64),
}

impl Topic {
    pub fn name(&self) -> String {
        match self {
            Topic::System(id) => format!("system:{id}"),
            Topic::SystemDetailed(id) => format!("system:{id}:detailed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrokerFrame {
    pub sequence: u64,
    pub system_id: i64,
    pub killmail: Arc<Killmail>,
}

/// Map of topic -> broadcast sender, created lazily on first subscribe or
/// publish. Senders for topics with no subscribers are kept around (cheap)
/// rather than torn down, matching the reference architecture's event bus.
#[derive(Default)]
pub struct Broker {
    topics: DashMap<Topic, broadcast::Sender<BrokerFrame>>,
    sequence: AtomicU64,
    lagged_total: AtomicU64,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, topic: &Topic) -> broadcast::Sender<BrokerFrame> {
        self.topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<BrokerFrame> {
        self.sender_for(topic).subscribe()
    }

    /// Publishes to both `system:<id>` and `system:<id>:detailed`. Never
    /// blocks: `broadcast::Sender::send` only fails when there are no
    /// receivers, which is not an error here.
    pub fn publish(&self, system_id: i64, killmail: Killmail) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let killmail = Arc::new(killmail);
        for topic in [Topic::System(system_id), Topic::SystemDetailed(system_id)] {
            let frame = BrokerFrame {
                sequence,
                system_id,
                killmail: killmail.clone(),
            };
            let _ = self.sender_for(&topic).send(frame);
        }
    }

    pub fn receiver_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|s| s.receiver_count()).unwrap_or(0)
    }

    pub fn record_lagged(&self, n: u64) {
        self.lagged_total.fetch_add(n, Ordering::Relaxed);
        warn!(dropped = n, "websocket session lagged, dropping oldest frames");
    }

    pub fn lagged_total(&self) -> u64 {
        self.lagged_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Victim, ZkbMeta};

    fn killmail(id: i64) -> Killmail {
        Killmail {
            killmail_id: id,
            solar_system_id: 30000142,
            kill_time: chrono::Utc::now(),
            victim: Victim::default(),
            attackers: Vec::new(),
            zkb: ZkbMeta::default(),
            attacker_count: 0,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_frame() {
        let broker = Broker::new();
        let mut rx = broker.subscribe(&Topic::System(30000142));
        broker.publish(30000142, killmail(1));
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.system_id, 30000142);
        assert_eq!(frame.killmail.killmail_id, 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_block() {
        let broker = Broker::new();
        broker.publish(30000142, killmail(1));
    }
}
