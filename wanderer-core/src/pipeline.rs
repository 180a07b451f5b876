//! Wires parse -> enrich -> store -> publish into the single entry point the
//! RedisQ poller (and, in tests, anything else) hands a raw package to. This
//! is the "stages 1-8" orchestration referenced throughout §4.2.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::clock::Clock;
use crate::enricher::{self, EnrichmentSettings};
use crate::event_store::EventStore;
use crate::metrics::Metrics;
use crate::parser::{self, NormalizedOutcome};
use crate::reference_cache::ReferenceCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { event_id: u64, system_id: i64 },
    Older,
}

pub struct IngestionPipeline {
    pub reference_cache: Arc<ReferenceCache>,
    pub event_store: Arc<EventStore>,
    pub enrichment_settings: EnrichmentSettings,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
    pub cutoff_window: Duration,
}

impl IngestionPipeline {
    pub fn new(
        reference_cache: Arc<ReferenceCache>,
        event_store: Arc<EventStore>,
        enrichment_settings: EnrichmentSettings,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
        cutoff_window: Duration,
    ) -> Self {
        Self {
            reference_cache,
            event_store,
            enrichment_settings,
            metrics,
            clock,
            cutoff_window,
        }
    }

    /// Runs one killmail through stages 1-8. Parse errors are logged and
    /// counted, never propagated: a single malformed package must not stop
    /// the poll loop.
    pub async fn ingest(&self, killmail_obj: &Value, zkb_obj: Option<&Value>) -> Option<IngestOutcome> {
        self.metrics.record_kill_received();

        let cutoff = self.clock.now() - chrono::Duration::from_std(self.cutoff_window).unwrap_or_default();
        let normalized = match parser::normalize_and_filter(killmail_obj, zkb_obj, cutoff) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "dropping malformed killmail package");
                self.metrics.record_parse_error();
                return None;
            }
        };

        let normalized = match normalized {
            NormalizedOutcome::Fresh(km) => km,
            NormalizedOutcome::Older => {
                self.metrics.record_kill_skipped_older();
                return Some(IngestOutcome::Older);
            }
        };

        let system_id = normalized.solar_system_id;
        let enriched = enricher::enrich(&self.reference_cache, normalized, self.enrichment_settings).await;
        let killmail = parser::finalize(enriched);
        self.metrics.record_kill_enriched();

        let event_id = self.event_store.insert(system_id, killmail);
        Some(IngestOutcome::Stored { event_id, system_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use crate::clock::SystemClock;
    use crate::error::CoreError;
    use crate::models::{ReferenceKind, ReferenceRecord};
    use crate::reference_cache::EsiClient;
    use async_trait::async_trait;
    use serde_json::json;

    struct NullClient;

    #[async_trait]
    impl EsiClient for NullClient {
        async fn fetch(&self, _kind: ReferenceKind, id: i64) -> Result<Option<ReferenceRecord>, CoreError> {
            Ok(Some(ReferenceRecord {
                id,
                name: Some(format!("entity-{id}")),
                corporation_id: None,
                alliance_id: None,
                group_id: None,
            }))
        }
    }

    fn pipeline() -> IngestionPipeline {
        let cache = Arc::new(ReferenceCache::new(
            Arc::new(NullClient),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        ));
        let store = Arc::new(EventStore::new(Broker::new(), 10_000));
        IngestionPipeline::new(
            cache,
            store,
            EnrichmentSettings {
                min_attackers_for_parallel: 3,
                max_concurrency: 10,
                task_timeout: Duration::from_secs(5),
            },
            Arc::new(Metrics::new()),
            Arc::new(SystemClock),
            Duration::from_secs(24 * 3600),
        )
    }

    #[tokio::test]
    async fn ingests_a_fresh_killmail_end_to_end() {
        let pipeline = pipeline();
        let killmail = json!({
            "killmail_id": 1001,
            "solar_system_id": 30000142,
            "killmail_time": chrono::Utc::now().to_rfc3339(),
            "victim": {"character_id": 100, "ship_type_id": 587},
            "attackers": [{"character_id": 200, "final_blow": true}],
        });
        let outcome = pipeline.ingest(&killmail, None).await.unwrap();
        match outcome {
            IngestOutcome::Stored { system_id, .. } => assert_eq!(system_id, 30000142),
            IngestOutcome::Older => panic!("expected stored"),
        }
        assert_eq!(pipeline.event_store.kill_count(30000142), 1);
    }

    #[tokio::test]
    async fn malformed_package_is_dropped_without_panicking() {
        let pipeline = pipeline();
        let killmail = json!({"solar_system_id": 30000142});
        let outcome = pipeline.ingest(&killmail, None).await;
        assert!(outcome.is_none());
        assert_eq!(pipeline.metrics.snapshot(0, 0, 0).parse_errors_total, 1);
    }
}
