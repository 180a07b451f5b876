//! Stages 6-7 of the enrichment pipeline: resolve victim/attacker reference
//! ids against the reference cache, with bounded-parallel fan-out over
//! attackers once the list is long enough to be worth it (§4.2, §5).

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{instrument, warn};

use crate::error::CoreError;
use crate::models::{Attacker, Enrichment, EntityRefs, ReferenceKind, Victim};
use crate::parser::NormalizedKillmail;
use crate::reference_cache::ReferenceCache;

#[derive(Debug, Clone, Copy)]
pub struct EnrichmentSettings {
    pub min_attackers_for_parallel: usize,
    pub max_concurrency: usize,
    pub task_timeout: Duration,
}

async fn resolve_refs(cache: &ReferenceCache, refs: &EntityRefs) -> Enrichment {
    let character = match refs.character_id {
        Some(id) => cache.get(ReferenceKind::Character, id).await.ok().flatten(),
        None => None,
    };
    let corporation = match refs.corporation_id {
        Some(id) => cache.get(ReferenceKind::Corporation, id).await.ok().flatten(),
        None => None,
    };
    let alliance = match refs.alliance_id {
        Some(id) => cache.get(ReferenceKind::Alliance, id).await.ok().flatten(),
        None => None,
    };
    let ship = match refs.ship_type_id {
        Some(id) => cache.get(ReferenceKind::Type, id).await.ok().flatten(),
        None => None,
    };
    Enrichment {
        character,
        corporation,
        alliance,
        ship,
    }
}

#[instrument(skip(cache, killmail), fields(killmail_id = killmail.killmail_id))]
pub async fn enrich_victim(cache: &ReferenceCache, killmail: &mut NormalizedKillmail) {
    let refs = killmail.victim.refs();
    killmail.victim.enrichment = resolve_refs(cache, &refs).await;
}

/// Enriches every attacker in place. Sequential below
/// `settings.min_attackers_for_parallel`; otherwise fans out with at most
/// `settings.max_concurrency` lookups in flight, each bounded by
/// `settings.task_timeout`. A timed-out attacker is dropped from the list
/// rather than left unenriched, matching the "crashed worker yields a nil
/// attacker, filtered out" rule.
#[instrument(skip(cache, killmail), fields(killmail_id = killmail.killmail_id, attacker_count = killmail.attackers.len()))]
pub async fn enrich_attackers(cache: &ReferenceCache, killmail: &mut NormalizedKillmail, settings: EnrichmentSettings) {
    let attackers = std::mem::take(&mut killmail.attackers);

    if attackers.len() < settings.min_attackers_for_parallel {
        let mut enriched = Vec::with_capacity(attackers.len());
        for mut attacker in attackers {
            let refs = attacker.refs();
            attacker.enrichment = resolve_refs(cache, &refs).await;
            enriched.push(attacker);
        }
        killmail.attackers = enriched;
        return;
    }

    let timeout = settings.task_timeout;
    let mut results: Vec<(usize, Option<Attacker>)> = stream::iter(attackers.into_iter().enumerate().map(move |(index, mut attacker)| {
        async move {
            let refs = attacker.refs();
            let outcome = match tokio::time::timeout(timeout, resolve_refs(cache, &refs)).await {
                Ok(enrichment) => {
                    attacker.enrichment = enrichment;
                    Some(attacker)
                }
                Err(_) => {
                    warn!("attacker enrichment timed out, dropping attacker");
                    None
                }
            };
            (index, outcome)
        }
    }))
    .buffer_unordered(settings.max_concurrency)
    .collect()
    .await;

    // `buffer_unordered` completes out of order; restore wire order before
    // dropping the index so the parallel path matches the sequential one.
    results.sort_by_key(|(index, _)| *index);
    killmail.attackers = results.into_iter().filter_map(|(_, attacker)| attacker).collect();
}

/// Runs stages 6-7 over a normalized killmail. Never fails: a failed lookup
/// substitutes a nil sub-record per the propagation policy in §7.
pub async fn enrich(
    cache: &ReferenceCache,
    mut killmail: NormalizedKillmail,
    settings: EnrichmentSettings,
) -> NormalizedKillmail {
    enrich_victim(cache, &mut killmail).await;
    enrich_attackers(cache, &mut killmail, settings).await;
    killmail
}

pub fn classify_enrichment_error(err: &CoreError) -> bool {
    // Enrichment lookups never propagate as hard failures; this exists so
    // callers that do inspect an error (e.g. for metrics) have one place to
    // decide whether it was worth logging at warn level.
    !matches!(err, CoreError::Cache(crate::error::CacheError::NotFound))
}
