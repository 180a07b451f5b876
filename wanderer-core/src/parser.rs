//! Stages 1-5 of the enrichment pipeline: normalize field-name aliases,
//! validate required fields, parse the kill time, apply the cutoff filter,
//! and merge zkb metadata. Pure functions over a `serde_json::Value` map so
//! they can be unit tested without any I/O (§4.2).

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ParseError;
use crate::models::{Attacker, Killmail, Victim, ZkbMeta};

/// Outcome of running the raw package through stages 1-4. `Older` is a
/// benign skip, not an error: the caller should count it and move on.
pub enum NormalizedOutcome {
    Fresh(NormalizedKillmail),
    Older,
}

/// Killmail fields after normalization/validation/time-parsing but before
/// enrichment (victim/attacker sub-records are still raw refs).
pub struct NormalizedKillmail {
    pub killmail_id: i64,
    pub solar_system_id: i64,
    pub kill_time: DateTime<Utc>,
    pub victim: Victim,
    pub attackers: Vec<Attacker>,
    pub zkb: ZkbMeta,
}

fn field<'a>(obj: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(name))
}

fn as_i64(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

/// Stage 1: accept both snake_case and the documented camelCase aliases.
fn normalize_entity_refs(obj: &Value) -> (Option<i64>, Option<i64>, Option<i64>, Option<i64>) {
    let character_id = field(obj, &["character_id", "characterID"]).and_then(as_i64);
    let corporation_id = field(obj, &["corporation_id", "corporationID"]).and_then(as_i64);
    let alliance_id = field(obj, &["alliance_id", "allianceID"]).and_then(as_i64);
    let ship_type_id = field(obj, &["ship_type_id", "shipTypeID"]).and_then(as_i64);
    (character_id, corporation_id, alliance_id, ship_type_id)
}

fn parse_victim(obj: &Value) -> Victim {
    let (character_id, corporation_id, alliance_id, ship_type_id) = normalize_entity_refs(obj);
    Victim {
        character_id,
        corporation_id,
        alliance_id,
        ship_type_id,
        damage_taken: field(obj, &["damage_taken", "damageTaken"]).and_then(as_i64),
        items: obj
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        enrichment: Default::default(),
    }
}

fn parse_attacker(obj: &Value) -> Attacker {
    let (character_id, corporation_id, alliance_id, ship_type_id) = normalize_entity_refs(obj);
    Attacker {
        character_id,
        corporation_id,
        alliance_id,
        ship_type_id,
        weapon_type_id: field(obj, &["weapon_type_id", "weaponTypeID"]).and_then(as_i64),
        damage_done: field(obj, &["damage_done", "damageDone"]).and_then(as_i64),
        final_blow: obj
            .get("final_blow")
            .or_else(|| obj.get("finalBlow"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        security_status: field(obj, &["security_status", "securityStatus"]).and_then(|v| v.as_f64()),
        enrichment: Default::default(),
    }
}

fn parse_zkb(obj: Option<&Value>) -> ZkbMeta {
    let Some(obj) = obj else {
        return ZkbMeta::default();
    };
    ZkbMeta {
        hash: obj
            .get("hash")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        total_value: obj
            .get("totalValue")
            .or_else(|| obj.get("total_value"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        npc: obj.get("npc").and_then(|v| v.as_bool()).unwrap_or(false),
        points: obj.get("points").and_then(as_i64),
        labels: obj
            .get("labels")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Stages 1-5: normalize, validate required fields, parse time, apply the
/// cutoff, and merge zkb metadata into a `NormalizedKillmail`.
pub fn normalize_and_filter(
    killmail_obj: &Value,
    zkb_obj: Option<&Value>,
    cutoff: DateTime<Utc>,
) -> Result<NormalizedOutcome, ParseError> {
    let killmail_id = field(killmail_obj, &["killmail_id", "killID"])
        .and_then(as_i64)
        .ok_or_else(|| ParseError::MissingRequiredFields("killmail_id".to_string()))?;

    let solar_system_id = field(killmail_obj, &["solar_system_id", "solarSystemID"])
        .and_then(as_i64)
        .ok_or_else(|| ParseError::MissingRequiredFields("solar_system_id".to_string()))?;

    let victim_obj = killmail_obj
        .get("victim")
        .ok_or_else(|| ParseError::MissingRequiredFields("victim".to_string()))?;

    let attackers_obj = killmail_obj
        .get("attackers")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ParseError::MissingRequiredFields("attackers".to_string()))?;

    let time_str = field(killmail_obj, &["killmail_time", "kill_time", "killTime"])
        .and_then(|v| v.as_str())
        .ok_or_else(|| ParseError::MissingRequiredFields("killmail_time".to_string()))?;

    let kill_time = DateTime::parse_from_rfc3339(time_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ParseError::InvalidTime(e.to_string()))?;

    if kill_time < cutoff {
        return Ok(NormalizedOutcome::Older);
    }

    let victim = parse_victim(victim_obj);
    let attackers = attackers_obj.iter().map(parse_attacker).collect();
    let zkb = parse_zkb(zkb_obj.or_else(|| killmail_obj.get("zkb")));

    Ok(NormalizedOutcome::Fresh(NormalizedKillmail {
        killmail_id,
        solar_system_id,
        kill_time,
        victim,
        attackers,
        zkb,
    }))
}

/// Stage 8: flatten convenience fields and finalize the immutable killmail.
pub fn finalize(normalized: NormalizedKillmail) -> Killmail {
    let attacker_count = normalized.attackers.len();
    Killmail {
        killmail_id: normalized.killmail_id,
        solar_system_id: normalized.solar_system_id,
        kill_time: normalized.kill_time,
        victim: normalized.victim,
        attackers: normalized.attackers,
        zkb: normalized.zkb,
        attacker_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_killmail(time: &str) -> Value {
        json!({
            "killmail_id": 1001,
            "solar_system_id": 30000142,
            "killmail_time": time,
            "victim": {"character_id": 100, "ship_type_id": 587},
            "attackers": [{"character_id": 200, "final_blow": true}],
        })
    }

    #[test]
    fn accepts_camel_case_aliases() {
        let raw = json!({
            "killID": 1001,
            "solarSystemID": 30000142,
            "killTime": "2024-01-01T00:00:00Z",
            "victim": {"characterID": 100},
            "attackers": [{"characterID": 200, "finalBlow": true}],
        });
        let cutoff = DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let outcome = normalize_and_filter(&raw, None, cutoff).unwrap();
        match outcome {
            NormalizedOutcome::Fresh(km) => {
                assert_eq!(km.killmail_id, 1001);
                assert_eq!(km.victim.character_id, Some(100));
                assert!(km.attackers[0].final_blow);
            }
            NormalizedOutcome::Older => panic!("expected fresh"),
        }
    }

    #[test]
    fn rejects_missing_required_field() {
        let raw = json!({"solar_system_id": 30000142});
        let cutoff = DateTime::<Utc>::MIN_UTC;
        let err = normalize_and_filter(&raw, None, cutoff).unwrap_err();
        assert!(matches!(err, ParseError::MissingRequiredFields(_)));
    }

    #[test]
    fn skips_killmails_older_than_cutoff() {
        let raw = sample_killmail("2020-01-01T00:00:00Z");
        let cutoff = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let outcome = normalize_and_filter(&raw, None, cutoff).unwrap();
        assert!(matches!(outcome, NormalizedOutcome::Older));
    }

    #[test]
    fn rejects_invalid_time() {
        let raw = sample_killmail("not-a-time");
        let err = normalize_and_filter(&raw, None, DateTime::<Utc>::MIN_UTC).unwrap_err();
        assert!(matches!(err, ParseError::InvalidTime(_)));
    }
}
