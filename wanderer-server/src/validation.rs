//! Request-argument validation shared by the polling and subscription
//! handlers (§4.11): `client_id` shape and `system_id` range checks.

use once_cell::sync::Lazy;
use regex::Regex;
use wanderer_core::error::{CoreError, ValidationError};
use wanderer_core::models::{MAX_CHARACTER_ID, MAX_POLLABLE_SYSTEM_ID, MAX_SYSTEM_ID, MIN_POLLABLE_SYSTEM_ID};

static CLIENT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,100}$").unwrap());

pub fn validate_client_id(client_id: &str) -> Result<(), CoreError> {
    if CLIENT_ID_RE.is_match(client_id) {
        Ok(())
    } else {
        Err(CoreError::Validation(ValidationError::InvalidId(format!(
            "client_id {client_id:?} must match [A-Za-z0-9_-]{{1,100}}"
        ))))
    }
}

/// Parses a path segment as a pollable system id in `[30_000_000, 50_000_000]`.
pub fn parse_system_id(raw: &str) -> Result<i64, CoreError> {
    let id: i64 = raw
        .parse()
        .map_err(|_| CoreError::Validation(ValidationError::InvalidId(format!("system_id {raw:?} is not an integer"))))?;
    if !(MIN_POLLABLE_SYSTEM_ID..=MAX_POLLABLE_SYSTEM_ID).contains(&id) {
        return Err(CoreError::Validation(ValidationError::OutOfRange(format!(
            "system_id {id} must lie in [{MIN_POLLABLE_SYSTEM_ID}, {MAX_POLLABLE_SYSTEM_ID}]"
        ))));
    }
    Ok(id)
}

pub fn parse_killmail_id(raw: &str) -> Result<i64, CoreError> {
    raw.parse()
        .map_err(|_| CoreError::Validation(ValidationError::InvalidId(format!("killmail_id {raw:?} is not an integer"))))
}

/// Parses a comma-separated `systems=30000142,30000144` query parameter.
pub fn parse_system_id_list(raw: &str) -> Result<Vec<i64>, CoreError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let id: i64 = s
                .parse()
                .map_err(|_| CoreError::Validation(ValidationError::InvalidId(format!("system id {s:?} is not an integer"))))?;
            if id <= 0 || id > MAX_SYSTEM_ID {
                return Err(CoreError::Validation(ValidationError::OutOfRange(format!(
                    "system id {id} exceeds {MAX_SYSTEM_ID}"
                ))));
            }
            Ok(id)
        })
        .collect()
}

pub fn validate_character_id(id: i64) -> Result<(), CoreError> {
    if id <= 0 || id > MAX_CHARACTER_ID {
        return Err(CoreError::Validation(ValidationError::OutOfRange(format!(
            "character id {id} exceeds {MAX_CHARACTER_ID}"
        ))));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_client_id() {
        assert!(validate_client_id("client-123_ABC").is_ok());
    }

    #[test]
    fn rejects_client_id_with_illegal_characters() {
        assert!(validate_client_id("client id!").is_err());
    }

    #[test]
    fn accepts_pollable_system_id() {
        assert_eq!(parse_system_id("30000142").unwrap(), 30000142);
    }

    #[test]
    fn rejects_system_id_outside_pollable_range() {
        assert!(parse_system_id("1").is_err());
    }

    #[test]
    fn rejects_non_numeric_system_id() {
        assert!(parse_system_id("abc").is_err());
    }

    #[test]
    fn parses_comma_separated_system_list() {
        assert_eq!(parse_system_id_list("30000142, 30000144").unwrap(), vec![30000142, 30000144]);
    }
}
