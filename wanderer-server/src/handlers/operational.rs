//! Flat operational routes: health/ping/metrics plus direct killmail lookups
//! (§4.11, §6) that sit outside the `/api/v1` subscription surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::app_state::AppState;
use crate::errors::{AppError, AppResult};
use crate::validation;

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let events_in_store: u64 = 0;
    let snapshot = state.metrics.snapshot(state.subscriptions.count(), state.connections.count(), events_in_store);

    let body = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {
            "active_subscriptions": snapshot.active_subscriptions,
            "active_ws_sessions": snapshot.active_ws_sessions,
        }
    });
    (StatusCode::OK, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state
        .metrics
        .snapshot(state.subscriptions.count(), state.connections.count(), 0);
    Json(serde_json::to_value(snapshot).unwrap_or_else(|_| json!({})))
}

pub async fn get_killmail(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let killmail_id = validation::parse_killmail_id(&id)?;
    match state.event_store.get_killmail(killmail_id) {
        Some(killmail) => Ok(Json(serde_json::to_value(killmail).map_err(|e| AppError::internal(e.to_string()))?)),
        None => Err(AppError::not_found(format!("killmail {killmail_id} not found"))),
    }
}

pub async fn system_killmails(State(state): State<AppState>, Path(system_id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let system_id = validation::parse_system_id(&system_id)?;
    let killmails = state.event_store.list_by_system(system_id);
    Ok(Json(serde_json::to_value(killmails).map_err(|e| AppError::internal(e.to_string()))?))
}

pub async fn system_kill_count(State(state): State<AppState>, Path(system_id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    let system_id = validation::parse_system_id(&system_id)?;
    Ok(Json(json!({ "count": state.event_store.kill_count(system_id) })))
}

#[derive(Debug, Deserialize)]
pub struct KillfeedParams {
    pub client_id: String,
    pub systems: String,
}

pub async fn killfeed(State(state): State<AppState>, Query(params): Query<KillfeedParams>) -> AppResult<impl IntoResponse> {
    validation::validate_client_id(&params.client_id)?;
    let system_ids = validation::parse_system_id_list(&params.systems)?;
    let events = state.event_store.fetch_for_client(&params.client_id, &system_ids);
    if events.is_empty() {
        info!(client_id = %params.client_id, "killfeed poll returned no new events");
        Ok((StatusCode::NO_CONTENT, Json(json!({}))))
    } else {
        Ok((StatusCode::OK, Json(json!({ "events": events }))))
    }
}

pub async fn killfeed_next(State(state): State<AppState>, Query(params): Query<KillfeedParams>) -> AppResult<impl IntoResponse> {
    validation::validate_client_id(&params.client_id)?;
    let system_ids = validation::parse_system_id_list(&params.systems)?;
    match state.event_store.fetch_one(&params.client_id, &system_ids) {
        Some(event) => Ok((StatusCode::OK, Json(serde_json::to_value(event).map_err(|e| AppError::internal(e.to_string()))?))),
        None => Ok((StatusCode::NO_CONTENT, Json(json!({})))),
    }
}
