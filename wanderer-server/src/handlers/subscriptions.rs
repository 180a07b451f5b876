//! `/api/v1/subscriptions` CRUD (§6): create (webhook sink), list, delete by
//! the caller-supplied `subscriber_id`.

use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub subscriber_id: String,
    #[serde(default)]
    pub system_ids: HashSet<i64>,
    #[serde(default)]
    pub character_ids: HashSet<i64>,
    pub callback_url: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSubscriptionResponse {
    pub subscription_id: uuid::Uuid,
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CreateSubscriptionRequest>) -> AppResult<impl IntoResponse> {
    let subscription_id = state.subscriptions.create(
        req.subscriber_id,
        req.system_ids,
        req.character_ids,
        req.callback_url,
        chrono::Utc::now(),
    )?;
    Ok((StatusCode::CREATED, Json(CreateSubscriptionResponse { subscription_id })))
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<wanderer_core::models::Subscription>> {
    Json(state.subscriptions.list())
}

pub async fn delete(State(state): State<AppState>, Path(subscriber_id): Path<String>) -> AppResult<StatusCode> {
    match state.subscriptions.remove(&subscriber_id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(AppError::not_found(format!("no subscription for subscriber_id {subscriber_id:?}"))),
    }
}
