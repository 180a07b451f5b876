use axum::routing::{delete, post};
use axum::Router;

use crate::app_state::AppState;
use crate::handlers::subscriptions;

/// Subscription CRUD: the only versioned surface (§6). Killfeed polling and
/// operational routes stay flat at the top level alongside this nest.
pub fn create_v1_router(_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/subscriptions", post(subscriptions::create).get(subscriptions::list))
        .route("/subscriptions/:subscriber_id", delete(subscriptions::delete))
}
