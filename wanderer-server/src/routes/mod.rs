pub mod v1;

use axum::routing::get;
use axum::Router;

use crate::app_state::AppState;
use crate::handlers::{operational, websocket};

/// Builds the full router: `/api/v1` nested alongside flat operational and
/// killfeed-polling routes and the raw WebSocket upgrade (§4.12).
pub fn create_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/api/v1", v1::create_v1_router(state.clone()))
        .route("/ping", get(operational::ping))
        .route("/health", get(operational::health))
        .route("/metrics", get(operational::metrics))
        .route("/killmail/:id", get(operational::get_killmail))
        .route("/system_killmails/:system_id", get(operational::system_killmails))
        .route("/system_kill_count/:system_id", get(operational::system_kill_count))
        .route("/api/killfeed", get(operational::killfeed))
        .route("/api/killfeed/next", get(operational::killfeed_next))
        .route("/socket/websocket", get(websocket::upgrade))
}
