//! `/socket/websocket` upgrade and per-connection receive loop (§4.10).
//! Anonymous connections are allowed; `ORIGIN_HOST`, when configured, is
//! enforced by the CORS layer rather than here.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::websocket::protocol::{ClientEvent, ServerEvent};
use crate::websocket::session::Session;

const OUTBOUND_BUFFER: usize = 256;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_BUFFER);

    let session = Arc::new(Session::new(tx, state.event_store.broker(), state.event_store.clone(), state.metrics.clone()));
    let session_id = session.id;
    state.connections.add(session.clone());
    info!(%session_id, "websocket session connected");

    let outbound = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(%session_id, error = %err, "failed to serialize outgoing websocket event"),
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                session.touch().await;
                handle_client_event(&session, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(%session_id, error = %err, "websocket receive error");
                break;
            }
        }
    }

    outbound.abort();
    session.shutdown().await;
    state.connections.remove(session_id);
    info!(%session_id, "websocket session disconnected");
}

async fn handle_client_event(session: &Arc<Session>, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            let _ = session
                .send(ServerEvent::Error {
                    message: format!("invalid message: {err}"),
                })
                .await;
            return;
        }
    };

    match event {
        ClientEvent::Join { systems } => {
            let subscribed = session.subscribe_systems(&systems.unwrap_or_default()).await;
            let _ = session
                .send(ServerEvent::Connected {
                    subscription_id: session.id,
                    subscribed_systems: subscribed,
                    status: "connected",
                })
                .await;
        }
        ClientEvent::SubscribeSystems { systems } => {
            let subscribed = session.subscribe_systems(&systems).await;
            let _ = session.send(ServerEvent::SubscribedSystems { subscribed_systems: subscribed }).await;
        }
        ClientEvent::UnsubscribeSystems { systems } => {
            let subscribed = session.unsubscribe_systems(&systems).await;
            let _ = session.send(ServerEvent::UnsubscribedSystems { subscribed_systems: subscribed }).await;
        }
        ClientEvent::GetStatus => {
            let _ = session
                .send(ServerEvent::Status {
                    subscription_id: session.id,
                    subscribed_systems: session.subscribed_systems().await,
                    connected_at: session.connected_at,
                    user_id: None,
                })
                .await;
        }
    }
}
