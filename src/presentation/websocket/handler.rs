//! WebSocket Upgrade Handler
//!
//! Accepts `GET /ws?user_id=...`, attaches the new connection to the hub,
//! replays buffered offline messages, and runs the two pumps.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Utf8Bytes, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use validator::Validate;

use super::connection::{read_pump, write_pump, Connection, PumpSettings};
use super::hub::Hub;
use crate::shared::error::AppError;
use crate::shared::validation::validation_error;
use crate::startup::AppState;

/// Query parameters of the upgrade request.
#[derive(Debug, Deserialize, Validate)]
pub struct ConnectParams {
    #[validate(length(max = 128, message = "user_id must be at most 128 characters"))]
    pub user_id: Option<String>,
}

impl ConnectParams {
    /// The caller's identity. It is trusted as given.
    pub fn identity(&self) -> Result<&str, AppError> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing user_id".to_string()))
    }
}

/// WebSocket upgrade handler
///
/// The identity is checked before the upgrade, so a request without one gets
/// a 400 and no connection is created.
pub async fn ws_handler(
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let user_id = params.identity()?.to_string();
    params.validate().map_err(validation_error)?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(user_id = %user_id, error = %rejection, "Upgrade rejected");
            return Ok(rejection.into_response());
        }
    };

    let hub = state.hub.clone();
    let settings = &state.settings.hub;
    let pump = PumpSettings::from(settings);
    let capacity = settings.outbound_queue_capacity;

    Ok(ws
        .max_message_size(settings.max_message_size)
        .write_buffer_size(settings.write_buffer_size)
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| serve_connection(socket, hub, user_id, capacity, pump)))
}

/// Create a connection for `user_id`, register it, and queue its offline
/// backlog. The returned receiver is the connection's outbound queue.
pub async fn attach(
    hub: &Hub,
    user_id: &str,
    capacity: usize,
) -> (Arc<Connection>, mpsc::Receiver<Utf8Bytes>) {
    let (conn, queue) = Connection::new(user_id, capacity);
    hub.register(conn.clone()).await;
    replay_offline(hub, &conn).await;
    (conn, queue)
}

/// Push buffered messages onto the outbound queue without waiting.
///
/// Stops at the first refused push; the rest of the backlog is skipped.
async fn replay_offline(hub: &Hub, conn: &Connection) -> usize {
    let Some(store) = hub.context().replay_store() else {
        return 0;
    };

    let messages = match store.get_offline_messages(conn.user_id()).await {
        Ok(messages) => messages,
        Err(e) => {
            tracing::error!(
                user_id = %conn.user_id(),
                backend = store.backend(),
                error = %e,
                "Failed to load offline messages"
            );
            return 0;
        }
    };

    let total = messages.len();
    let mut replayed = 0;
    for message in messages {
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(message_id = %message.id, error = %e, "Skipping unencodable offline message");
                continue;
            }
        };
        if let Err(reason) = conn.outbound().try_push(payload.into()) {
            tracing::warn!(
                user_id = %conn.user_id(),
                reason = %reason,
                skipped = total - replayed,
                "Offline replay stopped"
            );
            break;
        }
        replayed += 1;
    }

    if total > 0 {
        tracing::info!(
            user_id = %conn.user_id(),
            backend = store.backend(),
            replayed = replayed,
            total = total,
            "Offline messages replayed"
        );
    }
    replayed
}

/// Handle an upgraded socket until it closes.
async fn serve_connection(
    socket: WebSocket,
    hub: Hub,
    user_id: String,
    capacity: usize,
    settings: PumpSettings,
) {
    let (conn, queue) = attach(&hub, &user_id, capacity).await;
    tracing::info!(user_id = %user_id, connection_id = %conn.id(), "User connected");

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_pump(conn.clone(), queue, sink, settings));

    read_pump(conn.clone(), hub, stream).await;
    if let Err(e) = writer.await {
        tracing::error!(connection_id = %conn.id(), error = %e, "Write pump panicked");
    }

    tracing::info!(user_id = %user_id, connection_id = %conn.id(), "User disconnected");
}
