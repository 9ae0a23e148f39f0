//! WebSocket Connection
//!
//! One `Connection` per live socket. It owns the bounded outbound queue and
//! the liveness timestamps; the two pumps in this module move frames between
//! the socket and the hub.
//!
//! ```text
//!   socket stream --> read_pump --> Hub (send_to_user / broadcast)
//!                                          |
//!   socket sink  <-- write_pump <-- Outbound queue <--+
//! ```

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use super::hub::Hub;
use crate::config::HubSettings;
use crate::domain::{Route, WireMessage};
use crate::infrastructure::metrics;

/// Why an enqueue was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("outbound queue is full")]
    QueueFull,

    #[error("outbound queue is closed")]
    Closed,
}

/// Closable sending half of a connection's outbound queue.
///
/// Any task may push; only the write pump receives. Closing drops the sender,
/// so the write pump drains what is already queued and then sees the end.
#[derive(Debug)]
pub struct Outbound {
    tx: Mutex<Option<mpsc::Sender<Utf8Bytes>>>,
}

impl Outbound {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Enqueue without waiting.
    pub fn try_push(&self, payload: Utf8Bytes) -> Result<(), SendError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(SendError::Closed);
        };
        tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Close the queue. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .as_ref()
            .map(|tx| tx.is_closed())
            .unwrap_or(true)
    }
}

/// A live client connection.
#[derive(Debug)]
pub struct Connection {
    id: String,
    user_id: String,
    outbound: Outbound,
    last_ping: Mutex<Instant>,
    last_activity: Mutex<Instant>,
    shutdown: Notify,
}

impl Connection {
    /// Create a connection for `user_id` with an outbound queue of `capacity`.
    ///
    /// The id combines the user id with a time-ordered UUID, so a user who
    /// reconnects never reuses an id.
    pub fn new(
        user_id: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Utf8Bytes>) {
        let user_id = user_id.into();
        let (outbound, queue) = Outbound::channel(capacity);
        let now = Instant::now();
        let conn = Self {
            id: format!("{}:{}", user_id, Uuid::now_v7()),
            user_id,
            outbound,
            last_ping: Mutex::new(now),
            last_activity: Mutex::new(now),
            shutdown: Notify::new(),
        };
        (Arc::new(conn), queue)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Note inbound traffic of any kind.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Note a heartbeat from the client.
    pub fn record_ping(&self) {
        let now = Instant::now();
        *self.last_ping.lock() = now;
        *self.last_activity.lock() = now;
    }

    pub fn last_ping(&self) -> Instant {
        *self.last_ping.lock()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Ask the read pump to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn shutdown_requested(&self) {
        self.shutdown.notified().await
    }
}

/// Timing knobs for the write pump.
#[derive(Debug, Clone, Copy)]
pub struct PumpSettings {
    pub heartbeat_interval: Duration,
    pub client_timeout: Option<Duration>,
}

impl From<&HubSettings> for PumpSettings {
    fn from(settings: &HubSettings) -> Self {
        Self {
            heartbeat_interval: settings.heartbeat_interval(),
            client_timeout: settings.client_timeout(),
        }
    }
}

/// Drain the outbound queue to the socket and send heartbeats.
///
/// Stops on a write error, when the queue is closed (after sending a close
/// frame), or when the client has been idle past `client_timeout`. On exit the
/// read pump is told to stop.
pub async fn write_pump<S>(
    conn: Arc<Connection>,
    mut queue: mpsc::Receiver<Utf8Bytes>,
    mut sink: S,
    settings: PumpSettings,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let period = settings.heartbeat_interval;
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = queue.recv() => match next {
                Some(payload) => {
                    if let Err(e) = sink.send(Message::Text(payload)).await {
                        tracing::debug!(connection_id = %conn.id(), error = %e, "Write failed");
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    tracing::debug!(connection_id = %conn.id(), "Outbound queue closed");
                    break;
                }
            },

            _ = heartbeat.tick() => {
                if let Some(timeout) = settings.client_timeout {
                    if conn.idle_for() >= timeout {
                        tracing::info!(
                            connection_id = %conn.id(),
                            user_id = %conn.user_id(),
                            "Idle timeout, closing connection"
                        );
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    tracing::debug!(connection_id = %conn.id(), error = %e, "Ping failed");
                    break;
                }
                tracing::trace!(connection_id = %conn.id(), "Ping sent");
            }
        }
    }

    let _ = sink.close().await;
    conn.shutdown();
}

/// Read frames until the peer goes away, then unregister.
///
/// This is the only place a connection leaves the hub on its own.
pub async fn read_pump<R, E>(conn: Arc<Connection>, hub: Hub, mut stream: R)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            _ = conn.shutdown_requested() => {
                tracing::debug!(connection_id = %conn.id(), "Write side stopped");
                break;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                conn.touch();
                handle_frame(&conn, &hub, text.as_str()).await;
            }
            Some(Ok(Message::Binary(data))) => {
                conn.touch();
                match std::str::from_utf8(&data) {
                    Ok(text) => handle_frame(&conn, &hub, text).await,
                    Err(_) => {
                        metrics::record_rejected_frame();
                        tracing::debug!(connection_id = %conn.id(), "Discarding non-UTF-8 frame");
                    }
                }
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => conn.record_ping(),
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(connection_id = %conn.id(), "Connection closed by peer");
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Read failed");
                break;
            }
        }
    }

    hub.unregister(conn).await;
}

/// Decode one inbound frame and route it.
///
/// Malformed frames are dropped; the connection stays up.
pub async fn handle_frame(conn: &Connection, hub: &Hub, text: &str) {
    let mut message: WireMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            metrics::record_rejected_frame();
            tracing::debug!(connection_id = %conn.id(), error = %e, "Discarding malformed frame");
            return;
        }
    };
    message.stamp(conn.user_id(), Utc::now());

    match message.route() {
        Route::Heartbeat => {
            conn.record_ping();
            metrics::record_route("heartbeat");
            tracing::trace!(connection_id = %conn.id(), "Heartbeat received");
        }
        Route::Ignore => {
            metrics::record_route("ignored");
            tracing::debug!(
                connection_id = %conn.id(),
                kind = %message.kind,
                "Ignoring unroutable message"
            );
        }
        Route::Direct(to) => {
            let Some(payload) = encode(conn, &message) else {
                return;
            };
            metrics::record_route("direct");
            tracing::debug!(from = %conn.user_id(), to = %to, kind = %message.kind, "Routing message");
            if let Err(e) = hub.send_to_user(to, payload).await {
                tracing::warn!(from = %conn.user_id(), to = %to, error = %e, "Direct delivery failed");
            }
        }
        Route::Broadcast => {
            let Some(payload) = encode(conn, &message) else {
                return;
            };
            metrics::record_route("broadcast");
            tracing::debug!(from = %conn.user_id(), "Broadcasting message");
            hub.broadcast(payload).await;
        }
    }
}

fn encode(conn: &Connection, message: &WireMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text.into()),
        Err(e) => {
            tracing::error!(connection_id = %conn.id(), error = %e, "Failed to encode message");
            None
        }
    }
}
