//! Connection Hub
//!
//! Process-local registry of live connections and the message router on top
//! of it.
//!
//! Membership changes (register, unregister) and broadcasts go through one
//! control task fed by three channels, so they never interleave. Each request
//! carries a oneshot that the control task completes once the request has been
//! applied; callers await it, which keeps "register then start pumps" ordered.
//! Direct sends and online queries read the membership map concurrently and
//! never mutate it.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::connection::{Connection, SendError};
use crate::domain::{OfflineMessage, OfflineStore, PresenceStore, WireMessage};
use crate::infrastructure::{metrics, Backends};
use crate::shared::error::AppError;

/// Sender recorded on server-originated notifications.
pub const SYSTEM_SENDER: &str = "system";

/// Capacity of each control channel.
const CONTROL_QUEUE: usize = 64;

/// Collaborators the hub needs, assembled once at startup.
#[derive(Clone)]
pub struct HubContext {
    pub server_id: String,
    pub presence: Option<Arc<dyn PresenceStore>>,
    pub cache_store: Option<Arc<dyn OfflineStore>>,
    pub log_store: Option<Arc<dyn OfflineStore>>,
}

impl HubContext {
    /// A context with presence and offline buffering disabled.
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            presence: None,
            cache_store: None,
            log_store: None,
        }
    }

    pub fn from_backends(server_id: impl Into<String>, backends: Backends) -> Self {
        Self {
            server_id: server_id.into(),
            presence: backends.presence,
            cache_store: backends.cache_store,
            log_store: backends.log_store,
        }
    }

    pub fn with_presence(mut self, presence: Arc<dyn PresenceStore>) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn with_cache_store(mut self, store: Arc<dyn OfflineStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    pub fn with_log_store(mut self, store: Arc<dyn OfflineStore>) -> Self {
        self.log_store = Some(store);
        self
    }

    /// Every enabled offline backend; undeliverable messages go to all of them.
    pub fn offline_stores(&self) -> impl Iterator<Item = &Arc<dyn OfflineStore>> {
        self.cache_store.iter().chain(self.log_store.iter())
    }

    /// The backend replayed on connect. The cache store wins when both are
    /// enabled, so a message is not replayed twice.
    pub fn replay_store(&self) -> Option<&Arc<dyn OfflineStore>> {
        self.cache_store.as_ref().or(self.log_store.as_ref())
    }
}

impl std::fmt::Debug for HubContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubContext")
            .field("server_id", &self.server_id)
            .field("presence", &self.presence.is_some())
            .field("cache_store", &self.cache_store.as_ref().map(|s| s.backend()))
            .field("log_store", &self.log_store.as_ref().map(|s| s.backend()))
            .finish()
    }
}

/// Live connections by connection id.
///
/// Only the control task calls the mutating methods.
#[derive(Debug, Default)]
struct Membership {
    connections: DashMap<String, Arc<Connection>>,
}

impl Membership {
    fn insert(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id().to_string(), conn);
    }

    fn remove(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections.remove(connection_id).map(|(_, conn)| conn)
    }

    /// First open connection of `user_id`.
    fn find_user(&self, user_id: &str) -> Option<Arc<Connection>> {
        self.connections
            .iter()
            .find(|entry| entry.user_id() == user_id && !entry.outbound().is_closed())
            .map(|entry| entry.value().clone())
    }

    fn has_user(&self, user_id: &str) -> bool {
        self.connections.iter().any(|entry| entry.user_id() == user_id)
    }

    fn users(&self) -> BTreeSet<String> {
        self.connections
            .iter()
            .map(|entry| entry.user_id().to_string())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|entry| entry.value().clone()).collect()
    }

    fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    fn len(&self) -> usize {
        self.connections.len()
    }
}

/// A control request and its completion signal.
struct Command<T> {
    item: T,
    done: oneshot::Sender<()>,
}

/// Handle to the hub. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    members: Arc<Membership>,
    ctx: Arc<HubContext>,
    register_tx: mpsc::Sender<Command<Arc<Connection>>>,
    unregister_tx: mpsc::Sender<Command<Arc<Connection>>>,
    broadcast_tx: mpsc::Sender<Command<Utf8Bytes>>,
}

impl Hub {
    /// Spawn the control task and return a handle to it.
    ///
    /// The task runs until every handle has been dropped.
    pub fn start(ctx: HubContext) -> Self {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_QUEUE);
        let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_QUEUE);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(CONTROL_QUEUE);

        let members = Arc::new(Membership::default());
        let ctx = Arc::new(ctx);

        info!(
            server_id = %ctx.server_id,
            presence = ctx.presence.is_some(),
            offline = ?ctx.offline_stores().map(|s| s.backend()).collect::<Vec<_>>(),
            "Hub started"
        );

        let control = ControlLoop {
            members: members.clone(),
            ctx: ctx.clone(),
            register_rx,
            unregister_rx,
            broadcast_rx,
        };
        tokio::spawn(control.run());

        Self {
            members,
            ctx,
            register_tx,
            unregister_tx,
            broadcast_tx,
        }
    }

    pub fn context(&self) -> &HubContext {
        &self.ctx
    }

    /// Add a connection and refresh its presence record.
    pub async fn register(&self, conn: Arc<Connection>) {
        submit(&self.register_tx, conn).await;
    }

    /// Remove a connection and close its queue. Safe to repeat.
    pub async fn unregister(&self, conn: Arc<Connection>) {
        submit(&self.unregister_tx, conn).await;
    }

    /// Enqueue `payload` on every local connection; full queues are evicted.
    pub async fn broadcast(&self, payload: Utf8Bytes) {
        submit(&self.broadcast_tx, payload).await;
    }

    /// Deliver `payload` to one local connection of `user_id`, or buffer it
    /// offline.
    ///
    /// Only a payload that cannot be decoded for offline storage is an error;
    /// backend failures are logged and the message is dropped.
    pub async fn send_to_user(&self, user_id: &str, payload: Utf8Bytes) -> Result<(), AppError> {
        if let Some(conn) = self.members.find_user(user_id) {
            match conn.outbound().try_push(payload.clone()) {
                Ok(()) => {
                    debug!(user_id = %user_id, connection_id = %conn.id(), "Delivered locally");
                    return Ok(());
                }
                Err(reason) => {
                    warn!(
                        user_id = %user_id,
                        connection_id = %conn.id(),
                        reason = %reason,
                        "Evicting unreachable connection"
                    );
                    let full = full_queue_evictions([&reason]);
                    if full > 0 {
                        metrics::record_evictions(full);
                    }
                    conn.outbound().close();
                    self.unregister(conn).await;
                }
            }
        }

        self.store_offline(user_id, &payload).await
    }

    async fn store_offline(&self, user_id: &str, payload: &Utf8Bytes) -> Result<(), AppError> {
        if self.ctx.offline_stores().next().is_none() {
            metrics::record_route("dropped");
            warn!(user_id = %user_id, "Recipient offline and no offline store enabled, dropping message");
            return Ok(());
        }

        let message: WireMessage = serde_json::from_str(payload.as_str())?;
        let offline = OfflineMessage::from_wire(message, user_id, Utc::now());
        metrics::record_route("offline");

        for store in self.ctx.offline_stores() {
            match store.store_message(&offline).await {
                Ok(()) => {
                    metrics::record_offline_store(store.backend(), true);
                    debug!(
                        user_id = %user_id,
                        message_id = %offline.id,
                        backend = store.backend(),
                        "Stored offline message"
                    );
                }
                Err(e) => {
                    metrics::record_offline_store(store.backend(), false);
                    error!(
                        user_id = %user_id,
                        backend = store.backend(),
                        error = %e,
                        "Failed to store offline message"
                    );
                }
            }
        }
        Ok(())
    }

    /// Send a server-originated message. `from` is always the system sender.
    pub async fn notify(&self, mut message: WireMessage) -> Result<(), AppError> {
        message.stamp(SYSTEM_SENDER, Utc::now());
        let payload: Utf8Bytes = serde_json::to_string(&message)?.into();

        match message.to.as_deref() {
            Some(to) => self.send_to_user(to, payload).await,
            None => {
                self.broadcast(payload).await;
                Ok(())
            }
        }
    }

    /// Users online anywhere in the fleet.
    ///
    /// Falls back to this server's connections when presence is disabled or
    /// the presence backend fails.
    pub async fn online_users(&self) -> BTreeSet<String> {
        if let Some(presence) = &self.ctx.presence {
            match presence.online_users().await {
                Ok(users) => return users.into_iter().collect(),
                Err(e) => error!(error = %e, "Presence lookup failed, using local membership"),
            }
        }
        self.members.users()
    }

    pub async fn is_user_online(&self, user_id: &str) -> bool {
        if let Some(presence) = &self.ctx.presence {
            match presence.is_online(user_id).await {
                Ok(online) => return online,
                Err(e) => error!(user_id = %user_id, error = %e, "Presence lookup failed, using local membership"),
            }
        }
        self.members.has_user(user_id)
    }

    /// Users connected to this server.
    pub fn local_users(&self) -> BTreeSet<String> {
        self.members.users()
    }

    pub fn connection_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.members.contains(connection_id)
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("ctx", &self.ctx)
            .field("connections", &self.members.len())
            .finish()
    }
}

/// Refusals that count as slow-consumer evictions. A closed queue belongs
/// to a connection that is already going away.
fn full_queue_evictions<'a>(reasons: impl IntoIterator<Item = &'a SendError>) -> usize {
    reasons
        .into_iter()
        .filter(|reason| **reason == SendError::QueueFull)
        .count()
}

async fn submit<T>(tx: &mpsc::Sender<Command<T>>, item: T) {
    let (done, ack) = oneshot::channel();
    if tx.send(Command { item, done }).await.is_err() {
        error!("Hub control loop is not running");
        return;
    }
    let _ = ack.await;
}

/// The single writer of the membership map.
struct ControlLoop {
    members: Arc<Membership>,
    ctx: Arc<HubContext>,
    register_rx: mpsc::Receiver<Command<Arc<Connection>>>,
    unregister_rx: mpsc::Receiver<Command<Arc<Connection>>>,
    broadcast_rx: mpsc::Receiver<Command<Utf8Bytes>>,
}

impl ControlLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.register_rx.recv() => {
                    self.register(cmd.item).await;
                    let _ = cmd.done.send(());
                }
                Some(cmd) = self.unregister_rx.recv() => {
                    self.unregister(cmd.item).await;
                    let _ = cmd.done.send(());
                }
                Some(cmd) = self.broadcast_rx.recv() => {
                    self.broadcast(cmd.item).await;
                    let _ = cmd.done.send(());
                }
                else => break,
            }
        }
        debug!(server_id = %self.ctx.server_id, "Hub control loop stopped");
    }

    async fn register(&self, conn: Arc<Connection>) {
        let user_id = conn.user_id().to_string();
        let connection_id = conn.id().to_string();
        self.members.insert(conn);
        metrics::set_active_connections(self.members.len());

        if let Some(presence) = &self.ctx.presence {
            if let Err(e) = presence.mark_online(&user_id).await {
                error!(user_id = %user_id, error = %e, "Failed to record presence");
            }
        }

        info!(
            user_id = %user_id,
            connection_id = %connection_id,
            server_id = %self.ctx.server_id,
            "Connection registered"
        );
    }

    async fn unregister(&self, conn: Arc<Connection>) {
        conn.outbound().close();

        if self.members.remove(conn.id()).is_none() {
            debug!(connection_id = %conn.id(), "Connection already unregistered");
            return;
        }
        metrics::set_active_connections(self.members.len());
        self.release_presence(conn.user_id()).await;

        info!(
            user_id = %conn.user_id(),
            connection_id = %conn.id(),
            "Connection unregistered"
        );
    }

    async fn broadcast(&self, payload: Utf8Bytes) {
        let mut evicted = Vec::new();
        let mut delivered = 0usize;

        for conn in self.members.snapshot() {
            match conn.outbound().try_push(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(reason) => {
                    warn!(
                        user_id = %conn.user_id(),
                        connection_id = %conn.id(),
                        reason = %reason,
                        "Evicting connection during broadcast"
                    );
                    evicted.push((conn, reason));
                }
            }
        }

        let full = full_queue_evictions(evicted.iter().map(|(_, reason)| reason));
        if full > 0 {
            metrics::record_evictions(full);
        }
        for (conn, _) in evicted {
            conn.outbound().close();
            if self.members.remove(conn.id()).is_some() {
                self.release_presence(conn.user_id()).await;
            }
        }
        metrics::set_active_connections(self.members.len());

        debug!(delivered = delivered, "Broadcast complete");
    }

    /// Drop the presence record once the user has no local connection left.
    async fn release_presence(&self, user_id: &str) {
        let Some(presence) = &self.ctx.presence else {
            return;
        };
        if self.members.has_user(user_id) {
            return;
        }
        if let Err(e) = presence.mark_offline(user_id).await {
            error!(user_id = %user_id, error = %e, "Failed to clear presence");
        }
    }
}
