//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;

use crate::config::Settings;
use crate::infrastructure::{self, Backends};
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::{Hub, HubContext};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Start a hub over `backends` and wrap it with `settings`.
    pub fn new(settings: Settings, backends: Backends) -> Self {
        let ctx = HubContext::from_backends(settings.hub.server_id.clone(), backends);
        Self {
            hub: Hub::start(ctx),
            settings: Arc::new(settings),
        }
    }
}

/// Build the router with middleware
pub fn build_router(state: AppState) -> Router {
    let cors = cors::create_cors_layer(&state.settings.cors);
    routes::create_router(state)
        .layer(logging::create_trace_layer())
        .layer(cors)
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        // Presence and offline stores
        let backends = infrastructure::connect_backends(&settings).await?;
        tracing::info!(backends = ?backends, "Storage backends connected");

        let addr = settings.server_addr();
        let state = AppState::new(settings, backends);
        let router = build_router(state);

        // Bind to address
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
