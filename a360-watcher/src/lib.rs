//! a360-watcher library interface
//!
//! The binary wires these pieces together; integration tests drive them directly.

pub mod api;
pub mod broadcaster;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod services;

pub use crate::error::{LedgerError, LedgerResult, WatchError};

use axum::Router;
use broadcaster::Broadcaster;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// State shared by the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Connected push-channel clients
    pub broadcaster: Arc<Broadcaster>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster,
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ws_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
