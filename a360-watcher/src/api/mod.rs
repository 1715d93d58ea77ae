//! HTTP surface: status push channel and health check

pub mod health;
pub mod ws;

pub use health::{health_check, health_routes, HealthResponse};
pub use ws::{ws_handler, ws_routes};
