//! HTTP Request Handlers
//!
//! The controller only faces judge workers and operators: the heartbeat
//! endpoint and a health check.

pub mod health;
pub mod judge_server;

use axum::Router;

use crate::state::AppState;

/// Create all API routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(judge_server::routes())
}
