//! Judge server handlers

mod handler;
pub mod request;
pub mod response;

pub use handler::*;
pub use request::*;
pub use response::*;

use axum::{routing::post, Router};

use crate::state::AppState;

/// Judge server routes
///
/// Existing worker scripts post to the trailing-slash form.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/judge_server_heartbeat", post(handler::heartbeat))
        .route("/judge_server_heartbeat/", post(handler::heartbeat))
}
