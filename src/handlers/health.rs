//! Health check handlers

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::{
    error::AppResult,
    services::{HeartbeatService, PoolSummary},
    state::AppState,
};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub judge_servers: PoolSummary,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let judge_servers = HeartbeatService::summary(
        state.registry(),
        Utc::now(),
        state.judge_config().heartbeat_window,
    )
    .await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        judge_servers,
    }))
}

/// Health routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::JudgeConfig,
        models::judge_server::fixtures::heartbeat,
        store::{MemoryStore, ServerRegistry},
    };

    #[tokio::test]
    async fn test_health_reports_pool() {
        let config = JudgeConfig::new("secret");
        let store = Arc::new(MemoryStore::new(&config));
        store.heartbeat(heartbeat("judge-a", 2), Utc::now()).await.unwrap();
        store
            .heartbeat(heartbeat("judge-b", 2), Utc::now() - chrono::Duration::seconds(30))
            .await
            .unwrap();

        let app = routes().with_state(AppState::new(store, config));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["judge_servers"]["normal"], 1);
        assert_eq!(body["judge_servers"]["abnormal"], 1);
        assert_eq!(body["judge_servers"]["disabled"], 0);
    }
}
