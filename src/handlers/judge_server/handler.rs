//! Judge server handler implementations

use axum::{extract::State, Json};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppResult,
    middleware::judge_token::VerifiedJudgeServer,
    services::HeartbeatService,
    state::AppState,
};

use super::{
    request::HeartbeatRequest,
    response::{ApiResponse, HeartbeatResponse},
};

/// Receive a worker heartbeat
pub async fn heartbeat(
    State(state): State<AppState>,
    caller: VerifiedJudgeServer,
    Json(payload): Json<HeartbeatRequest>,
) -> AppResult<Json<ApiResponse<HeartbeatResponse>>> {
    payload.validate()?;

    HeartbeatService::receive(state.registry(), payload.into_record(caller.ip), Utc::now()).await?;

    Ok(Json(ApiResponse::ok(HeartbeatResponse {
        status: "ok".to_string(),
    })))
}
