//! Judge server authentication
//!
//! Workers send `sha256_hex(judge_server_token)` in `X-Judge-Server-Token`.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use tracing::debug;

use crate::{
    constants::JUDGE_SERVER_TOKEN_HEADER, error::AppError, state::AppState,
    utils::verify_token_hash,
};

/// A caller that presented the judge server token
#[derive(Debug, Clone)]
pub struct VerifiedJudgeServer {
    /// `X-Real-IP`, else the first `X-Forwarded-For` hop, else the TCP peer
    pub ip: Option<String>,
}

impl FromRequestParts<AppState> for VerifiedJudgeServer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(JUDGE_SERVER_TOKEN_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();

        if !verify_token_hash(provided, state.judge_config().token_hash()) {
            debug!(path = %parts.uri.path(), "Judge server token mismatch");
            return Err(AppError::InvalidToken);
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self {
            ip: forwarded_ip(&parts.headers).or(peer),
        })
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-real-ip")
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|list| list.split(',').next())
                .map(str::trim)
        })
        .map(str::to_string)
}
