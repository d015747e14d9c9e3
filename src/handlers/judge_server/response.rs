//! Judge server response DTOs

use serde::Serialize;

/// Success envelope workers expect: `{"error": null, "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub error: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { error: None, data }
    }
}

/// Heartbeat acknowledgement
#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub status: String,
}
