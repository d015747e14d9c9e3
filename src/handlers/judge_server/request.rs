//! Judge server request DTOs

use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::{
    constants::{HEARTBEAT_ACTION, MAX_HOSTNAME_LENGTH},
    models::HeartbeatRecord,
};

/// Heartbeat posted by a sandbox worker every few seconds
#[derive(Debug, Deserialize, Validate)]
pub struct HeartbeatRequest {
    #[validate(custom(function = "validate_action"))]
    pub action: String,

    #[validate(length(min = 1, max = MAX_HOSTNAME_LENGTH))]
    pub hostname: String,

    #[validate(length(min = 1, max = 64))]
    pub judger_version: String,

    #[validate(range(min = 1))]
    pub cpu_core: i32,

    /// Memory usage percentage
    #[validate(range(min = 0.0, max = 100.0))]
    pub memory: f64,

    /// CPU usage percentage
    #[validate(range(min = 0.0, max = 100.0))]
    pub cpu: f64,

    #[validate(url)]
    pub service_url: Option<String>,
}

impl HeartbeatRequest {
    /// Registry input for this heartbeat, seen from `ip`
    pub fn into_record(self, ip: Option<String>) -> HeartbeatRecord {
        HeartbeatRecord {
            hostname: self.hostname,
            ip,
            judger_version: self.judger_version,
            cpu_core: self.cpu_core,
            memory_usage: self.memory,
            cpu_usage: self.cpu,
            service_url: self.service_url,
        }
    }
}

fn validate_action(action: &str) -> Result<(), ValidationError> {
    if action != HEARTBEAT_ACTION {
        return Err(ValidationError::new("unsupported_action"));
    }
    Ok(())
}
