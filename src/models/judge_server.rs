//! Judge server (sandbox worker) model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Registry row for one sandbox worker
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct JudgeServer {
    pub id: i64,
    pub hostname: String,
    pub ip: Option<String>,
    pub judger_version: String,
    pub cpu_core: i32,
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub last_heartbeat: DateTime<Utc>,
    pub create_time: DateTime<Utc>,
    /// Judge tasks currently assigned to this worker
    pub task_number: i32,
    pub service_url: Option<String>,
    pub is_disabled: bool,
}

/// Derived health of a judge server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Normal,
    Abnormal,
}

impl JudgeServer {
    /// Whether the last heartbeat falls inside the liveness window
    pub fn is_alive(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.last_heartbeat) < window
    }

    /// `normal` iff alive and not disabled
    pub fn status(&self, now: DateTime<Utc>, window: Duration) -> ServerStatus {
        if !self.is_disabled && self.is_alive(now, window) {
            ServerStatus::Normal
        } else {
            ServerStatus::Abnormal
        }
    }

    /// Whether the selector may hand this worker another task
    pub fn is_eligible(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status(now, window) == ServerStatus::Normal && self.task_number < self.cpu_core
    }

    /// Whether a heartbeat arriving at `now` should reset `task_number`
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        now.signed_duration_since(self.last_heartbeat) > stale_after
    }
}

/// Values reported by a worker heartbeat (or a successful ping)
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatRecord {
    pub hostname: String,
    pub ip: Option<String>,
    pub judger_version: String,
    pub cpu_core: i32,
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub service_url: Option<String>,
}

impl HeartbeatRecord {
    /// The row a first heartbeat creates
    pub fn into_server(self, id: i64, now: DateTime<Utc>) -> JudgeServer {
        JudgeServer {
            id,
            hostname: self.hostname,
            ip: self.ip,
            judger_version: self.judger_version,
            cpu_core: self.cpu_core,
            memory_usage: self.memory_usage,
            cpu_usage: self.cpu_usage,
            last_heartbeat: now,
            create_time: now,
            task_number: 0,
            service_url: self.service_url,
            is_disabled: false,
        }
    }

    /// Fold a heartbeat into an existing row
    ///
    /// Only usage, version and heartbeat time change; `service_url` only when
    /// the worker sent one. A worker silent for longer than `stale_after`
    /// loses its in-flight count.
    pub fn apply_to(&self, server: &mut JudgeServer, now: DateTime<Utc>, stale_after: Duration) {
        if server.is_stale(now, stale_after) {
            server.task_number = 0;
        }
        server.judger_version = self.judger_version.clone();
        server.memory_usage = self.memory_usage;
        server.cpu_usage = self.cpu_usage;
        if let Some(url) = &self.service_url {
            server.service_url = Some(url.clone());
        }
        server.last_heartbeat = now;
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Heartbeat of a healthy worker reachable at `http://<hostname>:8080`
    pub fn heartbeat(hostname: &str, cpu_core: i32) -> HeartbeatRecord {
        HeartbeatRecord {
            hostname: hostname.to_string(),
            ip: Some("10.0.0.2".to_string()),
            judger_version: "2.1.0".to_string(),
            cpu_core,
            memory_usage: 12.5,
            cpu_usage: 3.0,
            service_url: Some(format!("http://{}:8080", hostname)),
        }
    }
}
