//! Judge server heartbeat service

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{HeartbeatRecord, JudgeServer, ServerStatus},
    store::ServerRegistry,
};

/// Counts of registry rows by derived health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolSummary {
    pub normal: usize,
    pub abnormal: usize,
    pub disabled: usize,
}

/// Heartbeat service for registry updates
pub struct HeartbeatService;

impl HeartbeatService {
    /// Record a worker heartbeat, registering the worker on first contact
    pub async fn receive(
        registry: &dyn ServerRegistry,
        record: HeartbeatRecord,
        now: DateTime<Utc>,
    ) -> AppResult<JudgeServer> {
        let server = registry.heartbeat(record, now).await?;
        if server.create_time == server.last_heartbeat {
            tracing::info!(
                "Registered judge server {} ({} cores, judger {})",
                server.hostname,
                server.cpu_core,
                server.judger_version
            );
        } else {
            tracing::debug!("Heartbeat from {}", server.hostname);
        }

        Ok(server)
    }

    /// Tally the pool for the health endpoint
    pub async fn summary(
        registry: &dyn ServerRegistry,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> AppResult<PoolSummary> {
        let servers = registry.list().await?;

        Ok(servers.iter().fold(PoolSummary::default(), |mut summary, server| {
            if server.is_disabled {
                summary.disabled += 1;
            } else if server.status(now, window) == ServerStatus::Normal {
                summary.normal += 1;
            } else {
                summary.abnormal += 1;
            }
            summary
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::JudgeConfig, store::MemoryStore};

    fn record(hostname: &str, ip: Option<&str>) -> HeartbeatRecord {
        HeartbeatRecord {
            hostname: hostname.to_string(),
            ip: ip.map(str::to_string),
            judger_version: "2.1.0".to_string(),
            cpu_core: 4,
            memory_usage: 30.0,
            cpu_usage: 12.5,
            service_url: Some(format!("http://{}:8080", hostname)),
        }
    }

    #[tokio::test]
    async fn test_first_heartbeat_registers_server() {
        let store = MemoryStore::new(&JudgeConfig::new("secret"));
        let now = Utc::now();

        let server = HeartbeatService::receive(&store, record("judge-a", Some("10.1.1.1")), now)
            .await
            .unwrap();

        assert_eq!(server.hostname, "judge-a");
        assert_eq!(server.ip.as_deref(), Some("10.1.1.1"));
        assert_eq!(server.task_number, 0);
        assert!(!server.is_disabled);
        assert_eq!(server.memory_usage, 30.0);
    }

    #[tokio::test]
    async fn test_summary_buckets() {
        let store = MemoryStore::new(&JudgeConfig::new("secret"));
        let now = Utc::now();
        let window = chrono::Duration::seconds(6);

        for hostname in ["a", "b", "c"] {
            HeartbeatService::receive(&store, record(hostname, None), now)
                .await
                .unwrap();
        }
        HeartbeatService::receive(&store, record("stale", None), now - chrono::Duration::seconds(10))
            .await
            .unwrap();
        store.set_disabled("c", true).await.unwrap();

        let summary = HeartbeatService::summary(&store, now, window).await.unwrap();
        assert_eq!(
            summary,
            PoolSummary {
                normal: 2,
                abnormal: 1,
                disabled: 1,
            }
        );
    }
}
