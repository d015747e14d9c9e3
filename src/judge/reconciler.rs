//! Crash recovery
//!
//! On startup every server's `task_number` is recounted from JUDGING
//! submissions. Afterwards each tick replays saved verdicts that never got
//! finalized, requeues submissions that died mid-judge, and pings enabled
//! servers whose heartbeat went quiet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::{
    config::{DispatchConfig, JudgeConfig},
    error::AppResult,
    judge::{
        client::SandboxClient,
        queue::{JudgeTask, TaskQueue},
    },
    models::{HeartbeatRecord, JudgeServer},
    store::{JudgeStore, ServerRegistry},
};

/// What one reconciliation pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub finalized: usize,
    pub requeued: usize,
    pub revived: usize,
}

pub struct Reconciler {
    registry: Arc<dyn ServerRegistry>,
    store: Arc<dyn JudgeStore>,
    queue: Arc<dyn TaskQueue>,
    sandbox: Arc<dyn SandboxClient>,
    judge: JudgeConfig,
    dispatch: DispatchConfig,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        store: Arc<dyn JudgeStore>,
        queue: Arc<dyn TaskQueue>,
        sandbox: Arc<dyn SandboxClient>,
        judge: JudgeConfig,
        dispatch: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            store,
            queue,
            sandbox,
            judge,
            dispatch,
        }
    }

    /// Recount slots before any dispatcher starts
    pub async fn startup(&self) -> AppResult<()> {
        self.registry.rebuild_task_numbers().await?;
        tracing::info!("Rebuilt judge server task numbers");
        Ok(())
    }

    /// Run `tick` every reconcile interval until shutdown
    pub async fn run(self, shutdown: Arc<AtomicBool>) {
        let mut interval = tokio::time::interval(self.dispatch.reconcile_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !shutdown.load(Ordering::SeqCst) {
            interval.tick().await;
            match self.tick(Utc::now()).await {
                Ok(summary) if summary != ReconcileSummary::default() => {
                    tracing::info!(
                        "Reconciled: {} finalized, {} requeued, {} servers revived",
                        summary.finalized,
                        summary.requeued,
                        summary.revived
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Reconciliation failed: {}", e),
            }
        }

        tracing::info!("Reconciler shutting down");
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();

        let stuck = self.store.stuck_submissions(self.stuck_cutoff(now)).await?;

        for submission in stuck {
            if submission.pending_outcome.is_some() {
                // Verdict known and slot already returned; only the transaction is missing
                if self
                    .store
                    .finalize(&submission.id, self.judge.acm_penalty_secs)
                    .await?
                    .is_some()
                {
                    summary.finalized += 1;
                }
                continue;
            }

            if let Some(server_id) = self.store.reset_to_pending(&submission.id).await? {
                self.registry.release(server_id).await?;
            }
            self.queue
                .push(&JudgeTask::new(&submission.id, submission.problem_id))
                .await?;
            tracing::warn!("Requeued stuck submission {}", submission.id);
            summary.requeued += 1;
        }

        if self.dispatch.probe_stale_servers {
            summary.revived = self.probe_stale_servers(now).await?;
        }

        Ok(summary)
    }

    /// JUDGING rows started before this cannot belong to a live attempt
    fn stuck_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let budget = chrono::Duration::from_std(self.judge.attempt_budget())
            .unwrap_or(self.dispatch.stuck_after);
        now - self.dispatch.stuck_after.max(budget)
    }

    /// Ping enabled servers that missed their heartbeat; a reply counts as one
    async fn probe_stale_servers(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let stale: Vec<JudgeServer> = self
            .registry
            .list()
            .await?
            .into_iter()
            .filter(|s| !s.is_disabled && s.service_url.is_some())
            .filter(|s| !s.is_alive(now, self.judge.heartbeat_window))
            .collect();

        let probes = stale.iter().map(|server| async move {
            let url = server.service_url.as_deref().unwrap_or_default();
            (server, self.sandbox.ping(url).await)
        });

        let mut revived = 0;
        for (server, ping) in join_all(probes).await {
            match ping {
                Ok(info) => {
                    let record = HeartbeatRecord {
                        hostname: server.hostname.clone(),
                        ip: server.ip.clone(),
                        judger_version: info.judger_version,
                        cpu_core: server.cpu_core,
                        memory_usage: info.memory,
                        cpu_usage: info.cpu,
                        service_url: None,
                    };
                    self.registry.heartbeat(record, Utc::now()).await?;
                    revived += 1;
                }
                Err(e) => {
                    tracing::debug!("Judge server {} unreachable: {}", server.hostname, e);
                }
            }
        }
        Ok(revived)
    }
}
