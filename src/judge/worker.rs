//! Dispatch workers pulling judge tasks from the queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::DispatchConfig,
    judge::{
        dispatcher::{DispatchReport, Dispatcher},
        queue::{backoff_delay, JudgeTask, TaskQueue},
    },
};

/// One dispatcher loop; run several side by side
pub struct DispatchWorker {
    id: usize,
    dispatcher: Dispatcher,
    queue: Arc<dyn TaskQueue>,
    config: DispatchConfig,
    shutdown: Arc<AtomicBool>,
}

impl DispatchWorker {
    pub fn new(
        id: usize,
        dispatcher: Dispatcher,
        queue: Arc<dyn TaskQueue>,
        config: DispatchConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            dispatcher,
            queue,
            config,
            shutdown,
        }
    }

    /// Run until the shutdown flag is raised
    pub async fn run(self) {
        tracing::info!("Dispatch worker {} started", self.id);

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.queue.promote_due().await {
                tracing::warn!("Worker {}: failed to promote delayed tasks: {}", self.id, e);
            }

            match self.queue.pop(self.config.queue_block_timeout).await {
                Ok(Some(task)) => self.process(task).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Worker {}: queue error: {}", self.id, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        tracing::info!("Dispatch worker {} shutting down", self.id);
    }

    /// Dispatch one task under its lease, rescheduling retryable failures
    pub async fn process(&self, task: JudgeTask) {
        let lease = match self
            .queue
            .try_lease(&task.submission_id, self.config.lease_ttl)
            .await
        {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::debug!(
                    "Submission {} already has a live attempt, dropping duplicate delivery",
                    task.submission_id
                );
                return;
            }
            Err(e) => {
                tracing::warn!("Lease for submission {} unavailable: {}", task.submission_id, e);
                self.retry(&task).await;
                return;
            }
        };

        let result = self.dispatcher.dispatch(&task.submission_id).await;

        if let Err(e) = self.queue.release_lease(lease).await {
            tracing::warn!("Failed to release lease for {}: {}", task.submission_id, e);
        }

        match result {
            Ok(DispatchReport::Finalized(status)) => {
                tracing::debug!("Worker {}: {} -> {}", self.id, task.submission_id, status);
            }
            Ok(report) => {
                tracing::debug!("Worker {}: {} -> {:?}", self.id, task.submission_id, report);
            }
            Err(e) if e.is_retryable() => {
                tracing::info!(
                    "Submission {} deferred (attempt {}): {}",
                    task.submission_id,
                    task.attempt + 1,
                    e
                );
                self.retry(&task).await;
            }
            Err(e) => {
                tracing::error!("Failed to dispatch submission {}: {}", task.submission_id, e);
            }
        }
    }

    async fn retry(&self, task: &JudgeTask) {
        let delay = backoff_delay(self.config.backoff_base, self.config.backoff_cap, task.attempt);
        if let Err(e) = self.queue.push_delayed(&task.next_attempt(), delay).await {
            tracing::error!("Failed to reschedule submission {}: {}", task.submission_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        config::JudgeConfig,
        judge::{client::MockSandboxClient, queue::MemoryQueue},
        models::{
            judge_server::fixtures::heartbeat, problem::fixtures::problem, CaseResult, JudgeStatus,
            RuleType, Submission,
        },
        store::{MemoryStore, ServerRegistry},
    };

    fn worker(store: Arc<MemoryStore>, queue: Arc<MemoryQueue>, sandbox: MockSandboxClient) -> DispatchWorker {
        let config = JudgeConfig::new("secret");
        let dispatcher = Dispatcher::new(store.clone(), store, Arc::new(sandbox), config);
        DispatchWorker::new(
            0,
            dispatcher,
            queue,
            DispatchConfig::default(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn test_no_server_is_rescheduled_with_backoff() {
        let store = Arc::new(MemoryStore::new(&JudgeConfig::new("secret")));
        store.insert_problem(problem(1, RuleType::Acm, &[100])).await.unwrap();
        store
            .insert_submission(Submission::new("s1", 1, None, 7, "C", "x"))
            .await;
        let queue = Arc::new(MemoryQueue::new());

        worker(store.clone(), queue.clone(), MockSandboxClient::new())
            .process(JudgeTask::new("s1", 1))
            .await;

        assert_eq!(queue.delayed_len().await, 1);
        assert_eq!(queue.ready_len().await, 0);
        assert_eq!(
            store.submission("s1").await.unwrap().result,
            JudgeStatus::Pending
        );
        assert!(queue.try_lease("s1", Duration::from_secs(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_dropped() {
        let store = Arc::new(MemoryStore::new(&JudgeConfig::new("secret")));
        let queue = Arc::new(MemoryQueue::new());
        let _held = queue
            .try_lease("s1", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        let mut sandbox = MockSandboxClient::new();
        sandbox.expect_judge().never();
        worker(store, queue.clone(), sandbox)
            .process(JudgeTask::new("s1", 1))
            .await;

        assert_eq!(queue.delayed_len().await, 0);
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_shutdown() {
        let store = Arc::new(MemoryStore::new(&JudgeConfig::new("secret")));
        store.heartbeat(heartbeat("judge-a", 4), Utc::now()).await.unwrap();
        store.insert_problem(problem(1, RuleType::Acm, &[100])).await.unwrap();
        let queue = Arc::new(MemoryQueue::new());
        for id in ["s1", "s2"] {
            store
                .insert_submission(Submission::new(id, 1, None, 7, "C", "x"))
                .await;
            queue.push(&JudgeTask::new(id, 1)).await.unwrap();
        }

        let mut sandbox = MockSandboxClient::new();
        sandbox.expect_judge().times(2).returning(|_, _, _| {
            Ok(vec![CaseResult {
                test_case: "1".to_string(),
                result: JudgeStatus::Accepted,
                cpu_time: 1,
                real_time: 1,
                memory: 1,
                signal: 0,
                exit_code: 0,
                error: 0,
                output_md5: None,
                output: None,
                score: None,
            }])
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let config = DispatchConfig {
            queue_block_timeout: Duration::from_millis(20),
            ..DispatchConfig::default()
        };
        let dispatcher = Dispatcher::new(
            store.clone(),
            store.clone(),
            Arc::new(sandbox),
            JudgeConfig::new("secret"),
        );
        let handle = tokio::spawn(
            DispatchWorker::new(1, dispatcher, queue.clone(), config, shutdown.clone()).run(),
        );

        for _ in 0..100 {
            if store.problem(1).await.unwrap().submission_number == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        assert_eq!(store.problem(1).await.unwrap().accepted_number, 2);
        assert_eq!(queue.ready_len().await, 0);
    }
}
