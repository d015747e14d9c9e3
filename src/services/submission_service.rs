//! Submission service
//!
//! Entry points the rest of the online judge uses to hand submissions to
//! the dispatch workers.

use crate::{
    error::{AppError, AppResult},
    judge::queue::{JudgeTask, TaskQueue},
    models::{JudgeStatus, Submission},
    store::JudgeStore,
};

/// Submission service for queueing and rejudging
pub struct SubmissionService;

impl SubmissionService {
    /// Queue a PENDING submission for judging
    pub async fn enqueue(
        store: &dyn JudgeStore,
        queue: &dyn TaskQueue,
        submission_id: &str,
    ) -> AppResult<()> {
        let context = store.load_context(submission_id).await?;
        if context.submission.result != JudgeStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Submission {} is {}, not PENDING",
                submission_id, context.submission.result
            )));
        }

        queue
            .push(&JudgeTask::new(submission_id, context.submission.problem_id))
            .await?;
        tracing::info!("Queued submission {} for judging", submission_id);
        Ok(())
    }

    /// Take back a terminal submission's contribution and judge it again
    pub async fn rejudge(
        store: &dyn JudgeStore,
        queue: &dyn TaskQueue,
        submission_id: &str,
    ) -> AppResult<Submission> {
        let submission = store.rejudge(submission_id).await?;
        queue
            .push(&JudgeTask::new(submission_id, submission.problem_id))
            .await?;
        tracing::info!("Queued submission {} for rejudge", submission_id);
        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::{
        config::JudgeConfig,
        judge::queue::MemoryQueue,
        models::{problem::fixtures::problem, JudgeInfo, JudgeOutcome, RuleType, StatisticInfo},
        store::MemoryStore,
    };

    async fn setup() -> (MemoryStore, MemoryQueue) {
        let store = MemoryStore::new(&JudgeConfig::new("secret"));
        store.insert_problem(problem(1, RuleType::Acm, &[100])).await.unwrap();
        store
            .insert_submission(Submission::new("s1", 1, None, 7, "C", "int main(){}"))
            .await;
        (store, MemoryQueue::new())
    }

    #[tokio::test]
    async fn test_enqueue_pending_submission() {
        let (store, queue) = setup().await;

        SubmissionService::enqueue(&store, &queue, "s1").await.unwrap();

        let task = queue.pop(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(task, JudgeTask::new("s1", 1));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_judged_submission() {
        let (store, queue) = setup().await;
        store.begin_judging("s1", 1, Utc::now()).await.unwrap();

        let err = SubmissionService::enqueue(&store, &queue, "s1").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(queue.ready_len().await, 0);
    }

    #[tokio::test]
    async fn test_rejudge_reverts_and_requeues() {
        let (store, queue) = setup().await;
        store.begin_judging("s1", 1, Utc::now()).await.unwrap();
        store
            .save_pending_outcome(
                "s1",
                &JudgeOutcome {
                    result: JudgeStatus::Accepted,
                    statistic_info: StatisticInfo::default(),
                    info: JudgeInfo::default(),
                },
            )
            .await
            .unwrap();
        store.finalize("s1", 1200).await.unwrap();
        assert_eq!(store.problem(1).await.unwrap().accepted_number, 1);

        let submission = SubmissionService::rejudge(&store, &queue, "s1").await.unwrap();

        assert_eq!(submission.result, JudgeStatus::Pending);
        assert_eq!(store.problem(1).await.unwrap().accepted_number, 0);
        assert_eq!(store.profile(7).await.unwrap().accepted_number, 0);
        assert_eq!(queue.ready_len().await, 1);
    }
}
