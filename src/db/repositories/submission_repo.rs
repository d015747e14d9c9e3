//! Submission repository

use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgExecutor};

use crate::{
    error::{AppError, AppResult},
    models::{CounterEffects, JudgeInfo, JudgeOutcome, JudgeStatus, StatisticInfo, Submission},
};

/// Raw `submission` row; JSON columns are decoded into typed records
#[derive(Debug, FromRow)]
struct SubmissionRow {
    id: String,
    problem_id: i64,
    contest_id: Option<i64>,
    user_id: i64,
    username: String,
    code: String,
    language: String,
    result: i32,
    info: Json<JudgeInfo>,
    statistic_info: Json<StatisticInfo>,
    create_time: DateTime<Utc>,
    ip: Option<String>,
    assigned_server_id: Option<i64>,
    judge_started_at: Option<DateTime<Utc>>,
    pending_outcome: Option<Json<JudgeOutcome>>,
    counter_effects: Option<Json<CounterEffects>>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = AppError;

    fn try_from(row: SubmissionRow) -> AppResult<Self> {
        let result = JudgeStatus::from_code(row.result).ok_or_else(|| {
            AppError::MalformedRecord(format!(
                "submission {}: unknown result code {}",
                row.id, row.result
            ))
        })?;

        Ok(Self {
            id: row.id,
            problem_id: row.problem_id,
            contest_id: row.contest_id,
            user_id: row.user_id,
            username: row.username,
            code: row.code,
            language: row.language,
            result,
            info: row.info.0,
            statistic_info: row.statistic_info.0,
            create_time: row.create_time,
            ip: row.ip,
            assigned_server_id: row.assigned_server_id,
            judge_started_at: row.judge_started_at,
            pending_outcome: row.pending_outcome.map(|json| json.0),
            counter_effects: row.counter_effects.map(|json| json.0),
        })
    }
}

/// Repository for submission database operations
pub struct SubmissionRepository;

impl SubmissionRepository {
    /// Find submission by ID
    pub async fn find_by_id(executor: impl PgExecutor<'_>, id: &str) -> AppResult<Option<Submission>> {
        let row = sqlx::query_as::<_, SubmissionRow>(r#"SELECT * FROM submission WHERE id = $1"#)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        row.map(Submission::try_from).transpose()
    }

    /// Find and lock a submission until the surrounding transaction ends
    pub async fn lock_by_id(executor: impl PgExecutor<'_>, id: &str) -> AppResult<Option<Submission>> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"SELECT * FROM submission WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        row.map(Submission::try_from).transpose()
    }

    /// PENDING -> JUDGING; `false` when the row was not PENDING
    pub async fn begin_judging(
        executor: impl PgExecutor<'_>,
        id: &str,
        server_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submission
            SET result = $2, assigned_server_id = $3, judge_started_at = $4
            WHERE id = $1 AND result = $5
            "#,
        )
        .bind(id)
        .bind(JudgeStatus::Judging.code())
        .bind(server_id)
        .bind(now)
        .bind(JudgeStatus::Pending.code())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `false` when the row is no longer JUDGING
    pub async fn save_pending_outcome(
        executor: impl PgExecutor<'_>,
        id: &str,
        outcome: &JudgeOutcome,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submission
            SET pending_outcome = $2
            WHERE id = $1 AND result = $3
            "#,
        )
        .bind(id)
        .bind(Json(outcome))
        .bind(JudgeStatus::Judging.code())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Write the terminal verdict and the ledger of what finalize changed
    pub async fn write_final(
        executor: impl PgExecutor<'_>,
        id: &str,
        outcome: &JudgeOutcome,
        effects: &CounterEffects,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE submission
            SET
                result = $2,
                info = $3,
                statistic_info = $4,
                pending_outcome = NULL,
                counter_effects = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(outcome.result.code())
        .bind(Json(&outcome.info))
        .bind(Json(&outcome.statistic_info))
        .bind(Json(effects))
        .execute(executor)
        .await?;

        Ok(())
    }

    /// SYSTEM_ERROR unless the submission already reached a terminal state
    pub async fn fail(
        executor: impl PgExecutor<'_>,
        id: &str,
        info: &JudgeInfo,
        statistic_info: &StatisticInfo,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submission
            SET result = $2, info = $3, statistic_info = $4, pending_outcome = NULL
            WHERE id = $1 AND result IN ($5, $6)
            "#,
        )
        .bind(id)
        .bind(JudgeStatus::SystemError.code())
        .bind(Json(info))
        .bind(Json(statistic_info))
        .bind(JudgeStatus::Pending.code())
        .bind(JudgeStatus::Judging.code())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// SYSTEM_ERROR for a row still JUDGING
    pub async fn fail_judging(
        executor: impl PgExecutor<'_>,
        id: &str,
        info: &JudgeInfo,
        statistic_info: &StatisticInfo,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submission
            SET result = $2, info = $3, statistic_info = $4, pending_outcome = NULL
            WHERE id = $1 AND result = $5
            "#,
        )
        .bind(id)
        .bind(JudgeStatus::SystemError.code())
        .bind(Json(info))
        .bind(Json(statistic_info))
        .bind(JudgeStatus::Judging.code())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Clear the verdict and ledger, back to PENDING
    pub async fn reset_for_rejudge(executor: impl PgExecutor<'_>, id: &str) -> AppResult<Submission> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            UPDATE submission
            SET
                result = $2,
                info = '{}',
                statistic_info = '{}',
                assigned_server_id = NULL,
                judge_started_at = NULL,
                pending_outcome = NULL,
                counter_effects = NULL
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(JudgeStatus::Pending.code())
        .fetch_one(executor)
        .await?;

        Submission::try_from(row)
    }

    /// The user's other finalized submissions on `problem_id`, oldest first
    pub async fn list_finalized_siblings(
        executor: impl PgExecutor<'_>,
        user_id: i64,
        problem_id: i64,
        exclude_id: &str,
    ) -> AppResult<Vec<Submission>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT * FROM submission
            WHERE user_id = $1
              AND problem_id = $2
              AND id <> $3
              AND counter_effects IS NOT NULL
            ORDER BY create_time, id
            "#,
        )
        .bind(user_id)
        .bind(problem_id)
        .bind(exclude_id)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(Submission::try_from).collect()
    }

    /// JUDGING submissions started before `started_before`, oldest first
    pub async fn list_stuck(
        executor: impl PgExecutor<'_>,
        started_before: DateTime<Utc>,
    ) -> AppResult<Vec<Submission>> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT * FROM submission
            WHERE result = $1
              AND (judge_started_at IS NULL OR judge_started_at < $2)
            ORDER BY judge_started_at NULLS FIRST
            "#,
        )
        .bind(JudgeStatus::Judging.code())
        .bind(started_before)
        .fetch_all(executor)
        .await?;

        rows.into_iter().map(Submission::try_from).collect()
    }

    /// JUDGING -> PENDING
    ///
    /// `None` if the row was not JUDGING, otherwise the server it held.
    pub async fn reset_to_pending(
        executor: impl PgExecutor<'_>,
        id: &str,
    ) -> AppResult<Option<Option<i64>>> {
        let previous: Option<(Option<i64>,)> = sqlx::query_as(
            r#"
            WITH old AS (
                SELECT id, assigned_server_id
                FROM submission
                WHERE id = $1 AND result = $2
                FOR UPDATE
            )
            UPDATE submission
            SET result = $3, assigned_server_id = NULL, judge_started_at = NULL, pending_outcome = NULL
            FROM old
            WHERE submission.id = old.id
            RETURNING old.assigned_server_id
            "#,
        )
        .bind(id)
        .bind(JudgeStatus::Judging.code())
        .bind(JudgeStatus::Pending.code())
        .fetch_optional(executor)
        .await?;

        Ok(previous.map(|(server_id,)| server_id))
    }
}
