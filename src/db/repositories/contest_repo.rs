//! Contest and contest rank repository

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgExecutor};

use crate::{
    error::{AppError, AppResult},
    models::{AcmContestRank, AcmProblemInfo, Contest, OiContestRank},
};

#[derive(Debug, FromRow)]
struct ContestRow {
    id: i64,
    rule_type: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl TryFrom<ContestRow> for Contest {
    type Error = AppError;

    fn try_from(row: ContestRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            rule_type: row.rule_type.parse()?,
            start_time: row.start_time,
            end_time: row.end_time,
        })
    }
}

#[derive(Debug, FromRow)]
struct AcmRankRow {
    user_id: i64,
    contest_id: i64,
    submission_number: i64,
    accepted_number: i64,
    total_time: i64,
    submission_info: Json<BTreeMap<i64, AcmProblemInfo>>,
}

impl TryFrom<AcmRankRow> for AcmContestRank {
    type Error = AppError;

    fn try_from(row: AcmRankRow) -> AppResult<Self> {
        let rank = Self {
            user_id: row.user_id,
            contest_id: row.contest_id,
            submission_number: row.submission_number,
            accepted_number: row.accepted_number,
            total_time: row.total_time,
            submission_info: row.submission_info.0,
        };
        rank.validate()?;
        Ok(rank)
    }
}

#[derive(Debug, FromRow)]
struct OiRankRow {
    user_id: i64,
    contest_id: i64,
    submission_number: i64,
    total_score: i64,
    submission_info: Json<BTreeMap<i64, i32>>,
}

impl TryFrom<OiRankRow> for OiContestRank {
    type Error = AppError;

    fn try_from(row: OiRankRow) -> AppResult<Self> {
        let rank = Self {
            user_id: row.user_id,
            contest_id: row.contest_id,
            submission_number: row.submission_number,
            total_score: row.total_score,
            submission_info: row.submission_info.0,
        };
        rank.validate()?;
        Ok(rank)
    }
}

/// Repository for contests, their rank rows and the first-AC guard
pub struct ContestRepository;

impl ContestRepository {
    /// Find contest by ID
    pub async fn find_by_id(executor: impl PgExecutor<'_>, id: i64) -> AppResult<Option<Contest>> {
        let row = sqlx::query_as::<_, ContestRow>(
            r#"SELECT id, rule_type, start_time, end_time FROM contest WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        row.map(Contest::try_from).transpose()
    }

    // =========================================================================
    // ACM RANK
    // =========================================================================

    pub async fn ensure_acm_rank(
        executor: impl PgExecutor<'_>,
        user_id: i64,
        contest_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO acm_contest_rank (user_id, contest_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, contest_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(contest_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn lock_acm_rank(
        executor: impl PgExecutor<'_>,
        user_id: i64,
        contest_id: i64,
    ) -> AppResult<Option<AcmContestRank>> {
        let row = sqlx::query_as::<_, AcmRankRow>(
            r#"
            SELECT * FROM acm_contest_rank
            WHERE user_id = $1 AND contest_id = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(contest_id)
        .fetch_optional(executor)
        .await?;

        row.map(AcmContestRank::try_from).transpose()
    }

    pub async fn save_acm_rank(executor: impl PgExecutor<'_>, rank: &AcmContestRank) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE acm_contest_rank
            SET
                submission_number = $3,
                accepted_number = $4,
                total_time = $5,
                submission_info = $6
            WHERE user_id = $1 AND contest_id = $2
            "#,
        )
        .bind(rank.user_id)
        .bind(rank.contest_id)
        .bind(rank.submission_number)
        .bind(rank.accepted_number)
        .bind(rank.total_time)
        .bind(Json(&rank.submission_info))
        .execute(executor)
        .await?;

        Ok(())
    }

    // =========================================================================
    // OI RANK
    // =========================================================================

    pub async fn ensure_oi_rank(
        executor: impl PgExecutor<'_>,
        user_id: i64,
        contest_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO oi_contest_rank (user_id, contest_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, contest_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(contest_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn lock_oi_rank(
        executor: impl PgExecutor<'_>,
        user_id: i64,
        contest_id: i64,
    ) -> AppResult<Option<OiContestRank>> {
        let row = sqlx::query_as::<_, OiRankRow>(
            r#"
            SELECT * FROM oi_contest_rank
            WHERE user_id = $1 AND contest_id = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(contest_id)
        .fetch_optional(executor)
        .await?;

        row.map(OiContestRank::try_from).transpose()
    }

    pub async fn save_oi_rank(executor: impl PgExecutor<'_>, rank: &OiContestRank) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE oi_contest_rank
            SET submission_number = $3, total_score = $4, submission_info = $5
            WHERE user_id = $1 AND contest_id = $2
            "#,
        )
        .bind(rank.user_id)
        .bind(rank.contest_id)
        .bind(rank.submission_number)
        .bind(rank.total_score)
        .bind(Json(&rank.submission_info))
        .execute(executor)
        .await?;

        Ok(())
    }

    // =========================================================================
    // FIRST AC
    // =========================================================================

    /// Claim the first AC of `(contest_id, problem_id)`; `false` if already taken
    pub async fn claim_first_ac(
        executor: impl PgExecutor<'_>,
        contest_id: i64,
        problem_id: i64,
        user_id: i64,
        submission_id: &str,
    ) -> AppResult<bool> {
        let claimed: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO contest_first_ac (contest_id, problem_id, user_id, submission_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (contest_id, problem_id) DO NOTHING
            RETURNING contest_id
            "#,
        )
        .bind(contest_id)
        .bind(problem_id)
        .bind(user_id)
        .bind(submission_id)
        .fetch_optional(executor)
        .await?;

        Ok(claimed.is_some())
    }

    /// Give the first AC back, only if `user_id` holds it
    pub async fn release_first_ac(
        executor: impl PgExecutor<'_>,
        contest_id: i64,
        problem_id: i64,
        user_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM contest_first_ac
            WHERE contest_id = $1 AND problem_id = $2 AND user_id = $3
            "#,
        )
        .bind(contest_id)
        .bind(problem_id)
        .bind(user_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Point `user_id`'s first AC at the accepted submission now carrying it
    pub async fn reassign_first_ac(
        executor: impl PgExecutor<'_>,
        contest_id: i64,
        problem_id: i64,
        user_id: i64,
        submission_id: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE contest_first_ac
            SET submission_id = $4
            WHERE contest_id = $1 AND problem_id = $2 AND user_id = $3
            "#,
        )
        .bind(contest_id)
        .bind(problem_id)
        .bind(user_id)
        .bind(submission_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}
