//! User profile repository

use sqlx::{types::Json, FromRow, PgExecutor};

use crate::{
    error::{AppError, AppResult},
    models::{ProblemsStatus, UserProfile},
};

#[derive(Debug, FromRow)]
struct ProfileRow {
    user_id: i64,
    acm_problems_status: Json<ProblemsStatus>,
    oi_problems_status: Json<ProblemsStatus>,
    accepted_number: i64,
    submission_number: i64,
    total_score: i64,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = AppError;

    fn try_from(row: ProfileRow) -> AppResult<Self> {
        let profile = Self {
            user_id: row.user_id,
            acm_problems_status: row.acm_problems_status.0,
            oi_problems_status: row.oi_problems_status.0,
            accepted_number: row.accepted_number,
            submission_number: row.submission_number,
            total_score: row.total_score,
        };
        profile.validate()?;
        Ok(profile)
    }
}

/// Repository for user profile counters
pub struct ProfileRepository;

impl ProfileRepository {
    /// Create the profile row if missing; call before [`Self::lock`]
    pub async fn ensure(executor: impl PgExecutor<'_>, user_id: i64) -> AppResult<()> {
        sqlx::query(r#"INSERT INTO user_profile (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING"#)
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(())
    }

    pub async fn lock(executor: impl PgExecutor<'_>, user_id: i64) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"SELECT * FROM user_profile WHERE user_id = $1 FOR UPDATE"#,
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        row.map(UserProfile::try_from).transpose()
    }

    pub async fn save(executor: impl PgExecutor<'_>, profile: &UserProfile) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE user_profile
            SET
                acm_problems_status = $2,
                oi_problems_status = $3,
                accepted_number = $4,
                submission_number = $5,
                total_score = $6
            WHERE user_id = $1
            "#,
        )
        .bind(profile.user_id)
        .bind(Json(&profile.acm_problems_status))
        .bind(Json(&profile.oi_problems_status))
        .bind(profile.accepted_number)
        .bind(profile.submission_number)
        .bind(profile.total_score)
        .execute(executor)
        .await?;

        Ok(())
    }
}
