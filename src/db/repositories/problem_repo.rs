//! Problem repository

use std::collections::BTreeMap;

use sqlx::{types::Json, FromRow, PgExecutor};

use crate::{
    error::{AppError, AppResult},
    models::{IoMode, Problem, TestCaseScore},
};

#[derive(Debug, FromRow)]
struct ProblemRow {
    id: i64,
    display_id: String,
    contest_id: Option<i64>,
    rule_type: String,
    time_limit: i32,
    memory_limit: i32,
    test_case_id: String,
    test_case_score: Json<Vec<TestCaseScore>>,
    spj: bool,
    spj_language: Option<String>,
    spj_code: Option<String>,
    spj_version: Option<String>,
    spj_compile_ok: bool,
    spj_compiled_version: Option<String>,
    languages: Json<Vec<String>>,
    template: Json<BTreeMap<String, String>>,
    io_mode: Json<IoMode>,
    statistic_info: Json<BTreeMap<String, i64>>,
    submission_number: i64,
    accepted_number: i64,
    total_score: i32,
}

impl TryFrom<ProblemRow> for Problem {
    type Error = AppError;

    fn try_from(row: ProblemRow) -> AppResult<Self> {
        let problem = Self {
            id: row.id,
            display_id: row.display_id,
            contest_id: row.contest_id,
            rule_type: row.rule_type.parse()?,
            time_limit: row.time_limit,
            memory_limit: row.memory_limit,
            test_case_id: row.test_case_id,
            test_case_score: row.test_case_score.0,
            spj: row.spj,
            spj_language: row.spj_language,
            spj_code: row.spj_code,
            spj_version: row.spj_version,
            spj_compile_ok: row.spj_compile_ok,
            spj_compiled_version: row.spj_compiled_version,
            languages: row.languages.0,
            template: row.template.0,
            io_mode: row.io_mode.0,
            statistic_info: row.statistic_info.0,
            submission_number: row.submission_number,
            accepted_number: row.accepted_number,
            total_score: row.total_score,
        };
        problem.validate()?;
        Ok(problem)
    }
}

/// Repository for problem database operations
pub struct ProblemRepository;

impl ProblemRepository {
    /// Find problem by ID
    pub async fn find_by_id(executor: impl PgExecutor<'_>, id: i64) -> AppResult<Option<Problem>> {
        let row = sqlx::query_as::<_, ProblemRow>(r#"SELECT * FROM problem WHERE id = $1"#)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        row.map(Problem::try_from).transpose()
    }

    /// Find and lock a problem until the surrounding transaction ends
    pub async fn lock_by_id(executor: impl PgExecutor<'_>, id: i64) -> AppResult<Problem> {
        let row = sqlx::query_as::<_, ProblemRow>(r#"SELECT * FROM problem WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Problem {}", id)))?;

        Problem::try_from(row)
    }

    /// Persist the counters finalize and rejudge move
    pub async fn update_counters(executor: impl PgExecutor<'_>, problem: &Problem) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE problem
            SET submission_number = $2, accepted_number = $3, statistic_info = $4
            WHERE id = $1
            "#,
        )
        .bind(problem.id)
        .bind(problem.submission_number)
        .bind(problem.accepted_number)
        .bind(Json(&problem.statistic_info))
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn mark_spj_compiled(
        executor: impl PgExecutor<'_>,
        id: i64,
        spj_version: &str,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE problem
            SET spj_compile_ok = TRUE, spj_compiled_version = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(spj_version)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Problem {}", id)));
        }
        Ok(())
    }
}
