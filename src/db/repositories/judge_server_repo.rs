//! Judge server repository

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::{
    error::AppResult,
    models::{HeartbeatRecord, JudgeServer},
};

/// Repository for judge server registry rows
pub struct JudgeServerRepository;

impl JudgeServerRepository {
    /// Insert a new worker or fold a heartbeat into the existing row
    ///
    /// Keeps `ip`, `cpu_core`, `is_disabled` and (unless a new one is sent)
    /// `service_url`. `task_number` only resets when the previous heartbeat
    /// is older than `stale_after`.
    pub async fn upsert_heartbeat(
        executor: impl PgExecutor<'_>,
        record: &HeartbeatRecord,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
    ) -> AppResult<JudgeServer> {
        let stale_secs = stale_after.num_milliseconds() as f64 / 1000.0;

        let server = sqlx::query_as::<_, JudgeServer>(
            r#"
            INSERT INTO judge_server (
                hostname, ip, judger_version, cpu_core, memory_usage, cpu_usage,
                last_heartbeat, create_time, service_url
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8)
            ON CONFLICT (hostname) DO UPDATE
            SET
                task_number = CASE
                    WHEN EXTRACT(EPOCH FROM ($7 - judge_server.last_heartbeat)) > $9 THEN 0
                    ELSE judge_server.task_number
                END,
                judger_version = EXCLUDED.judger_version,
                memory_usage = EXCLUDED.memory_usage,
                cpu_usage = EXCLUDED.cpu_usage,
                service_url = COALESCE(EXCLUDED.service_url, judge_server.service_url),
                last_heartbeat = EXCLUDED.last_heartbeat
            RETURNING *
            "#,
        )
        .bind(&record.hostname)
        .bind(&record.ip)
        .bind(&record.judger_version)
        .bind(record.cpu_core)
        .bind(record.memory_usage)
        .bind(record.cpu_usage)
        .bind(now)
        .bind(&record.service_url)
        .bind(stale_secs)
        .fetch_one(executor)
        .await?;

        Ok(server)
    }

    pub async fn list(executor: impl PgExecutor<'_>) -> AppResult<Vec<JudgeServer>> {
        let servers = sqlx::query_as::<_, JudgeServer>(r#"SELECT * FROM judge_server ORDER BY id"#)
            .fetch_all(executor)
            .await?;

        Ok(servers)
    }

    /// Every row, locked until the surrounding transaction ends
    pub async fn lock_all(executor: impl PgExecutor<'_>) -> AppResult<Vec<JudgeServer>> {
        let servers = sqlx::query_as::<_, JudgeServer>(
            r#"SELECT * FROM judge_server ORDER BY id FOR UPDATE"#,
        )
        .fetch_all(executor)
        .await?;

        Ok(servers)
    }

    pub async fn increment_task_number(executor: impl PgExecutor<'_>, id: i64) -> AppResult<JudgeServer> {
        let server = sqlx::query_as::<_, JudgeServer>(
            r#"
            UPDATE judge_server
            SET task_number = task_number + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(executor)
        .await?;

        Ok(server)
    }

    /// Returns `false` when the row is missing or already idle
    pub async fn decrement_task_number(executor: impl PgExecutor<'_>, id: i64) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE judge_server
            SET task_number = task_number - 1
            WHERE id = $1 AND task_number > 0
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn set_disabled(
        executor: impl PgExecutor<'_>,
        hostname: &str,
        disabled: bool,
    ) -> AppResult<Option<JudgeServer>> {
        let server = sqlx::query_as::<_, JudgeServer>(
            r#"
            UPDATE judge_server
            SET is_disabled = $2
            WHERE hostname = $1
            RETURNING *
            "#,
        )
        .bind(hostname)
        .bind(disabled)
        .fetch_optional(executor)
        .await?;

        Ok(server)
    }

    /// Returns `false` when no row had this hostname
    pub async fn delete(executor: impl PgExecutor<'_>, hostname: &str) -> AppResult<bool> {
        let result = sqlx::query(r#"DELETE FROM judge_server WHERE hostname = $1"#)
            .bind(hostname)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Recount `task_number` from JUDGING submissions assigned to each server
    pub async fn rebuild_task_numbers(executor: impl PgExecutor<'_>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE judge_server
            SET task_number = (
                SELECT COUNT(*)
                FROM submission
                WHERE submission.assigned_server_id = judge_server.id
                  AND submission.result = 7
            )
            "#,
        )
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}
