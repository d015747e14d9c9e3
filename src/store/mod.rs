//! Storage seams
//!
//! The dispatcher and the heartbeat endpoint only talk to these traits.
//! `postgres` backs them with sqlx transactions plus the Redis selection
//! mutex; `memory` keeps everything behind one async mutex for tests and
//! single-process deployments.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        Contest, CounterEffects, HeartbeatRecord, JudgeInfo, JudgeOutcome, JudgeServer, Problem,
        Submission,
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Judge-server registry and slot accounting
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// Upsert by hostname; see [`HeartbeatRecord::apply_to`] for what changes
    async fn heartbeat(&self, record: HeartbeatRecord, now: DateTime<Utc>) -> AppResult<JudgeServer>;

    async fn list(&self) -> AppResult<Vec<JudgeServer>>;

    async fn set_disabled(&self, hostname: &str, disabled: bool) -> AppResult<JudgeServer>;

    async fn remove(&self, hostname: &str) -> AppResult<()>;

    /// Take a slot on the least loaded eligible server
    ///
    /// Returns `None` when no server is eligible. Serialized against every
    /// other `acquire`/`release` so the last free slot is handed out once.
    async fn acquire(&self, now: DateTime<Utc>) -> AppResult<Option<JudgeServer>>;

    /// Give back one slot; never drops `task_number` below zero
    async fn release(&self, server_id: i64) -> AppResult<()>;

    /// Recount every server's `task_number` from JUDGING submissions assigned to it
    async fn rebuild_task_numbers(&self) -> AppResult<()>;
}

/// Everything the dispatcher reads before judging
#[derive(Debug, Clone)]
pub struct JudgeContext {
    pub submission: Submission,
    pub problem: Problem,
    pub contest: Option<Contest>,
}

/// Submission lifecycle and counter persistence
#[async_trait]
pub trait JudgeStore: Send + Sync {
    async fn load_context(&self, submission_id: &str) -> AppResult<JudgeContext>;

    /// PENDING -> JUDGING on `server_id`; `false` if someone else moved it first
    async fn begin_judging(
        &self,
        submission_id: &str,
        server_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn mark_spj_compiled(&self, problem_id: i64, spj_version: &str) -> AppResult<()>;

    /// Persist the computed verdict so finalize can be replayed without the sandbox
    async fn save_pending_outcome(&self, submission_id: &str, outcome: &JudgeOutcome) -> AppResult<()>;

    /// Apply the pending outcome to every counter and write the terminal result
    ///
    /// Runs as one transaction. Returns `None` if the submission was no longer
    /// JUDGING with a pending outcome.
    async fn finalize(&self, submission_id: &str, penalty_secs: i64) -> AppResult<Option<CounterEffects>>;

    /// Terminal SYSTEM_ERROR without touching counters
    async fn fail(&self, submission_id: &str, info: JudgeInfo) -> AppResult<()>;

    /// JUDGING -> SYSTEM_ERROR for a failed attempt
    ///
    /// `false` if the submission already left JUDGING, in which case the
    /// reconciler owns its slot.
    async fn fail_judging(&self, submission_id: &str, info: JudgeInfo) -> AppResult<bool>;

    /// Revert a terminal submission's counters and put it back to PENDING
    async fn rejudge(&self, submission_id: &str) -> AppResult<Submission>;

    /// JUDGING submissions that started before `started_before`
    async fn stuck_submissions(&self, started_before: DateTime<Utc>) -> AppResult<Vec<Submission>>;

    /// JUDGING -> PENDING, returning the server whose slot it held
    async fn reset_to_pending(&self, submission_id: &str) -> AppResult<Option<i64>>;
}
