//! Work queue
//!
//! Ready tasks live in a Redis list (`LPUSH` / `BRPOP`), backoff retries in a
//! sorted set scored by the unix millis they become due. A per-submission
//! lease keeps a submission with a live attempt from being judged twice.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::{
    constants::{queue_keys, DELAYED_PROMOTE_BATCH},
    error::AppResult,
    judge::selector::COMPARE_AND_DELETE_SCRIPT,
    utils::crypto::jitter_factor,
};

/// Queue payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeTask {
    pub submission_id: String,
    pub problem_id: i64,
    /// Deliveries that ended in a retryable error so far
    #[serde(default)]
    pub attempt: u32,
}

impl JudgeTask {
    pub fn new(submission_id: impl Into<String>, problem_id: i64) -> Self {
        Self {
            submission_id: submission_id.into(),
            problem_id,
            attempt: 0,
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Exclusive right to dispatch one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub submission_id: String,
    token: String,
}

/// `min(cap, base * 2^attempt)` stretched by up to 10% jitter, never above `cap`
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(31));
    let delay = base.saturating_mul(factor).min(cap);
    delay.mul_f64(jitter_factor(0.1)).min(cap)
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn push(&self, task: &JudgeTask) -> AppResult<()>;

    async fn push_delayed(&self, task: &JudgeTask, delay: Duration) -> AppResult<()>;

    /// Move due delayed tasks to the ready list; returns how many moved
    async fn promote_due(&self) -> AppResult<usize>;

    /// Block up to `timeout` for the next ready task
    async fn pop(&self, timeout: Duration) -> AppResult<Option<JudgeTask>>;

    /// `None` while another attempt on the submission holds the lease
    async fn try_lease(&self, submission_id: &str, ttl: Duration) -> AppResult<Option<Lease>>;

    async fn release_lease(&self, lease: Lease) -> AppResult<()>;
}

const PROMOTE_SCRIPT: &str = r#"
local due = redis.call("ZRANGEBYSCORE", KEYS[1], "-inf", ARGV[1], "LIMIT", 0, ARGV[2])
for _, task in ipairs(due) do
    redis.call("ZREM", KEYS[1], task)
    redis.call("LPUSH", KEYS[2], task)
end
return #due
"#;

/// Redis-backed queue shared by every controller process
#[derive(Clone)]
pub struct RedisQueue {
    redis: ConnectionManager,
}

impl RedisQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn lease_key(submission_id: &str) -> String {
        format!("{}{}", queue_keys::LEASE_PREFIX, submission_id)
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn push(&self, task: &JudgeTask) -> AppResult<()> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.redis.clone();
        let _: () = conn.lpush(queue_keys::READY, payload).await?;
        Ok(())
    }

    async fn push_delayed(&self, task: &JudgeTask, delay: Duration) -> AppResult<()> {
        let payload = serde_json::to_string(task)?;
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let due = Utc::now().timestamp_millis().saturating_add(delay_ms);
        let mut conn = self.redis.clone();
        let _: () = conn.zadd(queue_keys::DELAYED, payload, due).await?;
        Ok(())
    }

    async fn promote_due(&self) -> AppResult<usize> {
        let mut conn = self.redis.clone();
        let moved: usize = redis::Script::new(PROMOTE_SCRIPT)
            .key(queue_keys::DELAYED)
            .key(queue_keys::READY)
            .arg(Utc::now().timestamp_millis())
            .arg(DELAYED_PROMOTE_BATCH)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn pop(&self, timeout: Duration) -> AppResult<Option<JudgeTask>> {
        let mut conn = self.redis.clone();
        let popped: Option<(String, String)> =
            conn.brpop(queue_keys::READY, timeout.as_secs_f64()).await?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(task) => Ok(Some(task)),
            Err(e) => {
                tracing::error!("Dropping malformed judge task {:?}: {}", payload, e);
                Ok(None)
            }
        }
    }

    async fn try_lease(&self, submission_id: &str, ttl: Duration) -> AppResult<Option<Lease>> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut conn = self.redis.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(Self::lease_key(submission_id))
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        Ok(acquired.map(|_| Lease {
            submission_id: submission_id.to_string(),
            token,
        }))
    }

    async fn release_lease(&self, lease: Lease) -> AppResult<()> {
        let mut conn = self.redis.clone();
        let _: i64 = redis::Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(Self::lease_key(&lease.submission_id))
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<JudgeTask>,
    delayed: Vec<(Instant, JudgeTask)>,
    leases: HashMap<String, (String, Instant)>,
}

/// In-process queue with the same semantics, for tests and single-node runs
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    ready: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn delayed_len(&self) -> usize {
        self.state.lock().await.delayed.len()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push(&self, task: &JudgeTask) -> AppResult<()> {
        self.state.lock().await.ready.push_back(task.clone());
        self.ready.notify_one();
        Ok(())
    }

    async fn push_delayed(&self, task: &JudgeTask, delay: Duration) -> AppResult<()> {
        self.state
            .lock()
            .await
            .delayed
            .push((Instant::now() + delay, task.clone()));
        Ok(())
    }

    async fn promote_due(&self) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.delayed)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        state.delayed = waiting;

        let moved = due.len();
        for (_, task) in due {
            state.ready.push_back(task);
            self.ready.notify_one();
        }
        Ok(moved)
    }

    async fn pop(&self, timeout: Duration) -> AppResult<Option<JudgeTask>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(task) = self.state.lock().await.ready.pop_front() {
                return Ok(Some(task));
            }
            if tokio::time::timeout_at(deadline, self.ready.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn try_lease(&self, submission_id: &str, ttl: Duration) -> AppResult<Option<Lease>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if state
            .leases
            .get(submission_id)
            .is_some_and(|(_, expires)| *expires > now)
        {
            return Ok(None);
        }

        let token = uuid::Uuid::new_v4().simple().to_string();
        state
            .leases
            .insert(submission_id.to_string(), (token.clone(), now + ttl));
        Ok(Some(Lease {
            submission_id: submission_id.to_string(),
            token,
        }))
    }

    async fn release_lease(&self, lease: Lease) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state
            .leases
            .get(&lease.submission_id)
            .is_some_and(|(token, _)| *token == lease.token)
        {
            state.leases.remove(&lease.submission_id);
        }
        Ok(())
    }
}
