//! Worker selection
//!
//! `pick` chooses the least loaded eligible server. Callers run it while
//! holding the selection mutex and persist `task_number + 1` before letting
//! go, so two dispatchers never both take the last free slot.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use tokio::time::Instant;

use crate::{
    constants::{JUDGE_SERVER_LOCK_KEY, SERVER_LOCK_POLL_MS},
    error::{AppError, AppResult},
    models::JudgeServer,
};

/// Compare by `task_number / cpu_core`, then `task_number`, then `id`
fn by_load(a: &JudgeServer, b: &JudgeServer) -> Ordering {
    let lhs = i64::from(a.task_number) * i64::from(b.cpu_core);
    let rhs = i64::from(b.task_number) * i64::from(a.cpu_core);
    lhs.cmp(&rhs)
        .then(a.task_number.cmp(&b.task_number))
        .then(a.id.cmp(&b.id))
}

/// Least loaded server that is eligible at `now`
pub fn pick<'a, I>(servers: I, now: DateTime<Utc>, window: chrono::Duration) -> Option<&'a JudgeServer>
where
    I: IntoIterator<Item = &'a JudgeServer>,
{
    servers
        .into_iter()
        .filter(|server| server.is_eligible(now, window))
        .min_by(|a, b| by_load(a, b))
}

/// Delete `KEYS[1]` only while it still holds `ARGV[1]`
pub(crate) const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Named Redis mutex guarding worker selection across processes
#[derive(Clone)]
pub struct ServerLock {
    redis: ConnectionManager,
    ttl: Duration,
    wait: Duration,
}

/// Proof of holding the selection mutex
#[derive(Debug)]
#[must_use = "the selection mutex must be released"]
pub struct LockGuard {
    token: String,
}

impl ServerLock {
    pub fn new(redis: ConnectionManager, ttl: Duration, wait: Duration) -> Self {
        Self { redis, ttl, wait }
    }

    /// Take the mutex, polling until the wait budget runs out
    pub async fn acquire(&self) -> AppResult<LockGuard> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let deadline = Instant::now() + self.wait;
        let mut conn = self.redis.clone();

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(JUDGE_SERVER_LOCK_KEY)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await?;

            if acquired.is_some() {
                return Ok(LockGuard { token });
            }

            if Instant::now() >= deadline {
                return Err(AppError::LockUnavailable(JUDGE_SERVER_LOCK_KEY.to_string()));
            }

            tokio::time::sleep(Duration::from_millis(SERVER_LOCK_POLL_MS)).await;
        }
    }

    /// Drop the mutex if it is still ours
    pub async fn release(&self, guard: LockGuard) -> AppResult<()> {
        let mut conn = self.redis.clone();
        let released: i64 = redis::Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(JUDGE_SERVER_LOCK_KEY)
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            tracing::warn!("Selection lock expired before release");
        }
        Ok(())
    }
}
