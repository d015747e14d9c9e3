//! Application configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! Configuration is loaded once in `main` and handed to each component explicitly;
//! the registry, dispatcher, sandbox client and reconciler all receive a [`JudgeConfig`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    constants::{
        ATTEMPT_MARGIN_SECS, DEFAULT_ACM_PENALTY_SECS, DEFAULT_COMPILE_TIMEOUT_SECS, DEFAULT_DATABASE_MAX_CONNECTIONS,
        DEFAULT_DISPATCH_WORKERS, DEFAULT_HEARTBEAT_WINDOW_MS, DEFAULT_JUDGE_CASE_TIMEOUT_SECS,
        DEFAULT_LEASE_TTL_SECS, DEFAULT_MAX_JUDGE_TIMEOUT_SECS, DEFAULT_PING_TIMEOUT_SECS, DEFAULT_QUEUE_BLOCK_TIMEOUT_SECS,
        DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_REDIS_URL, DEFAULT_RETRY_BACKOFF_BASE_MS,
        DEFAULT_RETRY_BACKOFF_CAP_MS, DEFAULT_SERVER_HOST, DEFAULT_SERVER_LOCK_TTL_MS,
        DEFAULT_SERVER_LOCK_WAIT_MS, DEFAULT_SERVER_PORT, DEFAULT_STALE_RESET_SECS,
        DEFAULT_STUCK_AFTER_SECS,
    },
    utils::crypto::hash_string,
};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub judge: JudgeConfig,
    pub dispatch: DispatchConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Judge-server registry, selection and sandbox RPC settings
#[derive(Clone)]
pub struct JudgeConfig {
    token: String,
    token_hash: String,
    /// Heartbeat liveness window
    pub heartbeat_window: chrono::Duration,
    /// Silence after which the next heartbeat resets `task_number`
    pub stale_reset_after: chrono::Duration,
    pub compile_timeout: Duration,
    /// Judge RPC budget per test case
    pub judge_case_timeout: Duration,
    /// Cap on the whole judge RPC
    pub max_judge_timeout: Duration,
    pub ping_timeout: Duration,
    /// ACM penalty per wrong attempt before AC, in seconds
    pub acm_penalty_secs: i64,
    pub server_lock_ttl: Duration,
    pub server_lock_wait: Duration,
}

/// Work queue, retry and reconciliation settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of dispatcher tasks pulling from the queue
    pub workers: usize,
    pub queue_block_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub lease_ttl: Duration,
    /// JUDGING submissions older than this are reconciled
    pub stuck_after: chrono::Duration,
    pub reconcile_interval: Duration,
    /// Ping enabled workers with a stale heartbeat during reconciliation
    pub probe_stale_servers: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            judge: JudgeConfig::from_env()?,
            dispatch: DispatchConfig::from_env()?,
        };
        config.dispatch.check_covers(&config.judge)?;
        Ok(config)
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            port: parse_var("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json_logs: env::var("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
        })
    }
}

impl RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
        })
    }
}

impl JudgeConfig {
    /// Build a judge configuration with default timings for the given shared token
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let token_hash = hash_string(&token);

        Self {
            token,
            token_hash,
            heartbeat_window: chrono::Duration::milliseconds(DEFAULT_HEARTBEAT_WINDOW_MS),
            stale_reset_after: chrono::Duration::seconds(DEFAULT_STALE_RESET_SECS),
            compile_timeout: Duration::from_secs(DEFAULT_COMPILE_TIMEOUT_SECS),
            judge_case_timeout: Duration::from_secs(DEFAULT_JUDGE_CASE_TIMEOUT_SECS),
            max_judge_timeout: Duration::from_secs(DEFAULT_MAX_JUDGE_TIMEOUT_SECS),
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            acm_penalty_secs: DEFAULT_ACM_PENALTY_SECS,
            server_lock_ttl: Duration::from_millis(DEFAULT_SERVER_LOCK_TTL_MS),
            server_lock_wait: Duration::from_millis(DEFAULT_SERVER_LOCK_WAIT_MS),
        }
    }

    fn from_env() -> Result<Self, ConfigError> {
        let token = env::var("JUDGE_SERVER_TOKEN")
            .map_err(|_| ConfigError::Missing("JUDGE_SERVER_TOKEN".to_string()))?;
        if token.is_empty() {
            return Err(ConfigError::InvalidValue("JUDGE_SERVER_TOKEN".to_string()));
        }

        let mut config = Self::new(token);
        config.heartbeat_window = chrono::Duration::milliseconds(parse_var(
            "HEARTBEAT_WINDOW_MS",
            DEFAULT_HEARTBEAT_WINDOW_MS,
        )?);
        config.stale_reset_after =
            chrono::Duration::seconds(parse_var("STALE_RESET_SECS", DEFAULT_STALE_RESET_SECS)?);
        config.compile_timeout =
            Duration::from_secs(parse_var("COMPILE_TIMEOUT_SECS", DEFAULT_COMPILE_TIMEOUT_SECS)?);
        config.judge_case_timeout = Duration::from_secs(parse_var(
            "JUDGE_CASE_TIMEOUT_SECS",
            DEFAULT_JUDGE_CASE_TIMEOUT_SECS,
        )?);
        config.max_judge_timeout = Duration::from_secs(parse_var(
            "MAX_JUDGE_TIMEOUT_SECS",
            DEFAULT_MAX_JUDGE_TIMEOUT_SECS,
        )?);
        config.ping_timeout =
            Duration::from_secs(parse_var("PING_TIMEOUT_SECS", DEFAULT_PING_TIMEOUT_SECS)?);
        config.acm_penalty_secs = parse_var("ACM_PENALTY_SECS", DEFAULT_ACM_PENALTY_SECS)?;
        config.server_lock_ttl =
            Duration::from_millis(parse_var("SERVER_LOCK_TTL_MS", DEFAULT_SERVER_LOCK_TTL_MS)?);
        config.server_lock_wait =
            Duration::from_millis(parse_var("SERVER_LOCK_WAIT_MS", DEFAULT_SERVER_LOCK_WAIT_MS)?);

        Ok(config)
    }

    /// The shared secret itself
    pub fn token(&self) -> &str {
        &self.token
    }

    /// `sha256_hex(token)`, the value carried in `X-Judge-Server-Token`
    pub fn token_hash(&self) -> &str {
        &self.token_hash
    }

    /// Total judge RPC timeout for a problem with `cases` test cases
    pub fn judge_timeout(&self, cases: usize) -> Duration {
        let cases = u32::try_from(cases.max(1)).unwrap_or(u32::MAX);
        self.judge_case_timeout
            .saturating_mul(cases)
            .min(self.max_judge_timeout)
    }

    /// Longest a live attempt can hold a submission in JUDGING
    ///
    /// Covers a special-judge compile, the capped judge call and a margin for
    /// persisting the verdict.
    pub fn attempt_budget(&self) -> Duration {
        self.compile_timeout
            .saturating_add(self.max_judge_timeout)
            .saturating_add(Duration::from_secs(ATTEMPT_MARGIN_SECS))
    }
}

impl std::fmt::Debug for JudgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeConfig")
            .field("token", &"<redacted>")
            .field("heartbeat_window", &self.heartbeat_window)
            .field("stale_reset_after", &self.stale_reset_after)
            .field("compile_timeout", &self.compile_timeout)
            .field("judge_case_timeout", &self.judge_case_timeout)
            .field("max_judge_timeout", &self.max_judge_timeout)
            .field("ping_timeout", &self.ping_timeout)
            .field("acm_penalty_secs", &self.acm_penalty_secs)
            .finish_non_exhaustive()
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_DISPATCH_WORKERS,
            queue_block_timeout: Duration::from_secs(DEFAULT_QUEUE_BLOCK_TIMEOUT_SECS),
            backoff_base: Duration::from_millis(DEFAULT_RETRY_BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(DEFAULT_RETRY_BACKOFF_CAP_MS),
            lease_ttl: Duration::from_secs(DEFAULT_LEASE_TTL_SECS),
            stuck_after: chrono::Duration::seconds(DEFAULT_STUCK_AFTER_SECS),
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            probe_stale_servers: true,
        }
    }
}

impl DispatchConfig {
    /// Leases and the stuck cutoff must outlast any live attempt
    pub fn check_covers(&self, judge: &JudgeConfig) -> Result<(), ConfigError> {
        let budget = judge.attempt_budget();
        if self.lease_ttl < budget {
            return Err(ConfigError::TooShort {
                name: "LEASE_TTL_SECS".to_string(),
                min_secs: budget.as_secs(),
            });
        }
        if self.stuck_after.to_std().unwrap_or_default() < budget {
            return Err(ConfigError::TooShort {
                name: "STUCK_AFTER_SECS".to_string(),
                min_secs: budget.as_secs(),
            });
        }
        Ok(())
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let workers: usize = parse_var("DISPATCH_WORKERS", DEFAULT_DISPATCH_WORKERS)?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue("DISPATCH_WORKERS".to_string()));
        }

        Ok(Self {
            workers,
            queue_block_timeout: Duration::from_secs(parse_var(
                "QUEUE_BLOCK_TIMEOUT_SECS",
                DEFAULT_QUEUE_BLOCK_TIMEOUT_SECS,
            )?),
            backoff_base: Duration::from_millis(parse_var(
                "RETRY_BACKOFF_BASE_MS",
                DEFAULT_RETRY_BACKOFF_BASE_MS,
            )?),
            backoff_cap: Duration::from_millis(parse_var(
                "RETRY_BACKOFF_CAP_MS",
                DEFAULT_RETRY_BACKOFF_CAP_MS,
            )?),
            lease_ttl: Duration::from_secs(parse_var("LEASE_TTL_SECS", DEFAULT_LEASE_TTL_SECS)?),
            stuck_after: chrono::Duration::seconds(parse_var(
                "STUCK_AFTER_SECS",
                DEFAULT_STUCK_AFTER_SECS,
            )?),
            reconcile_interval: Duration::from_secs(parse_var(
                "RECONCILE_INTERVAL_SECS",
                DEFAULT_RECONCILE_INTERVAL_SECS,
            )?),
            probe_stale_servers: parse_var("PROBE_STALE_SERVERS", defaults.probe_stale_servers)?,
        })
    }
}

/// Read `name` from the environment, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),

    #[error("{name} must be at least {min_secs} seconds to outlast a judge attempt")]
    TooShort { name: String, min_secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge_config_defaults() {
        let config = JudgeConfig::new("secret");

        assert_eq!(config.heartbeat_window, chrono::Duration::seconds(6));
        assert_eq!(config.stale_reset_after, chrono::Duration::seconds(60));
        assert_eq!(config.compile_timeout, Duration::from_secs(20));
        assert_eq!(config.judge_case_timeout, Duration::from_secs(20));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
        assert_eq!(config.acm_penalty_secs, 1200);
    }

    #[test]
    fn test_token_hash_is_lowercase_sha256() {
        let config = JudgeConfig::new("abc");
        assert_eq!(
            config.token_hash(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(config.token(), "abc");
    }

    #[test]
    fn test_judge_timeout_scales_with_cases() {
        let config = JudgeConfig::new("secret");
        assert_eq!(config.judge_timeout(0), Duration::from_secs(20));
        assert_eq!(config.judge_timeout(3), Duration::from_secs(60));
    }

    #[test]
    fn test_judge_timeout_is_capped() {
        let config = JudgeConfig::new("secret");
        assert_eq!(config.judge_timeout(100), Duration::from_secs(600));
        assert_eq!(config.attempt_budget(), Duration::from_secs(680));
    }

    #[test]
    fn test_default_dispatch_outlasts_any_attempt() {
        let judge = JudgeConfig::new("secret");
        let dispatch = DispatchConfig::default();
        assert!(dispatch.check_covers(&judge).is_ok());
        assert!(dispatch.lease_ttl >= judge.compile_timeout + judge.judge_timeout(1_000));
    }

    #[test]
    fn test_short_stuck_cutoff_is_rejected() {
        let judge = JudgeConfig::new("secret");
        let dispatch = DispatchConfig {
            stuck_after: chrono::Duration::seconds(300),
            ..DispatchConfig::default()
        };
        assert!(matches!(
            dispatch.check_covers(&judge),
            Err(ConfigError::TooShort { name, min_secs: 680 }) if name == "STUCK_AFTER_SECS"
        ));

        let mut judge = JudgeConfig::new("secret");
        judge.max_judge_timeout = Duration::from_secs(1_200);
        assert!(matches!(
            DispatchConfig::default().check_covers(&judge),
            Err(ConfigError::TooShort { name, .. }) if name == "LEASE_TTL_SECS"
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", JudgeConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_dispatch_defaults() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.backoff_base, Duration::from_secs(1));
        assert_eq!(dispatch.backoff_cap, Duration::from_secs(30));
        assert!(dispatch.workers > 0);
    }
}
