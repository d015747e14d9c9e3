//! Application-wide constants
//!
//! This module contains all constant values used throughout the application.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// SERVER DEFAULTS
// =============================================================================

/// Default server host address
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

// =============================================================================
// DATABASE DEFAULTS
// =============================================================================

/// Default maximum database connections in the pool
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

/// Default Redis URL
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

// =============================================================================
// JUDGE SERVER REGISTRY
// =============================================================================

/// Header carrying `sha256_hex(judge_server_token)` on heartbeat and sandbox calls
pub const JUDGE_SERVER_TOKEN_HEADER: &str = "X-Judge-Server-Token";

/// The only heartbeat action workers send
pub const HEARTBEAT_ACTION: &str = "heartbeat";

/// A worker is healthy while its last heartbeat is younger than this
pub const DEFAULT_HEARTBEAT_WINDOW_MS: i64 = 6_000;

/// A heartbeat arriving after this much silence resets `task_number`
pub const DEFAULT_STALE_RESET_SECS: i64 = 60;

/// Longest accepted hostname
pub const MAX_HOSTNAME_LENGTH: u64 = 255;

// =============================================================================
// SANDBOX RPC
// =============================================================================

/// Compile RPC timeout (seconds)
pub const DEFAULT_COMPILE_TIMEOUT_SECS: u64 = 20;

/// Judge RPC timeout per test case (seconds)
pub const DEFAULT_JUDGE_CASE_TIMEOUT_SECS: u64 = 20;

/// Upper bound on one judge RPC, whatever the case count (seconds)
pub const DEFAULT_MAX_JUDGE_TIMEOUT_SECS: u64 = 600;

/// Slack on top of the RPC timeouts before an attempt counts as dead (seconds)
pub const ATTEMPT_MARGIN_SECS: u64 = 60;

/// Ping RPC timeout (seconds)
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 5;

/// Sandbox endpoint paths
pub mod endpoints {
    pub const PING: &str = "ping";
    pub const JUDGE: &str = "judge";
    pub const COMPILE_SPJ: &str = "compile_spj";
}

/// `err` values the sandbox puts in its response envelope
pub mod sandbox_errors {
    pub const COMPILE_ERROR: &str = "CompileError";
    pub const SPJ_COMPILE_ERROR: &str = "SPJCompileError";
}

/// `err` values recorded in a submission's `info` when judging could not run
pub mod judge_failures {
    pub const JUDGE_SERVER_ERROR: &str = "JudgeServerError";
    pub const SPJ_COMPILE_ERROR: &str = "SPJCompileError";
    pub const UNSUPPORTED_LANGUAGE: &str = "UnsupportedLanguage";
    pub const NO_TEST_CASE_RESULTS: &str = "NoTestCaseResults";
}

// =============================================================================
// SELECTION LOCK
// =============================================================================

/// Redis key of the selection mutex
pub const JUDGE_SERVER_LOCK_KEY: &str = "judge_server_lock";

/// Selection mutex expiry (milliseconds)
pub const DEFAULT_SERVER_LOCK_TTL_MS: u64 = 5_000;

/// How long a dispatcher waits for the selection mutex (milliseconds)
pub const DEFAULT_SERVER_LOCK_WAIT_MS: u64 = 3_000;

/// Poll interval while waiting for the selection mutex (milliseconds)
pub const SERVER_LOCK_POLL_MS: u64 = 20;

// =============================================================================
// CONTEST SCORING
// =============================================================================

/// ACM penalty per wrong attempt before AC (seconds)
pub const DEFAULT_ACM_PENALTY_SECS: i64 = 20 * 60;

// =============================================================================
// WORK QUEUE
// =============================================================================

/// Redis keys used by the work queue
pub mod queue_keys {
    /// Ready submissions (LPUSH / BRPOP)
    pub const READY: &str = "judge:queue";
    /// Backoff retries, scored by ready-at unix millis
    pub const DELAYED: &str = "judge:delayed";
    /// Prefix of per-submission delivery leases
    pub const LEASE_PREFIX: &str = "judge:lease:";
}

/// Default number of dispatcher tasks
pub const DEFAULT_DISPATCH_WORKERS: usize = 4;

/// Blocking pop timeout (seconds)
pub const DEFAULT_QUEUE_BLOCK_TIMEOUT_SECS: u64 = 5;

/// First retry delay after `NO_SERVER` (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_BASE_MS: u64 = 1_000;

/// Retry delay cap (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_CAP_MS: u64 = 30_000;

/// Delivery lease lifetime (seconds)
pub const DEFAULT_LEASE_TTL_SECS: u64 = 900;

/// A JUDGING submission older than this is handed to the reconciler (seconds)
pub const DEFAULT_STUCK_AFTER_SECS: i64 = 900;

/// Reconciler period (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;

/// Maximum number of delayed tasks promoted per sweep
pub const DELAYED_PROMOTE_BATCH: isize = 100;

// =============================================================================
// SUPPORTED LANGUAGES
// =============================================================================

/// Language identifiers, as stored on submissions
pub mod languages {
    pub const C: &str = "C";
    pub const CPP: &str = "C++";
    pub const JAVA: &str = "Java";
    pub const PYTHON2: &str = "Python2";
    pub const PYTHON3: &str = "Python3";
    pub const GO: &str = "Golang";
    pub const JAVASCRIPT: &str = "JavaScript";

    /// All supported language identifiers
    pub const ALL: &[&str] = &[C, CPP, JAVA, PYTHON2, PYTHON3, GO, JAVASCRIPT];

    /// Languages that can be used to write a special judge
    pub const SPJ: &[&str] = &[C, CPP];
}

/// Problem I/O modes
pub mod io_modes {
    pub const STANDARD: &str = "Standard IO";
    pub const FILE: &str = "File IO";
}

/// Seccomp rule names understood by the sandbox
pub mod seccomp_rules {
    pub const C_CPP: &str = "c_cpp";
    pub const C_CPP_FILE_IO: &str = "c_cpp_file_io";
    pub const GENERAL: &str = "general";
    pub const NODE: &str = "node";
}
