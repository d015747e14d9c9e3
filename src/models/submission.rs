//! Submission model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::effects::CounterEffects;

/// Canonical submission / test-case result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum JudgeStatus {
    WrongAnswer = -1,
    Accepted = 0,
    CpuTimeLimitExceeded = 1,
    RealTimeLimitExceeded = 2,
    MemoryLimitExceeded = 3,
    RuntimeError = 4,
    SystemError = 5,
    Pending = 6,
    Judging = 7,
    PartiallyAccepted = 8,
    CompileError = 9,
}

impl JudgeStatus {
    /// Numeric code as stored and exchanged with the sandbox
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parse a numeric result code
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => Self::WrongAnswer,
            0 => Self::Accepted,
            1 => Self::CpuTimeLimitExceeded,
            2 => Self::RealTimeLimitExceeded,
            3 => Self::MemoryLimitExceeded,
            4 => Self::RuntimeError,
            5 => Self::SystemError,
            6 => Self::Pending,
            7 => Self::Judging,
            8 => Self::PartiallyAccepted,
            9 => Self::CompileError,
            _ => return None,
        })
    }

    /// Terminal results are never rescheduled except by rejudge
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Judging)
    }

    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }

    /// Get status as string
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WrongAnswer => "WRONG_ANSWER",
            Self::Accepted => "ACCEPTED",
            Self::CpuTimeLimitExceeded => "CPU_TIME_LIMIT_EXCEEDED",
            Self::RealTimeLimitExceeded => "REAL_TIME_LIMIT_EXCEEDED",
            Self::MemoryLimitExceeded => "MEMORY_LIMIT_EXCEEDED",
            Self::RuntimeError => "RUNTIME_ERROR",
            Self::SystemError => "SYSTEM_ERROR",
            Self::Pending => "PENDING",
            Self::Judging => "JUDGING",
            Self::PartiallyAccepted => "PARTIALLY_ACCEPTED",
            Self::CompileError => "COMPILE_ERROR",
        }
    }
}

impl TryFrom<i32> for JudgeStatus {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

impl std::fmt::Display for JudgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one test case, normalized from the sandbox response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub test_case: String,
    pub result: JudgeStatus,
    /// CPU time in milliseconds
    pub cpu_time: i64,
    /// Wall time in milliseconds
    pub real_time: i64,
    /// Peak memory in bytes
    pub memory: i64,
    #[serde(default)]
    pub signal: i32,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub error: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Points earned on OI problems
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
}

/// Per-case results plus failure detail, stored in `submission.info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub cases: Vec<CaseResult>,
}

impl JudgeInfo {
    pub fn from_cases(cases: Vec<CaseResult>) -> Self {
        Self {
            err: None,
            message: None,
            cases,
        }
    }

    pub fn failure(err: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            err: Some(err.into()),
            message: Some(message.into()),
            cases: Vec::new(),
        }
    }
}

/// Aggregated statistics stored in `submission.statistic_info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_cost: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_cost: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_info: Option<String>,
}

/// Verdict computed from a sandbox report, persisted before the finalize transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeOutcome {
    pub result: JudgeStatus,
    pub statistic_info: StatisticInfo,
    pub info: JudgeInfo,
}

impl JudgeOutcome {
    /// Points earned by the accepted cases
    pub fn score(&self) -> i32 {
        self.statistic_info.score.unwrap_or(0)
    }
}

/// Submission model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub problem_id: i64,
    pub contest_id: Option<i64>,
    pub user_id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub code: String,
    pub language: String,
    pub result: JudgeStatus,
    pub info: JudgeInfo,
    pub statistic_info: StatisticInfo,
    pub create_time: DateTime<Utc>,
    pub ip: Option<String>,
    /// Worker holding this submission's slot while it is JUDGING
    pub assigned_server_id: Option<i64>,
    pub judge_started_at: Option<DateTime<Utc>>,
    /// Verdict computed but not yet applied to the counters
    pub pending_outcome: Option<JudgeOutcome>,
    /// What the finalize transaction changed, reverted by rejudge
    pub counter_effects: Option<CounterEffects>,
}

impl Submission {
    /// Build a fresh PENDING submission
    pub fn new(
        id: impl Into<String>,
        problem_id: i64,
        contest_id: Option<i64>,
        user_id: i64,
        language: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            problem_id,
            contest_id,
            user_id,
            username: String::new(),
            code: code.into(),
            language: language.into(),
            result: JudgeStatus::Pending,
            info: JudgeInfo::default(),
            statistic_info: StatisticInfo::default(),
            create_time: Utc::now(),
            ip: None,
            assigned_server_id: None,
            judge_started_at: None,
            pending_outcome: None,
            counter_effects: None,
        }
    }

    /// Generate a new opaque submission id
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for code in -1..=9 {
            let status = JudgeStatus::from_code(code).expect("known code");
            assert_eq!(status.code(), code);
        }
        assert_eq!(JudgeStatus::from_code(10), None);
        assert_eq!(JudgeStatus::try_from(-2), Err(-2));
    }

    #[test]
    fn test_status_serializes_as_integer() {
        let json = serde_json::to_string(&JudgeStatus::PartiallyAccepted).unwrap();
        assert_eq!(json, "8");
        let parsed: JudgeStatus = serde_json::from_str("-1").unwrap();
        assert_eq!(parsed, JudgeStatus::WrongAnswer);
        assert!(serde_json::from_str::<JudgeStatus>("42").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JudgeStatus::Pending.is_terminal());
        assert!(!JudgeStatus::Judging.is_terminal());
        assert!(JudgeStatus::Accepted.is_terminal());
        assert!(JudgeStatus::CompileError.is_terminal());
    }

    #[test]
    fn test_generate_id_is_opaque_hex() {
        let id = Submission::generate_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
