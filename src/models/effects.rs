//! Ledger of what a finalize transaction changed
//!
//! Stored on the submission so that rejudge knows which problem, profile and
//! rank counters this submission moved, and with which penalty.

use serde::{Deserialize, Serialize};

use super::problem::RuleType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterEffects {
    pub problem: ProblemEffect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acm_rank: Option<AcmRankEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oi_rank: Option<OiRankEffect>,
}

impl CounterEffects {
    /// Whether the submission was counted as accepted on its problem
    pub fn accepted(&self) -> bool {
        self.problem.accepted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemEffect {
    pub problem_id: i64,
    pub language: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEffect {
    pub user_id: i64,
    pub problem_id: i64,
    pub rule_type: RuleType,
    /// Entry lives in `contest_problems` and no profile counter moved
    pub contest: bool,
    pub first_accept: bool,
    pub score_added: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmRankEffect {
    pub user_id: i64,
    pub contest_id: i64,
    pub problem_id: i64,
    pub cell_existed: bool,
    pub became_ac: bool,
    pub error_added: bool,
    /// `ac_time + penalties` added to `total_time`
    pub time_added: i64,
    pub first_ac: bool,
    /// Penalty per wrong attempt in force when this was applied
    pub penalty_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OiRankEffect {
    pub user_id: i64,
    pub contest_id: i64,
    pub problem_id: i64,
    pub prior_score: Option<i32>,
    /// Score recorded in the cell after this submission
    pub recorded_score: i32,
    pub score_added: i64,
}
