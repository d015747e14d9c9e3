//! User profile model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{problem::RuleType, submission::JudgeStatus};
use crate::error::{AppError, AppResult};

/// A user's best known verdict on one problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemStatusEntry {
    pub status: JudgeStatus,
    /// Display id of the problem
    #[serde(rename = "_id")]
    pub display_id: String,
    /// Best score (OI buckets only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
}

/// Per-rule map of problem statuses, keyed by problem id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemsStatus {
    #[serde(default)]
    pub problems: BTreeMap<i64, ProblemStatusEntry>,
    #[serde(default)]
    pub contest_problems: BTreeMap<i64, ProblemStatusEntry>,
}

impl ProblemsStatus {
    /// `contest_problems` for contest submissions, `problems` otherwise
    pub fn map_mut(&mut self, contest: bool) -> &mut BTreeMap<i64, ProblemStatusEntry> {
        if contest {
            &mut self.contest_problems
        } else {
            &mut self.problems
        }
    }

    fn validate(&self, user_id: i64) -> AppResult<()> {
        let transient = self
            .problems
            .iter()
            .chain(self.contest_problems.iter())
            .find(|(_, entry)| !entry.status.is_terminal());
        if let Some((problem_id, entry)) = transient {
            return Err(AppError::MalformedRecord(format!(
                "user {}: problem {} recorded with non-terminal status {}",
                user_id, problem_id, entry.status
            )));
        }
        Ok(())
    }
}

/// User profile model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub acm_problems_status: ProblemsStatus,
    pub oi_problems_status: ProblemsStatus,
    pub accepted_number: i64,
    pub submission_number: i64,
    pub total_score: i64,
}

impl UserProfile {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    /// Status bucket used for problems of `rule_type`
    pub fn bucket(&self, rule_type: RuleType) -> &ProblemsStatus {
        match rule_type {
            RuleType::Acm => &self.acm_problems_status,
            RuleType::Oi => &self.oi_problems_status,
        }
    }

    pub fn bucket_mut(&mut self, rule_type: RuleType) -> &mut ProblemsStatus {
        match rule_type {
            RuleType::Acm => &mut self.acm_problems_status,
            RuleType::Oi => &mut self.oi_problems_status,
        }
    }

    /// Reject rows whose stored JSON violates the model's invariants
    pub fn validate(&self) -> AppResult<()> {
        self.acm_problems_status.validate(self.user_id)?;
        self.oi_problems_status.validate(self.user_id)?;
        if self.accepted_number < 0 || self.submission_number < 0 || self.total_score < 0 {
            return Err(AppError::MalformedRecord(format!(
                "user {}: negative profile counter",
                self.user_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_map_uses_string_keys() {
        let mut status = ProblemsStatus::default();
        status.problems.insert(
            42,
            ProblemStatusEntry {
                status: JudgeStatus::Accepted,
                display_id: "A+B".to_string(),
                score: None,
            },
        );

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["problems"]["42"]["status"], 0);
        assert_eq!(json["problems"]["42"]["_id"], "A+B");

        let parsed: ProblemsStatus = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn test_malformed_status_map_is_rejected() {
        let raw = serde_json::json!({"problems": {"1": {"status": "AC", "_id": "1"}}});
        assert!(serde_json::from_value::<ProblemsStatus>(raw).is_err());

        let raw = serde_json::json!({"problems": {"not-a-number": {"status": 0, "_id": "1"}}});
        assert!(serde_json::from_value::<ProblemsStatus>(raw).is_err());
    }

    #[test]
    fn test_validate_rejects_transient_status() {
        let mut profile = UserProfile::new(7);
        profile.acm_problems_status.problems.insert(
            1,
            ProblemStatusEntry {
                status: JudgeStatus::Judging,
                display_id: "1".to_string(),
                score: None,
            },
        );
        assert!(profile.validate().is_err());
    }
}
