//! Contest and contest rank models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::problem::RuleType;
use crate::error::{AppError, AppResult};

/// Contest model (only what ranking needs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    pub id: i64,
    pub rule_type: RuleType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Contest {
    /// Whether `at` falls inside `[start_time, end_time)`
    pub fn is_underway_at(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at < self.end_time
    }

    /// Whole seconds from the contest start to `at`, never negative
    pub fn elapsed_secs(&self, at: DateTime<Utc>) -> i64 {
        at.signed_duration_since(self.start_time).num_seconds().max(0)
    }
}

/// One problem's cell in an ACM rank row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmProblemInfo {
    pub is_ac: bool,
    /// Seconds from contest start to the accepted submission
    pub ac_time: i64,
    /// Wrong attempts before the first AC
    pub error_number: i64,
    pub is_first_ac: bool,
}

/// ACM contest rank row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcmContestRank {
    pub user_id: i64,
    pub contest_id: i64,
    pub submission_number: i64,
    pub accepted_number: i64,
    /// Seconds, penalties included
    pub total_time: i64,
    pub submission_info: BTreeMap<i64, AcmProblemInfo>,
}

impl AcmContestRank {
    pub fn new(user_id: i64, contest_id: i64) -> Self {
        Self {
            user_id,
            contest_id,
            submission_number: 0,
            accepted_number: 0,
            total_time: 0,
            submission_info: BTreeMap::new(),
        }
    }

    /// Whether this row already holds an AC for `problem_id`
    pub fn has_ac(&self, problem_id: i64) -> bool {
        self.submission_info
            .get(&problem_id)
            .is_some_and(|info| info.is_ac)
    }

    pub fn validate(&self) -> AppResult<()> {
        let accepted = self.submission_info.values().filter(|i| i.is_ac).count() as i64;
        if accepted != self.accepted_number {
            return Err(AppError::MalformedRecord(format!(
                "acm rank (user {}, contest {}): accepted_number {} but {} accepted cells",
                self.user_id, self.contest_id, self.accepted_number, accepted
            )));
        }
        if self.submission_info.values().any(|i| i.is_first_ac && !i.is_ac) {
            return Err(AppError::MalformedRecord(format!(
                "acm rank (user {}, contest {}): first AC flag without AC",
                self.user_id, self.contest_id
            )));
        }
        Ok(())
    }
}

/// OI contest rank row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiContestRank {
    pub user_id: i64,
    pub contest_id: i64,
    pub submission_number: i64,
    pub total_score: i64,
    /// Best score per problem
    pub submission_info: BTreeMap<i64, i32>,
}

impl OiContestRank {
    pub fn new(user_id: i64, contest_id: i64) -> Self {
        Self {
            user_id,
            contest_id,
            submission_number: 0,
            total_score: 0,
            submission_info: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let sum: i64 = self.submission_info.values().map(|s| i64::from(*s)).sum();
        if sum != self.total_score {
            return Err(AppError::MalformedRecord(format!(
                "oi rank (user {}, contest {}): total_score {} but cells sum to {}",
                self.user_id, self.contest_id, self.total_score, sum
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_contest_window() {
        let start = Utc::now();
        let contest = Contest {
            id: 1,
            rule_type: RuleType::Acm,
            start_time: start,
            end_time: start + Duration::hours(5),
        };

        assert!(contest.is_underway_at(start));
        assert!(contest.is_underway_at(start + Duration::minutes(30)));
        assert!(!contest.is_underway_at(start + Duration::hours(5)));
        assert!(!contest.is_underway_at(start - Duration::seconds(1)));
        assert_eq!(contest.elapsed_secs(start + Duration::minutes(30)), 1800);
        assert_eq!(contest.elapsed_secs(start - Duration::minutes(1)), 0);
    }

    #[test]
    fn test_rank_validation() {
        let mut acm = AcmContestRank::new(1, 1);
        assert!(acm.validate().is_ok());
        acm.accepted_number = 1;
        assert!(acm.validate().is_err());

        let mut oi = OiContestRank::new(1, 1);
        oi.submission_info.insert(3, 50);
        assert!(oi.validate().is_err());
        oi.total_score = 50;
        assert!(oi.validate().is_ok());
    }
}
