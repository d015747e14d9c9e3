//! Problem model

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    constants::io_modes,
    error::{AppError, AppResult},
};

/// Scoring rule of a problem or contest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleType {
    #[serde(rename = "ACM")]
    Acm,
    #[serde(rename = "OI")]
    Oi,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acm => "ACM",
            Self::Oi => "OI",
        }
    }
}

impl FromStr for RuleType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACM" => Ok(Self::Acm),
            "OI" => Ok(Self::Oi),
            other => Err(AppError::MalformedRecord(format!("unknown rule type: {}", other))),
        }
    }
}

/// Score of one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseScore {
    pub input_name: String,
    pub output_name: String,
    pub score: i32,
}

/// How the program reads input and writes output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoMode {
    pub io_mode: String,
    pub input: String,
    pub output: String,
}

impl Default for IoMode {
    fn default() -> Self {
        Self {
            io_mode: io_modes::STANDARD.to_string(),
            input: "input.txt".to_string(),
            output: "output.txt".to_string(),
        }
    }
}

impl IoMode {
    pub fn is_file_io(&self) -> bool {
        self.io_mode == io_modes::FILE
    }
}

/// Problem model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    /// Display id shown to users
    #[serde(rename = "_id")]
    pub display_id: String,
    pub contest_id: Option<i64>,
    pub rule_type: RuleType,
    /// Milliseconds
    pub time_limit: i32,
    /// Megabytes
    pub memory_limit: i32,
    pub test_case_id: String,
    pub test_case_score: Vec<TestCaseScore>,
    pub spj: bool,
    pub spj_language: Option<String>,
    pub spj_code: Option<String>,
    pub spj_version: Option<String>,
    pub spj_compile_ok: bool,
    /// `spj_version` that the last successful SPJ compile used
    pub spj_compiled_version: Option<String>,
    pub languages: Vec<String>,
    pub template: BTreeMap<String, String>,
    pub io_mode: IoMode,
    /// Submissions per language
    pub statistic_info: BTreeMap<String, i64>,
    pub submission_number: i64,
    pub accepted_number: i64,
    pub total_score: i32,
}

impl Problem {
    /// Whether the special judge must be (re)compiled before judging
    pub fn needs_spj_compile(&self) -> bool {
        self.spj && (!self.spj_compile_ok || self.spj_compiled_version != self.spj_version)
    }

    /// Memory limit in bytes, as the sandbox expects it
    pub fn max_memory_bytes(&self) -> i64 {
        i64::from(self.memory_limit) * 1024 * 1024
    }

    /// Score of the test case named `test_case` (1-based), falling back to `position`
    pub fn case_score(&self, test_case: &str, position: usize) -> i32 {
        let by_name = test_case
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| self.test_case_score.get(index));
        by_name
            .or_else(|| self.test_case_score.get(position))
            .map(|case| case.score)
            .unwrap_or(0)
    }

    /// Reject rows whose stored JSON violates the model's invariants
    pub fn validate(&self) -> AppResult<()> {
        if self.accepted_number > self.submission_number {
            return Err(AppError::MalformedRecord(format!(
                "problem {}: accepted_number {} exceeds submission_number {}",
                self.id, self.accepted_number, self.submission_number
            )));
        }
        if let Some(case) = self.test_case_score.iter().find(|case| case.score < 0) {
            return Err(AppError::MalformedRecord(format!(
                "problem {}: negative score on test case {}",
                self.id, case.input_name
            )));
        }
        if let Some((language, count)) = self.statistic_info.iter().find(|(_, n)| **n < 0) {
            return Err(AppError::MalformedRecord(format!(
                "problem {}: negative statistic {} for {}",
                self.id, count, language
            )));
        }
        if self.spj && (self.spj_language.is_none() || self.spj_code.is_none()) {
            return Err(AppError::MalformedRecord(format!(
                "problem {}: special judge without language or code",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A problem with one test case per entry of `scores`
    pub fn problem(id: i64, rule_type: RuleType, scores: &[i32]) -> Problem {
        Problem {
            id,
            display_id: format!("P{}", id),
            contest_id: None,
            rule_type,
            time_limit: 1000,
            memory_limit: 256,
            test_case_id: format!("tc-{}", id),
            test_case_score: scores
                .iter()
                .enumerate()
                .map(|(i, score)| TestCaseScore {
                    input_name: format!("{}.in", i + 1),
                    output_name: format!("{}.out", i + 1),
                    score: *score,
                })
                .collect(),
            spj: false,
            spj_language: None,
            spj_code: None,
            spj_version: None,
            spj_compile_ok: false,
            spj_compiled_version: None,
            languages: vec!["C".to_string(), "C++".to_string(), "Python3".to_string()],
            template: BTreeMap::new(),
            io_mode: IoMode::default(),
            statistic_info: BTreeMap::new(),
            submission_number: 0,
            accepted_number: 0,
            total_score: scores.iter().sum(),
        }
    }

    /// A problem judged by a special judge written in C
    pub fn spj_problem(id: i64, version: &str) -> Problem {
        Problem {
            spj: true,
            spj_language: Some("C".to_string()),
            spj_code: Some("int main() { return 0; }".to_string()),
            spj_version: Some(version.to_string()),
            ..problem(id, RuleType::Acm, &[0, 0])
        }
    }
}
