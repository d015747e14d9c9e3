//! Verdict aggregation
//!
//! Pure functions from a sandbox report to the submission-level outcome.

use crate::{
    constants::{judge_failures, sandbox_errors},
    models::{CaseResult, JudgeInfo, JudgeOutcome, JudgeStatus, Problem, RuleType, StatisticInfo},
};

/// Aggregate per-case results for `problem`
///
/// Priority: all accepted, then any system error, then partial credit on OI
/// problems, then the first non-accepted case in test case order.
pub fn aggregate(problem: &Problem, cases: Vec<CaseResult>) -> JudgeOutcome {
    if cases.is_empty() {
        return JudgeOutcome {
            result: JudgeStatus::SystemError,
            statistic_info: StatisticInfo::default(),
            info: JudgeInfo::failure(
                judge_failures::NO_TEST_CASE_RESULTS,
                "Judge server returned no test case results",
            ),
        };
    }

    let is_oi = problem.rule_type == RuleType::Oi;

    let cases: Vec<CaseResult> = cases
        .into_iter()
        .enumerate()
        .map(|(position, mut case)| {
            case.score = is_oi.then(|| {
                if case.result.is_accepted() {
                    problem.case_score(&case.test_case, position)
                } else {
                    0
                }
            });
            case
        })
        .collect();

    let accepted = cases.iter().filter(|c| c.result.is_accepted()).count();

    let result = if accepted == cases.len() {
        JudgeStatus::Accepted
    } else if cases.iter().any(|c| c.result == JudgeStatus::SystemError) {
        JudgeStatus::SystemError
    } else if is_oi && accepted > 0 {
        JudgeStatus::PartiallyAccepted
    } else {
        cases
            .iter()
            .map(|c| c.result)
            .find(|r| !r.is_accepted())
            .unwrap_or(JudgeStatus::SystemError)
    };

    let statistic_info = StatisticInfo {
        time_cost: cases.iter().map(|c| c.cpu_time).max(),
        memory_cost: cases.iter().map(|c| c.memory).max(),
        score: is_oi.then(|| cases.iter().filter_map(|c| c.score).sum()),
        err_info: None,
    };

    JudgeOutcome {
        result,
        statistic_info,
        info: JudgeInfo::from_cases(cases),
    }
}

/// Outcome of a submission the sandbox could not compile
pub fn compile_error(message: impl Into<String>) -> JudgeOutcome {
    let message = message.into();
    JudgeOutcome {
        result: JudgeStatus::CompileError,
        statistic_info: StatisticInfo {
            err_info: Some(message.clone()),
            ..StatisticInfo::default()
        },
        info: JudgeInfo::failure(sandbox_errors::COMPILE_ERROR, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::problem::fixtures::problem;

    const MB: i64 = 1024 * 1024;

    fn case(n: usize, result: JudgeStatus, cpu: i64, mem_mb: i64) -> CaseResult {
        CaseResult {
            test_case: n.to_string(),
            result,
            cpu_time: cpu,
            real_time: cpu * 2,
            memory: mem_mb * MB,
            signal: 0,
            exit_code: 0,
            error: 0,
            output_md5: None,
            output: None,
            score: None,
        }
    }

    use JudgeStatus::*;

    #[test]
    fn test_acm_all_accepted() {
        let p = problem(1, RuleType::Acm, &[30, 30, 40]);
        let outcome = aggregate(
            &p,
            vec![case(1, Accepted, 10, 1), case(2, Accepted, 20, 2), case(3, Accepted, 15, 1)],
        );

        assert_eq!(outcome.result, Accepted);
        assert_eq!(outcome.statistic_info.time_cost, Some(20));
        assert_eq!(outcome.statistic_info.memory_cost, Some(2 * MB));
        assert_eq!(outcome.statistic_info.score, None);
        assert_eq!(outcome.info.cases.len(), 3);
    }

    #[test]
    fn test_acm_first_failure_wins() {
        let p = problem(1, RuleType::Acm, &[30, 30, 40]);
        let outcome = aggregate(
            &p,
            vec![
                case(1, Accepted, 1, 1),
                case(2, CpuTimeLimitExceeded, 1000, 1),
                case(3, WrongAnswer, 1, 1),
            ],
        );
        assert_eq!(outcome.result, CpuTimeLimitExceeded);
    }

    #[test]
    fn test_system_error_takes_priority() {
        let p = problem(1, RuleType::Oi, &[50, 50]);
        let outcome = aggregate(&p, vec![case(1, WrongAnswer, 1, 1), case(2, SystemError, 1, 1)]);
        assert_eq!(outcome.result, SystemError);
    }

    #[test]
    fn test_oi_partial_scores_accepted_cases() {
        let p = problem(2, RuleType::Oi, &[50, 50]);
        let outcome = aggregate(&p, vec![case(1, Accepted, 1, 1), case(2, WrongAnswer, 1, 1)]);

        assert_eq!(outcome.result, PartiallyAccepted);
        assert_eq!(outcome.score(), 50);
        assert_eq!(outcome.info.cases[0].score, Some(50));
        assert_eq!(outcome.info.cases[1].score, Some(0));
    }

    #[test]
    fn test_oi_nothing_accepted_is_first_failure() {
        let p = problem(2, RuleType::Oi, &[50, 50]);
        let outcome = aggregate(
            &p,
            vec![case(1, MemoryLimitExceeded, 1, 1), case(2, WrongAnswer, 1, 1)],
        );
        assert_eq!(outcome.result, MemoryLimitExceeded);
        assert_eq!(outcome.score(), 0);
    }

    #[test]
    fn test_empty_report_is_system_error() {
        let p = problem(1, RuleType::Acm, &[100]);
        let outcome = aggregate(&p, Vec::new());
        assert_eq!(outcome.result, SystemError);
        assert_eq!(outcome.info.err.as_deref(), Some("NoTestCaseResults"));
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let p = problem(2, RuleType::Oi, &[20, 30, 50]);
        let cases = vec![case(1, Accepted, 3, 1), case(2, RuntimeError, 8, 4), case(3, Accepted, 5, 2)];

        let first = aggregate(&p, cases.clone());
        let second = aggregate(&p, first.info.cases.clone());
        assert_eq!(first, second);
        assert_eq!(first, aggregate(&p, cases));
        assert_eq!(first.score(), 70);
    }

    #[test]
    fn test_compile_error_outcome() {
        let outcome = compile_error("main.c:3: error: expected ';'");
        assert_eq!(outcome.result, CompileError);
        assert_eq!(
            outcome.statistic_info.err_info.as_deref(),
            Some("main.c:3: error: expected ';'")
        );
        assert_eq!(outcome.info.err.as_deref(), Some("CompileError"));
    }
}
