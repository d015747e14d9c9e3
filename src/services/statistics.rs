//! Counter and statistics rules
//!
//! Pure functions applied by every storage backend inside its finalize
//! transaction. Each `apply_*` returns the ledger entry recording what it
//! changed. On rejudge the `revert_*` counterparts take the submission out
//! and rebuild the shared cells from the user's other finalized submissions
//! on the same problem, so an AC or a score another submission also earned
//! survives.

use crate::models::{
    AcmContestRank, AcmProblemInfo, AcmRankEffect, Contest, CounterEffects, JudgeOutcome,
    JudgeStatus, OiContestRank, OiRankEffect, Problem, ProblemEffect, ProblemStatusEntry,
    ProfileEffect, RuleType, Submission, UserProfile,
};

/// Rank table a submission counts towards, if any
///
/// Contest submissions only move the rank while the contest is underway.
pub fn rank_rule(submission: &Submission, contest: Option<&Contest>) -> Option<RuleType> {
    contest
        .filter(|c| Some(c.id) == submission.contest_id)
        .filter(|c| c.is_underway_at(submission.create_time))
        .map(|c| c.rule_type)
}

/// Finalized submissions whose ledger passes `counts`, oldest first
fn survivors<'a>(
    others: &'a [Submission],
    counts: impl Fn(&Submission, &CounterEffects) -> bool,
) -> Vec<&'a Submission> {
    let mut kept: Vec<&Submission> = others
        .iter()
        .filter(|s| s.counter_effects.as_ref().is_some_and(|e| counts(s, e)))
        .collect();
    kept.sort_by(|a, b| a.create_time.cmp(&b.create_time).then_with(|| a.id.cmp(&b.id)));
    kept
}

fn score_of(submission: &Submission) -> i32 {
    submission.statistic_info.score.unwrap_or(0)
}

// =============================================================================
// PROBLEM
// =============================================================================

pub fn apply_problem(problem: &mut Problem, language: &str, result: JudgeStatus) -> ProblemEffect {
    let accepted = result.is_accepted();
    problem.submission_number += 1;
    if accepted {
        problem.accepted_number += 1;
    }
    *problem
        .statistic_info
        .entry(language.to_string())
        .or_insert(0) += 1;

    ProblemEffect {
        problem_id: problem.id,
        language: language.to_string(),
        accepted,
    }
}

pub fn revert_problem(problem: &mut Problem, effect: &ProblemEffect) {
    problem.submission_number = (problem.submission_number - 1).max(0);
    if effect.accepted {
        problem.accepted_number = (problem.accepted_number - 1).max(0);
    }
    problem.accepted_number = problem.accepted_number.min(problem.submission_number);

    if let Some(count) = problem.statistic_info.get_mut(&effect.language) {
        *count -= 1;
        if *count <= 0 {
            problem.statistic_info.remove(&effect.language);
        }
    }
}

// =============================================================================
// USER PROFILE
// =============================================================================

/// Bucket entry after merging `result` into `prior`; `None` while an AC holds it
fn merged_entry(
    prior: Option<&ProblemStatusEntry>,
    problem: &Problem,
    result: JudgeStatus,
    score: i32,
) -> Option<ProblemStatusEntry> {
    if prior.is_some_and(|entry| entry.status.is_accepted()) {
        return None;
    }
    let score = match problem.rule_type {
        RuleType::Oi => Some(prior.and_then(|entry| entry.score).unwrap_or(0).max(score)),
        RuleType::Acm => None,
    };
    Some(ProblemStatusEntry {
        status: result,
        display_id: problem.display_id.clone(),
        score,
    })
}

/// Merge a verdict into the user's profile
///
/// An ACCEPTED entry is never downgraded. Only the first AC of a non-contest
/// submission moves `accepted_number` (and, for OI, `total_score`).
pub fn apply_profile(
    profile: &mut UserProfile,
    problem: &Problem,
    contest: bool,
    result: JudgeStatus,
    score: i32,
) -> ProfileEffect {
    let rule_type = problem.rule_type;
    if !contest {
        profile.submission_number += 1;
    }

    let map = profile.bucket_mut(rule_type).map_mut(contest);
    let merged = merged_entry(map.get(&problem.id), problem, result, score);
    let prior_ac = merged.is_none();
    if let Some(entry) = merged {
        map.insert(problem.id, entry);
    }

    let first_accept = !contest && !prior_ac && result.is_accepted();
    let mut score_added = 0;
    if first_accept {
        profile.accepted_number += 1;
        if rule_type == RuleType::Oi {
            score_added = i64::from(problem.total_score);
            profile.total_score += score_added;
        }
    }

    ProfileEffect {
        user_id: profile.user_id,
        problem_id: problem.id,
        rule_type,
        contest,
        first_accept,
        score_added,
    }
}

/// Take a submission out of the profile
///
/// `others` are the user's other finalized submissions on `problem`. The
/// bucket entry is replayed from them, so the AC stays while any of them
/// still holds one.
pub fn revert_profile(
    profile: &mut UserProfile,
    effect: &ProfileEffect,
    problem: &Problem,
    others: &[Submission],
) {
    if !effect.contest {
        profile.submission_number = (profile.submission_number - 1).max(0);
    }

    let rebuilt = survivors(others, |s, e| {
        e.profile.is_some() && s.contest_id.is_some() == effect.contest
    })
    .into_iter()
    .fold(None, |entry: Option<ProblemStatusEntry>, s| {
        merged_entry(entry.as_ref(), problem, s.result, score_of(s)).or(entry)
    });

    let map = profile.bucket_mut(effect.rule_type).map_mut(effect.contest);
    let had_ac = map
        .get(&effect.problem_id)
        .is_some_and(|entry| entry.status.is_accepted());
    let has_ac = rebuilt.as_ref().is_some_and(|entry| entry.status.is_accepted());
    match rebuilt {
        Some(entry) => {
            map.insert(effect.problem_id, entry);
        }
        None => {
            map.remove(&effect.problem_id);
        }
    }

    if !effect.contest && had_ac && !has_ac {
        profile.accepted_number = (profile.accepted_number - 1).max(0);
        if effect.rule_type == RuleType::Oi {
            profile.total_score = (profile.total_score - i64::from(problem.total_score)).max(0);
        }
    }
}

// =============================================================================
// ACM CONTEST RANK
// =============================================================================

/// Whether applying `result` would make this row's first AC on `problem_id`
pub fn acm_would_accept(rank: &AcmContestRank, problem_id: i64, result: JudgeStatus) -> bool {
    result.is_accepted() && !rank.has_ac(problem_id)
}

/// Apply a verdict to an ACM rank row
///
/// `first_ac_available` must have been decided under the lock that guards
/// first-AC uniqueness for `(contest, problem)`.
pub fn apply_acm_rank(
    rank: &mut AcmContestRank,
    problem_id: i64,
    result: JudgeStatus,
    ac_time: i64,
    first_ac_available: bool,
    penalty_secs: i64,
) -> AcmRankEffect {
    rank.submission_number += 1;
    let cell_existed = rank.submission_info.contains_key(&problem_id);
    let cell = rank.submission_info.entry(problem_id).or_default();

    let mut effect = AcmRankEffect {
        user_id: rank.user_id,
        contest_id: rank.contest_id,
        problem_id,
        cell_existed,
        became_ac: false,
        error_added: false,
        time_added: 0,
        first_ac: false,
        penalty_secs,
    };

    if cell.is_ac {
        return effect;
    }

    if result.is_accepted() {
        let time_added = ac_time + cell.error_number * penalty_secs;
        cell.is_ac = true;
        cell.ac_time = ac_time;
        cell.is_first_ac = first_ac_available;
        rank.total_time += time_added;
        rank.accepted_number += 1;

        effect.became_ac = true;
        effect.time_added = time_added;
        effect.first_ac = first_ac_available;
    } else {
        cell.error_number += 1;
        effect.error_added = true;
    }

    effect
}

/// What a revert did to the row's first-AC flag on the problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstAcChange {
    Unchanged,
    /// The row lost its AC and with it the first-AC flag
    Released,
    /// The row keeps the flag, carried by this accepted submission
    HeldBy(String),
}

/// Time a cell adds to `total_time`
fn acm_cell_time(cell: &AcmProblemInfo, penalty_secs: i64) -> i64 {
    if cell.is_ac {
        cell.ac_time + cell.error_number * penalty_secs
    } else {
        0
    }
}

/// Take a submission out of an ACM rank row
///
/// The problem's cell is replayed from `others`, the user's other finalized
/// submissions on the problem, keeping only those counted in this contest.
pub fn revert_acm_rank(
    rank: &mut AcmContestRank,
    effect: &AcmRankEffect,
    contest: &Contest,
    others: &[Submission],
) -> FirstAcChange {
    rank.submission_number = (rank.submission_number - 1).max(0);

    let Some(old) = rank.submission_info.get(&effect.problem_id).cloned() else {
        return FirstAcChange::Unchanged;
    };

    let counted = survivors(others, |_, e| {
        e.acm_rank
            .as_ref()
            .is_some_and(|r| r.contest_id == effect.contest_id)
    });
    let mut cell = AcmProblemInfo::default();
    let mut owner = None;
    for submission in &counted {
        if submission.result.is_accepted() {
            cell.is_ac = true;
            cell.ac_time = contest.elapsed_secs(submission.create_time);
            owner = Some(submission.id.clone());
            break;
        }
        cell.error_number += 1;
    }
    cell.is_first_ac = old.is_first_ac && cell.is_ac;

    rank.total_time = (rank.total_time - acm_cell_time(&old, effect.penalty_secs)
        + acm_cell_time(&cell, effect.penalty_secs))
    .max(0);
    rank.accepted_number = (rank.accepted_number - i64::from(old.is_ac) + i64::from(cell.is_ac)).max(0);

    if counted.is_empty() {
        rank.submission_info.remove(&effect.problem_id);
    } else {
        rank.submission_info.insert(effect.problem_id, cell);
    }

    match (old.is_first_ac, owner) {
        (false, _) => FirstAcChange::Unchanged,
        (true, Some(owner)) => FirstAcChange::HeldBy(owner),
        (true, None) => FirstAcChange::Released,
    }
}

// =============================================================================
// OI CONTEST RANK
// =============================================================================

pub fn apply_oi_rank(rank: &mut OiContestRank, problem_id: i64, score: i32) -> OiRankEffect {
    rank.submission_number += 1;
    let prior_score = rank.submission_info.get(&problem_id).copied();
    let prior = prior_score.unwrap_or(0);
    let score_added = i64::from((score - prior).max(0));
    let recorded_score = prior.max(score);

    rank.total_score += score_added;
    rank.submission_info.insert(problem_id, recorded_score);

    OiRankEffect {
        user_id: rank.user_id,
        contest_id: rank.contest_id,
        problem_id,
        prior_score,
        recorded_score,
        score_added,
    }
}

/// Take a submission out of an OI rank row
///
/// The cell becomes the best score among the user's other counted
/// submissions on the problem, or disappears if there are none.
pub fn revert_oi_rank(rank: &mut OiContestRank, effect: &OiRankEffect, others: &[Submission]) {
    rank.submission_number = (rank.submission_number - 1).max(0);

    let best = survivors(others, |_, e| {
        e.oi_rank
            .as_ref()
            .is_some_and(|r| r.contest_id == effect.contest_id)
    })
    .into_iter()
    .map(score_of)
    .max();

    let old = rank.submission_info.get(&effect.problem_id).copied().unwrap_or(0);
    rank.total_score = (rank.total_score - i64::from(old) + i64::from(best.unwrap_or(0))).max(0);
    match best {
        Some(score) => {
            rank.submission_info.insert(effect.problem_id, score);
        }
        None => {
            rank.submission_info.remove(&effect.problem_id);
        }
    }
}

// =============================================================================
// WHOLE OUTCOME
// =============================================================================

/// Contest rank row locked by the finalize transaction
pub enum RankRow<'a> {
    Acm(&'a mut AcmContestRank),
    Oi(&'a mut OiContestRank),
}

/// Apply a finalized verdict to every counter it touches
///
/// `rank` must be the row selected by [`rank_rule`], or `None` when the
/// submission does not count towards a contest rank.
#[allow(clippy::too_many_arguments)]
pub fn apply_outcome(
    submission: &Submission,
    problem: &mut Problem,
    profile: &mut UserProfile,
    contest: Option<&Contest>,
    rank: Option<RankRow<'_>>,
    outcome: &JudgeOutcome,
    first_ac_available: bool,
    penalty_secs: i64,
) -> CounterEffects {
    let result = outcome.result;
    let problem_effect = apply_problem(problem, &submission.language, result);
    let profile_effect = apply_profile(
        profile,
        problem,
        submission.contest_id.is_some(),
        result,
        outcome.score(),
    );

    let mut effects = CounterEffects {
        problem: problem_effect,
        profile: Some(profile_effect),
        acm_rank: None,
        oi_rank: None,
    };

    match (rank, contest) {
        (Some(RankRow::Acm(rank)), Some(contest)) => {
            let ac_time = contest.elapsed_secs(submission.create_time);
            effects.acm_rank = Some(apply_acm_rank(
                rank,
                problem.id,
                result,
                ac_time,
                first_ac_available,
                penalty_secs,
            ));
        }
        (Some(RankRow::Oi(rank)), Some(_)) => {
            effects.oi_rank = Some(apply_oi_rank(rank, problem.id, outcome.score()));
        }
        _ => {}
    }

    effects
}

/// Take back what [`apply_outcome`] recorded in `effects`
///
/// `others` must be the same user's other finalized submissions on the same
/// problem; shared cells are rebuilt from them. `contest` is required to
/// rebuild an ACM cell.
pub fn revert_outcome(
    effects: &CounterEffects,
    problem: &mut Problem,
    profile: Option<&mut UserProfile>,
    contest: Option<&Contest>,
    rank: Option<RankRow<'_>>,
    others: &[Submission],
) -> FirstAcChange {
    revert_problem(problem, &effects.problem);

    if let (Some(profile), Some(effect)) = (profile, &effects.profile) {
        revert_profile(profile, effect, problem, others);
    }

    match (rank, &effects.acm_rank, &effects.oi_rank) {
        (Some(RankRow::Acm(rank)), Some(effect), _) => match contest {
            Some(contest) => revert_acm_rank(rank, effect, contest, others),
            None => FirstAcChange::Unchanged,
        },
        (Some(RankRow::Oi(rank)), _, Some(effect)) => {
            revert_oi_rank(rank, effect, others);
            FirstAcChange::Unchanged
        }
        _ => FirstAcChange::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{problem::fixtures::problem, JudgeInfo, StatisticInfo};
    use chrono::{Duration, Utc};

    const PENALTY: i64 = 1200;

    /// One user's counters on one problem, fed through apply/revert like a store would
    struct Board {
        problem: Problem,
        profile: UserProfile,
        contest: Option<Contest>,
        acm: AcmContestRank,
        oi: OiContestRank,
        finalized: Vec<Submission>,
    }

    impl Board {
        fn practice(rule_type: RuleType) -> Self {
            Self {
                problem: problem(1, rule_type, &[50, 50]),
                profile: UserProfile::new(9),
                contest: None,
                acm: AcmContestRank::new(9, 3),
                oi: OiContestRank::new(9, 3),
                finalized: Vec::new(),
            }
        }

        fn contest(rule_type: RuleType) -> Self {
            let start = Utc::now() - Duration::hours(1);
            Self {
                contest: Some(Contest {
                    id: 3,
                    rule_type,
                    start_time: start,
                    end_time: start + Duration::hours(5),
                }),
                ..Self::practice(rule_type)
            }
        }

        fn judge(&mut self, id: &str, minute: i64, result: JudgeStatus, score: i32) {
            let contest_id = self.contest.as_ref().map(|c| c.id);
            let mut submission = Submission::new(id, self.problem.id, contest_id, 9, "C", "");
            if let Some(contest) = &self.contest {
                submission.create_time = contest.start_time + Duration::minutes(minute);
            } else {
                submission.create_time += Duration::minutes(minute);
            }
            let outcome = JudgeOutcome {
                result,
                statistic_info: StatisticInfo {
                    score: Some(score),
                    ..StatisticInfo::default()
                },
                info: JudgeInfo::default(),
            };

            let first_ac_available = acm_would_accept(&self.acm, self.problem.id, result);
            let rank = match self.contest.as_ref().map(|c| c.rule_type) {
                Some(RuleType::Acm) => Some(RankRow::Acm(&mut self.acm)),
                Some(RuleType::Oi) => Some(RankRow::Oi(&mut self.oi)),
                None => None,
            };
            let effects = apply_outcome(
                &submission,
                &mut self.problem,
                &mut self.profile,
                self.contest.as_ref(),
                rank,
                &outcome,
                first_ac_available,
                PENALTY,
            );

            submission.result = result;
            submission.statistic_info = outcome.statistic_info;
            submission.counter_effects = Some(effects);
            self.finalized.push(submission);
        }

        fn rejudge(&mut self, id: &str) -> FirstAcChange {
            let at = self
                .finalized
                .iter()
                .position(|s| s.id == id)
                .expect("finalized submission");
            let submission = self.finalized.remove(at);
            let effects = submission.counter_effects.expect("ledger");

            let rank = match self.contest.as_ref().map(|c| c.rule_type) {
                Some(RuleType::Acm) => Some(RankRow::Acm(&mut self.acm)),
                Some(RuleType::Oi) => Some(RankRow::Oi(&mut self.oi)),
                None => None,
            };
            revert_outcome(
                &effects,
                &mut self.problem,
                Some(&mut self.profile),
                self.contest.as_ref(),
                rank,
                &self.finalized,
            )
        }

        fn profile_status(&self) -> Option<JudgeStatus> {
            let bucket = self.profile.bucket(self.problem.rule_type);
            let map = if self.contest.is_some() {
                &bucket.contest_problems
            } else {
                &bucket.problems
            };
            map.get(&self.problem.id).map(|entry| entry.status)
        }
    }

    #[test]
    fn test_problem_counters() {
        let mut p = problem(1, RuleType::Acm, &[30, 30, 40]);

        apply_problem(&mut p, "C++", JudgeStatus::WrongAnswer);
        let effect = apply_problem(&mut p, "C++", JudgeStatus::Accepted);
        apply_problem(&mut p, "Python3", JudgeStatus::CompileError);

        assert_eq!(p.submission_number, 3);
        assert_eq!(p.accepted_number, 1);
        assert_eq!(p.statistic_info.get("C++"), Some(&2));
        assert_eq!(p.statistic_info.get("Python3"), Some(&1));
        assert!(p.accepted_number <= p.submission_number);

        revert_problem(&mut p, &effect);
        assert_eq!(p.submission_number, 2);
        assert_eq!(p.accepted_number, 0);
        assert_eq!(p.statistic_info.get("C++"), Some(&1));
    }

    #[test]
    fn test_accepted_never_exceeds_submissions() {
        let mut p = problem(1, RuleType::Acm, &[10]);
        let verdicts = [
            JudgeStatus::Accepted,
            JudgeStatus::WrongAnswer,
            JudgeStatus::Accepted,
            JudgeStatus::RuntimeError,
        ];
        let effects: Vec<_> = verdicts
            .iter()
            .map(|v| {
                let effect = apply_problem(&mut p, "C", *v);
                assert!(p.accepted_number <= p.submission_number);
                effect
            })
            .collect();
        for effect in effects.iter().rev() {
            revert_problem(&mut p, effect);
            assert!(p.accepted_number <= p.submission_number);
        }
        assert_eq!((p.submission_number, p.accepted_number), (0, 0));
        assert!(p.statistic_info.is_empty());
    }

    #[test]
    fn test_profile_first_accept() {
        let p = problem(1, RuleType::Acm, &[30, 30, 40]);
        let mut profile = UserProfile::new(9);

        let effect = apply_profile(&mut profile, &p, false, JudgeStatus::Accepted, 0);

        assert!(effect.first_accept);
        assert_eq!(profile.submission_number, 1);
        assert_eq!(profile.accepted_number, 1);
        assert_eq!(
            profile.acm_problems_status.problems[&1].status,
            JudgeStatus::Accepted
        );
        assert_eq!(profile.acm_problems_status.problems[&1].display_id, "P1");

        let again = apply_profile(&mut profile, &p, false, JudgeStatus::Accepted, 0);
        assert!(!again.first_accept);
        assert_eq!(profile.accepted_number, 1);
        assert_eq!(profile.submission_number, 2);
    }

    #[test]
    fn test_profile_never_downgrades_accepted() {
        let p = problem(1, RuleType::Acm, &[10]);
        let mut profile = UserProfile::new(9);
        apply_profile(&mut profile, &p, false, JudgeStatus::Accepted, 0);

        for verdict in [
            JudgeStatus::WrongAnswer,
            JudgeStatus::CpuTimeLimitExceeded,
            JudgeStatus::CompileError,
            JudgeStatus::SystemError,
        ] {
            apply_profile(&mut profile, &p, false, verdict, 0);
            assert_eq!(
                profile.acm_problems_status.problems[&1].status,
                JudgeStatus::Accepted
            );
        }
        assert_eq!(profile.accepted_number, 1);
    }

    #[test]
    fn test_profile_latest_non_ac_wins() {
        let p = problem(1, RuleType::Acm, &[10]);
        let mut profile = UserProfile::new(9);
        apply_profile(&mut profile, &p, false, JudgeStatus::WrongAnswer, 0);
        apply_profile(&mut profile, &p, false, JudgeStatus::RuntimeError, 0);

        assert_eq!(
            profile.acm_problems_status.problems[&1].status,
            JudgeStatus::RuntimeError
        );
        assert_eq!(profile.accepted_number, 0);
    }

    #[test]
    fn test_profile_oi_total_score() {
        let p = problem(2, RuleType::Oi, &[50, 50]);
        let mut profile = UserProfile::new(9);

        apply_profile(&mut profile, &p, false, JudgeStatus::PartiallyAccepted, 50);
        assert_eq!(profile.total_score, 0);
        assert_eq!(profile.oi_problems_status.problems[&2].score, Some(50));

        let effect = apply_profile(&mut profile, &p, false, JudgeStatus::Accepted, 100);
        assert!(effect.first_accept);
        assert_eq!(profile.total_score, 100);
        assert_eq!(profile.accepted_number, 1);
        assert_eq!(profile.oi_problems_status.problems[&2].score, Some(100));
    }

    #[test]
    fn test_profile_contest_bucket_moves_no_counters() {
        let p = problem(1, RuleType::Acm, &[10]);
        let mut profile = UserProfile::new(9);

        let effect = apply_profile(&mut profile, &p, true, JudgeStatus::Accepted, 0);

        assert!(!effect.first_accept);
        assert_eq!(profile.submission_number, 0);
        assert_eq!(profile.accepted_number, 0);
        assert!(profile.acm_problems_status.problems.is_empty());
        assert_eq!(
            profile.acm_problems_status.contest_problems[&1].status,
            JudgeStatus::Accepted
        );
    }

    #[test]
    fn test_acm_rank_wrong_then_accepted() {
        let mut rank = AcmContestRank::new(9, 3);

        let wrong = apply_acm_rank(&mut rank, 1, JudgeStatus::WrongAnswer, 100, true, PENALTY);
        assert!(wrong.error_added);
        assert_eq!(rank.total_time, 0);

        let accepted = apply_acm_rank(&mut rank, 1, JudgeStatus::Accepted, 600, true, PENALTY);
        assert!(accepted.became_ac);

        let cell = &rank.submission_info[&1];
        assert_eq!(cell.error_number, 1);
        assert!(cell.is_ac);
        assert!(cell.is_first_ac);
        assert_eq!(cell.ac_time, 600);
        assert_eq!(rank.total_time, 600 + PENALTY);
        assert_eq!(rank.accepted_number, 1);
        assert_eq!(rank.submission_number, 2);
    }

    #[test]
    fn test_acm_rank_after_ac_is_frozen() {
        let mut rank = AcmContestRank::new(9, 3);
        apply_acm_rank(&mut rank, 1, JudgeStatus::Accepted, 60, false, PENALTY);
        let frozen = rank.submission_info[&1].clone();

        apply_acm_rank(&mut rank, 1, JudgeStatus::WrongAnswer, 120, false, PENALTY);
        apply_acm_rank(&mut rank, 1, JudgeStatus::Accepted, 180, true, PENALTY);

        assert_eq!(rank.submission_info[&1], frozen);
        assert_eq!(rank.submission_number, 3);
        assert_eq!(rank.accepted_number, 1);
        assert_eq!(rank.total_time, 60);
    }

    #[test]
    fn test_acm_total_time_formula() {
        for errors in 0..4 {
            let mut rank = AcmContestRank::new(1, 1);
            for _ in 0..errors {
                apply_acm_rank(&mut rank, 5, JudgeStatus::RuntimeError, 10, false, PENALTY);
            }
            apply_acm_rank(&mut rank, 5, JudgeStatus::Accepted, 777, false, PENALTY);
            assert_eq!(rank.total_time, 777 + PENALTY * errors);
        }

        let mut unsolved = AcmContestRank::new(1, 1);
        apply_acm_rank(&mut unsolved, 5, JudgeStatus::WrongAnswer, 10, false, PENALTY);
        assert_eq!(unsolved.total_time, 0);
    }

    #[test]
    fn test_oi_rank_keeps_best_score() {
        let mut rank = OiContestRank::new(9, 4);

        apply_oi_rank(&mut rank, 2, 50);
        assert_eq!(rank.total_score, 50);

        let better = apply_oi_rank(&mut rank, 2, 100);
        assert_eq!(better.score_added, 50);
        assert_eq!(rank.total_score, 100);

        let worse = apply_oi_rank(&mut rank, 2, 20);
        assert_eq!(worse.score_added, 0);
        assert_eq!(rank.total_score, 100);
        assert_eq!(rank.submission_info[&2], 100);
        assert_eq!(rank.submission_number, 3);
        assert!(rank.validate().is_ok());
    }

    #[test]
    fn test_profile_revert_round_trip() {
        let mut board = Board::practice(RuleType::Oi);
        board.judge("s1", 0, JudgeStatus::PartiallyAccepted, 50);
        let before = board.profile.clone();

        board.judge("s2", 1, JudgeStatus::Accepted, 100);
        assert_eq!(board.profile.total_score, 100);
        board.rejudge("s2");

        assert_eq!(board.profile, before);
        assert_eq!(board.problem.submission_number, 1);
        assert_eq!(board.problem.accepted_number, 0);
    }

    #[test]
    fn test_profile_revert_keeps_later_ac() {
        let mut board = Board::practice(RuleType::Acm);
        board.judge("s1", 0, JudgeStatus::WrongAnswer, 0);
        board.judge("s2", 1, JudgeStatus::Accepted, 0);

        board.rejudge("s1");

        assert_eq!(board.profile_status(), Some(JudgeStatus::Accepted));
        assert_eq!(board.profile.accepted_number, 1);
        assert_eq!(board.profile.submission_number, 1);
    }

    #[test]
    fn test_profile_keeps_ac_held_by_another_submission() {
        let mut board = Board::practice(RuleType::Acm);
        board.judge("s1", 0, JudgeStatus::Accepted, 0);
        board.judge("s2", 1, JudgeStatus::Accepted, 0);

        board.rejudge("s1");
        board.judge("s1", 0, JudgeStatus::WrongAnswer, 0);

        assert_eq!(board.profile_status(), Some(JudgeStatus::Accepted));
        assert_eq!(board.profile.accepted_number, 1);
        assert_eq!(board.profile.submission_number, 2);
        assert_eq!(board.problem.accepted_number, 1);

        // Once the last AC goes, the remaining verdict shows through
        board.rejudge("s2");
        assert_eq!(board.profile_status(), Some(JudgeStatus::WrongAnswer));
        assert_eq!(board.profile.accepted_number, 0);
    }

    #[test]
    fn test_profile_oi_score_kept_by_another_submission() {
        let mut board = Board::practice(RuleType::Oi);
        board.judge("s1", 0, JudgeStatus::Accepted, 100);
        board.judge("s2", 1, JudgeStatus::Accepted, 100);

        board.rejudge("s1");
        board.judge("s1", 0, JudgeStatus::WrongAnswer, 0);

        assert_eq!(board.profile.total_score, 100);
        assert_eq!(board.profile.accepted_number, 1);
        let entry = &board.profile.oi_problems_status.problems[&1];
        assert_eq!(entry.status, JudgeStatus::Accepted);
        assert_eq!(entry.score, Some(100));
    }

    #[test]
    fn test_acm_revert_round_trip() {
        let mut board = Board::contest(RuleType::Acm);
        board.judge("s1", 5, JudgeStatus::WrongAnswer, 0);
        let before = board.acm.clone();

        board.judge("s2", 10, JudgeStatus::Accepted, 0);
        assert_eq!(board.rejudge("s2"), FirstAcChange::Released);
        assert_eq!(board.acm, before);

        let mut fresh = Board::contest(RuleType::Acm);
        fresh.judge("s1", 3, JudgeStatus::Accepted, 0);
        assert_eq!(fresh.rejudge("s1"), FirstAcChange::Released);
        assert_eq!(fresh.acm, AcmContestRank::new(9, 3));
    }

    #[test]
    fn test_acm_revert_error_before_ac_returns_penalty() {
        let mut board = Board::contest(RuleType::Acm);
        board.judge("s1", 5, JudgeStatus::WrongAnswer, 0);
        board.judge("s2", 10, JudgeStatus::Accepted, 0);
        assert_eq!(board.acm.total_time, 600 + PENALTY);

        assert_eq!(board.rejudge("s1"), FirstAcChange::HeldBy("s2".to_string()));

        assert_eq!(board.acm.total_time, 600);
        assert_eq!(board.acm.submission_info[&1].error_number, 0);
        assert!(board.acm.submission_info[&1].is_ac);
        assert!(board.acm.submission_info[&1].is_first_ac);
    }

    #[test]
    fn test_acm_rank_keeps_ac_held_by_another_submission() {
        let mut board = Board::contest(RuleType::Acm);
        board.judge("s1", 10, JudgeStatus::Accepted, 0);
        board.judge("s2", 20, JudgeStatus::Accepted, 0);

        assert_eq!(board.rejudge("s1"), FirstAcChange::HeldBy("s2".to_string()));

        let cell = &board.acm.submission_info[&1];
        assert!(cell.is_ac);
        assert!(cell.is_first_ac);
        assert_eq!(cell.ac_time, 20 * 60);
        assert_eq!(board.acm.total_time, 20 * 60);
        assert_eq!(board.acm.accepted_number, 1);
        assert_eq!(board.acm.submission_number, 1);
        assert!(board.acm.validate().is_ok());

        board.judge("s1", 10, JudgeStatus::WrongAnswer, 0);
        assert!(board.acm.has_ac(1));
        assert_eq!(board.acm.accepted_number, 1);
        assert_eq!(board.profile_status(), Some(JudgeStatus::Accepted));
    }

    #[test]
    fn test_oi_revert_round_trip() {
        let mut board = Board::contest(RuleType::Oi);
        board.judge("s1", 1, JudgeStatus::PartiallyAccepted, 50);
        let before = board.oi.clone();

        board.judge("s2", 2, JudgeStatus::Accepted, 100);
        board.rejudge("s2");

        assert_eq!(board.oi, before);
    }

    #[test]
    fn test_oi_rank_keeps_score_held_by_another_submission() {
        let mut board = Board::contest(RuleType::Oi);
        board.judge("s1", 1, JudgeStatus::Accepted, 100);
        board.judge("s2", 2, JudgeStatus::Accepted, 100);

        board.rejudge("s1");
        assert_eq!(board.oi.total_score, 100);
        assert_eq!(board.oi.submission_info.get(&1), Some(&100));

        board.judge("s1", 1, JudgeStatus::WrongAnswer, 0);
        assert_eq!(board.oi.total_score, 100);
        assert_eq!(board.oi.submission_info.get(&1), Some(&100));
        assert!(board.oi.validate().is_ok());

        board.rejudge("s2");
        assert_eq!(board.oi.total_score, 0);
        assert_eq!(board.oi.submission_info.get(&1), Some(&0));
    }

    #[test]
    fn test_rank_rule_requires_running_contest() {
        let start = Utc::now() - Duration::hours(1);
        let contest = Contest {
            id: 3,
            rule_type: RuleType::Oi,
            start_time: start,
            end_time: start + Duration::hours(2),
        };
        let mut submission = Submission::new("s1", 1, Some(3), 9, "C", "");
        assert_eq!(rank_rule(&submission, Some(&contest)), Some(RuleType::Oi));

        submission.create_time = start + Duration::hours(3);
        assert_eq!(rank_rule(&submission, Some(&contest)), None);

        let practice = Submission::new("s2", 1, None, 9, "C", "");
        assert_eq!(rank_rule(&practice, Some(&contest)), None);
        assert_eq!(rank_rule(&practice, None), None);
    }
}
