//! In-process store
//!
//! One `tokio::sync::Mutex` guards every table, so each trait call is a
//! serializable transaction. Counter updates are computed on copies and
//! written back together.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{JudgeContext, JudgeStore, ServerRegistry};
use crate::{
    config::JudgeConfig,
    error::{AppError, AppResult},
    judge::selector,
    models::{
        AcmContestRank, Contest, CounterEffects, HeartbeatRecord, JudgeInfo, JudgeOutcome,
        JudgeServer, JudgeStatus, OiContestRank, Problem, RuleType, StatisticInfo, Submission,
        UserProfile,
    },
    services::statistics::{self, RankRow},
};

#[derive(Debug, Default)]
struct Tables {
    servers: BTreeMap<i64, JudgeServer>,
    next_server_id: i64,
    submissions: HashMap<String, Submission>,
    problems: HashMap<i64, Problem>,
    contests: HashMap<i64, Contest>,
    profiles: HashMap<i64, UserProfile>,
    /// Keyed by `(user_id, contest_id)`
    acm_ranks: HashMap<(i64, i64), AcmContestRank>,
    oi_ranks: HashMap<(i64, i64), OiContestRank>,
}

impl Tables {
    fn server_by_hostname(&mut self, hostname: &str) -> Option<&mut JudgeServer> {
        self.servers.values_mut().find(|s| s.hostname == hostname)
    }

    fn submission_mut(&mut self, id: &str) -> AppResult<&mut Submission> {
        self.submissions
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Submission {}", id)))
    }

    fn first_ac_taken(&self, contest_id: i64, problem_id: i64) -> bool {
        self.acm_ranks.values().any(|rank| {
            rank.contest_id == contest_id
                && rank
                    .submission_info
                    .get(&problem_id)
                    .is_some_and(|cell| cell.is_first_ac)
        })
    }
}

/// Store keeping all rows in memory
pub struct MemoryStore {
    tables: Mutex<Tables>,
    heartbeat_window: chrono::Duration,
    stale_reset_after: chrono::Duration,
}

impl MemoryStore {
    pub fn new(config: &JudgeConfig) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            heartbeat_window: config.heartbeat_window,
            stale_reset_after: config.stale_reset_after,
        }
    }

    pub async fn insert_problem(&self, problem: Problem) -> AppResult<()> {
        problem.validate()?;
        self.tables.lock().await.problems.insert(problem.id, problem);
        Ok(())
    }

    pub async fn insert_contest(&self, contest: Contest) {
        self.tables.lock().await.contests.insert(contest.id, contest);
    }

    pub async fn insert_submission(&self, submission: Submission) {
        self.tables
            .lock()
            .await
            .submissions
            .insert(submission.id.clone(), submission);
    }

    /// Insert or replace a server row as-is
    pub async fn insert_server(&self, server: JudgeServer) {
        let mut tables = self.tables.lock().await;
        tables.next_server_id = tables.next_server_id.max(server.id);
        tables.servers.insert(server.id, server);
    }

    pub async fn submission(&self, id: &str) -> Option<Submission> {
        self.tables.lock().await.submissions.get(id).cloned()
    }

    pub async fn problem(&self, id: i64) -> Option<Problem> {
        self.tables.lock().await.problems.get(&id).cloned()
    }

    pub async fn profile(&self, user_id: i64) -> Option<UserProfile> {
        self.tables.lock().await.profiles.get(&user_id).cloned()
    }

    pub async fn acm_rank(&self, user_id: i64, contest_id: i64) -> Option<AcmContestRank> {
        self.tables
            .lock()
            .await
            .acm_ranks
            .get(&(user_id, contest_id))
            .cloned()
    }

    pub async fn oi_rank(&self, user_id: i64, contest_id: i64) -> Option<OiContestRank> {
        self.tables
            .lock()
            .await
            .oi_ranks
            .get(&(user_id, contest_id))
            .cloned()
    }

    pub async fn server(&self, hostname: &str) -> Option<JudgeServer> {
        self.tables
            .lock()
            .await
            .servers
            .values()
            .find(|s| s.hostname == hostname)
            .cloned()
    }
}

#[async_trait]
impl ServerRegistry for MemoryStore {
    async fn heartbeat(&self, record: HeartbeatRecord, now: DateTime<Utc>) -> AppResult<JudgeServer> {
        let mut tables = self.tables.lock().await;

        if let Some(server) = tables.server_by_hostname(&record.hostname) {
            record.apply_to(server, now, self.stale_reset_after);
            return Ok(server.clone());
        }

        tables.next_server_id += 1;
        let server = record.into_server(tables.next_server_id, now);
        tables.servers.insert(server.id, server.clone());
        Ok(server)
    }

    async fn list(&self) -> AppResult<Vec<JudgeServer>> {
        Ok(self.tables.lock().await.servers.values().cloned().collect())
    }

    async fn set_disabled(&self, hostname: &str, disabled: bool) -> AppResult<JudgeServer> {
        let mut tables = self.tables.lock().await;
        let server = tables
            .server_by_hostname(hostname)
            .ok_or_else(|| AppError::UnknownHostname(hostname.to_string()))?;
        server.is_disabled = disabled;
        Ok(server.clone())
    }

    async fn remove(&self, hostname: &str) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let before = tables.servers.len();
        tables.servers.retain(|_, s| s.hostname != hostname);
        if tables.servers.len() == before {
            return Err(AppError::UnknownHostname(hostname.to_string()));
        }
        Ok(())
    }

    async fn acquire(&self, now: DateTime<Utc>) -> AppResult<Option<JudgeServer>> {
        let mut tables = self.tables.lock().await;

        let Some(id) = selector::pick(tables.servers.values(), now, self.heartbeat_window).map(|s| s.id)
        else {
            return Ok(None);
        };

        Ok(tables.servers.get_mut(&id).map(|server| {
            server.task_number += 1;
            server.clone()
        }))
    }

    async fn release(&self, server_id: i64) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.servers.get_mut(&server_id) {
            Some(server) if server.task_number > 0 => server.task_number -= 1,
            Some(server) => {
                tracing::warn!(hostname = %server.hostname, "Release on idle judge server ignored");
            }
            None => tracing::warn!(server_id, "Release on unknown judge server ignored"),
        }
        Ok(())
    }

    async fn rebuild_task_numbers(&self) -> AppResult<()> {
        let mut tables = self.tables.lock().await;

        let mut counts: HashMap<i64, i32> = HashMap::new();
        for submission in tables.submissions.values() {
            if let (JudgeStatus::Judging, Some(server_id)) =
                (submission.result, submission.assigned_server_id)
            {
                *counts.entry(server_id).or_default() += 1;
            }
        }

        for server in tables.servers.values_mut() {
            server.task_number = counts.get(&server.id).copied().unwrap_or(0);
        }
        Ok(())
    }
}

#[async_trait]
impl JudgeStore for MemoryStore {
    async fn load_context(&self, submission_id: &str) -> AppResult<JudgeContext> {
        let tables = self.tables.lock().await;

        let submission = tables
            .submissions
            .get(submission_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Submission {}", submission_id)))?;
        let problem = tables
            .problems
            .get(&submission.problem_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Problem {}", submission.problem_id)))?;
        let contest = match submission.contest_id {
            Some(contest_id) => Some(
                tables
                    .contests
                    .get(&contest_id)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("Contest {}", contest_id)))?,
            ),
            None => None,
        };

        Ok(JudgeContext {
            submission,
            problem,
            contest,
        })
    }

    async fn begin_judging(
        &self,
        submission_id: &str,
        server_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let submission = tables.submission_mut(submission_id)?;
        if submission.result != JudgeStatus::Pending {
            return Ok(false);
        }
        submission.result = JudgeStatus::Judging;
        submission.assigned_server_id = Some(server_id);
        submission.judge_started_at = Some(now);
        Ok(true)
    }

    async fn mark_spj_compiled(&self, problem_id: i64, spj_version: &str) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let problem = tables
            .problems
            .get_mut(&problem_id)
            .ok_or_else(|| AppError::NotFound(format!("Problem {}", problem_id)))?;
        problem.spj_compile_ok = true;
        problem.spj_compiled_version = Some(spj_version.to_string());
        Ok(())
    }

    async fn save_pending_outcome(&self, submission_id: &str, outcome: &JudgeOutcome) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let submission = tables.submission_mut(submission_id)?;
        if submission.result != JudgeStatus::Judging {
            return Err(AppError::Conflict(format!(
                "Submission {} is {}, not JUDGING",
                submission_id, submission.result
            )));
        }
        submission.pending_outcome = Some(outcome.clone());
        Ok(())
    }

    async fn finalize(&self, submission_id: &str, penalty_secs: i64) -> AppResult<Option<CounterEffects>> {
        let mut tables = self.tables.lock().await;

        let submission = tables.submission_mut(submission_id)?.clone();
        let Some(outcome) = submission.pending_outcome.clone() else {
            return Ok(None);
        };
        if submission.result != JudgeStatus::Judging {
            return Ok(None);
        }

        let contest = submission
            .contest_id
            .and_then(|id| tables.contests.get(&id).cloned());
        let rank_rule = statistics::rank_rule(&submission, contest.as_ref());
        let rank_key = (submission.user_id, submission.contest_id.unwrap_or_default());

        let mut problem = tables
            .problems
            .get(&submission.problem_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Problem {}", submission.problem_id)))?;
        let mut profile = tables
            .profiles
            .get(&submission.user_id)
            .cloned()
            .unwrap_or_else(|| UserProfile::new(submission.user_id));

        let mut acm_rank = (rank_rule == Some(RuleType::Acm)).then(|| {
            tables
                .acm_ranks
                .get(&rank_key)
                .cloned()
                .unwrap_or_else(|| AcmContestRank::new(rank_key.0, rank_key.1))
        });
        let mut oi_rank = (rank_rule == Some(RuleType::Oi)).then(|| {
            tables
                .oi_ranks
                .get(&rank_key)
                .cloned()
                .unwrap_or_else(|| OiContestRank::new(rank_key.0, rank_key.1))
        });

        let first_ac_available = acm_rank.as_ref().is_some_and(|rank| {
            statistics::acm_would_accept(rank, problem.id, outcome.result)
                && !tables.first_ac_taken(rank_key.1, problem.id)
        });

        let rank = match (acm_rank.as_mut(), oi_rank.as_mut()) {
            (Some(rank), _) => Some(RankRow::Acm(rank)),
            (None, Some(rank)) => Some(RankRow::Oi(rank)),
            (None, None) => None,
        };

        let effects = statistics::apply_outcome(
            &submission,
            &mut problem,
            &mut profile,
            contest.as_ref(),
            rank,
            &outcome,
            first_ac_available,
            penalty_secs,
        );

        tables.problems.insert(problem.id, problem);
        tables.profiles.insert(profile.user_id, profile);
        if let Some(rank) = acm_rank {
            tables.acm_ranks.insert(rank_key, rank);
        }
        if let Some(rank) = oi_rank {
            tables.oi_ranks.insert(rank_key, rank);
        }

        let row = tables.submission_mut(submission_id)?;
        row.result = outcome.result;
        row.info = outcome.info;
        row.statistic_info = outcome.statistic_info;
        row.pending_outcome = None;
        row.counter_effects = Some(effects.clone());

        Ok(Some(effects))
    }

    async fn fail(&self, submission_id: &str, info: JudgeInfo) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let submission = tables.submission_mut(submission_id)?;
        if submission.result.is_terminal() {
            return Ok(());
        }
        mark_failed(submission, info);
        Ok(())
    }

    async fn fail_judging(&self, submission_id: &str, info: JudgeInfo) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let submission = tables.submission_mut(submission_id)?;
        if submission.result != JudgeStatus::Judging {
            return Ok(false);
        }
        mark_failed(submission, info);
        Ok(true)
    }

    async fn rejudge(&self, submission_id: &str) -> AppResult<Submission> {
        let mut tables = self.tables.lock().await;

        let submission = tables.submission_mut(submission_id)?.clone();
        if !submission.result.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Submission {} is still {}",
                submission_id, submission.result
            )));
        }

        if let Some(effects) = &submission.counter_effects {
            let Tables {
                submissions,
                problems,
                contests,
                profiles,
                acm_ranks,
                oi_ranks,
                ..
            } = &mut *tables;

            let others: Vec<Submission> = submissions
                .values()
                .filter(|s| {
                    s.id != submission.id
                        && s.user_id == submission.user_id
                        && s.problem_id == submission.problem_id
                        && s.counter_effects.is_some()
                })
                .cloned()
                .collect();
            let contest = submission.contest_id.and_then(|id| contests.get(&id));

            let problem = problems
                .get_mut(&effects.problem.problem_id)
                .ok_or_else(|| AppError::NotFound(format!("Problem {}", effects.problem.problem_id)))?;
            let profile = profiles.get_mut(&submission.user_id);
            let rank = if let Some(effect) = &effects.acm_rank {
                acm_ranks
                    .get_mut(&(effect.user_id, effect.contest_id))
                    .map(RankRow::Acm)
            } else if let Some(effect) = &effects.oi_rank {
                oi_ranks
                    .get_mut(&(effect.user_id, effect.contest_id))
                    .map(RankRow::Oi)
            } else {
                None
            };

            // First-AC flags live on the rank cells, which the revert rebuilds
            statistics::revert_outcome(effects, problem, profile, contest, rank, &others);
        }

        let row = tables.submission_mut(submission_id)?;
        row.result = JudgeStatus::Pending;
        row.info = JudgeInfo::default();
        row.statistic_info = StatisticInfo::default();
        row.assigned_server_id = None;
        row.judge_started_at = None;
        row.pending_outcome = None;
        row.counter_effects = None;
        Ok(row.clone())
    }

    async fn stuck_submissions(&self, started_before: DateTime<Utc>) -> AppResult<Vec<Submission>> {
        let tables = self.tables.lock().await;
        let mut stuck: Vec<Submission> = tables
            .submissions
            .values()
            .filter(|s| s.result == JudgeStatus::Judging)
            .filter(|s| s.judge_started_at.is_none_or(|at| at < started_before))
            .cloned()
            .collect();
        stuck.sort_by_key(|s| s.judge_started_at);
        Ok(stuck)
    }

    async fn reset_to_pending(&self, submission_id: &str) -> AppResult<Option<i64>> {
        let mut tables = self.tables.lock().await;
        let submission = tables.submission_mut(submission_id)?;
        if submission.result != JudgeStatus::Judging {
            return Ok(None);
        }
        submission.result = JudgeStatus::Pending;
        submission.judge_started_at = None;
        submission.pending_outcome = None;
        Ok(submission.assigned_server_id.take())
    }
}

fn mark_failed(submission: &mut Submission, info: JudgeInfo) {
    submission.result = JudgeStatus::SystemError;
    submission.statistic_info = StatisticInfo {
        err_info: info.message.clone(),
        ..StatisticInfo::default()
    };
    submission.info = info;
    submission.pending_outcome = None;
}
