//! PostgreSQL store
//!
//! Selection runs under the Redis mutex `judge_server_lock` plus a
//! transaction holding `FOR UPDATE` on the registry rows. Finalize and
//! rejudge lock rows in a fixed order (submission, problem, profile, rank)
//! and commit or roll back as a whole.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{JudgeContext, JudgeStore, ServerRegistry};
use crate::{
    config::JudgeConfig,
    db::repositories::{
        ContestRepository, JudgeServerRepository, ProblemRepository, ProfileRepository,
        SubmissionRepository,
    },
    error::{AppError, AppResult},
    judge::selector::{self, ServerLock},
    models::{
        AcmContestRank, CounterEffects, HeartbeatRecord, JudgeInfo, JudgeOutcome, JudgeServer,
        JudgeStatus, OiContestRank, RuleType, StatisticInfo, Submission, UserProfile,
    },
    services::statistics::{self, FirstAcChange, RankRow},
};

/// Store backed by PostgreSQL, with Redis serializing worker selection
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock: ServerLock,
    heartbeat_window: chrono::Duration,
    stale_reset_after: chrono::Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock: ServerLock, config: &JudgeConfig) -> Self {
        Self {
            pool,
            lock,
            heartbeat_window: config.heartbeat_window,
            stale_reset_after: config.stale_reset_after,
        }
    }

    /// Selection proper; caller holds the Redis mutex
    async fn acquire_locked(&self, now: DateTime<Utc>) -> AppResult<Option<JudgeServer>> {
        let mut tx = self.pool.begin().await?;

        let servers = JudgeServerRepository::lock_all(&mut *tx).await?;
        let Some(id) = selector::pick(&servers, now, self.heartbeat_window).map(|s| s.id) else {
            return Ok(None);
        };

        let server = JudgeServerRepository::increment_task_number(&mut *tx, id).await?;
        tx.commit().await?;

        Ok(Some(server))
    }
}

#[async_trait]
impl ServerRegistry for PgStore {
    async fn heartbeat(&self, record: HeartbeatRecord, now: DateTime<Utc>) -> AppResult<JudgeServer> {
        JudgeServerRepository::upsert_heartbeat(&self.pool, &record, now, self.stale_reset_after).await
    }

    async fn list(&self) -> AppResult<Vec<JudgeServer>> {
        JudgeServerRepository::list(&self.pool).await
    }

    async fn set_disabled(&self, hostname: &str, disabled: bool) -> AppResult<JudgeServer> {
        JudgeServerRepository::set_disabled(&self.pool, hostname, disabled)
            .await?
            .ok_or_else(|| AppError::UnknownHostname(hostname.to_string()))
    }

    async fn remove(&self, hostname: &str) -> AppResult<()> {
        if !JudgeServerRepository::delete(&self.pool, hostname).await? {
            return Err(AppError::UnknownHostname(hostname.to_string()));
        }
        Ok(())
    }

    async fn acquire(&self, now: DateTime<Utc>) -> AppResult<Option<JudgeServer>> {
        let guard = self.lock.acquire().await?;
        let selected = self.acquire_locked(now).await;

        if let Err(e) = self.lock.release(guard).await {
            tracing::warn!("Failed to release selection lock: {}", e);
        }
        selected
    }

    async fn release(&self, server_id: i64) -> AppResult<()> {
        // A single guarded UPDATE; it waits on the row lock a concurrent acquire holds
        if !JudgeServerRepository::decrement_task_number(&self.pool, server_id).await? {
            tracing::warn!(server_id, "Release on idle or unknown judge server ignored");
        }
        Ok(())
    }

    async fn rebuild_task_numbers(&self) -> AppResult<()> {
        let guard = self.lock.acquire().await?;
        let rebuilt = JudgeServerRepository::rebuild_task_numbers(&self.pool).await;

        if let Err(e) = self.lock.release(guard).await {
            tracing::warn!("Failed to release selection lock: {}", e);
        }
        let servers = rebuilt?;
        tracing::debug!("Recounted task_number on {} judge servers", servers);
        Ok(())
    }
}

#[async_trait]
impl JudgeStore for PgStore {
    async fn load_context(&self, submission_id: &str) -> AppResult<JudgeContext> {
        let submission = SubmissionRepository::find_by_id(&self.pool, submission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Submission {}", submission_id)))?;
        let problem = ProblemRepository::find_by_id(&self.pool, submission.problem_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Problem {}", submission.problem_id)))?;
        let contest = match submission.contest_id {
            Some(contest_id) => Some(
                ContestRepository::find_by_id(&self.pool, contest_id)
                    .await?
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
        SubmissionRepository::begin_judging(&self.pool, submission_id, server_id, now).await
    }

    async fn mark_spj_compiled(&self, problem_id: i64, spj_version: &str) -> AppResult<()> {
        ProblemRepository::mark_spj_compiled(&self.pool, problem_id, spj_version).await
    }

    async fn save_pending_outcome(&self, submission_id: &str, outcome: &JudgeOutcome) -> AppResult<()> {
        if !SubmissionRepository::save_pending_outcome(&self.pool, submission_id, outcome).await? {
            return Err(AppError::Conflict(format!(
                "Submission {} is no longer JUDGING",
                submission_id
            )));
        }
        Ok(())
    }

    async fn finalize(&self, submission_id: &str, penalty_secs: i64) -> AppResult<Option<CounterEffects>> {
        let mut tx = self.pool.begin().await?;

        let submission = SubmissionRepository::lock_by_id(&mut *tx, submission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Submission {}", submission_id)))?;
        let Some(outcome) = submission.pending_outcome.clone() else {
            return Ok(None);
        };
        if submission.result != JudgeStatus::Judging {
            return Ok(None);
        }

        let contest = match submission.contest_id {
            Some(contest_id) => ContestRepository::find_by_id(&mut *tx, contest_id).await?,
            None => None,
        };
        let rank_rule = statistics::rank_rule(&submission, contest.as_ref());
        let user_id = submission.user_id;
        let contest_id = submission.contest_id.unwrap_or_default();

        let mut problem = ProblemRepository::lock_by_id(&mut *tx, submission.problem_id).await?;

        ProfileRepository::ensure(&mut *tx, user_id).await?;
        let mut profile = ProfileRepository::lock(&mut *tx, user_id)
            .await?
            .unwrap_or_else(|| UserProfile::new(user_id));

        let mut acm_rank: Option<AcmContestRank> = None;
        let mut oi_rank: Option<OiContestRank> = None;
        match rank_rule {
            Some(RuleType::Acm) => {
                ContestRepository::ensure_acm_rank(&mut *tx, user_id, contest_id).await?;
                acm_rank = Some(
                    ContestRepository::lock_acm_rank(&mut *tx, user_id, contest_id)
                        .await?
                        .unwrap_or_else(|| AcmContestRank::new(user_id, contest_id)),
                );
            }
            Some(RuleType::Oi) => {
                ContestRepository::ensure_oi_rank(&mut *tx, user_id, contest_id).await?;
                oi_rank = Some(
                    ContestRepository::lock_oi_rank(&mut *tx, user_id, contest_id)
                        .await?
                        .unwrap_or_else(|| OiContestRank::new(user_id, contest_id)),
                );
            }
            None => {}
        }

        // The guard row serializes concurrent first ACs on (contest, problem)
        let first_ac_available = match &acm_rank {
            Some(rank) if statistics::acm_would_accept(rank, problem.id, outcome.result) => {
                ContestRepository::claim_first_ac(&mut *tx, contest_id, problem.id, user_id, submission_id)
                    .await?
            }
            _ => false,
        };

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

        ProblemRepository::update_counters(&mut *tx, &problem).await?;
        ProfileRepository::save(&mut *tx, &profile).await?;
        if let Some(rank) = &acm_rank {
            ContestRepository::save_acm_rank(&mut *tx, rank).await?;
        }
        if let Some(rank) = &oi_rank {
            ContestRepository::save_oi_rank(&mut *tx, rank).await?;
        }
        SubmissionRepository::write_final(&mut *tx, submission_id, &outcome, &effects).await?;

        tx.commit().await?;
        Ok(Some(effects))
    }

    async fn fail(&self, submission_id: &str, info: JudgeInfo) -> AppResult<()> {
        let statistic_info = failure_statistics(&info);
        let updated = SubmissionRepository::fail(&self.pool, submission_id, &info, &statistic_info).await?;
        if !updated
            && SubmissionRepository::find_by_id(&self.pool, submission_id)
                .await?
                .is_none()
        {
            return Err(AppError::NotFound(format!("Submission {}", submission_id)));
        }
        Ok(())
    }

    async fn fail_judging(&self, submission_id: &str, info: JudgeInfo) -> AppResult<bool> {
        let statistic_info = failure_statistics(&info);
        SubmissionRepository::fail_judging(&self.pool, submission_id, &info, &statistic_info).await
    }

    async fn rejudge(&self, submission_id: &str) -> AppResult<Submission> {
        let mut tx = self.pool.begin().await?;

        let submission = SubmissionRepository::lock_by_id(&mut *tx, submission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Submission {}", submission_id)))?;
        if !submission.result.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Submission {} is still {}",
                submission_id, submission.result
            )));
        }

        if let Some(effects) = &submission.counter_effects {
            let mut problem = ProblemRepository::lock_by_id(&mut *tx, effects.problem.problem_id).await?;
            let mut profile = ProfileRepository::lock(&mut *tx, submission.user_id).await?;

            let mut acm_rank = match &effects.acm_rank {
                Some(effect) => {
                    ContestRepository::lock_acm_rank(&mut *tx, effect.user_id, effect.contest_id).await?
                }
                None => None,
            };
            let mut oi_rank = match &effects.oi_rank {
                Some(effect) => {
                    ContestRepository::lock_oi_rank(&mut *tx, effect.user_id, effect.contest_id).await?
                }
                None => None,
            };

            let contest = match &effects.acm_rank {
                Some(effect) => Some(
                    ContestRepository::find_by_id(&mut *tx, effect.contest_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("Contest {}", effect.contest_id)))?,
                ),
                None => None,
            };

            // Read under the profile lock, which every finalize of this user takes
            let others = SubmissionRepository::list_finalized_siblings(
                &mut *tx,
                submission.user_id,
                submission.problem_id,
                submission_id,
            )
            .await?;

            let rank = match (acm_rank.as_mut(), oi_rank.as_mut()) {
                (Some(rank), _) => Some(RankRow::Acm(rank)),
                (None, Some(rank)) => Some(RankRow::Oi(rank)),
                (None, None) => None,
            };
            let first_ac = statistics::revert_outcome(
                effects,
                &mut problem,
                profile.as_mut(),
                contest.as_ref(),
                rank,
                &others,
            );

            ProblemRepository::update_counters(&mut *tx, &problem).await?;
            if let Some(profile) = &profile {
                ProfileRepository::save(&mut *tx, profile).await?;
            }
            if let Some(rank) = &acm_rank {
                ContestRepository::save_acm_rank(&mut *tx, rank).await?;
            }
            if let Some(rank) = &oi_rank {
                ContestRepository::save_oi_rank(&mut *tx, rank).await?;
            }
            if let Some(effect) = &effects.acm_rank {
                match first_ac {
                    FirstAcChange::Unchanged => {}
                    FirstAcChange::Released => {
                        ContestRepository::release_first_ac(
                            &mut *tx,
                            effect.contest_id,
                            effect.problem_id,
                            effect.user_id,
                        )
                        .await?;
                    }
                    FirstAcChange::HeldBy(owner) => {
                        ContestRepository::reassign_first_ac(
                            &mut *tx,
                            effect.contest_id,
                            effect.problem_id,
                            effect.user_id,
                            &owner,
                        )
                        .await?;
                    }
                }
            }
        }

        let submission = SubmissionRepository::reset_for_rejudge(&mut *tx, submission_id).await?;
        tx.commit().await?;

        Ok(submission)
    }

    async fn stuck_submissions(&self, started_before: DateTime<Utc>) -> AppResult<Vec<Submission>> {
        SubmissionRepository::list_stuck(&self.pool, started_before).await
    }

    async fn reset_to_pending(&self, submission_id: &str) -> AppResult<Option<i64>> {
        let previous = SubmissionRepository::reset_to_pending(&self.pool, submission_id).await?;
        Ok(previous.flatten())
    }
}

fn failure_statistics(info: &JudgeInfo) -> StatisticInfo {
    StatisticInfo {
        err_info: info.message.clone(),
        ..StatisticInfo::default()
    }
}
