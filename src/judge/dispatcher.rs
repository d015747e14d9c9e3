//! Submission dispatcher
//!
//! Drives one submission from PENDING to a terminal result: take a worker
//! slot, compile the special judge if needed, judge, aggregate, persist the
//! verdict, give the slot back, then apply counters and the result in one
//! transaction.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::JudgeConfig,
    constants::judge_failures,
    error::{AppError, AppResult, JudgeError},
    judge::{
        aggregate,
        client::{CompileSpjRequest, JudgeRequest, SandboxClient},
        languages::LanguageHandler,
    },
    models::{JudgeInfo, JudgeOutcome, JudgeServer, JudgeStatus, Problem, Submission},
    store::{JudgeContext, JudgeStore, ServerRegistry},
};

/// What happened to a dispatched submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchReport {
    /// Not PENDING any more, nothing done
    Skipped,
    /// Finished as SYSTEM_ERROR without touching counters
    Failed,
    /// Verdict written and counters updated
    Finalized(JudgeStatus),
}

/// Runs submissions through the judge-server pool
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<dyn ServerRegistry>,
    store: Arc<dyn JudgeStore>,
    sandbox: Arc<dyn SandboxClient>,
    config: JudgeConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        store: Arc<dyn JudgeStore>,
        sandbox: Arc<dyn SandboxClient>,
        config: JudgeConfig,
    ) -> Self {
        Self {
            registry,
            store,
            sandbox,
            config,
        }
    }

    /// Judge one submission
    ///
    /// `AppError::NoServer` leaves the submission PENDING for the queue to retry.
    pub async fn dispatch(&self, submission_id: &str) -> AppResult<DispatchReport> {
        let JudgeContext {
            submission,
            problem,
            ..
        } = self.store.load_context(submission_id).await?;

        if submission.result != JudgeStatus::Pending {
            tracing::debug!(
                "Submission {} is {}, skipping dispatch",
                submission_id,
                submission.result
            );
            return Ok(DispatchReport::Skipped);
        }

        let handler = match LanguageHandler::for_language(&submission.language) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!("Submission {}: {}", submission_id, e);
                self.store
                    .fail(
                        submission_id,
                        JudgeInfo::failure(judge_failures::UNSUPPORTED_LANGUAGE, e.to_string()),
                    )
                    .await?;
                return Ok(DispatchReport::Failed);
            }
        };

        let now = Utc::now();
        let server = self.registry.acquire(now).await?.ok_or(AppError::NoServer)?;

        match self.store.begin_judging(submission_id, server.id, now).await {
            Ok(true) => {}
            Ok(false) => {
                self.release(&server).await;
                return Ok(DispatchReport::Skipped);
            }
            Err(e) => {
                self.release(&server).await;
                return Err(e);
            }
        }

        tracing::info!(
            submission_id,
            problem_id = problem.id,
            server = %server.hostname,
            slots = %format!("{}/{}", server.task_number, server.cpu_core),
            "Judging submission"
        );

        // The slot stays held while the submission is JUDGING without a saved
        // verdict; the reconciler frees it from `assigned_server_id`.
        match self.judge_on(&server, &submission, &problem, &handler).await {
            Ok(outcome) => {
                self.store.save_pending_outcome(submission_id, &outcome).await?;
                self.release(&server).await;

                let effects = self
                    .store
                    .finalize(submission_id, self.config.acm_penalty_secs)
                    .await?;
                if effects.is_none() {
                    tracing::warn!("Submission {} was finalized elsewhere", submission_id);
                }
                tracing::info!(
                    submission_id,
                    problem_id = problem.id,
                    server = %server.hostname,
                    result = %outcome.result,
                    "Submission finished"
                );
                Ok(DispatchReport::Finalized(outcome.result))
            }
            Err(info) => {
                tracing::warn!(
                    submission_id,
                    problem_id = problem.id,
                    server = %server.hostname,
                    result = %JudgeStatus::SystemError,
                    "Submission failed: {}",
                    info.message.as_deref().unwrap_or_default()
                );
                if self.store.fail_judging(submission_id, info).await? {
                    self.release(&server).await;
                } else {
                    tracing::warn!(
                        submission_id,
                        server = %server.hostname,
                        "Submission left JUDGING before the attempt failed; slot already reclaimed"
                    );
                }
                Ok(DispatchReport::Failed)
            }
        }
    }

    /// Everything that needs the worker slot. `Err` carries the failure recorded on the submission.
    async fn judge_on(
        &self,
        server: &JudgeServer,
        submission: &Submission,
        problem: &Problem,
        handler: &LanguageHandler,
    ) -> Result<JudgeOutcome, JudgeInfo> {
        let Some(url) = server.service_url.as_deref() else {
            return Err(JudgeInfo::failure(
                judge_failures::JUDGE_SERVER_ERROR,
                format!("Judge server {} has no service_url", server.hostname),
            ));
        };

        if problem.needs_spj_compile() {
            self.compile_spj(url, problem).await?;
        }

        let request = build_request(submission, problem, handler)?;
        let timeout = self.config.judge_timeout(problem.test_case_score.len());

        match self.sandbox.judge(url, &request, timeout).await {
            Ok(cases) => Ok(aggregate::aggregate(problem, cases)),
            Err(JudgeError::Compile(message)) => Ok(aggregate::compile_error(message)),
            Err(e) => Err(JudgeInfo::failure(
                judge_failures::JUDGE_SERVER_ERROR,
                e.to_string(),
            )),
        }
    }

    async fn compile_spj(&self, url: &str, problem: &Problem) -> Result<(), JudgeInfo> {
        let version = problem.spj_version.clone().unwrap_or_default();
        let spj_failure = |message: String| JudgeInfo::failure(judge_failures::SPJ_COMPILE_ERROR, message);

        let handler = LanguageHandler::for_spj(problem.spj_language.as_deref().unwrap_or_default())
            .map_err(|e| spj_failure(e.to_string()))?;
        let spj_compile_config = handler
            .spj_compile_config(&version)
            .ok_or_else(|| spj_failure(format!("No special judge support for {}", handler.name())))?;

        let request = CompileSpjRequest {
            src: problem.spj_code.clone().unwrap_or_default(),
            spj_version: version.clone(),
            spj_compile_config,
        };

        self.sandbox
            .compile_spj(url, &request)
            .await
            .map_err(|e| spj_failure(e.message().to_string()))?;

        tracing::info!("Compiled special judge {} for problem {}", version, problem.id);
        if let Err(e) = self.store.mark_spj_compiled(problem.id, &version).await {
            tracing::warn!("Failed to record special judge build for problem {}: {}", problem.id, e);
        }
        Ok(())
    }

    async fn release(&self, server: &JudgeServer) {
        if let Err(e) = self.registry.release(server.id).await {
            tracing::error!("Failed to release slot on {}: {}", server.hostname, e);
        }
    }
}

/// Body of the `/judge` call for `submission`
pub fn build_request(
    submission: &Submission,
    problem: &Problem,
    handler: &LanguageHandler,
) -> Result<JudgeRequest, JudgeInfo> {
    let mut request = JudgeRequest {
        language_config: handler.language_config(&problem.io_mode),
        src: submission.code.clone(),
        max_cpu_time: i64::from(problem.time_limit),
        max_memory: problem.max_memory_bytes(),
        test_case_id: problem.test_case_id.clone(),
        output: false,
        spj_version: None,
        spj_config: None,
        spj_compile_config: None,
        spj_src: None,
        io_mode: problem.io_mode.clone(),
    };

    if problem.spj {
        let version = problem.spj_version.clone().unwrap_or_default();
        let spj = LanguageHandler::for_spj(problem.spj_language.as_deref().unwrap_or_default())
            .map_err(|e| JudgeInfo::failure(judge_failures::SPJ_COMPILE_ERROR, e.to_string()))?;

        request.spj_config = spj.spj_run_config(&version);
        request.spj_compile_config = spj.spj_compile_config(&version);
        request.spj_src = problem.spj_code.clone();
        request.spj_version = Some(version);
    }

    Ok(request)
}
