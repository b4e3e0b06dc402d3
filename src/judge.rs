use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::broadcast::{StatusBroadcaster, StatusEvent};
use crate::config::{JudgeConfig, ToolchainConfig};
use crate::database as db;
use crate::error::JudgeError;
use crate::models::{Problem, Submission, SubmissionStatus, Verdict};
use crate::plagiarism;
use crate::sandbox::{Invocation, Language, LocalRunner, ProcessRunner, Workspace, WorkspaceManager};


/// Any compiler output on stderr fails the build, warnings included
pub const COMPILE_STDERR_IS_FAILURE: bool = true;

/// Aggregated result of running every test case once
#[derive(Debug, Default)]
struct TestRun {
    all_passed: bool,
    output: String,
    error: String,
}

/// Runs submissions through compile, test execution, verdict and plagiarism check
///
/// Each call to [`Judge::judge`] is independent; the only thing shared between
/// concurrent calls is the bound on how many may run at once.
pub struct Judge<R = LocalRunner> {
    pool: SqlitePool,
    runner: R,
    workspaces: WorkspaceManager,
    broadcaster: Arc<StatusBroadcaster>,
    toolchains: ToolchainConfig,
    compile_time_limit: Duration,
    run_time_limit: Duration,
    slots: Semaphore,
}

impl Judge<LocalRunner> {
    pub fn new(
        pool: SqlitePool,
        broadcaster: Arc<StatusBroadcaster>,
        config: &JudgeConfig,
        toolchains: ToolchainConfig,
    ) -> Self {
        Self::with_runner(LocalRunner, pool, broadcaster, config, toolchains)
    }
}

impl<R: ProcessRunner> Judge<R> {
    pub fn with_runner(
        runner: R,
        pool: SqlitePool,
        broadcaster: Arc<StatusBroadcaster>,
        config: &JudgeConfig,
        toolchains: ToolchainConfig,
    ) -> Self {
        Self {
            pool,
            runner,
            workspaces: WorkspaceManager::new(config.workspace_root()),
            broadcaster,
            toolchains,
            compile_time_limit: config.compile_time_limit.into(),
            run_time_limit: config.run_time_limit.into(),
            slots: Semaphore::new(config.max_concurrent_judges.max(1)),
        }
    }

    pub fn broadcaster(&self) -> &Arc<StatusBroadcaster> {
        &self.broadcaster
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Judges `code` written in `language` against problem `problem_id` on behalf of `user_id`
    ///
    /// Returns the completed submission. Planned failures (unknown problem,
    /// unknown language, compile error) are stored as `Error` submissions and
    /// returned as errors. Anything else is returned as an unhandled error
    /// after one attempt to store the submission as `Error`.
    pub async fn judge(
        &self,
        user_id: &str,
        problem_id: i64,
        language: &str,
        code: &str,
    ) -> Result<Submission, JudgeError> {
        let mut submission =
            match db::create_submission(&self.pool, user_id, problem_id, language, code).await {
                Ok(submission) => submission,
                Err(e) => {
                    log::error!("Failed to create submission for user {user_id}: {e}");
                    let err = JudgeError::from(e);
                    self.broadcaster
                        .publish(user_id, StatusEvent::error(None, err.to_string()));
                    return Err(err);
                }
            };
        log::info!(
            "Created submission {} from user {user_id} for problem {problem_id}",
            submission.id
        );

        match self.evaluate(&mut submission).await {
            Ok(()) => Ok(submission),
            Err(err) if err.is_unhandled() => {
                log::error!("Judging submission {} failed: {err}", submission.id);
                self.broadcaster.publish(
                    user_id,
                    StatusEvent::error(Some(submission.id), err.to_string()),
                );
                self.abandon(&mut submission, &err).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn evaluate(&self, submission: &mut Submission) -> Result<(), JudgeError> {
        // waits in Pending until a slot frees up
        let _slot = self.slots.acquire().await.context("Judge slots closed")?;

        submission.updated_time =
            db::update_status(&self.pool, submission.id, SubmissionStatus::Running).await?;
        submission.status = SubmissionStatus::Running;
        self.broadcaster
            .publish(&submission.user_id, StatusEvent::running(submission.id));

        let Some(problem) = db::find_problem(&self.pool, submission.problem_id).await? else {
            return self.reject(submission, JudgeError::ProblemNotFound).await;
        };

        let language = match submission.language.parse::<Language>() {
            Ok(language) => language,
            Err(e) => {
                return self
                    .reject(submission, JudgeError::UnsupportedLanguage(e.0))
                    .await;
            }
        };

        let workspace = self
            .workspaces
            .stage(submission.id, language, &submission.code)?;

        if let Err(err) = self.compile(language, &workspace).await {
            workspace.cleanup();
            return self.reject(submission, err).await;
        }

        let run = language.run_step(&self.toolchains, workspace.dir(), workspace.source());
        let outcome = self.run_test_cases(&problem, &run).await?;

        let verdict = if outcome.all_passed {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        submission.status = SubmissionStatus::Completed;
        submission.verdict = Some(verdict);
        submission.output = outcome.output;
        submission.error = outcome.error;
        if verdict == Verdict::Pass {
            submission.plagiarism_report = Some(plagiarism::detect(&self.pool, submission).await);
        }

        submission.updated_time = db::save_result(&self.pool, submission).await?;
        log::info!("Submission {} completed: {}", submission.id, verdict.as_str());
        self.broadcaster.publish(
            &submission.user_id,
            StatusEvent::completed(submission.id, verdict),
        );

        workspace.cleanup();
        Ok(())
    }

    /// Runs the compile step, if the language has one
    async fn compile(&self, language: Language, workspace: &Workspace) -> Result<(), JudgeError> {
        let Some(step) = language.compile_step(&self.toolchains, workspace.dir(), workspace.source())
        else {
            return Ok(());
        };

        let result = self
            .runner
            .run(&step, None, self.compile_time_limit)
            .await?;

        let stderr = if result.timed_out() {
            format!(
                "Compilation timed out after {}ms\n{}",
                self.compile_time_limit.as_millis(),
                result.stderr
            )
        } else if COMPILE_STDERR_IS_FAILURE && !result.stderr.is_empty() {
            result.stderr
        } else if !result.success() {
            format!("Compiler terminated abnormally: {:?}\n{}", result.termination, result.stderr)
        } else {
            return Ok(());
        };

        log::debug!("Compile step `{}` failed", step.program);
        Err(JudgeError::CompileFailure { stderr })
    }

    /// Runs every test case, hidden ones first, without stopping at the first mismatch
    async fn run_test_cases(
        &self,
        problem: &Problem,
        run: &Invocation,
    ) -> Result<TestRun, JudgeError> {
        let mut outcome = TestRun {
            all_passed: true,
            ..TestRun::default()
        };

        for (idx, case) in problem.judging_order().enumerate() {
            let input = case.input.as_deref().unwrap_or_default();
            let stdin = format!("{input}\n");
            let result = self
                .runner
                .run(run, Some(&stdin), self.run_time_limit)
                .await?;

            outcome.output.push_str(&format!(
                "Input: {input}\nOutput: {}\nExpected: {}\n",
                result.stdout, case.output
            ));
            outcome.error.push_str(&result.stderr);

            if result.timed_out() {
                outcome
                    .error
                    .push_str(&format!("Test case {}: Time Limit Exceeded\n", idx + 1));
                outcome.all_passed = false;
            } else if !outputs_match(&result.stdout, &case.output) {
                outcome.all_passed = false;
            }
        }

        Ok(outcome)
    }

    /// Stores a planned failure as the submission's terminal `Error` state
    async fn reject(&self, submission: &mut Submission, err: JudgeError) -> Result<(), JudgeError> {
        if err.is_unhandled() {
            return Err(err);
        }

        submission.status = SubmissionStatus::Error;
        submission.verdict = None;
        submission.plagiarism_report = None;
        submission.error = err.error_log();
        submission.updated_time = db::save_result(&self.pool, submission).await?;

        log::info!("Submission {} rejected: {err}", submission.id);
        self.broadcaster.publish(
            &submission.user_id,
            StatusEvent::error(Some(submission.id), submission.error.clone()),
        );
        Err(err)
    }

    /// Best effort: a record that cannot be written here stays non-terminal
    async fn abandon(&self, submission: &mut Submission, err: &JudgeError) {
        submission.status = SubmissionStatus::Error;
        submission.verdict = None;
        submission.plagiarism_report = None;
        submission.error = err.error_log();

        match db::save_result(&self.pool, submission).await {
            Ok(updated_time) => submission.updated_time = updated_time,
            Err(e) => log::error!(
                "Submission {} could not be marked as failed and stays unfinished: {e}",
                submission.id
            ),
        }
    }
}

impl<R: ProcessRunner + 'static> Judge<R> {
    /// Judges on a task of its own, detached from the caller
    ///
    /// Dropping the returned handle, as a disconnecting HTTP client does,
    /// leaves judging running until the submission reaches a terminal state.
    pub fn submit(
        self: &Arc<Self>,
        user_id: String,
        problem_id: i64,
        language: String,
        code: String,
    ) -> JoinHandle<Result<Submission, JudgeError>> {
        let judge = Arc::clone(self);
        tokio::spawn(async move { judge.judge(&user_id, problem_id, &language, &code).await })
    }
}

/// Outputs match when equal after trimming surrounding whitespace
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    actual.trim() == expected.trim()
}
