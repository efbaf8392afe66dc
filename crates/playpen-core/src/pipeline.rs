//! End-to-end request pipeline: validate, provision, execute, journal.
//!
//! The pipeline owns the language registry, the sandbox executor, and the
//! journal. `submit` is the one entry point: it refuses bad requests with
//! a [`ValidationError`] and otherwise always produces an
//! [`ExecutionResult`], folding executor-level failures into the
//! infrastructure outcome so the boundary only has one shape to map.
//!
//! Admitted runs execute on a spawned task that `submit` joins. Dropping
//! the `submit` future detaches the run instead of cancelling it, so
//! container teardown and journaling still complete when a caller goes
//! away mid-execution.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::errors::{SandboxError, ValidationError};
use crate::executors::{ExecutionOutcome, ExecutionResult, SandboxExecutor};
use crate::journal::ExecutionJournal;
use crate::registry::{ExecutionProfile, LanguageRegistry};
use crate::validation::validate_raw;
use crate::workspace::ExecutionWorkspace;

const INTERNAL_FAILURE_MESSAGE: &str = "Internal server error while running the sandbox.";

/// Per-request resource bounds enforced by the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    /// Upper bound on submitted code, counted in characters.
    pub max_code_length: usize,
    /// Wall-clock budget for one sandboxed run.
    pub timeout: Duration,
}

pub struct ExecutionPipeline {
    registry: LanguageRegistry,
    executor: Arc<dyn SandboxExecutor>,
    journal: Arc<ExecutionJournal>,
    limits: ExecutionLimits,
    admission: Option<Arc<Semaphore>>,
}

impl ExecutionPipeline {
    pub fn new(
        registry: LanguageRegistry,
        executor: Arc<dyn SandboxExecutor>,
        journal: Arc<ExecutionJournal>,
        limits: ExecutionLimits,
    ) -> Self {
        Self {
            registry,
            executor,
            journal,
            limits,
            admission: None,
        }
    }

    /// Bound the number of executions in flight at once. `None` leaves
    /// admission unbounded.
    pub fn with_max_concurrent(mut self, max_concurrent: Option<usize>) -> Self {
        self.admission = max_concurrent.map(|permits| Arc::new(Semaphore::new(permits)));
        self
    }

    pub fn journal(&self) -> &Arc<ExecutionJournal> {
        &self.journal
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    /// Run one untrusted submission end to end. `Err` is a request the
    /// pipeline refused to run; `Ok` carries the sandbox outcome, which
    /// may itself describe a failed, timed-out, or unrunnable execution.
    ///
    /// Once a request is admitted, the run happens on its own task and is
    /// joined here. Dropping this future leaves that task running, so the
    /// sandbox is still torn down and the outcome still journaled.
    pub async fn submit(&self, body: &[u8]) -> Result<ExecutionResult, ValidationError> {
        let started = Instant::now();
        let request = validate_raw(body, &self.registry, self.limits.max_code_length)?;
        let profile = match self.registry.resolve(&request.language) {
            Some(profile) => profile.clone(),
            None => {
                return Err(ValidationError::unsupported_language(
                    &request.language,
                    self.registry.supported_label(),
                ))
            }
        };

        log::debug!(
            "running {} submission ({} chars)",
            profile.language,
            request.code.chars().count()
        );

        let executor = Arc::clone(&self.executor);
        let journal = Arc::clone(&self.journal);
        let admission = self.admission.clone();
        let limits = self.limits;
        let run = tokio::spawn(async move {
            let outcome =
                run_sandboxed(executor, admission, &profile, &request.code, limits.timeout).await;
            let mut result = match outcome {
                Ok(result) => result,
                Err(SandboxError::RuntimeUnavailable(message)) => {
                    log::error!("sandbox runtime unavailable: {}", message);
                    ExecutionResult::infrastructure(message, None)
                }
                Err(err) => {
                    log::error!("sandbox execution failed: {}", err);
                    ExecutionResult::infrastructure(INTERNAL_FAILURE_MESSAGE, Some(err.to_string()))
                }
            };
            result = result.with_duration(started.elapsed().as_secs_f64());
            record(&journal, limits.timeout, &request.language, &request.code, &result).await;
            result
        });

        match run.await {
            Ok(result) => Ok(result),
            // JoinError means the run task itself panicked; it is never
            // cancelled from here.
            Err(err) => {
                log::error!("sandbox task failed: {}", err);
                Ok(ExecutionResult::infrastructure(
                    INTERNAL_FAILURE_MESSAGE,
                    Some(err.to_string()),
                ))
            }
        }
    }
}

async fn run_sandboxed(
    executor: Arc<dyn SandboxExecutor>,
    admission: Option<Arc<Semaphore>>,
    profile: &ExecutionProfile,
    code: &str,
    timeout: Duration,
) -> Result<ExecutionResult, SandboxError> {
    let _permit = match admission {
        Some(semaphore) => Some(
            semaphore
                .acquire_owned()
                .await
                .map_err(|_| SandboxError::runtime("admission semaphore closed".to_string()))?,
        ),
        None => None,
    };

    let workspace = ExecutionWorkspace::provision(profile, code).await?;
    executor.execute(profile, workspace.path(), timeout).await
    // workspace drops here, removing the directory tree
}

/// Journal terminal outcomes. Infrastructure failures describe this
/// service rather than the submission and stay out of the history.
async fn record(
    journal: &ExecutionJournal,
    timeout: Duration,
    language: &str,
    code: &str,
    result: &ExecutionResult,
) {
    match result.outcome {
        ExecutionOutcome::Success => {
            journal
                .append(language, code, &result.stdout, "", result.duration_seconds)
                .await;
        }
        ExecutionOutcome::Timeout => {
            log::warn!("submission timed out after {:?}", timeout);
            journal
                .append(language, code, "", &result.error, result.duration_seconds)
                .await;
        }
        ExecutionOutcome::NonZeroExit => {
            journal
                .append(language, code, "", &result.error, result.duration_seconds)
                .await;
        }
        ExecutionOutcome::InfrastructureFailure => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Canned {
        Finished(ExecutionResult),
        Unavailable(String),
        Broken(String),
    }

    struct CannedExecutor {
        canned: Canned,
        delay: Option<Duration>,
        calls: AtomicUsize,
        completions: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        entry_file_seen: AtomicBool,
        workspaces: Mutex<Vec<PathBuf>>,
    }

    impl CannedExecutor {
        fn new(canned: Canned) -> Self {
            Self {
                canned,
                delay: None,
                calls: AtomicUsize::new(0),
                completions: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                entry_file_seen: AtomicBool::new(false),
                workspaces: Mutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl SandboxExecutor for CannedExecutor {
        async fn execute(
            &self,
            profile: &ExecutionProfile,
            workspace: &Path,
            _timeout: Duration,
        ) -> Result<ExecutionResult, SandboxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);

            if workspace.join(&profile.entry_filename).exists() {
                self.entry_file_seen.store(true, Ordering::SeqCst);
            }
            self.workspaces
                .lock()
                .unwrap()
                .push(workspace.to_path_buf());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            // Only reached if nothing cancelled us across the await above.
            self.completions.fetch_add(1, Ordering::SeqCst);
            match &self.canned {
                Canned::Finished(result) => Ok(result.clone()),
                Canned::Unavailable(message) => {
                    Err(SandboxError::RuntimeUnavailable(message.clone()))
                }
                Canned::Broken(message) => Err(SandboxError::runtime(message.clone())),
            }
        }
    }

    fn pipeline_with(executor: Arc<CannedExecutor>) -> ExecutionPipeline {
        ExecutionPipeline::new(
            LanguageRegistry::with_defaults(),
            executor,
            Arc::new(ExecutionJournal::new(20)),
            ExecutionLimits {
                max_code_length: 5000,
                timeout: Duration::from_secs(10),
            },
        )
    }

    fn run_body(code: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "language": "python", "code": code })).unwrap()
    }

    #[tokio::test]
    async fn success_is_journaled_with_its_output() {
        let executor = Arc::new(CannedExecutor::new(Canned::Finished(
            ExecutionResult::success("hi\n", ""),
        )));
        let pipeline = pipeline_with(Arc::clone(&executor));

        let result = pipeline.submit(&run_body("print('hi')")).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.stdout, "hi");
        assert!(result.duration_seconds >= 0.0);

        let entries = pipeline.journal().list_newest_first().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].output, "hi");
        assert_eq!(entries[0].error, "");
        assert_eq!(entries[0].language, "python");
    }

    #[tokio::test]
    async fn invalid_body_never_reaches_the_executor() {
        let executor = Arc::new(CannedExecutor::new(Canned::Finished(
            ExecutionResult::success("", ""),
        )));
        let pipeline = pipeline_with(Arc::clone(&executor));

        let err = pipeline.submit(b"not json").await.unwrap_err();
        assert_eq!(err, ValidationError::MalformedPayload);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.journal().is_empty().await);
    }

    #[tokio::test]
    async fn unsupported_language_names_the_supported_set() {
        let executor = Arc::new(CannedExecutor::new(Canned::Finished(
            ExecutionResult::success("", ""),
        )));
        let pipeline = pipeline_with(executor);

        let body =
            serde_json::to_vec(&serde_json::json!({ "language": "ruby", "code": "puts 1" }))
                .unwrap();
        let err = pipeline.submit(&body).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported language 'ruby'. Supported: node, python."
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_journaled_as_an_error() {
        let executor = Arc::new(CannedExecutor::new(Canned::Finished(
            ExecutionResult::failed("", "Traceback: boom\n", 1),
        )));
        let pipeline = pipeline_with(executor);

        let result = pipeline.submit(&run_body("boom()")).await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::NonZeroExit);

        let entries = pipeline.journal().list_newest_first().await;
        assert_eq!(entries[0].output, "");
        assert_eq!(entries[0].error, "Traceback: boom");
    }

    #[tokio::test]
    async fn timeout_is_journaled_with_the_limit_message() {
        let executor = Arc::new(CannedExecutor::new(Canned::Finished(
            ExecutionResult::timed_out(Duration::from_secs(10)),
        )));
        let pipeline = pipeline_with(executor);

        let result = pipeline.submit(&run_body("while True: pass")).await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::Timeout);

        let entries = pipeline.journal().list_newest_first().await;
        assert_eq!(entries[0].error, "Execution timed out after 10 seconds");
    }

    #[tokio::test]
    async fn infrastructure_failure_is_reported_but_not_journaled() {
        let executor = Arc::new(CannedExecutor::new(Canned::Broken(
            "container runtime exploded".to_string(),
        )));
        let pipeline = pipeline_with(Arc::clone(&executor));

        let result = pipeline.submit(&run_body("print(1)")).await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::InfrastructureFailure);
        assert_eq!(result.error, INTERNAL_FAILURE_MESSAGE);
        assert!(result.stderr.contains("container runtime exploded"));
        assert!(pipeline.journal().is_empty().await);

        // The workspace is reclaimed even when the executor errors out.
        let workspaces = executor.workspaces.lock().unwrap();
        assert_eq!(workspaces.len(), 1);
        assert!(!workspaces[0].exists());
    }

    #[tokio::test]
    async fn missing_runtime_keeps_its_own_message_and_no_detail() {
        let message = "Docker is not available or the daemon is not reachable.";
        let executor = Arc::new(CannedExecutor::new(Canned::Unavailable(message.to_string())));
        let pipeline = pipeline_with(executor);

        let result = pipeline.submit(&run_body("print(1)")).await.unwrap();
        assert_eq!(result.outcome, ExecutionOutcome::InfrastructureFailure);
        assert_eq!(result.error, message);
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn workspace_exists_during_execution_and_is_gone_after() {
        let executor = Arc::new(CannedExecutor::new(Canned::Finished(
            ExecutionResult::success("", ""),
        )));
        let pipeline = pipeline_with(Arc::clone(&executor));

        pipeline.submit(&run_body("print(1)")).await.unwrap();

        assert!(executor.entry_file_seen.load(Ordering::SeqCst));
        let workspaces = executor.workspaces.lock().unwrap();
        assert_eq!(workspaces.len(), 1);
        assert!(!workspaces[0].exists());
    }

    #[tokio::test]
    async fn abandoned_submission_still_finishes_and_is_journaled() {
        let executor = Arc::new(
            CannedExecutor::new(Canned::Finished(ExecutionResult::success("late\n", "")))
                .with_delay(Duration::from_millis(50)),
        );
        let pipeline = Arc::new(pipeline_with(Arc::clone(&executor)));

        // A caller that goes away mid-run, like a dropped HTTP handler.
        let submission = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.submit(&run_body("print('late')")).await }
        });
        for _ in 0..200 {
            if executor.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        submission.abort();
        assert!(submission.await.unwrap_err().is_cancelled());

        // The detached run still finishes, and its outcome lands in the
        // journal.
        for _ in 0..200 {
            if !pipeline.journal().is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let entries = pipeline.journal().list_newest_first().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].output, "late");
        assert_eq!(executor.completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_submissions_journal_distinct_ids() {
        let executor = Arc::new(CannedExecutor::new(Canned::Finished(
            ExecutionResult::success("ok\n", ""),
        )));
        let pipeline = Arc::new(pipeline_with(executor));

        let mut handles = Vec::new();
        for i in 0..8 {
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                pipeline
                    .submit(&run_body(&format!("print({})", i)))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entries = pipeline.journal().list_newest_first().await;
        assert_eq!(entries.len(), 8);
        let mut ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[tokio::test]
    async fn admission_bounds_in_flight_executions() {
        let executor = Arc::new(
            CannedExecutor::new(Canned::Finished(ExecutionResult::success("", "")))
                .with_delay(Duration::from_millis(20)),
        );
        let pipeline = Arc::new(
            pipeline_with(Arc::clone(&executor)).with_max_concurrent(Some(1)),
        );

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                pipeline.submit(&run_body("print(1)")).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 4);
    }
}
