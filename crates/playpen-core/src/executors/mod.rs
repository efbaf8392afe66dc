//! Sandbox execution port and result model.
//!
//! The pipeline talks to the isolation technology through the
//! [`SandboxExecutor`] trait, so the container runtime (Docker today, a
//! microVM or OS-level sandbox tomorrow) is swappable without touching
//! request handling. An executor resolves the program-level outcomes
//! itself (success, non-zero exit, timeout) and reports infrastructure
//! problems as [`SandboxError`]s for the pipeline to fold into the
//! [`InfrastructureFailure`](ExecutionOutcome::InfrastructureFailure)
//! outcome.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::SandboxError;
use crate::registry::ExecutionProfile;

pub mod docker;

pub use docker::DockerExecutor;

/// Fallback error text when a failed program produced no stderr.
pub const EXECUTION_FAILED_MESSAGE: &str = "Code execution failed.";

/// Terminal classification of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    NonZeroExit,
    Timeout,
    InfrastructureFailure,
}

/// What came out of one execution attempt.
///
/// `error` is the human-readable failure text (empty on success); it is
/// exactly what the journal records. `stdout` has trailing newlines
/// removed and `stderr` is trimmed, matching what the boundary returns.
/// For `InfrastructureFailure` results the diagnostic detail rides in
/// `stderr`, since that is the error stream of whatever failed.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub error: String,
    pub duration_seconds: f64,
}

impl ExecutionResult {
    /// A run that exited zero. Keeps stderr for diagnostics even though
    /// the success payload does not expose it.
    pub fn success(stdout: &str, stderr: &str) -> Self {
        Self {
            outcome: ExecutionOutcome::Success,
            stdout: stdout.trim_end_matches('\n').to_string(),
            stderr: stderr.trim().to_string(),
            exit_code: Some(0),
            error: String::new(),
            duration_seconds: 0.0,
        }
    }

    /// A run that exited non-zero. The trimmed stderr becomes the error
    /// detail, with a fixed fallback when the program said nothing.
    pub fn failed(stdout: &str, stderr: &str, exit_code: i64) -> Self {
        let stderr = stderr.trim().to_string();
        let error = if stderr.is_empty() {
            EXECUTION_FAILED_MESSAGE.to_string()
        } else {
            stderr.clone()
        };
        Self {
            outcome: ExecutionOutcome::NonZeroExit,
            stdout: stdout.trim_end_matches('\n').to_string(),
            stderr,
            exit_code: Some(exit_code),
            error,
            duration_seconds: 0.0,
        }
    }

    /// A run that hit the wall-clock limit. The executor kills the
    /// sandboxed process tree before handing this back to the caller.
    pub fn timed_out(limit: Duration) -> Self {
        Self {
            outcome: ExecutionOutcome::Timeout,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            error: format!("Execution timed out after {} seconds", limit.as_secs()),
            duration_seconds: 0.0,
        }
    }

    /// A failure of the isolation machinery itself, with an optional short
    /// diagnostic (never a stack trace).
    pub fn infrastructure(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            outcome: ExecutionOutcome::InfrastructureFailure,
            stdout: String::new(),
            stderr: detail.unwrap_or_default(),
            exit_code: None,
            error: message.into(),
            duration_seconds: 0.0,
        }
    }

    /// Stamp the total wall-clock duration of the whole operation,
    /// including workspace setup. Measured by the pipeline regardless of
    /// outcome.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Success
    }
}

/// Port to the isolation technology.
///
/// `execute` runs the profile's command inside an isolated process with
/// the workspace as its only filesystem, captures output until exit or
/// timeout, and never leaks the process past a timeout. Implementations
/// must be safe to share across concurrent requests.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute(
        &self,
        profile: &ExecutionProfile,
        workspace: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_trims_trailing_newlines_only() {
        let result = ExecutionResult::success("hello\nworld\n\n", "");
        assert_eq!(result.stdout, "hello\nworld");
        assert!(result.is_success());
        assert_eq!(result.exit_code, Some(0));
        assert!(result.error.is_empty());
    }

    #[test]
    fn success_keeps_stderr_for_diagnostics() {
        let result = ExecutionResult::success("out\n", "  warning: deprecated  ");
        assert_eq!(result.stderr, "warning: deprecated");
        assert!(result.error.is_empty());
    }

    #[test]
    fn failed_uses_trimmed_stderr_as_error() {
        let result = ExecutionResult::failed("", "Traceback: boom\n", 1);
        assert_eq!(result.outcome, ExecutionOutcome::NonZeroExit);
        assert_eq!(result.error, "Traceback: boom");
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn failed_with_silent_program_falls_back_to_fixed_message() {
        let result = ExecutionResult::failed("", "   \n", 2);
        assert_eq!(result.error, EXECUTION_FAILED_MESSAGE);
        assert!(result.stderr.is_empty());
    }

    #[test]
    fn timed_out_names_the_limit_and_clears_stdout() {
        let result = ExecutionResult::timed_out(Duration::from_secs(10));
        assert_eq!(result.outcome, ExecutionOutcome::Timeout);
        assert_eq!(result.error, "Execution timed out after 10 seconds");
        assert!(result.stdout.is_empty());
        assert_eq!(result.exit_code, None);
    }

    #[test]
    fn infrastructure_carries_detail_in_stderr() {
        let result =
            ExecutionResult::infrastructure("Internal error.", Some("socket closed".to_string()));
        assert_eq!(result.outcome, ExecutionOutcome::InfrastructureFailure);
        assert_eq!(result.error, "Internal error.");
        assert_eq!(result.stderr, "socket closed");
    }

    #[test]
    fn with_duration_stamps_the_measurement() {
        let result = ExecutionResult::success("ok", "").with_duration(1.25);
        assert!((result.duration_seconds - 1.25).abs() < f64::EPSILON);
    }
}
