//! Error types for the sandboxed execution pipeline
//!
//! Each stage of the pipeline owns its own failure vocabulary. Validation
//! errors are caller mistakes and never touch isolation resources; sandbox
//! errors describe infrastructure problems around the container runtime;
//! config errors only occur at startup. The HTTP boundary maps each family
//! to a status code without inspecting free-form strings, so the display
//! messages here double as the user-visible error text.

use thiserror::Error;

/// Rejections produced by request validation, before any isolation
/// resource is created. Display strings are the exact messages returned
/// to the caller in `400` responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid JSON body.")]
    MalformedPayload,
    #[error("Unsupported language '{language}'. Supported: {supported}.")]
    UnsupportedLanguage { language: String, supported: String },
    #[error("Field 'code' must be a non-empty string.")]
    EmptyCode,
    #[error("Code too long. Maximum allowed length is {limit} characters.")]
    CodeTooLong { limit: usize },
}

impl ValidationError {
    /// Create an unsupported-language error naming the offending value and
    /// the supported set.
    pub fn unsupported_language(language: impl Into<String>, supported: impl Into<String>) -> Self {
        Self::UnsupportedLanguage {
            language: language.into(),
            supported: supported.into(),
        }
    }
}

/// Failures of the isolation machinery itself, as opposed to failures of
/// the submitted program. All of these surface as `InfrastructureFailure`
/// outcomes; `RuntimeUnavailable` is kept distinct so the boundary can
/// tell "the container runtime is missing" apart from an unexpected error.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("{0}")]
    RuntimeUnavailable(String),
    #[error("Container runtime error: {0}")]
    Runtime(String),
    #[error("Could not prepare execution workspace: {0}")]
    Workspace(String),
    #[error("I/O error during sandbox operation: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }
}

/// Startup configuration failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(String),
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
