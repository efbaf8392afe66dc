//! Core engine for running untrusted code in disposable sandboxes.
//!
//! This crate contains everything below the HTTP boundary: request
//! validation, the language registry, workspace provisioning, the Docker
//! sandbox executor, the execution journal, and the pipeline that ties
//! them together. The HTTP server is a thin layer on top, living in its
//! own crate.
//!
//! # Architecture Overview
//!
//! A submission moves through the subsystems in a straight line:
//!
//! - **Validation**: structural checks on the payload against the
//!   configured limits and the language registry
//! - **Workspace provisioning**: a throwaway host directory holding the
//!   submitted code, removed when the execution finishes
//! - **Sandbox execution**: one container per run with memory, network,
//!   and filesystem isolation plus a wall-clock timeout
//! - **Journal**: a bounded, process-lifetime history of finished runs
//!
//! Swapping the isolation technology means implementing
//! [`SandboxExecutor`]; nothing above the executor changes.

pub mod config;
pub mod errors;
pub mod executors;
pub mod journal;
pub mod pipeline;
pub mod registry;
pub mod validation;
pub mod workspace;

pub use config::{ConfigLoader, ServiceConfig};
pub use errors::{ConfigError, SandboxError, ValidationError};
pub use executors::{DockerExecutor, ExecutionOutcome, ExecutionResult, SandboxExecutor};
pub use journal::{ExecutionJournal, HistoryEntry};
pub use pipeline::{ExecutionLimits, ExecutionPipeline};
pub use registry::{ExecutionProfile, LanguageRegistry};
pub use validation::ExecutionRequest;
pub use workspace::ExecutionWorkspace;
