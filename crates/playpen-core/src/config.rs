//! Service configuration: YAML file, environment overrides, validation.
//!
//! Every field has a default, so the service runs without any config file.
//! A non-empty `languages` table replaces the built-in language set rather
//! than extending it, which keeps the effective set explicit when operators
//! start customizing images.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;

use crate::errors::ConfigError;
use crate::registry::{ExecutionProfile, LanguageRegistry};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_MAX_CODE_LENGTH: usize = 5000;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_MEMORY_BYTES: u64 = 128 * 1024 * 1024;
pub const DEFAULT_JOURNAL_CAPACITY: usize = 20;

/// Smallest per-container memory ceiling the daemon reliably accepts.
const MIN_MEMORY_BYTES: u64 = 4 * 1024 * 1024;

const ENV_BIND_ADDR: &str = "PLAYPEN_BIND_ADDR";
const ENV_MAX_CODE_LENGTH: &str = "PLAYPEN_MAX_CODE_LENGTH";
const ENV_TIMEOUT_SECONDS: &str = "PLAYPEN_TIMEOUT_SECONDS";
const ENV_MEMORY_BYTES: &str = "PLAYPEN_MEMORY_BYTES";
const ENV_JOURNAL_CAPACITY: &str = "PLAYPEN_JOURNAL_CAPACITY";
const ENV_MAX_CONCURRENT: &str = "PLAYPEN_MAX_CONCURRENT";

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub journal: JournalSection,
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsSection {
    /// Upper bound on submitted code, counted in characters.
    #[serde(default = "default_max_code_length")]
    pub max_code_length: usize,
    /// Wall-clock budget for one sandboxed run.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Hard memory ceiling per container.
    #[serde(default = "default_memory_bytes")]
    pub memory_bytes: u64,
    /// Maximum executions in flight at once; absent means unbounded.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalSection {
    /// Entries kept before the oldest is evicted.
    #[serde(default = "default_journal_capacity")]
    pub capacity: usize,
}

/// One sandbox language: the image to run, the filename the submitted code
/// is saved under, and the command that runs it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageSection {
    pub image: String,
    pub filename: String,
    pub cmd: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_code_length: default_max_code_length(),
            timeout_seconds: default_timeout_seconds(),
            memory_bytes: default_memory_bytes(),
            max_concurrent: None,
        }
    }
}

impl Default for JournalSection {
    fn default() -> Self {
        Self {
            capacity: default_journal_capacity(),
        }
    }
}

impl LimitsSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind_addr.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Invalid(format!(
                "server.bind_addr {:?} is not a socket address: {}",
                self.server.bind_addr, e
            ))
        })?;

        if self.limits.max_code_length == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_code_length must be greater than 0".to_string(),
            ));
        }

        if self.limits.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "limits.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.limits.memory_bytes < MIN_MEMORY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "limits.memory_bytes must be at least {} bytes",
                MIN_MEMORY_BYTES
            )));
        }

        if self.limits.max_concurrent == Some(0) {
            return Err(ConfigError::Invalid(
                "limits.max_concurrent must be greater than 0 when set".to_string(),
            ));
        }

        if self.journal.capacity == 0 {
            return Err(ConfigError::Invalid(
                "journal.capacity must be greater than 0".to_string(),
            ));
        }

        for (language, section) in &self.languages {
            if language.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "language names cannot be empty".to_string(),
                ));
            }
            if section.image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "languages.{}.image cannot be empty",
                    language
                )));
            }
            // The filename ends up inside the workspace bind mount; a path
            // component would let a config escape it.
            if section.filename.is_empty()
                || section.filename.contains('/')
                || section.filename == ".."
            {
                return Err(ConfigError::Invalid(format!(
                    "languages.{}.filename must be a bare file name",
                    language
                )));
            }
            if section.cmd.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "languages.{}.cmd cannot be empty",
                    language
                )));
            }
        }

        Ok(())
    }

    /// The language set this service offers. A non-empty `languages` table
    /// replaces the built-in set.
    pub fn registry(&self) -> LanguageRegistry {
        if self.languages.is_empty() {
            return LanguageRegistry::with_defaults();
        }
        LanguageRegistry::from_profiles(self.languages.iter().map(|(language, section)| {
            ExecutionProfile {
                language: language.clone(),
                image: section.image.clone(),
                entry_filename: section.filename.clone(),
                run_command: section.cmd.clone(),
            }
        }))
    }
}

/// Loader with environment-variable resolution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a YAML configuration file, apply `PLAYPEN_*` overrides, and
    /// validate the result.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_str(&content)
    }

    /// Parse YAML configuration, apply `PLAYPEN_*` overrides, and validate
    /// the result. An empty document means defaults.
    pub fn from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
        let mut config: ServiceConfig = if content.trim().is_empty() {
            ServiceConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults plus `PLAYPEN_*` overrides, for running with no
    /// configuration file at all.
    pub fn from_defaults() -> Result<ServiceConfig, ConfigError> {
        let mut config = ServiceConfig::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }
}

/// Apply `PLAYPEN_*` environment overrides on top of `config`.
pub fn apply_env_overrides(config: &mut ServiceConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

fn apply_overrides_from<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_BIND_ADDR) {
        config.server.bind_addr = value;
    }
    if let Some(value) = parsed::<usize>(ENV_MAX_CODE_LENGTH, lookup(ENV_MAX_CODE_LENGTH))? {
        config.limits.max_code_length = value;
    }
    if let Some(value) = parsed::<u64>(ENV_TIMEOUT_SECONDS, lookup(ENV_TIMEOUT_SECONDS))? {
        config.limits.timeout_seconds = value;
    }
    if let Some(value) = parsed::<u64>(ENV_MEMORY_BYTES, lookup(ENV_MEMORY_BYTES))? {
        config.limits.memory_bytes = value;
    }
    if let Some(value) = parsed::<usize>(ENV_JOURNAL_CAPACITY, lookup(ENV_JOURNAL_CAPACITY))? {
        config.journal.capacity = value;
    }
    if let Some(value) = parsed::<usize>(ENV_MAX_CONCURRENT, lookup(ENV_MAX_CONCURRENT))? {
        config.limits.max_concurrent = Some(value);
    }
    Ok(())
}

fn parsed<T>(name: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ConfigError::Invalid(format!("{} has invalid value {:?}: {}", name, raw, e))
        }),
        None => Ok(None),
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_max_code_length() -> usize {
    DEFAULT_MAX_CODE_LENGTH
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_memory_bytes() -> u64 {
    DEFAULT_MEMORY_BYTES
}

fn default_journal_capacity() -> usize {
    DEFAULT_JOURNAL_CAPACITY
}
