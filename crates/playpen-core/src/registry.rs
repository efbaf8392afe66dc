//! Language registry mapping language identifiers to execution profiles.
//!
//! The registry is built once at startup (from built-in defaults or from
//! configuration) and shared read-only afterwards. Extending the service to
//! a new language means adding a registry entry, not touching the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the sandbox needs to run code of one language: the container
/// image, the filename the source is materialized under, and the command
/// executed inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub language: String,
    pub image: String,
    pub entry_filename: String,
    pub run_command: Vec<String>,
}

/// Read-only lookup from a (case-insensitive) language identifier to its
/// [`ExecutionProfile`].
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: HashMap<String, ExecutionProfile>,
}

impl LanguageRegistry {
    /// Registry with the stock language set.
    pub fn with_defaults() -> Self {
        Self::from_profiles([
            ExecutionProfile {
                language: "python".to_string(),
                image: "python:3.11-slim".to_string(),
                entry_filename: "script.py".to_string(),
                run_command: vec!["python".to_string(), "script.py".to_string()],
            },
            ExecutionProfile {
                language: "node".to_string(),
                image: "node:20-slim".to_string(),
                entry_filename: "script.js".to_string(),
                run_command: vec!["node".to_string(), "script.js".to_string()],
            },
        ])
    }

    /// Build a registry from explicit profiles. Identifiers are stored
    /// lower-cased so lookups are case-insensitive.
    pub fn from_profiles(profiles: impl IntoIterator<Item = ExecutionProfile>) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|mut profile| {
                profile.language = profile.language.to_lowercase();
                (profile.language.clone(), profile)
            })
            .collect();
        Self { profiles }
    }

    /// Resolve a language identifier to its profile. Lookup is
    /// case-normalized; no side effects.
    pub fn resolve(&self, language: &str) -> Option<&ExecutionProfile> {
        self.profiles.get(&language.to_lowercase())
    }

    /// Supported language identifiers, sorted for stable output.
    pub fn supported(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }

    /// The supported set rendered for error messages, e.g. `"node, python"`.
    pub fn supported_label(&self) -> String {
        self.supported().join(", ")
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_fully_populates_profiles() {
        let registry = LanguageRegistry::with_defaults();
        assert_eq!(registry.len(), 2);
        for language in registry.supported() {
            let profile = registry.resolve(language).unwrap();
            assert!(!profile.image.is_empty());
            assert!(!profile.entry_filename.is_empty());
            assert!(!profile.run_command.is_empty());
        }
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let registry = LanguageRegistry::with_defaults();
        let profile = registry.resolve("PYTHON").unwrap();
        assert_eq!(profile.image, "python:3.11-slim");
        assert_eq!(profile.entry_filename, "script.py");
        assert_eq!(profile.run_command, vec!["python", "script.py"]);
    }

    #[test]
    fn resolve_unknown_language_returns_none() {
        let registry = LanguageRegistry::with_defaults();
        assert!(registry.resolve("ruby").is_none());
    }

    #[test]
    fn supported_label_is_sorted_and_comma_joined() {
        let registry = LanguageRegistry::with_defaults();
        assert_eq!(registry.supported_label(), "node, python");
    }

    #[test]
    fn from_profiles_normalizes_identifiers() {
        let registry = LanguageRegistry::from_profiles([ExecutionProfile {
            language: "Deno".to_string(),
            image: "denoland/deno:alpine".to_string(),
            entry_filename: "main.ts".to_string(),
            run_command: vec!["deno".to_string(), "run".to_string(), "main.ts".to_string()],
        }]);
        assert!(registry.resolve("deno").is_some());
        assert!(registry.resolve("DENO").is_some());
    }
}
