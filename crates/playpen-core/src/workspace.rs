//! Ephemeral isolation workspaces for single executions.
//!
//! Each execution gets an exclusively-owned temporary directory holding
//! exactly one source file, which is bind-mounted into the sandbox. The
//! directory name is unique per execution, so concurrent requests can never
//! collide. Removal is tied to ownership: dropping the workspace deletes
//! the whole tree, which covers normal completion, error returns, panics,
//! and cancelled futures alike.

use std::path::Path;

use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::SandboxError;
use crate::registry::ExecutionProfile;

/// Directory-name prefix for workspaces, useful when inspecting leftovers
/// on a crashed host.
const WORKSPACE_PREFIX: &str = "playpen-";

/// An exclusively-owned ephemeral directory containing one materialized
/// source file. Deleted recursively on drop.
#[derive(Debug)]
pub struct ExecutionWorkspace {
    dir: TempDir,
}

impl ExecutionWorkspace {
    /// Create a fresh workspace and write `code` as UTF-8 under the
    /// profile's entry filename. Any failure here aborts the execution
    /// before the sandbox is ever invoked.
    pub async fn provision(
        profile: &ExecutionProfile,
        code: &str,
    ) -> Result<Self, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(|e| {
                SandboxError::workspace(format!("could not create workspace directory: {}", e))
            })?;

        let entry_path = dir.path().join(&profile.entry_filename);
        let mut file = fs::File::create(&entry_path).await.map_err(|e| {
            SandboxError::workspace(format!(
                "could not create {}: {}",
                profile.entry_filename, e
            ))
        })?;
        file.write_all(code.as_bytes()).await.map_err(|e| {
            SandboxError::workspace(format!("could not write {}: {}", profile.entry_filename, e))
        })?;
        file.flush().await.map_err(|e| {
            SandboxError::workspace(format!("could not flush {}: {}", profile.entry_filename, e))
        })?;

        Ok(Self { dir })
    }

    /// The workspace directory on the host.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LanguageRegistry;

    fn python_profile() -> ExecutionProfile {
        LanguageRegistry::with_defaults()
            .resolve("python")
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn provision_materializes_the_entry_file() {
        let workspace = ExecutionWorkspace::provision(&python_profile(), "print('hi')\n")
            .await
            .unwrap();
        let written = std::fs::read_to_string(workspace.path().join("script.py")).unwrap();
        assert_eq!(written, "print('hi')\n");
    }

    #[tokio::test]
    async fn workspace_directory_carries_the_prefix() {
        let workspace = ExecutionWorkspace::provision(&python_profile(), "pass")
            .await
            .unwrap();
        let name = workspace
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap();
        assert!(name.starts_with("playpen-"));
    }

    #[tokio::test]
    async fn concurrent_workspaces_never_share_a_directory() {
        let profile = python_profile();
        let a = ExecutionWorkspace::provision(&profile, "print(1)").await.unwrap();
        let b = ExecutionWorkspace::provision(&profile, "print(2)").await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn drop_removes_the_directory_tree() {
        let workspace = ExecutionWorkspace::provision(&python_profile(), "pass")
            .await
            .unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.exists());
        drop(workspace);
        assert!(!path.exists());
    }
}
