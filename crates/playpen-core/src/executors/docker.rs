//! Docker-backed sandbox executor.
//!
//! Runs one execution per throwaway container: the workspace is the
//! container's only mounted filesystem (read-only, at a fixed path), the
//! root filesystem is read-only, networking is disabled, and memory is
//! hard-capped with swap pinned to the same value. The wall-clock timeout
//! is raced against the container's exit; on expiry the container is
//! force-removed, taking the whole sandboxed process tree with it, before
//! the result is returned. A timed-out request never leaks a process.
//!
//! A Docker daemon that cannot be reached is reported as
//! `SandboxError::RuntimeUnavailable`, which the boundary presents
//! differently from a failure of the submitted program.

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    CreateImageOptions as BollardCreateImageOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::{ExecutionResult, SandboxExecutor};
use crate::errors::SandboxError;
use crate::registry::ExecutionProfile;

/// Fixed path the workspace is mounted at inside every container; also the
/// working directory the run command starts in.
pub const MOUNT_PATH: &str = "/sandbox";

const DAEMON_MISSING_MESSAGE: &str = "Docker is not available or the daemon is not reachable.";

pub struct DockerExecutor {
    docker: Docker,
    memory_bytes: i64,
}

impl DockerExecutor {
    /// Build an executor against the local Docker daemon with the given
    /// hard memory ceiling per execution. Connection setup is lazy; a
    /// missing daemon surfaces per-execution, not here.
    pub fn connect(memory_bytes: u64) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::RuntimeUnavailable(format!(
                "Could not configure the Docker client: {}",
                e
            ))
        })?;
        Ok(Self {
            docker,
            memory_bytes: memory_bytes.try_into().unwrap_or(i64::MAX),
        })
    }

    async fn ensure_daemon(&self) -> Result<(), SandboxError> {
        self.docker.ping().await.map_err(|err| {
            log::debug!("docker ping failed: {}", err);
            SandboxError::RuntimeUnavailable(DAEMON_MISSING_MESSAGE.to_string())
        })?;
        Ok(())
    }

    /// Create the container, pulling the image first if it is not present
    /// locally (parity with `docker run`'s implicit pull).
    async fn create_container(
        &self,
        profile: &ExecutionProfile,
        host_path: &str,
    ) -> Result<String, SandboxError> {
        match self.try_create(profile, host_path).await {
            Ok(id) => Ok(id),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                self.pull_image(&profile.image).await?;
                self.try_create(profile, host_path).await.map_err(|e| {
                    SandboxError::runtime(format!("failed to create container: {}", e))
                })
            }
            Err(err) => Err(SandboxError::runtime(format!(
                "failed to create container: {}",
                err
            ))),
        }
    }

    async fn try_create(
        &self,
        profile: &ExecutionProfile,
        host_path: &str,
    ) -> Result<String, BollardError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("playpen-{}", Uuid::new_v4())),
            ..Default::default()
        });
        let body = container_body(profile, host_path, self.memory_bytes);
        let container = self.docker.create_container(options, body).await?;
        Ok(container.id)
    }

    async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        log::info!("image {} not present locally, pulling", image);
        let options = Some(BollardCreateImageOptionsQuery {
            from_image: Some(image.to_string()),
            ..Default::default()
        });
        let mut pull_stream = self.docker.create_image(options, None, None);
        while let Some(progress) = pull_stream.next().await {
            progress.map_err(|e| {
                SandboxError::runtime(format!("failed to pull image {}: {}", image, e))
            })?;
        }
        Ok(())
    }

    /// Start the container and race its exit against the timeout. On
    /// timeout the caller's cleanup force-removes the container, killing
    /// the whole process tree.
    async fn run_to_completion(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        self.docker
            .start_container(container_id, None::<BollardStartContainerOptionsQuery>)
            .await
            .map_err(|e| SandboxError::runtime(format!("failed to start container: {}", e)))?;

        let mut wait_stream = self
            .docker
            .wait_container(container_id, None::<BollardWaitContainerOptionsQuery>);
        let timeout_future = tokio::time::sleep(timeout);

        let wait_outcome = tokio::select! {
            outcome = wait_stream.next() => outcome,
            _ = timeout_future => {
                log::warn!(
                    "container {} exceeded the {}s limit, killing it",
                    container_id,
                    timeout.as_secs()
                );
                return Ok(ExecutionResult::timed_out(timeout));
            }
        };

        let exit_code = match wait_outcome {
            Some(Ok(response)) => response.status_code,
            // bollard reports non-zero exits as wait errors carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(err)) => {
                return Err(SandboxError::runtime(format!(
                    "failed waiting for container: {}",
                    err
                )))
            }
            None => {
                return Err(SandboxError::runtime(
                    "container wait stream ended unexpectedly".to_string(),
                ))
            }
        };

        let (stdout, stderr) = self.collect_logs(container_id).await?;
        if exit_code == 0 {
            Ok(ExecutionResult::success(&stdout, &stderr))
        } else {
            Ok(ExecutionResult::failed(&stdout, &stderr, exit_code))
        }
    }

    /// Capture both output streams in full. Chunks are accumulated as
    /// bytes and decoded once, so multi-byte characters split across
    /// frames survive.
    async fn collect_logs(&self, container_id: &str) -> Result<(String, String), SandboxError> {
        let options = Some(BollardLogsOptionsQuery {
            stdout: true,
            stderr: true,
            ..Default::default()
        });
        let mut log_stream = self.docker.logs(container_id, options);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = log_stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                Ok(_) => {}
                Err(err) => {
                    return Err(SandboxError::runtime(format!(
                        "failed reading container logs: {}",
                        err
                    )))
                }
            }
        }
        Ok((
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    /// Force-remove the container, killing it first if still running.
    /// Used on every exit path. A failed removal can leave a live sandbox
    /// behind, notably after a timeout.
    async fn cleanup_container(&self, container_id: &str) {
        let options = Some(BollardRemoveContainerOptionsQuery {
            force: true,
            ..Default::default()
        });
        if let Err(err) = self.docker.remove_container(container_id, options).await {
            log::warn!("could not remove container {}: {}", container_id, err);
        }
    }
}

#[async_trait]
impl SandboxExecutor for DockerExecutor {
    async fn execute(
        &self,
        profile: &ExecutionProfile,
        workspace: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        self.ensure_daemon().await?;

        let host_path = workspace
            .to_str()
            .ok_or_else(|| SandboxError::workspace("workspace path is not valid UTF-8".to_string()))?;

        let container_id = self.create_container(profile, host_path).await?;
        log::debug!(
            "running {} in container {} (image {})",
            profile.language,
            container_id,
            profile.image
        );

        let result = self.run_to_completion(&container_id, timeout).await;
        self.cleanup_container(&container_id).await;
        result
    }
}

fn container_body(
    profile: &ExecutionProfile,
    host_path: &str,
    memory_bytes: i64,
) -> ContainerCreateBody {
    ContainerCreateBody {
        image: Some(profile.image.clone()),
        cmd: Some(profile.run_command.clone()),
        working_dir: Some(MOUNT_PATH.to_string()),
        host_config: Some(HostConfig {
            binds: Some(vec![format!("{}:{}:ro", host_path, MOUNT_PATH)]),
            memory: Some(memory_bytes),
            // Swap pinned to the memory limit makes the ceiling hard.
            memory_swap: Some(memory_bytes),
            network_mode: Some("none".to_string()),
            readonly_rootfs: Some(true),
            ..Default::default()
        }),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    }
}
