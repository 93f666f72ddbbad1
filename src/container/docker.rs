//! Docker CLI backend.
//!
//! Launches the server with:
//!
//! ```sh
//! docker run --rm -d -p PORT:PORT --name NAME [-v HOST:CONTAINER[:ro]]... IMAGE CMD...
//! ```
//!
//! and tears it down with `docker kill NAME`. `--rm` removes the container
//! once it stops, so a kill is the whole teardown.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::{ContainerBackend, LaunchSpec};
use crate::constants::{CONTAINER_KILL_TIMEOUT, CONTAINER_LAUNCH_TIMEOUT};
use crate::error::{Error, Result};

/// Drives the `docker` executable.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    launch_timeout: Duration,
    kill_timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            launch_timeout: CONTAINER_LAUNCH_TIMEOUT,
            kill_timeout: CONTAINER_KILL_TIMEOUT,
        }
    }
}

impl DockerCli {
    /// Creates a backend using `docker` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different executable (e.g. `podman`, which accepts the same
    /// arguments).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the bound on `docker run` returning.
    #[must_use]
    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    /// Builds the `run` argument list for `spec`.
    #[must_use]
    pub fn run_args(spec: &LaunchSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-d".to_string(),
            "-p".to_string(),
            format!("{port}:{port}", port = spec.port),
            "--name".to_string(),
            spec.name.clone(),
        ];
        for mount in &spec.bind_mounts {
            args.push("-v".to_string());
            args.push(mount.as_arg());
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerBackend for DockerCli {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(&self, spec: &LaunchSpec) -> Result<()> {
        let fail = |reason: String| Error::ContainerProvisioningFailure {
            name: spec.name.clone(),
            reason,
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(Self::run_args(spec))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(self.launch_timeout, cmd.output())
            .await
            .map_err(|_| {
                fail(format!(
                    "{} run did not return within {:?}",
                    self.program, self.launch_timeout
                ))
            })?
            .map_err(|e| {
                fail(format!(
                    "failed to spawn {}: {e} (is it installed?)",
                    self.program
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(fail(if stderr.is_empty() {
                format!("{} run exited with {}", self.program, output.status)
            } else {
                stderr
            }));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(container = %spec.name, id = %id, "container started");
        Ok(())
    }

    async fn kill(&self, container: &str) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["kill", container])
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(self.kill_timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{} kill {container} timed out", self.program),
                ))
            })??;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Io(std::io::Error::other(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )))
        }
    }

    fn kill_detached(&self, container: &str) {
        let spawned = std::process::Command::new(&self.program)
            .args(["kill", container])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            // Reap off-thread so the caller's drop does not block.
            Ok(mut child) => {
                std::thread::spawn(move || {
                    let _ = child.wait();
                });
            }
            Err(e) => {
                tracing::debug!(container = %container, error = %e, "detached kill failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::BindMount;

    #[test]
    fn test_run_args_publish_same_port() {
        let spec = LaunchSpec::for_port(41000).with_image("example/spot:1");
        let args = DockerCli::run_args(&spec);
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "-d",
                "-p",
                "41000:41000",
                "--name",
                "spotbridge.client.41000",
                "example/spot:1",
                "spot-server",
                "*",
                "41000",
            ]
        );
    }

    #[test]
    fn test_run_args_bind_mounts_before_image() {
        let spec = LaunchSpec::for_port(41001)
            .with_bind_mount(BindMount::new("/data", "/home/server").read_only());
        let args = DockerCli::run_args(&spec);
        let v = args.iter().position(|a| a == "-v").unwrap();
        let image = args.iter().position(|a| a == &spec.image).unwrap();
        assert_eq!(args[v + 1], "/data:/home/server:ro");
        assert!(v < image);
    }

    #[tokio::test]
    async fn test_missing_program_is_provisioning_failure() {
        let backend = DockerCli::new().with_program("spotbridge-no-such-docker");
        let err = backend.run(&LaunchSpec::for_port(41002)).await.unwrap_err();
        assert!(matches!(err, Error::ContainerProvisioningFailure { .. }));
    }

    #[tokio::test]
    async fn test_kill_with_missing_program_errors() {
        let backend = DockerCli::new().with_program("spotbridge-no-such-docker");
        assert!(backend.kill("spotbridge.client.1").await.is_err());
    }
}
