//! # Isolated Compute Units
//!
//! Provisioning and teardown of the throwaway container that hosts the
//! analysis server.
//!
//! ## Lifecycle
//!
//! ```text
//!   provision()          readiness probe ok           terminate() / drop
//! ─────────────► Provisioning ─────────────► Running ─────────────────────► Terminated
//!                     │                                                        ▲
//!                     └────────────── probe timeout / terminate() ─────────────┘
//! ```
//!
//! The manager never sleeps after launching. Readiness is decided by the
//! client's retry-connect probe (see [`crate::client`]), which moves the
//! handle to `Running`.
//!
//! ## Teardown
//!
//! [`ContainerHandle::terminate`] is best-effort and idempotent: a container
//! that already exited or was already removed is not an error. A handle
//! dropped while still live issues a detached kill through
//! [`ContainerBackend::kill_detached`].

pub mod docker;

pub use docker::DockerCli;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::constants::{
    CONTAINER_NAME_PREFIX, DEFAULT_IMAGE, MAX_CONTAINER_NAME_LEN, SERVER_BINARY,
};
use crate::error::{Error, Result};

// =============================================================================
// Process State
// =============================================================================

/// Lifecycle state of a container handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Launched; the server may not be accepting connections yet.
    Provisioning,
    /// The server answered the readiness probe.
    Running,
    /// Killed, or never came up.
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Running => write!(f, "running"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

// =============================================================================
// Launch Spec
// =============================================================================

/// A host directory made visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Directory on the host.
    pub host: PathBuf,
    /// Mount point inside the container.
    pub container: PathBuf,
    /// Mount read-only.
    pub read_only: bool,
}

impl BindMount {
    /// Creates a read-write bind mount.
    pub fn new(host: impl Into<PathBuf>, container: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: false,
        }
    }

    /// Marks the mount read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Returns the `-v` argument form: `host:container[:ro]`.
    #[must_use]
    pub fn as_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.host.display(), self.container.display());
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Everything needed to launch the server container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Image reference.
    pub image: String,
    /// Container name, unique per bridge instance.
    pub name: String,
    /// Port published on the host and bound by the server inside.
    pub port: u16,
    /// Extra bind mounts.
    pub bind_mounts: Vec<BindMount>,
    /// Startup command; must bind the server to `port`.
    pub command: Vec<String>,
}

impl LaunchSpec {
    /// Creates a spec with the default image, name, and command for `port`.
    #[must_use]
    pub fn for_port(port: u16) -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            name: default_container_name(port),
            port,
            bind_mounts: Vec::new(),
            command: default_server_command(port),
        }
    }

    /// Sets the image reference.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Sets the container name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a bind mount.
    #[must_use]
    pub fn with_bind_mount(mut self, mount: BindMount) -> Self {
        self.bind_mounts.push(mount);
        self
    }

    /// Replaces the startup command.
    #[must_use]
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Checks the launch parameters before anything is started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContainerProvisioningFailure`] for an invalid name,
    /// an empty image reference, or port 0.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Error::ContainerProvisioningFailure {
            name: self.name.clone(),
            reason,
        };
        validate_container_name(&self.name).map_err(fail)?;
        if self.image.trim().is_empty() {
            return Err(fail("image reference is empty".into()));
        }
        if self.port == 0 {
            return Err(fail("port 0 cannot be published".into()));
        }
        Ok(())
    }
}

/// Returns the generated container name for `port`.
#[must_use]
pub fn default_container_name(port: u16) -> String {
    format!("{CONTAINER_NAME_PREFIX}{port}")
}

/// Returns the command that starts the server on `port` on all interfaces.
#[must_use]
pub fn default_server_command(port: u16) -> Vec<String> {
    vec![SERVER_BINARY.to_string(), "*".to_string(), port.to_string()]
}

/// Validates a container name against the rules container engines enforce.
fn validate_container_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("container name cannot be empty".into());
    }
    if name.len() > MAX_CONTAINER_NAME_LEN {
        return Err(format!(
            "container name exceeds {MAX_CONTAINER_NAME_LEN} bytes"
        ));
    }
    let mut chars = name.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
        return Err("container name must start with a letter or digit".into());
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(
            "container name contains invalid characters (allowed: a-z, A-Z, 0-9, _, ., -)".into(),
        );
    }
    Ok(())
}

// =============================================================================
// Backend Trait
// =============================================================================

/// A container engine able to run and kill the server container.
///
/// # Implementations
///
/// - [`DockerCli`]: drives the `docker` executable
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Launches a detached, auto-removing container described by `spec`.
    ///
    /// Returns once the engine has accepted the container; the server inside
    /// may still be starting.
    async fn run(&self, spec: &LaunchSpec) -> Result<()>;

    /// Kills the named container.
    ///
    /// Returns an error if the engine reports a failure, including when the
    /// container is already gone. Callers treat all kill errors as benign.
    async fn kill(&self, container: &str) -> Result<()>;

    /// Starts a kill without waiting for it. Used from `Drop`.
    fn kill_detached(&self, container: &str);
}

// =============================================================================
// Container Handle
// =============================================================================

/// Exclusive handle to one launched container.
pub struct ContainerHandle {
    name: String,
    port: u16,
    state: ProcessState,
    backend: Arc<dyn ContainerBackend>,
}

impl ContainerHandle {
    /// Returns the container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the published port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Returns true once the server answered the readiness probe.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    /// Moves a provisioning handle to `Running`.
    pub(crate) fn mark_running(&mut self) {
        if self.state == ProcessState::Provisioning {
            self.state = ProcessState::Running;
            tracing::info!(container = %self.name, port = self.port, "container ready");
        }
    }

    /// Kills the container. Never fails; safe to call more than once.
    pub async fn terminate(&mut self) {
        if self.state == ProcessState::Terminated {
            return;
        }
        match self.backend.kill(&self.name).await {
            Ok(()) => tracing::info!(container = %self.name, "container terminated"),
            Err(e) => tracing::debug!(
                container = %self.name,
                error = %e,
                "kill failed, container likely already gone"
            ),
        }
        self.state = ProcessState::Terminated;
    }
}

impl fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("state", &self.state)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if self.state != ProcessState::Terminated {
            tracing::debug!(container = %self.name, "handle dropped while live, killing");
            self.backend.kill_detached(&self.name);
            self.state = ProcessState::Terminated;
        }
    }
}

// =============================================================================
// Container Manager
// =============================================================================

/// Launches server containers through a [`ContainerBackend`].
#[derive(Clone)]
pub struct ContainerManager {
    backend: Arc<dyn ContainerBackend>,
}

impl ContainerManager {
    /// Creates a manager over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn ContainerBackend>) -> Self {
        Self { backend }
    }

    /// Creates a manager that drives the `docker` executable.
    #[must_use]
    pub fn docker() -> Self {
        Self::new(Arc::new(DockerCli::new()))
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Launches a container and returns its handle in `Provisioning`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContainerProvisioningFailure`] for any launch failure.
    pub async fn provision(&self, spec: &LaunchSpec) -> Result<ContainerHandle> {
        spec.validate()?;

        tracing::info!(
            container = %spec.name,
            image = %spec.image,
            port = spec.port,
            backend = self.backend.name(),
            "provisioning container"
        );

        self.backend.run(spec).await.map_err(|e| match e {
            Error::ContainerProvisioningFailure { .. } => e,
            other => Error::ContainerProvisioningFailure {
                name: spec.name.clone(),
                reason: other.to_string(),
            },
        })?;

        Ok(ContainerHandle {
            name: spec.name.clone(),
            port: spec.port,
            state: ProcessState::Provisioning,
            backend: Arc::clone(&self.backend),
        })
    }

    /// Kills the container behind `handle`. Never fails.
    pub async fn terminate(&self, handle: &mut ContainerHandle) {
        handle.terminate().await;
    }
}

impl fmt::Debug for ContainerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerManager")
            .field("backend", &self.backend.name())
            .finish()
    }
}
