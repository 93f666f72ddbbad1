//! Client side of the bridge.
//!
//! [`SpotClient`] owns one container and one channel to the server inside
//! it. Every call is a single request/reply exchange; the `&mut self`
//! receivers keep one exchange in flight.
//!
//! # Example
//!
//! ```rust,ignore
//! use spotbridge::{ClientConfig, SpotClient};
//!
//! let mut spot = SpotClient::launch(ClientConfig::new()).await?;
//! assert_eq!(spot.mp_class("G(a -> Fb)").await?, "recurrence");
//! assert!(spot.contains("Fa", "Ga").await?);
//! let automaton = spot.translate("(p1 W 0) | Gp2").await?;
//! spot.shutdown().await;
//! ```
//!
//! # Startup
//!
//! ```text
//! allocate_port ──► provision ──► connect + spot.ping ──ok──► Running
//!                                   │      ▲
//!                                   └──────┘ retry, backoff 50ms → 1s
//!                                   │
//!                                   └── provision timeout ──► terminate, error
//! ```
//!
//! # Teardown
//!
//! [`SpotClient::shutdown`] closes the channel and kills the container.
//! Dropping the client without it still closes the socket, and the
//! container handle issues a detached kill.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, timeout_at};

use crate::constants::{
    DEFAULT_IMAGE, DEFAULT_PROVISION_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT, READINESS_INITIAL_BACKOFF,
    READINESS_MAX_BACKOFF,
};
use crate::container::{BindMount, ContainerHandle, ContainerManager, LaunchSpec};
use crate::error::{Error, Result};
use crate::graph::{self, AutomatonGraph};
use crate::port::allocate_port;
use crate::protocol::{
    FormulaPairParams, FormulaParams, NoParams, Query, RandLtlParams, RequestEnvelope,
    ResponseEnvelope, StatusCode,
};
use crate::transport::{Channel, TransportContext};

// =============================================================================
// Configuration
// =============================================================================

/// Settings for launching a containerized server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    image: String,
    port: Option<u16>,
    container_name: Option<String>,
    host: IpAddr,
    bind_mounts: Vec<BindMount>,
    server_command: Option<Vec<String>>,
    receive_timeout: Duration,
    provision_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            port: None,
            container_name: None,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bind_mounts: Vec::new(),
            server_command: None,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            provision_timeout: DEFAULT_PROVISION_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Creates a config with the default image and an allocated port.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image reference.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Uses a fixed port instead of allocating one.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Overrides the generated container name.
    #[must_use]
    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    /// Sets the host address the published port is reached on.
    #[must_use]
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// Adds a bind mount.
    #[must_use]
    pub fn with_bind_mount(mut self, mount: BindMount) -> Self {
        self.bind_mounts.push(mount);
        self
    }

    /// Replaces the server startup command.
    #[must_use]
    pub fn with_server_command(mut self, command: Vec<String>) -> Self {
        self.server_command = Some(command);
        self
    }

    /// Sets how long each call waits for its reply.
    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets how long to wait for a fresh server to answer.
    #[must_use]
    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    /// Returns the host address.
    #[must_use]
    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Returns the receive timeout.
    #[must_use]
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Returns the provisioning timeout.
    #[must_use]
    pub fn provision_timeout(&self) -> Duration {
        self.provision_timeout
    }

    /// Builds the launch spec for `port`.
    #[must_use]
    pub fn launch_spec(&self, port: u16) -> LaunchSpec {
        let mut spec = LaunchSpec::for_port(port).with_image(self.image.clone());
        if let Some(name) = &self.container_name {
            spec = spec.with_name(name.clone());
        }
        if let Some(command) = &self.server_command {
            spec = spec.with_command(command.clone());
        }
        spec.bind_mounts.clone_from(&self.bind_mounts);
        spec
    }
}

// =============================================================================
// Client
// =============================================================================

/// Connection to a Spot server, usually in a container it owns.
#[derive(Debug)]
pub struct SpotClient {
    channel: Channel,
    container: Option<ContainerHandle>,
}

impl SpotClient {
    /// Launches a server container with Docker and connects to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContainerProvisioningFailure`] if the container
    /// cannot be started or never answers. No container is left running.
    pub async fn launch(config: ClientConfig) -> Result<Self> {
        let ctx = TransportContext::new().with_receive_timeout(config.receive_timeout);
        Self::launch_with(&ContainerManager::docker(), &ctx, config).await
    }

    /// Launches a server container through `manager` and connects with `ctx`.
    ///
    /// The receive timeout comes from `ctx`; the config's receive timeout is
    /// only used by [`SpotClient::launch`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContainerProvisioningFailure`] if the container
    /// cannot be started or never answers. No container is left running.
    pub async fn launch_with(
        manager: &ContainerManager,
        ctx: &TransportContext,
        config: ClientConfig,
    ) -> Result<Self> {
        let port = match config.port {
            Some(port) => port,
            None => allocate_port()?,
        };
        let spec = config.launch_spec(port);
        let mut handle = manager.provision(&spec).await?;

        let addr = SocketAddr::new(config.host, port);
        match wait_ready(ctx, addr, config.provision_timeout).await {
            Ok(channel) => {
                handle.mark_running();
                Ok(Self {
                    channel,
                    container: Some(handle),
                })
            }
            Err(reason) => {
                tracing::warn!(container = %spec.name, reason = %reason, "server never became ready");
                handle.terminate().await;
                Err(Error::ContainerProvisioningFailure {
                    name: spec.name,
                    reason,
                })
            }
        }
    }

    /// Connects to a server that is already running. No container is owned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportConnect`] if nothing listens at `addr`.
    pub async fn attach(ctx: &TransportContext, addr: SocketAddr) -> Result<Self> {
        let channel = ctx.connect(addr).await?;
        Ok(Self {
            channel,
            container: None,
        })
    }

    /// Returns the owned container, if any.
    #[must_use]
    pub fn container(&self) -> Option<&ContainerHandle> {
        self.container.as_ref()
    }

    /// Returns the server address.
    #[must_use]
    pub fn server_addr(&self) -> SocketAddr {
        self.channel.peer_addr()
    }

    /// Sends an envelope and returns the `result` of a 200 reply.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidQuery`] on a 400 reply
    /// - [`Error::RemoteExecution`] on a 500 reply
    /// - [`Error::MalformedEnvelope`] if the reply does not decode
    /// - transport errors as they occur
    pub async fn call_raw(&mut self, envelope: &RequestEnvelope) -> Result<Value> {
        call_on(&mut self.channel, envelope).await
    }

    /// Sends a typed query and returns the `result` of a 200 reply.
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`].
    pub async fn call(&mut self, query: &Query) -> Result<Value> {
        let envelope = query.to_envelope()?;
        self.call_raw(&envelope).await
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Manna-Pnueli class of `formula`.
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`]; [`Error::UnexpectedResult`] if the
    /// result is not a string.
    pub async fn mp_class(&mut self, formula: &str) -> Result<String> {
        let query = Query::MpClass(formula_params(formula));
        let value = self.call(&query).await?;
        expect_string(query.operation(), value)
    }

    /// Büchi automaton for `formula`.
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`]; [`Error::InvalidGraph`] if the result
    /// is not a valid automaton graph.
    pub async fn translate(&mut self, formula: &str) -> Result<AutomatonGraph> {
        let value = self.call(&Query::Translate(formula_params(formula))).await?;
        graph::decode(&value)
    }

    /// True iff L(`formula2`) ⊆ L(`formula1`).
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`]; [`Error::UnexpectedResult`] if the
    /// result is not a boolean.
    pub async fn contains(&mut self, formula1: &str, formula2: &str) -> Result<bool> {
        let query = Query::Contains(pair_params(formula1, formula2));
        let value = self.call(&query).await?;
        expect_bool(query.operation(), value)
    }

    /// True iff the formulas are equivalent.
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`]; [`Error::UnexpectedResult`] if the
    /// result is not a boolean.
    pub async fn equiv(&mut self, formula1: &str, formula2: &str) -> Result<bool> {
        let query = Query::Equiv(pair_params(formula1, formula2));
        let value = self.call(&query).await?;
        expect_bool(query.operation(), value)
    }

    /// Random formula over `num_ap` propositions.
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`]; [`Error::UnexpectedResult`] if the
    /// result is not a string.
    pub async fn rand_ltl(&mut self, num_ap: u32, seed: u64) -> Result<String> {
        let query = Query::RandLtl(RandLtlParams { num_ap, seed });
        let value = self.call(&query).await?;
        expect_string(query.operation(), value)
    }

    /// Atomic propositions of `formula`.
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`]; [`Error::UnexpectedResult`] if the
    /// result is not a list of strings.
    pub async fn get_ap(&mut self, formula: &str) -> Result<Vec<String>> {
        let query = Query::GetAp(formula_params(formula));
        let value = self.call(&query).await?;
        expect_strings(query.operation(), value)
    }

    /// LaTeX rendering of `formula`.
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`]; [`Error::UnexpectedResult`] if the
    /// result is not a string.
    pub async fn to_latex(&mut self, formula: &str) -> Result<String> {
        let query = Query::ToLatex(formula_params(formula));
        let value = self.call(&query).await?;
        expect_string(query.operation(), value)
    }

    /// Server version.
    ///
    /// # Errors
    ///
    /// See [`SpotClient::call_raw`].
    pub async fn ping(&mut self) -> Result<String> {
        ping_on(&mut self.channel).await
    }

    /// Closes the channel and kills the container. Never fails.
    pub async fn shutdown(mut self) {
        self.channel.close().await;
        if let Some(mut container) = self.container.take() {
            container.terminate().await;
        }
    }
}

// =============================================================================
// Exchange
// =============================================================================

async fn call_on(channel: &mut Channel, envelope: &RequestEnvelope) -> Result<Value> {
    let reply = channel.exchange(&envelope.to_bytes()?).await?;
    let response = ResponseEnvelope::from_bytes(&reply)
        .map_err(|e| Error::MalformedEnvelope(e.to_string()))?;

    match response.status {
        StatusCode::Ok => Ok(response.result),
        StatusCode::InvalidQuery => Err(Error::InvalidQuery {
            message: response.diagnostic(),
            request: response.request,
        }),
        StatusCode::ExecutionError => Err(Error::RemoteExecution {
            message: response.diagnostic(),
            request: response.request,
        }),
    }
}

async fn ping_on(channel: &mut Channel) -> Result<String> {
    let query = Query::Ping(NoParams {});
    let value = call_on(channel, &query.to_envelope()?).await?;
    expect_string(query.operation(), value)
}

/// Connects and pings until the server answers or `limit` elapses.
async fn wait_ready(
    ctx: &TransportContext,
    addr: SocketAddr,
    limit: Duration,
) -> std::result::Result<Channel, String> {
    let deadline = Instant::now() + limit;
    let mut backoff = READINESS_INITIAL_BACKOFF;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let last_error = match timeout_at(deadline, probe(ctx, addr)).await {
            Ok(Ok((channel, version))) => {
                tracing::debug!(addr = %addr, attempts, version = %version, "server answered");
                return Ok(channel);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "probe interrupted by deadline".to_string(),
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(format!(
                "server at {addr} did not answer within {limit:?} ({attempts} attempts, last error: {last_error})"
            ));
        }

        tracing::debug!(addr = %addr, attempts, error = %last_error, "server not ready");
        tokio::time::sleep(backoff.min(deadline - now)).await;
        backoff = (backoff * 2).min(READINESS_MAX_BACKOFF);
    }
}

async fn probe(ctx: &TransportContext, addr: SocketAddr) -> Result<(Channel, String)> {
    let mut channel = ctx.connect(addr).await?;
    match ping_on(&mut channel).await {
        Ok(version) => Ok((channel, version)),
        Err(e) => {
            channel.close().await;
            Err(e)
        }
    }
}

// =============================================================================
// Result Coercion
// =============================================================================

fn formula_params(formula: &str) -> FormulaParams {
    FormulaParams {
        formula: formula.to_string(),
    }
}

fn pair_params(formula1: &str, formula2: &str) -> FormulaPairParams {
    FormulaPairParams {
        formula1: formula1.to_string(),
        formula2: formula2.to_string(),
    }
}

fn unexpected(operation: &str, expected: &str, value: &Value) -> Error {
    Error::UnexpectedResult {
        operation: operation.to_string(),
        reason: format!("expected {expected}, got {value}"),
    }
}

fn expect_string(operation: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(unexpected(operation, "a string", &other)),
    }
}

fn expect_bool(operation: &str, value: Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(unexpected(operation, "a boolean", &other)),
    }
}

fn expect_strings(operation: &str, value: Value) -> Result<Vec<String>> {
    let Value::Array(items) = value else {
        return Err(unexpected(operation, "a list of strings", &value));
    };
    items
        .into_iter()
        .map(|item| expect_string(operation, item))
        .collect()
}
