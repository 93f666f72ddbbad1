//! Error types for the bridge.

use std::net::SocketAddr;
use std::time::Duration;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on either side of the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Container Errors
    // =========================================================================
    /// The container could not be started or never became ready.
    ///
    /// Covers a missing image, a port already in use, resource limits, an
    /// invalid name, and a server that never answered the readiness probe.
    #[error("failed to provision container '{name}': {reason}")]
    ContainerProvisioningFailure { name: String, reason: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Nothing accepted the connection at the remote address.
    #[error("failed to connect to {addr}: {source}")]
    TransportConnect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// No reply arrived within the receive window.
    #[error("no reply within {0:?}")]
    TransportTimeout(Duration),

    /// The channel was closed locally or by the peer.
    #[error("channel closed")]
    ChannelClosed,

    /// A frame exceeded the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    /// The server could not bind its listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// The server rejected the request (status 400).
    #[error("invalid query (400): {message}; request: {request}")]
    InvalidQuery {
        request: serde_json::Value,
        message: String,
    },

    /// The analysis engine failed while handling the request (status 500).
    #[error(
        "remote execution error (500): {message}; request: {request}; check that all parameters are valid, e.g. that the formula parses"
    )]
    RemoteExecution {
        request: serde_json::Value,
        message: String,
    },

    /// The reply could not be decoded as a response envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A successful reply carried a payload of the wrong shape.
    #[error("unexpected result for '{operation}': {reason}")]
    UnexpectedResult { operation: String, reason: String },

    // =========================================================================
    // Graph Errors
    // =========================================================================
    /// An automaton graph violates its invariants or has an unknown shape.
    #[error("invalid automaton graph: {0}")]
    InvalidGraph(String),

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// The analysis engine reported a failure.
    #[error("analysis engine error: {0}")]
    Engine(String),

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for failures of the channel itself rather than of a query.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportConnect { .. }
                | Self::TransportTimeout(_)
                | Self::ChannelClosed
                | Self::FrameTooLarge { .. }
        )
    }
}
