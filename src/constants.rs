//! # Bridge Constants
//!
//! Defines the timeouts, size limits, and launch defaults used on both sides
//! of the bridge. These constants are the single source of truth for values
//! that the client and the server binary must agree on.
//!
//! ## Cross-References
//!
//! - [`crate::transport`]: frame size limit and channel timeouts
//! - [`crate::container`]: container naming and launch defaults
//! - [`crate::client`]: readiness probe backoff
//! - [`crate::engine`]: subprocess timeout for the Spot tools

use std::time::Duration;

// =============================================================================
// Server Defaults
// =============================================================================

/// Port the server binds when none is given on the command line.
pub const DEFAULT_SERVER_PORT: u16 = 7159;

/// Bind address the server uses when none is given (wildcard).
pub const DEFAULT_BIND_ADDRESS: &str = "*";

/// Name of the server executable inside the container image.
pub const SERVER_BINARY: &str = "spot-server";

/// Pause after a failed `accept` before the server listens again.
///
/// Errors such as `EMFILE` persist across retries.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// Container Defaults
// =============================================================================

/// Image that ships the server binary and the Spot command-line tools.
pub const DEFAULT_IMAGE: &str = "spotbridge/spot-server:latest";

/// Prefix for generated container names; the allocated port is appended.
pub const CONTAINER_NAME_PREFIX: &str = "spotbridge.client.";

/// Maximum container name length accepted by [`crate::container::LaunchSpec`].
pub const MAX_CONTAINER_NAME_LEN: usize = 128;

/// Upper bound for `docker run -d` to return.
///
/// Covers an image pull on first use. The service itself may still be
/// starting when the command returns; readiness is probed separately.
pub const CONTAINER_LAUNCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound for `docker kill` during teardown.
pub const CONTAINER_KILL_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Transport
// =============================================================================

/// Default time a client waits for a reply before giving up on a request.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default bound on a single TCP connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum payload size of a single frame (16 MiB).
///
/// Translated automata are the largest payloads; a few thousand edges stay
/// well below this bound. Larger length prefixes are treated as corruption.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Readiness Probe
// =============================================================================

/// Total time the client waits for a freshly launched server to answer.
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(30);

/// First delay between readiness attempts.
pub const READINESS_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Cap on the delay between readiness attempts.
pub const READINESS_MAX_BACKOFF: Duration = Duration::from_secs(1);

// =============================================================================
// Analysis Engine
// =============================================================================

/// Upper bound for a single Spot tool invocation.
pub const ENGINE_TIMEOUT: Duration = Duration::from_secs(60);
