//! Length-framed TCP channels.
//!
//! # Framing
//!
//! ```text
//! ┌──────────────────────┬───────────────────────────────┐
//! │ length (u32, BE)     │ payload (length bytes, JSON)  │
//! └──────────────────────┴───────────────────────────────┘
//! ```
//!
//! One request per frame, one response per frame, strict alternation. The
//! `&mut self` receivers on [`Channel`] keep a single exchange in flight.
//!
//! # Context
//!
//! Channels and listeners are created through a [`TransportContext`], which
//! carries the timeouts and the frame limit. The context is an ordinary
//! value: construct it at startup and pass it to whatever opens channels.
//!
//! # Timeouts
//!
//! Client channels bound every [`Channel::receive`] by the context's receive
//! timeout. A reply that arrives after its request timed out is discarded by
//! the next receive, so later exchanges stay paired with their own replies.
//! Server channels block until the peer sends or disconnects.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECEIVE_TIMEOUT, MAX_FRAME_SIZE};
use crate::error::{Error, Result};

/// Size of the length prefix.
const HEADER_LEN: usize = 4;

/// Read chunk size.
const READ_CHUNK: usize = 8192;

// =============================================================================
// TransportContext
// =============================================================================

/// Shared settings for every channel a component opens.
#[derive(Debug, Clone)]
pub struct TransportContext {
    receive_timeout: Duration,
    connect_timeout: Duration,
    max_frame_size: usize,
}

impl Default for TransportContext {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl TransportContext {
    /// Creates a context with default timeouts and limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client receive timeout.
    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets the bound on a single connect attempt.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the maximum frame payload size.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Returns the client receive timeout.
    #[must_use]
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Returns the connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the maximum frame payload size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Opens a client channel to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportConnect`] if nothing is listening, or
    /// [`Error::TransportTimeout`] if the connect attempt itself stalls.
    pub async fn connect(&self, addr: SocketAddr) -> Result<Channel> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::TransportTimeout(self.connect_timeout))?
            .map_err(|e| Error::TransportConnect { addr, source: e })?;
        stream.set_nodelay(true)?;

        tracing::debug!(addr = %addr, "channel connected");
        Ok(Channel::new(
            stream,
            addr,
            Some(self.receive_timeout),
            self.max_frame_size,
        ))
    }

    /// Binds a server listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address is unavailable.
    pub async fn bind(&self, addr: SocketAddr) -> Result<Listener> {
        let inner = TcpListener::bind(addr).await.map_err(|e| Error::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        Ok(Listener {
            inner,
            max_frame_size: self.max_frame_size,
        })
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Server-side listener producing one [`Channel`] per accepted peer.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    max_frame_size: usize,
}

impl Listener {
    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Waits for the next peer.
    ///
    /// Accepted channels have no receive timeout.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if accepting fails.
    pub async fn accept(&self) -> Result<Channel> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        tracing::debug!(peer = %peer, "peer connected");
        Ok(Channel::new(stream, peer, None, self.max_frame_size))
    }
}

// =============================================================================
// Channel
// =============================================================================

/// A bidirectional framed channel to a single peer.
#[derive(Debug)]
pub struct Channel {
    /// Socket; `None` once closed.
    stream: Option<TcpStream>,
    peer: SocketAddr,
    receive_timeout: Option<Duration>,
    max_frame_size: usize,
    /// Bytes read but not yet consumed as a frame.
    buffer: Vec<u8>,
    /// Replies owed to requests that already timed out.
    abandoned: usize,
}

impl Channel {
    fn new(
        stream: TcpStream,
        peer: SocketAddr,
        receive_timeout: Option<Duration>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            stream: Some(stream),
            peer,
            receive_timeout,
            max_frame_size,
            buffer: Vec::new(),
            abandoned: 0,
        }
    }

    /// Returns the peer address.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the receive timeout, if any.
    #[must_use]
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout
    }

    /// Returns true until [`Channel::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] for oversized payloads,
    /// [`Error::ChannelClosed`] after close, or an I/O error.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let too_large = || Error::FrameTooLarge {
            size: payload.len(),
            limit: self.max_frame_size,
        };
        if payload.len() > self.max_frame_size {
            return Err(too_large());
        }
        let len = u32::try_from(payload.len()).map_err(|_| too_large())?;

        let stream = self.stream.as_mut().ok_or(Error::ChannelClosed)?;
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(payload);
        stream.write_all(&frame).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Receives one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportTimeout`] if the receive window elapses,
    /// [`Error::ChannelClosed`] if the peer disconnects, or
    /// [`Error::FrameTooLarge`] if the length prefix exceeds the limit.
    pub async fn receive(&mut self) -> Result<Vec<u8>> {
        let Some(window) = self.receive_timeout else {
            return self.read_frame().await;
        };

        let outcome = timeout(window, self.read_current()).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.abandoned += 1;
                tracing::debug!(
                    peer = %self.peer,
                    abandoned = self.abandoned,
                    "receive timed out"
                );
                Err(Error::TransportTimeout(window))
            }
        }
    }

    /// Sends a request frame and waits for its reply.
    ///
    /// # Errors
    ///
    /// See [`Channel::send`] and [`Channel::receive`].
    pub async fn exchange(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        self.send(payload).await?;
        self.receive().await
    }

    /// Closes the channel. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            tracing::debug!(peer = %self.peer, "channel closed");
        }
        self.buffer.clear();
    }

    /// Skips replies owed to timed-out requests, then reads the current one.
    async fn read_current(&mut self) -> Result<Vec<u8>> {
        while self.abandoned > 0 {
            self.read_frame().await?;
            self.abandoned -= 1;
        }
        self.read_frame().await
    }

    /// Reads one frame. Cancel-safe: partial data stays in the buffer.
    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(frame);
            }

            let stream = self.stream.as_mut().ok_or(Error::ChannelClosed)?;
            let mut chunk = [0u8; READ_CHUNK];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        peer = %self.peer,
                        pending = self.buffer.len(),
                        "peer closed mid-frame"
                    );
                }
                return Err(Error::ChannelClosed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.buffer[..HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: len,
                limit: self.max_frame_size,
            });
        }
        if self.buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }
        let frame = self.buffer[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.buffer.drain(..HEADER_LEN + len);
        Ok(Some(frame))
    }
}

// =============================================================================
// Address Resolution
// =============================================================================

/// Resolves a server bind address.
///
/// `*` is the IPv4 wildcard; anything else is an IP literal or a host name.
///
/// # Errors
///
/// Returns an I/O error if the host name does not resolve.
pub async fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr> {
    if host == "*" {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("host '{host}' did not resolve"),
            ))
        })
}
