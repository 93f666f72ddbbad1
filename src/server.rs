//! Server side of the bridge.
//!
//! [`ResponseRouter`] turns one request frame into one [`ResponseEnvelope`];
//! [`Server`] owns the listener and feeds frames from one peer at a time
//! through the router.
//!
//! # Routing
//!
//! ```text
//! frame ──► JSON? ──no──► 400 "malformed request"
//!             │
//!             ▼
//!     envelope with "query"? ──no──► 400 "malformed request"
//!             │
//!             ▼
//!     known query + params? ──no──► 400 "<name> functionality is not supported."
//!             │                        or "invalid parameters for <name>: ..."
//!             ▼
//!     engine (own task) ──Err / panic──► 500 <diagnostic>
//!             │
//!             ▼
//!            200 <result>
//! ```
//!
//! Every reply echoes the request value exactly as it was parsed. A failing
//! or panicking handler never takes the loop down.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinError;

use crate::constants::ACCEPT_RETRY_DELAY;
use crate::engine::AnalysisEngine;
use crate::error::{Error, Result};
use crate::graph::{WireShape, encode};
use crate::protocol::{Query, RequestEnvelope, ResponseEnvelope};
use crate::transport::{Channel, Listener, TransportContext};

// =============================================================================
// Response Router
// =============================================================================

/// Maps request frames to replies through an [`AnalysisEngine`].
#[derive(Clone)]
pub struct ResponseRouter {
    engine: Arc<dyn AnalysisEngine>,
    graph_shape: WireShape,
}

impl ResponseRouter {
    /// Creates a router that encodes graphs in the record shape.
    #[must_use]
    pub fn new(engine: Arc<dyn AnalysisEngine>) -> Self {
        Self {
            engine,
            graph_shape: WireShape::Records,
        }
    }

    /// Sets the wire shape used for automaton results.
    #[must_use]
    pub fn with_graph_shape(mut self, shape: WireShape) -> Self {
        self.graph_shape = shape;
        self
    }

    /// Returns the wire shape used for automaton results.
    #[must_use]
    pub fn graph_shape(&self) -> WireShape {
        self.graph_shape
    }

    /// Answers one request frame. Never fails: every problem becomes a
    /// 400 or 500 reply.
    pub async fn respond(&self, frame: &[u8]) -> ResponseEnvelope {
        let request: Value = match serde_json::from_slice(frame) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "request is not JSON");
                return ResponseEnvelope::invalid_query(
                    Value::Null,
                    format!("malformed request: {e}"),
                );
            }
        };

        let envelope: RequestEnvelope = match serde_json::from_value(request.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "request is not an envelope");
                return ResponseEnvelope::invalid_query(request, format!("malformed request: {e}"));
            }
        };

        let query = match Query::from_envelope(&envelope) {
            Ok(query) => query,
            Err(rejection) => {
                tracing::info!(query = %envelope.query, reason = %rejection, "query rejected");
                return ResponseEnvelope::invalid_query(request, rejection.to_string());
            }
        };

        let operation = query.operation();
        let engine = Arc::clone(&self.engine);
        let shape = self.graph_shape;
        let handler = tokio::spawn(async move { dispatch(engine.as_ref(), query, shape).await });

        match handler.await {
            Ok(Ok(result)) => {
                tracing::debug!(query = operation, "query handled");
                ResponseEnvelope::ok(request, result)
            }
            Ok(Err(e)) => {
                tracing::warn!(query = operation, error = %e, "query failed");
                ResponseEnvelope::execution_error(request, e.to_string())
            }
            Err(join) => {
                let message = join_failure(join);
                tracing::warn!(query = operation, error = %message, "query handler aborted");
                ResponseEnvelope::execution_error(request, message)
            }
        }
    }
}

impl std::fmt::Debug for ResponseRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseRouter")
            .field("engine", &self.engine.name())
            .field("graph_shape", &self.graph_shape)
            .finish()
    }
}

async fn dispatch(engine: &dyn AnalysisEngine, query: Query, shape: WireShape) -> Result<Value> {
    let result = match query {
        Query::MpClass(p) => Value::String(engine.mp_class(&p.formula).await?),
        Query::Translate(p) => encode(&engine.translate(&p.formula).await?, shape),
        Query::Contains(p) => Value::Bool(engine.contains(&p.formula1, &p.formula2).await?),
        Query::Equiv(p) => Value::Bool(engine.equiv(&p.formula1, &p.formula2).await?),
        Query::RandLtl(p) => Value::String(engine.rand_ltl(p.num_ap, p.seed).await?),
        Query::GetAp(p) => Value::from(engine.atomic_propositions(&p.formula).await?),
        Query::ToLatex(p) => Value::String(engine.to_latex(&p.formula).await?),
        Query::Ping(_) => Value::String(env!("CARGO_PKG_VERSION").to_string()),
    };
    Ok(result)
}

fn join_failure(join: JoinError) -> String {
    if join.is_panic() {
        format!("handler panicked: {}", panic_message(join.into_panic().as_ref()))
    } else {
        "handler was cancelled".to_string()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// Server
// =============================================================================

/// Accept loop serving one peer at a time.
#[derive(Debug)]
pub struct Server {
    listener: Listener,
    router: ResponseRouter,
}

impl Server {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address is unavailable.
    pub async fn bind(
        ctx: &TransportContext,
        addr: SocketAddr,
        router: ResponseRouter,
    ) -> Result<Self> {
        let listener = ctx.bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "server listening");
        Ok(Self { listener, router })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns the router.
    #[must_use]
    pub fn router(&self) -> &ResponseRouter {
        &self.router
    }

    /// Serves requests from one peer, in order, until it disconnects.
    ///
    /// # Errors
    ///
    /// Returns transport errors other than a clean disconnect.
    pub async fn serve_connection(&self, channel: &mut Channel) -> Result<()> {
        let peer = channel.peer_addr();
        loop {
            let frame = match channel.receive().await {
                Ok(frame) => frame,
                Err(Error::ChannelClosed) => {
                    tracing::debug!(peer = %peer, "peer disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let response = self.router.respond(&frame).await;
            tracing::debug!(peer = %peer, status = %response.status, "sending reply");
            channel.send(&response.to_bytes()).await?;
        }
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// A peer's transport error ends that peer's session only.
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and retried after
    /// [`ACCEPT_RETRY_DELAY`].
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let mut channel = match accepted {
                        Ok(channel) => channel,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to accept connection");
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                            continue;
                        }
                    };

                    let peer = channel.peer_addr();
                    tracing::info!(peer = %peer, "client connected");

                    let stop = tokio::select! {
                        () = &mut shutdown => true,
                        result = self.serve_connection(&mut channel) => {
                            if let Err(e) = result {
                                tracing::warn!(peer = %peer, error = %e, "session ended with error");
                            }
                            false
                        }
                    };
                    channel.close().await;

                    if stop {
                        tracing::info!("shutdown requested");
                        return Ok(());
                    }
                    tracing::info!(peer = %peer, "client disconnected");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(static_str.as_ref()), "boom");

        let owned: Box<dyn Any + Send> = Box::new(String::from("formula exploded"));
        assert_eq!(panic_message(owned.as_ref()), "formula exploded");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
