//! # spotbridge
//!
//! **Container-Backed RPC Bridge to the Spot Automata Library**
//!
//! This crate lets a program with no local formula/automaton engine delegate
//! queries to a throwaway container that has one. The client provisions the
//! container, talks to the server inside it over a framed JSON protocol, and
//! decodes automaton results into an in-memory graph.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────── host ────────────────────────┐      ┌──────────── container ────────────┐
//! │                                                      │      │                                   │
//! │  SpotClient ── call(Query) ──► Channel ──────────────┼─TCP──┼─► Server ──► ResponseRouter       │
//! │     │   ▲                        (length-framed JSON)│      │                    │              │
//! │     │   └── decode(graph) ◄── ResponseEnvelope ◄─────┼──────┼── 200 / 400 / 500  ▼              │
//! │     │                                                │      │              AnalysisEngine       │
//! │     ▼                                                │      │              (SpotCli: ltlfilt,   │
//! │  ContainerManager ── docker run / kill ──────────────┼──────┼─►           ltl2tgba, randltl)    │
//! │     ▲                                                │      │                                   │
//! │  allocate_port                                       │      │                                   │
//! └──────────────────────────────────────────────────────┘      └───────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! One request per frame, one reply per frame, strict alternation. See
//! [`protocol`] for the envelopes and status codes and [`graph`] for the
//! automaton wire shapes.
//!
//! # Lifecycle
//!
//! ```text
//!   launch ─► Provisioning ─► (ping ok) ─► Running ─► shutdown / drop ─► Terminated
//!                  │                                                        ▲
//!                  └──────────────── readiness timeout ─────────────────────┘
//! ```
//!
//! Cleanup is guaranteed on every exit path: explicit
//! [`SpotClient::shutdown`], a failed constructor, and `Drop`.
//!
//! # Example
//!
//! ```rust,ignore
//! use spotbridge::{ClientConfig, SpotClient};
//!
//! #[tokio::main]
//! async fn main() -> spotbridge::Result<()> {
//!     let mut spot = SpotClient::launch(ClientConfig::new()).await?;
//!
//!     println!("{}", spot.mp_class("G(a -> Fb)").await?);
//!     let automaton = spot.translate("(p1 W 0) | Gp2").await?;
//!     println!("{} states", automaton.attributes.num_states);
//!
//!     spot.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod constants;
pub mod container;
pub mod engine;
pub mod error;
pub mod graph;
pub mod port;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-exports
pub use client::{ClientConfig, SpotClient};
pub use container::{
    BindMount, ContainerBackend, ContainerHandle, ContainerManager, DockerCli, LaunchSpec,
    ProcessState,
};
pub use engine::{AnalysisEngine, SpotCli};
pub use error::{Error, Result};
pub use graph::{AutomatonGraph, GraphAttributes, StateNode, Transition, WireShape};
pub use port::allocate_port;
pub use protocol::{Query, RequestEnvelope, ResponseEnvelope, StatusCode};
pub use server::{ResponseRouter, Server};
pub use transport::{Channel, Listener, TransportContext};
