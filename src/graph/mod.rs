//! # Automaton Graphs
//!
//! The one artifact the bridge hands to its callers: a directed multigraph
//! with acceptance metadata, as produced by translating a formula.
//!
//! - [`model`]: the in-memory [`AutomatonGraph`]
//! - [`codec`]: the two JSON wire shapes and the decoder that accepts both
//!
//! ## Invariants
//!
//! - State ids are unique
//! - Every initial state is a state of the graph
//! - Every edge endpoint is a state of the graph
//!
//! Graphs built through [`AutomatonGraph::add_edge`] cannot violate the edge
//! invariant; [`codec::decode`] checks all three.

pub mod codec;
pub mod model;

pub use codec::{WireShape, decode, detect_shape, encode};
pub use model::{AutomatonGraph, GraphAttributes, StateNode, Transition};
