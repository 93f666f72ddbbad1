//! In-memory automaton graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Graph-level attributes of a translated automaton.
///
/// Field names on the wire follow the camelCase names used by the server.
/// Missing fields decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphAttributes {
    /// Acceptance condition, e.g. `Inf(0)`.
    pub acceptance: String,
    /// Number of acceptance sets used by the condition.
    pub num_acc_sets: u32,
    /// Number of states as reported by the engine.
    pub num_states: u32,
    /// Initial state ids.
    pub init_states: BTreeSet<u32>,
    /// Atomic proposition names, in engine order.
    pub ap_names: Vec<String>,
    /// Formula the automaton was built from.
    pub formula: String,
    /// Whether the automaton is deterministic.
    pub is_deterministic: bool,
    /// Whether the automaton is terminal.
    pub is_terminal: bool,
    /// Whether acceptance is state-based.
    pub has_state_based_acc: bool,
}

/// A state of the automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateNode {
    /// State id, unique within the graph.
    pub id: u32,
    /// Whether the state is accepting.
    #[serde(rename = "isAcc")]
    pub is_accepting: bool,
}

/// A labelled transition. Parallel transitions are allowed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Transition {
    /// Source state id.
    #[serde(rename = "srcId")]
    pub src: u32,
    /// Destination state id.
    #[serde(rename = "dstId")]
    pub dst: u32,
    /// Boolean condition over atomic propositions.
    pub label: String,
}

/// Directed multigraph with acceptance metadata.
///
/// Equality is structural: node and edge order do not matter, but parallel
/// edges are counted.
#[derive(Debug, Clone, Default)]
pub struct AutomatonGraph {
    /// Graph-level attributes.
    pub attributes: GraphAttributes,
    nodes: BTreeMap<u32, StateNode>,
    edges: Vec<Transition>,
}

impl AutomatonGraph {
    /// Creates an empty graph with the given attributes.
    #[must_use]
    pub fn new(attributes: GraphAttributes) -> Self {
        Self {
            attributes,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a state, replacing any state with the same id.
    pub fn add_node(&mut self, id: u32, is_accepting: bool) {
        self.nodes.insert(id, StateNode { id, is_accepting });
    }

    /// Adds a transition between two existing states.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGraph`] if either endpoint is unknown.
    pub fn add_edge(&mut self, src: u32, dst: u32, label: impl Into<String>) -> Result<()> {
        for endpoint in [src, dst] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(Error::InvalidGraph(format!(
                    "edge {src} -> {dst} references unknown state {endpoint}"
                )));
            }
        }
        self.edges.push(Transition {
            src,
            dst,
            label: label.into(),
        });
        Ok(())
    }

    /// Returns the state with the given id.
    #[must_use]
    pub fn node(&self, id: u32) -> Option<&StateNode> {
        self.nodes.get(&id)
    }

    /// Iterates states in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &StateNode> {
        self.nodes.values()
    }

    /// Iterates transitions in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Transition> {
        self.edges.iter()
    }

    /// Iterates the transitions leaving `id`.
    pub fn out_edges(&self, id: u32) -> impl Iterator<Item = &Transition> {
        self.edges.iter().filter(move |e| e.src == id)
    }

    /// Returns the number of states.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of transitions, counting parallel ones.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the ids of accepting states.
    pub fn accepting_states(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes.values().filter(|n| n.is_accepting).map(|n| n.id)
    }

    /// Checks the graph invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGraph`] if an initial state or an edge
    /// endpoint does not name an existing state.
    pub fn validate(&self) -> Result<()> {
        if let Some(missing) = self
            .attributes
            .init_states
            .iter()
            .find(|id| !self.nodes.contains_key(*id))
        {
            return Err(Error::InvalidGraph(format!(
                "initial state {missing} is not a state of the graph"
            )));
        }
        if let Some(edge) = self
            .edges
            .iter()
            .find(|e| !self.nodes.contains_key(&e.src) || !self.nodes.contains_key(&e.dst))
        {
            return Err(Error::InvalidGraph(format!(
                "edge {} -> {} references an unknown state",
                edge.src, edge.dst
            )));
        }
        Ok(())
    }

    fn sorted_edges(&self) -> Vec<&Transition> {
        let mut edges: Vec<&Transition> = self.edges.iter().collect();
        edges.sort();
        edges
    }
}

impl PartialEq for AutomatonGraph {
    fn eq(&self, other: &Self) -> bool {
        self.attributes == other.attributes
            && self.nodes == other.nodes
            && self.sorted_edges() == other.sorted_edges()
    }
}

impl Eq for AutomatonGraph {}
