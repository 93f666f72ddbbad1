//! Wire encodings for [`AutomatonGraph`].
//!
//! Two shapes are in circulation for the same graph:
//!
//! ```text
//! Records (typed node/edge records)      NodeLink (networkx node-link data)
//! {                                      {
//!   "graph": { attributes },               "directed": true,
//!   "nodes": [{"id":0,"isAcc":true}],      "multigraph": true,
//!   "edges": [{"srcId":0,"dstId":1,        "graph": { attributes },
//!              "label":"a"}]               "nodes": [{"id":0,"isAcc":true}],
//! }                                        "links": [{"source":0,"target":1,
//!                                                     "key":0,"label":"a"}]
//!                                        }
//! ```
//!
//! [`decode`] accepts both and tells them apart by the `edges`/`links` key.
//! The node-link decoder is lenient because older servers produced it from a
//! dot rendering: ids and scalars may be strings, accepting states may be
//! marked with `peripheries = "2"`, and a non-numeric pseudo node (`"I"`)
//! points at the initial states.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::model::{AutomatonGraph, GraphAttributes, StateNode, Transition};
use crate::error::{Error, Result};

/// Wire shape produced by [`encode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireShape {
    /// Typed `nodes`/`edges` records.
    #[default]
    Records,
    /// networkx node-link data with `links`.
    NodeLink,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphRecord {
    graph: GraphAttributes,
    nodes: Vec<StateNode>,
    edges: Vec<Transition>,
}

/// Encodes a graph in the requested wire shape.
#[must_use]
pub fn encode(graph: &AutomatonGraph, shape: WireShape) -> Value {
    let nodes: Vec<StateNode> = graph.nodes().copied().collect();
    match shape {
        WireShape::Records => {
            let record = GraphRecord {
                graph: graph.attributes.clone(),
                nodes,
                edges: graph.edges().cloned().collect(),
            };
            serde_json::to_value(record).unwrap_or(Value::Null)
        }
        WireShape::NodeLink => {
            // networkx keys parallel edges 0, 1, 2, ... per (source, target).
            let mut keys: HashMap<(u32, u32), u32> = HashMap::new();
            let links: Vec<Value> = graph
                .edges()
                .map(|e| {
                    let key = keys.entry((e.src, e.dst)).or_insert(0);
                    let link = json!({
                        "source": e.src,
                        "target": e.dst,
                        "key": *key,
                        "label": e.label,
                    });
                    *key += 1;
                    link
                })
                .collect();
            json!({
                "directed": true,
                "multigraph": true,
                "graph": graph.attributes,
                "nodes": nodes,
                "links": links,
            })
        }
    }
}

/// Detects which wire shape a value uses.
#[must_use]
pub fn detect_shape(value: &Value) -> Option<WireShape> {
    let object = value.as_object()?;
    if object.contains_key("links") {
        Some(WireShape::NodeLink)
    } else if object.contains_key("edges") {
        Some(WireShape::Records)
    } else {
        None
    }
}

/// Decodes a graph from either wire shape.
///
/// # Errors
///
/// Returns [`Error::InvalidGraph`] if the shape is unknown, a field is
/// malformed, or the decoded graph violates its invariants.
pub fn decode(value: &Value) -> Result<AutomatonGraph> {
    let graph = match detect_shape(value) {
        Some(WireShape::Records) => decode_records(value)?,
        Some(WireShape::NodeLink) => decode_node_link(value)?,
        None => {
            return Err(Error::InvalidGraph(
                "expected an object with 'edges' or 'links'".into(),
            ));
        }
    };
    graph.validate()?;
    Ok(graph)
}

fn decode_records(value: &Value) -> Result<AutomatonGraph> {
    let record: GraphRecord = serde_json::from_value(value.clone())
        .map_err(|e| Error::InvalidGraph(format!("malformed record graph: {e}")))?;

    let mut graph = AutomatonGraph::new(record.graph);
    for node in record.nodes {
        if graph.node(node.id).is_some() {
            return Err(Error::InvalidGraph(format!("duplicate state id {}", node.id)));
        }
        graph.add_node(node.id, node.is_accepting);
    }
    for edge in record.edges {
        graph.add_edge(edge.src, edge.dst, edge.label)?;
    }
    Ok(graph)
}

fn decode_node_link(value: &Value) -> Result<AutomatonGraph> {
    let empty = Map::new();
    let block = value.get("graph").and_then(Value::as_object).unwrap_or(&empty);
    let mut attributes = lenient_attributes(block)?;

    let nodes = value
        .get("nodes")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidGraph("'nodes' must be an array".into()))?;
    let links = value
        .get("links")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::InvalidGraph("'links' must be an array".into()))?;

    let mut states = Vec::with_capacity(nodes.len());
    let mut pseudo: BTreeSet<String> = BTreeSet::new();
    for node in nodes {
        let raw_id = node
            .get("id")
            .ok_or_else(|| Error::InvalidGraph("node without 'id'".into()))?;
        match lenient_u32(raw_id) {
            Some(id) => {
                let accepting = node
                    .get("isAcc")
                    .and_then(lenient_bool)
                    .or_else(|| node.get("peripheries").and_then(lenient_u32).map(|p| p >= 2))
                    .unwrap_or(false);
                states.push((id, accepting));
            }
            None => {
                pseudo.insert(scalar_string(raw_id).unwrap_or_default());
            }
        }
    }

    if !block.contains_key("numStates") {
        attributes.num_states = u32::try_from(states.len()).unwrap_or(u32::MAX);
    }

    let mut graph = AutomatonGraph::new(attributes);
    for (id, accepting) in states {
        if graph.node(id).is_some() {
            return Err(Error::InvalidGraph(format!("duplicate state id {id}")));
        }
        graph.add_node(id, accepting);
    }

    for link in links {
        let source = link.get("source").ok_or_else(|| {
            Error::InvalidGraph("link without 'source'".into())
        })?;
        let target = link.get("target").ok_or_else(|| {
            Error::InvalidGraph("link without 'target'".into())
        })?;

        match (lenient_u32(source), lenient_u32(target)) {
            (Some(src), Some(dst)) => {
                let label = link.get("label").and_then(scalar_string).unwrap_or_default();
                graph.add_edge(src, dst, label)?;
            }
            (None, Some(dst)) if is_pseudo(&pseudo, source) => {
                graph.attributes.init_states.insert(dst);
            }
            _ if is_pseudo(&pseudo, source) || is_pseudo(&pseudo, target) => {}
            _ => {
                return Err(Error::InvalidGraph(format!(
                    "link {source} -> {target} references an unknown node"
                )));
            }
        }
    }

    Ok(graph)
}

fn is_pseudo(pseudo: &BTreeSet<String>, id: &Value) -> bool {
    scalar_string(id).is_some_and(|s| pseudo.contains(&s))
}

fn lenient_attributes(block: &Map<String, Value>) -> Result<GraphAttributes> {
    let u32_field = |name: &str| -> Result<u32> {
        match block.get(name) {
            None | Some(Value::Null) => Ok(0),
            Some(v) => lenient_u32(v)
                .ok_or_else(|| Error::InvalidGraph(format!("'{name}' is not a count: {v}"))),
        }
    };
    let bool_field = |name: &str| block.get(name).and_then(lenient_bool).unwrap_or(false);
    let string_field = |name: &str| block.get(name).and_then(scalar_string).unwrap_or_default();

    let init_states = match block.get("initStates") {
        None | Some(Value::Null) => BTreeSet::new(),
        Some(Value::Array(ids)) => ids
            .iter()
            .map(|v| {
                lenient_u32(v)
                    .ok_or_else(|| Error::InvalidGraph(format!("bad initial state id: {v}")))
            })
            .collect::<Result<BTreeSet<u32>>>()?,
        Some(other) => {
            return Err(Error::InvalidGraph(format!(
                "'initStates' must be an array, got {other}"
            )));
        }
    };
    let ap_names = match block.get("apNames") {
        Some(Value::Array(names)) => names.iter().filter_map(scalar_string).collect(),
        _ => Vec::new(),
    };

    Ok(GraphAttributes {
        acceptance: string_field("acceptance"),
        num_acc_sets: u32_field("numAccSets")?,
        num_states: u32_field("numStates")?,
        init_states,
        ap_names,
        formula: string_field("formula"),
        is_deterministic: bool_field("isDeterministic"),
        is_terminal: bool_field("isTerminal"),
        has_state_based_acc: bool_field("hasStateBasedAcc"),
    })
}

fn lenient_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
