//! Tests for automaton graphs and their wire shapes.
//!
//! Validates round-trips through both shapes, the lenient node-link decoder,
//! and rejection of graphs that break their invariants.

use serde_json::json;

use spotbridge::graph::{self, AutomatonGraph, GraphAttributes, WireShape};
use spotbridge::Error;

fn sample() -> AutomatonGraph {
    let mut attributes = GraphAttributes {
        acceptance: "Inf(0)".to_string(),
        num_acc_sets: 1,
        num_states: 3,
        ap_names: vec!["a".to_string(), "b".to_string()],
        formula: "G(a -> Fb)".to_string(),
        is_deterministic: true,
        has_state_based_acc: true,
        ..GraphAttributes::default()
    };
    attributes.init_states.insert(0);

    let mut g = AutomatonGraph::new(attributes);
    g.add_node(0, true);
    g.add_node(1, false);
    g.add_node(2, false);
    g.add_edge(0, 0, "!a | b").unwrap();
    g.add_edge(0, 1, "a & !b").unwrap();
    g.add_edge(1, 0, "b").unwrap();
    g.add_edge(1, 1, "!b").unwrap();
    g.add_edge(1, 2, "!b").unwrap();
    g.add_edge(1, 2, "a").unwrap();
    g
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_records_round_trip() {
    let g = sample();
    let wire = graph::encode(&g, WireShape::Records);
    assert_eq!(graph::decode(&wire).unwrap(), g);
}

#[test]
fn test_node_link_round_trip() {
    let g = sample();
    let wire = graph::encode(&g, WireShape::NodeLink);
    assert_eq!(wire["directed"], json!(true));
    assert_eq!(wire["multigraph"], json!(true));
    assert_eq!(graph::decode(&wire).unwrap(), g);
}

#[test]
fn test_records_wire_names() {
    let wire = graph::encode(&sample(), WireShape::Records);

    assert_eq!(wire["graph"]["numStates"], json!(3));
    assert_eq!(wire["graph"]["numAccSets"], json!(1));
    assert_eq!(wire["graph"]["initStates"], json!([0]));
    assert_eq!(wire["graph"]["apNames"], json!(["a", "b"]));
    assert_eq!(wire["graph"]["hasStateBasedAcc"], json!(true));
    assert_eq!(wire["nodes"][0], json!({"id": 0, "isAcc": true}));
    assert_eq!(wire["edges"][0], json!({"srcId": 0, "dstId": 0, "label": "!a | b"}));
}

#[test]
fn test_edge_order_is_not_significant() {
    let wire = graph::encode(&sample(), WireShape::Records);
    let mut reversed = wire.clone();
    reversed["edges"]
        .as_array_mut()
        .unwrap()
        .reverse();
    reversed["nodes"].as_array_mut().unwrap().reverse();

    assert_eq!(graph::decode(&reversed).unwrap(), sample());
}

#[test]
fn test_parallel_edge_count_is_significant() {
    let mut g = sample();
    g.add_edge(1, 2, "a").unwrap();
    assert_ne!(g, sample());
    assert_eq!(g.edge_count(), 7);
}

// =============================================================================
// Lenient Node-Link Tests
// =============================================================================

#[test]
fn test_dot_derived_node_link() {
    // networkx read of a dot rendering: string ids and scalars, accepting
    // states drawn with two peripheries, invisible "I" node marking the start.
    let wire = json!({
        "directed": true,
        "multigraph": true,
        "graph": {"acceptance": "Inf(0)", "numAccSets": "1", "isDeterministic": "True"},
        "nodes": [
            {"id": "I", "label": "", "style": "invis"},
            {"id": "0", "label": "0", "peripheries": "2"},
            {"id": "1", "label": "1"}
        ],
        "links": [
            {"source": "I", "target": "0", "key": 0},
            {"source": "0", "target": "0", "key": 0, "label": "1"},
            {"source": "0", "target": "1", "key": 0, "label": "a"},
            {"source": "1", "target": "1", "key": 0, "label": "!a"},
            {"source": "1", "target": "1", "key": 1, "label": "b"}
        ]
    });

    let g = graph::decode(&wire).unwrap();
    assert_eq!(g.node_count(), 2);
    assert_eq!(g.edge_count(), 4);
    assert_eq!(g.attributes.num_states, 2, "falls back to the node count");
    assert_eq!(g.attributes.num_acc_sets, 1);
    assert!(g.attributes.is_deterministic);
    assert!(g.attributes.init_states.contains(&0));
    assert_eq!(g.accepting_states().collect::<Vec<_>>(), vec![0]);
    assert_eq!(g.out_edges(1).count(), 2);
}

// =============================================================================
// Invalid Graph Tests
// =============================================================================

#[test]
fn test_edge_to_missing_state_rejected() {
    let wire = json!({
        "graph": {"numStates": 1, "initStates": [0]},
        "nodes": [{"id": 0, "isAcc": false}],
        "edges": [{"srcId": 0, "dstId": 5, "label": "1"}]
    });
    assert!(matches!(graph::decode(&wire), Err(Error::InvalidGraph(_))));
}

#[test]
fn test_initial_state_must_exist() {
    let wire = json!({
        "graph": {"numStates": 1, "initStates": [3]},
        "nodes": [{"id": 0, "isAcc": false}],
        "edges": []
    });
    assert!(matches!(graph::decode(&wire), Err(Error::InvalidGraph(_))));
}

#[test]
fn test_duplicate_state_rejected() {
    let wire = json!({
        "graph": {},
        "nodes": [{"id": 0, "isAcc": false}, {"id": 0, "isAcc": true}],
        "links": []
    });
    assert!(matches!(graph::decode(&wire), Err(Error::InvalidGraph(_))));
}

#[test]
fn test_unknown_shape_rejected() {
    assert!(matches!(
        graph::decode(&json!({"nodes": []})),
        Err(Error::InvalidGraph(_))
    ));
    assert!(graph::decode(&json!("recurrence")).is_err());
}
