//! Shared fixtures for integration tests.
//!
//! `FakeSpot` answers the handful of formulas the tests use; `spawn_server`
//! runs a real [`Server`] on a loopback port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use spotbridge::graph::{AutomatonGraph, GraphAttributes};
use spotbridge::server::{ResponseRouter, Server};
use spotbridge::transport::TransportContext;
use spotbridge::{AnalysisEngine, Error, Result};

/// Formula whose handler panics.
pub const PANIC_FORMULA: &str = "panic!";

/// Formula whose handler fails with an engine error.
pub const BROKEN_FORMULA: &str = "G(a ->";

/// Formula that translates to a 4-state, 9-edge automaton.
pub const WEAK_UNTIL_FORMULA: &str = "(p1 W 0) | Gp2";

/// In-process engine with canned answers.
#[derive(Debug, Default)]
pub struct FakeSpot;

fn check(formula: &str) -> Result<()> {
    if formula == PANIC_FORMULA {
        panic!("formula exploded");
    }
    if formula == BROKEN_FORMULA {
        return Err(Error::Engine(format!("syntax error in '{formula}'")));
    }
    Ok(())
}

#[async_trait]
impl AnalysisEngine for FakeSpot {
    fn name(&self) -> &str {
        "fake-spot"
    }

    async fn mp_class(&self, formula: &str) -> Result<String> {
        check(formula)?;
        match formula {
            "G(a -> Fb)" => Ok("recurrence".to_string()),
            "Fa" => Ok("guarantee".to_string()),
            "Ga" => Ok("safety".to_string()),
            other => Err(Error::Engine(format!("no class for '{other}'"))),
        }
    }

    async fn translate(&self, formula: &str) -> Result<AutomatonGraph> {
        check(formula)?;
        if formula != WEAK_UNTIL_FORMULA {
            return Err(Error::Engine(format!("cannot translate '{formula}'")));
        }
        Ok(weak_until_automaton())
    }

    async fn contains(&self, formula1: &str, formula2: &str) -> Result<bool> {
        check(formula1)?;
        check(formula2)?;
        match (formula1, formula2) {
            (a, b) if a == b => Ok(true),
            ("Fa", "Ga") => Ok(true),
            ("Ga", "Fa") => Ok(false),
            _ => Err(Error::Engine("unknown pair".into())),
        }
    }

    async fn equiv(&self, formula1: &str, formula2: &str) -> Result<bool> {
        check(formula1)?;
        check(formula2)?;
        Ok(formula1 == formula2)
    }

    async fn rand_ltl(&self, num_ap: u32, seed: u64) -> Result<String> {
        let names: Vec<String> = (0..num_ap)
            .map(|i| char::from(b'a' + (i % 26) as u8).to_string())
            .collect();
        Ok(format!("G({}) U X{seed}", names.join(" | ")))
    }

    async fn atomic_propositions(&self, formula: &str) -> Result<Vec<String>> {
        check(formula)?;
        let mut names: Vec<String> = formula
            .chars()
            .filter(char::is_ascii_lowercase)
            .map(String::from)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn to_latex(&self, formula: &str) -> Result<String> {
        check(formula)?;
        Ok(formula.replace('G', "\\G ").replace('F', "\\F "))
    }
}

/// The automaton `FakeSpot` returns for [`WEAK_UNTIL_FORMULA`].
pub fn weak_until_automaton() -> AutomatonGraph {
    let mut attributes = GraphAttributes {
        acceptance: "Inf(0)".to_string(),
        num_acc_sets: 1,
        num_states: 4,
        ap_names: vec!["p1".to_string(), "p2".to_string()],
        formula: WEAK_UNTIL_FORMULA.to_string(),
        has_state_based_acc: true,
        ..GraphAttributes::default()
    };
    attributes.init_states.insert(0);

    let mut graph = AutomatonGraph::new(attributes);
    graph.add_node(0, false);
    graph.add_node(1, true);
    graph.add_node(2, true);
    graph.add_node(3, true);

    let edges = [
        (0, 1, "p1 & !p2"),
        (0, 2, "!p1 & p2"),
        (0, 3, "p1 & p2"),
        (1, 1, "p1"),
        (2, 2, "p2"),
        (3, 1, "p1 & !p2"),
        (3, 2, "!p1 & p2"),
        (3, 3, "p1 & p2"),
        (0, 3, "p1 & p2"),
    ];
    for (src, dst, label) in edges {
        graph
            .add_edge(src, dst, label)
            .expect("fixture edges reference existing states");
    }
    graph
}

/// A server running on its own task.
pub struct RunningServer {
    pub addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl RunningServer {
    /// Signals shutdown and waits for the accept loop to return.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = self.task.await;
    }
}

/// Starts a [`FakeSpot`] server on `addr`.
pub async fn spawn_server_on(addr: SocketAddr) -> Result<RunningServer> {
    let router = ResponseRouter::new(Arc::new(FakeSpot));
    let server = Server::bind(&TransportContext::new(), addr, router).await?;
    let addr = server.local_addr()?;

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async move {
        let _ = stopped.await;
    }));

    Ok(RunningServer {
        addr,
        stop: Some(stop),
        task,
    })
}

/// Starts a [`FakeSpot`] server on an ephemeral loopback port.
pub async fn spawn_server() -> RunningServer {
    spawn_server_on(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind loopback server")
}
