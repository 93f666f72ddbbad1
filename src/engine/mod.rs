//! # Analysis Engine
//!
//! The server answers every query through an [`AnalysisEngine`]. The bridge
//! treats formulas as opaque strings; parsing, classification, and
//! translation all happen behind this trait.
//!
//! ## Implementations
//!
//! | Engine | Backing | Notes |
//! |--------|---------|-------|
//! | [`SpotCli`] | Spot command-line tools | Default in the server image |
//!
//! Tests substitute an in-process engine with canned answers.

pub mod hoa;
pub mod spot_cli;

pub use spot_cli::SpotCli;

use async_trait::async_trait;

use crate::error::Result;
use crate::graph::AutomatonGraph;

/// Formula and automaton operations the server exposes.
///
/// Each method maps to one query name in [`crate::protocol::Query`].
/// Errors become 500 replies; their display text is the diagnostic.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Returns the engine name for logs.
    fn name(&self) -> &str;

    /// Manna-Pnueli class of `formula`, e.g. `"recurrence"`.
    async fn mp_class(&self, formula: &str) -> Result<String>;

    /// State-based Büchi automaton recognizing `formula`.
    async fn translate(&self, formula: &str) -> Result<AutomatonGraph>;

    /// True iff L(`formula2`) ⊆ L(`formula1`).
    async fn contains(&self, formula1: &str, formula2: &str) -> Result<bool>;

    /// True iff both formulas denote the same language.
    async fn equiv(&self, formula1: &str, formula2: &str) -> Result<bool>;

    /// Random simplified formula over `num_ap` propositions named `a`, `b`, ...
    async fn rand_ltl(&self, num_ap: u32, seed: u64) -> Result<String>;

    /// Atomic propositions occurring in `formula`.
    async fn atomic_propositions(&self, formula: &str) -> Result<Vec<String>>;

    /// LaTeX rendering of `formula`.
    async fn to_latex(&self, formula: &str) -> Result<String>;
}
