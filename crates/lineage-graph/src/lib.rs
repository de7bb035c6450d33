//! Evolution graphs of rewritten snippets.
//!
//! Folds direct-successor comparisons into a directed multigraph per lineage
//! (petgraph), where each node is a distinct line text and each edge records how a
//! line changed from one version to the next. Graphs merge without mutating their
//! inputs, so batch comparisons can run in parallel (rayon) and fold afterwards.

pub mod build;
pub mod graph;
pub mod lineage;

pub use build::graph_increment;
pub use graph::{
    EvolutionGraph, GraphEdge, GraphNode, GraphSummary, LineSummary, Transition, TransitionCount,
};
pub use lineage::{
    candidate_pairs, evolve, Evolution, LineageKey, LineageReport, SkippedComparison,
};
