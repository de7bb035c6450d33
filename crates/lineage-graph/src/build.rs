//! Graph increments from single comparisons.

use lineage_core::{ChangeType, LineageError, LogContext};
use lineage_difflens::ComparisonResult;

use crate::graph::EvolutionGraph;

/// Graph increment of one comparison, or `None` unless `new` directly succeeds `old`.
///
/// A comparison starting at version 0 also links every non-empty line of the old
/// snippet to ROOT. Matched pairs become change edges, deletions lead to SINK, and
/// insertions add their node.
///
/// # Errors
///
/// Returns [`LineageError::GraphContract`] when a version does not fit the graph's
/// version numbers.
///
/// # Examples
///
/// ```
/// use lineage_core::{LineageConfig, LogContext, Snippet};
/// use lineage_difflens::compare_snippets;
/// use lineage_graph::graph_increment;
///
/// let old = Snippet::new("Calc", "KF0", 0, "nop", "int x = 0;\nreturn x;\n");
/// let new = Snippet::new("Calc", "KF0", 1, "p1", "int y = 0;\nreturn x;\n");
/// let ctx = LogContext::disabled();
/// let result = compare_snippets(&old, &new, &LineageConfig::default(), &ctx).unwrap();
///
/// let graph = graph_increment(&result, &ctx).unwrap().unwrap();
/// assert_eq!(graph.original_nodes(), vec!["int x = 0;", "return x;"]);
/// assert_eq!(graph.unchanged_originals(), vec!["return x;"]);
/// ```
pub fn graph_increment(
    result: &ComparisonResult,
    ctx: &LogContext,
) -> Result<Option<EvolutionGraph>, LineageError> {
    if !result.is_direct_successor() {
        return Ok(None);
    }
    let version_from = graph_version(result.old.version)?;
    let version_to = graph_version(result.new.version)?;
    let mut graph = EvolutionGraph::new();

    if version_from == 0 {
        for line in result.old.code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            graph.add_original(line)?;
        }
    }

    for pair in &result.modifications {
        let (old, new) = (result.text(pair.removed), result.text(pair.added));
        if old.is_empty() || new.is_empty() {
            tracing::trace!(parent: ctx.span(), removed = %pair.removed, added = %pair.added, "empty pair not graphed");
            continue;
        }
        let change = pair
            .classification
            .as_ref()
            .map(|c| c.change)
            .unwrap_or(ChangeType::ValueError);
        graph.add_edge(old, new, version_from, version_to, pair.score, change)?;
    }

    for id in &result.deletions {
        if let Some(line) = result.diff.line(*id).filter(|l| !l.text.is_empty()) {
            graph.add_deletion(&line.text, version_from, version_to, line.kind())?;
        }
    }
    for id in &result.insertions {
        if let Some(line) = result.diff.line(*id).filter(|l| !l.text.is_empty()) {
            graph.add_insertion(&line.text, version_from, version_to, line.kind())?;
        }
    }

    tracing::debug!(
        parent: ctx.span(),
        old = %result.old,
        new = %result.new,
        lines = graph.line_count(),
        edges = graph.edge_count(),
        "graph increment built"
    );
    Ok(Some(graph))
}

fn graph_version(version: u32) -> Result<i32, LineageError> {
    i32::try_from(version)
        .map_err(|_| LineageError::GraphContract(format!("version {version} is out of range")))
}
