//! Batch evolution of snippet sets into per-lineage graphs.

use std::collections::BTreeMap;
use std::fmt;

use rayon::prelude::*;
use serde::Serialize;

use lineage_core::{ChangeType, LineageConfig, LineageError, LogContext, Snippet};
use lineage_difflens::{compare_snippets, ComparisonResult};

use crate::build::graph_increment;
use crate::graph::{EvolutionGraph, GraphSummary, LineSummary};

/// Identity of one lineage: a name, a variant and the prompt that rewrote it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageKey {
    pub name: String,
    pub variant: String,
    pub prompt_id: String,
}

impl LineageKey {
    /// Lineage a comparison result belongs to, taken from its newer snippet.
    pub fn of(result: &ComparisonResult) -> Self {
        Self {
            name: result.new.name.clone(),
            variant: result.new.variant.clone(),
            prompt_id: result.new.prompt_id.clone(),
        }
    }
}

impl fmt::Display for LineageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.name, self.variant, self.prompt_id)
    }
}

/// A pair that produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedComparison {
    pub old: String,
    pub new: String,
    pub reason: String,
}

/// Per-lineage view for reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageReport {
    pub lineage: LineageKey,
    pub summary: GraphSummary,
    pub lines: Vec<LineSummary>,
}

/// Everything a batch run produced.
#[derive(Debug, Default)]
pub struct Evolution {
    /// Successful comparisons, in pair order.
    pub results: Vec<ComparisonResult>,
    pub skipped: Vec<SkippedComparison>,
    pub lineages: BTreeMap<LineageKey, EvolutionGraph>,
}

impl Evolution {
    /// Change type totals over every successful comparison.
    pub fn change_types(&self) -> BTreeMap<ChangeType, usize> {
        let mut totals = BTreeMap::new();
        for result in &self.results {
            for (change, count) in &result.metrics.change_types {
                *totals.entry(*change).or_default() += count;
            }
        }
        totals
    }

    pub fn reports(&self) -> Vec<LineageReport> {
        self.lineages
            .iter()
            .map(|(key, graph)| LineageReport {
                lineage: key.clone(),
                summary: graph.summary(),
                lines: graph.lineage_summary(),
            })
            .collect()
    }
}

/// Every unordered pair of snippets sharing a name, older version first.
///
/// Snippets are ordered by variant, version and prompt id within a name, so the
/// result is the same for any input order.
pub fn candidate_pairs(snippets: &[Snippet]) -> Vec<(&Snippet, &Snippet)> {
    let mut groups: BTreeMap<&str, Vec<&Snippet>> = BTreeMap::new();
    for snippet in snippets {
        groups.entry(snippet.name.as_str()).or_default().push(snippet);
    }

    let mut pairs = Vec::new();
    for group in groups.values_mut() {
        group.sort_by(|a, b| {
            (&a.variant, a.version, &a.prompt_id).cmp(&(&b.variant, b.version, &b.prompt_id))
        });
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                if a.version <= b.version {
                    pairs.push((*a, *b));
                } else {
                    pairs.push((*b, *a));
                }
            }
        }
    }
    pairs
}

/// Compare every eligible pair in parallel and fold direct successors into graphs.
///
/// A pair that is ineligible or fails is logged and skipped; the rest of the batch
/// carries on. Graph increments are merged in pair order, so the outcome does not
/// depend on scheduling.
///
/// # Examples
///
/// ```
/// use lineage_core::{LineageConfig, LogContext, Snippet};
/// use lineage_graph::evolve;
///
/// let snippets = vec![
///     Snippet::new("Calc", "KF0", 0, "nop", "int x = 0;\nreturn x;\n"),
///     Snippet::new("Calc", "KF0", 1, "p1", "int y = 0;\nreturn y;\n"),
/// ];
/// let evolution = evolve(&snippets, &LineageConfig::default(), &LogContext::disabled());
///
/// assert_eq!(evolution.results.len(), 1);
/// assert_eq!(evolution.lineages.len(), 1);
/// ```
pub fn evolve(snippets: &[Snippet], config: &LineageConfig, ctx: &LogContext) -> Evolution {
    let pairs = candidate_pairs(snippets);
    tracing::info!(parent: ctx.span(), snippets = snippets.len(), pairs = pairs.len(), "evolving");

    let outcomes: Vec<Result<ComparisonResult, SkippedComparison>> = pairs
        .par_iter()
        .map(|(old, new)| {
            compare_snippets(old, new, config, ctx).map_err(|e| skip(old, new, &e))
        })
        .collect();

    let mut evolution = Evolution::default();
    for outcome in outcomes {
        let result = match outcome {
            Ok(result) => result,
            Err(skipped) => {
                tracing::warn!(parent: ctx.span(), old = %skipped.old, new = %skipped.new, reason = %skipped.reason, "comparison skipped");
                evolution.skipped.push(skipped);
                continue;
            }
        };

        if config.graph.enabled {
            match graph_increment(&result, ctx) {
                Ok(Some(increment)) => {
                    let key = LineageKey::of(&result);
                    let merged = match evolution.lineages.get(&key) {
                        Some(acc) => acc.merge(&increment),
                        None => increment,
                    };
                    evolution.lineages.insert(key, merged);
                }
                Ok(None) => {}
                Err(e) => {
                    let skipped = skip(&result.old, &result.new, &e);
                    tracing::warn!(parent: ctx.span(), old = %skipped.old, new = %skipped.new, reason = %skipped.reason, "comparison skipped");
                    evolution.skipped.push(skipped);
                    continue;
                }
            }
        }
        evolution.results.push(result);
    }

    tracing::info!(
        parent: ctx.span(),
        compared = evolution.results.len(),
        skipped = evolution.skipped.len(),
        lineages = evolution.lineages.len(),
        "evolution finished"
    );
    evolution
}

fn skip(old: &Snippet, new: &Snippet, error: &LineageError) -> SkippedComparison {
    SkippedComparison {
        old: old.to_string(),
        new: new.to_string(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_grouped_and_oriented() {
        let snippets = vec![
            Snippet::new("Calc", "KF0", 2, "p1", "c;"),
            Snippet::new("Sort", "KF0", 0, "nop", "s;"),
            Snippet::new("Calc", "KF0", 0, "nop", "a;"),
            Snippet::new("Calc", "KF1", 1, "p1", "b;"),
        ];
        let pairs = candidate_pairs(&snippets);
        assert_eq!(pairs.len(), 3, "Sort has no partner");
        for (old, new) in &pairs {
            assert_eq!(old.name, new.name);
            assert!(old.version <= new.version);
        }
    }

    #[test]
    fn key_comes_from_the_newer_snippet() {
        let old = Snippet::new("Calc", "KF0", 0, "nop", "int x = 0;\n");
        let new = Snippet::new("Calc", "KF0", 1, "p7", "int y = 0;\n");
        let result = compare_snippets(&old, &new, &LineageConfig::default(), &LogContext::disabled())
            .unwrap();
        let key = LineageKey::of(&result);
        assert_eq!(key.to_string(), "Calc_KF0_p7");
    }

    #[test]
    fn disabled_graph_still_compares() {
        let mut config = LineageConfig::default();
        config.graph.enabled = false;
        let snippets = vec![
            Snippet::new("Calc", "KF0", 0, "nop", "int x = 0;\n"),
            Snippet::new("Calc", "KF0", 1, "nop", "int y = 0;\n"),
        ];
        let evolution = evolve(&snippets, &config, &LogContext::disabled());
        assert_eq!(evolution.results.len(), 1);
        assert!(evolution.lineages.is_empty());
    }
}
