//! Comparison of two snippet versions: eligibility, alignment, classification, metrics.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use lineage_core::{
    ChangeType, LineId, LineKind, LineSign, LineageConfig, LineageError, LogContext,
    MatcherConfig, Snippet, NO_PROMPT, SYNTAX_ERROR_MARKER,
};

use crate::matcher::{LineMatcher, MatchedPair};
use crate::parser::IndexedDiff;

/// Check that two snippets may be compared, `old` being the earlier version.
///
/// # Errors
///
/// Returns [`LineageError::Ineligible`] when the snippets are identical, belong to
/// different groups, are in the wrong version order, combine incompatible prompts, or
/// either one holds the syntax-error marker instead of code.
///
/// # Examples
///
/// ```
/// use lineage_core::Snippet;
/// use lineage_difflens::check_eligibility;
///
/// let v0 = Snippet::new("Fib", "KF0", 0, "nop", "int a = 0;");
/// let v1 = Snippet::new("Fib", "KF0", 1, "p1", "int b = 0;");
/// assert!(check_eligibility(&v0, &v1).is_ok());
/// assert!(check_eligibility(&v1, &v0).is_err());
/// ```
pub fn check_eligibility(old: &Snippet, new: &Snippet) -> Result<(), LineageError> {
    let reason = if old == new {
        "identical snippets"
    } else if old.name != new.name {
        "snippets belong to different groups"
    } else if old.code.trim() == SYNTAX_ERROR_MARKER || new.code.trim() == SYNTAX_ERROR_MARKER {
        "snippet failed to generate valid code"
    } else if old.version > new.version {
        "versions are in the wrong order"
    } else if !(old.prompt_id == new.prompt_id
        || old.prompt_id == NO_PROMPT
        || new.prompt_id == NO_PROMPT)
    {
        "prompt ids cannot be combined"
    } else {
        return Ok(());
    };
    Err(LineageError::Ineligible(format!("{old} -> {new}: {reason}")))
}

/// Same variant, so one lineage.
pub fn is_horizontal(old: &Snippet, new: &Snippet) -> bool {
    old.variant == new.variant
}

/// Same iteration of different variants.
pub fn is_vertical(old: &Snippet, new: &Snippet) -> bool {
    old.version == new.version
}

/// `new` is the very next version of `old` in the same lineage.
pub fn is_direct_successor(old: &Snippet, new: &Snippet) -> bool {
    is_horizontal(old, new) && new.version == old.version + 1
}

/// Where an accounting check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountingStage {
    /// Matching inside the hunk whose header is at this position.
    Hunk(LineId),
    /// The global rematch of leftovers.
    Crossmatch,
    /// Unchanged lines derived from the old side disagree with the new side.
    Unchanged,
}

/// A partition whose counts do not add up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountingMismatch {
    pub stage: AccountingStage,
    pub expected: usize,
    pub actual: usize,
}

/// Final partition of the content lines of one diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffAlignment {
    /// Per-hunk pairs followed by crossmatch pairs.
    pub pairs: Vec<MatchedPair>,
    /// Added lines left unmatched after crossmatch.
    pub insertions: Vec<LineId>,
    /// Removed lines left unmatched after crossmatch.
    pub deletions: Vec<LineId>,
    pub mismatches: Vec<AccountingMismatch>,
}

/// Align every hunk independently, then rematch all leftovers once.
///
/// Each hunk must account for every line its header announces, and crossmatch for
/// every leftover it was given. A shortfall is logged and recorded as an
/// [`AccountingMismatch`]; alignment carries on.
pub fn align_diff(diff: &IndexedDiff, config: &MatcherConfig, ctx: &LogContext) -> DiffAlignment {
    let matcher = LineMatcher::new(config);
    let mut result = DiffAlignment::default();
    let mut leftovers = Vec::new();

    for hunk in diff.hunks() {
        let lines: Vec<_> = diff.hunk_lines(hunk).collect();
        let alignment = matcher.align(&lines, ctx);
        check_accounting(
            AccountingStage::Hunk(hunk.header_id),
            hunk.header.block_len(),
            alignment.accounted(),
            &mut result.mismatches,
            ctx,
        );
        tracing::debug!(
            parent: ctx.span(),
            hunk = %hunk.header,
            pairs = alignment.pairs.len(),
            removed_left = alignment.unmatched_removed.len(),
            added_left = alignment.unmatched_added.len(),
            "hunk aligned"
        );
        leftovers.extend(alignment.unmatched_removed);
        leftovers.extend(alignment.unmatched_added);
        result.pairs.extend(alignment.pairs);
    }

    leftovers.sort();
    let lines: Vec<_> = leftovers.iter().filter_map(|id| diff.line(*id)).collect();
    let cross = matcher.align(&lines, ctx);
    check_accounting(
        AccountingStage::Crossmatch,
        leftovers.len(),
        cross.accounted(),
        &mut result.mismatches,
        ctx,
    );
    for pair in &cross.pairs {
        tracing::debug!(parent: ctx.span(), removed = %pair.removed, added = %pair.added, score = pair.score, "crossmatch pair");
    }

    result.pairs.extend(cross.pairs);
    result.deletions = cross.unmatched_removed;
    result.insertions = cross.unmatched_added;
    result
}

fn check_accounting(
    stage: AccountingStage,
    expected: usize,
    actual: usize,
    mismatches: &mut Vec<AccountingMismatch>,
    ctx: &LogContext,
) {
    if expected == actual {
        return;
    }
    tracing::warn!(parent: ctx.span(), ?stage, expected, actual, "line accounting mismatch");
    mismatches.push(AccountingMismatch {
        stage,
        expected,
        actual,
    });
}

/// Unchanged lines, derived once from each side of the comparison.
///
/// # Errors
///
/// Returns the mismatch when either side has fewer lines than it has changed, or when
/// the two sides disagree.
///
/// # Examples
///
/// ```
/// use lineage_difflens::compare::unchanged_lines;
///
/// assert_eq!(unchanged_lines((3, 4), 1, 2, 1), Ok(1));
/// assert!(unchanged_lines((2, 5), 3, 0, 0).is_err());
/// ```
pub fn unchanged_lines(
    (old_lines, new_lines): (usize, usize),
    modifications: usize,
    insertions: usize,
    deletions: usize,
) -> Result<usize, AccountingMismatch> {
    let changed_old = modifications + deletions;
    let changed_new = modifications + insertions;
    match (
        old_lines.checked_sub(changed_old),
        new_lines.checked_sub(changed_new),
    ) {
        (Some(from_old), Some(from_new)) if from_old == from_new => Ok(from_old),
        (Some(from_old), Some(from_new)) => Err(AccountingMismatch {
            stage: AccountingStage::Unchanged,
            expected: from_old,
            actual: from_new,
        }),
        (None, _) => Err(AccountingMismatch {
            stage: AccountingStage::Unchanged,
            expected: old_lines,
            actual: changed_old,
        }),
        (Some(_), None) => Err(AccountingMismatch {
            stage: AccountingStage::Unchanged,
            expected: new_lines,
            actual: changed_new,
        }),
    }
}

/// Insertions or deletions split by line kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineBreakdown {
    pub total: usize,
    pub code: usize,
    pub comment: usize,
    pub empty: usize,
}

impl FromIterator<LineKind> for LineBreakdown {
    fn from_iter<I: IntoIterator<Item = LineKind>>(kinds: I) -> Self {
        let mut breakdown = Self::default();
        for kind in kinds {
            breakdown.total += 1;
            match kind {
                LineKind::Code => breakdown.code += 1,
                LineKind::Comment => breakdown.comment += 1,
                LineKind::Empty => breakdown.empty += 1,
            }
        }
        breakdown
    }
}

/// Summary numbers of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonMetrics {
    pub old_lines: usize,
    pub new_lines: usize,
    pub modifications: usize,
    pub insertions: LineBreakdown,
    pub deletions: LineBreakdown,
    pub unchanged: usize,
    /// Mean score of the matched pairs, two decimals; 1.0 without pairs.
    pub avg_similarity: f64,
    pub change_types: BTreeMap<ChangeType, usize>,
}

/// Everything one comparison produces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub old: Snippet,
    pub new: Snippet,
    pub diff: IndexedDiff,
    /// Matched pairs, each carrying its classification.
    pub modifications: Vec<MatchedPair>,
    pub insertions: Vec<LineId>,
    pub deletions: Vec<LineId>,
    pub metrics: ComparisonMetrics,
    /// Empty unless a partition failed to add up.
    pub mismatches: Vec<AccountingMismatch>,
}

impl ComparisonResult {
    /// Whether this comparison feeds the evolution graph.
    pub fn is_direct_successor(&self) -> bool {
        is_direct_successor(&self.old, &self.new)
    }

    /// Trimmed text of a content line, empty for unknown ids.
    pub fn text(&self, id: LineId) -> &str {
        self.diff.line(id).map(|l| l.text.as_str()).unwrap_or_default()
    }

    /// Every diff line with a marker telling what happened to it.
    ///
    /// With `details`, modified lines also name their counterpart, score and change type.
    pub fn annotated_diff(&self, details: bool) -> Vec<String> {
        let mut partner: HashMap<LineId, (&MatchedPair, LineId)> = HashMap::new();
        for pair in &self.modifications {
            partner.insert(pair.removed, (pair, pair.added));
            partner.insert(pair.added, (pair, pair.removed));
        }

        self.diff
            .lines()
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let id = LineId(i);
                let Some(line) = self.diff.line(id) else {
                    return raw.trim().to_string();
                };
                let text = raw.trim();
                if let Some((pair, other)) = partner.get(&id) {
                    if !details {
                        return format!("{text}  # --- modification");
                    }
                    let change = pair
                        .classification
                        .as_ref()
                        .map(|c| c.change.to_string())
                        .unwrap_or_default();
                    return format!(
                        "{text}  # --- modification FROM {} with ratio: {:.2}, classification: {change}",
                        self.text(*other),
                        pair.score
                    );
                }
                match line.sign {
                    LineSign::Removed if self.deletions.contains(&id) => {
                        format!("{text}  # --- deletion")
                    }
                    LineSign::Added if self.insertions.contains(&id) => {
                        format!("{text}  # --- insertion")
                    }
                    _ => text.to_string(),
                }
            })
            .collect()
    }
}

/// Diff, align and classify two versions of a snippet.
///
/// # Errors
///
/// Returns [`LineageError::Ineligible`] for pairs rejected by [`check_eligibility`], and
/// the parse errors of [`IndexedDiff::parse`].
///
/// # Examples
///
/// ```
/// use lineage_core::{ChangeType, LineageConfig, LogContext, Snippet};
/// use lineage_difflens::compare_snippets;
///
/// let old = Snippet::new("Calc", "KF0", 0, "nop", "int x = 0;\nreturn x;\n");
/// let new = Snippet::new("Calc", "KF0", 1, "nop", "int y = 0;\nreturn y;\n");
/// let result = compare_snippets(&old, &new, &LineageConfig::default(), &LogContext::disabled()).unwrap();
///
/// assert_eq!(result.metrics.modifications, 2);
/// assert_eq!(result.metrics.change_types[&ChangeType::Rename], 2);
/// assert!(result.mismatches.is_empty());
/// ```
pub fn compare_snippets(
    old: &Snippet,
    new: &Snippet,
    config: &LineageConfig,
    ctx: &LogContext,
) -> Result<ComparisonResult, LineageError> {
    check_eligibility(old, new)?;
    let ctx = ctx.scoped(&format!("{old} -> {new}"));

    let diff = IndexedDiff::from_texts(&old.code, &new.code, &config.matcher.stopwords, &ctx)?;
    let alignment = align_diff(&diff, &config.matcher, &ctx);

    let mut modifications = alignment.pairs;
    for pair in &mut modifications {
        let (Some(removed), Some(added)) = (diff.line(pair.removed), diff.line(pair.added)) else {
            continue;
        };
        let classification = lineage_fragment::classify(&removed.text, &added.text);
        tracing::trace!(
            parent: ctx.span(),
            old = %removed.text,
            new = %added.text,
            change = %classification.change,
            "classified"
        );
        pair.classification = Some(classification);
    }

    let kinds = |ids: &[LineId]| -> LineBreakdown {
        ids.iter()
            .filter_map(|id| diff.line(*id))
            .map(|l| l.kind())
            .collect()
    };
    let insertions = kinds(&alignment.insertions);
    let deletions = kinds(&alignment.deletions);

    let mut mismatches = alignment.mismatches;
    let old_lines = old.line_count();
    let new_lines = new.line_count();
    let unchanged = match unchanged_lines(
        (old_lines, new_lines),
        modifications.len(),
        insertions.total,
        deletions.total,
    ) {
        Ok(unchanged) => unchanged,
        Err(mismatch) => {
            tracing::warn!(
                parent: ctx.span(),
                expected = mismatch.expected,
                actual = mismatch.actual,
                "unchanged line counts disagree"
            );
            mismatches.push(mismatch);
            old_lines.saturating_sub(modifications.len() + deletions.total)
        }
    };

    let mut change_types = BTreeMap::new();
    for c in modifications.iter().filter_map(|p| p.classification.as_ref()) {
        *change_types.entry(c.change).or_default() += 1;
    }

    let metrics = ComparisonMetrics {
        old_lines,
        new_lines,
        modifications: modifications.len(),
        insertions,
        deletions,
        unchanged,
        avg_similarity: average_similarity(&modifications),
        change_types,
    };
    tracing::debug!(
        parent: ctx.span(),
        modifications = metrics.modifications,
        insertions = metrics.insertions.total,
        deletions = metrics.deletions.total,
        avg_similarity = metrics.avg_similarity,
        "comparison finished"
    );
    ctx.close();

    Ok(ComparisonResult {
        old: old.clone(),
        new: new.clone(),
        diff,
        modifications,
        insertions: alignment.insertions,
        deletions: alignment.deletions,
        metrics,
        mismatches,
    })
}

fn average_similarity(pairs: &[MatchedPair]) -> f64 {
    if pairs.is_empty() {
        return 1.0;
    }
    let mean = pairs.iter().map(|p| p.score).sum::<f64>() / pairs.len() as f64;
    (mean * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(version: u32, prompt: &str, code: &str) -> Snippet {
        Snippet::new("Search", "KF0", version, prompt, code)
    }

    fn compare(old: &str, new: &str) -> ComparisonResult {
        compare_snippets(
            &snippet(0, "nop", old),
            &snippet(1, "nop", new),
            &LineageConfig::default(),
            &LogContext::disabled(),
        )
        .unwrap()
    }

    #[test]
    fn eligibility_rules() {
        let base = snippet(0, "nop", "a;");
        assert!(check_eligibility(&base, &base).is_err(), "identical");

        let other_group = Snippet::new("Sort", "KF0", 1, "nop", "b;");
        assert!(check_eligibility(&base, &other_group).is_err(), "different names");

        let p1 = snippet(1, "p1", "b;");
        let p2 = snippet(2, "p2", "c;");
        assert!(check_eligibility(&base, &p1).is_ok(), "baseline combines with any prompt");
        assert!(check_eligibility(&p1, &p2).is_err(), "different prompts");
        assert!(check_eligibility(&p1, &snippet(2, "p1", "c;")).is_ok());
        assert!(check_eligibility(&p1, &snippet(2, "nop", "c;")).is_ok(), "baseline on either side");

        let broken = snippet(1, "nop", SYNTAX_ERROR_MARKER);
        assert!(check_eligibility(&base, &broken).is_err(), "syntax error marker");
    }

    #[test]
    fn pair_orientation() {
        let v0 = snippet(0, "nop", "a;");
        let v1 = snippet(1, "nop", "b;");
        let v2 = snippet(2, "nop", "c;");
        let other = Snippet::new("Search", "KF1", 1, "nop", "d;");
        assert!(is_direct_successor(&v0, &v1));
        assert!(!is_direct_successor(&v0, &v2));
        assert!(is_horizontal(&v0, &v2));
        assert!(is_vertical(&v1, &other));
        assert!(!is_direct_successor(&v0, &other));
    }

    #[test]
    fn unchanged_lines_balance() {
        let result = compare(
            "int lo = 0;\nint hi = n;\nreturn lo;\n",
            "int lo = 0;\nint high = n;\n// done\nreturn lo;\n",
        );
        let m = &result.metrics;
        assert_eq!(m.unchanged, 2);
        assert_eq!(m.modifications, 1);
        assert_eq!(m.insertions.total, 1);
        assert_eq!(m.insertions.comment, 1);
        assert!(result.mismatches.is_empty(), "{:?}", result.mismatches);
    }

    #[test]
    fn crossmatch_joins_lines_across_hunks() {
        let result = compare(
            "int total = 0;\nfoo();\nbar();\nbaz();\n",
            "foo();\nbar();\nbaz();\nint total = 1;\n",
        );
        assert_eq!(result.metrics.modifications, 1, "{:?}", result.diff.lines());
        assert_eq!(result.diff.hunks().len(), 2);
        assert!(result.insertions.is_empty());
        assert!(result.deletions.is_empty());
    }

    #[test]
    fn no_changes_means_full_similarity() {
        let result = compare("int x = 0;\n", "int x = 0;");
        assert!(result.diff.is_empty());
        assert_eq!(result.metrics.avg_similarity, 1.0);
        assert_eq!(result.metrics.unchanged, 1);
    }

    #[test]
    fn annotated_diff_marks_every_outcome() {
        let result = compare("int x = 0;\n}\n", "int y = 0;\n// note\n");
        let plain = result.annotated_diff(false);
        assert!(plain.iter().any(|l| l == "-int x = 0;  # --- modification"), "{plain:?}");
        assert!(plain.iter().any(|l| l == "-}  # --- deletion"), "{plain:?}");
        assert!(plain.iter().any(|l| l == "+// note  # --- insertion"), "{plain:?}");

        let detailed = result.annotated_diff(true);
        assert!(
            detailed
                .iter()
                .any(|l| l.starts_with("+int y = 0;  # --- modification FROM int x = 0; with ratio: ")
                    && l.ends_with("classification: Rename")),
            "{detailed:?}"
        );
    }

    #[test]
    fn unsigned_line_in_block_is_an_accounting_mismatch() {
        let ctx = LogContext::disabled();
        let lines = ["@@ -1 +1 @@", "-int a = 0;", " int a = 1;"]
            .map(String::from)
            .to_vec();
        let diff = IndexedDiff::parse(lines, &["private"], &ctx).unwrap();
        let alignment = align_diff(&diff, &MatcherConfig::default(), &ctx);

        assert_eq!(alignment.deletions, vec![LineId(1)]);
        assert_eq!(
            alignment.mismatches,
            vec![AccountingMismatch {
                stage: AccountingStage::Hunk(LineId(0)),
                expected: 2,
                actual: 1,
            }]
        );
    }

    #[test]
    fn truncated_block_is_an_accounting_mismatch() {
        let ctx = LogContext::disabled();
        let lines = ["@@ -1,2 +1 @@", "-int a = 0;", "+int b = 0;"]
            .map(String::from)
            .to_vec();
        let diff = IndexedDiff::parse(lines, &["private"], &ctx).unwrap();
        let alignment = align_diff(&diff, &MatcherConfig::default(), &ctx);

        assert_eq!(alignment.mismatches.len(), 1, "{:?}", alignment.mismatches);
        assert_eq!(alignment.mismatches[0].expected, 3);
        assert_eq!(alignment.mismatches[0].actual, 2);
    }

    #[test]
    fn consistent_diff_has_no_mismatch() {
        let result = compare("int a = 0;\nfoo();\n", "int b = 0;\nfoo();\nbar();\n");
        assert!(result.mismatches.is_empty(), "{:?}", result.mismatches);
    }

    #[test]
    fn unchanged_lines_detects_disagreement() {
        assert_eq!(unchanged_lines((4, 4), 1, 1, 1), Ok(2));

        let disagree = unchanged_lines((4, 6), 1, 1, 1).unwrap_err();
        assert_eq!(disagree.stage, AccountingStage::Unchanged);
        assert_eq!((disagree.expected, disagree.actual), (2, 4));
    }

    #[test]
    fn unchanged_lines_detects_overcounting_on_both_sides() {
        let old_side = unchanged_lines((1, 1), 2, 0, 0).unwrap_err();
        assert_eq!((old_side.expected, old_side.actual), (1, 2));

        let new_side = unchanged_lines((5, 1), 1, 3, 0).unwrap_err();
        assert_eq!((new_side.expected, new_side.actual), (1, 4));
    }

    #[test]
    fn malformed_header_fails_only_this_comparison() {
        let lines = vec!["@@ -1,x +1 @@".to_string(), "-a;".to_string()];
        let err = IndexedDiff::parse(lines, &["private"], &LogContext::disabled()).unwrap_err();
        assert!(matches!(err, LineageError::MalformedHunkHeader(_)));
    }
}
