//! Greedy alignment of removed and added lines.
//!
//! Removed lines are processed in ascending position. Each one collects every added
//! line scoring at least the threshold, ranks them by score (descending) and then by
//! positional distance (ascending), and binds to the first one it can take. An added
//! line that is already bound is taken over only by a strictly higher score; on an
//! equal score the earlier binding stays and the next candidate is tried. The
//! displaced removed line is not reconsidered and stays unmatched.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use lineage_core::{Classification, CodeLine, LineId, LineSign, LogContext, MatcherConfig};
use lineage_fragment::sequence::{ratio, str_ratio};
use lineage_fragment::structural_similarity;

/// Individual similarity signals of one candidate pair, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    /// Character ratio of the code parts.
    pub sequence_code: f64,
    /// Token ratio of the code parts.
    pub tokens_code: f64,
    /// Character ratio of the comment parts.
    pub sequence_comment: f64,
    /// Token ratio of the comment parts.
    pub tokens_comment: f64,
    /// Node-type ratio, `None` when either side is unparsable.
    pub structure: Option<f64>,
}

/// A scored `(removed, added)` pair considered during one matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub removed: LineId,
    pub added: LineId,
    pub score: f64,
    pub sub_scores: SubScores,
}

impl MatchCandidate {
    /// Positional distance between the two lines.
    pub fn distance(&self) -> usize {
        self.removed.distance(self.added)
    }

    /// Ranking order: higher score first, then closer lines.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.distance().cmp(&other.distance()))
    }

    /// Whether this candidate may take over an added line held by `held`.
    fn beats(&self, held: &MatchedPair) -> bool {
        self.score.total_cmp(&held.score) == Ordering::Greater
    }
}

/// A bound `removed <-> added` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPair {
    pub removed: LineId,
    pub added: LineId,
    pub score: f64,
    pub sub_scores: SubScores,
    /// Filled in after matching.
    pub classification: Option<Classification>,
}

impl From<MatchCandidate> for MatchedPair {
    fn from(c: MatchCandidate) -> Self {
        Self {
            removed: c.removed,
            added: c.added,
            score: c.score,
            sub_scores: c.sub_scores,
            classification: None,
        }
    }
}

/// Storage of bound pairs with both lookup directions kept in sync.
#[derive(Debug, Default)]
pub struct PairArena {
    slots: Vec<Option<MatchedPair>>,
    by_removed: HashMap<LineId, usize>,
    by_added: HashMap<LineId, usize>,
}

impl PairArena {
    /// Bind a candidate; both of its lines must be free.
    pub fn bind(&mut self, candidate: MatchCandidate) -> usize {
        debug_assert!(!self.by_removed.contains_key(&candidate.removed));
        debug_assert!(!self.by_added.contains_key(&candidate.added));
        let slot = self.slots.len();
        self.by_removed.insert(candidate.removed, slot);
        self.by_added.insert(candidate.added, slot);
        self.slots.push(Some(candidate.into()));
        slot
    }

    /// Remove a pair, freeing both of its lines.
    pub fn evict(&mut self, slot: usize) -> Option<MatchedPair> {
        let pair = self.slots.get_mut(slot)?.take()?;
        self.by_removed.remove(&pair.removed);
        self.by_added.remove(&pair.added);
        Some(pair)
    }

    /// Slot and pair currently holding an added line.
    pub fn holding_added(&self, added: LineId) -> Option<(usize, &MatchedPair)> {
        let slot = *self.by_added.get(&added)?;
        self.slots[slot].as_ref().map(|p| (slot, p))
    }

    pub fn is_removed_bound(&self, removed: LineId) -> bool {
        self.by_removed.contains_key(&removed)
    }

    pub fn is_added_bound(&self, added: LineId) -> bool {
        self.by_added.contains_key(&added)
    }

    pub fn len(&self) -> usize {
        self.by_removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_removed.is_empty()
    }

    /// Live pairs, ordered by removed line.
    pub fn into_pairs(self) -> Vec<MatchedPair> {
        let mut pairs: Vec<MatchedPair> = self.slots.into_iter().flatten().collect();
        pairs.sort_by_key(|p| p.removed);
        pairs
    }
}

/// Result of aligning one set of lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HunkAlignment {
    pub pairs: Vec<MatchedPair>,
    pub unmatched_removed: Vec<LineId>,
    pub unmatched_added: Vec<LineId>,
    /// Number of lines that went in.
    pub line_count: usize,
}

impl HunkAlignment {
    /// Lines accounted for: two per pair plus every unmatched line.
    pub fn accounted(&self) -> usize {
        2 * self.pairs.len() + self.unmatched_removed.len() + self.unmatched_added.len()
    }

    /// Whether the partition covers exactly the input lines.
    pub fn is_balanced(&self) -> bool {
        self.accounted() == self.line_count
    }
}

/// Scores and aligns removed/added lines.
///
/// # Examples
///
/// ```
/// use lineage_core::{CodeLine, LineId, LogContext, MatcherConfig};
/// use lineage_difflens::matcher::LineMatcher;
///
/// let config = MatcherConfig::default();
/// let lines: Vec<CodeLine> = ["-int x = compute(a, b);", "+int result = compute(a, b);"]
///     .iter()
///     .enumerate()
///     .filter_map(|(i, raw)| CodeLine::parse(LineId(i), raw, &config.stopwords))
///     .collect();
///
/// let alignment = LineMatcher::new(&config).align(&lines.iter().collect::<Vec<_>>(), &LogContext::disabled());
/// assert_eq!(alignment.pairs.len(), 1);
/// assert!(alignment.is_balanced());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LineMatcher<'a> {
    config: &'a MatcherConfig,
}

impl<'a> LineMatcher<'a> {
    pub fn new(config: &'a MatcherConfig) -> Self {
        Self { config }
    }

    /// Combined similarity of a removed and an added line.
    pub fn score(&self, removed: &CodeLine, added: &CodeLine) -> MatchCandidate {
        let weights = &self.config.weights;
        let mut sub_scores = SubScores {
            sequence_code: str_ratio(&removed.code, &added.code),
            tokens_code: ratio(&removed.code_tokens, &added.code_tokens),
            sequence_comment: str_ratio(&removed.comment, &added.comment),
            tokens_comment: ratio(&removed.comment_tokens, &added.comment_tokens),
            structure: None,
        };

        let score = if removed.code.is_empty() {
            let w = &weights.comment_only;
            w.sequence * sub_scores.sequence_comment + w.tokens * sub_scores.tokens_comment
        } else {
            sub_scores.structure = structural_similarity(&removed.code, &added.code);
            match sub_scores.structure {
                Some(structure) => {
                    let w = &weights.structural;
                    w.sequence * sub_scores.sequence_code
                        + w.tokens * sub_scores.tokens_code
                        + w.structure * structure
                        + w.comment * sub_scores.sequence_comment
                }
                None => {
                    let w = &weights.text_only;
                    w.sequence * sub_scores.sequence_code
                        + w.tokens * sub_scores.tokens_code
                        + w.comment * sub_scores.sequence_comment
                }
            }
        };

        MatchCandidate {
            removed: removed.id,
            added: added.id,
            score: score.clamp(0.0, 1.0),
            sub_scores,
        }
    }

    /// Align the removed and added lines among `lines`.
    pub fn align(&self, lines: &[&CodeLine], ctx: &LogContext) -> HunkAlignment {
        let mut removed: Vec<&CodeLine> = lines
            .iter()
            .copied()
            .filter(|l| l.sign == LineSign::Removed)
            .collect();
        let mut added: Vec<&CodeLine> = lines
            .iter()
            .copied()
            .filter(|l| l.sign == LineSign::Added)
            .collect();
        removed.sort_by_key(|l| l.id);
        added.sort_by_key(|l| l.id);

        let mut arena = PairArena::default();
        for r in &removed {
            if self.config.is_skipped(&r.text) {
                continue;
            }

            let mut candidates: Vec<MatchCandidate> = added
                .iter()
                .filter(|a| !self.config.is_skipped(&a.text))
                .map(|a| self.score(r, a))
                .filter(|c| c.score >= self.config.similarity_threshold)
                .collect();
            if candidates.is_empty() {
                tracing::trace!(parent: ctx.span(), removed = %r.id, text = %r.text, "no candidate, left for crossmatch");
                continue;
            }
            candidates.sort_by(|x, y| x.rank(y));

            let mut bound = false;
            for candidate in candidates {
                match arena.holding_added(candidate.added) {
                    None => {
                        arena.bind(candidate);
                        bound = true;
                    }
                    Some((slot, held)) if candidate.beats(held) => {
                        let previous = held.removed;
                        arena.evict(slot);
                        arena.bind(candidate);
                        tracing::debug!(
                            parent: ctx.span(),
                            added = %candidate.added,
                            evicted = %previous,
                            by = %candidate.removed,
                            score = candidate.score,
                            "evicted weaker pair"
                        );
                        bound = true;
                    }
                    Some(_) => continue,
                }
                tracing::debug!(
                    parent: ctx.span(),
                    removed = %candidate.removed,
                    added = %candidate.added,
                    score = candidate.score,
                    "bound pair"
                );
                break;
            }
            if !bound {
                tracing::trace!(parent: ctx.span(), removed = %r.id, "all candidates held by better pairs");
            }
        }

        let unmatched_removed = removed
            .iter()
            .map(|l| l.id)
            .filter(|id| !arena.is_removed_bound(*id))
            .collect();
        let unmatched_added = added
            .iter()
            .map(|l| l.id)
            .filter(|id| !arena.is_added_bound(*id))
            .collect();

        HunkAlignment {
            pairs: arena.into_pairs(),
            unmatched_removed,
            unmatched_added,
            line_count: removed.len() + added.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str], config: &MatcherConfig) -> Vec<CodeLine> {
        raw.iter()
            .enumerate()
            .filter_map(|(i, l)| CodeLine::parse(LineId(i), l, &config.stopwords))
            .collect()
    }

    fn align(raw: &[&str]) -> HunkAlignment {
        let config = MatcherConfig::default();
        let lines = lines(raw, &config);
        let refs: Vec<&CodeLine> = lines.iter().collect();
        LineMatcher::new(&config).align(&refs, &LogContext::disabled())
    }

    #[test]
    fn equal_score_keeps_earlier_binding() {
        let a = align(&["-int x = 0;", "-int x = 0;", "+int x = 0;"]);
        assert_eq!(a.pairs.len(), 1);
        assert_eq!(a.pairs[0].removed, LineId(0), "an equal score must not evict");
        assert_eq!(a.unmatched_removed, vec![LineId(1)]);
        assert!(a.is_balanced());
    }

    #[test]
    fn duplicate_lines_pair_in_order() {
        let a = align(&["-x++;", "-x++;", "+x++;", "+x++;"]);
        let pairs: Vec<_> = a.pairs.iter().map(|p| (p.removed, p.added)).collect();
        assert_eq!(pairs, vec![(LineId(0), LineId(2)), (LineId(1), LineId(3))]);
        assert!(a.unmatched_removed.is_empty());
        assert!(a.unmatched_added.is_empty());
    }

    #[test]
    fn weaker_later_line_does_not_evict() {
        let a = align(&[
            "-int x = compute(a, b);",
            "-int y = compute(a, c);",
            "+int result = compute(a, b);",
        ]);
        assert_eq!(a.pairs.len(), 1);
        assert_eq!(a.pairs[0].removed, LineId(0));
        assert_eq!(a.unmatched_removed, vec![LineId(1)]);
    }

    #[test]
    fn stronger_later_line_evicts() {
        let a = align(&["-int total = 0;", "-int count = 0;", "+int count = 1;"]);
        assert_eq!(a.pairs.len(), 1);
        assert_eq!(a.pairs[0].removed, LineId(1));
        assert_eq!(a.unmatched_removed, vec![LineId(0)]);
    }

    #[test]
    fn skip_lines_are_never_matched() {
        let a = align(&["-}", "-", "+}", "+{"]);
        assert!(a.pairs.is_empty());
        assert_eq!(a.unmatched_removed.len(), 2);
        assert_eq!(a.unmatched_added.len(), 2);
        assert!(a.is_balanced());
    }

    #[test]
    fn comment_lines_use_comment_weights() {
        let config = MatcherConfig::default();
        let ls = lines(&["-// compute the sum", "+// compute the total sum"], &config);
        let c = LineMatcher::new(&config).score(&ls[0], &ls[1]);
        assert!(c.sub_scores.structure.is_none());
        let expected = 0.5 * c.sub_scores.sequence_comment + 0.5 * c.sub_scores.tokens_comment;
        assert!((c.score - expected).abs() < 1e-12);
    }

    #[test]
    fn unparsable_lines_fall_back_to_text_weights() {
        let config = MatcherConfig::default();
        let ls = lines(&["-int = = ;", "+int = = = ;"], &config);
        let c = LineMatcher::new(&config).score(&ls[0], &ls[1]);
        assert!(c.sub_scores.structure.is_none());
        let expected = 0.4 * c.sub_scores.sequence_code
            + 0.5 * c.sub_scores.tokens_code
            + 0.1 * c.sub_scores.sequence_comment;
        assert!((c.score - expected).abs() < 1e-12);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let config = MatcherConfig::default();
        let ls = lines(
            &[
                "-int x = 0; // a",
                "-return x;",
                "-// note",
                "+int x = 0; // a",
                "+while (true) {",
                "+/* other */",
            ],
            &config,
        );
        let matcher = LineMatcher::new(&config);
        for r in ls.iter().filter(|l| l.sign == LineSign::Removed) {
            for a in ls.iter().filter(|l| l.sign == LineSign::Added) {
                let c = matcher.score(r, a);
                assert!((0.0..=1.0).contains(&c.score), "{} vs {}: {}", r.text, a.text, c.score);
            }
        }
    }

    #[test]
    fn arena_keeps_both_indexes_in_sync() {
        let mut arena = PairArena::default();
        let sub_scores = SubScores {
            sequence_code: 1.0,
            tokens_code: 1.0,
            sequence_comment: 1.0,
            tokens_comment: 1.0,
            structure: None,
        };
        let slot = arena.bind(MatchCandidate {
            removed: LineId(1),
            added: LineId(4),
            score: 0.9,
            sub_scores,
        });
        assert!(arena.is_removed_bound(LineId(1)));
        assert_eq!(arena.holding_added(LineId(4)).map(|(s, _)| s), Some(slot));
        let pair = arena.evict(slot).unwrap();
        assert_eq!(pair.added, LineId(4));
        assert!(arena.is_empty());
        assert!(arena.holding_added(LineId(4)).is_none());
        assert!(arena.evict(slot).is_none());
    }
}
