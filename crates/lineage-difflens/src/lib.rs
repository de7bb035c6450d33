//! Diff parsing, line alignment and snippet comparison.
//!
//! Produces zero-context unified diffs of two snippet versions, indexes every diff
//! line, aligns removed and added lines within each hunk and across hunks
//! (crossmatch), classifies every matched pair and reports the resulting metrics.

pub mod compare;
pub mod matcher;
pub mod parser;

pub use compare::{
    align_diff, check_eligibility, compare_snippets, is_direct_successor, is_horizontal,
    is_vertical, unchanged_lines, AccountingMismatch, AccountingStage, ComparisonMetrics, ComparisonResult,
    DiffAlignment, LineBreakdown,
};
pub use matcher::{HunkAlignment, LineMatcher, MatchedPair};
pub use parser::{unified_diff, IndexedDiff};
