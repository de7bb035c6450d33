//! Line-level text helpers shared by the matcher and the classifier.
//!
//! All functions operate on a single, already trimmed diff line (sign removed).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::LineKind;

static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\*.*?\*/").expect("valid regex"));

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"//.*").expect("valid regex"));

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        [A-Za-z_]\w*                 # identifiers
        | \d+\.\d+ | \d+             # numbers (float or int)
        | \+\+ | -- | == | != | <= | >= | && | \|\|
        | [{}();=<>!+\-*/]           # single-char symbols
        ",
    )
    .expect("valid regex")
});

/// Modifier keywords dropped from code tokens before token matching.
///
/// `int x = 0;` and `private final int x = 0;` should still line up; the
/// modifiers would otherwise dominate the token ratio.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "private",
    "protected",
    "public",
    "final",
    "static",
    "abstract",
    "transient",
    "volatile",
    "synchronized",
];

/// Returns `true` if the whole line is a comment (`//`, `/*`, or a `*` continuation).
///
/// # Examples
///
/// ```
/// use lineage_core::text::is_comment_line;
///
/// assert!(is_comment_line("// explain"));
/// assert!(is_comment_line("* @param x the value"));
/// assert!(!is_comment_line("int x = 0; // trailing"));
/// ```
pub fn is_comment_line(line: &str) -> bool {
    line.starts_with('*') || line.starts_with('/')
}

/// Remove every comment from a line, returning only the trimmed code part.
///
/// A whole-line comment yields an empty string.
pub fn strip_comments(line: &str) -> String {
    if is_comment_line(line) {
        return String::new();
    }
    let without_blocks = BLOCK_COMMENT.replace_all(line, "");
    let without_line = LINE_COMMENT.replace_all(&without_blocks, "");
    without_line.trim().to_string()
}

/// Extract only the comment part of a line.
///
/// Block comments come first in source order, followed by a trailing `//` comment.
pub fn extract_comments(line: &str) -> String {
    if is_comment_line(line) {
        return line.trim().to_string();
    }
    let mut comments: Vec<&str> = BLOCK_COMMENT.find_iter(line).map(|m| m.as_str()).collect();
    if let Some(m) = LINE_COMMENT.find(line) {
        comments.push(m.as_str());
    }
    comments.join(" ").trim().to_string()
}

/// Split a Java/C-like line into identifier, number, and operator tokens.
///
/// # Examples
///
/// ```
/// use lineage_core::text::tokenize;
///
/// let tokens = tokenize("if (i <= 10) i++;");
/// assert_eq!(tokens, vec!["if", "(", "i", "<=", "10", ")", "i", "++", ";"]);
/// ```
pub fn tokenize(line: &str) -> Vec<String> {
    TOKEN
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drop tokens that appear in `stopwords`.
pub fn filter_stopwords<S: AsRef<str>>(tokens: Vec<String>, stopwords: &[S]) -> Vec<String> {
    tokens
        .into_iter()
        .filter(|tok| !stopwords.iter().any(|s| s.as_ref() == tok))
        .collect()
}

/// Coarse kind of a single line: empty, whole-line comment, or code.
pub fn line_kind(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        LineKind::Empty
    } else if is_comment_line(trimmed) {
        LineKind::Comment
    } else {
        LineKind::Code
    }
}
