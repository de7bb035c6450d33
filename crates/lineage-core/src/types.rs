use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LineageError;
use crate::text;

static SNIPPET_STEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[^_]+)_(?P<variant>[^_]+)_v(?P<version>\d+)(?:_(?P<prompt>.+))?$")
        .expect("valid regex")
});

/// Prompt id of snippets that were not produced by a rewrite prompt (the baseline).
pub const NO_PROMPT: &str = "nop";

/// Marker code stored for snippets whose generation failed to produce valid Java.
pub const SYNTAX_ERROR_MARKER: &str = "JavaSyntaxError";

/// One labeled version of a code snippet.
///
/// A lineage is the sequence of versions sharing `name`, `variant` and `prompt_id`.
///
/// # Examples
///
/// ```
/// use lineage_core::Snippet;
///
/// let snippet = Snippet::new("BinarySearch", "KF0", 0, "nop", "int x = 0;\n");
/// assert_eq!(snippet.to_string(), "BinarySearch_KF0_v0_nop");
/// assert_eq!(snippet.line_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    /// Snippet group name (e.g. `"BinarySearch"`).
    pub name: String,
    /// Variant label (e.g. `"KF0"`).
    pub variant: String,
    /// Iteration number within the lineage, starting at 0.
    pub version: u32,
    /// Rewrite prompt identifier, or [`NO_PROMPT`].
    pub prompt_id: String,
    /// Full source text.
    pub code: String,
}

impl Snippet {
    /// Create a snippet from its labels and source text.
    pub fn new(
        name: impl Into<String>,
        variant: impl Into<String>,
        version: u32,
        prompt_id: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            variant: variant.into(),
            version,
            prompt_id: prompt_id.into(),
            code: code.into(),
        }
    }

    /// Build a snippet from a file stem `<Name>_<Variant>_v<N>[_<prompt>]`.
    ///
    /// A stem without a prompt suffix is a baseline snippet ([`NO_PROMPT`]).
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::InvalidSnippetName`] if the stem does not follow the pattern.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineage_core::Snippet;
    ///
    /// let s = Snippet::from_file_stem("BinarySearch_KF0_v2_p1", "").unwrap();
    /// assert_eq!((s.variant.as_str(), s.version, s.prompt_id.as_str()), ("KF0", 2, "p1"));
    ///
    /// let base = Snippet::from_file_stem("BinarySearch_KF0_v0", "").unwrap();
    /// assert_eq!(base.prompt_id, "nop");
    /// ```
    pub fn from_file_stem(stem: &str, code: impl Into<String>) -> Result<Self, LineageError> {
        let caps = SNIPPET_STEM
            .captures(stem)
            .ok_or_else(|| LineageError::InvalidSnippetName(stem.to_string()))?;
        let version = caps["version"]
            .parse()
            .map_err(|_| LineageError::InvalidSnippetName(stem.to_string()))?;
        let prompt_id = caps
            .name("prompt")
            .map(|m| m.as_str())
            .unwrap_or(NO_PROMPT);
        Ok(Self::new(
            &caps["name"],
            &caps["variant"],
            version,
            prompt_id,
            code,
        ))
    }

    /// Read a snippet file whose stem follows [`Snippet::from_file_stem`].
    ///
    /// # Errors
    ///
    /// Returns [`LineageError::FileNotFound`], [`LineageError::Io`] or
    /// [`LineageError::InvalidSnippetName`].
    pub fn from_path(path: &Path) -> Result<Self, LineageError> {
        if !path.exists() {
            return Err(LineageError::FileNotFound(path.to_path_buf()));
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| LineageError::InvalidSnippetName(path.display().to_string()))?;
        let code = std::fs::read_to_string(path)?;
        Self::from_file_stem(stem, code)
    }

    /// Number of source lines, counted the same way the diff splits them.
    pub fn line_count(&self) -> usize {
        self.code.lines().count()
    }
}

impl fmt::Display for Snippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_v{}_{}",
            self.name, self.variant, self.version, self.prompt_id
        )
    }
}

/// Stable position of a line inside one indexed diff.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LineId(pub usize);

impl LineId {
    /// Absolute distance between two positions.
    pub fn distance(self, other: LineId) -> usize {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side of the diff a content line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSign {
    /// Prefixed with `-`.
    Removed,
    /// Prefixed with `+`.
    Added,
}

impl LineSign {
    /// Parse the sign from the first character of a diff line.
    pub fn from_prefix(line: &str) -> Option<Self> {
        match line.as_bytes().first() {
            Some(b'-') => Some(LineSign::Removed),
            Some(b'+') => Some(LineSign::Added),
            _ => None,
        }
    }
}

/// One `+`/`-` content line of a diff with its derived text views.
///
/// # Examples
///
/// ```
/// use lineage_core::{CodeLine, LineId, LineSign};
/// use lineage_core::text::DEFAULT_STOPWORDS;
///
/// let line = CodeLine::parse(LineId(3), "-    private int x = 0; // counter", DEFAULT_STOPWORDS).unwrap();
/// assert_eq!(line.sign, LineSign::Removed);
/// assert_eq!(line.text, "private int x = 0; // counter");
/// assert_eq!(line.code, "private int x = 0;");
/// assert_eq!(line.comment, "// counter");
/// assert_eq!(line.code_tokens, vec!["int", "x", "=", "0", ";"]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLine {
    /// Position in the indexed diff.
    pub id: LineId,
    /// Side of the diff.
    pub sign: LineSign,
    /// Line content without the sign, trimmed.
    pub text: String,
    /// Code part with every comment removed.
    pub code: String,
    /// Comment part only.
    pub comment: String,
    /// Tokens of the code part, stopwords removed.
    pub code_tokens: Vec<String>,
    /// Tokens of the comment part.
    pub comment_tokens: Vec<String>,
}

impl CodeLine {
    /// Build a code line from a raw diff line. Returns `None` for lines without a `+`/`-` sign.
    pub fn parse<S: AsRef<str>>(id: LineId, raw: &str, stopwords: &[S]) -> Option<Self> {
        let sign = LineSign::from_prefix(raw)?;
        let text = raw[1..].trim().to_string();
        let code = text::strip_comments(&text);
        let comment = text::extract_comments(&text);
        let code_tokens = text::filter_stopwords(text::tokenize(&code), stopwords);
        let comment_tokens = text::tokenize(&comment);
        Some(Self {
            id,
            sign,
            text,
            code,
            comment,
            code_tokens,
            comment_tokens,
        })
    }

    /// Coarse kind of this line's text.
    pub fn kind(&self) -> LineKind {
        text::line_kind(&self.text)
    }
}

/// Parsed `@@ -s1,c1 +s2,c2 @@` header.
///
/// A missing count means one line, as in every unified diff producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HunkHeader {
    /// Starting line in the old version.
    pub old_start: u32,
    /// Number of lines in the old version.
    pub old_lines: u32,
    /// Starting line in the new version.
    pub new_start: u32,
    /// Number of lines in the new version.
    pub new_lines: u32,
}

impl HunkHeader {
    /// Number of content lines owned by this header in a zero-context diff.
    pub fn block_len(&self) -> usize {
        self.old_lines as usize + self.new_lines as usize
    }
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_lines, self.new_start, self.new_lines
        )
    }
}

/// A single zero-context hunk: its header and the ids of its content lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffHunk {
    /// Position of the header line in the indexed diff.
    pub header_id: LineId,
    /// Parsed header.
    pub header: HunkHeader,
    /// Content lines (`-` and `+`) in diff order.
    pub lines: Vec<LineId>,
}

/// Empty, comment, or code line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LineKind {
    Empty,
    Comment,
    Code,
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineKind::Empty => write!(f, "Empty"),
            LineKind::Comment => write!(f, "Comment"),
            LineKind::Code => write!(f, "Code"),
        }
    }
}

/// Taxonomy label for a matched pair of lines.
///
/// # Examples
///
/// ```
/// use lineage_core::ChangeType;
///
/// assert_eq!(ChangeType::Rename.to_string(), "Rename");
/// assert!(ChangeType::ControlChange.is_semantic());
/// assert!(ChangeType::IdenticalPartialAst.is_debug());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// A declared or referenced name changed.
    Rename,
    /// Only layout or whitespace changed.
    SyntaxOnly,
    /// Only comment text changed.
    CommentChange,
    /// Modifiers or member access changed.
    AccessChange,
    /// A method invocation changed.
    CallChange,
    /// A control-flow construct changed.
    ControlChange,
    /// A literal value changed.
    LiteralChange,
    /// An operator changed.
    OperatorChange,
    /// Structural change matching no specific category.
    OtherStructuralChange,
    /// More than one category applies.
    MixedChange,
    /// Node sequences are identical although the lines differ.
    #[serde(rename = "IdenticalPartialAST")]
    IdenticalPartialAst,
    /// A fragment could not be parsed while classifying.
    ValueError,
}

impl ChangeType {
    /// All labels, in reporting order.
    pub const ALL: [ChangeType; 12] = [
        ChangeType::Rename,
        ChangeType::SyntaxOnly,
        ChangeType::CommentChange,
        ChangeType::AccessChange,
        ChangeType::CallChange,
        ChangeType::ControlChange,
        ChangeType::LiteralChange,
        ChangeType::OperatorChange,
        ChangeType::OtherStructuralChange,
        ChangeType::MixedChange,
        ChangeType::IdenticalPartialAst,
        ChangeType::ValueError,
    ];

    /// Structural subcategories that together form the "code change" sum.
    pub fn is_semantic(self) -> bool {
        matches!(
            self,
            ChangeType::AccessChange
                | ChangeType::CallChange
                | ChangeType::ControlChange
                | ChangeType::LiteralChange
                | ChangeType::OperatorChange
                | ChangeType::OtherStructuralChange
        )
    }

    /// Buckets that flag gaps in the extractor rather than real change kinds.
    pub fn is_debug(self) -> bool {
        matches!(self, ChangeType::IdenticalPartialAst | ChangeType::ValueError)
    }

    fn label(self) -> &'static str {
        match self {
            ChangeType::Rename => "Rename",
            ChangeType::SyntaxOnly => "SyntaxOnly",
            ChangeType::CommentChange => "CommentChange",
            ChangeType::AccessChange => "AccessChange",
            ChangeType::CallChange => "CallChange",
            ChangeType::ControlChange => "ControlChange",
            ChangeType::LiteralChange => "LiteralChange",
            ChangeType::OperatorChange => "OperatorChange",
            ChangeType::OtherStructuralChange => "OtherStructuralChange",
            ChangeType::MixedChange => "MixedChange",
            ChangeType::IdenticalPartialAst => "IdenticalPartialAST",
            ChangeType::ValueError => "ValueError",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeType::ALL
            .into_iter()
            .find(|ct| ct.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown change type: {s}"))
    }
}

/// Root type label used for whole-line comments.
pub const BLOCK_COMMENT: &str = "BlockComment";

/// Root type label used when only the trailing comment of a code line changed.
pub const INLINE_COMMENT: &str = "InlineComment";

/// Result of classifying one matched pair.
///
/// # Examples
///
/// ```
/// use lineage_core::{ChangeType, Classification};
///
/// let c = Classification::single("return_statement", "return_statement", ChangeType::LiteralChange);
/// assert_eq!(c.change, ChangeType::LiteralChange);
/// assert_eq!(c.subtypes[&ChangeType::LiteralChange], 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Root type of the old line.
    pub source_type: String,
    /// Root type of the new line.
    pub target_type: String,
    /// Final label.
    pub change: ChangeType,
    /// Every subtype detected, with how often it was seen.
    pub subtypes: BTreeMap<ChangeType, usize>,
}

impl Classification {
    /// A classification with exactly one subtype.
    pub fn single(
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        change: ChangeType,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            target_type: target_type.into(),
            change,
            subtypes: BTreeMap::from([(change, 1)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::DEFAULT_STOPWORDS;

    #[test]
    fn code_line_requires_sign() {
        assert!(CodeLine::parse(LineId(0), "@@ -1 +1 @@", DEFAULT_STOPWORDS).is_none());
        assert!(CodeLine::parse(LineId(0), " context", DEFAULT_STOPWORDS).is_none());
        let added = CodeLine::parse(LineId(1), "+return x;", DEFAULT_STOPWORDS).unwrap();
        assert_eq!(added.sign, LineSign::Added);
        assert_eq!(added.text, "return x;");
    }

    #[test]
    fn comment_line_has_no_code_part() {
        let line = CodeLine::parse(LineId(2), "-// old text", DEFAULT_STOPWORDS).unwrap();
        assert!(line.code.is_empty());
        assert_eq!(line.comment, "// old text");
        assert_eq!(line.kind(), LineKind::Comment);
    }

    #[test]
    fn empty_content_line_is_kept() {
        let line = CodeLine::parse(LineId(5), "+", DEFAULT_STOPWORDS).unwrap();
        assert!(line.text.is_empty());
        assert_eq!(line.kind(), LineKind::Empty);
    }

    #[test]
    fn line_id_distance_is_symmetric() {
        assert_eq!(LineId(3).distance(LineId(7)), 4);
        assert_eq!(LineId(7).distance(LineId(3)), 4);
    }

    #[test]
    fn change_type_labels_roundtrip() {
        for ct in ChangeType::ALL {
            let parsed: ChangeType = ct.to_string().parse().unwrap();
            assert_eq!(parsed, ct);
        }
        assert!("Refactor".parse::<ChangeType>().is_err());
    }

    #[test]
    fn change_type_serializes_with_report_labels() {
        let json = serde_json::to_string(&ChangeType::IdenticalPartialAst).unwrap();
        assert_eq!(json, "\"IdenticalPartialAST\"");
        let json = serde_json::to_string(&ChangeType::Rename).unwrap();
        assert_eq!(json, "\"Rename\"");
    }

    #[test]
    fn snippet_serializes_camel_case() {
        let snippet = Snippet::new("Fib", "KF1", 2, "p1", "return 1;");
        let json = serde_json::to_value(&snippet).unwrap();
        assert!(json.get("promptId").is_some());
        assert!(json.get("prompt_id").is_none());
    }

    #[test]
    fn rejects_malformed_stems() {
        for stem in ["BinarySearch", "BinarySearch_KF0", "BinarySearch_KF0_vX", "BinarySearch_KF0_2"] {
            let err = Snippet::from_file_stem(stem, "").unwrap_err();
            assert!(matches!(err, LineageError::InvalidSnippetName(_)), "{stem}");
        }
    }

    #[test]
    fn prompt_may_contain_underscores() {
        let s = Snippet::from_file_stem("Fib_KF1_v3_rename_vars", "").unwrap();
        assert_eq!(s.prompt_id, "rename_vars");
        assert_eq!(s.to_string(), "Fib_KF1_v3_rename_vars");
    }

    #[test]
    fn from_path_reports_missing_file() {
        let err = Snippet::from_path(Path::new("/nonexistent/Fib_KF1_v0.java")).unwrap_err();
        assert!(matches!(err, LineageError::FileNotFound(_)));
    }

    #[test]
    fn header_block_len() {
        let header = HunkHeader {
            old_start: 3,
            old_lines: 2,
            new_start: 3,
            new_lines: 0,
        };
        assert_eq!(header.block_len(), 2);
        assert_eq!(header.to_string(), "@@ -3,2 +3,0 @@");
    }
}
