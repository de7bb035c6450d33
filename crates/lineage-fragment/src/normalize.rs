//! Turning a single, usually incomplete, line of Java into a parseable unit.
//!
//! A diff line is rarely valid Java on its own (`} else if (x) {`, `case 3:`,
//! `a && b ||`). Normalization runs in three fixed steps:
//!
//! 1. [`complete_syntax`] balances and terminates the line,
//! 2. [`wrap`] picks one [`WrapArchetype`] and embeds the line in a minimal compilation unit,
//! 3. [`normalize`] parses the unit and extracts the canonical node sequence of the
//!    embedded line only.
//!
//! A line whose wrapped unit does not parse is [`Unparsable`]. That is a value, not a
//! failure of the caller: similarity falls back to text signals and classification
//! reports a debug bucket.

use std::fmt;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tree_sitter::{Language, Parser, Tree};

use lineage_core::text;

use crate::extract::{self, AstNode, CONTROL_NODE_KINDS};

const DUMMY_CLASS: &str = "class Dummy";
const DUMMY_METHOD: &str = "void dummy()";

static CONTROL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\b(if|for|while|switch|catch|else|do|try|synchronized|return|throw)\b")
        .expect("valid regex")
});

static TYPE_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(class|interface|enum)\s+[A-Za-z_]").expect("valid regex"));

static CONSTRUCTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?:public|private|protected)?\s*     # optional visibility
        [A-Z][A-Za-z0-9_]*\s*                # capitalized name
        \([^()]*\)\s*                        # flat parameter list
        (?:\{\s*\})?                         # optional empty body
        ",
    )
    .expect("valid regex")
});

static METHOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?:public|protected|private)?\s*
        (?:static\s+)?
        (?:<[^>]+>\s+)?                      # generic parameters
        [\w.<>\[\],\s]+\s+                   # return type
        [a-zA-Z_]\w*\s*                      # name
        \(\s*[^)]*\s*\)\s*                   # parameter list
        (?:throws\s+[^{]+)?
        \{?
        ",
    )
    .expect("valid regex")
});

static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?:(?:public|protected|private|static|final|transient|volatile|synchronized)\s+)*
        [\w<>\[\],\s]+\s+                    # type
        [A-Za-z_]\w*                         # name
        \s*(?:=\s*[^;]+)?                    # optional initializer
        ;\s*$
        ",
    )
    .expect("valid regex")
});

static INCOMPLETE_ELSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\}?\s*\belse\b(\s+if\b)?\s*\(?.*\)?\s*\{?").expect("valid regex")
});

static SWITCH_CASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\}?\s*(case\s+.+:|case\s+.+->.+;|default\s*:|default\s*->.+;).*")
        .expect("valid regex")
});

static BARE_CASE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\}?\s*(case\s+.+:|default\s*:)\s*$").expect("valid regex"));

/// Returns `true` if a line (or a node kind) starts with a control-flow keyword.
///
/// # Examples
///
/// ```
/// use lineage_fragment::normalize::contains_control_keywords;
///
/// assert!(contains_control_keywords("if (x > 0) {"));
/// assert!(contains_control_keywords("while_statement"));
/// assert!(!contains_control_keywords("double d = 1.0;"));
/// assert!(!contains_control_keywords("x = iffy();"));
/// ```
pub fn contains_control_keywords(code: &str) -> bool {
    CONTROL_KEYWORD.is_match(code) || CONTROL_NODE_KINDS.iter().any(|k| code.starts_with(k))
}

/// Deterministic basic-syntax completion of a comment-free line.
///
/// Rules apply in a fixed order, each one seeing the output of the previous one:
///
/// 1. a leading `{` without a closing `}` is dropped,
/// 2. a leading `}` is dropped,
/// 3. a leading ternary `?` becomes `1 ? … : 0;`,
/// 4. a leading `:` is dropped,
/// 5. a leading `(` without a closing `)` is closed,
/// 6. a control header ending in `)` gets `{}`; else a dangling `&&`/`||` is cut and
///    terminated; else a trailing `{` is closed.
///
/// # Examples
///
/// ```
/// use lineage_fragment::normalize::complete_syntax;
///
/// assert_eq!(complete_syntax("} else if (x > 0) {"), "else if (x > 0) {}");
/// assert_eq!(complete_syntax("for (int i = 0; i < n; i++)"), "for (int i = 0; i < n; i++){}");
/// assert_eq!(complete_syntax("a > 0 &&"), "a > 0;");
/// assert_eq!(complete_syntax("? left"), "1 ? left : 0;");
/// ```
pub fn complete_syntax(code: &str) -> String {
    let mut code = code.trim().to_string();
    if code.is_empty() {
        return code;
    }

    if code.starts_with('{') && !code.ends_with('}') {
        code = code[1..].trim().to_string();
    }
    if code.starts_with('}') {
        code = code[1..].trim().to_string();
    }
    if code.starts_with('?') {
        code = format!("1 {code}");
        if !code.contains(':') {
            code.push_str(" : 0;");
        }
    }
    if code.starts_with(':') {
        code = code[1..].trim().to_string();
    }
    if code.starts_with('(') && !code.ends_with(')') {
        code.push(')');
    }

    if code.ends_with(')') && contains_control_keywords(&code) {
        code.push_str("{}");
    } else if code.ends_with("&&") || code.ends_with("||") {
        code.truncate(code.len() - 2);
        code = format!("{};", code.trim());
    } else if code.ends_with('{') {
        code.push('}');
    }

    code.trim().to_string()
}

/// Template a line is embedded in before parsing, from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapArchetype {
    /// Whole-line comment; never parsed.
    Comment,
    /// Complete class/interface/enum declaration, parsed as is.
    TypeDeclaration,
    /// Probable constructor, method, or field declaration, wrapped in a class.
    MemberDeclaration,
    /// `else` / `else if` continuation, attached to a dummy `if`.
    IncompleteElse,
    /// `case` / `default` label, wrapped in a dummy `switch`.
    SwitchCase,
    /// A `break;` outside of a loop, wrapped in a dummy `while`.
    LoneBreak,
    /// A terminated `return` statement.
    ReturnStatement,
    /// Any other terminated statement.
    SingleStatement,
    /// Nothing else matched: treated as an expression fragment.
    Fallback,
}

impl WrapArchetype {
    /// Stable tag, also used as the root type when no probe parses.
    pub fn tag(self) -> &'static str {
        match self {
            WrapArchetype::Comment => "comment",
            WrapArchetype::TypeDeclaration => "class_declaration",
            WrapArchetype::MemberDeclaration => "declaration",
            WrapArchetype::IncompleteElse => "incomplete_else",
            WrapArchetype::SwitchCase => "incomplete_switch_case",
            WrapArchetype::LoneBreak => "lonely_break",
            WrapArchetype::ReturnStatement => "return_statement",
            WrapArchetype::SingleStatement => "single_statement",
            WrapArchetype::Fallback => "expression_fragment",
        }
    }

    fn classify(code: &str) -> Self {
        if TYPE_DECLARATION.is_match(code) {
            WrapArchetype::TypeDeclaration
        } else if is_probable_declaration(code) {
            WrapArchetype::MemberDeclaration
        } else if INCOMPLETE_ELSE.is_match(code) {
            WrapArchetype::IncompleteElse
        } else if SWITCH_CASE.is_match(code) {
            WrapArchetype::SwitchCase
        } else if code.contains("break;") {
            WrapArchetype::LoneBreak
        } else if code.ends_with(';') || code.ends_with('}') {
            if code.starts_with("return") {
                WrapArchetype::ReturnStatement
            } else {
                WrapArchetype::SingleStatement
            }
        } else {
            WrapArchetype::Fallback
        }
    }
}

impl fmt::Display for WrapArchetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

fn is_probable_declaration(code: &str) -> bool {
    if contains_control_keywords(code) {
        return false;
    }
    CONSTRUCTOR.is_match(code) || METHOD.is_match(code) || FIELD.is_match(code)
}

/// A line embedded in its compilation-unit template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapped {
    /// Full source handed to the parser.
    pub source: String,
    /// Byte range of the completed line inside `source`.
    pub region: Range<usize>,
    /// Template that was used.
    pub archetype: WrapArchetype,
}

/// Complete a comment-free line and embed it in the template of its archetype.
///
/// # Examples
///
/// ```
/// use lineage_fragment::normalize::{wrap, WrapArchetype};
///
/// let wrapped = wrap("case 3:");
/// assert_eq!(wrapped.archetype, WrapArchetype::SwitchCase);
/// assert_eq!(&wrapped.source[wrapped.region.clone()], "case 3:");
/// assert!(wrapped.source.contains("switch (0)"));
/// ```
pub fn wrap(code: &str) -> Wrapped {
    let code = complete_syntax(code);
    let archetype = WrapArchetype::classify(&code);

    let (prefix, suffix) = match archetype {
        WrapArchetype::Comment | WrapArchetype::TypeDeclaration => (String::new(), String::new()),
        WrapArchetype::MemberDeclaration => (format!("{DUMMY_CLASS} {{ "), " }".to_string()),
        WrapArchetype::IncompleteElse => {
            let else_body = if code.ends_with('}') || code.ends_with(';') {
                ""
            } else {
                "{}"
            };
            (
                format!("{DUMMY_CLASS} {{ {DUMMY_METHOD} {{ if (true) {{}} "),
                format!(" {else_body} }} }}"),
            )
        }
        WrapArchetype::SwitchCase => {
            let tail = if !code.contains("->") && BARE_CASE_LABEL.is_match(&code) {
                " break;"
            } else {
                ""
            };
            (
                format!("{DUMMY_CLASS} {{ {DUMMY_METHOD} {{ switch (0) {{ "),
                format!("{tail} }} }} }}"),
            )
        }
        WrapArchetype::LoneBreak => (
            format!("{DUMMY_CLASS} {{ {DUMMY_METHOD} {{ while (true) "),
            " } }".to_string(),
        ),
        WrapArchetype::ReturnStatement | WrapArchetype::SingleStatement => (
            format!("{DUMMY_CLASS} {{ {DUMMY_METHOD} {{ "),
            " } }".to_string(),
        ),
        WrapArchetype::Fallback => (
            format!("{DUMMY_CLASS} {{ {DUMMY_METHOD} {{ Object dummy = "),
            " ; } }".to_string(),
        ),
    };

    let start = prefix.len();
    let region = start..start + code.len();
    Wrapped {
        source: format!("{prefix}{code}{suffix}"),
        region,
        archetype,
    }
}

/// A line that could not be parsed after wrapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unparsable fragment `{code}` (wrapped as {archetype})")]
pub struct Unparsable {
    /// Comment-free code part that failed.
    pub code: String,
    /// Archetype that was tried. Never retried with another one.
    pub archetype: WrapArchetype,
}

/// Canonical structural form of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFragment {
    /// Template the line was parsed with.
    pub archetype: WrapArchetype,
    /// Pre-order `(node_type, node_value)` list of the line's own nodes.
    pub nodes: Vec<AstNode>,
}

impl NormalizedFragment {
    /// Whether the line was a pure comment (nothing was parsed).
    pub fn is_comment(&self) -> bool {
        self.archetype == WrapArchetype::Comment
    }

    /// Node types only, values discarded.
    pub fn node_types(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.kind.as_str()).collect()
    }
}

/// Normalize one trimmed line into its canonical node sequence.
///
/// Comments are stripped first; a line with no code left is a comment fragment with no
/// nodes. Otherwise the line is completed, wrapped and parsed once.
///
/// # Errors
///
/// Returns [`Unparsable`] if the wrapped unit has any syntax error.
///
/// # Examples
///
/// ```
/// use lineage_fragment::normalize::{normalize, WrapArchetype};
///
/// let fragment = normalize("return x + 1; // done").unwrap();
/// assert_eq!(fragment.archetype, WrapArchetype::ReturnStatement);
/// assert_eq!(fragment.nodes[0].kind, "return_statement");
///
/// let comment = normalize("// just words").unwrap();
/// assert!(comment.is_comment());
///
/// assert!(normalize("int = = ;").is_err());
/// ```
pub fn normalize(line: &str) -> Result<NormalizedFragment, Unparsable> {
    let code = text::strip_comments(line.trim());
    if code.is_empty() {
        return Ok(NormalizedFragment {
            archetype: WrapArchetype::Comment,
            nodes: Vec::new(),
        });
    }

    let wrapped = wrap(&code);
    let Some(tree) = parse_unit(&wrapped.source) else {
        return Err(Unparsable {
            code,
            archetype: wrapped.archetype,
        });
    };

    let nodes = extract::extract_nodes(&tree, wrapped.source.as_bytes(), &wrapped.region);
    Ok(NormalizedFragment {
        archetype: wrapped.archetype,
        nodes,
    })
}

/// Parse a Java compilation unit, returning `None` on any syntax error.
pub(crate) fn parse_unit(source: &str) -> Option<Tree> {
    let language: Language = tree_sitter_java::LANGUAGE.into();
    let mut parser = Parser::new();
    parser.set_language(&language).ok()?;
    let tree = parser.parse(source, None)?;
    if tree.root_node().has_error() {
        return None;
    }
    Some(tree)
}
