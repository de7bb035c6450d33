//! Structural comparison of two lines.

use std::ops::Range;

use tree_sitter::{Node, Tree};

use lineage_core::text;

use crate::extract::node_text;
use crate::normalize::{complete_syntax, normalize, parse_unit, wrap, WrapArchetype};
use crate::sequence;

/// Templates tried by [`probe`], in order.
const PROBES: [(&str, &str); 2] = [
    ("class Probe { ", " }"),
    ("class Probe { void probe() { ", " } }"),
];

/// Similarity of the canonical node-type sequences of two code parts.
///
/// Returns `None` ("unavailable") if either side is unparsable or has no code.
///
/// # Examples
///
/// ```
/// use lineage_fragment::structural_similarity;
///
/// assert_eq!(structural_similarity("int x = 0;", "int y = 1;"), Some(1.0));
/// assert!(structural_similarity("int x = 0;", "x = 1;").unwrap() < 1.0);
/// assert_eq!(structural_similarity("int x = 0;", "// comment"), None);
/// assert_eq!(structural_similarity("int = = ;", "int x = 0;"), None);
/// ```
pub fn structural_similarity(a: &str, b: &str) -> Option<f64> {
    let a = normalize(a).ok()?;
    let b = normalize(b).ok()?;
    if a.is_comment() || b.is_comment() {
        return None;
    }
    Some(sequence::ratio(&a.node_types(), &b.node_types()))
}

/// Outcome of parsing a line in one of the probe templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Kind of the outermost node that starts the line.
    pub root_type: String,
    /// Source text of every leaf token of the line, in order.
    pub leaves: Vec<String>,
}

/// Parse a comment-free code part with the probe templates.
///
/// The raw line is tried before its completed form, each in a class body first and a
/// method body second. The first template that parses cleanly wins.
pub fn probe(code: &str) -> Option<Probe> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    let completed = complete_syntax(code);
    let mut candidates = vec![code.to_string()];
    if completed != code && !completed.is_empty() {
        candidates.push(completed);
    }

    for candidate in &candidates {
        for (prefix, suffix) in PROBES {
            let source = format!("{prefix}{candidate}{suffix}");
            let region = prefix.len()..prefix.len() + candidate.len();
            let Some(tree) = parse_unit(&source) else {
                continue;
            };
            if let Some(found) = describe(&tree, source.as_bytes(), &region) {
                return Some(found);
            }
        }
    }
    None
}

/// Coarse syntactic category of one line.
///
/// Falls back to the wrap archetype tag when no probe parses.
///
/// # Examples
///
/// ```
/// use lineage_fragment::root_type;
///
/// assert_eq!(root_type("int x = 0;"), "field_declaration");
/// assert_eq!(root_type("return 1;"), "return_statement");
/// assert_eq!(root_type("if (x > 0) {"), "if_statement");
/// assert_eq!(root_type("} else {"), "incomplete_else");
/// ```
pub fn root_type(line: &str) -> String {
    let code = text::strip_comments(line.trim());
    if code.is_empty() {
        return WrapArchetype::Comment.tag().to_string();
    }
    match probe(&code) {
        Some(found) => found.root_type,
        None => wrap(&code).archetype.tag().to_string(),
    }
}

fn describe(tree: &Tree, source: &[u8], region: &Range<usize>) -> Option<Probe> {
    let mut root_type = None;
    let mut leaves = Vec::new();
    walk(tree.root_node(), source, region, &mut root_type, &mut leaves);
    root_type.map(|root_type| Probe { root_type, leaves })
}

fn walk(
    node: Node,
    source: &[u8],
    region: &Range<usize>,
    root_type: &mut Option<String>,
    leaves: &mut Vec<String>,
) {
    let inside = region.contains(&node.start_byte());
    if inside && node.is_named() && root_type.is_none() && node.kind() != "program" {
        *root_type = Some(node.kind().to_string());
    }
    if node.child_count() == 0 {
        if inside && !node.kind().contains("comment") {
            leaves.push(node_text(&node, source));
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, region, root_type, leaves);
    }
}
