//! Canonical `(node_type, node_value)` extraction from a parsed Java unit.
//!
//! Only nodes that start inside the embedded line's byte region are emitted, so the
//! dummy class, method and control wrappers never appear. Every named node maps to at
//! least one entry; kinds without a dedicated rule are kept as
//! [`NodeValue::Unimplemented`] so positions stay comparable.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Tree};

/// Node kinds of control-flow constructs.
pub const CONTROL_NODE_KINDS: &[&str] = &[
    "if_statement",
    "while_statement",
    "for_statement",
    "enhanced_for_statement",
    "do_statement",
    "switch_expression",
    "switch_statement",
    "switch_block_statement_group",
    "switch_label",
    "switch_rule",
    "try_statement",
    "try_with_resources_statement",
    "catch_clause",
    "finally_clause",
    "return_statement",
    "break_statement",
    "continue_statement",
    "throw_statement",
    "synchronized_statement",
    "yield_statement",
];

const DECLARATION_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
    "method_declaration",
    "constructor_declaration",
    "field_declaration",
    "local_variable_declaration",
    "variable_declarator",
    "formal_parameter",
    "catch_formal_parameter",
    "enum_constant",
];

const LITERAL_KINDS: &[&str] = &[
    "decimal_integer_literal",
    "hex_integer_literal",
    "octal_integer_literal",
    "binary_integer_literal",
    "decimal_floating_point_literal",
    "hex_floating_point_literal",
    "string_literal",
    "character_literal",
    "text_block",
    "null_literal",
    "true",
    "false",
];

const OPERATOR_KINDS: &[&str] = &[
    "assignment_expression",
    "binary_expression",
    "unary_expression",
    "update_expression",
];

const PRIMITIVE_TYPE_KINDS: &[&str] = &[
    "integral_type",
    "floating_point_type",
    "boolean_type",
    "void_type",
];

const STRUCTURAL_KINDS: &[&str] = &[
    "block",
    "class_body",
    "interface_body",
    "enum_body",
    "constructor_body",
    "switch_block",
    "argument_list",
    "formal_parameters",
    "parenthesized_expression",
    "expression_statement",
    "array_access",
    "array_creation_expression",
    "array_initializer",
    "array_type",
    "dimensions",
    "dimensions_expr",
    "generic_type",
    "type_arguments",
    "type_parameters",
    "type_parameter",
    "scoped_type_identifier",
    "lambda_expression",
    "inferred_parameters",
    "method_reference",
    "instanceof_expression",
    "ternary_expression",
    "explicit_constructor_invocation",
    "throws",
    "superclass",
    "super_interfaces",
    "type_list",
    "resource_specification",
    "resource",
    "catch_type",
    "condition",
    "this",
    "super",
];

/// Value recorded for one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeValue {
    /// The node type alone carries the information.
    Empty,
    /// Identifier, literal, operator, or modifier text.
    Text(String),
    /// Placeholder for kinds without a dedicated rule.
    Unimplemented,
}

impl NodeValue {
    /// Text payload, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            NodeValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// One entry of a canonical node sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AstNode {
    /// Tree-sitter node kind, or a synthetic kind such as `modifiers`.
    pub kind: String,
    /// Recorded value.
    pub value: NodeValue,
}

impl AstNode {
    fn new(kind: &str, value: NodeValue) -> Self {
        Self {
            kind: kind.to_string(),
            value,
        }
    }

    fn text(kind: &str, text: String) -> Self {
        Self::new(kind, NodeValue::Text(text))
    }
}

/// Whether a node kind is a literal.
pub fn is_literal_kind(kind: &str) -> bool {
    LITERAL_KINDS.contains(&kind) || kind.contains("literal")
}

/// Whether a node kind carries an operator.
pub fn is_operator_kind(kind: &str) -> bool {
    OPERATOR_KINDS.contains(&kind) || kind.contains("operator")
}

/// Extract the canonical node sequence of the nodes starting inside `region`.
pub fn extract_nodes(tree: &Tree, source: &[u8], region: &Range<usize>) -> Vec<AstNode> {
    let mut nodes = Vec::new();
    collect(tree.root_node(), source, region, &mut nodes);
    nodes
}

fn collect(node: Node, source: &[u8], region: &Range<usize>, out: &mut Vec<AstNode>) {
    let mut skip = Vec::new();
    if region.contains(&node.start_byte()) && !emit(node, source, &mut skip, out) {
        return;
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if skip.contains(&child.id()) {
            continue;
        }
        collect(child, source, region, out);
    }
}

/// Emit the entries of one in-region node.
///
/// Children already captured in a value are pushed to `skip`. Returns `false` when the
/// node's subtree must not be visited at all.
fn emit(node: Node, source: &[u8], skip: &mut Vec<usize>, out: &mut Vec<AstNode>) -> bool {
    let kind = node.kind();

    if DECLARATION_KINDS.contains(&kind) {
        let value = match node.child_by_field_name("name") {
            Some(name) => {
                skip.push(name.id());
                NodeValue::Text(node_text(&name, source))
            }
            None => NodeValue::Empty,
        };
        out.push(AstNode::new(kind, value));
        if has_modifier_slot(kind) {
            let modifiers = find_child(&node, "modifiers");
            if let Some(m) = modifiers {
                skip.push(m.id());
            }
            let text = modifiers
                .map(|m| normalize_ws(&node_text(&m, source)))
                .unwrap_or_default();
            out.push(AstNode::text("modifiers", text));
        }
        return true;
    }

    if CONTROL_NODE_KINDS.contains(&kind) || STRUCTURAL_KINDS.contains(&kind) {
        out.push(AstNode::new(kind, NodeValue::Empty));
        return true;
    }

    if is_literal_kind(kind) || PRIMITIVE_TYPE_KINDS.contains(&kind) {
        out.push(AstNode::text(kind, node_text(&node, source)));
        return false;
    }

    match kind {
        "method_invocation" => {
            let name = field_text(&node, "name", source, skip);
            out.push(AstNode::new(kind, name));
            if let Some(object) = node.child_by_field_name("object") {
                skip.push(object.id());
                out.push(AstNode::text(
                    "method_invocation_qualifier",
                    node_text(&object, source),
                ));
            }
        }
        "field_access" => {
            let field = field_text(&node, "field", source, skip);
            out.push(AstNode::new(kind, field));
            if let Some(object) = node.child_by_field_name("object") {
                skip.push(object.id());
                out.push(AstNode::text(
                    "field_access_qualifier",
                    node_text(&object, source),
                ));
            }
        }
        "object_creation_expression" => {
            let ty = field_text(&node, "type", source, skip);
            out.push(AstNode::new(kind, ty));
        }
        "cast_expression" => {
            let ty = field_text(&node, "type", source, skip);
            out.push(AstNode::new(kind, ty));
        }
        "assignment_expression" | "binary_expression" | "unary_expression" => {
            let op = node
                .child_by_field_name("operator")
                .map(|op| NodeValue::Text(node_text(&op, source)))
                .unwrap_or(NodeValue::Empty);
            out.push(AstNode::new(kind, op));
        }
        "update_expression" => {
            let op = first_anonymous_text(&node, source)
                .map(NodeValue::Text)
                .unwrap_or(NodeValue::Empty);
            out.push(AstNode::new(kind, op));
        }
        "modifiers" => {
            out.push(AstNode::text(kind, normalize_ws(&node_text(&node, source))));
            return false;
        }
        "identifier" | "type_identifier" => {
            out.push(AstNode::text(kind, node_text(&node, source)));
        }
        // unwrapped type declarations share their start with the unit itself
        "program" => {}
        _ => out.push(AstNode::new(kind, NodeValue::Unimplemented)),
    }
    true
}

fn has_modifier_slot(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "method_declaration"
            | "constructor_declaration"
            | "field_declaration"
            | "local_variable_declaration"
    )
}

fn field_text(node: &Node, field: &str, source: &[u8], skip: &mut Vec<usize>) -> NodeValue {
    match node.child_by_field_name(field) {
        Some(child) => {
            skip.push(child.id());
            NodeValue::Text(node_text(&child, source))
        }
        None => NodeValue::Empty,
    }
}

fn find_child<'t>(node: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    found
}

fn first_anonymous_text(node: &Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .find(|c| !c.is_named())
        .map(|c| node_text(&c, source));
    found
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start >= source.len() || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn nodes(line: &str) -> Vec<AstNode> {
        normalize(line).unwrap().nodes
    }

    fn text(kind: &str, value: &str) -> AstNode {
        AstNode::text(kind, value.to_string())
    }

    #[test]
    fn field_declaration_records_name_and_modifiers() {
        assert_eq!(
            nodes("private int x = 0;"),
            vec![
                AstNode::new("field_declaration", NodeValue::Empty),
                text("modifiers", "private"),
                text("integral_type", "int"),
                text("variable_declarator", "x"),
                text("decimal_integer_literal", "0"),
            ]
        );
    }

    #[test]
    fn missing_modifiers_still_take_a_slot() {
        let n = nodes("int x = 0;");
        assert_eq!(n[1], text("modifiers", ""));
        assert_eq!(n.len(), 5);
    }

    #[test]
    fn method_invocation_records_name_and_qualifier() {
        let n = nodes("list.add(item);");
        assert_eq!(n[0].kind, "expression_statement");
        assert_eq!(n[1], text("method_invocation", "add"));
        assert_eq!(n[2], text("method_invocation_qualifier", "list"));
        assert!(n.contains(&text("identifier", "item")));
        assert!(!n.contains(&text("identifier", "list")));
    }

    #[test]
    fn binary_operator_is_recorded() {
        let n = nodes("return a + b;");
        assert!(n.contains(&text("binary_expression", "+")));
    }

    #[test]
    fn update_operator_is_recorded() {
        let n = nodes("i++;");
        assert!(n.contains(&text("update_expression", "++")));
    }

    #[test]
    fn literal_children_are_not_visited() {
        let n = nodes("return \"a b\";");
        assert_eq!(n.len(), 2);
        assert_eq!(n[1].kind, "string_literal");
        assert_eq!(n[1].value.text(), Some("\"a b\""));
    }

    #[test]
    fn control_nodes_record_type_only() {
        let n = nodes("while (x > 0) {");
        assert_eq!(n[0], AstNode::new("while_statement", NodeValue::Empty));
    }

    #[test]
    fn kind_predicates() {
        assert!(is_literal_kind("decimal_integer_literal"));
        assert!(is_literal_kind("true"));
        assert!(!is_literal_kind("identifier"));
        assert!(is_operator_kind("binary_expression"));
        assert!(!is_operator_kind("method_invocation"));
    }
}
