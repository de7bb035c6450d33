//! Change taxonomy for a matched pair of lines.

use std::collections::BTreeMap;

use lineage_core::text::{extract_comments, is_comment_line, strip_comments};
use lineage_core::{ChangeType, Classification, BLOCK_COMMENT, INLINE_COMMENT};

use crate::extract::{is_literal_kind, is_operator_kind, AstNode, NodeValue};
use crate::normalize::{contains_control_keywords, normalize, wrap, WrapArchetype};
use crate::structure::probe;

type Subtypes = BTreeMap<ChangeType, usize>;

/// Classify how `new` differs from `old`.
///
/// Both arguments are trimmed line texts without the diff sign. The decision order is:
/// whole-line comments, layout-only changes, root type changes, then a node-by-node
/// comparison of the canonical sequences.
///
/// # Examples
///
/// ```
/// use lineage_core::ChangeType;
/// use lineage_fragment::classify;
///
/// assert_eq!(classify("int x = 0;", "int y = 0;").change, ChangeType::Rename);
/// assert_eq!(classify("return 1;", "return 2;").change, ChangeType::LiteralChange);
/// assert_eq!(classify("if (x > 0) {", "while (x > 0) {").change, ChangeType::ControlChange);
/// assert_eq!(classify("// old text", "// new text").change, ChangeType::CommentChange);
/// ```
pub fn classify(old: &str, new: &str) -> Classification {
    let old = old.trim();
    let new = new.trim();

    if is_comment_line(old) || is_comment_line(new) {
        return Classification::single(BLOCK_COMMENT, BLOCK_COMMENT, ChangeType::CommentChange);
    }

    let old_code = strip_comments(old);
    let new_code = strip_comments(new);
    let comments_differ = extract_comments(old) != extract_comments(new);

    let old_probe = probe(&old_code);
    let new_probe = probe(&new_code);
    if let (Some(a), Some(b)) = (&old_probe, &new_probe) {
        if a.leaves == b.leaves {
            if comments_differ {
                return inline_comment_change();
            }
            return Classification::single(&a.root_type, &b.root_type, ChangeType::SyntaxOnly);
        }
    }

    let source_type = old_probe
        .map(|p| p.root_type)
        .unwrap_or_else(|| fallback_type(&old_code));
    let target_type = new_probe
        .map(|p| p.root_type)
        .unwrap_or_else(|| fallback_type(&new_code));

    let mut subtypes = if source_type != target_type {
        structural_changes(&source_type, &target_type)
    } else {
        let (old_nodes, new_nodes) = match (normalize(&old_code), normalize(&new_code)) {
            (Ok(a), Ok(b)) => (a.nodes, b.nodes),
            _ => {
                return Classification::single(source_type, target_type, ChangeType::ValueError);
            }
        };
        if old_nodes == new_nodes {
            if comments_differ {
                return inline_comment_change();
            }
            Subtypes::from([(ChangeType::IdenticalPartialAst, 1)])
        } else if old_nodes.len() != new_nodes.len() {
            structural_changes(&source_type, &target_type)
        } else {
            node_value_changes(&old_nodes, &new_nodes)
        }
    };

    let change = label(&subtypes);
    if subtypes.is_empty() {
        // differences the extractor does not record a value for
        subtypes.insert(change, 1);
    }

    Classification {
        source_type,
        target_type,
        change,
        subtypes,
    }
}

/// Independent, non-exclusive checks on two node types.
///
/// # Examples
///
/// ```
/// use lineage_core::ChangeType;
/// use lineage_fragment::classify::structural_changes;
///
/// let subtypes = structural_changes("expression_statement", "return_statement");
/// assert_eq!(subtypes.keys().copied().collect::<Vec<_>>(), vec![ChangeType::ControlChange]);
///
/// let subtypes = structural_changes("identifier", "block");
/// assert!(subtypes.contains_key(&ChangeType::OtherStructuralChange));
/// ```
pub fn structural_changes(source: &str, target: &str) -> BTreeMap<ChangeType, usize> {
    let either = |check: fn(&str) -> bool| check(source) || check(target);
    let mut subtypes = Subtypes::new();

    if either(|t| t.contains("access")) {
        *subtypes.entry(ChangeType::AccessChange).or_default() += 1;
    }
    if either(|t| t.contains("method_invocation")) {
        *subtypes.entry(ChangeType::CallChange).or_default() += 1;
    }
    if either(contains_control_keywords) {
        *subtypes.entry(ChangeType::ControlChange).or_default() += 1;
    }
    if either(is_literal_kind) {
        *subtypes.entry(ChangeType::LiteralChange).or_default() += 1;
    }
    if either(is_operator_kind) {
        *subtypes.entry(ChangeType::OperatorChange).or_default() += 1;
    }
    if subtypes.is_empty() {
        subtypes.insert(ChangeType::OtherStructuralChange, 1);
    }
    subtypes
}

fn node_value_changes(old: &[AstNode], new: &[AstNode]) -> Subtypes {
    let mut changes = Subtypes::new();
    for (a, b) in old.iter().zip(new) {
        if a == b {
            continue;
        }
        if a.kind == b.kind {
            if let (NodeValue::Text(x), NodeValue::Text(y)) = (&a.value, &b.value) {
                if x != y {
                    *changes.entry(value_change(&a.kind)).or_default() += 1;
                }
            }
        } else {
            for (ct, n) in structural_changes(&a.kind, &b.kind) {
                *changes.entry(ct).or_default() += n;
            }
        }
    }
    changes
}

/// Final label of a subtype tally: the single subtype, [`ChangeType::MixedChange`]
/// for several, [`ChangeType::ValueError`] for none.
fn label(subtypes: &Subtypes) -> ChangeType {
    let mut keys = subtypes.keys();
    match (keys.next(), keys.next()) {
        (Some(only), None) => *only,
        (Some(_), Some(_)) => ChangeType::MixedChange,
        (None, _) => ChangeType::ValueError,
    }
}

/// Label for a changed value of a node whose type stayed the same.
fn value_change(kind: &str) -> ChangeType {
    if kind == "modifiers" {
        ChangeType::AccessChange
    } else if is_literal_kind(kind) {
        ChangeType::LiteralChange
    } else {
        ChangeType::Rename
    }
}

fn inline_comment_change() -> Classification {
    Classification::single(INLINE_COMMENT, INLINE_COMMENT, ChangeType::CommentChange)
}

fn fallback_type(code: &str) -> String {
    if code.is_empty() {
        WrapArchetype::Comment.tag().to_string()
    } else {
        wrap(code).archetype.tag().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_comment_on_either_side() {
        let c = classify("// note", "int x = 0;");
        assert_eq!(c.change, ChangeType::CommentChange);
        assert_eq!(c.source_type, BLOCK_COMMENT);
        assert_eq!(c.target_type, BLOCK_COMMENT);
    }

    #[test]
    fn inline_comment_only() {
        let c = classify("int x = 0; // a", "int x = 0; // b");
        assert_eq!(c.change, ChangeType::CommentChange);
        assert_eq!(c.source_type, INLINE_COMMENT);
    }

    #[test]
    fn layout_only_is_syntax_only() {
        let c = classify("int x=0;", "int x = 0;");
        assert_eq!(c.change, ChangeType::SyntaxOnly);
    }

    #[test]
    fn modifier_change_is_access_change() {
        let c = classify("private int x = 0;", "public int x = 0;");
        assert_eq!(c.change, ChangeType::AccessChange);
    }

    #[test]
    fn same_type_operator_value_is_rename() {
        assert_eq!(value_change("binary_expression"), ChangeType::Rename);
        assert_eq!(value_change("decimal_integer_literal"), ChangeType::LiteralChange);
        assert_eq!(value_change("modifiers"), ChangeType::AccessChange);
    }

    #[test]
    fn operator_kind_change_is_structural() {
        let subtypes = structural_changes("identifier", "binary_expression");
        assert!(subtypes.contains_key(&ChangeType::OperatorChange));
    }

    #[test]
    fn label_of_subtype_tally() {
        assert_eq!(label(&Subtypes::new()), ChangeType::ValueError);
        assert_eq!(
            label(&Subtypes::from([(ChangeType::Rename, 2)])),
            ChangeType::Rename
        );
        assert_eq!(
            label(&Subtypes::from([(ChangeType::Rename, 1), (ChangeType::LiteralChange, 1)])),
            ChangeType::MixedChange
        );
    }

    #[test]
    fn call_target_rename() {
        let c = classify("list.add(item);", "list.push(item);");
        assert_eq!(c.change, ChangeType::Rename);
        assert_eq!(c.source_type, "expression_statement");
    }

    #[test]
    fn several_value_changes_mix() {
        let c = classify("int x = 0;", "int y = 1;");
        assert_eq!(c.change, ChangeType::MixedChange);
        assert_eq!(c.subtypes[&ChangeType::Rename], 1);
        assert_eq!(c.subtypes[&ChangeType::LiteralChange], 1);
    }

    #[test]
    fn root_type_change_with_call() {
        let c = classify("x = 1;", "return compute(x);");
        assert_eq!(c.source_type, "expression_statement");
        assert_eq!(c.target_type, "return_statement");
        assert!(c.subtypes.contains_key(&ChangeType::ControlChange));
    }

    #[test]
    fn node_count_change_uses_root_types() {
        let c = classify("x = 1;", "x = foo(1);");
        assert_eq!(c.change, ChangeType::OtherStructuralChange);
    }

    #[test]
    fn unparsable_pair_is_value_error() {
        let c = classify("int = = ;", "int = = = ;");
        assert_eq!(c.change, ChangeType::ValueError);
    }

    #[test]
    fn structural_checks_are_not_exclusive() {
        let subtypes = structural_changes("method_invocation", "binary_expression");
        assert!(subtypes.contains_key(&ChangeType::CallChange));
        assert!(subtypes.contains_key(&ChangeType::OperatorChange));
        assert!(!subtypes.contains_key(&ChangeType::OtherStructuralChange));
    }
}
