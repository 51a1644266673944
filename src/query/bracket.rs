use std::ops::Range;

use tracing::trace;

use super::containing::containing_node;
use crate::error::QueryError;
use crate::tree::{NodeId, SyntaxTree};

/// The children of a list node that bracket a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bracket {
    /// Nearest list-kind ancestor of the range.
    pub list: NodeId,
    /// Named child of `list` touching the start of the range.
    pub first: NodeId,
    /// Named child of `list` touching the end of the range.
    pub last: NodeId,
}

/// Finds the named children of the nearest list node that cover `range`.
///
/// Starts at [`containing_node`]. A node whose range equals `range` is
/// itself a list element, so the search moves to its parent before looking
/// for a node whose kind satisfies `is_list`. Among that node's named
/// children, `first` is the last one containing `range.start` and `last` is
/// the first one containing `range.end`.
///
/// # Errors
///
/// `AmbiguousBoundary` when no list ancestor exists or either boundary falls
/// between children.
pub fn find_bracketing_children(
    tree: &SyntaxTree,
    range: Range<usize>,
    is_list: impl Fn(&str) -> bool,
) -> Result<Bracket, QueryError> {
    let mut node = containing_node(tree, range.clone())?;
    if tree.range(node).span_eq(&range) {
        node = tree.parent(node).ok_or_else(|| QueryError::ambiguous(&range))?;
    }
    let list = tree
        .ancestors(node)
        .find(|id| is_list(tree.kind(*id)))
        .ok_or_else(|| QueryError::ambiguous(&range))?;

    let mut first = None;
    let mut last = None;
    for child in tree.named_children(list) {
        let child_range = tree.range(child);
        if child_range.contains_offset(range.start) {
            first = Some(child);
        }
        if child_range.contains_offset(range.end) {
            last = Some(child);
            break;
        }
    }

    match (first, last) {
        (Some(first), Some(last)) => {
            trace!("Bracket of {:?}: {} in {}", range, tree.kind(first), tree.kind(list));
            Ok(Bracket { list, first, last })
        }
        _ => Err(QueryError::ambiguous(&range)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::query::test_support::{find, parse};
    use indoc::indoc;

    fn list_kinds(language_id: &str) -> impl Fn(&str) -> bool {
        let kinds = EngineConfig::default().language(language_id).unwrap().list_node_kinds.clone();
        move |kind| kinds.iter().any(|k| k == kind)
    }

    #[test]
    fn test_single_argument() {
        let (tree, text) = parse("javascript", "foo(a, b);");
        let bracket = find_bracketing_children(&tree, 4..5, list_kinds("javascript")).unwrap();
        assert_eq!(tree.kind(bracket.list), "arguments");
        assert_eq!(tree.text(bracket.first, &text), "a");
        assert_eq!(bracket.first, bracket.last);
    }

    #[test]
    fn test_span_over_two_arguments() {
        let (tree, text) = parse("javascript", "foo(a, b, c);");
        // "a, b" partially
        let bracket = find_bracketing_children(&tree, 4..8, list_kinds("javascript")).unwrap();
        assert_eq!(tree.text(bracket.first, &text), "a");
        assert_eq!(tree.text(bracket.last, &text), "b");
    }

    #[test]
    fn test_statements_in_block() {
        let source = indoc! {"
            function f() {
                let a = 1;
                let b = 2;
                return a + b;
            }
        "};
        let (tree, text) = parse("javascript", source);
        let start = source.find("a = 1").unwrap();
        let end = source.find("b = 2").unwrap();
        let bracket =
            find_bracketing_children(&tree, start..end, list_kinds("javascript")).unwrap();
        assert_eq!(tree.kind(bracket.list), "statement_block");
        assert_eq!(tree.text(bracket.first, &text), "let a = 1;");
        assert_eq!(tree.text(bracket.last, &text), "let b = 2;");
    }

    #[test]
    fn test_rust_parameters() {
        let (tree, text) = parse("rust", "fn f(x: u8, y: u16) {}");
        let y = find(&tree, &text, "parameter", "y: u16");
        let bracket =
            find_bracketing_children(&tree, tree.range(y).bytes(), list_kinds("rust")).unwrap();
        assert_eq!(tree.kind(bracket.list), "parameters");
        assert_eq!(bracket.first, y);
    }

    #[test]
    fn test_no_list_ancestor() {
        let (tree, _) = parse("javascript", "foo(a, b);");
        let result = find_bracketing_children(&tree, 4..5, |_| false);
        assert_eq!(result, Err(QueryError::AmbiguousBoundary { start: 4, end: 5 }));
    }

    #[test]
    fn test_equal_range_ascends_to_parent_list() {
        let (tree, _) = parse("javascript", "x;");
        // expression_statement equals the range; its parent program is a list.
        let bracket = find_bracketing_children(&tree, 0..2, list_kinds("javascript")).unwrap();
        assert_eq!(tree.kind(bracket.list), "program");
    }
}
