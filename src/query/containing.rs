use std::ops::Range;

use tracing::trace;

use crate::error::QueryError;
use crate::tree::{NodeId, SyntaxTree};

/// Returns the deepest node whose range contains `range`.
///
/// The search walks down from the root, at each level entering the first
/// child that contains `range`. Boundaries are inclusive, so at a position
/// where two children touch, both qualify; a named child is then preferred
/// over an anonymous one (the identifier after `(` rather than the
/// parenthesis). A child whose range equals `range` is entered like any
/// other, so the deepest equal-range node wins over its ancestors.
///
/// # Errors
///
/// `InvalidRange` for a reversed range, `NotFound` when the root does not
/// contain `range`.
pub fn containing_node(tree: &SyntaxTree, range: Range<usize>) -> Result<NodeId, QueryError> {
    if range.start > range.end {
        return Err(QueryError::InvalidRange { start: range.start, end: range.end });
    }
    let root = tree.root();
    if !tree.range(root).contains_bytes(&range) {
        return Err(QueryError::not_found(&range));
    }

    let mut node = root;
    'descend: loop {
        let mut anonymous = None;
        for &child in tree.children(node) {
            let data = tree.node(child);
            if !data.range.contains_bytes(&range) {
                continue;
            }
            if data.named {
                node = child;
                continue 'descend;
            }
            anonymous.get_or_insert(child);
        }
        match anonymous {
            Some(child) => node = child,
            None => break,
        }
    }

    trace!("Containing node of {:?} is {} {}", range, tree.kind(node), node);
    Ok(node)
}
