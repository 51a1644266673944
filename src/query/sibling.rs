use std::ops::Range;

use super::Direction;
use super::bracket::find_bracketing_children;
use crate::document::{TextEdit, TextSource};
use crate::edit::ContentChange;
use crate::error::QueryError;
use crate::tree::{NodeId, SyntaxTree, TextRange};

/// Previous or next named sibling of `node`, or `node` itself at either end
/// of its sibling list.
pub fn sibling_navigate(tree: &SyntaxTree, node: NodeId, direction: Direction) -> NodeId {
    let sibling = match direction {
        Direction::Previous => tree.prev_named_sibling(node),
        Direction::Next => tree.next_named_sibling(node),
    };
    sibling.unwrap_or(node)
}

/// Grows `range` by one named sibling in `direction`.
///
/// The range is first snapped to its bracketing children, so a selection
/// covering part of an element is extended to whole elements. At the end
/// of the list the snapped range is returned unchanged.
pub fn extend_to_sibling(
    tree: &SyntaxTree,
    range: Range<usize>,
    direction: Direction,
    is_list: impl Fn(&str) -> bool,
) -> Result<TextRange, QueryError> {
    let bracket = find_bracketing_children(tree, range, is_list)?;
    let current = tree.range(bracket.first).union(&tree.range(bracket.last));
    let edge = match direction {
        Direction::Previous => bracket.first,
        Direction::Next => bracket.last,
    };
    let sibling = sibling_navigate(tree, edge, direction);
    Ok(current.union(&tree.range(sibling)))
}

/// Text edits produced by [`swap_ranges`] and where the two pieces of text
/// ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Changes in the order they were applied, rightmost range first.
    pub changes: Vec<ContentChange>,
    /// Post-swap range at the position of the earlier input range.
    pub left: Range<usize>,
    /// Post-swap range at the position of the later input range.
    pub right: Range<usize>,
}

/// Exchanges the text of two non-overlapping ranges.
///
/// The ranges may be given in either order. The rightmost range is replaced
/// first so the offsets of the other one stay valid. Node ids obtained before
/// the swap do not survive it; resolve the returned ranges against the
/// reparsed tree.
pub fn swap_ranges<T>(
    text: &mut T,
    a: Range<usize>,
    b: Range<usize>,
) -> Result<SwapOutcome, QueryError>
where
    T: TextSource + ?Sized,
{
    for range in [&a, &b] {
        if range.start > range.end {
            return Err(QueryError::InvalidRange { start: range.start, end: range.end });
        }
    }
    let (left, right) = if a.start <= b.start { (a, b) } else { (b, a) };
    if left.end > right.start {
        return Err(QueryError::OverlappingRanges { first: left, second: right });
    }

    let left_text = text.slice(left.clone())?;
    let right_text = text.slice(right.clone())?;
    let changes = text.apply_edits(&[
        TextEdit::new(right.clone(), left_text.clone()),
        TextEdit::new(left.clone(), right_text.clone()),
    ])?;

    let new_left = left.start..left.start + right_text.len();
    let new_right_start = right.start + right_text.len() - left_text.len();
    Ok(SwapOutcome {
        changes,
        left: new_left,
        right: new_right_start..new_right_start + left_text.len(),
    })
}
