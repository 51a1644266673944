//! Translation of host content changes into tree-sitter edits
//!
//! Hosts report each change as a replaced byte range of the pre-change text
//! plus the inserted text. Tree-sitter needs the byte offsets and row/column
//! points before and after the change. The new end point is derived from the
//! start point and the inserted text alone, so no post-change text is
//! required.

use ropey::Rope;
use tree_sitter::{InputEdit, Tree};

use crate::tree::{Point, point_at};

/// A single content change as reported by the host.
///
/// Offsets are byte offsets and points are row/byte-column positions, both in
/// the text as it was before this change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub range_offset: usize,
    pub range_length: usize,
    pub text: String,
    pub start_point: Point,
    pub old_end_point: Point,
}

impl ContentChange {
    /// Builds a change against `before`, computing the points from it.
    pub fn from_offsets(
        before: &Rope,
        offset: usize,
        length: usize,
        text: impl Into<String>,
    ) -> Self {
        Self {
            range_offset: offset,
            range_length: length,
            text: text.into(),
            start_point: point_at(before, offset),
            old_end_point: point_at(before, offset + length),
        }
    }

    pub fn old_end_offset(&self) -> usize {
        self.range_offset + self.range_length
    }
}

/// Edit delta handed to tree-sitter so the next parse can reuse nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEdit {
    pub start_byte: usize,
    pub old_end_byte: usize,
    pub new_end_byte: usize,
    pub start_point: Point,
    pub old_end_point: Point,
    pub new_end_point: Point,
}

impl TreeEdit {
    pub fn from_change(change: &ContentChange) -> Self {
        Self {
            start_byte: change.range_offset,
            old_end_byte: change.old_end_offset(),
            new_end_byte: change.range_offset + change.text.len(),
            start_point: change.start_point,
            old_end_point: change.old_end_point,
            new_end_point: advance_point(change.start_point, &change.text),
        }
    }

    pub fn to_input_edit(self) -> InputEdit {
        InputEdit {
            start_byte: self.start_byte,
            old_end_byte: self.old_end_byte,
            new_end_byte: self.new_end_byte,
            start_position: self.start_point.into(),
            old_end_position: self.old_end_point.into(),
            new_end_position: self.new_end_point.into(),
        }
    }
}

impl From<&ContentChange> for TreeEdit {
    fn from(change: &ContentChange) -> Self {
        TreeEdit::from_change(change)
    }
}

/// Point reached after writing `text` starting at `start`.
///
/// Rows advance on `\n`; a `\r\n` pair counts as a single line break. Columns
/// are byte counts, matching tree-sitter.
pub fn advance_point(start: Point, text: &str) -> Point {
    match text.rfind('\n') {
        None => Point::new(start.row, start.column + text.len()),
        Some(last_newline) => {
            let rows = text.bytes().filter(|b| *b == b'\n').count();
            Point::new(start.row + rows, text.len() - last_newline - 1)
        }
    }
}

/// Applies `changes` in order to `tree`, returning the number applied.
pub fn apply_changes(tree: &mut Tree, changes: &[ContentChange]) -> usize {
    for change in changes {
        tree.edit(&TreeEdit::from_change(change).to_input_edit());
    }
    changes.len()
}
