//! Structural queries over a committed [`crate::tree::SyntaxTree`]
//!
//! Every function here is pure: it reads one tree (and, for swapping, one
//! text buffer) and never touches engine state. Ranges are byte intervals.
//! Failures mean "not applicable at this position" and are returned to the
//! caller as [`crate::error::QueryError`].

mod bracket;
mod containing;
mod selection;
mod sibling;

pub use bracket::{Bracket, find_bracketing_children};
pub use containing::containing_node;
pub use selection::{SelectionRange, bracket_trimmer, selection_range_hierarchy, selection_ranges};
pub use sibling::{SwapOutcome, extend_to_sibling, sibling_navigate, swap_ranges};

/// Direction of sibling movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Previous,
    Next,
}

impl Direction {
    pub fn reverse(self) -> Self {
        match self {
            Direction::Previous => Direction::Next,
            Direction::Next => Direction::Previous,
        }
    }
}
