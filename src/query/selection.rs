use ropey::Rope;

use super::containing::containing_node;
use crate::error::QueryError;
use crate::tree::{SyntaxTree, TextRange, point_at};

/// Builds the expand-selection chain at `position`, innermost first.
///
/// The chain starts with the empty range at `position` and walks from the
/// containing node up to the root. For each node, `trim_inner` may offer a
/// tighter range (the node without surrounding brackets, say) which is kept
/// when it lies strictly between the last kept range and the node. The node
/// range itself is kept when it strictly contains the last kept range, so
/// every entry strictly contains the one before it.
pub fn selection_range_hierarchy(
    tree: &SyntaxTree,
    text: &Rope,
    position: usize,
    trim_inner: impl Fn(TextRange) -> TextRange,
) -> Result<Vec<TextRange>, QueryError> {
    let start = containing_node(tree, position..position)?;
    let mut ranges = vec![TextRange::empty_at(position, point_at(text, position))];

    for node in tree.ancestors(start) {
        let range = tree.range(node);
        let inner = trim_inner(range);
        let last = ranges[ranges.len() - 1];
        if range.strictly_contains(&inner) && inner.strictly_contains(&last) {
            ranges.push(inner);
        }
        let last = ranges[ranges.len() - 1];
        if range.strictly_contains(&last) {
            ranges.push(range);
        }
    }

    Ok(ranges)
}

/// One hierarchy per position, as linked [`SelectionRange`] chains.
pub fn selection_ranges(
    tree: &SyntaxTree,
    text: &Rope,
    positions: &[usize],
    trim_inner: impl Fn(TextRange) -> TextRange,
) -> Result<Vec<SelectionRange>, QueryError> {
    positions
        .iter()
        .map(|&position| {
            let ranges = selection_range_hierarchy(tree, text, position, &trim_inner)?;
            SelectionRange::from_hierarchy(ranges)
                .ok_or(QueryError::NotFound { start: position, end: position })
        })
        .collect()
}

/// A range together with the range enclosing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRange {
    pub range: TextRange,
    pub parent: Option<Box<SelectionRange>>,
}

impl SelectionRange {
    /// Links an innermost-first hierarchy into a parent chain.
    pub fn from_hierarchy(ranges: Vec<TextRange>) -> Option<Self> {
        ranges.into_iter().rev().fold(None, |parent, range| {
            Some(SelectionRange { range, parent: parent.map(Box::new) })
        })
    }

    /// Iterates this range and then each enclosing one.
    pub fn iter(&self) -> impl Iterator<Item = &SelectionRange> {
        std::iter::successors(Some(self), |current| current.parent.as_deref())
    }
}

/// Default inner-range trimmer: drops surrounding whitespace, then one
/// matching pair of brackets or quotes, then whitespace again.
pub fn bracket_trimmer(text: &Rope) -> impl Fn(TextRange) -> TextRange + '_ {
    move |range| {
        let (mut start, mut end) = trim_whitespace(text, range.start_byte, range.end_byte);
        if end - start >= 2 && is_pair(text.byte(start), text.byte(end - 1)) {
            (start, end) = trim_whitespace(text, start + 1, end - 1);
        }
        TextRange::from_bytes(text, start..end)
    }
}

fn trim_whitespace(text: &Rope, mut start: usize, mut end: usize) -> (usize, usize) {
    while start < end && text.byte(start).is_ascii_whitespace() {
        start += 1;
    }
    while end > start && text.byte(end - 1).is_ascii_whitespace() {
        end -= 1;
    }
    (start, end)
}

fn is_pair(open: u8, close: u8) -> bool {
    matches!(
        (open, close),
        (b'(', b')') | (b'[', b']') | (b'{', b'}') | (b'"', b'"') | (b'\'', b'\'') | (b'`', b'`')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::test_support::parse;

    fn assert_strictly_increasing(ranges: &[TextRange]) {
        for pair in ranges.windows(2) {
            assert!(
                pair[1].strictly_contains(&pair[0]),
                "{} does not strictly contain {}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn test_hierarchy_in_call() {
        let (tree, text) = parse("javascript", "foo(a, b);");
        let ranges = selection_range_hierarchy(&tree, &text, 4, bracket_trimmer(&text)).unwrap();
        let spans: Vec<_> = ranges.iter().map(|r| r.bytes()).collect();
        // cursor, `a`, `a, b`, `(a, b)`, `foo(a, b)`, `foo(a, b);`
        assert_eq!(spans, vec![4..4, 4..5, 4..8, 3..9, 0..9, 0..10]);
        assert_strictly_increasing(&ranges);
    }

    #[test]
    fn test_identity_trim_skips_duplicates() {
        let (tree, text) = parse("javascript", "x;\n");
        let ranges = selection_range_hierarchy(&tree, &text, 0, |r| r).unwrap();
        assert_strictly_increasing(&ranges);
        assert_eq!(ranges.last().unwrap().bytes(), tree.range(tree.root()).bytes());
    }

    #[test]
    fn test_selection_ranges_chain() {
        let (tree, text) = parse("json", r#"{"k": [1, 2]}"#);
        let chains = selection_ranges(&tree, &text, &[7, 10], bracket_trimmer(&text)).unwrap();
        assert_eq!(chains.len(), 2);
        for chain in &chains {
            let ranges: Vec<_> = chain.iter().map(|s| s.range).collect();
            assert_strictly_increasing(&ranges);
            assert!(ranges[0].is_empty());
        }
        assert_eq!(chains[0].iter().nth(1).unwrap().range.bytes(), 7..8);
    }

    #[test]
    fn test_bracket_trimmer() {
        let text = Rope::from_str("f( { a } )");
        let trim = bracket_trimmer(&text);
        // Only the outermost pair is removed.
        assert_eq!(trim(TextRange::from_bytes(&text, 1..10)).bytes(), 3..8);
        assert_eq!(trim(TextRange::from_bytes(&text, 3..8)).bytes(), 5..6);
        assert_eq!(trim(TextRange::from_bytes(&text, 0..1)).bytes(), 0..1);
    }

    #[test]
    fn test_angle_brackets_are_not_a_pair() {
        // Comparison operators and markup both start with `<` and end with `>`.
        let text = Rope::from_str("<div>x</div>");
        let trim = bracket_trimmer(&text);
        assert_eq!(trim(TextRange::from_bytes(&text, 0..12)).bytes(), 0..12);
        assert_eq!(trim(TextRange::from_bytes(&text, 6..12)).bytes(), 6..12);

        let text = Rope::from_str("a < b > c");
        let trim = bracket_trimmer(&text);
        assert_eq!(trim(TextRange::from_bytes(&text, 2..7)).bytes(), 2..7);
    }
}
