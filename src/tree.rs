//! Arena representation of a committed syntax tree
//!
//! Tree-sitter hands out a fresh `Node` value on every access, so node
//! identity cannot be based on those values. After every successful parse the
//! tree is flattened into an arena of [`NodeData`] addressed by [`NodeId`].
//! Ranges and row/column points are computed once, during the flattening.
//!
//! Node ids are only meaningful for the [`SyntaxTree`] that produced them. A
//! reparse produces a new arena and every previously obtained id is stale.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use ropey::Rope;
use tree_sitter::Tree;

/// Zero-based row and byte column, the coordinate system tree-sitter uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl From<tree_sitter::Point> for Point {
    fn from(point: tree_sitter::Point) -> Self {
        Self { row: point.row, column: point.column }
    }
}

impl From<Point> for tree_sitter::Point {
    fn from(point: Point) -> Self {
        tree_sitter::Point { row: point.row, column: point.column }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.column)
    }
}

/// Converts a byte offset into a row/column point for the given text.
///
/// Offsets past the end of the text are clamped to the end.
pub fn point_at(text: &Rope, byte: usize) -> Point {
    let byte = byte.min(text.len_bytes());
    let row = text.byte_to_line(byte);
    Point { row, column: byte - text.line_to_byte(row) }
}

/// Converts a row/column point back into a byte offset.
///
/// Rows past the end clamp to the end of the text, columns past the end of a
/// row clamp to the end of that row (including its line break).
pub fn byte_at(text: &Rope, point: Point) -> usize {
    if point.row >= text.len_lines() {
        return text.len_bytes();
    }
    let line_start = text.line_to_byte(point.row);
    let line_len = text.line(point.row).len_bytes();
    line_start + point.column.min(line_len)
}

/// A source range expressed both as a byte interval and as row/column points.
///
/// Containment and equality checks only look at the byte interval; the points
/// are derived data carried along for consumers working in row/column space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_point: Point,
    pub end_point: Point,
}

impl TextRange {
    pub fn new(start_byte: usize, end_byte: usize, start_point: Point, end_point: Point) -> Self {
        Self { start_byte, end_byte, start_point, end_point }
    }

    /// Builds a range from a byte interval, deriving points from `text`.
    pub fn from_bytes(text: &Rope, bytes: Range<usize>) -> Self {
        Self {
            start_byte: bytes.start,
            end_byte: bytes.end,
            start_point: point_at(text, bytes.start),
            end_point: point_at(text, bytes.end),
        }
    }

    /// Zero-width range at a single position.
    pub fn empty_at(byte: usize, point: Point) -> Self {
        Self { start_byte: byte, end_byte: byte, start_point: point, end_point: point }
    }

    pub fn bytes(&self) -> Range<usize> {
        self.start_byte..self.end_byte
    }

    pub fn len(&self) -> usize {
        self.end_byte.saturating_sub(self.start_byte)
    }

    pub fn is_empty(&self) -> bool {
        self.end_byte <= self.start_byte
    }

    /// Byte-interval equality, ignoring the derived points.
    pub fn same_span(&self, other: &TextRange) -> bool {
        self.start_byte == other.start_byte && self.end_byte == other.end_byte
    }

    pub fn span_eq(&self, bytes: &Range<usize>) -> bool {
        self.start_byte == bytes.start && self.end_byte == bytes.end
    }

    /// True if `bytes` lies inside this range (boundaries inclusive).
    pub fn contains_bytes(&self, bytes: &Range<usize>) -> bool {
        self.start_byte <= bytes.start && bytes.end <= self.end_byte
    }

    pub fn contains(&self, other: &TextRange) -> bool {
        self.contains_bytes(&other.bytes())
    }

    /// Containment that excludes an identical span.
    pub fn strictly_contains(&self, other: &TextRange) -> bool {
        self.contains(other) && !self.same_span(other)
    }

    /// True if `offset` lies in `[start, end]`; both ends inclusive so that a
    /// cursor sitting right after a node still counts as touching it.
    pub fn contains_offset(&self, offset: usize) -> bool {
        self.start_byte <= offset && offset <= self.end_byte
    }

    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.start_byte < other.end_byte && other.start_byte < self.end_byte
    }

    /// Smallest range covering both `self` and `other`.
    pub fn union(&self, other: &TextRange) -> TextRange {
        let (start_byte, start_point) = if self.start_byte <= other.start_byte {
            (self.start_byte, self.start_point)
        } else {
            (other.start_byte, other.start_point)
        };
        let (end_byte, end_point) = if self.end_byte >= other.end_byte {
            (self.end_byte, self.end_point)
        } else {
            (other.end_byte, other.end_point)
        };
        TextRange { start_byte, end_byte, start_point, end_point }
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..{}) ({} - {})",
            self.start_byte, self.end_byte, self.start_point, self.end_point
        )
    }
}

/// Identity token of a node inside one [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn from_index(index: usize) -> Self {
        NodeId(index as u32)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Flattened data of a single syntax node.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: &'static str,
    pub kind_id: u16,
    pub named: bool,
    pub is_error: bool,
    pub is_missing: bool,
    pub range: TextRange,
    pub parent: Option<NodeId>,
    /// Position of this node in its parent's child list.
    pub index_in_parent: usize,
    /// Named and anonymous children, in source order.
    pub children: Vec<NodeId>,
}

impl NodeData {
    fn from_ts(
        node: tree_sitter::Node<'_>,
        parent: Option<NodeId>,
        index_in_parent: usize,
    ) -> Self {
        Self {
            kind: node.kind(),
            kind_id: node.kind_id(),
            named: node.is_named(),
            is_error: node.is_error(),
            is_missing: node.is_missing(),
            range: TextRange::new(
                node.start_byte(),
                node.end_byte(),
                node.start_position().into(),
                node.end_position().into(),
            ),
            parent,
            index_in_parent,
            children: Vec::with_capacity(node.child_count()),
        }
    }
}

struct TreeInner {
    language_id: String,
    version: i32,
    ts_tree: Tree,
    nodes: Vec<NodeData>,
}

/// Committed, immutable snapshot of a parse.
///
/// Cloning is cheap: the arena and the tree-sitter tree are shared.
#[derive(Clone)]
pub struct SyntaxTree {
    inner: Arc<TreeInner>,
}

impl SyntaxTree {
    /// Flattens `ts_tree` into an arena and stamps it with `version`.
    pub fn new(language_id: impl Into<String>, version: i32, ts_tree: Tree) -> Self {
        let nodes = build_arena(&ts_tree);
        Self {
            inner: Arc::new(TreeInner { language_id: language_id.into(), version, ts_tree, nodes }),
        }
    }

    pub fn language_id(&self) -> &str {
        &self.inner.language_id
    }

    /// Document version this tree was parsed from.
    pub fn version(&self) -> i32 {
        self.inner.version
    }

    /// The underlying tree-sitter tree, for consumers running queries on it.
    pub fn ts_tree(&self) -> &Tree {
        &self.inner.ts_tree
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }

    pub fn has_error(&self) -> bool {
        self.inner.ts_tree.root_node().has_error()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.inner.nodes.get(id.index())
    }

    /// Returns the node data for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.inner.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &'static str {
        self.node(id).kind
    }

    pub fn range(&self, id: NodeId) -> TextRange {
        self.node(id).range
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn named_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().copied().filter(move |child| self.node(*child).named)
    }

    pub fn next_named_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let parent = node.parent?;
        self.children(parent)[node.index_in_parent + 1..]
            .iter()
            .copied()
            .find(|sibling| self.node(*sibling).named)
    }

    pub fn prev_named_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let parent = node.parent?;
        self.children(parent)[..node.index_in_parent]
            .iter()
            .rev()
            .copied()
            .find(|sibling| self.node(*sibling).named)
    }

    /// Iterates from `id` (inclusive) up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |current| self.parent(*current))
    }

    /// Source text covered by `id`.
    pub fn text(&self, id: NodeId, source: &Rope) -> String {
        let range = self.range(id);
        let end = range.end_byte.min(source.len_bytes());
        let start = range.start_byte.min(end);
        source.byte_slice(start..end).to_string()
    }

    pub fn to_sexp(&self) -> String {
        self.inner.ts_tree.root_node().to_sexp()
    }

    /// Indented outline of the named nodes, one per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            if node.named {
                out.push_str(&"  ".repeat(depth));
                out.push_str(node.kind);
                out.push(' ');
                out.push_str(&node.range.to_string());
                out.push('\n');
            }
            let child_depth = if node.named { depth + 1 } else { depth };
            for child in node.children.iter().rev() {
                stack.push((*child, child_depth));
            }
        }
        out
    }
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("language_id", &self.inner.language_id)
            .field("version", &self.inner.version)
            .field("nodes", &self.inner.nodes.len())
            .finish()
    }
}

/// Pre-order walk with a cursor; no recursion, so deep trees are fine.
fn build_arena(tree: &Tree) -> Vec<NodeData> {
    let mut nodes: Vec<NodeData> = Vec::new();
    let mut parents: Vec<NodeId> = Vec::new();
    let mut cursor = tree.walk();
    let mut index_in_parent = 0usize;

    loop {
        let id = NodeId::from_index(nodes.len());
        let parent = parents.last().copied();
        nodes.push(NodeData::from_ts(cursor.node(), parent, index_in_parent));
        if let Some(parent) = parent {
            nodes[parent.index()].children.push(id);
        }

        if cursor.goto_first_child() {
            parents.push(id);
            index_in_parent = 0;
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                index_in_parent += 1;
                break;
            }
            if !cursor.goto_parent() {
                return nodes;
            }
            let finished = parents.pop();
            index_in_parent = finished.map(|id| nodes[id.index()].index_in_parent).unwrap_or(0);
        }
    }
}
