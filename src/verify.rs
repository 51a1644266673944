//! Incremental parse verification
//!
//! Compares the incrementally maintained tree of a document with a fresh
//! full parse of the same text. A difference means an edit delta was
//! translated wrongly or the grammar mishandles incremental reparsing, so it
//! is treated as a bug and not as a recoverable condition.

use std::fmt;

use tracing::debug;
use url::Url;

use crate::engine::SyntaxEngine;
use crate::error::EngineError;
use crate::parser_pool::ParseFailure;
use crate::tree::{NodeId, SyntaxTree};

/// First difference found between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeMismatch {
    /// Child indices from the root down to the differing node.
    pub path: Vec<usize>,
    pub detail: String,
}

impl fmt::Display for TreeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at root")?;
        for index in &self.path {
            write!(f, "/{index}")?;
        }
        write!(f, ": {}", self.detail)
    }
}

impl std::error::Error for TreeMismatch {}

/// Structural equality: same byte span, same kind and same number of
/// children at every node, compared pairwise in order.
pub fn compare_trees(expected: &SyntaxTree, actual: &SyntaxTree) -> Result<(), TreeMismatch> {
    let mut stack: Vec<(NodeId, NodeId, Vec<usize>)> =
        vec![(expected.root(), actual.root(), Vec::new())];

    while let Some((left, right, path)) = stack.pop() {
        let (l, r) = (expected.node(left), actual.node(right));
        let detail = if !l.range.same_span(&r.range) {
            Some(format!("span {:?} != {:?}", l.range.bytes(), r.range.bytes()))
        } else if l.kind != r.kind {
            Some(format!("kind {} != {}", l.kind, r.kind))
        } else if l.children.len() != r.children.len() {
            Some(format!("{} has {} children != {}", l.kind, l.children.len(), r.children.len()))
        } else {
            None
        };
        if let Some(detail) = detail {
            return Err(TreeMismatch { path, detail });
        }

        for (index, (lc, rc)) in l.children.iter().zip(&r.children).enumerate().rev() {
            let mut child_path = path.clone();
            child_path.push(index);
            stack.push((*lc, *rc, child_path));
        }
    }

    Ok(())
}

impl SyntaxEngine {
    /// Checks the current tree of `uri` against a full parse of its text.
    ///
    /// # Errors
    ///
    /// Returns the error of the on-demand parse or of the full parse.
    ///
    /// # Panics
    ///
    /// Panics if the two trees differ.
    pub fn verify(&self, uri: &Url) -> Result<(), EngineError> {
        let inner = &self.inner;
        let entry = inner.require_entry(uri)?;
        let mut entry = entry.lock();

        // The host may bump the version between the two reads; retry until
        // the tree and the text agree.
        let (incremental, snapshot) = loop {
            let tree = inner.tree_locked(uri, &mut entry)?;
            let snapshot = entry.document.snapshot();
            if snapshot.version == tree.version() {
                break (tree, snapshot);
            }
        };
        let grammar = inner.grammar_now(incremental.language_id())?;

        let full = inner
            .pool
            .parse(&grammar, &snapshot.text, None, inner.config.parse_timeout())
            .map_err(|failure| match failure {
                ParseFailure::TimedOut(timeout) => {
                    EngineError::ParseTimeout { uri: uri.clone(), timeout }
                }
                ParseFailure::Language(e) => {
                    EngineError::ParseFailed { uri: uri.clone(), reason: e.to_string() }
                }
            })?;
        let full = SyntaxTree::new(grammar.language_id(), snapshot.version, full);
        inner.metrics.record_verification();

        if let Err(mismatch) = compare_trees(&full, &incremental) {
            panic!(
                "incremental tree of {uri} at version {} diverged from a full parse {mismatch}",
                snapshot.version
            );
        }
        debug!("Verified {} at version {} ({} nodes)", uri, snapshot.version, full.len());
        Ok(())
    }
}
