//! Host document boundary
//!
//! The engine does not own document text. It reads it through
//! [`DocumentSource`], which the host implements. [`TextDocument`] is a
//! rope-backed implementation used by the CLI, tests and benchmarks.

use std::ops::Range;
use std::sync::Arc;

use parking_lot::RwLock;
use ropey::Rope;
use url::Url;

use crate::edit::ContentChange;
use crate::error::EditError;
use crate::tree::{Point, point_at};

/// Consistent view of a document at one version.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub uri: Url,
    pub language_id: String,
    pub version: i32,
    pub text: Rope,
}

/// Read access to a host document.
///
/// `version` must increase with every content change; the engine relies on
/// it to decide whether a cached tree is current.
pub trait DocumentSource: Send + Sync {
    fn uri(&self) -> Url;
    fn language_id(&self) -> String;
    fn version(&self) -> i32;
    fn snapshot(&self) -> DocumentSnapshot;
}

/// Mutable text used by sibling swapping.
pub trait TextSource {
    fn slice(&self, range: Range<usize>) -> Result<String, EditError>;

    /// Applies `edits` in order as a single version bump, returning the
    /// content changes to report to the engine.
    fn apply_edits(&mut self, edits: &[TextEdit]) -> Result<Vec<ContentChange>, EditError>;
}

/// Replacement of a byte range, with offsets into the text as it is when
/// the edit is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub text: String,
}

impl TextEdit {
    pub fn new(range: Range<usize>, text: impl Into<String>) -> Self {
        Self { range, text: text.into() }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset..offset, text)
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self::new(range, "")
    }
}

#[derive(Debug, Clone)]
pub struct TextDocument {
    uri: Url,
    language_id: String,
    version: i32,
    text: Rope,
}

pub type SharedDocument = Arc<RwLock<TextDocument>>;

impl TextDocument {
    pub fn new(uri: Url, language_id: impl Into<String>, text: &str) -> Self {
        Self { uri, language_id: language_id.into(), version: 0, text: Rope::from_str(text) }
    }

    /// Wraps the document for sharing with a [`crate::engine::SyntaxEngine`].
    pub fn shared(self) -> SharedDocument {
        Arc::new(RwLock::new(self))
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &Rope {
        &self.text
    }

    pub fn len_bytes(&self) -> usize {
        self.text.len_bytes()
    }

    pub fn point_at(&self, byte: usize) -> Point {
        point_at(&self.text, byte)
    }

    /// Applies edits one after another. Each edit's range refers to the text
    /// produced by the edits before it. The version increases once per call,
    /// and only if every edit is valid; an invalid edit leaves the document
    /// untouched.
    pub fn apply_edits(&mut self, edits: &[TextEdit]) -> Result<Vec<ContentChange>, EditError> {
        let mut text = self.text.clone();
        let mut changes = Vec::with_capacity(edits.len());
        for edit in edits {
            check_range(&text, &edit.range)?;
            changes.push(ContentChange::from_offsets(
                &text,
                edit.range.start,
                edit.range.len(),
                edit.text.clone(),
            ));
            let start = text.byte_to_char(edit.range.start);
            let end = text.byte_to_char(edit.range.end);
            text.remove(start..end);
            text.insert(start, &edit.text);
        }
        self.text = text;
        self.version += 1;
        Ok(changes)
    }

    /// Replaces a single byte range.
    pub fn replace(&mut self, range: Range<usize>, text: &str) -> Result<ContentChange, EditError> {
        let mut changes = self.apply_edits(&[TextEdit::new(range, text)])?;
        Ok(changes.remove(0))
    }

    /// Replaces the whole text.
    pub fn set_text(&mut self, text: &str) -> ContentChange {
        let change = ContentChange::from_offsets(&self.text, 0, self.text.len_bytes(), text);
        self.text = Rope::from_str(text);
        self.version += 1;
        change
    }

    pub fn slice(&self, range: Range<usize>) -> Result<String, EditError> {
        check_range(&self.text, &range)?;
        Ok(self.text.byte_slice(range).to_string())
    }
}

fn check_range(text: &Rope, range: &Range<usize>) -> Result<(), EditError> {
    let len = text.len_bytes();
    if range.start > range.end {
        return Err(EditError::Reversed { start: range.start, end: range.end });
    }
    if range.end > len {
        return Err(EditError::OutOfBounds { start: range.start, end: range.end, len });
    }
    for offset in [range.start, range.end] {
        if text.char_to_byte(text.byte_to_char(offset)) != offset {
            return Err(EditError::NotCharBoundary(offset));
        }
    }
    Ok(())
}

impl TextSource for TextDocument {
    fn slice(&self, range: Range<usize>) -> Result<String, EditError> {
        TextDocument::slice(self, range)
    }

    fn apply_edits(&mut self, edits: &[TextEdit]) -> Result<Vec<ContentChange>, EditError> {
        TextDocument::apply_edits(self, edits)
    }
}

impl DocumentSource for RwLock<TextDocument> {
    fn uri(&self) -> Url {
        self.read().uri.clone()
    }

    fn language_id(&self) -> String {
        self.read().language_id.clone()
    }

    fn version(&self) -> i32 {
        self.read().version
    }

    fn snapshot(&self) -> DocumentSnapshot {
        let document = self.read();
        DocumentSnapshot {
            uri: document.uri.clone(),
            language_id: document.language_id.clone(),
            version: document.version,
            text: document.text.clone(),
        }
    }
}
