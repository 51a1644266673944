//! Per-document syntax state
//!
//! An entry moves through `NoTree -> Parsing -> UpToDate -> Stale -> Parsing
//! -> UpToDate ...` and is removed from the engine when its document closes.
//! Two trees are kept: the committed [`SyntaxTree`] served to queries, and a
//! tree-sitter tree that receives edit deltas and is handed to the next parse
//! as the previous tree.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tree_sitter::Tree;

use crate::document::DocumentSource;
use crate::edit::{ContentChange, apply_changes};
use crate::tree::SyntaxTree;

/// Synchronization state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// No parse has succeeded yet. Edits are dropped in this state.
    NoTree,
    /// A parse is running.
    Parsing,
    /// The committed tree matches the document version it was parsed from.
    UpToDate,
    /// Edits were applied since the last committed parse.
    Stale,
}

/// The single pending reparse timer of a document.
///
/// The generation is bumped whenever the timer is cancelled or re-armed, so
/// a timer task that already woke up can tell it was superseded.
#[derive(Debug, Default)]
pub(crate) struct DebounceTimer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl DebounceTimer {
    /// Aborts the pending timer, if any. Returns whether one was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Generation to hand to a newly spawned timer task.
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub(crate) fn arm(&mut self, handle: JoinHandle<()>) {
        self.handle = Some(handle);
    }

    /// Called by a firing timer task. Releases the handle without aborting
    /// the caller and reports whether the timer is still the current one.
    pub(crate) fn claim(&mut self, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        self.handle = None;
        true
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

/// Result of reporting content changes to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EditOutcome {
    Applied(usize),
    Dropped(usize),
}

pub(crate) struct DocumentEntry {
    pub(crate) document: Arc<dyn DocumentSource>,
    committed: Option<SyntaxTree>,
    incremental: Option<Tree>,
    /// Document version the incremental tree's coordinates correspond to.
    incremental_version: Option<i32>,
    state: SyncState,
    pending_edits: usize,
    pub(crate) timer: DebounceTimer,
    pub(crate) consecutive_failures: u32,
}

impl DocumentEntry {
    pub(crate) fn new(document: Arc<dyn DocumentSource>) -> Self {
        Self {
            document,
            committed: None,
            incremental: None,
            incremental_version: None,
            state: SyncState::NoTree,
            pending_edits: 0,
            timer: DebounceTimer::default(),
            consecutive_failures: 0,
        }
    }

    pub(crate) fn state(&self) -> SyncState {
        self.state
    }

    pub(crate) fn committed(&self) -> Option<&SyntaxTree> {
        self.committed.as_ref()
    }

    pub(crate) fn pending_edits(&self) -> usize {
        self.pending_edits
    }

    /// The committed tree, if it is up to date for `version`.
    pub(crate) fn current_tree(&self, version: i32) -> Option<SyntaxTree> {
        match (&self.committed, self.state) {
            (Some(tree), SyncState::UpToDate) if tree.version() == version => Some(tree.clone()),
            _ => None,
        }
    }

    /// Applies changes that moved the document to `version`.
    ///
    /// Changes are dropped when there is no tree yet, and when the tree was
    /// already parsed from text that includes them.
    pub(crate) fn apply_changes(&mut self, changes: &[ContentChange], version: i32) -> EditOutcome {
        let Some(tree) = self.incremental.as_mut() else {
            return EditOutcome::Dropped(changes.len());
        };
        if self.incremental_version.is_some_and(|synced| synced >= version) {
            return EditOutcome::Dropped(changes.len());
        }
        let applied = apply_changes(tree, changes);
        self.incremental_version = Some(version);
        self.pending_edits += applied;
        self.consecutive_failures = 0;
        self.state = SyncState::Stale;
        EditOutcome::Applied(applied)
    }

    /// Enters `Parsing` and returns the previous tree to reuse, if its edits
    /// are in step with `version`.
    pub(crate) fn begin_parse(&mut self, version: i32) -> Option<Tree> {
        self.state = SyncState::Parsing;
        match self.incremental_version {
            Some(synced) if synced == version => self.incremental.clone(),
            _ => None,
        }
    }

    pub(crate) fn commit(&mut self, language_id: &str, version: i32, tree: Tree) -> SyntaxTree {
        let committed = SyntaxTree::new(language_id, version, tree.clone());
        self.incremental = Some(tree);
        self.incremental_version = Some(version);
        self.committed = Some(committed.clone());
        self.state = SyncState::UpToDate;
        self.pending_edits = 0;
        self.consecutive_failures = 0;
        committed
    }

    /// Leaves `Parsing` after a failed parse, keeping whatever tree existed.
    pub(crate) fn fail(&mut self) {
        self.state = if self.committed.is_some() { SyncState::Stale } else { SyncState::NoTree };
    }
}
