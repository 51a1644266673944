//! Syntax synchronization engine
//!
//! [`SyntaxEngine`] keeps one syntax entry per open document and owns every
//! piece of shared state: the grammar registry, the parser pool, the document
//! map, the tree-update channel and the metrics. It is a cheap handle; clones
//! share the same engine.
//!
//! ## Access paths
//!
//! - **Scheduled**: edits request a debounced reparse that runs in the
//!   background and publishes a [`TreeUpdate`] when it commits.
//! - **On demand**: [`SyntaxEngine::tree_now`] returns the committed tree if
//!   it matches the document version, and otherwise cancels any pending timer
//!   and parses immediately.
//!
//! Parses run synchronously while the entry lock is held. No lock is held
//! across an `.await`.

mod entry;
mod events;
mod scheduler;

pub use entry::SyncState;
pub use events::TreeUpdate;

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};
use url::Url;

use crate::config::EngineConfig;
use crate::document::{DocumentSource, SharedDocument};
use crate::edit::ContentChange;
use crate::error::{EngineError, GrammarError};
use crate::grammar::{Grammar, GrammarRegistry};
use crate::metrics::SyncMetrics;
use crate::parser_pool::{ParseFailure, ParserPool};
use crate::query::{self, Bracket, Direction, SwapOutcome};
use crate::tree::{NodeId, SyntaxTree};

use entry::{DocumentEntry, EditOutcome};
use events::EventBus;

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) registry: Arc<GrammarRegistry>,
    pub(crate) pool: ParserPool,
    documents: DashMap<Url, Arc<Mutex<DocumentEntry>>>,
    events: EventBus,
    pub(crate) metrics: SyncMetrics,
    runtime: Option<Handle>,
}

impl EngineInner {
    /// Clones the entry out of the map so the map guard is released before
    /// the entry lock is taken.
    fn entry(&self, uri: &Url) -> Option<Arc<Mutex<DocumentEntry>>> {
        self.documents.get(uri).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn require_entry(
        &self,
        uri: &Url,
    ) -> Result<Arc<Mutex<DocumentEntry>>, EngineError> {
        self.entry(uri).ok_or_else(|| EngineError::DocumentNotOpen(uri.clone()))
    }

    /// Grammar for an on-demand parse. Never waits for a background load.
    pub(crate) fn grammar_now(&self, language_id: &str) -> Result<Grammar, EngineError> {
        if let Some(grammar) = self.registry.loaded(language_id) {
            return Ok(grammar);
        }
        if !self.registry.is_supported(language_id) {
            return Err(EngineError::UnsupportedLanguage(language_id.to_string()));
        }
        match self.registry.load_blocking(language_id) {
            Ok(grammar) => Ok(grammar),
            Err(GrammarError::Pending(language)) => Err(EngineError::GrammarNotReady(language)),
            Err(e) => Err(EngineError::Grammar(e)),
        }
    }

    /// Parses the current text of `entry` and commits the result.
    ///
    /// The committed tree is stamped with the version of the same snapshot
    /// whose text was parsed. On failure the previous tree stays in place.
    fn parse_entry(
        &self,
        uri: &Url,
        entry: &mut DocumentEntry,
        grammar: &Grammar,
    ) -> Result<SyntaxTree, EngineError> {
        let snapshot = entry.document.snapshot();
        let old_tree = entry.begin_parse(snapshot.version);
        let incremental = old_tree.is_some();
        let timeout = self.config.parse_timeout();

        let result = {
            let _timing = self.metrics.time("parse");
            self.pool.parse(grammar, &snapshot.text, old_tree.as_ref(), timeout)
        };

        match result {
            Ok(tree) => {
                self.metrics.record_parse(incremental);
                let committed = entry.commit(grammar.language_id(), snapshot.version, tree);
                debug!(
                    "Committed {} tree for {} at version {} ({} nodes)",
                    if incremental { "incremental" } else { "full" },
                    uri,
                    snapshot.version,
                    committed.len()
                );
                self.metrics.record_tree_update();
                self.events.publish(TreeUpdate { uri: uri.clone(), tree: committed.clone() });
                Ok(committed)
            }
            Err(failure) => {
                entry.fail();
                Err(match failure {
                    ParseFailure::TimedOut(timeout) => {
                        self.metrics.record_parse_failure(true);
                        EngineError::ParseTimeout { uri: uri.clone(), timeout }
                    }
                    ParseFailure::Language(e) => {
                        self.metrics.record_parse_failure(false);
                        EngineError::ParseFailed { uri: uri.clone(), reason: e.to_string() }
                    }
                })
            }
        }
    }

    /// On-demand access with the entry lock held.
    pub(crate) fn tree_locked(
        &self,
        uri: &Url,
        entry: &mut DocumentEntry,
    ) -> Result<SyntaxTree, EngineError> {
        if let Some(tree) = entry.current_tree(entry.document.version()) {
            return Ok(tree);
        }
        if entry.timer.cancel() {
            trace!("Cancelled pending reparse of {} for an immediate one", uri);
        }
        let grammar = self.grammar_now(&entry.document.language_id())?;
        self.parse_entry(uri, entry, &grammar)
    }
}

/// Result of [`SyntaxEngine::swap_siblings`]: the tree after the swap and
/// the nodes now occupying the two swapped ranges, in position order.
#[derive(Debug, Clone)]
pub struct SwappedSiblings {
    pub tree: SyntaxTree,
    pub left: NodeId,
    pub right: NodeId,
}

#[derive(Clone)]
pub struct SyntaxEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl SyntaxEngine {
    /// Creates an engine. Background scheduling uses the tokio runtime that
    /// is current at this point; without one, trees are only produced on
    /// demand.
    pub fn new(config: EngineConfig) -> Self {
        Self::build(config, Handle::try_current().ok())
    }

    /// Creates an engine that schedules reparses on `runtime`.
    pub fn with_runtime(config: EngineConfig, runtime: Handle) -> Self {
        Self::build(config, Some(runtime))
    }

    fn build(config: EngineConfig, runtime: Option<Handle>) -> Self {
        let registry = Arc::new(GrammarRegistry::new(&config));
        let events = EventBus::new(config.event_capacity);
        info!(
            "Syntax engine started (debounce {:?}, parse timeout {:?}, scheduling {})",
            config.debounce(),
            config.parse_timeout(),
            if runtime.is_some() { "enabled" } else { "disabled" }
        );
        Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                pool: ParserPool::new(),
                documents: DashMap::new(),
                events,
                metrics: SyncMetrics::new(),
                runtime,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &GrammarRegistry {
        &self.inner.registry
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.inner.metrics
    }

    pub fn is_language_supported(&self, language_id: &str) -> bool {
        self.inner.registry.is_supported(language_id)
    }

    /// The grammar of `language_id`, if it has been loaded.
    pub fn grammar(&self, language_id: &str) -> Option<Grammar> {
        self.inner.registry.loaded(language_id)
    }

    /// Receives a [`TreeUpdate`] for every committed parse from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeUpdate> {
        self.inner.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.events.subscriber_count()
    }

    /// Starts tracking `document` and schedules its first parse.
    ///
    /// Opening a document that is already open replaces its entry.
    pub fn open_document(&self, document: Arc<dyn DocumentSource>) -> Url {
        let uri = document.uri();
        let entry = Arc::new(Mutex::new(DocumentEntry::new(document)));
        if let Some(previous) = self.inner.documents.insert(uri.clone(), Arc::clone(&entry)) {
            previous.lock().timer.cancel();
        }
        debug!("Opened {}", uri);
        scheduler::schedule_entry(&self.inner, &uri, &mut entry.lock(), Duration::ZERO);
        uri
    }

    /// Stops tracking `uri`. Returns false if it was not open.
    pub fn close_document(&self, uri: &Url) -> bool {
        match self.inner.documents.remove(uri) {
            Some((_, entry)) => {
                entry.lock().timer.cancel();
                debug!("Closed {}", uri);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        self.inner.documents.contains_key(uri)
    }

    pub fn open_documents(&self) -> Vec<Url> {
        self.inner.documents.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn state(&self, uri: &Url) -> Option<SyncState> {
        self.inner.entry(uri).map(|entry| entry.lock().state())
    }

    /// Changes applied to the tree of `uri` since its last commit.
    pub fn pending_edits(&self, uri: &Url) -> Option<usize> {
        self.inner.entry(uri).map(|entry| entry.lock().pending_edits())
    }

    /// Whether a debounce timer is pending for `uri`.
    pub fn has_pending_reparse(&self, uri: &Url) -> bool {
        self.inner.entry(uri).is_some_and(|entry| entry.lock().timer.is_pending())
    }

    /// Reports content changes the host already applied to the document.
    ///
    /// `version` is the document version the changes produced, which may be
    /// older than the document's current version when the host batches its
    /// notifications. The changes are translated into tree edits and applied,
    /// in order, to the current tree. They are dropped when there is no tree
    /// yet, and when the tree was already parsed from a version that includes
    /// them. Returns the number of changes applied.
    pub fn on_document_edited(
        &self,
        uri: &Url,
        version: i32,
        changes: &[ContentChange],
    ) -> Result<usize, EngineError> {
        let entry = self.inner.require_entry(uri)?;
        let mut entry = entry.lock();
        match entry.apply_changes(changes, version) {
            EditOutcome::Applied(applied) => {
                self.inner.metrics.record_edits_applied(applied);
                trace!("Applied {} edits to {} (version {})", applied, uri, version);
                if self.inner.config.schedule_on_edit {
                    let debounce = self.inner.config.debounce();
                    scheduler::schedule_entry(&self.inner, uri, &mut entry, debounce);
                }
                Ok(applied)
            }
            EditOutcome::Dropped(dropped) => {
                self.inner.metrics.record_edits_dropped(dropped);
                trace!("Dropped {} edits to {} ({:?})", dropped, uri, entry.state());
                Ok(0)
            }
        }
    }

    /// Queues an immediate reparse when `uri` becomes the active document and
    /// its tree is missing or behind.
    pub fn on_active_document_changed(&self, uri: &Url) -> Result<(), EngineError> {
        let entry = self.inner.require_entry(uri)?;
        let mut entry = entry.lock();
        if entry.current_tree(entry.document.version()).is_none() {
            scheduler::schedule_entry(&self.inner, uri, &mut entry, Duration::ZERO);
        }
        Ok(())
    }

    /// (Re)starts the debounce timer of `uri`.
    pub fn schedule_reparse(&self, uri: &Url) -> Result<(), EngineError> {
        let entry = self.inner.require_entry(uri)?;
        let debounce = self.inner.config.debounce();
        scheduler::schedule_entry(&self.inner, uri, &mut entry.lock(), debounce);
        Ok(())
    }

    /// Runs the scheduled reparse path now, cancelling any pending timer.
    ///
    /// Returns `Ok(None)` if the parse was deferred because the grammar is
    /// not loaded yet; a reparse follows once it is.
    pub fn reparse_now(&self, uri: &Url) -> Result<Option<SyntaxTree>, EngineError> {
        let entry = self.inner.require_entry(uri)?;
        let mut entry = entry.lock();
        entry.timer.cancel();
        scheduler::reparse_scheduled(&self.inner, uri, &mut entry)
    }

    /// Returns a tree matching the current document version, parsing
    /// immediately if needed.
    pub fn tree_now(&self, uri: &Url) -> Result<SyntaxTree, EngineError> {
        let entry = self.inner.require_entry(uri)?;
        let mut entry = entry.lock();
        self.inner.tree_locked(uri, &mut entry)
    }

    /// Like [`SyntaxEngine::tree_now`], but waits for the grammar to load
    /// instead of failing with [`EngineError::GrammarNotReady`].
    pub async fn tree(&self, uri: &Url) -> Result<SyntaxTree, EngineError> {
        let language_id = self.inner.require_entry(uri)?.lock().document.language_id();
        if self.inner.registry.is_supported(&language_id) {
            self.inner.registry.load(&language_id).await?;
        }
        self.tree_now(uri)
    }

    /// The last committed tree, without checking whether it is current.
    pub fn last_tree(&self, uri: &Url) -> Option<SyntaxTree> {
        self.inner.entry(uri).and_then(|entry| entry.lock().committed().cloned())
    }

    /// Smallest node of the current tree containing `range`.
    pub fn containing_node(
        &self,
        uri: &Url,
        range: Range<usize>,
    ) -> Result<(SyntaxTree, NodeId), EngineError> {
        let tree = self.tree_now(uri)?;
        let node = {
            let _timing = self.inner.metrics.time("containing_node");
            query::containing_node(&tree, range)?
        };
        Ok((tree, node))
    }

    /// Bracketing children of `range`, using the list kinds configured for
    /// the document's language.
    pub fn bracketing_children(
        &self,
        uri: &Url,
        range: Range<usize>,
    ) -> Result<(SyntaxTree, Bracket), EngineError> {
        let tree = self.tree_now(uri)?;
        let grammar = self.inner.grammar_now(tree.language_id())?;
        let bracket = {
            let _timing = self.inner.metrics.time("bracketing_children");
            query::find_bracketing_children(&tree, range, |kind| grammar.is_list_kind(kind))?
        };
        Ok((tree, bracket))
    }

    /// Swaps the text of two ranges and re-resolves the nodes at their new
    /// positions in the reparsed tree.
    pub fn swap_siblings(
        &self,
        document: &SharedDocument,
        a: Range<usize>,
        b: Range<usize>,
    ) -> Result<SwappedSiblings, EngineError> {
        let (uri, version, SwapOutcome { changes, left, right }) = {
            let _timing = self.inner.metrics.time("swap_siblings");
            let mut document = document.write();
            let outcome = query::swap_ranges(&mut *document, a, b)?;
            (document.uri().clone(), document.version(), outcome)
        };
        self.on_document_edited(&uri, version, &changes)?;
        let tree = self.tree_now(&uri)?;
        let left = query::containing_node(&tree, left)?;
        let right = query::containing_node(&tree, right)?;
        Ok(SwappedSiblings { tree, left, right })
    }

    /// Swaps the node containing `range` with its named sibling in
    /// `direction`. Returns `Ok(None)` when there is no such sibling.
    pub fn swap_with_sibling(
        &self,
        document: &SharedDocument,
        range: Range<usize>,
        direction: Direction,
    ) -> Result<Option<SwappedSiblings>, EngineError> {
        let uri = document.read().uri().clone();
        let tree = self.tree_now(&uri)?;
        let node = query::containing_node(&tree, range)?;
        let sibling = query::sibling_navigate(&tree, node, direction);
        if sibling == node {
            return Ok(None);
        }
        self.swap_siblings(document, tree.range(node).bytes(), tree.range(sibling).bytes())
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;

    fn engine() -> SyntaxEngine {
        let _ = crate::logging::init_logger(false, Some("warn"), false);
        SyntaxEngine::new(EngineConfig::default())
    }

    fn document(name: &str, language_id: &str, text: &str) -> SharedDocument {
        let uri = Url::parse(&format!("file:///{name}")).unwrap();
        TextDocument::new(uri, language_id, text).shared()
    }

    #[test]
    fn test_tree_now_without_runtime() {
        let engine = engine();
        let doc = document("a.js", "javascript", "let a = 1;");
        let uri = engine.open_document(doc.clone());
        assert_eq!(engine.state(&uri), Some(SyncState::NoTree));
        assert!(!engine.has_pending_reparse(&uri));

        let tree = engine.tree_now(&uri).unwrap();
        assert_eq!(tree.version(), 0);
        assert_eq!(tree.kind(tree.root()), "program");
        assert_eq!(engine.state(&uri), Some(SyncState::UpToDate));

        // Served from cache while the version is unchanged.
        let again = engine.tree_now(&uri).unwrap();
        assert_eq!(again.version(), 0);
        assert_eq!(engine.metrics().parses(), 1);
    }

    #[test]
    fn test_edits_before_first_parse_are_dropped() {
        let engine = engine();
        let doc = document("b.js", "javascript", "a;");
        let uri = engine.open_document(doc.clone());

        let change = doc.write().replace(0..1, "bb").unwrap();
        assert_eq!(engine.on_document_edited(&uri, 1, &[change]).unwrap(), 0);
        assert_eq!(engine.metrics().summary().edits_dropped, 1);

        let tree = engine.tree_now(&uri).unwrap();
        assert_eq!(tree.version(), 1);
        assert_eq!(tree.range(tree.root()).end_byte, 3);
    }

    #[test]
    fn test_incremental_reparse_after_edit() {
        let engine = engine();
        let doc = document("c.js", "javascript", "foo(a, b);");
        let uri = engine.open_document(doc.clone());
        engine.tree_now(&uri).unwrap();

        let change = doc.write().replace(7..8, "c + d").unwrap();
        assert_eq!(engine.on_document_edited(&uri, 1, &[change]).unwrap(), 1);
        assert_eq!(engine.state(&uri), Some(SyncState::Stale));
        assert_eq!(engine.pending_edits(&uri), Some(1));

        let tree = engine.tree_now(&uri).unwrap();
        assert_eq!(tree.version(), 1);
        assert!(!tree.has_error());
        let summary = engine.metrics().summary();
        assert_eq!(summary.full_parses, 1);
        assert_eq!(summary.incremental_parses, 1);
        assert_eq!(engine.pending_edits(&uri), Some(0));
    }

    #[test]
    fn test_unsupported_and_closed_documents() {
        let engine = engine();
        let uri = engine.open_document(document("notes.txt", "plaintext", "hello"));
        assert!(!engine.is_language_supported("plaintext"));
        assert!(matches!(engine.tree_now(&uri), Err(EngineError::UnsupportedLanguage(_))));

        assert!(engine.close_document(&uri));
        assert!(!engine.close_document(&uri));
        assert!(matches!(engine.tree_now(&uri), Err(EngineError::DocumentNotOpen(_))));
        assert!(engine.state(&uri).is_none());
    }

    #[test]
    fn test_reparse_now_commits() {
        let engine = engine();
        let uri = engine.open_document(document("d.json", "json", r#"{"a": [1, 2]}"#));
        // Without a runtime the scheduled path cannot load the grammar itself.
        assert!(engine.reparse_now(&uri).unwrap().is_none());

        engine.registry().load_blocking("json").unwrap();
        let tree = engine.reparse_now(&uri).unwrap().expect("grammar is loaded");
        assert_eq!(tree.kind(tree.root()), "document");
        assert_eq!(engine.state(&uri), Some(SyncState::UpToDate));
    }

    #[test]
    fn test_queries_are_timed() {
        let engine = engine();
        let doc = document("t.js", "javascript", "foo(a, b);");
        let uri = engine.open_document(doc.clone());

        engine.containing_node(&uri, 4..5).unwrap();
        engine.containing_node(&uri, 7..8).unwrap();
        engine.bracketing_children(&uri, 4..8).unwrap();
        engine.swap_siblings(&doc, 4..5, 7..8).unwrap();
        assert_eq!(doc.read().text().to_string(), "foo(b, a);");

        let metrics = engine.metrics();
        assert_eq!(metrics.operation_stats("containing_node").unwrap().count, 2);
        assert_eq!(metrics.operation_stats("bracketing_children").unwrap().count, 1);
        assert_eq!(metrics.operation_stats("swap_siblings").unwrap().count, 1);
        assert!(metrics.operation_stats("parse").is_some());
    }
}
