//! Debounced reparse scheduling
//!
//! Each document has at most one pending timer. Scheduling cancels the
//! previous timer and spawns a new one, so a burst of edits inside the
//! debounce window ends in a single reparse. When the timer fires it runs the
//! scheduled reparse path, which never blocks on grammar loading: a grammar
//! that is still loading causes a reschedule, and a grammar that was never
//! requested is loaded in the background with a reparse queued behind it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};
use url::Url;

use super::EngineInner;
use super::entry::DocumentEntry;
use crate::error::EngineError;
use crate::tree::SyntaxTree;

/// (Re)starts the debounce timer of `entry`.
///
/// Does nothing when the engine was created outside a tokio runtime; such
/// engines only parse on demand.
pub(super) fn schedule_entry(
    inner: &Arc<EngineInner>,
    uri: &Url,
    entry: &mut DocumentEntry,
    delay: Duration,
) {
    let Some(runtime) = inner.runtime.as_ref() else {
        trace!("No runtime, not scheduling reparse of {}", uri);
        return;
    };

    if entry.timer.cancel() {
        inner.metrics.record_debounce_reset();
    }
    let generation = entry.timer.next_generation();
    let weak = Arc::downgrade(inner);
    let task_uri = uri.clone();
    let handle = runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = weak.upgrade() {
            on_timer_fired(&inner, &task_uri, generation);
        }
    });
    entry.timer.arm(handle);
    trace!("Scheduled reparse of {} in {:?} (generation {})", uri, delay, generation);
}

/// Looks up `uri` and schedules it, if it is still open.
pub(super) fn schedule(inner: &Arc<EngineInner>, uri: &Url, delay: Duration) {
    if let Some(entry) = inner.entry(uri) {
        schedule_entry(inner, uri, &mut entry.lock(), delay);
    }
}

fn on_timer_fired(inner: &Arc<EngineInner>, uri: &Url, generation: u64) {
    let Some(entry) = inner.entry(uri) else {
        trace!("Timer fired for closed document {}", uri);
        return;
    };
    let mut entry = entry.lock();
    if !entry.timer.claim(generation) {
        trace!("Discarding superseded timer for {} (generation {})", uri, generation);
        return;
    }
    inner.metrics.record_scheduled_fire();

    if let Err(e) = reparse_scheduled(inner, uri, &mut entry) {
        entry.consecutive_failures += 1;
        if entry.consecutive_failures <= inner.config.max_parse_retries {
            debug!(
                "Reparse of {} failed ({}), retry {}/{}",
                uri, e, entry.consecutive_failures, inner.config.max_parse_retries
            );
            schedule_entry(inner, uri, &mut entry, inner.config.debounce());
        } else {
            warn!(
                "Giving up on scheduled reparse of {} after {} failures: {}",
                uri, entry.consecutive_failures, e
            );
        }
    }
}

/// The scheduled reparse path.
///
/// Returns `Ok(None)` when the parse was deferred behind a grammar load or
/// the language has no grammar, and the committed tree otherwise.
pub(super) fn reparse_scheduled(
    inner: &Arc<EngineInner>,
    uri: &Url,
    entry: &mut DocumentEntry,
) -> Result<Option<SyntaxTree>, EngineError> {
    if let Some(tree) = entry.current_tree(entry.document.version()) {
        trace!("{} is already up to date", uri);
        return Ok(Some(tree));
    }

    let language_id = entry.document.language_id();
    if let Some(grammar) = inner.registry.loaded(&language_id) {
        return inner.parse_entry(uri, entry, &grammar).map(Some);
    }
    if !inner.registry.is_supported(&language_id) {
        debug!("No grammar for '{}', leaving {} unparsed", language_id, uri);
        return Ok(None);
    }
    if inner.registry.is_loading(&language_id) {
        trace!("Grammar for '{}' still loading, rescheduling {}", language_id, uri);
        schedule_entry(inner, uri, entry, inner.config.debounce());
        return Ok(None);
    }

    spawn_grammar_load(inner, uri, language_id);
    Ok(None)
}

/// Loads a grammar in the background and queues an immediate reparse of
/// `uri` once it is available.
fn spawn_grammar_load(inner: &Arc<EngineInner>, uri: &Url, language_id: String) {
    let Some(runtime) = inner.runtime.as_ref() else {
        return;
    };
    debug!("Loading grammar for '{}' before parsing {}", language_id, uri);
    let registry = Arc::clone(&inner.registry);
    let weak = Arc::downgrade(inner);
    let uri = uri.clone();
    runtime.spawn(async move {
        match registry.load(&language_id).await {
            Ok(_) => {
                if let Some(inner) = weak.upgrade() {
                    schedule(&inner, &uri, Duration::ZERO);
                }
            }
            Err(e) => {
                warn!("Grammar for '{}' unavailable, {} stays unparsed: {}", language_id, uri, e)
            }
        }
    });
}
