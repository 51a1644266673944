use tokio::sync::broadcast;
use tracing::trace;
use url::Url;

use crate::tree::SyntaxTree;

/// Published once per committed parse.
#[derive(Debug, Clone)]
pub struct TreeUpdate {
    pub uri: Url,
    pub tree: SyntaxTree,
}

/// Fan-out of tree updates to any number of subscribers.
///
/// Slow subscribers lag rather than block the engine: once a receiver falls
/// more than `capacity` updates behind, it observes `RecvError::Lagged`.
pub(crate) struct EventBus {
    sender: broadcast::Sender<TreeUpdate>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<TreeUpdate> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, update: TreeUpdate) {
        if let Err(broadcast::error::SendError(update)) = self.sender.send(update) {
            trace!("No subscribers for tree update of {}", update.uri);
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
