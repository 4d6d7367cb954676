use async_trait::async_trait;
use tokio::sync::broadcast;

use mercure_protocol::Update;

use crate::event::TransportEvent;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport backend error: {0}")]
    Backend(String),
    #[error("transport is closed")]
    Closed,
}

/// An ordered, replayable event log plus a live listener registry. Both the
/// in-memory and distributed adapters implement this so the Hub and the
/// subscribe/publish handlers never need to know which one is backing a
/// given deployment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Durably appends `update` and notifies every current listener exactly
    /// once. Must not block on a slow listener — listeners are notified
    /// through a bounded broadcast channel, not synchronously awaited.
    async fn publish(&self, update: Update) -> Result<(), TransportError>;

    /// Every update published after `last_event_id`, in publication order.
    /// `None` means "from the beginning of the retained window". An id not
    /// found in the retained window is treated as the beginning of the
    /// window rather than yielding nothing.
    async fn events_after(&self, last_event_id: Option<&str>) -> Result<Vec<Update>, TransportError>;

    /// A fresh receiver over this transport's live event stream. Dropping
    /// the receiver is the transport's unregistration: no separate `off`
    /// call is needed.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Notifies listeners of a `connect`/`disconnect`/`subscribe`/
    /// `unsubscribe` lifecycle event. Unlike `publish`, this is not
    /// persisted for replay — only `update` events go in the log.
    fn notify(&self, event: TransportEvent);

    /// Stops any background work (e.g. the distributed adapter's reader
    /// loop) and marks the transport closed for further publishes.
    async fn close(&self);
}
