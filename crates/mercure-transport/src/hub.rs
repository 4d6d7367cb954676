use std::sync::Arc;

use tokio::sync::broadcast;

use mercure_protocol::Update;

use crate::event::TransportEvent;
use crate::transport::{Transport, TransportError};

/// A scoped listener registration. Dropping it is the unregistration; no
/// explicit `off` call is required.
pub struct Listener {
    receiver: broadcast::Receiver<TransportEvent>,
}

impl Listener {
    pub async fn recv(&mut self) -> Result<TransportEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}

/// Thin wrapper around a [`Transport`] exposing the small, stable surface
/// the rest of the hub depends on, so the subscribe/publish handlers never
/// reach into transport internals directly.
#[derive(Clone)]
pub struct Hub {
    transport: Arc<dyn Transport>,
}

impl Hub {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn publish(&self, update: Update) -> Result<(), TransportError> {
        self.transport.publish(update).await
    }

    pub async fn events_after(&self, last_event_id: Option<&str>) -> Result<Vec<Update>, TransportError> {
        self.transport.events_after(last_event_id).await
    }

    /// Registers a new listener on the live event stream. Returns an
    /// unregistration handle (drop it to stop listening).
    pub fn on(&self) -> Listener {
        Listener {
            receiver: self.transport.subscribe(),
        }
    }

    /// Fires a `connect`/`disconnect`/`subscribe`/`unsubscribe` lifecycle
    /// event to every current listener.
    pub fn emit(&self, event: TransportEvent) {
        self.transport.notify(event);
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}
