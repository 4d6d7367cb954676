use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use mercure_protocol::Update;

use crate::event::TransportEvent;
use crate::transport::{Transport, TransportError};

/// In-process transport backed by a ring buffer and a `tokio::sync::broadcast`
/// channel, the same primitive the teacher uses for its per-stream fan-out
/// registry (`state.rs`'s `BroadcastRegistry`). Suitable for a single hub
/// instance; updates do not survive a restart.
pub struct InMemoryTransport {
    retained_capacity: Option<usize>,
    log: RwLock<VecDeque<Update>>,
    sender: broadcast::Sender<TransportEvent>,
    closed: AtomicBool,
}

impl InMemoryTransport {
    /// `retained_capacity` bounds how many updates are kept for replay
    /// (`None` keeps every update seen so far). `channel_capacity` bounds
    /// the broadcast channel every live subscriber reads from.
    pub fn new(retained_capacity: Option<usize>, channel_capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(channel_capacity);
        Self {
            retained_capacity,
            log: RwLock::new(VecDeque::new()),
            sender,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, update: Update) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        {
            let mut log = self.log.write().await;
            log.push_back(update.clone());
            if let Some(capacity) = self.retained_capacity {
                while log.len() > capacity {
                    log.pop_front();
                }
            }
        }
        // A send error only means there are currently no listeners; that is
        // not a publish failure.
        let _ = self.sender.send(TransportEvent::Update(update));
        Ok(())
    }

    async fn events_after(&self, last_event_id: Option<&str>) -> Result<Vec<Update>, TransportError> {
        let log = self.log.read().await;
        let start = match last_event_id {
            None => 0,
            Some(id) => match log.iter().position(|u| u.id() == id) {
                Some(index) => index + 1,
                None => 0,
            },
        };
        Ok(log.iter().skip(start).cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.sender.subscribe()
    }

    fn notify(&self, event: TransportEvent) {
        let _ = self.sender.send(event);
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercure_protocol::Update;

    fn update(id: &str, topic: &str) -> Update {
        Update::new(id.to_owned(), vec![topic.to_owned()], Some("payload".to_owned()), None, None, false)
    }

    #[tokio::test]
    async fn events_after_none_returns_full_log() {
        let transport = InMemoryTransport::new(None, 16);
        transport.publish(update("1", "https://ex/a")).await.unwrap();
        transport.publish(update("2", "https://ex/b")).await.unwrap();
        let events = transport.events_after(None).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn events_after_known_id_returns_suffix() {
        let transport = InMemoryTransport::new(None, 16);
        transport.publish(update("1", "https://ex/a")).await.unwrap();
        transport.publish(update("2", "https://ex/b")).await.unwrap();
        transport.publish(update("3", "https://ex/c")).await.unwrap();
        let events = transport.events_after(Some("1")).await.unwrap();
        assert_eq!(events.iter().map(Update::id).collect::<Vec<_>>(), vec!["2", "3"]);
    }

    #[tokio::test]
    async fn events_after_unknown_id_treated_as_earliest() {
        let transport = InMemoryTransport::new(None, 16);
        transport.publish(update("1", "https://ex/a")).await.unwrap();
        let events = transport.events_after(Some("does-not-exist")).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn retained_capacity_evicts_oldest() {
        let transport = InMemoryTransport::new(Some(2), 16);
        transport.publish(update("1", "https://ex/a")).await.unwrap();
        transport.publish(update("2", "https://ex/b")).await.unwrap();
        transport.publish(update("3", "https://ex/c")).await.unwrap();
        let events = transport.events_after(None).await.unwrap();
        assert_eq!(events.iter().map(Update::id).collect::<Vec<_>>(), vec!["2", "3"]);
    }

    #[tokio::test]
    async fn subscribe_receives_published_updates() {
        let transport = InMemoryTransport::new(None, 16);
        let mut receiver = transport.subscribe();
        transport.publish(update("1", "https://ex/a")).await.unwrap();
        match receiver.recv().await.unwrap() {
            TransportEvent::Update(update) => assert_eq!(update.id(), "1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_after_close_is_rejected() {
        let transport = InMemoryTransport::new(None, 16);
        transport.close().await;
        let result = transport.publish(update("1", "https://ex/a")).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
