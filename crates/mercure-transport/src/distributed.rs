use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use mercure_protocol::Update;

use crate::event::TransportEvent;
use crate::transport::{Transport, TransportError};

const PAYLOAD_FIELD: &str = "payload";
const SUBSCRIBER_ID_FIELD: &str = "subscriber_id";
const TOPIC_FIELD: &str = "topic";

const LIFECYCLE_STREAMS: &[&str] = &["connect", "disconnect", "subscribe", "unsubscribe"];

fn backend_err(e: redis::RedisError) -> TransportError {
    TransportError::Backend(e.to_string())
}

fn stream_key_for(base: &str, suffix: &str) -> String {
    format!("{base}:{suffix}")
}

/// Transport backed by Redis streams, for hubs that fan out across more
/// than one process. Mirrors the stream-store adapter's contract of one
/// stream per event type ("update", "connect", "disconnect", "subscribe",
/// "unsubscribe"): `publish` appends `{id, serialized-payload}` entries to
/// the update stream; `notify` appends to the matching lifecycle stream.
/// A background reader per stream reads with `XREAD BLOCK` starting from
/// `$` (new entries only) and re-dispatches each entry to the local
/// listener registry — including the publishing instance's own listeners,
/// so every instance (not just the one that observed the event) learns
/// about it the same way.
pub struct RedisStreamTransport {
    connection: ConnectionManager,
    stream_key: String,
    sender: broadcast::Sender<TransportEvent>,
    closed: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl RedisStreamTransport {
    pub async fn connect(
        redis_url: &str,
        stream_key: impl Into<String>,
        channel_capacity: usize,
    ) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url).map_err(backend_err)?;
        let connection = ConnectionManager::new(client).await.map_err(backend_err)?;
        let stream_key = stream_key.into();
        let (sender, _receiver) = broadcast::channel(channel_capacity);
        let closed = Arc::new(AtomicBool::new(false));

        let mut readers = vec![spawn_update_reader(
            connection.clone(),
            stream_key.clone(),
            sender.clone(),
            closed.clone(),
        )];
        for kind in LIFECYCLE_STREAMS {
            readers.push(spawn_lifecycle_reader(
                connection.clone(),
                stream_key_for(&stream_key, kind),
                kind,
                sender.clone(),
                closed.clone(),
            ));
        }

        Ok(Self {
            connection,
            stream_key,
            sender,
            closed,
            readers,
        })
    }
}

fn spawn_update_reader(
    mut connection: ConnectionManager,
    stream_key: String,
    sender: broadcast::Sender<TransportEvent>,
    closed: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor = "$".to_owned();
        loop {
            if closed.load(Ordering::Acquire) {
                return;
            }

            let opts = redis::streams::StreamReadOptions::default().block(5_000);
            let result: Result<redis::streams::StreamReadReply, redis::RedisError> = connection
                .xread_options(&[&stream_key], &[&cursor], &opts)
                .await;

            match result {
                Ok(reply) => {
                    for key in reply.keys {
                        for entry in key.ids {
                            cursor = entry.id.clone();
                            if let Some(update) = decode_update_entry(&entry) {
                                let _ = sender.send(TransportEvent::Update(update));
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transient error reading update stream, retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    })
}

/// Same read-and-redispatch loop as [`spawn_update_reader`], but for one of
/// the lifecycle streams, decoding `subscriber_id`/`topic` fields instead of
/// a serialized `Update`.
fn spawn_lifecycle_reader(
    mut connection: ConnectionManager,
    stream_key: String,
    kind: &'static str,
    sender: broadcast::Sender<TransportEvent>,
    closed: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor = "$".to_owned();
        loop {
            if closed.load(Ordering::Acquire) {
                return;
            }

            let opts = redis::streams::StreamReadOptions::default().block(5_000);
            let result: Result<redis::streams::StreamReadReply, redis::RedisError> = connection
                .xread_options(&[&stream_key], &[&cursor], &opts)
                .await;

            match result {
                Ok(reply) => {
                    for key in reply.keys {
                        for entry in key.ids {
                            cursor = entry.id.clone();
                            if let Some(event) = decode_lifecycle_entry(kind, &entry) {
                                let _ = sender.send(event);
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, stream = kind, "transient error reading lifecycle stream, retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    })
}

fn decode_update_entry(entry: &redis::streams::StreamId) -> Option<Update> {
    let payload: String = entry.get(PAYLOAD_FIELD)?;
    serde_json::from_str(&payload).ok()
}

fn decode_lifecycle_entry(kind: &str, entry: &redis::streams::StreamId) -> Option<TransportEvent> {
    let subscriber_id: String = entry.get(SUBSCRIBER_ID_FIELD)?;
    match kind {
        "connect" => Some(TransportEvent::Connect { subscriber_id }),
        "disconnect" => Some(TransportEvent::Disconnect { subscriber_id }),
        "subscribe" => Some(TransportEvent::Subscribe {
            subscriber_id,
            topic: entry.get(TOPIC_FIELD)?,
        }),
        "unsubscribe" => Some(TransportEvent::Unsubscribe {
            subscriber_id,
            topic: entry.get(TOPIC_FIELD)?,
        }),
        _ => None,
    }
}

/// The stream suffix and field list to replicate `event` under, or `None`
/// for `Update` (which goes through `publish`'s own "update" stream).
fn lifecycle_fields(event: &TransportEvent) -> Option<(&'static str, Vec<(&'static str, String)>)> {
    match event {
        TransportEvent::Update(_) => None,
        TransportEvent::Connect { subscriber_id } => {
            Some(("connect", vec![(SUBSCRIBER_ID_FIELD, subscriber_id.clone())]))
        }
        TransportEvent::Disconnect { subscriber_id } => {
            Some(("disconnect", vec![(SUBSCRIBER_ID_FIELD, subscriber_id.clone())]))
        }
        TransportEvent::Subscribe { subscriber_id, topic } => Some((
            "subscribe",
            vec![
                (SUBSCRIBER_ID_FIELD, subscriber_id.clone()),
                (TOPIC_FIELD, topic.clone()),
            ],
        )),
        TransportEvent::Unsubscribe { subscriber_id, topic } => Some((
            "unsubscribe",
            vec![
                (SUBSCRIBER_ID_FIELD, subscriber_id.clone()),
                (TOPIC_FIELD, topic.clone()),
            ],
        )),
    }
}

#[async_trait]
impl Transport for RedisStreamTransport {
    async fn publish(&self, update: Update) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let payload = serde_json::to_string(&update).map_err(|e| TransportError::Backend(e.to_string()))?;
        let mut connection = self.connection.clone();
        let _: String = connection
            .xadd(&self.stream_key, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn events_after(&self, last_event_id: Option<&str>) -> Result<Vec<Update>, TransportError> {
        let mut connection = self.connection.clone();
        let entries: Vec<redis::streams::StreamId> = connection
            .xrange_all(&self.stream_key)
            .await
            .map_err(backend_err)?;

        let updates: Vec<Update> = entries.iter().filter_map(decode_update_entry).collect();
        let start = match last_event_id {
            None => 0,
            Some(id) => match updates.iter().position(|update| update.id() == id) {
                Some(index) => index + 1,
                None => 0,
            },
        };
        Ok(updates.into_iter().skip(start).collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.sender.subscribe()
    }

    /// Replicates the lifecycle event to every hub instance sharing this
    /// transport by appending it to its stream; the local dispatch happens
    /// when this instance's own reader picks the entry back up, the same
    /// round trip every other instance goes through.
    fn notify(&self, event: TransportEvent) {
        let Some((kind, fields)) = lifecycle_fields(&event) else {
            return;
        };
        let stream_key = stream_key_for(&self.stream_key, kind);
        let mut connection = self.connection.clone();
        tokio::spawn(async move {
            let result: Result<String, redis::RedisError> = connection.xadd(&stream_key, "*", &fields).await;
            if let Err(e) = result {
                tracing::warn!(error = %e, stream = kind, "failed to replicate lifecycle event");
            }
        });
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for reader in &self.readers {
            reader.abort();
        }
    }
}
