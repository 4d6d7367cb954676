use mercure_protocol::Update;

/// The lifecycle events the transport's listener registry dispatches,
/// mirroring mercure.rocks's internal event bus (`update`, `connect`,
/// `disconnect`, `subscribe`, `unsubscribe`).
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Update(Update),
    Connect { subscriber_id: String },
    Disconnect { subscriber_id: String },
    Subscribe { subscriber_id: String, topic: String },
    Unsubscribe { subscriber_id: String, topic: String },
}
