use std::sync::{Arc, Mutex};

use mercure_protocol::TopicSelector;
use uuid::Uuid;

/// A subscriber's connection lifecycle. `Opening` until the SSE response
/// head has been written, `Active` while streaming, `Closing` once a
/// cancellation/overflow has been observed but cleanup hasn't finished,
/// `Closed` once the stream and its subscriptions are torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Opening,
    Active,
    Closing,
    Closed,
}

/// A cheaply-cloned handle onto a subscriber's lifecycle state, so the
/// handler can flip it to `Active` once the response head is written and
/// the stream's teardown path (client abort, overflow, shutdown) can flip
/// it through `Closing` to `Closed` without owning the `Subscriber` itself.
#[derive(Debug, Clone)]
pub struct SubscriberStateHandle(Arc<Mutex<SubscriberState>>);

impl SubscriberStateHandle {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(SubscriberState::Opening)))
    }

    pub fn set(&self, state: SubscriberState) {
        *self.0.lock().expect("subscriber state mutex poisoned") = state;
    }

    pub fn get(&self) -> SubscriberState {
        *self.0.lock().expect("subscriber state mutex poisoned")
    }
}

/// One `topic` query parameter resolved into a compiled selector. A
/// subscriber owns one `Subscription` per `topic` it connected with.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub selector: TopicSelector,
}

impl Subscription {
    pub fn new(selector: TopicSelector) -> Self {
        Self {
            id: format!("urn:uuid:{}", Uuid::new_v4()),
            selector,
        }
    }
}

/// A connected subscriber: its authorization, its subscriptions, and its
/// lifecycle state. The SSE writer and heartbeat timer it owns live in the
/// handler's task, not here — this struct is the bookkeeping the handler
/// consults to decide whether and what to deliver.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: String,
    pub state: SubscriberStateHandle,
    pub authorized_topics: Vec<TopicSelector>,
    pub payload: Option<serde_json::Value>,
    pub subscriptions: Vec<Subscription>,
    pub last_event_id: Option<String>,
}

impl Subscriber {
    pub fn new(
        authorized_topics: Vec<TopicSelector>,
        payload: Option<serde_json::Value>,
        subscriptions: Vec<Subscription>,
        last_event_id: Option<String>,
    ) -> Self {
        Self {
            id: format!("urn:uuid:{}", Uuid::new_v4()),
            state: SubscriberStateHandle::new(),
            authorized_topics,
            payload,
            subscriptions,
            last_event_id,
        }
    }

    /// Records the id of the update just written to this subscriber's
    /// stream, per the spec's "record lastEventId before each write".
    pub fn record_dispatch(&mut self, id: &str) {
        self.last_event_id = Some(id.to_owned());
    }

    /// Whether this subscriber may see an update published to `topics`,
    /// which is `public`/`private` as given. Per the hub's access
    /// invariant: if anonymous access is disabled and this subscriber has
    /// no authorized (token-granted) selectors at all, it receives
    /// nothing, full stop. Otherwise: at least one subscription selector
    /// must cover one of the update's topics, and the update must either
    /// be public or covered by one of the subscriber's authorized
    /// selectors.
    pub fn can_access(&self, topics: &[String], private: bool, anonymous_access: bool) -> bool {
        if !anonymous_access && self.authorized_topics.is_empty() {
            return false;
        }

        let subscribed = self
            .subscriptions
            .iter()
            .any(|sub| topics.iter().any(|topic| sub.selector.matches(topic)));
        if !subscribed {
            return false;
        }
        if !private {
            return true;
        }
        self.authorized_topics
            .iter()
            .any(|selector| topics.iter().any(|topic| selector.matches(topic)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(raw: &str) -> TopicSelector {
        TopicSelector::compile(raw, None).unwrap()
    }

    #[test]
    fn public_update_visible_with_matching_subscription_only() {
        let subscriber = Subscriber::new(
            vec![],
            None,
            vec![Subscription::new(selector("*"))],
            None,
        );
        assert!(subscriber.can_access(&["https://ex/a".to_owned()], false, true));
    }

    #[test]
    fn private_update_requires_authorized_topic() {
        let subscriber = Subscriber::new(
            vec![],
            None,
            vec![Subscription::new(selector("*"))],
            None,
        );
        assert!(!subscriber.can_access(&["https://ex/a".to_owned()], true, true));
    }

    #[test]
    fn private_update_visible_when_authorized() {
        let subscriber = Subscriber::new(
            vec![selector("https://ex/{id}")],
            None,
            vec![Subscription::new(selector("*"))],
            None,
        );
        assert!(subscriber.can_access(&["https://ex/42".to_owned()], true, true));
    }

    #[test]
    fn update_outside_subscription_is_never_visible() {
        let subscriber = Subscriber::new(
            vec![selector("*")],
            None,
            vec![Subscription::new(selector("https://ex/other"))],
            None,
        );
        assert!(!subscriber.can_access(&["https://ex/a".to_owned()], false, true));
    }

    #[test]
    fn unauthorized_subscriber_sees_nothing_when_anonymous_access_disabled() {
        let subscriber = Subscriber::new(
            vec![],
            None,
            vec![Subscription::new(selector("*"))],
            None,
        );
        assert!(!subscriber.can_access(&["https://ex/a".to_owned()], false, false));
    }

    #[test]
    fn authorized_subscriber_unaffected_by_anonymous_access_flag() {
        let subscriber = Subscriber::new(
            vec![selector("*")],
            None,
            vec![Subscription::new(selector("*"))],
            None,
        );
        assert!(subscriber.can_access(&["https://ex/a".to_owned()], false, false));
        assert!(subscriber.can_access(&["https://ex/a".to_owned()], true, false));
    }
}
