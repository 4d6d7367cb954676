use std::collections::HashSet;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{self, Stream, StreamExt};
use mercure_auth::{authorize, check_origin, Authorization, Role};
use mercure_protocol::{HubError, TopicSelector, Update};
use mercure_transport::{Hub, TransportEvent};

use crate::state::AppState;
use crate::subscriber::{Subscriber, SubscriberState, Subscription};

const LAST_EVENT_ID_HEADER: &str = "last-event-id";

fn parse_query(query: &str) -> (Vec<String>, Option<String>) {
    let mut topics = Vec::new();
    let mut last_event_id = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "topic" => topics.push(value.into_owned()),
            "lastEventId" | "last-event-id" => last_event_id = Some(value.into_owned()),
            _ => {}
        }
    }
    (topics, last_event_id)
}

/// `GET /.well-known/mercure`: authorizes the subscriber, opens an SSE
/// stream, replays any backlog since `Last-Event-ID`, then joins the live
/// broadcast — registering the live listener before replay starts so
/// nothing published mid-replay is lost.
pub async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, HubError> {
    check_origin(&headers, state.config.allowed_origins.as_deref())
        .map_err(|e| HubError::Forbidden(e.to_string()))?;

    let query = raw_query.unwrap_or_default();
    let (raw_topics, query_last_event_id) = parse_query(&query);

    if raw_topics.is_empty() {
        return Err(HubError::MalformedRequest(
            "at least one topic parameter is required".to_owned(),
        ));
    }

    let authorization = authorize(
        &state.verifier,
        Role::Subscriber,
        &headers,
        &query,
        state.config.allow_query_authorization,
        &state.config.cookie_name,
        state.config.public_url.as_ref(),
    )
    .await;

    let (authorized_topics, payload) = match authorization {
        Authorization::Granted(ctx) => (ctx.authorized_topics, ctx.payload),
        Authorization::MissingToken => {
            if state.config.anonymous_access {
                (Vec::new(), None)
            } else {
                return Err(HubError::AuthRequired);
            }
        }
        Authorization::Invalid(e) => return Err(HubError::Forbidden(e.to_string())),
    };

    let mut subscriptions = Vec::with_capacity(raw_topics.len());
    for raw in &raw_topics {
        let selector = TopicSelector::compile(raw, state.config.public_url.as_ref())
            .map_err(|e| HubError::MalformedRequest(e.to_string()))?;
        subscriptions.push(Subscription::new(selector));
    }

    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or(query_last_event_id);

    let mut subscriber = Subscriber::new(authorized_topics, payload, subscriptions, last_event_id.clone());
    let subscriber_id = subscriber.id.clone();
    let state_handle = subscriber.state.clone();

    // Register the live listener before replaying the backlog so nothing
    // published while we're replaying is ever missed.
    let listener = state.hub.on();

    let anonymous_access = state.config.anonymous_access;
    let replay: Vec<Update> = match &last_event_id {
        Some(id) => match state.hub.events_after(Some(id)).await {
            Ok(updates) => updates
                .into_iter()
                .filter(|u| subscriber.can_access(u.topics(), u.is_private(), anonymous_access))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "replay failed, subscriber joins live stream only");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let subscribed_topics: Vec<String> = subscriber
        .subscriptions
        .iter()
        .map(|sub| sub.selector.raw().to_owned())
        .collect();
    for topic in &subscribed_topics {
        state.hub.emit(TransportEvent::Subscribe {
            subscriber_id: subscriber_id.clone(),
            topic: topic.clone(),
        });
    }
    state.hub.emit(TransportEvent::Connect {
        subscriber_id: subscriber_id.clone(),
    });

    let replayed_ids: HashSet<String> = replay.iter().map(|u| u.id().to_owned()).collect();
    let replay_frames = replay.iter().map(sse_event).collect::<Vec<_>>();
    if let Some(last_replayed) = replay.last() {
        subscriber.record_dispatch(last_replayed.id());
    }

    let live_stream = stream::unfold(
        (listener, subscriber, replayed_ids),
        move |(mut listener, mut subscriber, mut seen)| async move {
            loop {
                match listener.recv().await {
                    Ok(TransportEvent::Update(update)) => {
                        if seen.contains(update.id()) {
                            continue;
                        }
                        if !subscriber.can_access(update.topics(), update.is_private(), anonymous_access) {
                            continue;
                        }
                        seen.insert(update.id().to_owned());
                        subscriber.record_dispatch(update.id());
                        let event = sse_event(&update);
                        return Some((event, (listener, subscriber, seen)));
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Disconnect-on-overflow: end the stream so the
                        // client reconnects with Last-Event-ID and gets a
                        // well-defined replay instead of a silent gap.
                        return None;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
                }
            }
        },
    );

    let combined = stream::iter(replay_frames)
        .chain(live_stream)
        .map(Ok::<_, Infallible>);
    let combined = DisconnectOnDrop {
        inner: combined,
        hub: state.hub.clone(),
        subscriber_id: Some(subscriber_id),
        topics: subscribed_topics,
        state: state_handle.clone(),
    };

    let keep_alive = match state.config.heartbeat_interval {
        Some(interval) => KeepAlive::new().interval(interval).text("ping"),
        None => KeepAlive::new().interval(Duration::from_secs(3600)),
    };

    let mut response = Sse::new(combined).keep_alive(keep_alive).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response_headers.insert(
        header::HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    if let Some(last_event_id) = &last_event_id {
        if let Ok(value) = HeaderValue::from_str(last_event_id) {
            response_headers.insert(header::HeaderName::from_static("last-event-id"), value);
        }
    }

    // The response head is about to be written; the subscriber is live
    // from here on.
    state_handle.set(SubscriberState::Active);

    Ok(response)
}

/// Fires `disconnect` once the SSE body stream is dropped, whether that's
/// because the client went away or the stream ran dry.
struct DisconnectOnDrop<S> {
    inner: S,
    hub: Hub,
    subscriber_id: Option<String>,
    topics: Vec<String>,
    state: crate::subscriber::SubscriberStateHandle,
}

impl<S: Stream + Unpin> Stream for DisconnectOnDrop<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for DisconnectOnDrop<S> {
    fn drop(&mut self) {
        if let Some(subscriber_id) = self.subscriber_id.take() {
            self.state.set(SubscriberState::Closing);
            for topic in self.topics.drain(..) {
                self.hub.emit(TransportEvent::Unsubscribe {
                    subscriber_id: subscriber_id.clone(),
                    topic,
                });
            }
            self.hub.emit(TransportEvent::Disconnect { subscriber_id });
            self.state.set(SubscriberState::Closed);
        }
    }
}

fn sse_event(update: &Update) -> Event {
    let mut event = Event::default().id(update.id());
    if let Some(kind) = update.kind() {
        event = event.event(kind);
    }
    if let Some(retry_ms) = update.retry() {
        event = event.retry(Duration::from_millis(retry_ms));
    }
    event.data(update.data().unwrap_or(""))
}
