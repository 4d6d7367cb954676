use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors that can occur while turning a raw publish form into an [`Update`].
///
/// These map 1:1 onto the `MALFORMED_REQUEST` response the hub sends back to
/// a publisher; they never reach a subscriber.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildUpdateError {
    #[error("at least one topic is required")]
    NoTopics,
    #[error("retry must be a non-negative integer")]
    InvalidRetry,
}

/// The raw, not-yet-validated contents of a publish form body. Parsing the
/// `application/x-www-form-urlencoded` body into this shape is the caller's
/// job (it needs access to the raw bytes); everything after that is pure.
#[derive(Debug, Clone, Default)]
pub struct RawPublishForm {
    pub topics: Vec<String>,
    pub data: Option<String>,
    pub id: Option<String>,
    pub kind: Option<String>,
    pub retry: Option<String>,
    pub private: bool,
}

/// Splits a raw `application/x-www-form-urlencoded` body into a
/// [`RawPublishForm`], preserving repeated `topic` fields.
///
/// `axum::Form` deserializes through `serde_urlencoded`, which collapses
/// repeated keys to their last occurrence, so a publish body with several
/// `topic=` pairs has to be parsed by hand against the raw pairs instead.
pub fn parse_publish_form(body: &[u8]) -> RawPublishForm {
    let mut form = RawPublishForm::default();
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "topic" => form.topics.push(value.into_owned()),
            "data" => form.data = Some(value.into_owned()),
            "id" => form.id = Some(value.into_owned()),
            "type" => form.kind = Some(value.into_owned()),
            "retry" => form.retry = Some(value.into_owned()),
            "private" => form.private = !value.is_empty(),
            _ => {}
        }
    }
    form
}

/// An update as fanned out to subscribers: a set of topics it is published
/// to (the first is canonical, the rest are alternates), an optional
/// payload, and the bookkeeping needed to resume a stream after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    id: String,
    topics: Vec<String>,
    data: Option<String>,
    kind: Option<String>,
    retry: Option<u64>,
    private: bool,
}

impl Update {
    /// Validates a [`RawPublishForm`] and mints an `Update`, generating a
    /// `urn:uuid:` identifier when the publisher didn't supply one.
    pub fn build(form: RawPublishForm) -> Result<Self, BuildUpdateError> {
        if form.topics.is_empty() {
            return Err(BuildUpdateError::NoTopics);
        }

        let retry = match form.retry {
            None => None,
            Some(raw) if raw.is_empty() => None,
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| BuildUpdateError::InvalidRetry)?),
        };

        let id = form
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4()));
        let private = form.private;

        Ok(Self {
            id,
            topics: form.topics,
            data: form.data,
            kind: form.kind,
            retry,
            private,
        })
    }

    /// Constructs an update directly, bypassing form parsing. Used by
    /// transport adapters replaying events they stored in their own encoding.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        topics: Vec<String>,
        data: Option<String>,
        kind: Option<String>,
        retry: Option<u64>,
        private: bool,
    ) -> Self {
        Self {
            id: id.into(),
            topics,
            data,
            kind,
            retry,
            private,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The first topic is canonical; any further topics are alternates the
    /// update is also published under.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn canonical_topic(&self) -> &str {
        &self.topics[0]
    }

    pub fn alternate_topics(&self) -> &[String] {
        &self.topics[1..]
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn retry(&self) -> Option<u64> {
        self.retry
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Renders the update as a `text/event-stream` frame: one `id:` line,
    /// one `event:` line if a type was set, one `data:` line per line of
    /// payload (an embedded newline must not merge two data lines), one
    /// `retry:` line if set, and the terminating blank line.
    pub fn to_sse_frame(&self) -> String {
        let mut frame = String::new();
        frame.push_str("id: ");
        frame.push_str(&self.id);
        frame.push('\n');

        if let Some(kind) = &self.kind {
            frame.push_str("event: ");
            frame.push_str(kind);
            frame.push('\n');
        }

        if let Some(retry) = self.retry {
            frame.push_str("retry: ");
            frame.push_str(&retry.to_string());
            frame.push('\n');
        }

        if let Some(data) = &self.data {
            for line in data.split('\n') {
                frame.push_str("data: ");
                frame.push_str(line);
                frame.push('\n');
            }
        } else {
            frame.push_str("data: \n");
        }

        frame.push('\n');
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_topic_fields() {
        let body = b"topic=https%3A%2F%2Fa.example%2Fbooks%2F1&topic=https%3A%2F%2Fa.example%2Fauthors%2F2&data=hi";
        let form = parse_publish_form(body);
        assert_eq!(
            form.topics,
            vec![
                "https://a.example/books/1".to_owned(),
                "https://a.example/authors/2".to_owned(),
            ]
        );
        assert_eq!(form.data.as_deref(), Some("hi"));
    }

    #[test]
    fn build_rejects_empty_topic_list() {
        let form = RawPublishForm::default();
        assert_eq!(Update::build(form), Err(BuildUpdateError::NoTopics));
    }

    #[test]
    fn build_mints_urn_uuid_when_absent() {
        let form = RawPublishForm {
            topics: vec!["https://a.example/books/1".to_owned()],
            ..Default::default()
        };
        let update = Update::build(form).unwrap();
        assert!(update.id().starts_with("urn:uuid:"));
    }

    #[test]
    fn build_rejects_non_numeric_retry() {
        let form = RawPublishForm {
            topics: vec!["https://a.example/books/1".to_owned()],
            retry: Some("soon".to_owned()),
            ..Default::default()
        };
        assert_eq!(Update::build(form), Err(BuildUpdateError::InvalidRetry));
    }

    #[test]
    fn sse_frame_splits_multiline_data() {
        let update = Update::new(
            "urn:uuid:1",
            vec!["https://a.example/books/1".to_owned()],
            Some("line one\nline two".to_owned()),
            None,
            None,
            false,
        );
        let frame = update.to_sse_frame();
        assert_eq!(
            frame,
            "id: urn:uuid:1\ndata: line one\ndata: line two\n\n"
        );
    }

    #[test]
    fn sse_frame_includes_event_and_retry() {
        let update = Update::new(
            "urn:uuid:2",
            vec!["https://a.example/books/1".to_owned()],
            Some("hi".to_owned()),
            Some("ping".to_owned()),
            Some(5000),
            false,
        );
        let frame = update.to_sse_frame();
        assert_eq!(frame, "id: urn:uuid:2\nevent: ping\nretry: 5000\ndata: hi\n\n");
    }
}
