use std::time::Duration;

use mercure_test_utils::{issue_token, SseClient, TestHub, TestHubOptions};

async fn open_subscription(base_url: &str, topics: &[&str], token: Option<&str>) -> SseClient {
    let mut url = reqwest::Url::parse(base_url).unwrap();
    for topic in topics {
        url.query_pairs_mut().append_pair("topic", topic);
    }
    let mut request = reqwest::Client::new().get(url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.unwrap();
    assert_eq!(response.status(), 200, "subscribe must succeed");
    SseClient::new(response)
}

async fn publish(base_url: &str, token: &str, topic: &str, data: &str, id: Option<&str>) -> reqwest::Response {
    let mut form = vec![("topic", topic.to_owned()), ("data", data.to_owned())];
    if let Some(id) = id {
        form.push(("id", id.to_owned()));
    }
    reqwest::Client::new()
        .post(base_url)
        .bearer_auth(token)
        .form(&form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn anonymous_subscriber_receives_public_update_on_wildcard() {
    let hub = TestHub::start(TestHubOptions {
        anonymous_access: true,
        ..Default::default()
    })
    .await;
    let mut client = open_subscription(&hub.base_url, &["*"], None).await;

    let publisher_token = issue_token(&hub.secret, &["*"], &[]);
    publish(&hub.base_url, &publisher_token, "https://example.com/books/1", "hello", None).await;

    let frame = tokio::time::timeout(Duration::from_secs(5), client.next_frame())
        .await
        .expect("frame within timeout")
        .expect("a frame arrives");
    assert_eq!(frame.data, "hello");
}

#[tokio::test]
async fn private_update_reaches_only_an_authorized_subscriber() {
    let hub = TestHub::start(TestHubOptions::default()).await;

    let topic = "https://example.com/books/1";
    let authorized_token = issue_token(&hub.secret, &[], &[topic]);
    let mut authorized = open_subscription(&hub.base_url, &[topic], Some(&authorized_token)).await;

    let unauthorized_token = issue_token(&hub.secret, &[], &["https://example.com/books/2"]);
    let mut unauthorized = open_subscription(&hub.base_url, &["https://example.com/books/2"], Some(&unauthorized_token)).await;

    let publisher_token = issue_token(&hub.secret, &[topic], &[]);
    let form = vec![("topic", topic.to_owned()), ("data", "secret".to_owned()), ("private", "on".to_owned())];
    let response = reqwest::Client::new()
        .post(&hub.base_url)
        .bearer_auth(&publisher_token)
        .form(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let frame = tokio::time::timeout(Duration::from_secs(5), authorized.next_frame())
        .await
        .expect("frame within timeout")
        .expect("authorized subscriber receives the private update");
    assert_eq!(frame.data, "secret");

    let raced = tokio::time::timeout(Duration::from_millis(300), unauthorized.next_frame()).await;
    assert!(raced.is_err(), "unauthorized subscriber must not receive the private update");
}

#[tokio::test]
async fn resuming_from_last_event_id_replays_only_the_missed_backlog() {
    let hub = TestHub::start(TestHubOptions {
        anonymous_access: true,
        ..Default::default()
    })
    .await;
    let publisher_token = issue_token(&hub.secret, &["*"], &[]);

    let first = publish(&hub.base_url, &publisher_token, "https://example.com/books/1", "one", Some("urn:uuid:first")).await;
    assert_eq!(first.status(), 200);
    let second = publish(&hub.base_url, &publisher_token, "https://example.com/books/1", "two", Some("urn:uuid:second")).await;
    assert_eq!(second.status(), 200);

    let url = reqwest::Url::parse_with_params(&hub.base_url, &[("topic", "*")]).unwrap();
    let response = reqwest::Client::new()
        .get(url)
        .header("Last-Event-ID", "urn:uuid:first")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let mut client = SseClient::new(response);

    let frame = tokio::time::timeout(Duration::from_secs(5), client.next_frame())
        .await
        .expect("frame within timeout")
        .expect("the update after the cursor replays");
    assert_eq!(frame.data, "two");
}

#[tokio::test]
async fn template_topic_selector_matches_concrete_uri() {
    let hub = TestHub::start(TestHubOptions {
        anonymous_access: true,
        ..Default::default()
    })
    .await;
    let mut client = open_subscription(&hub.base_url, &["https://example.com/books/{id}"], None).await;

    let publisher_token = issue_token(&hub.secret, &["*"], &[]);
    publish(&hub.base_url, &publisher_token, "https://example.com/books/42", "matched", None).await;

    let frame = tokio::time::timeout(Duration::from_secs(5), client.next_frame())
        .await
        .expect("frame within timeout")
        .expect("template selector matches the concrete topic");
    assert_eq!(frame.data, "matched");
}

#[tokio::test]
async fn publish_outside_granted_selectors_is_forbidden() {
    let hub = TestHub::start(TestHubOptions::default()).await;
    let publisher_token = issue_token(&hub.secret, &["https://example.com/books/1"], &[]);

    let response = publish(&hub.base_url, &publisher_token, "https://example.com/other", "x", None).await;
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn publish_without_a_token_is_unauthorized() {
    let hub = TestHub::start(TestHubOptions::default()).await;

    let response = reqwest::Client::new()
        .post(&hub.base_url)
        .form(&[("topic", "https://example.com/books/1"), ("data", "x")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn subscribe_without_a_topic_parameter_is_malformed() {
    let hub = TestHub::start(TestHubOptions {
        anonymous_access: true,
        ..Default::default()
    })
    .await;

    let response = reqwest::Client::new().get(&hub.base_url).send().await.unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MALFORMED_REQUEST");
}

#[tokio::test]
async fn publish_with_an_unsupported_content_type_is_rejected() {
    let hub = TestHub::start(TestHubOptions::default()).await;
    let publisher_token = issue_token(&hub.secret, &["*"], &[]);

    let response = reqwest::Client::new()
        .post(&hub.base_url)
        .bearer_auth(&publisher_token)
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 415);
}
