use regal_client::{RegalClient, RegalError};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn posts_event_with_raw_key() {
    let server = MockServer::start().await;
    let event = json!({
        "traits": { "email": "a@example.com" },
        "name": "Campaign Engagement Update",
        "properties": { "total_opens": 1 },
        "eventSource": "MailChimp"
    });

    Mock::given(method("POST"))
        .and(path("/events"))
        .and(header("Authorization", "regal-key"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(&event))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = RegalClient::new(&format!("{}/events", server.uri()), "regal-key".into()).unwrap();
    let body = client.send_event(&event).await.unwrap();

    assert_eq!(body, "ok");
}

#[tokio::test]
async fn non_success_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = RegalClient::new(&format!("{}/events", server.uri()), "regal-key".into()).unwrap();
    let err = client.send_event(&json!({})).await.unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert!(matches!(err, RegalError::Api { ref message, .. } if message == "slow down"));
}

#[tokio::test]
async fn unreachable_sink_is_network_error() {
    // Port 9 (discard) on localhost is not listening in test environments.
    let client = RegalClient::new("http://127.0.0.1:9/events", "regal-key".into()).unwrap();
    let err = client.send_event(&json!({})).await.unwrap_err();

    assert!(matches!(err, RegalError::Network(_)));
    assert_eq!(err.status(), None);
}
