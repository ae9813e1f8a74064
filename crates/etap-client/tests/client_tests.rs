// SPDX-License-Identifier: MIT OR Apache-2.0
//! Client requests against a mocked control plane.

use etap_client::{ClientError, EtapClient};
use etap_core::TapOptions;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options() -> TapOptions {
    TapOptions {
        name: "orders".into(),
        code: "function mapEvents(b) { return b; }".into(),
        webhook_url: "http://hook.local/in".into(),
        batch_limit: 100,
    }
}

async fn client(server: &MockServer) -> EtapClient {
    EtapClient::new(&server.uri()).unwrap()
}

#[tokio::test]
async fn create_posts_options_and_returns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/taps"))
        .and(body_json(json!({
            "name": "orders",
            "code": "function mapEvents(b) { return b; }",
            "webhook_url": "http://hook.local/in",
            "batch_limit": 100
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "tap-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server).await.create(&options()).await.unwrap();
    assert_eq!(id, "tap-1");
}

#[tokio::test]
async fn create_surfaces_the_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/taps"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(
                json!({"error": "invalid tap definition: name must not be empty"}),
            ),
        )
        .mount(&server)
        .await;

    match client(&server).await.create(&options()).await {
        Err(ClientError::Status { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid tap definition: name must not be empty");
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn plain_text_errors_are_kept_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/taps"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway\n"))
        .mount(&server)
        .await;

    let err = client(&server).await.create(&options()).await.unwrap_err();
    assert_eq!(err.to_string(), "unexpected status 502: bad gateway");
}

#[tokio::test]
async fn list_follows_cursors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/taps"))
        .and(query_param_is_missing("cursor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                {"id": "a", "name": "A", "webhook_url": "http://h/a"},
                {"id": "b", "name": "B", "webhook_url": "http://h/b"}
            ],
            "cursor": "b"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/taps"))
        .and(query_param("cursor", "b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [{"id": "c", "name": "C", "webhook_url": "http://h/c"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = client(&server).await.list().await.unwrap();
    let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

#[tokio::test]
async fn list_stops_when_the_cursor_does_not_advance() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/taps"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [{"id": "a", "name": "A", "webhook_url": "http://h/a"}],
            "cursor": "a"
        })))
        .mount(&server)
        .await;

    let entries = client(&server).await.list().await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn get_maps_404_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/taps/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "tap missing not found"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/taps/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t1", "name": "orders", "webhook_url": "http://h/", "batch_limit": 5,
            "checkpoint": "00000000000000000009", "running": true
        })))
        .mount(&server)
        .await;

    let c = client(&server).await;
    assert!(c.get("missing").await.unwrap().is_none());
    let d = c.get("t1").await.unwrap().unwrap();
    assert_eq!(d.batch_limit, 5);
    assert_eq!(d.checkpoint.as_deref(), Some("00000000000000000009"));
    assert!(d.status.is_none());
}

#[tokio::test]
async fn delete_maps_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/taps/t1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/taps/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/taps/broken"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "storage error: disk full"})),
        )
        .mount(&server)
        .await;

    let c = client(&server).await;
    c.delete("t1").await.unwrap();
    assert!(matches!(c.delete("gone").await, Err(ClientError::NotFound(id)) if id == "gone"));
    assert!(matches!(
        c.delete("broken").await,
        Err(ClientError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let c = EtapClient::new("http://127.0.0.1:9").unwrap();
    assert!(matches!(c.list().await, Err(ClientError::Http(_))));
}
