//! SSE transport end-to-end tests.

mod common;

use std::time::Duration;

use common::server::{SpawnOptions, TestServer};
use serde_json::{json, Value};

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Accumulate SSE body text until `predicate` matches or the timeout fires.
async fn read_sse(response: &mut reqwest::Response, predicate: impl Fn(&str) -> bool) -> String {
    let mut buffer = String::new();
    loop {
        if predicate(&buffer) {
            return buffer;
        }
        match tokio::time::timeout(Duration::from_secs(5), response.chunk()).await {
            Ok(Ok(Some(chunk))) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
            _ => return buffer,
        }
    }
}

fn extract_session_id(endpoint_event: &str) -> String {
    let marker = "session_id=";
    let start = endpoint_event.find(marker).expect("no session_id in endpoint event") + marker.len();
    endpoint_event[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit() || *c == '-')
        .collect()
}

#[tokio::test]
async fn sse_channel_announces_endpoint_and_carries_responses() {
    let server = TestServer::spawn(SpawnOptions::default()).await;

    let mut stream_response = client()
        .get(format!("{}/sse", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(stream_response.status(), 200);

    // First event names the companion POST endpoint.
    let raw = read_sse(&mut stream_response, |buffer| {
        buffer.contains("event: endpoint") && buffer.contains("\n\n")
    })
    .await;
    assert!(raw.contains("/sse/messages/?session_id="));
    let session_id = extract_session_id(&raw);
    assert!(!session_id.is_empty());

    // Client→server JSON-RPC goes to the POST companion.
    let post_response = client()
        .post(format!(
            "{}/sse/messages/?session_id={}",
            server.base_url, session_id
        ))
        .header("content-type", "application/json")
        .body(
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}).to_string(),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(post_response.status(), 202);

    // The response arrives on the open channel.
    let raw = read_sse(&mut stream_response, |buffer| {
        buffer.contains("serverInfo") && buffer.ends_with("\n\n")
    })
    .await;
    let data_line = raw
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .find(|line| line.contains("serverInfo"))
        .expect("no response event on the SSE channel");
    let message: Value = serde_json::from_str(data_line.trim()).unwrap();
    assert_eq!(message["id"], 1);
    assert_eq!(message["result"]["serverInfo"]["name"], "mcp-bridge");
}

#[tokio::test]
async fn post_to_unknown_sse_session_is_not_found() {
    let server = TestServer::spawn(SpawnOptions::default()).await;

    let response = client()
        .post(format!(
            "{}/sse/messages/?session_id=does-not-exist",
            server.base_url
        ))
        .header("content-type", "application/json")
        .body(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn post_without_session_id_is_bad_request() {
    let server = TestServer::spawn(SpawnOptions::default()).await;

    let response = client()
        .post(format!("{}/sse/messages/", server.base_url))
        .header("content-type", "application/json")
        .body(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn sse_notifications_are_accepted_silently() {
    let server = TestServer::spawn(SpawnOptions::default()).await;

    let mut stream_response = client()
        .get(format!("{}/sse", server.base_url))
        .send()
        .await
        .unwrap();
    let raw = read_sse(&mut stream_response, |buffer| buffer.contains("\n\n")).await;
    let session_id = extract_session_id(&raw);

    let response = client()
        .post(format!(
            "{}/sse/messages/?session_id={}",
            server.base_url, session_id
        ))
        .header("content-type", "application/json")
        .body(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
}
