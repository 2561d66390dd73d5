//! Plugin rendezvous hot-reload end-to-end tests.

mod common;

use std::time::{Duration, Instant};

use common::server::{SpawnOptions, TestServer};
use common::upstream_stub::UpstreamStub;
use common::HOT_RELOAD_TIMEOUT_MS;
use serde_json::{json, Value};

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn rpc(id: i64, method: &str, params: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

async fn post_rpc(server: &TestServer, body: String) -> Value {
    client()
        .post(format!("{}/mcp", server.base_url))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn listed_tool_names(server: &TestServer) -> Vec<String> {
    let body = post_rpc(server, rpc(1, "tools/list", json!({}))).await;
    body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap().to_string())
        .collect()
}

async fn wait_for_tool(server: &TestServer, name: &str, present: bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(HOT_RELOAD_TIMEOUT_MS);
    while Instant::now() < deadline {
        let names = listed_tool_names(server).await;
        if names.iter().any(|n| n == name) == present {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

fn sample_plugin_file() -> String {
    json!({
        "P": {
            "tools": [{
                "name": "t1",
                "description": "d",
                "parameters": [{"name": "x", "required": true, "type": "string"}],
                "api_endpoint": "/api/v1/plugin/P/mcp_tool_execute"
            }]
        }
    })
    .to_string()
}

#[tokio::test]
async fn hot_registered_tool_becomes_callable() {
    let stub = UpstreamStub::spawn().await;
    let server = TestServer::spawn(SpawnOptions {
        json_response: true,
        upstream_url: Some(stub.base_url.clone()),
        ..Default::default()
    })
    .await;

    std::fs::write(server.plugin_tools_path(), sample_plugin_file()).unwrap();
    assert!(
        wait_for_tool(&server, "t1", true).await,
        "t1 did not appear in tools/list"
    );

    // Missing required argument: validation failure, handler never invoked.
    let body = post_rpc(
        &server,
        rpc(2, "tools/call", json!({"name": "t1", "arguments": {}})),
    )
    .await;
    let payload: Value =
        serde_json::from_str(body["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["message"], "parameter validation failed");
    assert_eq!(payload["data"], Value::Null);
    assert!(stub.recorded_requests().is_empty());

    // Valid call: exactly one POST reaches the plugin endpoint.
    let body = post_rpc(
        &server,
        rpc(3, "tools/call", json!({"name": "t1", "arguments": {"x": "v"}})),
    )
    .await;
    let payload: Value =
        serde_json::from_str(body["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["success"], true);

    let requests = stub.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/api/v1/plugin/P/mcp_tool_execute");
    assert_eq!(
        requests[0].body,
        json!({"tool_name": "t1", "arguments": {"x": "v"}})
    );
}

#[tokio::test]
async fn removed_plugin_disappears() {
    let server = TestServer::spawn(SpawnOptions {
        json_response: true,
        ..Default::default()
    })
    .await;

    std::fs::write(server.plugin_tools_path(), sample_plugin_file()).unwrap();
    assert!(wait_for_tool(&server, "t1", true).await);

    std::fs::write(server.plugin_tools_path(), "{}").unwrap();
    assert!(
        wait_for_tool(&server, "t1", false).await,
        "t1 still listed after the plugin was removed"
    );

    // Built-ins survive the reconciliation.
    let names = listed_tool_names(&server).await;
    assert!(names.contains(&"search-media".to_string()));
}

#[tokio::test]
async fn plugin_refresh_replaces_its_tools() {
    let server = TestServer::spawn(SpawnOptions {
        json_response: true,
        ..Default::default()
    })
    .await;

    std::fs::write(server.plugin_tools_path(), sample_plugin_file()).unwrap();
    assert!(wait_for_tool(&server, "t1", true).await);

    std::fs::write(
        server.plugin_tools_path(),
        json!({"P": {"tools": [{"name": "t2", "description": "d2"}]}}).to_string(),
    )
    .unwrap();
    assert!(wait_for_tool(&server, "t2", true).await);
    let names = listed_tool_names(&server).await;
    assert!(!names.contains(&"t1".to_string()));
}

#[tokio::test]
async fn hot_registered_prompt_renders_via_plugin() {
    let stub = UpstreamStub::spawn().await;
    let server = TestServer::spawn(SpawnOptions {
        json_response: true,
        upstream_url: Some(stub.base_url.clone()),
        ..Default::default()
    })
    .await;

    std::fs::write(
        server.plugin_prompts_path(),
        json!({
            "P": {
                "prompts": [{
                    "name": "plugin-brief",
                    "description": "d",
                    "parameters": [{"name": "topic", "required": false}],
                    "api_endpoint": "/api/v1/plugin/P/mcp_prompt_execute"
                }]
            }
        })
        .to_string(),
    )
    .unwrap();

    let deadline = Instant::now() + Duration::from_millis(HOT_RELOAD_TIMEOUT_MS);
    loop {
        let body = post_rpc(&server, rpc(1, "prompts/list", json!({}))).await;
        let found = body["result"]["prompts"]
            .as_array()
            .unwrap()
            .iter()
            .any(|prompt| prompt["name"] == "plugin-brief");
        if found {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "plugin prompt never appeared in prompts/list"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let body = post_rpc(
        &server,
        rpc(
            2,
            "prompts/get",
            json!({"name": "plugin-brief", "arguments": {"topic": "x"}}),
        ),
    )
    .await;
    assert_eq!(body["result"]["description"], "stub prompt");
    assert_eq!(body["result"]["messages"][0]["content"]["text"], "from the stub");

    let requests = stub.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/api/v1/plugin/P/mcp_prompt_execute");
    assert_eq!(
        requests[0].body,
        json!({"prompt_name": "plugin-brief", "arguments": {"topic": "x"}})
    );
}
