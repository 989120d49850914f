//! Tool-server bridging integration tests

use agent_node::mcp::{BRIDGE_TAG, HealthStatus, McpClient};
use agent_node::{
    CallableKind, CallableOptions, DispatchRegistry, Error, Invocation, McpBridge, McpRegistry,
    McpTransport, ToolServerConfig, handler,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{echo_schema, jsonrpc_echo_server, mount_health, test_pool, unhealthy_server};

#[tokio::test]
async fn echo_tool_is_bridged_and_callable() {
    let server = jsonrpc_echo_server().await;
    let servers = McpRegistry::new();
    servers
        .register(ToolServerConfig::new("local", server.uri()), test_pool())
        .unwrap();
    let dispatch = DispatchRegistry::new();
    let bridge = McpBridge::new();

    let made = bridge.bridge(&servers, &dispatch).await;
    assert_eq!(made.len(), 1);
    assert_eq!(made[0].skill_name, "local_echo");
    assert_eq!(made[0].server, "local");
    assert_eq!(made[0].tool, "echo");

    let callable = dispatch.get("local_echo").expect("bridged skill registered");
    assert_eq!(callable.kind(), CallableKind::Skill);
    assert_eq!(callable.options().tags, vec![BRIDGE_TAG, "local"]);
    assert_eq!(callable.options().input_schema, Some(echo_schema()));
    assert_eq!(
        callable.options().description.as_deref(),
        Some("Echo a message back")
    );

    let out = dispatch
        .invoke("local_echo", Invocation::new(json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(
        out,
        json!({
            "status": "success",
            "result": { "echoed": "hi" },
            "server": "local",
            "tool": "echo"
        })
    );
}

#[tokio::test]
async fn second_pass_registers_nothing() {
    let server = jsonrpc_echo_server().await;
    let servers = McpRegistry::new();
    servers
        .register(ToolServerConfig::new("local", server.uri()), test_pool())
        .unwrap();
    let dispatch = DispatchRegistry::new();
    let bridge = McpBridge::new().with_tags(["remote"]);

    assert_eq!(bridge.bridge(&servers, &dispatch).await.len(), 1);
    assert!(bridge.bridge(&servers, &dispatch).await.is_empty());
    assert_eq!(dispatch.len(), 1);
    assert_eq!(bridge.bridged_names(), vec!["local_echo"]);
    assert_eq!(
        dispatch.get("local_echo").unwrap().options().tags,
        vec!["mcp", "local", "remote"]
    );
}

#[tokio::test]
async fn existing_names_are_never_overwritten() {
    let server = jsonrpc_echo_server().await;
    let servers = McpRegistry::new();
    servers
        .register(ToolServerConfig::new("local", server.uri()), test_pool())
        .unwrap();
    let dispatch = DispatchRegistry::new();
    dispatch
        .register_skill(
            "local_echo",
            handler(|_| async { Ok(json!("direct")) }),
            CallableOptions::new(),
        )
        .unwrap();

    assert!(McpBridge::new().bridge(&servers, &dispatch).await.is_empty());
    let out = dispatch
        .invoke("local_echo", Invocation::new(json!({ "message": "hi" })))
        .await
        .unwrap();
    assert_eq!(out, json!("direct"));
}

#[tokio::test]
async fn rest_dialect_lists_and_calls_with_headers() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/mcp/tools/list"))
        .and(header("x-api-key", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tools": [
                { "name": "web-search", "input_schema": { "type": "object" } },
                { "description": "nameless entries are skipped" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp/tools/call"))
        .and(header("x-api-key", "k"))
        .and(body_partial_json(json!({
            "tool_name": "web-search",
            "arguments": { "q": "rust" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": 3 })))
        .expect(1)
        .mount(&server)
        .await;

    let servers = McpRegistry::new();
    servers
        .register(
            ToolServerConfig::new("web", server.uri())
                .with_transport(McpTransport::BridgeRest)
                .with_header("x-api-key", "k"),
            test_pool(),
        )
        .unwrap();
    let dispatch = DispatchRegistry::new();

    let made = McpBridge::new()
        .with_namespace("team")
        .bridge(&servers, &dispatch)
        .await;
    assert_eq!(made.len(), 1);
    assert_eq!(made[0].skill_name, "team_web_websearch");

    let out = dispatch
        .invoke("team_web_websearch", Invocation::new(json!({ "q": "rust" })))
        .await
        .unwrap();
    assert_eq!(out["result"], json!({ "hits": 3 }));
    assert_eq!(out["tool"], "web-search");
}

#[tokio::test]
async fn unhealthy_servers_are_skipped() {
    let healthy = jsonrpc_echo_server().await;
    let unhealthy = unhealthy_server().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&unhealthy)
        .await;

    let pool = test_pool();
    let servers = McpRegistry::new();
    servers
        .register(ToolServerConfig::new("up", healthy.uri()), pool.clone())
        .unwrap();
    servers
        .register(ToolServerConfig::new("down", unhealthy.uri()), pool)
        .unwrap();
    let dispatch = DispatchRegistry::new();

    let made = McpBridge::new().verbose(true).bridge(&servers, &dispatch).await;
    assert_eq!(made.len(), 1);
    assert_eq!(made[0].server, "up");

    let status = servers.status_list();
    assert_eq!(status[0].last_health.map(|h| h.healthy), Some(true));
    assert_eq!(status[0].tool_count, 1);
    assert_eq!(status[1].last_health.map(|h| h.healthy), Some(false));
}

#[tokio::test]
async fn invocation_failures_reach_the_caller() {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/mcp/v1"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "tools": [{ "name": "explode" }] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp/v1"))
        .and(body_partial_json(json!({ "method": "tools/call" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": { "code": -32000, "message": "tool exploded" }
        })))
        .mount(&server)
        .await;

    let servers = McpRegistry::new();
    servers
        .register(ToolServerConfig::new("risky", server.uri()), test_pool())
        .unwrap();
    let dispatch = DispatchRegistry::new();
    McpBridge::new().bridge(&servers, &dispatch).await;

    let err = dispatch
        .invoke("risky_explode", Invocation::new(json!({})))
        .await
        .unwrap_err();
    match err {
        Error::JsonRpc { code, message } => {
            assert_eq!(code, -32000);
            assert_eq!(message, "tool exploded");
        }
        other => panic!("expected json-rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn non_success_status_is_a_tool_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp/v1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = McpClient::new(ToolServerConfig::new("flaky", server.uri()), test_pool()).unwrap();
    assert!(client.list_tools().await.is_empty());
    assert!(matches!(
        client.call_tool("anything", json!({})).await,
        Err(Error::Tool(_))
    ));
}

#[tokio::test]
async fn health_summary_aggregates() {
    let pool = test_pool();

    let empty = McpRegistry::new();
    assert_eq!(empty.health_summary().await.status, HealthStatus::Disabled);

    let a = jsonrpc_echo_server().await;
    let b = jsonrpc_echo_server().await;
    let c = unhealthy_server().await;

    let all_up = McpRegistry::new();
    all_up
        .register(ToolServerConfig::new("a", a.uri()), pool.clone())
        .unwrap();
    all_up
        .register(ToolServerConfig::new("b", b.uri()), pool.clone())
        .unwrap();
    assert_eq!(all_up.health_summary().await.status, HealthStatus::Ok);

    let mixed = McpRegistry::new();
    for (alias, server) in [("a", &a), ("b", &b), ("c", &c)] {
        mixed
            .register(ToolServerConfig::new(alias, server.uri()), pool.clone())
            .unwrap();
    }
    let summary = mixed.health_summary().await;
    assert_eq!(summary.status, HealthStatus::Degraded);
    assert_eq!((summary.total, summary.healthy), (3, 2));
    assert_eq!(summary.servers.get("c"), Some(&false));
}
