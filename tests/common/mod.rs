//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;

use agent_node::{ConnectionPool, PoolConfig};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Build an isolated connection pool
#[must_use]
pub fn test_pool() -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(PoolConfig::default()).expect("failed to build test pool"))
}

/// Answers `tools/call` by echoing `arguments.message` as `{"echoed": ...}`
pub struct EchoTool;

impl Respond for EchoTool {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": { "echoed": body["params"]["arguments"]["message"] }
        }))
    }
}

/// Schema advertised by the echo tool
#[must_use]
pub fn echo_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "message": { "type": "string" } },
        "required": ["message"]
    })
}

/// Mount a passing `GET /health`
pub async fn mount_health(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Start a healthy JSON-RPC tool server exposing `echo`
pub async fn jsonrpc_echo_server() -> MockServer {
    let server = MockServer::start().await;
    mount_health(&server, 200).await;

    Mock::given(method("POST"))
        .and(path("/mcp/v1"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "tools": [{
                    "name": "echo",
                    "description": "Echo a message back",
                    "inputSchema": echo_schema()
                }]
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp/v1"))
        .and(body_partial_json(json!({ "method": "tools/call" })))
        .respond_with(EchoTool)
        .mount(&server)
        .await;

    server
}

/// Start a server whose health check fails
pub async fn unhealthy_server() -> MockServer {
    let server = MockServer::start().await;
    mount_health(&server, 503).await;
    server
}

/// Identity package as the control plane returns it
#[must_use]
pub fn identity_package() -> Value {
    json!({
        "agent_did": {
            "did": "did:agent:123",
            "private_key_jwk": "priv",
            "public_key_jwk": "pub",
            "derivation_path": "m/0",
            "component_type": "agent"
        },
        "bot_dids": {
            "bot_a": { "did": "did:bot:a", "component_type": "bot" }
        },
        "skill_dids": {
            "skill_b": { "did": "did:skill:b", "component_type": "skill" }
        },
        "playground_server_id": "server-1"
    })
}
