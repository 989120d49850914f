//! Event stream against a real WebSocket server

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use agent_node::events::{ConnectionState, HistoryQuery};
use agent_node::{ChangeEvent, EventClient, EventFilter, EventsConfig, Scope, event_handler};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::routing::get;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::test_pool;

struct Handshake {
    headers: HeaderMap,
    query: Option<String>,
}

#[derive(Clone)]
struct StreamServer {
    frames: Vec<String>,
    hold_open: bool,
    seen: Arc<Mutex<Vec<Handshake>>>,
}

async fn stream(
    State(server): State<StreamServer>,
    headers: HeaderMap,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Response {
    server.seen.lock().push(Handshake {
        headers,
        query: uri.query().map(str::to_string),
    });
    ws.on_upgrade(move |mut socket| async move {
        for frame in server.frames {
            if socket.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        if server.hold_open {
            while let Some(Ok(_)) = socket.recv().await {}
        }
    })
}

/// Serve the event stream on an ephemeral port; returns the base URL
async fn serve(server: StreamServer) -> String {
    let app = Router::new()
        .route("/api/v1/memory/events/ws", get(stream))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

fn frame(key: &str, scope: &str, scope_id: &str) -> String {
    json!({ "key": key, "data": { "n": 1 }, "scope": scope, "scope_id": scope_id }).to_string()
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChangeEvent>) -> ChangeEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .expect("channel open")
}

#[tokio::test]
async fn matching_events_reach_handlers_with_forwarded_headers() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let base = serve(StreamServer {
        frames: vec![
            frame("cart.items", "session", "s-1"),
            "not json".to_string(),
            frame("profile.name", "session", "s-1"),
            frame("cart.total", "session", "s-2"),
            frame("cart.total", "session", "s-1"),
        ],
        hold_open: true,
        seen: Arc::clone(&seen),
    })
    .await;

    let config = EventsConfig {
        patterns: vec!["cart.*".to_string()],
        scope: Some(Scope::Session),
        scope_id: Some("s-1".to_string()),
        headers: BTreeMap::from([
            ("Authorization".to_string(), "Bearer t".to_string()),
            ("X-Trace-Id".to_string(), "abc".to_string()),
            ("Accept-Language".to_string(), "fr".to_string()),
        ]),
        ..EventsConfig::default()
    };
    let client = EventClient::websocket(&base, &config).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe(
        EventFilter::patterns(["cart.*"])
            .unwrap()
            .in_scope(Scope::Session, Some("s-1".to_string())),
        event_handler(move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
                Ok(())
            }
        }),
    );
    client.subscribe(
        EventFilter::all(),
        event_handler(|_| async { Err(agent_node::Error::Handler("always fails".to_string())) }),
    );

    client.start();

    let first = next_event(&mut rx).await;
    assert_eq!(first.key, "cart.items");
    let second = next_event(&mut rx).await;
    assert_eq!(second.key, "cart.total");
    assert_eq!(second.scope_id.as_deref(), Some("s-1"));
    assert_eq!(client.state(), ConnectionState::Open);

    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        let handshake = &seen[0];
        assert_eq!(handshake.headers["authorization"], "Bearer t");
        assert_eq!(handshake.headers["x-trace-id"], "abc");
        assert!(!handshake.headers.contains_key("accept-language"));
        let query = handshake.query.as_deref().unwrap_or_default();
        assert!(query.contains("patterns=cart.*"));
        assert!(query.contains("scope=session"));
        assert!(query.contains("scope_id=s-1"));
    }

    client.stop();
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn closed_streams_are_reopened() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let base = serve(StreamServer {
        frames: vec![frame("jobs.done", "global", "")],
        hold_open: false,
        seen: Arc::clone(&seen),
    })
    .await;

    let config = EventsConfig {
        backoff_floor_ms: 50,
        backoff_ceiling_ms: 200,
        ..EventsConfig::default()
    };
    let client = EventClient::websocket(&base, &config).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.subscribe(
        EventFilter::all(),
        event_handler(move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
                Ok(())
            }
        }),
    );
    client.start();

    for _ in 0..3 {
        assert_eq!(next_event(&mut rx).await.key, "jobs.done");
    }
    assert!(seen.lock().len() >= 3);

    client.stop();
    client.start();
    assert_eq!(client.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let connections = seen.lock().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(seen.lock().len(), connections);
}

#[tokio::test]
async fn history_is_fetched_with_filters_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/memory/events/history"))
        .and(query_param("patterns", "cart.*"))
        .and(query_param("scope", "workflow"))
        .and(query_param("limit", "5"))
        .and(header("authorization", "Bearer t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                { "key": "cart.items", "data": [1, 2], "scope": "workflow", "agent_id": "a-1" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = EventsConfig {
        headers: BTreeMap::from([("authorization".to_string(), "Bearer t".to_string())]),
        ..EventsConfig::default()
    };
    let client = EventClient::websocket(&server.uri(), &config).unwrap();
    let events = client
        .history(
            &test_pool(),
            &HistoryQuery {
                patterns: vec!["cart.*".to_string()],
                scope: Some(Scope::Workflow),
                limit: Some(5),
                ..HistoryQuery::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, "cart.items");
    assert_eq!(events[0].data, json!([1, 2]));
    assert_eq!(events[0].source_id.as_deref(), Some("a-1"));
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn history_failures_are_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/memory/events/history"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = EventClient::websocket(&server.uri(), &EventsConfig::default()).unwrap();
    assert!(
        client
            .history(&test_pool(), &HistoryQuery::default())
            .await
            .is_err()
    );
}
