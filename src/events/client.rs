//! Resilient WebSocket client for the live event stream
//!
//! One socket at a time. Every `connect` tears down the previous socket and
//! any pending reconnect timer and bumps a generation counter, so a stale
//! socket task can never schedule a second reconnect chain.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::{Mutex, RwLock};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

use super::config::EventsConfig;
use super::history::{HistoryQuery, fetch_history};
use super::state::{Backoff, ConnectionState};
use super::subscription::{EventFilter, EventHandler, Subscription, SubscriptionId};
use super::types::{ChangeEvent, Scope};
use crate::pool::ConnectionPool;
use crate::{Error, Result};

/// Subscription endpoint, relative to the control-plane base URL
pub const EVENTS_WS_PATH: &str = "/api/v1/memory/events/ws";

/// Text frames from an open socket; the stream ends when the socket closes
pub type EventStream = BoxStream<'static, Result<String>>;

/// Opens event sockets
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Open a socket to `url` sending `headers` with the handshake
    async fn open(&self, url: &str, headers: &[(String, String)]) -> Result<EventStream>;
}

/// [`EventTransport`] over `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl EventTransport for WsTransport {
    async fn open(&self, url: &str, headers: &[(String, String)]) -> Result<EventStream> {
        let mut request = url.into_client_request()?;
        for (name, value) in headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Transport(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Transport(format!("invalid value for header {name}: {e}")))?;
            request.headers_mut().insert(header, value);
        }

        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => String::from_utf8(bytes).ok().map(Ok),
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            }
        });
        Ok(frames.boxed())
    }
}

#[derive(Debug, Default)]
struct Machine {
    state: ConnectionState,
    backoff: Backoff,
    generation: u64,
    socket: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

/// Aborts a handler task when the dispatch that spawned it is dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Inner {
    base_url: String,
    ws_url: String,
    headers: Vec<(String, String)>,
    transport: Arc<dyn EventTransport>,
    handler_timeout: Duration,
    subscriptions: RwLock<Vec<Subscription>>,
    next_subscription: AtomicU64,
    machine: Mutex<Machine>,
}

/// Auto-reconnecting subscriber to the control plane's change events
///
/// Handlers run one after another, in subscription order, for each event.
/// A handler that fails, panics or exceeds the handler timeout is logged and
/// skipped. Call [`Self::stop`] to end the subscription; dropping the client
/// does not.
#[derive(Clone)]
pub struct EventClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for EventClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventClient")
            .field("url", &self.inner.ws_url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl EventClient {
    /// Create a client for the control plane at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid config or base URL
    pub fn new(
        base_url: &str,
        config: &EventsConfig,
        transport: Arc<dyn EventTransport>,
    ) -> Result<Self> {
        config.validate()?;
        let ws_url = subscription_url(
            base_url,
            &config.patterns,
            config.scope,
            config.scope_id.as_deref(),
        )?;
        let machine = Machine {
            backoff: Backoff::new(config.backoff_floor(), config.backoff_ceiling()),
            ..Machine::default()
        };
        Ok(Self {
            inner: Arc::new(Inner {
                base_url: base_url.trim_end_matches('/').to_string(),
                ws_url,
                headers: forwardable_headers(&config.headers),
                transport,
                handler_timeout: config.handler_timeout(),
                subscriptions: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                machine: Mutex::new(machine),
            }),
        })
    }

    /// Create a client that speaks WebSocket
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid config or base URL
    pub fn websocket(base_url: &str, config: &EventsConfig) -> Result<Self> {
        Self::new(base_url, config, Arc::new(WsTransport))
    }

    /// Subscription URL, including filter query parameters
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.ws_url
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.machine.lock().state
    }

    #[must_use]
    pub fn is_reconnect_pending(&self) -> bool {
        self.inner.machine.lock().timer.is_some()
    }

    /// Register a handler for events matching `filter`
    pub fn subscribe(&self, filter: EventFilter, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner.subscriptions.write().push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    /// Remove a handler; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn unsubscribe_all(&self) {
        self.inner.subscriptions.write().clear();
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Connect unless a socket already exists; no-op after [`Self::stop`]
    pub fn start(&self) {
        if self.inner.machine.lock().socket.is_some() {
            return;
        }
        self.inner.connect();
    }

    /// Replace the current socket with a fresh one, cancelling any pending reconnect
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Stop for good: cancel the reconnect timer and kill the socket
    ///
    /// A handler still running for the socket is aborted with it. Idempotent;
    /// safe to call mid-handshake.
    pub fn stop(&self) {
        let mut machine = self.inner.machine.lock();
        if machine.state != ConnectionState::Closed {
            tracing::info!(url = %self.inner.ws_url, "event stream stopped");
        }
        machine.state = ConnectionState::Closed;
        if let Some(timer) = machine.timer.take() {
            timer.abort();
        }
        if let Some(socket) = machine.socket.take() {
            socket.abort();
        }
    }

    /// Fetch past events through the connection pool
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-2xx response
    pub async fn history(
        &self,
        pool: &ConnectionPool,
        query: &HistoryQuery,
    ) -> Result<Vec<ChangeEvent>> {
        fetch_history(pool, &self.inner.base_url, &self.inner.headers, query).await
    }
}

impl Inner {
    fn connect(self: &Arc<Self>) {
        let mut machine = self.machine.lock();
        if machine.state == ConnectionState::Closed {
            return;
        }
        if let Some(socket) = machine.socket.take() {
            socket.abort();
        }
        if let Some(timer) = machine.timer.take() {
            timer.abort();
        }
        machine.generation += 1;
        machine.state = ConnectionState::Connecting;

        let generation = machine.generation;
        let inner = Arc::clone(self);
        machine.socket = Some(tokio::spawn(async move {
            inner.run_socket(generation).await;
        }));
    }

    async fn run_socket(self: Arc<Self>, generation: u64) {
        tracing::debug!(url = %self.ws_url, generation, "opening event stream");
        match self.transport.open(&self.ws_url, &self.headers).await {
            Ok(mut frames) => {
                if self.on_open(generation) {
                    while let Some(frame) = frames.next().await {
                        match frame {
                            Ok(text) => self.dispatch(&text).await,
                            Err(e) => {
                                tracing::warn!(error = %e, "event stream error");
                                break;
                            }
                        }
                    }
                    tracing::debug!(generation, "event stream closed");
                }
            }
            Err(e) => tracing::warn!(url = %self.ws_url, error = %e, "event stream connect failed"),
        }
        self.on_disconnect(generation);
    }

    fn on_open(&self, generation: u64) -> bool {
        let mut machine = self.machine.lock();
        if machine.generation != generation || machine.state == ConnectionState::Closed {
            return false;
        }
        machine.state = ConnectionState::Open;
        machine.backoff.reset();
        tracing::info!(url = %self.ws_url, "event stream connected");
        true
    }

    /// Close and error both land here; at most one reconnect is ever pending
    fn on_disconnect(self: &Arc<Self>, generation: u64) {
        let mut machine = self.machine.lock();
        if machine.state == ConnectionState::Closed || machine.generation != generation {
            return;
        }
        if machine.timer.is_some() {
            return;
        }
        // Dropping the handle detaches; this may be the socket task itself
        machine.socket = None;
        machine.state = ConnectionState::BackoffWait;

        let delay = machine.backoff.next_delay();
        tracing::debug!(delay = ?delay, "event stream reconnect scheduled");
        let inner = Arc::clone(self);
        machine.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.machine.lock().timer = None;
            inner.connect();
        }));
    }

    async fn dispatch(&self, text: &str) {
        let event: ChangeEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed event frame");
                return;
            }
        };
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.filter.matches(&event))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in handlers {
            let mut task = tokio::spawn(handler(event.clone()));
            let _guard = AbortOnDrop(task.abort_handle());
            match tokio::time::timeout(self.handler_timeout, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    tracing::warn!(key = %event.key, error = %e, "event handler failed");
                }
                Ok(Err(e)) => {
                    tracing::warn!(key = %event.key, error = %e, "event handler panicked");
                }
                Err(_) => {
                    tracing::warn!(
                        key = %event.key,
                        timeout = ?self.handler_timeout,
                        "event handler timed out"
                    );
                }
            }
        }
    }
}

/// Build the subscription URL: `http` becomes `ws`, `https` becomes `wss`
///
/// # Errors
///
/// Returns `Error::Config` if `base_url` is not an http(s) or ws(s) URL
pub fn subscription_url(
    base_url: &str,
    patterns: &[String],
    scope: Option<Scope>,
    scope_id: Option<&str>,
) -> Result<String> {
    let mut url = url::Url::parse(base_url)
        .map_err(|e| Error::Config(format!("invalid event stream base url {base_url:?}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::Config(format!(
                "unsupported event stream scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::Config(format!("cannot use {scheme} for {base_url}")))?;

    let path = format!("{}{EVENTS_WS_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);

    if !patterns.is_empty() || scope.is_some() || scope_id.is_some() {
        let mut query = url.query_pairs_mut();
        if !patterns.is_empty() {
            query.append_pair("patterns", &patterns.join(","));
        }
        if let Some(scope) = scope {
            query.append_pair("scope", scope.as_str());
        }
        if let Some(scope_id) = scope_id {
            query.append_pair("scope_id", scope_id);
        }
    }
    Ok(url.into())
}

/// Headers allowed on the socket handshake: `authorization`, `cookie` and `x-*`
#[must_use]
pub fn forwardable_headers(headers: &BTreeMap<String, String>) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            let allowed = name == "authorization" || name == "cookie" || name.starts_with("x-");
            allowed.then(|| (name, value.clone()))
        })
        .collect()
}
