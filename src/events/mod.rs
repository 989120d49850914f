//! Live change-event subscription
//!
//! [`EventClient`] keeps one socket open to the control plane's event stream,
//! reconnecting with capped exponential backoff, and fans each event out to
//! the handlers whose [`EventFilter`] matches it.

mod client;
mod config;
mod history;
mod state;
mod subscription;
mod types;

pub use client::{
    EVENTS_WS_PATH, EventClient, EventStream, EventTransport, WsTransport, forwardable_headers,
    subscription_url,
};
pub use config::EventsConfig;
pub use history::HistoryQuery;
pub use state::{Backoff, ConnectionState, DEFAULT_BACKOFF_CEILING, DEFAULT_BACKOFF_FLOOR};
pub use subscription::{EventFilter, EventHandler, KeyPattern, SubscriptionId, event_handler};
pub use types::{ChangeEvent, EventMetadata, Scope};
