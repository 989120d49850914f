//! Error types for the agent node runtime

use thiserror::Error;

/// Result type alias for agent node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the agent node runtime
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Callable name is empty or not a valid identifier
    #[error("invalid callable name: {0:?}")]
    InvalidName(String),

    /// Callable or resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Remote tool invocation failed
    #[error("tool error: {0}")]
    Tool(String),

    /// JSON-RPC error object returned by a tool server
    #[error("json-rpc error {code}: {message}")]
    JsonRpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message reported by the server
        message: String,
    },

    /// Identity registration error
    #[error("identity error: {0}")]
    Identity(String),

    /// Credential generation error
    #[error("credential error: {0}")]
    Credential(String),

    /// Event stream transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Handler returned an error
    #[error("handler error: {0}")]
    Handler(String),

    /// Operation exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}
