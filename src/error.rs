use reqwest::StatusCode;
use thiserror::Error;

/// Error types for the engagement client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response with the server-provided message
    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Not authenticated: no access token stored")]
    MissingToken,

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Not connected to session channel")]
    NotConnected,

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Local storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Session orchestration errors
    #[error("No current session")]
    NoCurrentSession,

    /// Video engine errors
    #[error("Video engine error: {0}")]
    Video(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Convenience type alias for Results using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Helper to create WebSocket errors
    pub fn websocket(msg: impl Into<String>) -> Self {
        ClientError::WebSocket(msg.into())
    }

    /// Helper to create storage errors
    pub fn storage(msg: impl Into<String>) -> Self {
        ClientError::Storage(msg.into())
    }

    pub fn video(msg: impl Into<String>) -> Self {
        ClientError::Video(msg.into())
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::MissingToken)
            || self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// Message suitable for showing to a user; API errors yield the server text only
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}
