//! CDP error types.

use thiserror::Error;

use crawlset_core::DriverError;

/// CDP client errors.
#[derive(Debug, Error)]
pub enum CdpError {
    /// Failed to connect to Chrome.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Chrome not running with remote debugging on the expected port.
    #[error("Chrome not available at {0}. Start Chrome with: chrome --remote-debugging-port=9222")]
    ChromeNotAvailable(String),

    #[error("Chrome not found. Please install Google Chrome or Chromium.")]
    ChromeNotFound,

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// CDP protocol error.
    #[error("CDP error: {message} (code: {code})")]
    Protocol { code: i64, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error (for endpoint discovery).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Navigation failed.
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// A page script threw.
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// Timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Session closed.
    #[error("Session closed")]
    SessionClosed,

    /// Invalid response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdpError {
    /// Whether the browser reported that a remote object or node is gone.
    pub fn is_stale(&self) -> bool {
        match self {
            CdpError::Protocol { message, .. } => {
                message.contains("Could not find object with given id")
                    || message.contains("Cannot find context with specified id")
                    || message.contains("No node with given id")
                    || message.contains("Node with given id does not belong to the document")
            }
            _ => false,
        }
    }

    /// Whether a thrown script error came from an unparsable selector.
    pub fn is_selector_error(&self) -> bool {
        match self {
            CdpError::JavaScript(message) => {
                message.contains("is not a valid selector") || message.starts_with("SyntaxError")
            }
            _ => false,
        }
    }

    /// Convert for a call that evaluated `selector`.
    pub fn into_driver_error_for(self, selector: &str) -> DriverError {
        if self.is_selector_error() {
            let message = match self {
                CdpError::JavaScript(message) => message,
                other => other.to_string(),
            };
            return DriverError::InvalidSelector {
                selector: selector.to_string(),
                message,
            };
        }
        self.into()
    }
}

impl From<CdpError> for DriverError {
    fn from(e: CdpError) -> Self {
        if e.is_stale() {
            return DriverError::StaleHandle(e.to_string());
        }
        match e {
            CdpError::NavigationFailed(msg) => DriverError::Navigation(msg),
            CdpError::JavaScript(msg) => DriverError::Interaction(msg),
            CdpError::Timeout(msg) => DriverError::Timeout(msg),
            CdpError::SessionClosed | CdpError::WebSocket(_) => DriverError::Closed,
            CdpError::Io(err) => DriverError::Io(err),
            other => DriverError::Protocol(other.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        CdpError::WebSocket(e.to_string())
    }
}

impl From<reqwest::Error> for CdpError {
    fn from(e: reqwest::Error) -> Self {
        CdpError::Http(e.to_string())
    }
}

impl From<url::ParseError> for CdpError {
    fn from(e: url::ParseError) -> Self {
        CdpError::ConnectionFailed(format!("Invalid URL: {}", e))
    }
}
