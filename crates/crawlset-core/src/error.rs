//! Error types for the crawl core.

use thiserror::Error;

/// Errors reported by a browser driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The browser rejected a selector as syntactically invalid.
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    /// The handle no longer refers to a live node.
    #[error("Stale element handle: {0}")]
    StaleHandle(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Browser session closed")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Deep query errors.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error(transparent)]
    Driver(DriverError),
}

impl QueryError {
    pub fn is_selector(&self) -> bool {
        matches!(self, QueryError::Selector { .. })
    }
}

impl From<DriverError> for QueryError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::InvalidSelector { selector, message } => {
                QueryError::Selector { selector, message }
            }
            other => QueryError::Driver(other),
        }
    }
}

/// Errors from a single capture cycle or target.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Dataset serialization errors.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to write dataset to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that end a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid crawl setup: {0}")]
    Setup(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}
