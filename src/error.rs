//! Error types for threadslapper.

use thiserror::Error;

/// Common error type for threadslapper.
#[derive(Error, Debug)]
pub enum SlapperError {
    /// Invalid or incomplete configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The fetched feed could not be turned into an episode snapshot.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Fetching or parsing a feed document failed.
    #[error("feed fetch error: {0}")]
    Fetch(String),

    /// Creating a thread, post or announcement failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// The messaging platform rejected a request or could not be reached.
    #[error("platform error: {0}")]
    Platform(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for threadslapper operations.
pub type Result<T> = std::result::Result<T, SlapperError>;
