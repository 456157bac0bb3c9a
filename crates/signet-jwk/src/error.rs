//! Registry error taxonomy

use thiserror::Error;

/// Result type alias for key-set registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors surfaced by the fetch pipeline and the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The URL was never registered with `configure`
    #[error("url {url} must be configured before it can be fetched")]
    UrlNotConfigured {
        /// The unregistered URL
        url: String,
    },

    /// Transport failure or non-2xx response while fetching a key set
    #[error("key set fetch failed: {reason}")]
    FetchFailed {
        /// What went wrong on the wire
        reason: String,
    },

    /// The response body was not a parseable key set
    #[error("key set parse failed: {reason}")]
    ParseFailed {
        /// Why the body was rejected
        reason: String,
    },

    /// The caller's wait was cancelled
    #[error("operation cancelled")]
    Cancelled,
}
