use thiserror::Error;

/// The standard result type used throughout the application.
pub type StdResult<T> = Result<T, anyhow::Error>;

/// A classified failure of a single fetch attempt.
///
/// Every variant is retryable from the caller's point of view; the split
/// exists so that logs and tests can tell transport problems apart from
/// unexpected statuses and undecodable bodies.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network error (DNS failure, connection reset, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with an unexpected HTTP status.
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// The response body could not be decoded as JSON.
    #[error("Malformed response body: {0}")]
    MalformedBody(String),
}
