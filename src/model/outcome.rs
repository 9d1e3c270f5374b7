use chrono::{DateTime, Utc};

use super::FetchError;

/// Rate-limit metadata observed on a completed response.
///
/// Built from the `X-RateLimit-Remaining` / `X-RateLimit-Reset` headers.
/// When the remaining header is absent the whole observation is absent and
/// prior bookkeeping is left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaObservation {
    /// Remaining calls allowed before the quota resets.
    pub remaining: i64,

    /// The time at which the quota resets, when reported.
    pub reset_at: Option<DateTime<Utc>>,
}

impl QuotaObservation {
    /// Creates a new `QuotaObservation` with the given remaining count and reset time.
    pub fn new(remaining: i64, reset_at: Option<DateTime<Utc>>) -> Self {
        Self { remaining, reset_at }
    }
}

/// The classified result of a single fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The call completed with a well-formed JSON body.
    Success {
        /// The decoded response body.
        body: serde_json::Value,
        /// Rate-limit metadata, when the response carried it.
        quota: Option<QuotaObservation>,
    },

    /// The resource does not exist: a valid negative answer, not a failure.
    NotFound {
        /// Rate-limit metadata, when the response carried it.
        quota: Option<QuotaObservation>,
    },

    /// A transient failure worth retrying.
    Retryable(FetchError),
}

/// The terminal result of one logical call, as seen by the caller.
#[derive(Debug)]
pub enum Outcome {
    /// The resource was fetched and decoded.
    Success(serde_json::Value),

    /// The resource does not exist.
    NotFound,

    /// The call failed after exhausting its retry budget; the caller may skip
    /// this resource and continue.
    RetryableFailure(String),

    /// The run cannot safely continue (circuit breaker, interruption, or
    /// exhausted credentials with no known reset).
    FatalStop(String),
}

impl Outcome {
    /// Whether this outcome is a `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}
