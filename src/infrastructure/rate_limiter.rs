use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::warn;
use tokio::time::sleep;

use crate::{Credential, CredentialPool};

/// The buffer added to every rate-limit wait to absorb clock skew between
/// this host and the service.
pub const RATE_LIMIT_WAIT_BUFFER: Duration = Duration::from_secs(1);

/// The verdict of a rate-limit wait.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitDecision {
    /// The caller may proceed, after any wait that was needed.
    Proceed,

    /// The required wait exceeds the configured cap; the caller should stop
    /// instead of sleeping that long.
    CapExceeded(Duration),

    /// Every credential is exhausted and none has ever reported a reset
    /// time, so no wait can be estimated.
    UnknownReset,
}

/// Translates credential pool state into blocking waits.
pub struct RateLimiter {
    /// The pool whose bookkeeping drives the waits.
    pool: Arc<CredentialPool>,

    /// Buffer added to each wait to absorb clock skew.
    buffer: Duration,

    /// Upper bound on a single wait, `None` for unbounded.
    max_wait: Option<Duration>,
}

impl RateLimiter {
    /// Creates a new `RateLimiter` over the given pool.
    pub fn new(pool: Arc<CredentialPool>, buffer: Duration, max_wait: Option<Duration>) -> Self {
        Self {
            pool,
            buffer,
            max_wait,
        }
    }

    /// Blocks until `credential`'s quota resets, when it is exhausted with a
    /// reset time still in the future.
    pub async fn wait_if_needed(&self, credential: &Credential) -> WaitDecision {
        let Some(status) = self.pool.status_of(credential).await else {
            return WaitDecision::Proceed;
        };
        if status.remaining > 0 {
            return WaitDecision::Proceed;
        }
        let now = Utc::now();
        let Some(reset_at) = status.reset_at else {
            return WaitDecision::Proceed;
        };
        if reset_at <= now {
            return WaitDecision::Proceed;
        }

        let wait = (reset_at - now).to_std().unwrap_or_default() + self.buffer;
        if self.exceeds_cap(wait) {
            warn!("Credential {credential} rate limited for {wait:?}, above the wait cap");
            return WaitDecision::CapExceeded(wait);
        }
        warn!("Credential {credential} rate limited, waiting {wait:?}");
        sleep(wait).await;

        WaitDecision::Proceed
    }

    /// Blocks until the earliest reset across the pool when every credential
    /// is exhausted; refuses when no reset time was ever reported.
    pub async fn wait_for_pool_reset(&self) -> WaitDecision {
        let Some(reset_at) = self.pool.earliest_reset().await else {
            return WaitDecision::UnknownReset;
        };

        let wait = (reset_at - Utc::now()).to_std().unwrap_or_default() + self.buffer;
        if self.exceeds_cap(wait) {
            warn!("All credentials rate limited for {wait:?}, above the wait cap");
            return WaitDecision::CapExceeded(wait);
        }
        warn!("All credentials rate limited, waiting {wait:?} until the earliest reset");
        sleep(wait).await;

        WaitDecision::Proceed
    }

    fn exceeds_cap(&self, wait: Duration) -> bool {
        self.max_wait.is_some_and(|max_wait| wait > max_wait)
    }
}
