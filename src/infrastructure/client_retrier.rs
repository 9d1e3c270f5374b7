use std::{sync::Arc, time::Duration};

use log::{debug, error, warn};
use tokio::{sync::RwLock, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    ApiClient, Credential, CredentialPool, CredentialReport, FetchOutcome, Outcome,
    QuotaObservation, RateLimiter, ResourceFetcher, WaitDecision,
};

/// Consecutive retryable failures, across all credentials and calls, after
/// which the circuit breaker trips and the whole run is stopped.
pub const CONSECUTIVE_FAILURE_LIMIT: u32 = 5;

/// The default number of attempts for one logical call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The default base delay for exponential backoff.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// A client that drives each logical call to a terminal [`Outcome`], rotating
/// credentials and applying exponential backoff with a consecutive-failure
/// circuit breaker.
///
/// The circuit-breaker counter is distinct from the per-credential failure
/// counters kept by the pool: it spans credentials and logical calls, and only
/// a completed exchange resets it.
pub struct RetryingClient {
    /// The fetcher performing single attempts.
    fetcher: Arc<dyn ResourceFetcher>,

    /// The credential pool.
    pool: Arc<CredentialPool>,

    /// The rate limiter translating pool state into waits.
    rate_limiter: RateLimiter,

    /// The maximum number of attempts for one logical call.
    max_retries: u32,

    /// The base delay for exponential backoff.
    base_delay: Duration,

    /// Consecutive retryable failures since the last completed exchange.
    consecutive_failures: RwLock<u32>,

    /// The cancellation signal observed at every await point.
    cancellation: CancellationToken,
}

impl RetryingClient {
    /// Creates a new `RetryingClient` instance.
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        pool: Arc<CredentialPool>,
        rate_limiter: RateLimiter,
        max_retries: u32,
        base_delay: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            pool,
            rate_limiter,
            max_retries,
            base_delay,
            consecutive_failures: RwLock::new(0),
            cancellation,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.min(31))
    }

    /// Picks the credential for the next attempt, honouring a still-eligible
    /// hint on the first use.
    async fn select_credential(&self, hint: &mut Option<Credential>) -> Option<Credential> {
        match hint.take() {
            Some(hinted) if self.pool.is_eligible(&hinted).await => Some(hinted),
            _ => self.pool.select_best().await,
        }
    }

    /// Records a completed exchange: pool bookkeeping for the credential used
    /// and a reset of the circuit-breaker counter.
    async fn complete_exchange(
        &self,
        credential: Option<&Credential>,
        quota: Option<&QuotaObservation>,
    ) {
        if let Some(credential) = credential {
            self.pool.record_success(credential, quota).await;
        }
        let mut failures = self.consecutive_failures.write().await;
        *failures = 0;
    }

    async fn register_failure(&self) -> u32 {
        let mut failures = self.consecutive_failures.write().await;
        *failures += 1;

        *failures
    }

    fn interrupted(&self, url: &str) -> Outcome {
        warn!("Interrupted by user while fetching {url}");

        Outcome::FatalStop("interrupted by user".to_string())
    }

    fn fatal(&self, url: &str, reason: String) -> Outcome {
        error!("Stopping at {url}: {reason}");

        Outcome::FatalStop(reason)
    }
}

#[async_trait::async_trait]
impl ApiClient for RetryingClient {
    /// Executes one logical call: select a credential, wait out rate limits,
    /// send, and evaluate, retrying with backoff until a terminal outcome.
    async fn execute<'a>(&self, url: &str, credential_hint: Option<&'a Credential>) -> Outcome {
        let mut attempt = 0;
        let mut hint = credential_hint.cloned();

        loop {
            if self.cancellation.is_cancelled() {
                return self.interrupted(url);
            }

            let credential = if self.pool.is_empty() {
                None
            } else {
                match self.select_credential(&mut hint).await {
                    Some(credential) => Some(credential),
                    None => {
                        let decision = tokio::select! {
                            _ = self.cancellation.cancelled() => return self.interrupted(url),
                            decision = self.rate_limiter.wait_for_pool_reset() => decision,
                        };
                        match decision {
                            WaitDecision::Proceed => continue,
                            WaitDecision::CapExceeded(wait) => {
                                return self.fatal(
                                    url,
                                    format!("required rate limit wait of {wait:?} exceeds the cap"),
                                );
                            }
                            WaitDecision::UnknownReset => {
                                return self.fatal(
                                    url,
                                    "all credentials exhausted with unknown reset times".to_string(),
                                );
                            }
                        }
                    }
                }
            };

            if let Some(credential) = &credential {
                let decision = tokio::select! {
                    _ = self.cancellation.cancelled() => return self.interrupted(url),
                    decision = self.rate_limiter.wait_if_needed(credential) => decision,
                };
                if let WaitDecision::CapExceeded(wait) = decision {
                    return self.fatal(
                        url,
                        format!("required rate limit wait of {wait:?} exceeds the cap"),
                    );
                }
            }

            let outcome = tokio::select! {
                _ = self.cancellation.cancelled() => return self.interrupted(url),
                outcome = self.fetcher.fetch(url, credential.as_ref()) => outcome,
            };

            match outcome {
                FetchOutcome::Success { body, quota } => {
                    self.complete_exchange(credential.as_ref(), quota.as_ref()).await;
                    return Outcome::Success(body);
                }
                FetchOutcome::NotFound { quota } => {
                    self.complete_exchange(credential.as_ref(), quota.as_ref()).await;
                    warn!("Resource not found: {url}");
                    return Outcome::NotFound;
                }
                FetchOutcome::Retryable(fetch_error) => {
                    if let Some(credential) = &credential {
                        self.pool.record_failure(credential).await;
                    }
                    let failures = self.register_failure().await;
                    warn!(
                        "Attempt #{} failed for {url}: {fetch_error}",
                        attempt + 1
                    );
                    if failures >= CONSECUTIVE_FAILURE_LIMIT {
                        return self.fatal(
                            url,
                            format!("{failures} consecutive failures, last: {fetch_error}"),
                        );
                    }
                    if let Some(credential) = &credential {
                        self.pool.rotate_from(credential).await;
                    }

                    let delay = self.backoff_delay(attempt);
                    debug!("Backing off for {delay:?} before the next attempt");
                    tokio::select! {
                        _ = self.cancellation.cancelled() => return self.interrupted(url),
                        _ = sleep(delay) => {}
                    }
                    attempt += 1;
                    if attempt >= self.max_retries {
                        let reason =
                            format!("failed after {attempt} attempts, last: {fetch_error}");
                        error!("Giving up on {url}: {reason}");
                        return Outcome::RetryableFailure(reason);
                    }
                }
            }
        }
    }

    /// Retrieves a masked snapshot of every credential's status.
    async fn usage_report(&self) -> Vec<CredentialReport> {
        self.pool.report().await
    }
}
