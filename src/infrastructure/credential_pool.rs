use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::RwLock;

use crate::{Credential, CredentialReport, CredentialStatus, QuotaObservation};

/// An ordered pool of credentials with their quota bookkeeping.
///
/// The credential list is fixed at construction; only the per-credential
/// status and the cursor mutate. All mutation goes through `RwLock` guarded
/// accessors so the pool can also serve concurrent callers.
///
/// An empty pool is a valid, supported mode: selection returns nothing and
/// recording operations are no-ops, leaving the caller to send requests
/// anonymously with whatever quota the service grants.
pub struct CredentialPool {
    /// The credentials, in configuration order.
    credentials: Vec<Credential>,

    /// Per-credential quota bookkeeping, parallel to `credentials`.
    statuses: RwLock<Vec<CredentialStatus>>,

    /// The index of the credential most recently selected.
    cursor: RwLock<usize>,
}

impl CredentialPool {
    /// Creates a new `CredentialPool` from the given token strings.
    ///
    /// Blank entries (from a trailing comma or an empty environment variable)
    /// are discarded.
    pub fn new(tokens: Vec<String>) -> Self {
        let credentials = tokens
            .iter()
            .filter(|token| !token.trim().is_empty())
            .map(|token| Credential::new(token))
            .collect::<Vec<_>>();
        if credentials.is_empty() {
            warn!("No credentials provided, unauthenticated requests have lower rate limits");
        }
        let statuses = credentials
            .iter()
            .map(|_| CredentialStatus::default())
            .collect();

        Self {
            credentials,
            statuses: RwLock::new(statuses),
            cursor: RwLock::new(0),
        }
    }

    /// Whether the pool holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Retrieves the number of credentials in the pool.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Selects the eligible credential with the most remaining quota.
    ///
    /// Ties resolve to the earliest credential in configuration order.
    /// Returns `None` when every credential is rate limited (or the pool is
    /// empty), in which case the caller must wait for a reset.
    pub async fn select_best(&self) -> Option<Credential> {
        let now = Utc::now();
        let statuses = self.statuses.read().await;
        let mut best: Option<usize> = None;
        for (index, status) in statuses.iter().enumerate() {
            if !status.is_eligible(now) {
                continue;
            }
            match best {
                Some(best_index) if statuses[best_index].remaining >= status.remaining => {}
                _ => best = Some(index),
            }
        }
        drop(statuses);

        let best_index = best?;
        let mut cursor = self.cursor.write().await;
        if *cursor != best_index {
            *cursor = best_index;
            debug!(
                "Selected best available credential {}",
                self.credentials[best_index]
            );
        }

        Some(self.credentials[best_index].clone())
    }

    /// Scans forward cyclically from `current` and returns the first eligible
    /// credential, moving the cursor onto it.
    ///
    /// When a full cycle finds none, the credential under the cursor is
    /// returned anyway so that progress is still attempted. Returns `None`
    /// only for an empty pool.
    pub async fn rotate_from(&self, current: &Credential) -> Option<Credential> {
        if self.credentials.is_empty() {
            return None;
        }
        let now = Utc::now();
        let mut cursor = self.cursor.write().await;
        let start = self
            .credentials
            .iter()
            .position(|credential| credential == current)
            .unwrap_or(*cursor);

        let statuses = self.statuses.read().await;
        for offset in 1..=self.credentials.len() {
            let index = (start + offset) % self.credentials.len();
            if statuses[index].is_eligible(now) {
                if index != *cursor {
                    debug!("Rotated to credential {}", self.credentials[index]);
                }
                *cursor = index;
                return Some(self.credentials[index].clone());
            }
        }

        debug!(
            "All credentials rate limited, staying on {}",
            self.credentials[*cursor]
        );
        Some(self.credentials[*cursor].clone())
    }

    /// Records a completed call for `credential`, applying the rate-limit
    /// observation when one was reported.
    ///
    /// Quota fields only ever change here, so a failed call can never regress
    /// them; an absent observation leaves them untouched.
    pub async fn record_success(&self, credential: &Credential, quota: Option<&QuotaObservation>) {
        let Some(index) = self.position(credential) else {
            return;
        };
        let mut statuses = self.statuses.write().await;
        let status = &mut statuses[index];
        if let Some(quota) = quota {
            status.remaining = quota.remaining;
            if let Some(reset_at) = quota.reset_at {
                status.reset_at = Some(reset_at);
            }
        }
        status.last_used_at = Some(Utc::now());
        status.consecutive_failures = 0;
    }

    /// Records a failed call for `credential`.
    ///
    /// Only the failure counter moves; quota state is unknown after a failure
    /// and keeps its last observed value.
    pub async fn record_failure(&self, credential: &Credential) {
        let Some(index) = self.position(credential) else {
            return;
        };
        let mut statuses = self.statuses.write().await;
        statuses[index].consecutive_failures += 1;
    }

    /// Retrieves the earliest reset time among credentials that reported one.
    pub async fn earliest_reset(&self) -> Option<DateTime<Utc>> {
        let statuses = self.statuses.read().await;

        statuses.iter().filter_map(|status| status.reset_at).min()
    }

    /// Whether `credential` belongs to the pool and may be used now.
    pub async fn is_eligible(&self, credential: &Credential) -> bool {
        let Some(index) = self.position(credential) else {
            return false;
        };
        let statuses = self.statuses.read().await;

        statuses[index].is_eligible(Utc::now())
    }

    /// Retrieves the status of `credential`, when it belongs to the pool.
    pub async fn status_of(&self, credential: &Credential) -> Option<CredentialStatus> {
        let index = self.position(credential)?;
        let statuses = self.statuses.read().await;

        Some(statuses[index].clone())
    }

    /// Retrieves a masked snapshot of every credential's status.
    pub async fn report(&self) -> Vec<CredentialReport> {
        let statuses = self.statuses.read().await;

        self.credentials
            .iter()
            .zip(statuses.iter())
            .map(|(credential, status)| CredentialReport::new(credential, status))
            .collect()
    }

    fn position(&self, credential: &Credential) -> Option<usize> {
        self.credentials
            .iter()
            .position(|candidate| candidate == credential)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn pool_of(tokens: &[&str]) -> CredentialPool {
        CredentialPool::new(tokens.iter().map(|token| token.to_string()).collect())
    }

    async fn set_quota(
        pool: &CredentialPool,
        token: &str,
        remaining: i64,
        reset_at: Option<DateTime<Utc>>,
    ) {
        pool.record_success(
            &Credential::new(token),
            Some(&QuotaObservation::new(remaining, reset_at)),
        )
        .await;
    }

    #[tokio::test]
    async fn new_discards_blank_tokens() {
        let pool = pool_of(&["token-a", "", "  "]);

        assert_eq!(1, pool.len());
    }

    #[tokio::test]
    async fn select_best_returns_highest_remaining() {
        let pool = pool_of(&["token-a", "token-b", "token-c"]);
        set_quota(&pool, "token-a", 10, None).await;
        set_quota(&pool, "token-b", 300, None).await;
        set_quota(&pool, "token-c", 42, None).await;

        let selected = pool.select_best().await;

        assert_eq!(Some(Credential::new("token-b")), selected);
    }

    #[tokio::test]
    async fn select_best_breaks_ties_by_pool_order() {
        let pool = pool_of(&["token-a", "token-b"]);
        set_quota(&pool, "token-a", 100, None).await;
        set_quota(&pool, "token-b", 100, None).await;

        let selected = pool.select_best().await;

        assert_eq!(Some(Credential::new("token-a")), selected);
    }

    #[tokio::test]
    async fn select_best_skips_rate_limited_credentials() {
        let now = Utc::now();
        let pool = pool_of(&["token-a", "token-b"]);
        set_quota(&pool, "token-a", 0, Some(now + Duration::seconds(60))).await;
        set_quota(&pool, "token-b", 5, None).await;

        let selected = pool.select_best().await;

        assert_eq!(Some(Credential::new("token-b")), selected);
    }

    #[tokio::test]
    async fn select_best_accepts_credential_whose_reset_has_passed() {
        let now = Utc::now();
        let pool = pool_of(&["token-a"]);
        set_quota(&pool, "token-a", 0, Some(now - Duration::seconds(1))).await;

        let selected = pool.select_best().await;

        assert_eq!(Some(Credential::new("token-a")), selected);
    }

    #[tokio::test]
    async fn select_best_returns_none_when_all_exhausted() {
        let now = Utc::now();
        let pool = pool_of(&["token-a", "token-b"]);
        set_quota(&pool, "token-a", 0, Some(now + Duration::seconds(60))).await;
        set_quota(&pool, "token-b", 0, Some(now + Duration::seconds(30))).await;

        assert_eq!(None, pool.select_best().await);
    }

    #[tokio::test]
    async fn select_best_returns_none_on_empty_pool() {
        let pool = pool_of(&[]);

        assert!(pool.is_empty());
        assert_eq!(None, pool.select_best().await);
    }

    #[tokio::test]
    async fn rotate_from_returns_next_eligible_credential() {
        let now = Utc::now();
        let pool = pool_of(&["token-a", "token-b", "token-c"]);
        set_quota(&pool, "token-b", 0, Some(now + Duration::seconds(60))).await;

        let rotated = pool.rotate_from(&Credential::new("token-a")).await;

        assert_eq!(Some(Credential::new("token-c")), rotated);
    }

    #[tokio::test]
    async fn rotate_from_wraps_around_the_pool() {
        let pool = pool_of(&["token-a", "token-b", "token-c"]);

        let rotated = pool.rotate_from(&Credential::new("token-c")).await;

        assert_eq!(Some(Credential::new("token-a")), rotated);
    }

    #[tokio::test]
    async fn rotate_from_terminates_within_pool_size_steps() {
        let now = Utc::now();
        let pool = pool_of(&["token-a", "token-b", "token-c", "token-d"]);
        set_quota(&pool, "token-a", 0, Some(now + Duration::seconds(60))).await;
        set_quota(&pool, "token-b", 0, Some(now + Duration::seconds(60))).await;
        set_quota(&pool, "token-c", 0, Some(now + Duration::seconds(60))).await;

        let rotated = pool.rotate_from(&Credential::new("token-a")).await;

        assert_eq!(Some(Credential::new("token-d")), rotated);
    }

    #[tokio::test]
    async fn rotate_from_falls_back_to_cursor_when_all_rate_limited() {
        let now = Utc::now();
        let pool = pool_of(&["token-a", "token-b"]);
        set_quota(&pool, "token-a", 50, None).await;
        let _ = pool.select_best().await;
        set_quota(&pool, "token-a", 0, Some(now + Duration::seconds(60))).await;
        set_quota(&pool, "token-b", 0, Some(now + Duration::seconds(60))).await;

        let rotated = pool.rotate_from(&Credential::new("token-b")).await;

        assert_eq!(Some(Credential::new("token-a")), rotated);
    }

    #[tokio::test]
    async fn rotate_from_returns_none_on_empty_pool() {
        let pool = pool_of(&[]);

        assert_eq!(None, pool.rotate_from(&Credential::new("token-a")).await);
    }

    #[tokio::test]
    async fn record_success_applies_observation_and_clears_failures() {
        let now = Utc::now();
        let reset_at = now + Duration::seconds(120);
        let pool = pool_of(&["token-a"]);
        let credential = Credential::new("token-a");
        pool.record_failure(&credential).await;
        pool.record_failure(&credential).await;

        pool.record_success(&credential, Some(&QuotaObservation::new(77, Some(reset_at))))
            .await;

        let status = pool.status_of(&credential).await.unwrap();
        assert_eq!(77, status.remaining);
        assert_eq!(Some(reset_at), status.reset_at);
        assert_eq!(0, status.consecutive_failures);
        assert!(status.last_used_at.is_some());
    }

    #[tokio::test]
    async fn record_success_without_observation_keeps_quota_state() {
        let now = Utc::now();
        let reset_at = now + Duration::seconds(120);
        let pool = pool_of(&["token-a"]);
        let credential = Credential::new("token-a");
        set_quota(&pool, "token-a", 42, Some(reset_at)).await;

        pool.record_success(&credential, None).await;

        let status = pool.status_of(&credential).await.unwrap();
        assert_eq!(42, status.remaining);
        assert_eq!(Some(reset_at), status.reset_at);
    }

    #[tokio::test]
    async fn record_success_is_idempotent_for_identical_observations() {
        let reset_at = Utc::now() + Duration::seconds(120);
        let pool = pool_of(&["token-a"]);
        let credential = Credential::new("token-a");
        let observation = QuotaObservation::new(42, Some(reset_at));

        pool.record_success(&credential, Some(&observation)).await;
        let first = pool.status_of(&credential).await.unwrap();
        pool.record_success(&credential, Some(&observation)).await;
        let second = pool.status_of(&credential).await.unwrap();

        assert_eq!(first.remaining, second.remaining);
        assert_eq!(first.reset_at, second.reset_at);
        assert_eq!(first.consecutive_failures, second.consecutive_failures);
    }

    #[tokio::test]
    async fn record_failure_increments_only_the_failure_counter() {
        let reset_at = Utc::now() + Duration::seconds(120);
        let pool = pool_of(&["token-a"]);
        let credential = Credential::new("token-a");
        set_quota(&pool, "token-a", 42, Some(reset_at)).await;

        pool.record_failure(&credential).await;

        let status = pool.status_of(&credential).await.unwrap();
        assert_eq!(1, status.consecutive_failures);
        assert_eq!(42, status.remaining);
        assert_eq!(Some(reset_at), status.reset_at);
    }

    #[tokio::test]
    async fn recording_for_unknown_credential_is_a_no_op() {
        let pool = pool_of(&["token-a"]);
        let stranger = Credential::new("token-x");

        pool.record_success(&stranger, Some(&QuotaObservation::new(1, None)))
            .await;
        pool.record_failure(&stranger).await;

        assert_eq!(None, pool.status_of(&stranger).await);
    }

    #[tokio::test]
    async fn earliest_reset_returns_the_minimum_known_reset() {
        let now = Utc::now();
        let sooner = now + Duration::seconds(3);
        let later = now + Duration::seconds(5);
        let pool = pool_of(&["token-a", "token-b", "token-c"]);
        set_quota(&pool, "token-a", 0, Some(later)).await;
        set_quota(&pool, "token-b", 0, Some(sooner)).await;

        assert_eq!(Some(sooner), pool.earliest_reset().await);
    }

    #[tokio::test]
    async fn earliest_reset_returns_none_when_no_reset_was_ever_reported() {
        let pool = pool_of(&["token-a", "token-b"]);

        assert_eq!(None, pool.earliest_reset().await);
    }

    #[tokio::test]
    async fn report_masks_credentials() {
        let pool = pool_of(&["ghp_0123456789abcd", "ghp_0123456789wxyz"]);

        let reports = pool.report().await;

        assert_eq!(2, reports.len());
        assert_eq!("...abcd", reports[0].credential);
        assert_eq!("...wxyz", reports[1].credential);
    }
}
