use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The number of calls a credential is assumed to have before the first
/// rate-limit observation arrives.
pub const INITIAL_QUOTA: i64 = 5000;

/// An authentication token granting a quota of calls to the remote API.
///
/// Compared by value. The full token never reaches logs or reports, only the
/// trailing fragment exposed by [`Credential::masked`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Credential(pub String);

impl Credential {
    /// Creates a new `Credential` from a token string.
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    /// Retrieves the full token value, for request headers only.
    pub fn value(&self) -> &str {
        &self.0
    }

    /// Retrieves a masked rendering of the token, keeping the last 4 characters.
    pub fn masked(&self) -> String {
        let total = self.0.chars().count();
        let suffix: String = self.0.chars().skip(total.saturating_sub(4)).collect();

        format!("...{suffix}")
    }
}

impl Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.masked())
    }
}

/// Quota bookkeeping for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialStatus {
    /// Last known remaining calls before the quota resets.
    pub remaining: i64,

    /// The time at which the quota resets, when known.
    pub reset_at: Option<DateTime<Utc>>,

    /// The time of the last completed call with this credential.
    pub last_used_at: Option<DateTime<Utc>>,

    /// Failures for this credential since its last completed call.
    pub consecutive_failures: u32,
}

impl Default for CredentialStatus {
    fn default() -> Self {
        Self {
            remaining: INITIAL_QUOTA,
            reset_at: None,
            last_used_at: None,
            consecutive_failures: 0,
        }
    }
}

impl CredentialStatus {
    /// Whether this credential may be used now: it either has quota left or
    /// its reset time has already passed.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.remaining > 0 || self.reset_at.is_some_and(|reset_at| reset_at <= now)
    }
}

/// A read-only, masked snapshot of one credential's status, for diagnostics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CredentialReport {
    /// The masked credential this report describes.
    pub credential: String,

    /// Last known remaining calls.
    pub remaining: i64,

    /// The quota reset time, RFC 3339, when known.
    pub reset_at: Option<String>,

    /// The time of the last completed call, RFC 3339, when any.
    pub last_used_at: Option<String>,

    /// Failures since the last completed call.
    pub consecutive_failures: u32,
}

impl CredentialReport {
    /// Creates a new `CredentialReport` from a credential and its status.
    pub fn new(credential: &Credential, status: &CredentialStatus) -> Self {
        Self {
            credential: credential.masked(),
            remaining: status.remaining,
            reset_at: status.reset_at.map(|reset_at| reset_at.to_rfc3339()),
            last_used_at: status.last_used_at.map(|last_used| last_used.to_rfc3339()),
            consecutive_failures: status.consecutive_failures,
        }
    }
}

impl Display for CredentialReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Credential {}: remaining={}, reset_at={:?}, last_used_at={:?}, failures={}",
            self.credential, self.remaining, self.reset_at, self.last_used_at, self.consecutive_failures
        )
    }
}
