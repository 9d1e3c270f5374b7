use crate::{Credential, CredentialReport, Outcome};

/// A trait for issuing resilient calls against the remote API.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ApiClient: Sync + Send {
    /// Executes one logical call and drives it to a terminal [`Outcome`].
    ///
    /// The optional hint is honoured when that credential is still eligible;
    /// otherwise selection falls back to the pool policy.
    async fn execute<'a>(&self, url: &str, credential_hint: Option<&'a Credential>) -> Outcome;

    /// Retrieves a masked snapshot of every credential's status.
    async fn usage_report(&self) -> Vec<CredentialReport>;
}
