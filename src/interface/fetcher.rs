use crate::{Credential, FetchOutcome};

/// A trait for performing exactly one call against the remote API.
///
/// Implementations never retry, never sleep, and never touch credential
/// bookkeeping; they classify what happened and return it.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceFetcher: Sync + Send {
    /// Fetches the resource at `url` once, with the given credential when present.
    async fn fetch<'a>(&self, url: &str, credential: Option<&'a Credential>) -> FetchOutcome;
}
