use std::time::Duration;

use chrono::{TimeZone, Utc};
use log::debug;
use reqwest::{Client, StatusCode, header::HeaderMap};

use crate::{
    Credential, FetchError, FetchOutcome, QuotaObservation, ResourceFetcher, StdResult,
};

/// The User-Agent sent with every request, required by the GitHub API policy.
pub const HTTP_USER_AGENT: &str = "github-api-client";

/// The default timeout for a single request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Fetches JSON resources over HTTP.
///
/// Stateless beyond the reused connection pool: classification of each
/// attempt is returned to the caller, which owns all bookkeeping.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a new `HttpFetcher` with the given per-request timeout.
    pub fn try_new(request_timeout: Duration) -> StdResult<Self> {
        let client = Client::builder()
            .user_agent(HTTP_USER_AGENT)
            .timeout(request_timeout)
            .build()?;

        Ok(Self { client })
    }
}

fn decode_quota(headers: &HeaderMap) -> Option<QuotaObservation> {
    let remaining = header_number(headers, RATE_LIMIT_REMAINING_HEADER)?;
    let reset_at = header_number(headers, RATE_LIMIT_RESET_HEADER)
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single());

    Some(QuotaObservation::new(remaining, reset_at))
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait::async_trait]
impl ResourceFetcher for HttpFetcher {
    /// Performs one HTTP GET and classifies the result.
    async fn fetch<'a>(&self, url: &str, credential: Option<&'a Credential>) -> FetchOutcome {
        let mut request = self.client.get(url);
        if let Some(credential) = credential {
            debug!("Fetching {url} with credential {credential}");
            request = request.header("Authorization", format!("token {}", credential.value()));
        } else {
            debug!("Fetching {url} without credential");
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => return FetchOutcome::Retryable(FetchError::Network(error.to_string())),
        };

        let quota = decode_quota(response.headers());
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return FetchOutcome::NotFound { quota };
        }
        if !status.is_success() {
            return FetchOutcome::Retryable(FetchError::Status(status.as_u16()));
        }

        match response.json::<serde_json::Value>().await {
            Ok(body) => FetchOutcome::Success { body, quota },
            Err(error) => FetchOutcome::Retryable(FetchError::MalformedBody(error.to_string())),
        }
    }
}
