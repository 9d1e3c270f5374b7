use std::{sync::Arc, time::Duration};

use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use github_api_client::{
    ApiClient, CredentialPool, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_RETRY_BASE_DELAY, HttpFetcher, Outcome, RATE_LIMIT_WAIT_BUFFER, RateLimiter,
    RetryingClient, StdResult,
};

/// Command line arguments for the GitHub API client
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// URLs of the API resources to fetch
    #[arg(required = true)]
    urls: Vec<String>,

    /// GitHub API tokens, comma separated (anonymous requests when empty)
    #[arg(
        short,
        long,
        env = "GITHUB_TOKENS",
        value_delimiter = ',',
        hide_env_values = true,
        default_value = ""
    )]
    github_tokens: Vec<String>,

    /// Maximum number of retries per resource
    #[arg(short, long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Timeout of a single request in seconds
    #[arg(short, long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    request_timeout_seconds: u64,

    /// Longest rate-limit wait tolerated before giving up, in seconds
    #[arg(short = 'w', long, default_value_t = 3600)]
    max_wait_seconds: u64,
}

#[tokio::main]
async fn main() -> StdResult<()> {
    env_logger::init();
    info!("Starting GitHub API client");
    let args = Args::parse();

    let cancellation = CancellationToken::new();
    spawn_shutdown_listener(cancellation.clone());

    let client = build_client(&args, cancellation)?;
    for url in &args.urls {
        match client.execute(url, None).await {
            Outcome::Success(body) => {
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            Outcome::NotFound => {
                info!("Resource not found: {url}");
            }
            Outcome::RetryableFailure(reason) => {
                warn!("Giving up on {url}: {reason}");
            }
            Outcome::FatalStop(reason) => {
                error!("Stopping the run: {reason}");
                print_usage_report(client.as_ref()).await?;
                anyhow::bail!("Run stopped: {reason}");
            }
        }
    }
    print_usage_report(client.as_ref()).await?;
    info!("All resources processed");

    Ok(())
}

fn spawn_shutdown_listener(cancellation: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, finishing up");
            cancellation.cancel();
        }
    });
}

fn build_client(args: &Args, cancellation: CancellationToken) -> StdResult<Arc<dyn ApiClient>> {
    let pool = Arc::new(CredentialPool::new(args.github_tokens.clone()));
    let rate_limiter = RateLimiter::new(
        pool.clone(),
        RATE_LIMIT_WAIT_BUFFER,
        Some(Duration::from_secs(args.max_wait_seconds)),
    );
    let fetcher = Arc::new(HttpFetcher::try_new(Duration::from_secs(
        args.request_timeout_seconds,
    ))?);

    Ok(Arc::new(RetryingClient::new(
        fetcher,
        pool,
        rate_limiter,
        args.max_retries,
        DEFAULT_RETRY_BASE_DELAY,
        cancellation,
    )))
}

async fn print_usage_report(client: &dyn ApiClient) -> StdResult<()> {
    let report = client.usage_report().await;
    info!("Credential usage: {}", serde_json::to_string(&report)?);

    Ok(())
}
