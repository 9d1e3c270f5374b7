mod client_retrier;
mod credential_pool;
mod fetcher_http;
mod rate_limiter;

pub use client_retrier::*;
pub use credential_pool::*;
pub use fetcher_http::*;
pub use rate_limiter::*;
