mod client;
mod fetcher;

pub use client::*;
pub use fetcher::*;
