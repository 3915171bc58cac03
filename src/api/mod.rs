pub mod cdn;
pub mod google_tts;
pub mod openai;

use crate::config::Settings;
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

/// Shared HTTP client for every remote call of a run.
pub fn build_http_client(settings: &Settings) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("finshorts/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(settings.timeout_seconds.max(1) * 15))
        .gzip(true)
        .build()
        .context("Failed to build HTTP client")
}
