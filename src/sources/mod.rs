//! Stock-footage providers behind one async search trait.

mod freepik;
mod pexels;
mod pixabay;

pub use freepik::FreepikSource;
pub use pexels::PexelsSource;
pub use pixabay::PixabaySource;

use crate::config::Settings;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fallback query when the caller passes an empty one.
pub(crate) const DEFAULT_QUERY: &str = "business technology";

/// One downloadable clip from any provider.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoResult {
    pub id: String,
    pub title: String,
    pub download_url: String,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub source: &'static str,
}

impl fmt::Display for VideoResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({}x{})", self.source, self.id, self.width, self.height)
    }
}

#[async_trait]
pub trait VideoSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Key configured and not rate limited.
    fn is_available(&self) -> bool;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>>;
}

/// Sticky flag set once a provider answers HTTP 429.
#[derive(Debug, Default)]
pub(crate) struct RateLimit(AtomicBool);

impl RateLimit {
    pub(crate) fn trip(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub(crate) fn has_key(key: &Option<String>) -> bool {
    key.as_deref().is_some_and(|k| !k.trim().is_empty())
}

/// Per-request timeout for provider calls.
pub fn request_timeout(settings: &Settings) -> Duration {
    Duration::from_secs(settings.timeout_seconds.max(1))
}

/// Providers in preference order: Pexels, Pixabay, Freepik.
pub fn default_sources(client: &Client, settings: &Settings) -> Vec<Arc<dyn VideoSource>> {
    let timeout = request_timeout(settings);
    vec![
        Arc::new(PexelsSource::new(client.clone(), settings.pexels_api_key.clone()).with_timeout(timeout)),
        Arc::new(PixabaySource::new(client.clone(), settings.pixabay_api_key.clone()).with_timeout(timeout)),
        Arc::new(FreepikSource::new(client.clone(), settings.freepik_api_key.clone()).with_timeout(timeout)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_keyed_sources_are_available() {
        let settings = Settings {
            pixabay_api_key: Some("k".into()),
            pexels_api_key: Some("  ".into()),
            ..Settings::default()
        };
        let sources = default_sources(&Client::new(), &settings);
        let names: Vec<_> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["pexels", "pixabay", "freepik"]);
        let available: Vec<_> = sources.iter().filter(|s| s.is_available()).map(|s| s.name()).collect();
        assert_eq!(available, ["pixabay"]);
    }

    #[test]
    fn timeout_follows_settings() {
        let settings = Settings {
            timeout_seconds: 7,
            ..Settings::default()
        };
        assert_eq!(request_timeout(&settings), Duration::from_secs(7));
        let zero = Settings {
            timeout_seconds: 0,
            ..Settings::default()
        };
        assert_eq!(request_timeout(&zero), Duration::from_secs(1));
    }

    #[test]
    fn rate_limit_is_sticky() {
        let flag = RateLimit::default();
        assert!(!flag.is_tripped());
        flag.trip();
        assert!(flag.is_tripped());
    }
}
