use super::{DEFAULT_QUERY, RateLimit, VideoResult, VideoSource, has_key};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

const API_URL: &str = "https://api.pexels.com";
const MIN_DURATION_S: f64 = 3.0;
const MIN_WIDTH: u32 = 1080;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    video_files: Vec<PexelsFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct PexelsFile {
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    link: String,
}

/// Largest mp4 at least `MIN_WIDTH` wide, else the largest mp4 at all.
fn best_file(files: &[PexelsFile]) -> Option<&PexelsFile> {
    let mp4 = || files.iter().filter(|f| f.file_type == "video/mp4");
    let area = |f: &&PexelsFile| f.width as u64 * f.height as u64;
    mp4()
        .filter(|f| f.width >= MIN_WIDTH)
        .max_by_key(area)
        .or_else(|| mp4().max_by_key(area))
}

/// Slug from the page URL, e.g. `.../video/city-at-night-123/` gives `city-at-night-123`.
fn title_from_url(url: &str) -> String {
    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() > 1 {
        parts[parts.len() - 2].to_string()
    } else {
        String::new()
    }
}

pub struct PexelsSource {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    rate_limit: RateLimit,
}

impl PexelsSource {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            rate_limit: RateLimit::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl VideoSource for PexelsSource {
    fn name(&self) -> &'static str {
        "pexels"
    }

    fn is_available(&self) -> bool {
        has_key(&self.api_key) && !self.rate_limit.is_tripped()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let query = if query.trim().is_empty() { DEFAULT_QUERY } else { query };
        let per_page = (limit * 2).min(30).to_string();

        let resp = self
            .client
            .get(format!("{}/videos/search", self.base_url))
            .header("Authorization", self.api_key.as_deref().unwrap_or_default())
            .query(&[("query", query), ("per_page", per_page.as_str()), ("size", "large")])
            .timeout(self.timeout)
            .send()
            .await
            .context("Pexels request failed")?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("pexels rate limited");
            self.rate_limit.trip();
            return Ok(Vec::new());
        }
        let data: SearchResponse = resp
            .error_for_status()
            .context("Pexels search failed")?
            .json()
            .await
            .context("Pexels response was not valid JSON")?;

        let mut results = Vec::new();
        for video in data.videos {
            if video.duration < MIN_DURATION_S {
                continue;
            }
            let Some(best) = best_file(&video.video_files) else {
                continue;
            };
            results.push(VideoResult {
                id: video.id.to_string(),
                title: title_from_url(&video.url),
                download_url: best.link.clone(),
                width: best.width,
                height: best.height,
                duration_seconds: video.duration,
                source: self.name(),
            });
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(kind: &str, w: u32, h: u32) -> PexelsFile {
        PexelsFile {
            file_type: kind.into(),
            width: w,
            height: h,
            link: format!("{}x{}", w, h),
        }
    }

    #[test]
    fn picks_largest_wide_mp4() {
        let files = vec![
            file("video/mp4", 720, 1280),
            file("video/mp4", 1080, 1920),
            file("video/mp4", 2160, 3840),
            file("video/webm", 4000, 4000),
        ];
        assert_eq!(best_file(&files).unwrap().link, "2160x3840");
    }

    #[test]
    fn falls_back_to_any_mp4() {
        let files = vec![file("video/mp4", 640, 360), file("video/mp4", 960, 540)];
        assert_eq!(best_file(&files).unwrap().link, "960x540");
        assert!(best_file(&[file("video/webm", 1920, 1080)]).is_none());
    }

    #[test]
    fn title_is_url_slug() {
        assert_eq!(
            title_from_url("https://www.pexels.com/video/stock-ticker-123/"),
            "stock-ticker-123"
        );
        assert_eq!(title_from_url("nothing"), "");
    }
}
