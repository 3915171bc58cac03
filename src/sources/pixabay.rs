use super::{DEFAULT_QUERY, RateLimit, VideoResult, VideoSource, has_key};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

const API_URL: &str = "https://pixabay.com";
const MIN_WIDTH: u32 = 1280;
const MIN_HEIGHT: u32 = 720;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_QUERY_CHARS: usize = 100;

/// First keyword contained in the query decides the category.
const KEYWORD_CATEGORIES: &[(&str, &str)] = &[
    ("technology", "computer"),
    ("tech", "computer"),
    ("software", "computer"),
    ("computer", "computer"),
    ("laptop", "computer"),
    ("smartphone", "computer"),
    ("phone", "computer"),
    ("device", "computer"),
    ("digital", "computer"),
    ("code", "computer"),
    ("programming", "computer"),
    ("data", "computer"),
    ("business", "business"),
    ("office", "business"),
    ("meeting", "business"),
    ("corporate", "business"),
    ("finance", "business"),
    ("money", "business"),
    ("stock", "business"),
    ("market", "business"),
    ("trading", "business"),
    ("growth", "business"),
    ("success", "business"),
    ("company", "business"),
    ("person", "people"),
    ("people", "people"),
    ("man", "people"),
    ("woman", "people"),
    ("team", "people"),
    ("group", "people"),
    ("family", "people"),
    ("crowd", "people"),
    ("nature", "nature"),
    ("forest", "nature"),
    ("tree", "nature"),
    ("sky", "nature"),
    ("ocean", "nature"),
    ("mountain", "nature"),
    ("landscape", "nature"),
    ("city", "places"),
    ("street", "places"),
    ("building", "buildings"),
    ("architecture", "buildings"),
    ("house", "buildings"),
    ("home", "buildings"),
    ("car", "transportation"),
    ("vehicle", "transportation"),
    ("airplane", "transportation"),
    ("train", "transportation"),
    ("travel", "travel"),
    ("airport", "travel"),
    ("factory", "industry"),
    ("manufacturing", "industry"),
    ("industrial", "industry"),
    ("warehouse", "industry"),
    ("production", "industry"),
    ("education", "education"),
    ("school", "education"),
    ("learning", "education"),
    ("student", "education"),
    ("classroom", "education"),
    ("university", "education"),
    ("health", "health"),
    ("medical", "health"),
    ("hospital", "health"),
    ("doctor", "health"),
    ("fitness", "health"),
    ("gym", "sports"),
    ("food", "food"),
    ("restaurant", "food"),
    ("cooking", "food"),
    ("kitchen", "food"),
    ("music", "music"),
    ("entertainment", "music"),
    ("concert", "music"),
];

pub fn detect_category(query: &str) -> Option<&'static str> {
    let lower = query.to_lowercase();
    KEYWORD_CATEGORIES
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, category)| *category)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    id: u64,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    videos: HashMap<String, Rendition>,
}

#[derive(Debug, Clone, Deserialize)]
struct Rendition {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// large > medium > small, first one within 80% of the minimum width;
/// otherwise the first that has a URL at all.
fn best_rendition(videos: &HashMap<String, Rendition>) -> Option<&Rendition> {
    let ordered = || {
        ["large", "medium", "small"]
            .iter()
            .filter_map(|k| videos.get(*k))
            .filter(|v| !v.url.is_empty())
    };
    ordered()
        .find(|v| v.width as f64 >= MIN_WIDTH as f64 * 0.8)
        .or_else(|| ordered().next())
}

pub struct PixabaySource {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    rate_limit: RateLimit,
    editors_choice: bool,
}

impl PixabaySource {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            rate_limit: RateLimit::default(),
            editors_choice: false,
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

    /// Restrict results to curated clips.
    pub fn editors_choice(mut self, on: bool) -> Self {
        self.editors_choice = on;
        self
    }
}

#[async_trait]
impl VideoSource for PixabaySource {
    fn name(&self) -> &'static str {
        "pixabay"
    }

    fn is_available(&self) -> bool {
        has_key(&self.api_key) && !self.rate_limit.is_tripped()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let query = if query.trim().is_empty() { DEFAULT_QUERY } else { query };
        let q: String = query.chars().take(MAX_QUERY_CHARS).collect();

        let mut params: Vec<(&str, String)> = vec![
            ("key", self.api_key.clone().unwrap_or_default()),
            ("q", q),
            ("per_page", (limit * 2).min(50).to_string()),
            ("video_type", "film".into()),
            ("safesearch", "true".into()),
            ("lang", "en".into()),
            ("min_width", MIN_WIDTH.to_string()),
            ("min_height", MIN_HEIGHT.to_string()),
            ("order", "popular".into()),
        ];
        if let Some(category) = detect_category(query) {
            params.push(("category", category.into()));
        }
        if self.editors_choice {
            params.push(("editors_choice", "true".into()));
        }

        let resp = self
            .client
            .get(format!("{}/api/videos/", self.base_url))
            .query(&params)
            .timeout(self.timeout)
            .send()
            .await
            .context("Pixabay request failed")?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("pixabay rate limited");
            self.rate_limit.trip();
            return Ok(Vec::new());
        }
        let data: SearchResponse = resp
            .error_for_status()
            .context("Pixabay search failed")?
            .json()
            .await
            .context("Pixabay response was not valid JSON")?;

        let mut results = Vec::new();
        for hit in data.hits {
            if hit.duration < 3.0 {
                continue;
            }
            let Some(best) = best_rendition(&hit.videos) else {
                continue;
            };
            results.push(VideoResult {
                id: hit.id.to_string(),
                title: hit.tags.clone(),
                download_url: best.url.clone(),
                width: if best.width > 0 { best.width } else { MIN_WIDTH },
                height: if best.height > 0 { best.height } else { MIN_HEIGHT },
                duration_seconds: hit.duration,
                source: self.name(),
            });
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }
}
