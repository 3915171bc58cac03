use super::{RateLimit, VideoResult, VideoSource, has_key};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const API_URL: &str = "https://api.freepik.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

fn download_url_from(body: &Value) -> Option<String> {
    body.get("data")
        .filter(|d| d.is_object())
        .and_then(|d| d.get("url"))
        .or_else(|| body.get("url"))
        .and_then(|u| u.as_str())
        .map(str::to_string)
}

fn as_u32(value: Option<&Value>, default: u32) -> u32 {
    value
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .unwrap_or(default)
}

pub struct FreepikSource {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
    rate_limit: RateLimit,
}

impl FreepikSource {
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

    fn key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    /// Resolve the signed download link; the endpoint may insist on POST.
    async fn download_url(&self, id: &str) -> Result<Option<String>> {
        let url = format!("{}/v1/videos/{}/download", self.base_url, id);
        let mut resp = self
            .client
            .get(&url)
            .header("x-freepik-api-key", self.key())
            .timeout(self.timeout)
            .send()
            .await?;
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            resp = self
                .client
                .post(&url)
                .header("x-freepik-api-key", self.key())
                .timeout(self.timeout)
                .send()
                .await?;
        }
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            self.rate_limit.trip();
            return Ok(None);
        }
        let body: Value = resp.error_for_status()?.json().await?;
        Ok(download_url_from(&body))
    }
}

#[async_trait]
impl VideoSource for FreepikSource {
    fn name(&self) -> &'static str {
        "freepik"
    }

    fn is_available(&self) -> bool {
        has_key(&self.api_key) && !self.rate_limit.is_tripped()
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoResult>> {
        if !self.is_available() {
            return Ok(Vec::new());
        }
        let term = if query.trim().is_empty() { "business" } else { query };
        let limit_param = limit.to_string();

        let resp = self
            .client
            .get(format!("{}/v1/videos", self.base_url))
            .header("x-freepik-api-key", self.key())
            .query(&[("term", term), ("limit", limit_param.as_str()), ("locale", "en-US")])
            .timeout(self.timeout)
            .send()
            .await
            .context("Freepik request failed")?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("freepik rate limited");
            self.rate_limit.trip();
            return Ok(Vec::new());
        }
        let body: Value = resp
            .error_for_status()
            .context("Freepik search failed")?
            .json()
            .await
            .context("Freepik response was not valid JSON")?;

        let videos = match &body {
            Value::Array(items) => items.clone(),
            other => other
                .get("data")
                .and_then(|d| d.as_array())
                .cloned()
                .unwrap_or_default(),
        };

        let mut results = Vec::new();
        for video in videos.iter().take(limit) {
            let id = match video.get("id") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                _ => continue,
            };
            let download_url = match self.download_url(&id).await {
                Ok(Some(url)) => url,
                Ok(None) => continue,
                Err(err) => {
                    debug!("freepik download link for {} failed: {:#}", id, err);
                    continue;
                }
            };
            let title = video
                .get("name")
                .or_else(|| video.get("title"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            results.push(VideoResult {
                id,
                title,
                download_url,
                width: as_u32(video.get("width"), 1920),
                height: as_u32(video.get("height"), 1080),
                duration_seconds: video.get("duration").and_then(|v| v.as_f64()).unwrap_or(10.0),
                source: self.name(),
            });
        }
        Ok(results)
    }
}
