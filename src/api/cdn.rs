//! Market-data CDN: price history and short company overviews per symbol.

use crate::config::Settings;
use anyhow::{Context, Result, bail};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct CdnClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    rate_limited: AtomicBool,
}

impl CdnClient {
    /// `None` unless both URL and key are configured.
    pub fn from_settings(client: Client, settings: &Settings) -> Option<Self> {
        let base_url = settings.cdn_api_url.clone()?;
        let api_key = settings.cdn_api_key.clone()?;
        Some(Self::new(client, base_url, api_key, Duration::from_secs(settings.timeout_seconds)))
    }

    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
            rate_limited: AtomicBool::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        !self.rate_limited.load(Ordering::Relaxed)
    }

    async fn get_json(&self, symbol: &str, file: &str) -> Result<Option<Value>> {
        if !self.is_available() {
            bail!("CDN API rate-limited");
        }
        let url = format!("{}/symbols/{}/{}", self.base_url, symbol, file);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("CDN request failed: {}", url))?;

        match resp.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                self.rate_limited.store(true, Ordering::Relaxed);
                bail!("CDN API rate-limited (429)")
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => {
                let value = resp
                    .error_for_status()
                    .with_context(|| format!("CDN request failed: {}", url))?
                    .json()
                    .await
                    .context("CDN response was not valid JSON")?;
                Ok(Some(value))
            }
        }
    }

    /// `symbols/{SYM}/chart.json`, e.g. for `AAPL.US`.
    pub async fn fetch_chart_json(&self, symbol: &str) -> Result<Option<Value>> {
        self.get_json(symbol, "chart.json").await
    }

    pub async fn fetch_company_overview(&self, symbol: &str) -> Result<Option<Value>> {
        self.get_json(symbol, "short_overview.json").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cdn(server: &MockServer) -> CdnClient {
        CdnClient::new(Client::new(), format!("{}/", server.uri()), "cdn-key", Duration::from_secs(5))
    }

    #[tokio::test]
    async fn chart_json_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/NVDA.US/chart.json"))
            .and(header("authorization", "Bearer cdn-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"chart_1m": []})))
            .mount(&server)
            .await;

        let chart = cdn(&server).fetch_chart_json("NVDA.US").await.unwrap().unwrap();
        assert!(chart.get("chart_1m").is_some());
    }

    #[tokio::test]
    async fn missing_overview_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        assert!(cdn(&server).fetch_company_overview("X.US").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rate_limit_disables_client() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        let client = cdn(&server);
        assert!(client.fetch_chart_json("A.US").await.is_err());
        assert!(!client.is_available());
        assert!(client.fetch_chart_json("A.US").await.is_err());
    }

    #[test]
    fn absent_without_full_config() {
        let settings = Settings {
            cdn_api_url: Some("https://cdn.test".into()),
            ..Settings::default()
        };
        assert!(CdnClient::from_settings(Client::new(), &settings).is_none());
    }
}
