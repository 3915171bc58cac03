//! Chat Completions client returning parsed JSON objects.

use crate::config::Settings;
use crate::error::PipelineError;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

const API_URL: &str = "https://api.openai.com";
const ATTEMPTS: u32 = 3;
const TEMPERATURE: f64 = 0.8;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A model that answers a system + user prompt with a JSON object.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat_json(&self, system: &str, user: &str) -> Result<Value>;
}

/// Wait before retry `attempt` (1-based): doubling from one unit, clamped
/// to 1..=8 units.
pub fn backoff_delay(attempt: u32, unit: Duration) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(3);
    unit * factor.clamp(1, 8)
}

fn log_api_error(root: &Value) {
    let Some(err) = root.get("error") else {
        return;
    };
    if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
        logw(format!("OpenAI error message: {}", msg));
    }
    if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
        logw(format!("OpenAI error code: {}", code));
    }
}

/// `choices[0].message.content` of a chat completion.
fn extract_message_content(raw: &str) -> Option<String> {
    let root: Value = serde_json::from_str(raw).ok()?;
    if root.get("error").is_some() {
        log_api_error(&root);
        return None;
    }
    root.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    backoff_unit: Duration,
}

impl OpenAiClient {
    pub fn new(client: Client, settings: &Settings) -> Self {
        Self {
            client,
            api_key: settings.openai_api_key.clone(),
            model: settings.llm_model.clone(),
            base_url: API_URL.to_string(),
            backoff_unit: Duration::from_secs(1),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    async fn chat_once(&self, system: &str, user: &str) -> Result<Value> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "response_format": {"type": "json_object"},
            "temperature": TEMPERATURE,
        });

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            if let Ok(root) = serde_json::from_str::<Value>(&raw) {
                log_api_error(&root);
            }
            anyhow::bail!("OpenAI HTTP {}", status.as_u16());
        }

        let content = extract_message_content(&raw)
            .filter(|c| !c.trim().is_empty())
            .ok_or(PipelineError::EmptyLlmResponse)?;
        let value: Value = serde_json::from_str(&content).context("LLM reply was not valid JSON")?;
        if !value.is_object() {
            anyhow::bail!("LLM reply was not a JSON object");
        }
        Ok(value)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat_json(&self, system: &str, user: &str) -> Result<Value> {
        let mut attempt = 1;
        loop {
            match self.chat_once(system, user).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < ATTEMPTS => {
                    let wait = backoff_delay(attempt, self.backoff_unit);
                    logw(format!("LLM call failed ({:#}); retrying in {:?}", err, wait));
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    fn client(server: &MockServer) -> OpenAiClient {
        let settings = Settings {
            openai_api_key: "sk-test".into(),
            ..Settings::default()
        };
        OpenAiClient::new(Client::new(), &settings)
            .with_base_url(server.uri())
            .with_backoff_unit(Duration::from_millis(1))
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let unit = Duration::from_secs(1);
        assert_eq!(backoff_delay(1, unit), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, unit), Duration::from_secs(2));
        assert_eq!(backoff_delay(3, unit), Duration::from_secs(4));
        assert_eq!(backoff_delay(9, unit), Duration::from_secs(8));
    }

    #[test]
    fn content_extraction() {
        let raw = completion(r#"{"a":1}"#).to_string();
        assert_eq!(extract_message_content(&raw).as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(extract_message_content(r#"{"error":{"message":"nope"}}"#), None);
    }

    #[tokio::test]
    async fn parses_json_object_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"title":"T"}"#)))
            .mount(&server)
            .await;

        let value = client(&server).chat_json("sys", "user").await.unwrap();
        assert_eq!(value["title"], "T");
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        assert!(client(&server).chat_json("sys", "user").await.is_err());
    }

    #[tokio::test]
    async fn empty_content_is_retried_then_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("")))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).chat_json("sys", "user").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EmptyLlmResponse)
        ));
    }
}
