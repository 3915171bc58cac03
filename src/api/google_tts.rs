//! Google Cloud Text-to-Speech `text:synthesize` over REST.

use crate::error::PipelineError;
use crate::voice::VoiceSettings;
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_URL: &str = "https://texttospeech.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    pub audio_encoding: &'static str,
    pub sample_rate_hertz: u32,
    pub effects_profile_id: Vec<&'static str>,
}

impl Default for AudioConfig {
    /// Uncompressed 44.1 kHz WAV tuned for headphones.
    fn default() -> Self {
        Self {
            audio_encoding: "LINEAR16",
            sample_rate_hertz: 44_100,
            effects_profile_id: vec!["headphone-class-device"],
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SsmlInput<'a>,
    voice: &'a VoiceSettings,
    audio_config: &'a AudioConfig,
}

#[derive(Serialize)]
struct SsmlInput<'a> {
    ssml: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: Option<String>,
}

pub struct GoogleTts {
    client: Client,
    api_key: String,
    base_url: String,
    audio: AudioConfig,
}

impl GoogleTts {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: API_URL.to_string(),
            audio: AudioConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Synthesize a complete `<speak>` document; returns decoded audio bytes.
    pub async fn synthesize(&self, ssml: &str, voice: &VoiceSettings) -> Result<Vec<u8>> {
        let request = SynthesizeRequest {
            input: SsmlInput { ssml },
            voice,
            audio_config: &self.audio,
        };

        let resp = self
            .client
            .post(format!("{}/v1/text:synthesize", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("TTS request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(PipelineError::TtsFailed(format!("HTTP {}: {}", status.as_u16(), snippet)).into());
        }

        let data: SynthesizeResponse = resp.json().await.context("TTS response was not valid JSON")?;
        let encoded = data
            .audio_content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| PipelineError::TtsFailed("response had no audioContent".into()))?;
        STANDARD
            .decode(encoded.as_bytes())
            .context("audioContent was not valid base64")
    }
}
