use crate::error::PipelineError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CONFIG_FILE: &str = "config.json";

/// Runtime settings: `.env`, then process environment, then `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub openai_api_key: String,
    pub google_api_key: String,
    pub pexels_api_key: Option<String>,
    pub pixabay_api_key: Option<String>,
    pub freepik_api_key: Option<String>,
    pub cdn_api_url: Option<String>,
    pub cdn_api_key: Option<String>,
    pub resolution: String,
    pub fps: u32,
    pub default_voice_name: String,
    pub output_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub timeout_seconds: u64,
    pub llm_model: String,
    pub use_ai_speech_control: bool,
    pub chart_blur_background: bool,
    pub chart_renderer_cmd: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            google_api_key: String::new(),
            pexels_api_key: None,
            pixabay_api_key: None,
            freepik_api_key: None,
            cdn_api_url: None,
            cdn_api_key: None,
            resolution: "720x1280".to_string(),
            fps: 30,
            default_voice_name: "en-US-Journey-D".to_string(),
            output_dir: PathBuf::from("out"),
            tmp_dir: PathBuf::from("tmp"),
            timeout_seconds: 20,
            llm_model: "gpt-4o".to_string(),
            use_ai_speech_control: false,
            chart_blur_background: true,
            chart_renderer_cmd: None,
        }
    }
}

/// Keys accepted in `config.json`. Missing or empty values leave the
/// environment-derived setting alone.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(alias = "open_api_key")]
    openai_api_key: Option<String>,
    google_api_key: Option<String>,
    pexels_api_key: Option<String>,
    pixabay_api_key: Option<String>,
    freepik_api_key: Option<String>,
    cdn_api_url: Option<String>,
    cdn_api_key: Option<String>,
    resolution: Option<String>,
    fps: Option<u32>,
    default_voice_name: Option<String>,
    output_dir: Option<PathBuf>,
    tmp_dir: Option<PathBuf>,
    timeout_seconds: Option<u64>,
    llm_model: Option<String>,
    use_ai_speech_control: Option<bool>,
    chart_blur_background: Option<bool>,
    chart_renderer_cmd: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Settings {
    /// Build settings from an environment lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));
        let defaults = Settings::default();

        Self {
            openai_api_key: get("OPENAI_API_KEY").unwrap_or_default(),
            google_api_key: get("GOOGLE_API_KEY").unwrap_or_default(),
            pexels_api_key: get("PEXELS_API_KEY"),
            pixabay_api_key: get("PIXABAY_API_KEY"),
            freepik_api_key: get("FREEPIK_API_KEY"),
            cdn_api_url: get("CDN_API_URL").map(|u| u.trim_end_matches('/').to_string()),
            cdn_api_key: get("CDN_API_KEY"),
            resolution: get("RESOLUTION").unwrap_or(defaults.resolution),
            fps: get("FPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fps),
            default_voice_name: get("DEFAULT_VOICE_NAME").unwrap_or(defaults.default_voice_name),
            output_dir: get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            tmp_dir: get("TMP_DIR").map(PathBuf::from).unwrap_or(defaults.tmp_dir),
            timeout_seconds: get("HTTP_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            use_ai_speech_control: get("USE_AI_SPEECH_CONTROL")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.use_ai_speech_control),
            chart_blur_background: get("CHART_BLUR_BACKGROUND")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.chart_blur_background),
            chart_renderer_cmd: get("CHART_RENDERER_CMD"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load `.env`, the environment, then overlay `config_path` if it exists.
    pub async fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut settings = Self::from_env();

        let path = config_path.as_ref();
        if fs::metadata(path).await.is_ok() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let file: FileConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            settings.apply(file);
        }

        Ok(settings)
    }

    fn apply(&mut self, file: FileConfig) {
        if let Some(v) = non_empty(file.openai_api_key) {
            self.openai_api_key = v;
        }
        if let Some(v) = non_empty(file.google_api_key) {
            self.google_api_key = v;
        }
        if let Some(v) = non_empty(file.pexels_api_key) {
            self.pexels_api_key = Some(v);
        }
        if let Some(v) = non_empty(file.pixabay_api_key) {
            self.pixabay_api_key = Some(v);
        }
        if let Some(v) = non_empty(file.freepik_api_key) {
            self.freepik_api_key = Some(v);
        }
        if let Some(v) = non_empty(file.cdn_api_url) {
            self.cdn_api_url = Some(v.trim_end_matches('/').to_string());
        }
        if let Some(v) = non_empty(file.cdn_api_key) {
            self.cdn_api_key = Some(v);
        }
        if let Some(v) = non_empty(file.resolution) {
            self.resolution = v;
        }
        if let Some(v) = file.fps.filter(|v| *v > 0) {
            self.fps = v;
        }
        if let Some(v) = non_empty(file.default_voice_name) {
            self.default_voice_name = v;
        }
        if let Some(v) = file.output_dir {
            self.output_dir = v;
        }
        if let Some(v) = file.tmp_dir {
            self.tmp_dir = v;
        }
        if let Some(v) = file.timeout_seconds.filter(|v| *v > 0) {
            self.timeout_seconds = v;
        }
        if let Some(v) = non_empty(file.llm_model) {
            self.llm_model = v;
        }
        if let Some(v) = file.use_ai_speech_control {
            self.use_ai_speech_control = v;
        }
        if let Some(v) = file.chart_blur_background {
            self.chart_blur_background = v;
        }
        if let Some(v) = non_empty(file.chart_renderer_cmd) {
            self.chart_renderer_cmd = Some(v);
        }
    }

    /// Report every missing requirement at once.
    pub fn ensure_valid(&self) -> Result<(), PipelineError> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_empty() {
            missing.push("OPENAI_API_KEY".to_string());
        }
        if self.google_api_key.is_empty() {
            missing.push("GOOGLE_API_KEY".to_string());
        }
        if !self.has_footage_source() {
            missing.push(
                "At least one of FREEPIK_API_KEY, PIXABAY_API_KEY or PEXELS_API_KEY".to_string(),
            );
        }
        if self.parse_resolution().is_none() {
            missing.push(format!("RESOLUTION must look like 720x1280 (got {})", self.resolution));
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::MissingConfig(missing))
        }
    }

    pub fn has_footage_source(&self) -> bool {
        self.pexels_api_key.is_some()
            || self.pixabay_api_key.is_some()
            || self.freepik_api_key.is_some()
    }

    pub fn has_cdn(&self) -> bool {
        self.cdn_api_url.is_some() && self.cdn_api_key.is_some()
    }

    fn parse_resolution(&self) -> Option<(u32, u32)> {
        let (w, h) = self.resolution.split_once('x')?;
        let w = w.trim().parse::<u32>().ok()?;
        let h = h.trim().parse::<u32>().ok()?;
        (w > 0 && h > 0).then_some((w, h))
    }

    /// Target (width, height); falls back to 720x1280 on a malformed value.
    pub fn target_dims(&self) -> (u32, u32) {
        self.parse_resolution().unwrap_or((720, 1280))
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.tmp_dir.join("videos")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.tmp_dir.join("audio")
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.tmp_dir.join("charts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let s = Settings::from_lookup(lookup(&[]));
        assert_eq!(s.resolution, "720x1280");
        assert_eq!(s.fps, 30);
        assert_eq!(s.llm_model, "gpt-4o");
        assert_eq!(s.timeout_seconds, 20);
        assert!(s.chart_blur_background);
        assert!(!s.use_ai_speech_control);
    }

    #[test]
    fn ensure_valid_lists_all_missing_keys() {
        let s = Settings::from_lookup(lookup(&[]));
        match s.ensure_valid() {
            Err(PipelineError::MissingConfig(items)) => {
                assert_eq!(items.len(), 3);
                assert!(items[0].contains("OPENAI_API_KEY"));
                assert!(items[2].contains("PEXELS_API_KEY"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn one_footage_key_is_enough() {
        let s = Settings::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("GOOGLE_API_KEY", "g"),
            ("PIXABAY_API_KEY", "p"),
            ("USE_AI_SPEECH_CONTROL", "True"),
            ("CDN_API_URL", "https://cdn.example/"),
        ]));
        assert!(s.ensure_valid().is_ok());
        assert!(s.use_ai_speech_control);
        assert_eq!(s.cdn_api_url.as_deref(), Some("https://cdn.example"));
        assert!(!s.has_cdn());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let s = Settings::from_lookup(lookup(&[("PEXELS_API_KEY", "  ")]));
        assert!(s.pexels_api_key.is_none());
    }

    #[test]
    fn malformed_resolution_falls_back() {
        let s = Settings::from_lookup(lookup(&[("RESOLUTION", "wide")]));
        assert_eq!(s.target_dims(), (720, 1280));
        let s = Settings::from_lookup(lookup(&[("RESOLUTION", "1080x1920")]));
        assert_eq!(s.target_dims(), (1080, 1920));
    }

    #[tokio::test]
    async fn config_file_overrides_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"llm_model": "gpt-4o-mini", "fps": 24, "pexels_api_key": ""}"#)
            .await
            .unwrap();

        let mut s = Settings::from_lookup(lookup(&[("PEXELS_API_KEY", "env")]));
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        s.apply(serde_json::from_str(&content).unwrap());

        assert_eq!(s.llm_model, "gpt-4o-mini");
        assert_eq!(s.fps, 24);
        assert_eq!(s.pexels_api_key.as_deref(), Some("env"));
    }
}
