//! Declarative video description, read from YAML or JSON.

use crate::error::PipelineError;
use crate::models::{Script, Segment, VisualClip, VoiceSpeed};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const WORDS_PER_MINUTE: f64 = 150.0;
const MIN_ESTIMATED_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

fn default_emotion() -> String {
    "neutral".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub text: String,
    #[serde(default = "default_emotion")]
    pub emotion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_screen_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visuals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clips: Option<Vec<ClipSpec>>,
    /// Seconds; estimated from the word count when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_video: Option<PathBuf>,
}

/// Speaking time for `text` at 150 words per minute, never below two seconds.
pub fn estimate_duration_ms(text: &str) -> u64 {
    let words = text.split_whitespace().count() as f64;
    let ms = (words / WORDS_PER_MINUTE * 60_000.0) as u64;
    ms.max(MIN_ESTIMATED_MS)
}

impl SegmentSpec {
    pub fn new(text: impl Into<String>, emotion: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emotion: emotion.into(),
            on_screen_text: None,
            visuals: Vec::new(),
            clips: None,
            duration: None,
            chart_video: None,
        }
    }

    /// Attach clips. A lone clip without a trigger collapses to `visuals`.
    pub fn with_clips(mut self, clips: Vec<ClipSpec>) -> Self {
        match clips.as_slice() {
            [] => {}
            [only] if only.trigger.is_none() => self.visuals = only.tags.clone(),
            _ => self.clips = Some(clips),
        }
        self
    }

    pub fn duration_ms(&self) -> u64 {
        match self.duration.filter(|d| *d > 0.0) {
            Some(seconds) => (seconds * 1000.0) as u64,
            None => estimate_duration_ms(&self.text),
        }
    }

    pub fn to_segment(&self, id: u32, start_ms: u64) -> Segment {
        let visual_clips = self.clips.as_ref().filter(|c| !c.is_empty()).map(|clips| {
            let share = 100.0 / clips.len() as f64;
            clips
                .iter()
                .map(|clip| VisualClip {
                    tags: clip.tags.clone(),
                    duration_pct: clip.duration_pct.unwrap_or(share),
                    trigger: clip.trigger.clone(),
                })
                .collect()
        });

        let mut segment = Segment::new(id, start_ms, start_ms + self.duration_ms(), self.text.clone());
        segment.on_screen_text = self.on_screen_text.clone();
        segment.visual_tags = self.visuals.clone();
        segment.visual_clips = visual_clips;
        segment.emotion = Some(self.emotion.clone());
        segment.chart_video = self.chart_video.clone();
        segment
    }
}

fn default_title() -> String {
    "Untitled Video".to_string()
}

fn default_voice_id() -> String {
    crate::voice::DEFAULT_VOICE.to_string()
}

fn default_voice_speed() -> VoiceSpeed {
    VoiceSpeed::Fast
}

fn default_music() -> String {
    "inspirational".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out/generated")
}

fn default_disclaimer() -> String {
    "Educational content only.".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSpec {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_voice_speed")]
    pub voice_speed: VoiceSpeed,
    #[serde(default = "default_music")]
    pub music: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
    #[serde(default)]
    pub segments: Vec<SegmentSpec>,
}

impl VideoSpec {
    pub fn new(title: impl Into<String>, segments: Vec<SegmentSpec>) -> Self {
        Self {
            title: title.into(),
            voice_id: default_voice_id(),
            voice_speed: default_voice_speed(),
            music: default_music(),
            output_dir: default_output_dir(),
            disclaimer: default_disclaimer(),
            segments,
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let spec: VideoSpec = serde_yaml::from_str(text).context("Failed to parse YAML video spec")?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let spec: VideoSpec = serde_json::from_str(text).context("Failed to parse JSON video spec")?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load by extension: `.yaml`/`.yml` or `.json`.
    pub async fn load(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read video spec: {}", path.display()))?;
        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text),
            "json" => Self::from_json_str(&text),
            other => Err(PipelineError::invalid_spec(format!("unsupported file type: .{other}")).into()),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.segments.is_empty() {
            return Err(PipelineError::invalid_spec("no segments"));
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.text.trim().is_empty() {
                return Err(PipelineError::invalid_spec(format!("segment {} has no text", i + 1)));
            }
            if let Some(clips) = &seg.clips {
                if clips.iter().any(|c| c.duration_pct.is_some_and(|p| !(0.0..=100.0).contains(&p))) {
                    return Err(PipelineError::invalid_spec(format!(
                        "segment {}: duration_pct must be within 0..=100",
                        i + 1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Script with 1-based ids and back-to-back timing.
    pub fn to_script(&self) -> Script {
        let mut segments = Vec::with_capacity(self.segments.len());
        let mut current_ms = 0u64;
        for (i, spec) in self.segments.iter().enumerate() {
            let segment = spec.to_segment(i as u32 + 1, current_ms);
            current_ms = segment.end_ms;
            segments.push(segment);
        }
        Script {
            title: self.title.clone(),
            target_seconds: ((current_ms / 1000) as u32).max(1),
            segments,
            disclaimer: self.disclaimer.clone(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize video spec")
    }

    pub async fn save_yaml(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(path, self.to_yaml()?)
            .await
            .with_context(|| format!("Failed to write video spec: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
title: Nvidia in 30 seconds
voice_speed: medium
segments:
  - text: Nvidia just posted a record quarter.
    emotion: excited
    visuals: [gpu, data center]
  - text: Data center revenue tripled while gaming held steady.
    duration: 4.5
    clips:
      - tags: [server room]
      - tags: [gaming setup]
        trigger: gaming
"#;

    #[test]
    fn yaml_defaults_and_overrides() {
        let spec = VideoSpec::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(spec.title, "Nvidia in 30 seconds");
        assert_eq!(spec.voice_id, "en-US-Studio-O");
        assert_eq!(spec.voice_speed, VoiceSpeed::Medium);
        assert_eq!(spec.music, "inspirational");
        assert_eq!(spec.output_dir, PathBuf::from("out/generated"));
        assert_eq!(spec.segments[1].emotion, "neutral");
    }

    #[test]
    fn script_timing_is_cumulative() {
        let script = VideoSpec::from_yaml_str(SAMPLE).unwrap().to_script();
        let first = &script.segments[0];
        // six words -> 2400ms
        assert_eq!((first.id, first.start_ms, first.end_ms), (1, 0, 2400));
        let second = &script.segments[1];
        assert_eq!((second.id, second.start_ms, second.end_ms), (2, 2400, 6900));
        assert_eq!(script.total_duration_ms(), 6900);
        assert_eq!(script.target_seconds, 6);
    }

    #[test]
    fn clip_share_defaults_to_even_split() {
        let script = VideoSpec::from_yaml_str(SAMPLE).unwrap().to_script();
        let clips = script.segments[1].clips();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].duration_pct, 50.0);
        assert_eq!(clips[1].trigger.as_deref(), Some("gaming"));
    }

    #[test]
    fn short_text_gets_minimum_duration() {
        assert_eq!(estimate_duration_ms("Hi"), 2000);
        assert_eq!(estimate_duration_ms(&"word ".repeat(300)), 120_000);
    }

    #[test]
    fn single_untriggered_clip_becomes_visuals() {
        let seg = SegmentSpec::new("x", "neutral").with_clips(vec![ClipSpec {
            tags: vec!["city".into()],
            duration_pct: None,
            trigger: None,
        }]);
        assert_eq!(seg.visuals, vec!["city"]);
        assert!(seg.clips.is_none());
    }

    #[test]
    fn empty_spec_is_rejected() {
        assert!(VideoSpec::from_yaml_str("title: nothing\n").is_err());
        assert!(VideoSpec::from_json_str(r#"{"segments": [{"text": "  "}]}"#).is_err());
    }

    #[tokio::test]
    async fn yaml_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.yaml");
        let spec = VideoSpec::new("Round", vec![SegmentSpec::new("Hello there", "curious")]);
        spec.save_yaml(&path).await.unwrap();
        let loaded = VideoSpec::load(&path).await.unwrap();
        assert_eq!(loaded, spec);

        let bad = dir.path().join("spec.txt");
        tokio::fs::write(&bad, "x").await.unwrap();
        assert!(VideoSpec::load(&bad).await.is_err());
    }
}
