//! Plain records passed from one pipeline stage to the next.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoType {
    #[default]
    StockAnalysis,
    CompanyStory,
}

impl VideoType {
    pub fn display_name(self) -> &'static str {
        match self {
            VideoType::StockAnalysis => "Stock Analysis",
            VideoType::CompanyStory => "Company Story",
        }
    }

    pub fn prompt_hint(self) -> &'static str {
        match self {
            VideoType::StockAnalysis => {
                "Focus on recent price movements, key metrics, and what's driving the stock"
            }
            VideoType::CompanyStory => {
                "Focus on the company's history, major milestones, and long-term growth trajectory"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VideoStyle {
    #[default]
    SocialMedia,
    Documentary,
}

impl VideoStyle {
    pub fn default_seconds(self) -> u32 {
        match self {
            VideoStyle::SocialMedia => 45,
            VideoStyle::Documentary => 300,
        }
    }

    pub fn segment_hint(self) -> &'static str {
        match self {
            VideoStyle::SocialMedia => "3-8 seconds each",
            VideoStyle::Documentary => "10-25 seconds each",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum VoiceSpeed {
    Slow,
    #[default]
    Medium,
    Fast,
    VeryFast,
}

impl VoiceSpeed {
    pub fn multiplier(self) -> f64 {
        match self {
            VoiceSpeed::Slow => 0.9,
            VoiceSpeed::Medium => 1.0,
            VoiceSpeed::Fast => 1.15,
            VoiceSpeed::VeryFast => 1.25,
        }
    }
}

fn default_target_seconds() -> u32 {
    45
}

fn default_mood() -> String {
    "excited".to_string()
}

fn default_intensity() -> f64 {
    1.0
}

/// User request for the single-call pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputData {
    pub topic: String,
    #[serde(default)]
    pub stock_symbol: Option<String>,
    #[serde(default)]
    pub video_type: VideoType,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub news: Vec<String>,
    #[serde(default = "default_target_seconds")]
    pub target_seconds: u32,
    #[serde(default)]
    pub video_style: VideoStyle,
    #[serde(default = "default_mood")]
    pub mood: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub force_cache_refresh: bool,
    #[serde(default)]
    pub voice_speed: VoiceSpeed,
    #[serde(default = "default_intensity")]
    pub emotion_intensity: f64,
}

impl InputData {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            stock_symbol: None,
            video_type: VideoType::default(),
            facts: Vec::new(),
            news: Vec::new(),
            target_seconds: default_target_seconds(),
            video_style: VideoStyle::default(),
            mood: default_mood(),
            voice_id: None,
            force_cache_refresh: false,
            voice_speed: VoiceSpeed::default(),
            emotion_intensity: default_intensity(),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.topic.trim().is_empty() {
            return Err(PipelineError::invalid_input("topic must not be empty"));
        }
        if self.target_seconds == 0 {
            return Err(PipelineError::invalid_input("target_seconds must be positive"));
        }
        if !(0.0..=2.0).contains(&self.emotion_intensity) {
            return Err(PipelineError::invalid_input(format!(
                "emotion_intensity must be within 0.0..=2.0 (got {})",
                self.emotion_intensity
            )));
        }
        Ok(())
    }
}

fn default_duration_pct() -> f64 {
    100.0
}

/// One stock clip inside a segment, optionally switched in by a trigger phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualClip {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_duration_pct")]
    pub duration_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl VisualClip {
    pub fn new(tags: Vec<String>) -> Self {
        Self {
            tags,
            duration_pct: default_duration_pct(),
            trigger: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub narration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_screen_text: Option<String>,
    #[serde(default)]
    pub visual_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_clips: Option<Vec<VisualClip>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default)]
    pub sfx: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm_mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emphasis_words: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_video: Option<PathBuf>,
}

impl Segment {
    pub fn new(id: u32, start_ms: u64, end_ms: u64, narration: impl Into<String>) -> Self {
        Self {
            id,
            start_ms,
            end_ms,
            narration: narration.into(),
            on_screen_text: None,
            visual_tags: Vec::new(),
            visual_clips: None,
            emotion: None,
            sfx: Vec::new(),
            bgm_mood: None,
            emphasis_words: None,
            pause_after_ms: None,
            chart_video: None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Clips to fetch for this segment; an empty list means "use `visual_tags`".
    pub fn clips(&self) -> &[VisualClip] {
        self.visual_clips.as_deref().unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.id == 0 {
            return Err(PipelineError::invalid_input("segment id must be positive"));
        }
        if self.end_ms <= self.start_ms {
            return Err(PipelineError::invalid_input(format!(
                "segment {}: end_ms must be greater than start_ms",
                self.id
            )));
        }
        for clip in self.clips() {
            if !(0.0..=100.0).contains(&clip.duration_pct) {
                return Err(PipelineError::invalid_input(format!(
                    "segment {}: duration_pct must be within 0..=100",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    pub target_seconds: u32,
    pub segments: Vec<Segment>,
    pub disclaimer: String,
}

impl Script {
    pub fn total_duration_ms(&self) -> u64 {
        self.segments.last().map(|s| s.end_ms).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.target_seconds == 0 {
            return Err(PipelineError::invalid_input("target_seconds must be positive"));
        }
        for segment in &self.segments {
            segment.validate()?;
        }
        Ok(())
    }

    pub fn segment(&self, id: u32) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }
}

/// A downloaded stock clip or rendered chart clip bound to a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAsset {
    pub segment_id: u32,
    pub source_url: String,
    pub file_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_ms: u64,
    #[serde(default)]
    pub trim_start_ms: u64,
    #[serde(default)]
    pub trim_end_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsResult {
    pub segment_id: u32,
    pub audio_path: PathBuf,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSegment {
    pub segment_id: u32,
    pub video_path: PathBuf,
    /// Only the first clip of a segment carries the narration.
    pub audio_path: Option<PathBuf>,
    pub start_ms: u64,
    pub end_ms: u64,
    pub scale_to: String,
    pub center_crop: bool,
    pub fade_frames: u32,
    pub clip_index: usize,
    pub total_clips: usize,
    pub clip_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    pub resolution: String,
    pub fps: u32,
    pub total_ms: u64,
    pub segments: Vec<RenderSegment>,
    pub output_path: PathBuf,
    pub bgm_path: Option<PathBuf>,
    pub srt_path: Option<PathBuf>,
}
