//! End-to-end flows: an `InputData` request to a finished video, a video
//! spec to a finished video, and agentic generation of a video spec.

use crate::agents::{self, Progress, SpecOptions};
use crate::api::build_http_client;
use crate::api::cdn::CdnClient;
use crate::api::google_tts::GoogleTts;
use crate::api::openai::OpenAiClient;
use crate::arranger::build_render_plan;
use crate::charts::render::ChartRenderer;
use crate::config::Settings;
use crate::error::PipelineError;
use crate::footage::{FootageFetcher, VisualFetchOptions, fetch_background_music, fetch_visuals_for_script};
use crate::models::{InputData, Script, Segment, VoiceSpeed};
use crate::script::generate_script;
use crate::sources::default_sources;
use crate::subtitles::write_srt;
use crate::tts::{TtsOptions, synthesize_segments};
use crate::video_spec::VideoSpec;
use crate::voice::{VoiceSettings, resolve_voice, voice_by_name};
use crate::{logi, logok, logw, render};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

pub const VIDEO_FILE: &str = "video.mp4";
pub const SRT_FILE: &str = "subtitles.srt";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Files written by a finished run.
#[derive(Debug, Clone)]
pub struct VideoOutput {
    pub video: PathBuf,
    pub subtitles: PathBuf,
    pub manifest: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub disclaimer: String,
    pub segments: Vec<Segment>,
    pub output: PathBuf,
}

impl Manifest {
    /// Manifest for the single-call flow, which knows its target length.
    pub fn for_request(script: &Script, output: &Path) -> Self {
        Self {
            title: script.title.clone(),
            target_seconds: Some(script.target_seconds),
            duration_seconds: None,
            disclaimer: script.disclaimer.clone(),
            segments: script.segments.clone(),
            output: output.to_path_buf(),
        }
    }

    /// Manifest for spec renders, which only know the estimated length.
    pub fn for_spec(script: &Script, output: &Path) -> Self {
        Self {
            title: script.title.clone(),
            target_seconds: None,
            duration_seconds: Some(script.total_duration_ms() as f64 / 1000.0),
            disclaimer: script.disclaimer.clone(),
            segments: script.segments.clone(),
            output: output.to_path_buf(),
        }
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write manifest: {}", path.display()))
    }
}

/// How a script becomes a video.
#[derive(Debug, Clone)]
pub struct ProduceOptions {
    pub voice: VoiceSettings,
    pub speed: VoiceSpeed,
    pub music_mood: String,
    pub use_ai_control: bool,
    pub intensity: f64,
    pub force_refresh: bool,
    pub burn_subtitles: bool,
}

/// Footage, narration, music, subtitles and the final encode for `script`.
/// Subtitles are written after probing and before the encode so they can be
/// burned in.
pub async fn produce_video(
    settings: &Settings,
    client: &Client,
    script: &Script,
    out_dir: &Path,
    opts: &ProduceOptions,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create dir {}", out_dir.display()))?;

    logi(format!("Fetching footage for {} segments", script.segments.len()));
    let fetcher = Arc::new(FootageFetcher::new(
        client.clone(),
        default_sources(client, settings),
        settings.target_dims(),
    ));
    let visuals = fetch_visuals_for_script(
        fetcher,
        script,
        &settings.videos_dir(),
        VisualFetchOptions {
            force_refresh: opts.force_refresh,
            target: settings.target_dims(),
            fps: settings.fps,
        },
    )
    .await?;

    logi(format!("Synthesizing narration with {}", opts.voice.name));
    let tts_client = GoogleTts::new(client.clone(), settings.google_api_key.clone());
    let tts_opts = TtsOptions {
        voice: opts.voice.clone(),
        speed: opts.speed,
        use_ai_control: opts.use_ai_control,
        intensity: opts.intensity,
    };
    let tts = synthesize_segments(&tts_client, script, &settings.audio_dir(), &tts_opts).await?;

    let bgm = fetch_background_music(client, &opts.music_mood, &settings.audio_dir()).await;

    let srt_path = out_dir.join(SRT_FILE);
    let video_path = out_dir.join(VIDEO_FILE);
    let mut plan = build_render_plan(script, &visuals, &tts, &video_path, settings)?;
    plan.bgm_path = bgm;
    if opts.burn_subtitles {
        plan.srt_path = Some(srt_path.clone());
    }

    let job = render::prepare(&plan).await?;
    write_srt(&rendered_script(script, &job.segment_ids), &tts, &srt_path).await?;
    let video = render::encode(&plan, &job).await?;
    Ok((video, srt_path))
}

/// `script` narrowed to the segments that reach the final video, so cue
/// times follow the audio that is actually there.
pub fn rendered_script(script: &Script, segment_ids: &[u32]) -> Script {
    Script {
        segments: script
            .segments
            .iter()
            .filter(|s| segment_ids.contains(&s.id))
            .cloned()
            .collect(),
        ..script.clone()
    }
}

/// Voice from an explicit id or alias, else the configured default.
pub fn pick_voice(explicit: Option<&str>, settings: &Settings) -> VoiceSettings {
    match explicit.map(str::trim).filter(|v| !v.is_empty()) {
        Some(id) => resolve_voice(id),
        None => voice_by_name(&settings.default_voice_name),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub use_ai_speech: Option<bool>,
    pub burn_subtitles: bool,
}

/// Single-call script generation followed by production.
pub async fn run_pipeline(settings: &Settings, input: &InputData, out_dir: &Path, opts: &RunOptions) -> Result<VideoOutput> {
    settings.ensure_valid()?;
    input.validate()?;

    let client = build_http_client(settings)?;
    let use_ai_speech = opts.use_ai_speech.unwrap_or(settings.use_ai_speech_control);
    let llm = OpenAiClient::new(client.clone(), settings);
    let script = generate_script(&llm, input, use_ai_speech).await?;

    let produce = ProduceOptions {
        voice: pick_voice(input.voice_id.as_deref(), settings),
        speed: input.voice_speed,
        music_mood: input.mood.clone(),
        use_ai_control: use_ai_speech,
        intensity: input.emotion_intensity,
        force_refresh: input.force_cache_refresh,
        burn_subtitles: opts.burn_subtitles,
    };
    let (video, subtitles) = produce_video(settings, &client, &script, out_dir, &produce).await?;

    let manifest = out_dir.join(MANIFEST_FILE);
    Manifest::for_request(&script, &video).write(&manifest).await?;
    logok(format!("Done: {}", video.display()));
    Ok(VideoOutput {
        video,
        subtitles,
        manifest,
    })
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub output_dir: Option<PathBuf>,
    pub force_refresh: bool,
    pub burn_subtitles: bool,
}

/// Render a declarative video spec.
pub async fn create_video(settings: &Settings, spec: &VideoSpec, opts: &CreateOptions) -> Result<VideoOutput> {
    settings.ensure_valid()?;
    spec.validate()?;

    let out_dir = opts.output_dir.clone().unwrap_or_else(|| spec.output_dir.clone());
    let script = spec.to_script();
    logi(format!(
        "Creating video: {} (~{:.1}s, {} segments)",
        spec.title,
        script.total_duration_ms() as f64 / 1000.0,
        script.segments.len()
    ));

    let client = build_http_client(settings)?;
    let produce = ProduceOptions {
        voice: resolve_voice(&spec.voice_id),
        speed: spec.voice_speed,
        music_mood: spec.music.clone(),
        use_ai_control: false,
        intensity: 1.0,
        force_refresh: opts.force_refresh,
        burn_subtitles: opts.burn_subtitles,
    };
    let (video, subtitles) = produce_video(settings, &client, &script, &out_dir, &produce).await?;

    let manifest = out_dir.join(MANIFEST_FILE);
    Manifest::for_spec(&script, &video).write(&manifest).await?;
    logok(format!("Video created: {}", video.display()));
    Ok(VideoOutput {
        video,
        subtitles,
        manifest,
    })
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// YAML destination; `videos/<slug>.yaml` when unset.
    pub output: Option<PathBuf>,
    pub skip_charts: bool,
    pub create_video: bool,
    pub force_refresh: bool,
    pub burn_subtitles: bool,
    pub spec: SpecOptions,
}

#[derive(Debug, Clone)]
pub struct GenerateOutput {
    pub spec: VideoSpec,
    pub yaml_path: PathBuf,
    pub video: Option<VideoOutput>,
}

pub fn default_spec_path(topic: &str) -> PathBuf {
    PathBuf::from("videos").join(format!("{}.yaml", agents::topic_slug(topic)))
}

/// Agentic script generation into a YAML video spec, with charts rendered
/// unless skipped, optionally followed by [`create_video`].
pub async fn generate_spec(
    settings: &Settings,
    input: &InputData,
    opts: &GenerateOptions,
    progress: Option<Progress<'_>>,
) -> Result<GenerateOutput> {
    if opts.create_video {
        settings.ensure_valid()?;
    } else if settings.openai_api_key.trim().is_empty() {
        return Err(PipelineError::MissingConfig(vec!["OPENAI_API_KEY".to_string()]).into());
    }

    let client = build_http_client(settings)?;
    let llm = OpenAiClient::new(client.clone(), settings);
    let cdn = CdnClient::from_settings(client.clone(), settings);

    let generated =
        agents::generate_script_only(&llm, cdn.as_ref(), input, &opts.spec, &settings.charts_dir(), progress).await?;
    let mut spec = generated.spec;

    if !opts.skip_charts && !generated.charts.is_empty() {
        match ChartRenderer::from_settings(settings) {
            Some(renderer) => {
                let n = agents::render_charts(&mut spec, &generated.charts, &renderer, &settings.videos_dir()).await;
                logok(format!("Rendered {}/{} chart(s)", n, generated.charts.len()));
            }
            None => logw("CHART_RENDERER_CMD not set; chart segments use stock footage"),
        }
    }

    let yaml_path = opts.output.clone().unwrap_or_else(|| default_spec_path(&input.topic));
    spec.save_yaml(&yaml_path).await?;
    logok(format!("Script saved to: {}", yaml_path.display()));

    let video = if opts.create_video {
        let create = CreateOptions {
            output_dir: None,
            force_refresh: opts.force_refresh,
            burn_subtitles: opts.burn_subtitles,
        };
        Some(create_video(settings, &spec, &create).await?)
    } else {
        None
    };

    Ok(GenerateOutput { spec, yaml_path, video })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TtsResult;
    use crate::subtitles::build_cues;
    use serde_json::json;
    use std::collections::HashMap;

    fn script() -> Script {
        Script {
            title: "Nvidia".into(),
            target_seconds: 45,
            segments: vec![Segment::new(1, 0, 2500, "One."), Segment::new(2, 2500, 4000, "Two.")],
            disclaimer: "Educational only.".into(),
        }
    }

    #[test]
    fn manifests_differ_by_flow() {
        let out = Path::new("out/nvidia/video.mp4");
        let request = serde_json::to_value(Manifest::for_request(&script(), out)).unwrap();
        assert_eq!(request["title"], "Nvidia");
        assert_eq!(request["target_seconds"], 45);
        assert_eq!(request["disclaimer"], "Educational only.");
        assert_eq!(request["output"], "out/nvidia/video.mp4");
        assert!(request.get("duration_seconds").is_none());
        let spec = serde_json::to_value(Manifest::for_spec(&script(), out)).unwrap();
        assert_eq!(spec["duration_seconds"], 4.0);
        assert!(spec.get("target_seconds").is_none());
    }

    #[test]
    fn explicit_voice_wins() {
        let settings = Settings::default();
        assert_eq!(pick_voice(Some("en-US-Neural2-J"), &settings).name, "en-US-Neural2-J");
        assert_eq!(pick_voice(Some("  "), &settings).name, settings.default_voice_name);
        assert_eq!(pick_voice(None, &settings).name, settings.default_voice_name);
    }

    #[test]
    fn spec_path_from_topic() {
        assert_eq!(default_spec_path("Apple Inc."), PathBuf::from("videos/apple_inc.yaml"));
    }

    #[tokio::test]
    async fn generate_needs_an_llm_key() {
        let err = generate_spec(&Settings::default(), &InputData::new("Apple"), &GenerateOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::MissingConfig(_))));
    }

    #[tokio::test]
    async fn manifest_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        Manifest::for_request(&script(), Path::new("v.mp4")).write(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let segments = value["segments"].as_array().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(
            (&segments[1]["id"], &segments[1]["start_ms"], &segments[1]["end_ms"], &segments[1]["narration"]),
            (&json!(2), &json!(2500), &json!(4000), &json!("Two."))
        );
        let back: Vec<Segment> = serde_json::from_value(value["segments"].clone()).unwrap();
        assert_eq!(back, script().segments);
    }

    #[test]
    fn subtitles_skip_segments_left_out_of_the_render() {
        let mut script = script();
        script.segments.push(Segment::new(3, 4000, 6000, "Three."));
        let tts: HashMap<u32, TtsResult> = [(1, 2000), (2, 1200), (3, 1500)]
            .into_iter()
            .map(|(id, ms)| {
                let result = TtsResult {
                    segment_id: id,
                    audio_path: PathBuf::from(format!("a/{id}.mp3")),
                    duration_ms: ms,
                };
                (id, result)
            })
            .collect();

        let kept = rendered_script(&script, &[1, 3]);
        assert_eq!(kept.title, script.title);
        let cues = build_cues(&kept, &tts);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].text, "Three.");
        assert_eq!((cues[1].start_ms, cues[1].end_ms), (2000, 3500));
    }
}
