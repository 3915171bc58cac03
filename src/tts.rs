//! Narration synthesis: one batched request split on silence, or one
//! request per segment when batching is not possible.

use crate::api::google_tts::GoogleTts;
use crate::models::{Script, Segment, TtsResult, VoiceSpeed};
use crate::ssml::{SsmlOptions, enhance_narration, escape_text};
use crate::voice::VoiceSettings;
use crate::{ffmpeg, logi, logok, logw};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

/// Break inserted between segments in batch mode; the splitter looks for it.
pub const SPLIT_BREAK_MS: u64 = 1000;
/// Request-size ceiling of the synthesize endpoint.
pub const MAX_BATCH_CHARS: usize = 5000;

const SILENCE_NOISE_DB: i32 = -50;
const SILENCE_MIN_S: f64 = 0.8;
const SILENCE_KEEP_S: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct TtsOptions {
    pub voice: VoiceSettings,
    pub speed: VoiceSpeed,
    pub use_ai_control: bool,
    pub intensity: f64,
}

impl TtsOptions {
    pub fn new(voice: VoiceSettings) -> Self {
        Self {
            voice,
            speed: VoiceSpeed::Medium,
            use_ai_control: false,
            intensity: 1.0,
        }
    }
}

/// SSML fragment for one segment (no `<speak>` root).
pub fn segment_ssml(seg: &Segment, opts: &TtsOptions, with_pause: bool) -> String {
    let emphasis = seg.emphasis_words.as_deref().unwrap_or(&[]);
    let ssml_opts = SsmlOptions {
        emotion: seg.emotion.as_deref().unwrap_or("neutral"),
        use_ai_control: opts.use_ai_control,
        emphasis_words: emphasis,
        pause_after_ms: if with_pause { seg.pause_after_ms } else { None },
        intensity: opts.intensity,
        speed: opts.speed,
        disable_prosody: !opts.voice.supports_prosody(),
        disable_pitch: !opts.voice.supports_pitch(),
    };
    let enhanced = enhance_narration(&escape_text(seg.narration.trim()), &ssml_opts);
    enhanced
        .strip_prefix("<speak>")
        .and_then(|s| s.strip_suffix("</speak>"))
        .map(str::to_string)
        .unwrap_or(enhanced)
}

/// Whole-script `<speak>` document plus the ids of the segments it voices,
/// in order. Blank segments are left out.
pub fn build_batch_ssml(script: &Script, opts: &TtsOptions) -> (String, Vec<u32>) {
    let mut parts = Vec::new();
    let mut ids = Vec::new();
    for seg in script.segments.iter().filter(|s| !s.narration.trim().is_empty()) {
        if !ids.is_empty() {
            parts.push(format!("<break time=\"{}ms\"/>", SPLIT_BREAK_MS));
        }
        parts.push(segment_ssml(seg, opts, false));
        ids.push(seg.id);
    }
    (format!("<speak>{}</speak>", parts.concat()), ids)
}

/// Synthesize every non-blank segment into `outdir/segNN.mp3`.
pub async fn synthesize_segments(
    tts: &GoogleTts,
    script: &Script,
    outdir: &Path,
    opts: &TtsOptions,
) -> Result<HashMap<u32, TtsResult>> {
    fs::create_dir_all(outdir)
        .await
        .with_context(|| format!("Failed to create dir {}", outdir.display()))?;

    match synthesize_batch(tts, script, outdir, opts).await {
        Ok(Some(results)) => {
            logok(format!("Batch narration split into {} segments", results.len()));
            return Ok(results);
        }
        Ok(None) => {}
        Err(err) => logw(format!("Batch TTS failed: {:#}. Falling back to individual segments.", err)),
    }
    synthesize_individually(tts, script, outdir, opts).await
}

/// `Ok(None)` means batching is not applicable and the caller should fall back.
async fn synthesize_batch(
    tts: &GoogleTts,
    script: &Script,
    outdir: &Path,
    opts: &TtsOptions,
) -> Result<Option<HashMap<u32, TtsResult>>> {
    let (ssml, ids) = build_batch_ssml(script, opts);
    if ids.is_empty() {
        return Ok(Some(HashMap::new()));
    }
    if ssml.chars().count() > MAX_BATCH_CHARS {
        logw("Script too long for single batch TTS. Falling back to segment-by-segment.");
        return Ok(None);
    }

    let audio = tts.synthesize(&ssml, &opts.voice).await?;
    let full = outdir.join("full_narration.wav");
    fs::write(&full, &audio)
        .await
        .with_context(|| format!("Failed to write {}", full.display()))?;

    let chunks = ffmpeg::split_on_silence(&full, SILENCE_NOISE_DB, SILENCE_MIN_S, SILENCE_KEEP_S).await?;
    if chunks.len() != ids.len() {
        logw(format!(
            "Split {} audio chunks but expected {}; synthesizing individually",
            chunks.len(),
            ids.len()
        ));
        return Ok(None);
    }

    let mut results = HashMap::new();
    for (id, chunk) in ids.iter().zip(chunks) {
        let path = outdir.join(format!("seg{:02}.mp3", id));
        if !ffmpeg::extract_audio_span(&full, chunk.start_s, chunk.end_s, &path).await? {
            return Ok(None);
        }
        results.insert(
            *id,
            TtsResult {
                segment_id: *id,
                audio_path: path,
                duration_ms: ((chunk.end_s - chunk.start_s) * 1000.0).round() as u64,
            },
        );
    }
    Ok(Some(results))
}

async fn synthesize_individually(
    tts: &GoogleTts,
    script: &Script,
    outdir: &Path,
    opts: &TtsOptions,
) -> Result<HashMap<u32, TtsResult>> {
    let mut results = HashMap::new();
    for seg in &script.segments {
        if seg.narration.trim().is_empty() {
            continue;
        }
        let ssml = format!("<speak>{}</speak>", segment_ssml(seg, opts, true));
        let audio = match tts.synthesize(&ssml, &opts.voice).await {
            Ok(audio) => audio,
            Err(err) => {
                logw(format!("TTS failed for segment {}: {:#}", seg.id, err));
                continue;
            }
        };

        let raw = outdir.join(format!("seg{:02}_raw.wav", seg.id));
        let mp3 = outdir.join(format!("seg{:02}.mp3", seg.id));
        fs::write(&raw, &audio)
            .await
            .with_context(|| format!("Failed to write {}", raw.display()))?;

        match ffmpeg::normalize_speech(&raw, &mp3).await {
            Ok(true) => {
                fs::remove_file(&raw).await.ok();
            }
            Ok(false) | Err(_) => {
                logw(format!("Keeping raw audio for segment {}", seg.id));
                fs::rename(&raw, &mp3).await.ok();
            }
        }

        let duration_ms = match ffmpeg::ffprobe_duration_ms(&mp3).await {
            Ok(ms) if ms > 0 => ms,
            _ => seg.duration_ms(),
        };
        logi(format!("Segment {} narration: {} ms", seg.id, duration_ms));
        results.insert(
            seg.id,
            TtsResult {
                segment_id: seg.id,
                audio_path: mp3,
                duration_ms,
            },
        );
    }
    Ok(results)
}
