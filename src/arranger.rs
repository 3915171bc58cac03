//! Turns a script plus fetched assets into a render plan.
//!
//! Clip switch points inside a segment are placed where each clip's trigger
//! phrase appears in the narration. Character offset stands in for speech
//! time, which holds up because the speaking rate is roughly constant
//! within one segment.

use crate::config::Settings;
use crate::error::PipelineError;
use crate::logw;
use crate::models::{RenderPlan, RenderSegment, Script, TtsResult, VisualAsset, VisualClip};
use std::collections::HashMap;
use std::path::Path;

pub const MIN_CLIP_MS: u64 = 100;

/// Character offset of `needle` in `haystack`, ignoring case.
fn find_char_offset(haystack_lower: &str, needle: &str) -> Option<usize> {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    haystack_lower
        .find(&needle)
        .map(|byte_pos| haystack_lower[..byte_pos].chars().count())
}

/// Make `durations` sum to `total` by adjusting the last entry, borrowing
/// from the longest earlier clips if the last one would drop below the floor.
fn settle_last(durations: &mut [i64], total: i64, floor: i64) {
    let Some(last) = durations.len().checked_sub(1) else {
        return;
    };
    let head: i64 = durations[..last].iter().sum();
    durations[last] = total - head;

    while durations[last] < floor {
        let donor = (0..last)
            .filter(|&i| durations[i] > floor)
            .max_by_key(|&i| durations[i]);
        let Some(donor) = donor else {
            break;
        };
        let take = (durations[donor] - floor).min(floor - durations[last]);
        durations[donor] -= take;
        durations[last] += take;
    }
}

fn to_unsigned(durations: Vec<i64>) -> Vec<u64> {
    durations.into_iter().map(|d| d.max(0) as u64).collect()
}

pub fn even_split(n: usize, total_ms: u64) -> Vec<u64> {
    if n == 0 {
        return Vec::new();
    }
    let mut durations = vec![(total_ms / n as u64) as i64; n];
    settle_last(&mut durations, total_ms as i64, 0);
    to_unsigned(durations)
}

/// Split by each clip's `duration_pct`, or evenly when a clip has none.
/// The last clip absorbs rounding.
pub fn split_by_percent(clips: &[VisualClip], total_ms: u64) -> Vec<u64> {
    if clips.is_empty() {
        return Vec::new();
    }
    let n = clips.len() as u64;
    let mut durations: Vec<i64> = clips
        .iter()
        .map(|clip| {
            if clip.duration_pct > 0.0 {
                (total_ms as f64 * clip.duration_pct / 100.0) as i64
            } else {
                (total_ms / n) as i64
            }
        })
        .collect();
    settle_last(&mut durations, total_ms as i64, 0);
    to_unsigned(durations)
}

/// Per-clip durations (ms) that sum to `total_ms`, driven by trigger phrases.
///
/// With no narration or no clips the result is `[total]` for a single clip
/// and empty otherwise. When no trigger is found the split falls back to
/// `duration_pct`. Each clip gets at least [`MIN_CLIP_MS`] when the total
/// leaves room for it; otherwise the total is split evenly.
pub fn calculate_trigger_timings(
    narration: &str,
    clips: &[VisualClip],
    total_ms: u64,
) -> Vec<u64> {
    let num_clips = clips.len();
    let lower = narration.to_lowercase();
    let text_len = lower.chars().count();

    if text_len == 0 || num_clips == 0 {
        return if num_clips == 1 { vec![total_ms] } else { Vec::new() };
    }

    let positions: Vec<Option<usize>> = clips
        .iter()
        .map(|clip| {
            clip.trigger
                .as_deref()
                .and_then(|t| find_char_offset(&lower, t))
        })
        .collect();

    if positions.iter().all(Option::is_none) {
        return split_by_percent(clips, total_ms);
    }
    // the floor cannot hold for every clip
    if total_ms < MIN_CLIP_MS * num_clips as u64 {
        return even_split(num_clips, total_ms);
    }

    let mut switch_points = Vec::with_capacity(num_clips + 1);
    switch_points.push(0.0f64);
    for (i, pos) in positions.iter().enumerate().skip(1) {
        let point = match pos {
            Some(p) => *p as f64 / text_len as f64,
            None => {
                let prev = switch_points.last().copied().unwrap_or(0.0);
                let remaining = (num_clips - i) as f64;
                prev + (1.0 - prev) / (remaining + 1.0)
            }
        };
        switch_points.push(point);
    }
    switch_points.push(1.0);

    let floor = MIN_CLIP_MS as i64;
    let mut durations: Vec<i64> = switch_points
        .windows(2)
        .map(|w| ((total_ms as f64 * (w[1] - w[0])) as i64).max(floor))
        .collect();

    let total = total_ms as i64;
    if durations.iter().sum::<i64>() != total {
        settle_last(&mut durations, total, floor);
    }
    to_unsigned(durations)
}

/// Build the render plan. Segments lacking visuals or audio are skipped with
/// a warning; if none remain the plan cannot be built.
pub fn build_render_plan(
    script: &Script,
    visuals: &HashMap<u32, Vec<VisualAsset>>,
    tts: &HashMap<u32, TtsResult>,
    output_path: &Path,
    settings: &Settings,
) -> Result<RenderPlan, PipelineError> {
    let mut segments = Vec::new();
    let mut missing = Vec::new();
    let mut current_ms = 0u64;

    for seg in &script.segments {
        let (Some(assets), Some(audio)) = (visuals.get(&seg.id), tts.get(&seg.id)) else {
            missing.push(seg.id);
            continue;
        };
        if assets.is_empty() {
            missing.push(seg.id);
            continue;
        }

        let duration_ms = audio.duration_ms;
        let start_ms = current_ms;
        let end_ms = current_ms + duration_ms;
        let num_clips = assets.len();
        let clips = seg.clips();

        // a failed clip download leaves fewer assets than clips; split evenly then
        let clip_durations = if clips.len() != num_clips {
            even_split(num_clips, duration_ms)
        } else if clips.iter().any(|c| c.trigger.is_some()) {
            calculate_trigger_timings(&seg.narration, clips, duration_ms)
        } else {
            split_by_percent(clips, duration_ms)
        };

        for (clip_index, asset) in assets.iter().enumerate() {
            segments.push(RenderSegment {
                segment_id: seg.id,
                video_path: asset.file_path.clone(),
                audio_path: (clip_index == 0).then(|| audio.audio_path.clone()),
                start_ms,
                end_ms,
                scale_to: settings.resolution.clone(),
                center_crop: true,
                fade_frames: if num_clips > 1 { 3 } else { 5 },
                clip_index,
                total_clips: num_clips,
                clip_duration_ms: Some(
                    clip_durations.get(clip_index).copied().unwrap_or(duration_ms),
                ),
            });
        }

        current_ms = end_ms;
    }

    if segments.is_empty() {
        return Err(PipelineError::NoRenderableSegments);
    }
    if !missing.is_empty() {
        logw(format!("Skipping segments {:?} due to missing assets", missing));
    }

    Ok(RenderPlan {
        resolution: settings.resolution.clone(),
        fps: settings.fps,
        total_ms: current_ms,
        segments,
        output_path: output_path.to_path_buf(),
        bgm_path: None,
        srt_path: None,
    })
}
