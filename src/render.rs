//! Final encode: one ffmpeg invocation whose filter graph fits every clip to
//! its slot, joins the segments, mixes music and burns subtitles.

use crate::error::PipelineError;
use crate::ffmpeg::{base_args, ffprobe_duration_seconds, run_cmd};
use crate::models::{RenderPlan, RenderSegment};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;

const BGM_VOLUME: f64 = 0.15;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderInput {
    pub path: PathBuf,
    /// Extra passes through the file (`-stream_loop`) for clips shorter
    /// than their slot.
    pub loops: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterJob {
    pub inputs: Vec<RenderInput>,
    pub filter: String,
    /// Voice duration of the segments that made it into the graph.
    pub total_s: f64,
    /// Segments that made it into the graph, in order.
    pub segment_ids: Vec<u32>,
}

fn parse_resolution(res: &str) -> Result<(u32, u32), PipelineError> {
    let bad = || PipelineError::invalid_input(format!("bad resolution '{}'", res));
    let lower = res.to_ascii_lowercase();
    let (w, h) = lower.split_once('x').ok_or_else(bad)?;
    Ok((w.trim().parse().map_err(|_| bad())?, h.trim().parse().map_err(|_| bad())?))
}

fn escape_with(text: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a path as an unquoted filter option value: once for the option
/// parser, then again for the filtergraph parser.
fn filter_path(path: &Path) -> String {
    let plain = path.display().to_string().replace('\\', "/");
    let option = escape_with(&plain, &['\\', '\'', ':']);
    escape_with(&option, &['\\', '\'', '[', ']', ',', ';'])
}

fn loops_needed(video_s: f64, slot_s: f64) -> u32 {
    if video_s <= 0.0 || video_s >= slot_s {
        0
    } else {
        (slot_s / video_s) as u32
    }
}

fn clip_chain(input: usize, (w, h): (u32, u32), fps: u32, slot_s: f64, fades: &[String], label: &str) -> String {
    let mut chain = vec![
        format!("scale={}:{}:force_original_aspect_ratio=increase", w, h),
        format!("crop={}:{}", w, h),
        "setsar=1".to_string(),
        format!("fps={}", fps),
        format!("trim=start=0:end={:.3}", slot_s),
        "setpts=PTS-STARTPTS".to_string(),
    ];
    chain.extend(fades.iter().cloned());
    format!("[{}:v]{}[{}]", input, chain.join(","), label)
}

fn fades(first: bool, last: bool, fade_s: f64, seg_s: f64) -> Vec<String> {
    let mut out = Vec::new();
    if fade_s > 0.0 {
        if first {
            out.push(format!("fade=t=in:st=0:d={:.3}", fade_s));
        }
        if last {
            out.push(format!("fade=t=out:st={:.3}:d={:.3}", (seg_s - fade_s).max(0.0), fade_s));
        }
    }
    out
}

/// Segment clips grouped by id in clip order, with the segment's audio.
fn group_segments(plan: &RenderPlan) -> BTreeMap<u32, Vec<&RenderSegment>> {
    let mut grouped: BTreeMap<u32, Vec<&RenderSegment>> = BTreeMap::new();
    for seg in &plan.segments {
        grouped.entry(seg.segment_id).or_default().push(seg);
    }
    for clips in grouped.values_mut() {
        clips.sort_by_key(|c| c.clip_index);
    }
    grouped
}

/// Build the filter graph from measured media durations (seconds, keyed by
/// path). Segments without audio or with unmeasured media are skipped.
pub fn build_filter_graph(plan: &RenderPlan, durations: &HashMap<PathBuf, f64>) -> Result<FilterJob, PipelineError> {
    let dims = parse_resolution(&plan.resolution)?;
    let fps = plan.fps.max(1);

    let grouped = group_segments(plan);
    let usable: Vec<(u32, Vec<&RenderSegment>, &Path, f64)> = grouped
        .into_iter()
        .filter_map(|(id, clips)| {
            let Some(audio) = clips.iter().find_map(|c| c.audio_path.as_deref()) else {
                logw(format!("No audio for segment {}, skipping", id));
                return None;
            };
            let audio_s = durations.get(audio).copied().filter(|d| *d > 0.0)?;
            if clips.iter().any(|c| !durations.contains_key(&c.video_path)) {
                logw(format!("Unreadable footage in segment {}, skipping", id));
                return None;
            }
            Some((id, clips, audio, audio_s))
        })
        .collect();
    if usable.is_empty() {
        return Err(PipelineError::NoRenderableSegments);
    }

    let mut inputs = Vec::new();
    let mut parts = Vec::new();
    let mut outputs = Vec::new();
    let mut total_s = 0.0;
    let last = usable.len() - 1;
    let segment_ids: Vec<u32> = usable.iter().map(|(id, ..)| *id).collect();

    for (n, (id, clips, audio, audio_s)) in usable.into_iter().enumerate() {
        total_s += audio_s;
        let a_input = inputs.len();
        inputs.push(RenderInput {
            path: audio.to_path_buf(),
            loops: 0,
        });

        let fade_s = clips[0].fade_frames as f64 / fps as f64;
        let seg_fades = fades(n == 0, n == last, fade_s, audio_s);
        let v_label = format!("v_seg{}", id);

        if clips.len() == 1 {
            let video = &clips[0].video_path;
            let v_input = inputs.len();
            inputs.push(RenderInput {
                path: video.clone(),
                loops: loops_needed(durations[video], audio_s),
            });
            parts.push(clip_chain(v_input, dims, fps, audio_s, &seg_fades, &v_label));
        } else {
            let even = audio_s / clips.len() as f64;
            let mut slots: Vec<f64> = clips
                .iter()
                .map(|c| c.clip_duration_ms.map_or(even, |ms| ms as f64 / 1000.0))
                .collect();
            let sum: f64 = slots.iter().sum();
            if sum > 0.0 {
                slots.iter_mut().for_each(|s| *s *= audio_s / sum);
            }

            let mut labels = String::new();
            for (ci, (clip, slot)) in clips.iter().zip(&slots).enumerate() {
                let v_input = inputs.len();
                inputs.push(RenderInput {
                    path: clip.video_path.clone(),
                    loops: loops_needed(durations[&clip.video_path], *slot),
                });
                let label = format!("v_seg{}_clip{}", id, ci);
                parts.push(clip_chain(v_input, dims, fps, *slot, &[], &label));
                labels.push_str(&format!("[{}]", label));
            }
            let post = if seg_fades.is_empty() {
                "null".to_string()
            } else {
                seg_fades.join(",")
            };
            parts.push(format!(
                "{}concat=n={}:v=1:a=0,{}[{}]",
                labels,
                clips.len(),
                post,
                v_label
            ));
        }

        let a_label = format!("a_seg{}", id);
        parts.push(format!("[{}:a]asetpts=PTS-STARTPTS[{}]", a_input, a_label));
        outputs.push((v_label, a_label));
    }

    let pairs: String = outputs.iter().map(|(v, a)| format!("[{}][{}]", v, a)).collect();
    let video_out = if plan.srt_path.is_some() { "vcat" } else { "vout" };
    parts.push(format!(
        "{}concat=n={}:v=1:a=1[{}][a_voice]",
        pairs,
        outputs.len(),
        video_out
    ));
    if let Some(srt) = &plan.srt_path {
        parts.push(format!("[vcat]subtitles={}[vout]", filter_path(srt)));
    }

    match &plan.bgm_path {
        Some(bgm) => {
            let idx = inputs.len();
            inputs.push(RenderInput {
                path: bgm.clone(),
                loops: 0,
            });
            parts.push(format!("[{}:a]aloop=loop=-1:size=2e9[bgm_looped]", idx));
            parts.push(format!(
                "[bgm_looped]atrim=0:{:.3},asetpts=PTS-STARTPTS,volume={}[bgm_ready]",
                total_s, BGM_VOLUME
            ));
            parts.push("[a_voice][bgm_ready]amix=inputs=2:duration=first:weights=1 0.7[aout]".to_string());
        }
        None => parts.push("[a_voice]anull[aout]".to_string()),
    }

    Ok(FilterJob {
        inputs,
        filter: parts.join(";"),
        total_s,
        segment_ids,
    })
}

pub fn ffmpeg_args(plan: &RenderPlan, job: &FilterJob) -> Vec<String> {
    let mut args = base_args();
    for input in &job.inputs {
        if input.loops > 0 {
            args.extend(["-stream_loop".to_string(), input.loops.to_string()]);
        }
        args.extend(["-i".to_string(), input.path.display().to_string()]);
    }
    let fps = plan.fps.max(1).to_string();
    args.extend(
        [
            "-filter_complex",
            job.filter.as_str(),
            "-map",
            "[vout]",
            "-map",
            "[aout]",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "20",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-ar",
            "44100",
            "-ac",
            "2",
            "-r",
            fps.as_str(),
            "-movflags",
            "+faststart",
        ]
        .map(str::to_string),
    );
    args.push(plan.output_path.display().to_string());
    args
}

async fn input_durations(plan: &RenderPlan) -> HashMap<PathBuf, f64> {
    let mut durations = HashMap::new();
    let paths = plan
        .segments
        .iter()
        .flat_map(|s| std::iter::once(&s.video_path).chain(s.audio_path.as_ref()));
    for path in paths {
        if durations.contains_key(path) {
            continue;
        }
        match ffprobe_duration_seconds(path).await {
            Ok(d) => {
                durations.insert(path.clone(), d);
            }
            Err(err) => logw(format!("Could not read duration of {}: {:#}", path.display(), err)),
        }
    }
    durations
}

/// Measure every input and build the filter graph. Segments whose media
/// cannot be read are left out; see [`FilterJob::segment_ids`].
pub async fn prepare(plan: &RenderPlan) -> Result<FilterJob> {
    if plan.segments.is_empty() {
        return Err(PipelineError::NoRenderableSegments.into());
    }
    let durations = input_durations(plan).await;
    Ok(build_filter_graph(plan, &durations)?)
}

/// Run the encode for a prepared job.
pub async fn encode(plan: &RenderPlan, job: &FilterJob) -> Result<PathBuf> {
    if let Some(parent) = plan.output_path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }
    logi(format!(
        "Rendering {:.1}s from {} inputs to {}",
        job.total_s,
        job.inputs.len(),
        plan.output_path.display()
    ));
    run_cmd(&ffmpeg_args(plan, job)).await?;
    logok(format!("Video written: {}", plan.output_path.display()));
    Ok(plan.output_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: u32, clip_index: usize, total: usize, video: &str, audio: Option<&str>, clip_ms: u64) -> RenderSegment {
        RenderSegment {
            segment_id: id,
            video_path: PathBuf::from(video),
            audio_path: audio.map(PathBuf::from),
            start_ms: 0,
            end_ms: 0,
            scale_to: "720x1280".into(),
            center_crop: true,
            fade_frames: if total > 1 { 3 } else { 5 },
            clip_index,
            total_clips: total,
            clip_duration_ms: Some(clip_ms),
        }
    }

    fn plan(segments: Vec<RenderSegment>) -> RenderPlan {
        RenderPlan {
            resolution: "720x1280".into(),
            fps: 25,
            total_ms: 0,
            segments,
            output_path: PathBuf::from("out/video.mp4"),
            bgm_path: None,
            srt_path: None,
        }
    }

    fn durations(list: &[(&str, f64)]) -> HashMap<PathBuf, f64> {
        list.iter().map(|(p, d)| (PathBuf::from(p), *d)).collect()
    }

    #[test]
    fn single_segment_graph() {
        let p = plan(vec![seg(1, 0, 1, "a.mp4", Some("s1.mp3"), 4000)]);
        let job = build_filter_graph(&p, &durations(&[("a.mp4", 10.0), ("s1.mp3", 4.0)])).unwrap();
        assert_eq!(job.inputs.len(), 2);
        assert_eq!(job.inputs[0].path, PathBuf::from("s1.mp3"));
        assert_eq!(
            job.filter,
            "[1:v]scale=720:1280:force_original_aspect_ratio=increase,crop=720:1280,setsar=1,fps=25,\
             trim=start=0:end=4.000,setpts=PTS-STARTPTS,fade=t=in:st=0:d=0.200,fade=t=out:st=3.800:d=0.200[v_seg1];\
             [0:a]asetpts=PTS-STARTPTS[a_seg1];\
             [v_seg1][a_seg1]concat=n=1:v=1:a=1[vout][a_voice];\
             [a_voice]anull[aout]"
        );
    }

    #[test]
    fn multi_clip_slots_rescale_to_audio() {
        let p = plan(vec![
            seg(1, 0, 2, "a.mp4", Some("s1.mp3"), 1000),
            seg(1, 1, 2, "b.mp4", None, 3000),
            seg(2, 0, 1, "c.mp4", Some("s2.mp3"), 2000),
        ]);
        let d = durations(&[("a.mp4", 1.0), ("b.mp4", 9.0), ("c.mp4", 5.0), ("s1.mp3", 8.0), ("s2.mp3", 2.0)]);
        let job = build_filter_graph(&p, &d).unwrap();
        assert!(job.filter.contains("[1:v]scale=720:1280:force_original_aspect_ratio=increase,crop=720:1280,setsar=1,fps=25,trim=start=0:end=2.000"));
        assert!(job.filter.contains("trim=start=0:end=6.000"));
        assert!(job.filter.contains("[v_seg1_clip0][v_seg1_clip1]concat=n=2:v=1:a=0,fade=t=in:st=0:d=0.120[v_seg1]"));
        assert!(job.filter.contains("[v_seg1][a_seg1][v_seg2][a_seg2]concat=n=2:v=1:a=1[vout][a_voice]"));
        // a.mp4 is 1s for a 2s slot
        assert_eq!(job.inputs[1].loops, 2);
        assert_eq!(job.inputs[2].loops, 0);
        assert!((job.total_s - 10.0).abs() < 1e-9);
    }

    #[test]
    fn music_and_subtitles() {
        let mut p = plan(vec![seg(1, 0, 1, "a.mp4", Some("s1.mp3"), 3000)]);
        p.bgm_path = Some(PathBuf::from("bgm.mp3"));
        p.srt_path = Some(PathBuf::from("out/sub's.srt"));
        let job = build_filter_graph(&p, &durations(&[("a.mp4", 5.0), ("s1.mp3", 3.0)])).unwrap();
        assert!(job.filter.contains(r"concat=n=1:v=1:a=1[vcat][a_voice];[vcat]subtitles=out/sub\\\'s.srt[vout]"));
        assert!(job.filter.contains("[2:a]aloop=loop=-1:size=2e9[bgm_looped]"));
        assert!(job.filter.contains("atrim=0:3.000,asetpts=PTS-STARTPTS,volume=0.15[bgm_ready]"));
        assert!(job.filter.ends_with("amix=inputs=2:duration=first:weights=1 0.7[aout]"));
    }

    #[test]
    fn subtitle_paths_survive_both_parsers() {
        assert_eq!(filter_path(Path::new("out/subtitles.srt")), "out/subtitles.srt");
        assert_eq!(filter_path(Path::new("out/it's.srt")), r"out/it\\\'s.srt");
        assert_eq!(filter_path(Path::new(r"C:\clips\a,b.srt")), r"C\\\:/clips/a\,b.srt");
        assert_eq!(filter_path(Path::new("out/[v1];x.srt")), r"out/\[v1\]\;x.srt");
    }

    #[test]
    fn segments_without_audio_are_skipped() {
        let p = plan(vec![
            seg(1, 0, 1, "a.mp4", None, 3000),
            seg(2, 0, 1, "b.mp4", Some("s2.mp3"), 3000),
        ]);
        let job = build_filter_graph(&p, &durations(&[("a.mp4", 5.0), ("b.mp4", 5.0), ("s2.mp3", 3.0)])).unwrap();
        assert!(!job.filter.contains("v_seg1"));
        assert_eq!(job.segment_ids, vec![2]);
        assert!(job.filter.contains("concat=n=1:v=1:a=1"));

        let none = plan(vec![seg(1, 0, 1, "a.mp4", None, 3000)]);
        assert!(matches!(
            build_filter_graph(&none, &durations(&[("a.mp4", 5.0)])),
            Err(PipelineError::NoRenderableSegments)
        ));
    }

    #[test]
    fn encoder_arguments() {
        let mut p = plan(vec![seg(1, 0, 1, "a.mp4", Some("s1.mp3"), 3000)]);
        p.fps = 30;
        let job = FilterJob {
            inputs: vec![
                RenderInput { path: "s1.mp3".into(), loops: 0 },
                RenderInput { path: "a.mp4".into(), loops: 2 },
            ],
            filter: "x".into(),
            total_s: 3.0,
            segment_ids: vec![1],
        };
        let args = ffmpeg_args(&p, &job).join(" ");
        assert!(args.contains("-i s1.mp3 -stream_loop 2 -i a.mp4 -filter_complex x"));
        assert!(args.contains("-c:v libx264 -preset veryfast -crf 20 -pix_fmt yuv420p"));
        assert!(args.ends_with("-r 30 -movflags +faststart out/video.mp4"));
    }
}
