use crate::error::PipelineError;
use crate::logw;
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;

pub(crate) fn base_args() -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

/// Run a command line; a non-zero exit becomes [`PipelineError::FfmpegFailed`]
/// carrying stderr.
pub(crate) async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("Command execution failed: {}", args[0]))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(PipelineError::ffmpeg(
            format!("{} exited with {}", args[0], output.status),
            stderr,
        )
        .into());
    }

    Ok(())
}

/// Run ffmpeg and hand back stderr, where analysis filters print results.
async fn run_for_stderr(args: &[String]) -> Result<String> {
    let output = Command::new(&args[0])
        .args(&args[1..])
        .output()
        .await
        .with_context(|| format!("Command execution failed: {}", args[0]))?;
    if !output.status.success() {
        return Err(PipelineError::ffmpeg(
            "analysis pass failed",
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stderr).into_owned())
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(PipelineError::ffprobe(path, "dimension probe failed").into());
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts
        .next()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let h = parts
        .next()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);

    if w == 0 || h == 0 {
        return Err(PipelineError::ffprobe(path, format!("invalid dimensions {text:?}")).into());
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(PipelineError::ffprobe(path, "duration probe failed").into());
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.0 {
        return Err(PipelineError::ffprobe(path, format!("invalid duration {text:?}")).into());
    }
    Ok(duration)
}

pub async fn ffprobe_duration_ms(path: &Path) -> Result<u64> {
    Ok((ffprobe_duration_seconds(path).await? * 1000.0).round() as u64)
}

#[derive(Debug, Deserialize)]
struct StreamList {
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Deserialize)]
struct StreamInfo {
    pix_fmt: Option<String>,
}

/// True when ffprobe finds a decodable video stream with a pixel format.
pub async fn is_video_valid(path: &Path) -> bool {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_name,width,height,pix_fmt",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .await;

    let Ok(output) = output else {
        return false;
    };
    if !output.status.success() {
        return false;
    }
    has_decodable_pixel_format(&String::from_utf8_lossy(&output.stdout))
}

fn has_decodable_pixel_format(json: &str) -> bool {
    serde_json::from_str::<StreamList>(json)
        .ok()
        .and_then(|p| p.streams.into_iter().next())
        .and_then(|s| s.pix_fmt)
        .is_some_and(|fmt| fmt != "none")
}

/// Level the loudness of one narration clip and encode it as MP3.
/// Falls back to a plain transcode if the filter is unavailable.
pub async fn normalize_speech(in_audio: &Path, out_mp3: &Path) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        in_audio.display().to_string(),
        "-af".to_string(),
        "dynaudnorm=f=150:g=15".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        "256k".to_string(),
        out_mp3.display().to_string(),
    ]);

    if let Err(err) = run_cmd(&args).await {
        logw(format!("Normalization failed ({}); transcoding as-is", err));
        let mut plain = base_args();
        plain.extend([
            "-i".to_string(),
            in_audio.display().to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            "256k".to_string(),
            out_mp3.display().to_string(),
        ]);
        run_cmd(&plain).await?;
    }

    Ok(fs::metadata(out_mp3).await.is_ok())
}

/// Cut `[start_s, end_s)` out of `in_audio` into an MP3.
pub async fn extract_audio_span(
    in_audio: &Path,
    start_s: f64,
    end_s: f64,
    out_mp3: &Path,
) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-ss".to_string(),
        format!("{:.3}", start_s),
        "-i".to_string(),
        in_audio.display().to_string(),
        "-t".to_string(),
        format!("{:.3}", (end_s - start_s).max(0.0)),
        "-ar".to_string(),
        "44100".to_string(),
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        "320k".to_string(),
        out_mp3.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(fs::metadata(out_mp3).await.is_ok())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start_s: f64,
    pub end_s: f64,
}

fn silence_re() -> Result<&'static Regex> {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_try_init(|| Regex::new(r"silence_(start|end):\s*(-?[0-9]+(?:\.[0-9]+)?)"))
        .context("silence regex")
}

/// Silent spans reported by `silencedetect` on stderr. A trailing
/// `silence_start` with no matching end runs to `total_s`.
pub fn parse_silencedetect(stderr: &str, total_s: f64) -> Result<Vec<Span>> {
    let re = silence_re()?;
    let mut spans = Vec::new();
    let mut open: Option<f64> = None;

    for cap in re.captures_iter(stderr) {
        let value: f64 = cap[2].parse().unwrap_or(0.0);
        match &cap[1] {
            "start" => open = Some(value.max(0.0)),
            _ => {
                if let Some(start_s) = open.take() {
                    spans.push(Span { start_s, end_s: value });
                }
            }
        }
    }
    if let Some(start_s) = open {
        spans.push(Span { start_s, end_s: total_s });
    }
    Ok(spans)
}

/// Voiced chunks between silences, each padded by `keep_s` on both sides.
/// Chunks shorter than 50ms (leading or trailing silence) are dropped.
pub fn voiced_spans(silences: &[Span], total_s: f64, keep_s: f64) -> Vec<Span> {
    let mut out = Vec::new();
    let mut cursor = 0.0;
    let mut push = |start: f64, end: f64| {
        if end - start >= 0.05 {
            out.push(Span {
                start_s: (start - keep_s).max(0.0),
                end_s: (end + keep_s).min(total_s),
            });
        }
    };
    for silence in silences {
        push(cursor, silence.start_s);
        cursor = silence.end_s;
    }
    push(cursor, total_s);
    out
}

/// Find voiced chunks in `audio` separated by silences of at least
/// `min_silence_s` below `noise_db`.
pub async fn split_on_silence(
    audio: &Path,
    noise_db: i32,
    min_silence_s: f64,
    keep_s: f64,
) -> Result<Vec<Span>> {
    let total_s = ffprobe_duration_seconds(audio).await?;
    let args = vec![
        "ffmpeg".to_string(),
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-af".to_string(),
        format!("silencedetect=noise={}dB:d={}", noise_db, min_silence_s),
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    let stderr = run_for_stderr(&args).await?;
    let silences = parse_silencedetect(&stderr, total_s)?;
    Ok(voiced_spans(&silences, total_s, keep_s))
}

/// Plain topic card: dark background with the text centred. Drops the text
/// and renders a bare colour clip if `drawtext` is unavailable.
pub async fn make_text_card(
    out_mp4: &Path,
    text: &str,
    seconds: f64,
    (w, h): (u32, u32),
    fps: u32,
) -> Result<bool> {
    if let Some(parent) = out_mp4.parent() {
        fs::create_dir_all(parent).await.ok();
    }
    let dur = seconds.max(1.0);
    let text_file = out_mp4.with_extension("txt");
    let text: String = text.trim().chars().take(400).collect();
    fs::write(&text_file, &text)
        .await
        .with_context(|| format!("Failed to write {}", text_file.display()))?;

    let source = format!("color=c=#0b1020:s={}x{}:d={}", w, h, dur);
    let draw = format!(
        "drawtext=textfile={}:reload=1:fontcolor=white:fontsize={}:x=(w-text_w)/2:y=(h-text_h)/2:line_spacing={}",
        text_file.display(),
        (h as f64 * 0.05).max(32.0) as u32,
        (h as f64 * 0.01).max(10.0) as u32,
    );

    let encode = |with_text: bool| {
        let mut args = base_args();
        args.extend(["-f".to_string(), "lavfi".to_string(), "-i".to_string(), source.clone()]);
        if with_text {
            args.extend(["-vf".to_string(), draw.clone()]);
        }
        args.extend([
            "-r".to_string(),
            fps.to_string(),
            "-t".to_string(),
            format!("{:.3}", dur),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-crf".to_string(),
            "20".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            out_mp4.display().to_string(),
        ]);
        args
    };

    if let Err(err) = run_cmd(&encode(true)).await {
        logw(format!("Text card drawtext failed ({}); using plain colour", err));
        run_cmd(&encode(false)).await?;
    }
    Ok(fs::metadata(out_mp4).await.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_required() {
        assert!(has_decodable_pixel_format(r#"{"streams":[{"codec_name":"h264","pix_fmt":"yuv420p"}]}"#));
        assert!(!has_decodable_pixel_format(r#"{"streams":[{"codec_name":"h264","pix_fmt":"none"}]}"#));
        assert!(!has_decodable_pixel_format(r#"{"streams":[]}"#));
        assert!(!has_decodable_pixel_format("not json"));
    }

    #[test]
    fn silencedetect_output_parses() {
        let stderr = "\
[silencedetect @ 0x1] silence_start: 2.51
[silencedetect @ 0x1] silence_end: 3.52 | silence_duration: 1.01
[silencedetect @ 0x1] silence_start: 6.9
";
        let spans = parse_silencedetect(stderr, 7.5).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], Span { start_s: 2.51, end_s: 3.52 });
        assert_eq!(spans[1], Span { start_s: 6.9, end_s: 7.5 });
    }

    #[test]
    fn voiced_spans_pad_and_drop_edges() {
        let silences = [
            Span { start_s: 0.0, end_s: 0.3 },
            Span { start_s: 2.5, end_s: 3.5 },
            Span { start_s: 6.9, end_s: 7.5 },
        ];
        let chunks = voiced_spans(&silences, 7.5, 0.1);
        assert_eq!(chunks.len(), 2);
        assert!((chunks[0].start_s - 0.2).abs() < 1e-9);
        assert!((chunks[0].end_s - 2.6).abs() < 1e-9);
        assert!((chunks[1].start_s - 3.4).abs() < 1e-9);
        assert!((chunks[1].end_s - 7.0).abs() < 1e-9);
    }

    #[test]
    fn no_silence_is_one_chunk() {
        let chunks = voiced_spans(&[], 4.0, 0.1);
        assert_eq!(chunks, vec![Span { start_s: 0.0, end_s: 4.0 }]);
    }
}
