use crate::models::{Script, TtsResult};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// `HH:MM:SS,mmm`
pub fn format_timestamp(ms: u64) -> String {
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1000;
    let rem = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, rem)
}

/// One cue per non-blank segment.
///
/// Segments with a TTS result are timed back to back from the actual audio
/// durations so burned-in text stays on the voice; the rest keep the
/// script's own timing. Cue numbers follow segment position, so a skipped
/// blank segment leaves a gap in the numbering.
pub fn build_cues(script: &Script, tts: &HashMap<u32, TtsResult>) -> Vec<SubtitleCue> {
    let mut cues = Vec::new();
    let mut current_ms = 0u64;

    for (pos, seg) in script.segments.iter().enumerate() {
        let text = seg.narration.trim();
        if text.is_empty() {
            continue;
        }

        let (start_ms, end_ms) = match tts.get(&seg.id) {
            Some(result) => {
                let start = current_ms;
                current_ms += result.duration_ms;
                (start, current_ms)
            }
            None => (seg.start_ms, seg.end_ms),
        };

        cues.push(SubtitleCue {
            index: pos + 1,
            start_ms,
            end_ms,
            text: text.to_string(),
        });
    }

    cues
}

pub fn render_srt(cues: &[SubtitleCue]) -> String {
    let mut lines = Vec::with_capacity(cues.len() * 4);
    for cue in cues {
        lines.push(cue.index.to_string());
        lines.push(format!(
            "{} --> {}",
            format_timestamp(cue.start_ms),
            format_timestamp(cue.end_ms)
        ));
        lines.push(cue.text.clone());
        lines.push(String::new());
    }
    lines.join("\n")
}

pub async fn write_srt(
    script: &Script,
    tts: &HashMap<u32, TtsResult>,
    out_path: &Path,
) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }
    let body = render_srt(&build_cues(script, tts));
    fs::write(out_path, body)
        .await
        .with_context(|| format!("Failed to write subtitles: {}", out_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Segment;
    use std::path::PathBuf;

    fn script(segments: Vec<Segment>) -> Script {
        Script {
            title: "t".into(),
            target_seconds: 30,
            segments,
            disclaimer: String::new(),
        }
    }

    fn tts(id: u32, ms: u64) -> (u32, TtsResult) {
        (
            id,
            TtsResult {
                segment_id: id,
                audio_path: PathBuf::from(format!("seg{id:02}.mp3")),
                duration_ms: ms,
            },
        )
    }

    #[test]
    fn timestamp_format() {
        assert_eq!(format_timestamp(0), "00:00:00,000");
        assert_eq!(format_timestamp(3_723_045), "01:02:03,045");
    }

    #[test]
    fn cues_follow_tts_durations() {
        let s = script(vec![
            Segment::new(1, 0, 4000, "First line."),
            Segment::new(2, 4000, 9000, "Second line."),
        ]);
        let map: HashMap<_, _> = [tts(1, 3200), tts(2, 2800)].into_iter().collect();
        let cues = build_cues(&s, &map);
        assert_eq!(cues[0].start_ms, 0);
        assert_eq!(cues[0].end_ms, 3200);
        assert_eq!(cues[1].start_ms, 3200);
        assert_eq!(cues[1].end_ms, 6000);
        for pair in cues.windows(2) {
            assert!(pair[1].start_ms >= pair[0].end_ms);
        }
        assert!(cues.iter().all(|c| c.end_ms > c.start_ms));
    }

    #[test]
    fn blank_segment_keeps_numbering_gap() {
        let s = script(vec![
            Segment::new(1, 0, 1000, "One"),
            Segment::new(2, 1000, 2000, "   "),
            Segment::new(3, 2000, 3000, "Three"),
        ]);
        let cues = build_cues(&s, &HashMap::new());
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].index, 3);
        assert_eq!(cues[1].start_ms, 2000);
    }

    #[test]
    fn rendered_blocks_are_blank_line_separated() {
        let s = script(vec![Segment::new(1, 0, 1500, "Hello"), Segment::new(2, 1500, 2000, "Bye")]);
        let text = render_srt(&build_cues(&s, &HashMap::new()));
        assert_eq!(
            text,
            "1\n00:00:00,000 --> 00:00:01,500\nHello\n\n2\n00:00:01,500 --> 00:00:02,000\nBye\n"
        );
    }

    #[tokio::test]
    async fn write_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("subtitles.srt");
        let s = script(vec![Segment::new(1, 0, 1000, "Hi")]);
        write_srt(&s, &HashMap::new(), &out).await.unwrap();
        let body = tokio::fs::read_to_string(&out).await.unwrap();
        assert!(body.starts_with("1\n00:00:00,000 --> 00:00:01,000\nHi"));
    }
}
