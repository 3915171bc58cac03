//! SSML markup for Google TTS: emotion prosody, emphasis and pauses.

use crate::models::VoiceSpeed;

const MAX_AI_PAUSE_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Prosody {
    rate_pct: f64,
    pitch_st: f64,
    volume: Option<&'static str>,
}

fn emotion_prosody(emotion: &str) -> Prosody {
    let (rate_pct, pitch_st, volume) = match emotion.trim().to_lowercase().as_str() {
        "excited" => (115.0, 2.0, Some("loud")),
        "sad" => (85.0, -2.0, Some("soft")),
        "serious" => (90.0, -1.0, Some("medium")),
        "urgent" => (125.0, 1.0, Some("loud")),
        "dramatic" => (85.0, -1.5, Some("loud")),
        "curious" => (105.0, 1.0, None),
        _ => (100.0, 0.0, None),
    };
    Prosody {
        rate_pct,
        pitch_st,
        volume,
    }
}

fn format_semitones(st: f64) -> String {
    let rounded = (st * 10.0).round() / 10.0;
    if rounded >= 0.0 {
        format!("+{}st", rounded)
    } else {
        format!("{}st", rounded)
    }
}

/// Opening and closing `<prosody>` tags for an emotion.
///
/// The speed multiplier scales the rate first; intensity then scales how far
/// rate and pitch deviate from neutral.
pub fn prosody_tags(
    emotion: &str,
    intensity: f64,
    speed: VoiceSpeed,
    disable_pitch: bool,
) -> (String, String) {
    let p = emotion_prosody(emotion);

    let mut rate = p.rate_pct * speed.multiplier();
    let mut pitch = p.pitch_st;
    if intensity != 1.0 {
        rate = 100.0 + (rate - 100.0) * intensity;
        pitch *= intensity;
    }

    let mut attrs = vec![format!("rate=\"{}%\"", rate as i64)];
    if pitch.abs() >= 0.05 && !disable_pitch {
        attrs.push(format!("pitch=\"{}\"", format_semitones(pitch)));
    }
    if let Some(volume) = p.volume {
        attrs.push(format!("volume=\"{}\"", volume));
    }

    (format!("<prosody {}>", attrs.join(" ")), "</prosody>".to_string())
}

#[derive(Debug, Clone)]
pub struct SsmlOptions<'a> {
    pub emotion: &'a str,
    pub use_ai_control: bool,
    pub emphasis_words: &'a [String],
    pub pause_after_ms: Option<u64>,
    pub intensity: f64,
    pub speed: VoiceSpeed,
    pub disable_prosody: bool,
    pub disable_pitch: bool,
}

impl Default for SsmlOptions<'_> {
    fn default() -> Self {
        Self {
            emotion: "neutral",
            use_ai_control: false,
            emphasis_words: &[],
            pause_after_ms: None,
            intensity: 1.0,
            speed: VoiceSpeed::Medium,
            disable_prosody: false,
            disable_pitch: false,
        }
    }
}

/// Wrap plain narration in SSML fragments (no `<speak>` root).
/// Text that already is a `<speak>` document passes through untouched.
pub fn enhance_narration(text: &str, opts: &SsmlOptions<'_>) -> String {
    if text.trim_start().starts_with("<speak>") {
        return text.to_string();
    }

    let mut enhanced = text.to_string();

    let mut applied: Vec<&str> = Vec::new();
    for word in opts.emphasis_words {
        let word = word.as_str();
        if word.trim().is_empty() || applied.contains(&word) || !enhanced.contains(word) {
            continue;
        }
        enhanced = enhanced.replace(word, &format!("<emphasis level=\"moderate\">{}</emphasis>", word));
        applied.push(word);
    }

    if opts.use_ai_control {
        if let Some(pause) = opts.pause_after_ms.filter(|p| *p > 0) {
            enhanced.push_str(&format!(" <break time=\"{}ms\"/>", pause.min(MAX_AI_PAUSE_MS)));
        }
    }

    if !opts.disable_prosody {
        let (open, close) = prosody_tags(opts.emotion, opts.intensity, opts.speed, opts.disable_pitch);
        enhanced = format!("{}{}{}", open, enhanced, close);
    }

    enhanced
}

/// Break to insert between two segments whose emotions differ.
pub fn connecting_pause(prev_emotion: &str, curr_emotion: &str) -> Option<&'static str> {
    if prev_emotion == curr_emotion {
        return None;
    }

    const DRAMATIC: &[&str] = &["dramatic", "serious", "sad"];
    const ENERGETIC: &[&str] = &["excited", "urgent", "curious"];

    let shift = (DRAMATIC.contains(&prev_emotion) && ENERGETIC.contains(&curr_emotion))
        || (ENERGETIC.contains(&prev_emotion) && DRAMATIC.contains(&curr_emotion));

    if shift {
        Some("<break time=\"500ms\"/>")
    } else {
        Some("<break time=\"300ms\"/>")
    }
}

/// Escape XML special characters in plain text destined for SSML.
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
