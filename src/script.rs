//! Single-call script generation from an [`InputData`] request.

use crate::api::openai::ChatModel;
use crate::models::{InputData, Script, Segment};
use crate::{logi, logw};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_DISCLAIMER: &str = "Educational only, not investment advice.";
const ATTEMPTS: u32 = 3;

pub const SYSTEM_PROMPT: &str = r#"You are an expert video storyteller and scriptwriter for high-retention financial content.
Produce scripts that are entertaining, cinematic and emotionally engaging while remaining factually accurate.

STORYTELLING RULES:
1. The Hook: open with a pattern interrupt (a surprising fact, a bold question, or a "Picture this..." scenario). Never start with "Today we are talking about...".
2. Narrative arc: tension and curiosity first, then the reveal, then the impact ("so what?").
3. Conversational tone: contractions, rhetorical questions, conversational connectors.
4. Show, don't just tell: let the narration imply the visual scene.
5. Vary pacing: mix punchy 1-3 word sentences with longer explanatory ones.

VISUAL TAGS:
- Formula: [SUBJECT] + [ACTION] + [CINEMATIC STYLE/COLOR]
- BAD: ["money", "coins"]  GOOD: ["Gold coins", "raining down in slow motion", "cinematic lighting"]
- BAD: ["stock market"]    GOOD: ["Stock chart line", "crashing down aggressively", "red warning lights"]

EMOTIONS:
- excited: breakthroughs and wins
- dramatic: risks, crashes, pivotal moments
- curious: questions and mysteries
- urgent: breaking news, immediate actions

REQUIREMENTS:
- 6-15 segments, total duration matching the target.
- No "Welcome back" and no "Thanks for watching".

AI SPEECH CONTROL (only if requested):
- pause_after_ms: 200 after commas, 500 after impact statements, 1000 before a big reveal.

Return ONLY valid JSON conforming to the provided schema."#;

fn schema_hint(use_ai_speech: bool) -> String {
    let mut schema = String::from(
        r#"{ "title": "string", "target_seconds": 45, "segments": [{ "id": 1, "start_ms": 0, "end_ms": 3000, "narration": "string", "on_screen_text": "string", "visual_tags": ["tag"], "emotion": "excited", "sfx": ["whoosh"], "bgm_mood": "upbeat""#,
    );
    if use_ai_speech {
        schema.push_str(r#", "pause_after_ms": 300"#);
    }
    schema.push_str(&format!(r#" }}], "disclaimer": "{}" }}"#, DEFAULT_DISCLAIMER));
    schema
}

fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        "N/A".to_string()
    } else {
        items.join("\n- ")
    }
}

pub fn build_user_prompt(input: &InputData, use_ai_speech: bool) -> String {
    let mut prompt = format!(
        "Topic: {topic}\nVideo type: {kind} ({hint})\nOverall mood: {mood}\n\nFacts:\n- {facts}\n\nNews bullets:\n- {news}\n\nTarget duration: {secs}s\n\nINSTRUCTIONS:\n- Create a high-retention, cinematic storytelling script\n- Segments: 6-15, {seg_hint}, Total time: ~{secs}s\n- Tone: {mood_upper}, Engaging, Human-like\n- Visuals: Cinematic, colorful, dynamic actions\n",
        topic = input.topic,
        kind = input.video_type.display_name(),
        hint = input.video_type.prompt_hint(),
        mood = input.mood,
        facts = bullets(&input.facts),
        news = bullets(&input.news),
        secs = input.target_seconds,
        seg_hint = input.video_style.segment_hint(),
        mood_upper = input.mood.to_uppercase(),
    );
    if let Some(symbol) = &input.stock_symbol {
        prompt.push_str(&format!("- Ticker: {}\n", symbol));
    }
    if use_ai_speech {
        prompt.push_str("- AI SPEECH CONTROL: suggest pause durations (pause_after_ms) to control rhythm.\n");
    }
    prompt.push_str(&format!(
        "- Last segment end_ms should be around {}ms\n\nReturn JSON only.\nSchema:\n{}",
        input.target_seconds as u64 * 1000,
        schema_hint(use_ai_speech)
    ));
    prompt
}

#[derive(Debug, Deserialize)]
struct ScriptReply {
    #[serde(default)]
    title: String,
    #[serde(default)]
    target_seconds: Option<u32>,
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(default)]
    disclaimer: String,
}

/// Turn an LLM reply into a validated script.
pub fn parse_script_reply(value: Value, input: &InputData) -> Result<Script> {
    let reply: ScriptReply = serde_json::from_value(value).context("LLM script did not match the schema")?;
    let disclaimer = if reply.disclaimer.trim().is_empty() {
        DEFAULT_DISCLAIMER.to_string()
    } else {
        reply.disclaimer
    };
    let script = Script {
        title: if reply.title.trim().is_empty() {
            input.topic.clone()
        } else {
            reply.title
        },
        target_seconds: reply.target_seconds.filter(|s| *s > 0).unwrap_or(input.target_seconds),
        segments: reply.segments,
        disclaimer,
    };
    script.validate()?;
    if script.segments.is_empty() {
        anyhow::bail!("LLM script has no segments");
    }
    Ok(script)
}

/// Ask the model for a full script. Malformed replies are retried.
pub async fn generate_script(llm: &dyn ChatModel, input: &InputData, use_ai_speech: bool) -> Result<Script> {
    input.validate()?;
    let user = build_user_prompt(input, use_ai_speech);

    let mut attempt = 1;
    loop {
        let outcome = match llm.chat_json(SYSTEM_PROMPT, &user).await {
            Ok(value) => parse_script_reply(value, input),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(script) => {
                logi(format!(
                    "Script '{}' with {} segments ({} ms)",
                    script.title,
                    script.segments.len(),
                    script.total_duration_ms()
                ));
                return Ok(script);
            }
            Err(err) if attempt < ATTEMPTS => {
                logw(format!("Script generation attempt {} failed: {:#}", attempt, err));
                attempt += 1;
            }
            Err(err) => return Err(err.context("script generation failed")),
        }
    }
}
