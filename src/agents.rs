//! Multi-agent script writing: four section writers share a running draft,
//! a reviser tightens it, and a visual mapper annotates every segment with
//! an emotion and footage clips. The result is a [`VideoSpec`].

use crate::api::cdn::CdnClient;
use crate::api::openai::ChatModel;
use crate::charts::render::{ChartRenderer, pick_background};
use crate::charts::stock::build_chart_data;
use crate::charts::symbols::extract_symbol;
use crate::charts::{ChartData, ChartRange};
use crate::models::{InputData, VoiceSpeed};
use crate::video_spec::{ClipSpec, SegmentSpec, VideoSpec};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const STEP_COUNT: usize = 6;
const SLUG_MAX: usize = 30;

const TEAM: &str = "You are part of a financial video scriptwriting team working on a short social-media video.";

const RULES: &str = "STRICT RULES:
- NO investment advice (no buy/sell/hold, no price targets)
- Educational tone only
- Each segment is 3-8 seconds when spoken
- Flow naturally from the previous segments; vary transitions

Return JSON only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    Done,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
        }
    }
}

/// `(step 1..=6, step name, status)`.
pub type Progress<'a> = &'a (dyn Fn(usize, &str, StepStatus) + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterRole {
    Introduction,
    Development,
    Charts,
    Conclusion,
}

impl WriterRole {
    pub const ALL: [WriterRole; 4] = [Self::Introduction, Self::Development, Self::Charts, Self::Conclusion];

    pub fn label(self) -> &'static str {
        match self {
            Self::Introduction => "Introduction",
            Self::Development => "Development",
            Self::Charts => "Charts",
            Self::Conclusion => "Conclusion",
        }
    }

    /// Share of the total runtime with a floor in seconds.
    pub fn target_seconds(self, total: u32) -> u32 {
        let (share, floor) = match self {
            Self::Introduction => (0.25, 10.0),
            Self::Development => (0.30, 10.0),
            Self::Charts => (0.15, 8.0),
            Self::Conclusion => (0.30, 10.0),
        };
        (total as f64 * share).max(floor) as u32
    }

    fn brief(self) -> &'static str {
        match self {
            Self::Introduction => {
                "Write the INTRODUCTION: a 10-20 second hook.

- Sound like a confident documentary narrator, curious and conversational.
- Open with ONE surprising fact or a genuine question, never a wall of data.
- If you use a number, make it land with a comparison.
- Never open with \"In today's video\" and never list products."
            }
            Self::Development => {
                "Write the DEVELOPMENT section: the 10-20 second body that delivers value.

- A smart friend explaining over coffee, not a finance lecture.
- Weave in one or two key facts with context that makes them meaningful.
- Answer why this company matters and why now.
- No stat dumps, no vague fluff, do not start every sentence with \"And\" or \"Now\"."
            }
            Self::Charts => {
                "Write the CHARTS section: about 10 seconds of story told through data, shown over a stock chart.

- Use specific numbers, dates and percentages from the facts.
- Make the data part of the narrative; do not announce the chart.
- One clear data point beats many confusing ones.
- Set \"needs_chart\": true on the segment the price chart should play under, and give it a short \"on_screen_text\"."
            }
            Self::Conclusion => {
                "Write the CONCLUSION: a memorable 10-20 second ending.

- Land the story with confidence; a key fact may return as the takeaway.
- Call back to an earlier theme if you can and leave genuine curiosity.
- No \"In conclusion\", no \"Thanks for watching\", no data dump."
            }
        }
    }

    pub fn system_prompt(self) -> String {
        format!("{}\n\n{}\n\n{}", TEAM, self.brief(), RULES)
    }
}

const REVISION_PROMPT: &str = "You are part of a financial video scriptwriting team. REVISE the given script for consistency, flow and quality.

FIX: grammar slips, repeated phrases, gaps in the story flow, awkward phrasing, overlong sentences, lists of items.
PRESERVE: every data point, the overall message, the social-media tone, the number of segments, on_screen_text and is_chart_placeholder.

Only make small, targeted improvements. Do not add content or segments. No investment advice.

Return the revised segments in the same JSON format.";

const VISUAL_MAPPER_PROMPT: &str = "You are the visual director for short financial videos. Annotate every segment with:
1. emotion: one of curious, serious, informative, dramatic, impactful
2. clips: stock-footage clips, each with tags and a trigger word

TAGS: generic searchable terms, no brand names (\"smartphone\" not \"iPhone\"), 3-4 descriptive words per clip, e.g. \"stock chart rising green\".
TRIGGERS: a word taken verbatim from the narration where the clip should start.
Create several clips when a segment mentions several distinct concepts.
For segments with is_chart_placeholder=true use data-visualisation tags such as \"chart graph data visualization\".

Return the complete script with annotations as JSON.";

/// Shared state handed from writer to writer.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub topic: String,
    pub facts: Vec<String>,
    pub news: Vec<String>,
    pub target_seconds: u32,
    pub mood: String,
    pub previous: Vec<DraftSegment>,
}

impl AgentContext {
    pub fn from_input(input: &InputData) -> Self {
        Self {
            topic: input.topic.clone(),
            facts: input.facts.clone(),
            news: input.news.clone(),
            target_seconds: input.target_seconds,
            mood: input.mood.clone(),
            previous: Vec::new(),
        }
    }

    pub fn previous_text(&self) -> String {
        self.previous.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join("\n\n")
    }
}

fn default_estimate() -> f64 {
    5.0
}

fn default_emotion() -> String {
    "informative".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSegment {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_estimate")]
    pub duration_estimate_seconds: f64,
    #[serde(default)]
    pub on_screen_text: Option<String>,
    #[serde(default)]
    pub is_chart_placeholder: bool,
    /// Writer request for chart footage; replaced by `is_chart_placeholder`
    /// once chart data is attached.
    #[serde(default, skip_serializing)]
    pub needs_chart: bool,
}

impl DraftSegment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            duration_estimate_seconds: default_estimate(),
            on_screen_text: None,
            is_chart_placeholder: false,
            needs_chart: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MappedClip {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub trigger: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MappedSegment {
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_emotion")]
    pub emotion: String,
    #[serde(default = "default_estimate")]
    pub duration_estimate_seconds: f64,
    #[serde(default)]
    pub on_screen_text: Option<String>,
    #[serde(default)]
    pub is_chart_placeholder: bool,
    #[serde(default)]
    pub clips: Vec<MappedClip>,
}

impl From<&DraftSegment> for MappedSegment {
    fn from(d: &DraftSegment) -> Self {
        Self {
            text: d.text.clone(),
            emotion: default_emotion(),
            duration_estimate_seconds: d.duration_estimate_seconds,
            on_screen_text: d.on_screen_text.clone(),
            is_chart_placeholder: d.is_chart_placeholder,
            clips: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct SegmentsReply<T> {
    #[serde(default = "Vec::new")]
    segments: Vec<T>,
}

fn parse_segments<T: DeserializeOwned>(value: Value, who: &str) -> Result<Vec<T>> {
    let reply: SegmentsReply<T> =
        serde_json::from_value(value).with_context(|| format!("{} reply did not match the segment schema", who))?;
    Ok(reply.segments)
}

fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        "N/A".to_string()
    } else {
        items.join("\n- ")
    }
}

pub fn writer_prompt(role: WriterRole, ctx: &AgentContext) -> String {
    let previous = ctx.previous_text();
    let previous_section = if previous.is_empty() {
        String::new()
    } else {
        format!("\n\nPREVIOUS SEGMENTS (maintain story flow):\n{}", previous)
    };
    format!(
        "TOPIC: {}\n\nFACTS:\n- {}\n\nNEWS:\n- {}\n\nTARGET DURATION: {} seconds{}\n\nReturn ONLY valid JSON with this format:\n{{\n  \"segments\": [\n    {{\"text\": \"Your narration here\", \"duration_estimate_seconds\": 5}}\n  ]\n}}",
        ctx.topic,
        bullets(&ctx.facts),
        bullets(&ctx.news),
        role.target_seconds(ctx.target_seconds),
        previous_section
    )
}

/// One writer's segments; blank ones are dropped.
pub async fn run_writer(llm: &dyn ChatModel, role: WriterRole, ctx: &AgentContext) -> Result<Vec<DraftSegment>> {
    let reply = llm
        .chat_json(&role.system_prompt(), &writer_prompt(role, ctx))
        .await
        .with_context(|| format!("{} agent failed", role.label()))?;
    let mut segments: Vec<DraftSegment> = parse_segments(reply, role.label())?;
    segments.retain(|s| !s.text.trim().is_empty());
    if segments.is_empty() {
        logw(format!("{} agent returned no usable segments", role.label()));
    }
    Ok(segments)
}

/// Revised copy of `ctx.previous`. An empty reply keeps the draft as is.
pub async fn revise(llm: &dyn ChatModel, ctx: &AgentContext) -> Result<Vec<DraftSegment>> {
    let draft = serde_json::to_string_pretty(&ctx.previous)?;
    let user = format!(
        "TOPIC: {}\n\nSCRIPT TO REVISE:\n{}\n\nReturn the revised script in the same JSON format:\n{{\n  \"segments\": [\n    {{\"text\": \"...\", \"duration_estimate_seconds\": 5, \"on_screen_text\": \"...\", \"is_chart_placeholder\": false}}\n  ]\n}}\n\nPreserve all data points and the segment count.",
        ctx.topic, draft
    );
    let reply = llm.chat_json(REVISION_PROMPT, &user).await.context("Revision agent failed")?;
    let mut revised: Vec<DraftSegment> = parse_segments(reply, "Revision")?;
    revised.retain(|s| !s.text.trim().is_empty());
    if revised.is_empty() {
        logw("Revision returned nothing; keeping the draft");
        return Ok(ctx.previous.clone());
    }
    if revised.len() != ctx.previous.len() {
        logw(format!(
            "Revision changed the segment count ({} -> {})",
            ctx.previous.len(),
            revised.len()
        ));
    }
    Ok(revised)
}

/// Emotion and clip annotations. Falls back to the bare draft when the
/// model returns nothing usable.
pub async fn map_visuals(llm: &dyn ChatModel, segments: &[DraftSegment], topic: &str) -> Result<Vec<MappedSegment>> {
    let script = serde_json::to_string_pretty(segments)?;
    let user = format!(
        "TOPIC: {}\n\nSCRIPT TO ANNOTATE:\n{}\n\nAdd visual annotations (emotion, clips with tags and triggers) to each segment.\n\nReturn JSON:\n{{\n  \"segments\": [\n    {{\n      \"text\": \"...\",\n      \"emotion\": \"curious\",\n      \"duration_estimate_seconds\": 5,\n      \"on_screen_text\": null,\n      \"is_chart_placeholder\": false,\n      \"clips\": [{{\"tags\": [\"word1 word2 word3\"], \"trigger\": \"keyword\"}}]\n    }}\n  ]\n}}",
        topic, script
    );
    let reply = llm.chat_json(VISUAL_MAPPER_PROMPT, &user).await.context("Visual mapper failed")?;
    let mut mapped: Vec<MappedSegment> = parse_segments(reply, "Visual mapper")?;
    mapped.retain(|s| !s.text.trim().is_empty());
    if mapped.is_empty() {
        logw("Visual mapper returned nothing; using unannotated segments");
        return Ok(segments.iter().map(MappedSegment::from).collect());
    }
    Ok(mapped)
}

/// Folder-safe topic: lower-case, spaces to `_`, dots removed, 30 chars max.
pub fn topic_slug(topic: &str) -> String {
    topic
        .to_lowercase()
        .replace(' ', "_")
        .replace('.', "")
        .chars()
        .take(SLUG_MAX)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SpecOptions {
    pub voice_id: String,
    pub voice_speed: VoiceSpeed,
    pub music: String,
}

impl Default for SpecOptions {
    fn default() -> Self {
        Self {
            voice_id: crate::voice::DEFAULT_VOICE.to_string(),
            voice_speed: VoiceSpeed::Fast,
            music: "inspirational".to_string(),
        }
    }
}

pub fn build_video_spec(title: &str, segments: &[MappedSegment], opts: &SpecOptions, output_dir: PathBuf) -> VideoSpec {
    let specs = segments
        .iter()
        .map(|seg| {
            let clips = seg
                .clips
                .iter()
                .filter(|c| !c.tags.is_empty())
                .map(|c| ClipSpec {
                    tags: c.tags.clone(),
                    duration_pct: None,
                    trigger: c.trigger.clone().filter(|t| !t.trim().is_empty()),
                })
                .collect();
            let mut spec = SegmentSpec::new(seg.text.trim(), seg.emotion.clone()).with_clips(clips);
            spec.on_screen_text = seg.on_screen_text.clone().filter(|t| !t.trim().is_empty());
            spec
        })
        .collect();

    let mut spec = VideoSpec::new(title, specs);
    spec.voice_id = opts.voice_id.clone();
    spec.voice_speed = opts.voice_speed;
    spec.music = opts.music.clone();
    spec.output_dir = output_dir;
    spec
}

/// Price-chart data fetched for the Charts section.
#[derive(Debug, Clone)]
pub struct ChartAttachment {
    pub symbol: String,
    pub range: ChartRange,
    pub data: ChartData,
    pub data_path: PathBuf,
}

/// A chart waiting to be rendered for `spec.segments[segment_index]`.
#[derive(Debug, Clone)]
pub struct PendingChart {
    pub segment_index: usize,
    pub chart: ChartAttachment,
}

#[derive(Debug, Clone)]
pub struct GeneratedScript {
    pub spec: VideoSpec,
    pub charts: Vec<PendingChart>,
}

async fn fetch_chart(cdn: Option<&CdnClient>, input: &InputData, out_dir: &Path) -> Option<ChartAttachment> {
    let Some(cdn) = cdn else {
        logw("CDN not configured, skipping real chart data");
        return None;
    };
    let Some(symbol) = input.stock_symbol.clone().or_else(|| extract_symbol(&input.topic)) else {
        logw(format!("Could not find a stock symbol in topic: {}", input.topic));
        return None;
    };
    let range = ChartRange::Y1;
    logi(format!("Fetching chart data for {} from CDN", symbol));
    match build_chart_data(cdn, &symbol, range, out_dir).await {
        Ok((data, data_path)) => Some(ChartAttachment {
            symbol,
            range,
            data,
            data_path,
        }),
        Err(err) => {
            logw(format!("Failed to fetch CDN chart data: {:#}", err));
            None
        }
    }
}

/// Attach the chart to the first segment that asked for one.
fn attach_chart(segments: &mut [DraftSegment], chart: Option<ChartAttachment>) -> Option<(usize, ChartAttachment)> {
    let chart = chart?;
    let idx = segments.iter().position(|s| s.needs_chart)?;
    segments[idx].is_chart_placeholder = true;
    Some((idx, chart))
}

/// Pair charts with chart placeholder segments in order. When the mapper
/// dropped every placeholder flag the draft position is used.
fn link_charts(segments: &[MappedSegment], charts: Vec<(usize, ChartAttachment)>) -> Vec<PendingChart> {
    let placeholders: Vec<usize> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_chart_placeholder)
        .map(|(i, _)| i)
        .collect();
    charts
        .into_iter()
        .enumerate()
        .filter_map(|(n, (draft_idx, chart))| {
            let segment_index = if placeholders.is_empty() {
                Some(draft_idx).filter(|i| *i < segments.len())
            } else {
                placeholders.get(n).copied()
            }?;
            Some(PendingChart { segment_index, chart })
        })
        .collect()
}

/// Run all six agents and build the video spec. Charts are fetched as data
/// only; see [`render_charts`].
pub async fn generate_script_only(
    llm: &dyn ChatModel,
    cdn: Option<&CdnClient>,
    input: &InputData,
    opts: &SpecOptions,
    chart_data_dir: &Path,
    progress: Option<Progress<'_>>,
) -> Result<GeneratedScript> {
    input.validate()?;
    let notify = |step: usize, name: &str, status: StepStatus| {
        if let Some(cb) = progress {
            cb(step, name, status);
        }
    };

    logi(format!("Generating script for: {} (target {}s)", input.topic, input.target_seconds));
    let mut ctx = AgentContext::from_input(input);
    let mut charts = Vec::new();

    for (i, role) in WriterRole::ALL.into_iter().enumerate() {
        let step = i + 1;
        notify(step, role.label(), StepStatus::Running);
        let mut segments = run_writer(llm, role, &ctx).await?;
        if role == WriterRole::Charts {
            let chart = fetch_chart(cdn, input, chart_data_dir).await;
            if let Some((idx, chart)) = attach_chart(&mut segments, chart) {
                charts.push((ctx.previous.len() + idx, chart));
            }
        }
        ctx.previous.extend(segments);
        notify(step, role.label(), StepStatus::Done);
    }

    notify(5, "Revision", StepStatus::Running);
    let revised = revise(llm, &ctx).await?;
    notify(5, "Revision", StepStatus::Done);

    notify(6, "Visual Mapping", StepStatus::Running);
    let mapped = map_visuals(llm, &revised, &input.topic).await?;
    notify(6, "Visual Mapping", StepStatus::Done);

    let title = format!("{} Explainer", input.topic);
    let output_dir = PathBuf::from("out").join(topic_slug(&input.topic));
    let spec = build_video_spec(&title, &mapped, opts, output_dir);
    let charts = link_charts(&mapped, charts);
    logok(format!(
        "Script ready: {} segments, {} chart(s) to render",
        spec.segments.len(),
        charts.len()
    ));
    Ok(GeneratedScript { spec, charts })
}

/// Render pending charts into `<output_dir>/charts/` and point their
/// segments at the clips. Returns how many rendered.
pub async fn render_charts(
    spec: &mut VideoSpec,
    charts: &[PendingChart],
    renderer: &ChartRenderer,
    background_dir: &Path,
) -> usize {
    let chart_dir = spec.output_dir.join("charts");
    let mut rendered = 0;
    for (n, pending) in charts.iter().enumerate() {
        let Some(segment) = spec.segments.get_mut(pending.segment_index) else {
            continue;
        };
        let out = chart_dir.join(format!("chart_{:02}.mp4", n + 1));
        let background = pick_background(background_dir);
        match renderer.render(&pending.chart.data_path, &out, background.as_deref()).await {
            Ok(path) => {
                segment.chart_video = Some(path);
                rendered += 1;
            }
            Err(err) => logw(format!("Chart for {} failed: {:#}", pending.chart.symbol, err)),
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Value>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Value>) -> Self {
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        async fn chat_json(&self, _system: &str, user: &str) -> Result<Value> {
            self.prompts.lock().unwrap().push(user.to_string());
            Ok(self.replies.lock().unwrap().remove(0))
        }
    }

    fn writer(texts: &[&str]) -> Value {
        json!({"segments": texts.iter().map(|t| json!({"text": t, "duration_estimate_seconds": 4})).collect::<Vec<_>>()})
    }

    #[test]
    fn targets_have_floors() {
        assert_eq!(WriterRole::Introduction.target_seconds(60), 15);
        assert_eq!(WriterRole::Development.target_seconds(60), 18);
        assert_eq!(WriterRole::Charts.target_seconds(30), 8);
        assert_eq!(WriterRole::Conclusion.target_seconds(20), 10);
    }

    #[test]
    fn slug_rules() {
        assert_eq!(topic_slug("Nvidia Q3 2.5T Rally"), "nvidia_q3_25t_rally");
        assert_eq!(topic_slug(&"x ".repeat(40)).chars().count(), 30);
    }

    #[test]
    fn prompt_includes_previous_segments() {
        let mut ctx = AgentContext::from_input(&InputData::new("Apple"));
        assert!(!writer_prompt(WriterRole::Introduction, &ctx).contains("PREVIOUS SEGMENTS"));
        ctx.previous.push(DraftSegment::new("A garage in 1976."));
        let prompt = writer_prompt(WriterRole::Development, &ctx);
        assert!(prompt.contains("PREVIOUS SEGMENTS (maintain story flow):\nA garage in 1976."));
        assert!(prompt.contains("TARGET DURATION: 13 seconds"));
    }

    #[test]
    fn spec_uses_visuals_for_single_untriggered_clip() {
        let mapped: Vec<MappedSegment> = serde_json::from_value(json!([
            {"text": "Started in a garage.", "clips": [{"tags": ["garage workshop vintage"]}]},
            {"text": "Now worth trillions.", "emotion": "dramatic", "clips": [
                {"tags": ["garage"], "trigger": "Now"},
                {"tags": ["skyscraper city"], "trigger": "trillions"}
            ]}
        ]))
        .unwrap();
        let spec = build_video_spec("Apple Explainer", &mapped, &SpecOptions::default(), PathBuf::from("out/apple"));
        assert_eq!(spec.segments[0].visuals, vec!["garage workshop vintage"]);
        assert_eq!(spec.segments[0].emotion, "informative");
        assert!(spec.segments[0].clips.is_none());
        assert_eq!(spec.segments[1].clips.as_ref().map(Vec::len), Some(2));
        assert_eq!(spec.voice_speed, VoiceSpeed::Fast);
        spec.validate().unwrap();
    }

    #[test]
    fn charts_follow_placeholders_or_draft_position() {
        let chart = ChartAttachment {
            symbol: "AAPL.US".into(),
            range: ChartRange::Y1,
            data: ChartData::line("t", vec![], vec![]),
            data_path: PathBuf::from("c.json"),
        };
        let mut segs: Vec<MappedSegment> = ["a", "b", "c"].iter().map(|t| MappedSegment::from(&DraftSegment::new(*t))).collect();
        assert_eq!(link_charts(&segs, vec![(1, chart.clone())])[0].segment_index, 1);
        segs[2].is_chart_placeholder = true;
        assert_eq!(link_charts(&segs, vec![(1, chart.clone())])[0].segment_index, 2);
        assert_eq!(link_charts(&segs, vec![(0, chart.clone()), (0, chart)]).len(), 1);
    }

    #[tokio::test]
    async fn six_steps_produce_a_spec() {
        let mapped = json!({"segments": [
            {"text": "Picture this.", "emotion": "curious", "clips": [{"tags": ["city night"], "trigger": "Picture"}]},
            {"text": "Revenue tripled.", "clips": []},
            {"text": "Up 150% in a year.", "is_chart_placeholder": true, "on_screen_text": "+150%"},
            {"text": "What comes next?", "emotion": "impactful"}
        ]});
        let llm = Scripted::new(vec![
            writer(&["Picture this."]),
            writer(&["Revenue tripled.", "  "]),
            json!({"segments": [{"text": "Up 150% in a year.", "needs_chart": true}]}),
            writer(&["What comes next?"]),
            json!({"segments": []}),
            mapped,
        ]);

        let events = Mutex::new(Vec::new());
        let progress = |step: usize, name: &str, status: StepStatus| {
            events.lock().unwrap().push(format!("{}:{}:{}", step, name, status.as_str()));
        };
        let dir = tempfile::tempdir().unwrap();
        let generated = generate_script_only(
            &llm,
            None,
            &InputData::new("Nvidia 2.0"),
            &SpecOptions::default(),
            dir.path(),
            Some(&progress),
        )
        .await
        .unwrap();

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 2 * STEP_COUNT);
        assert_eq!(events[0], "1:Introduction:running");
        assert_eq!(events[11], "6:Visual Mapping:done");

        let spec = generated.spec;
        assert_eq!(spec.title, "Nvidia 2.0 Explainer");
        assert_eq!(spec.output_dir, PathBuf::from("out/nvidia_20"));
        assert_eq!(spec.segments.len(), 4);
        assert_eq!(spec.segments[2].on_screen_text.as_deref(), Some("+150%"));
        assert!(generated.charts.is_empty());

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[3].contains("Up 150% in a year."));
        assert!(prompts[4].contains("SCRIPT TO REVISE"));
    }
}
