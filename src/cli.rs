use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use finshorts::agents::{Progress, STEP_COUNT, StepStatus};
use finshorts::config::{CONFIG_FILE, Settings};
use finshorts::init;
use finshorts::models::{InputData, VideoStyle};
use finshorts::pipeline::{self, CreateOptions, GenerateOptions, RunOptions};
use finshorts::video_spec::VideoSpec;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "finshorts", version, about = "Short-form financial explainer videos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Full pipeline from an input JSON file
    Run(RunArgs),
    /// Render a video from a YAML or JSON video spec
    Create(CreateArgs),
    /// Write a video spec with the multi-agent script writer
    Generate(GenerateArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    /// Target length; defaults to the style's length when --style is given
    #[arg(long)]
    seconds: Option<u32>,
    #[arg(long, value_enum)]
    style: Option<VideoStyle>,
    #[arg(long)]
    mood: Option<String>,
    /// Voice name or alias (e.g. journey_male)
    #[arg(long)]
    voice: Option<String>,
    /// Let the LLM annotate pacing and emphasis per segment
    #[arg(long)]
    ai_speech: bool,
    #[arg(long)]
    no_burn_subtitles: bool,
}

#[derive(Args)]
struct CreateArgs {
    spec: PathBuf,
    /// Overrides the video spec's output_dir
    #[arg(long)]
    output: Option<PathBuf>,
    /// Ignore cached footage
    #[arg(long)]
    refresh: bool,
    #[arg(long)]
    no_burn_subtitles: bool,
}

#[derive(Args)]
struct GenerateArgs {
    input: Option<PathBuf>,
    /// Quick topic instead of an input file
    #[arg(short, long)]
    topic: Option<String>,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Target seconds for --topic
    #[arg(short, long, default_value_t = 60)]
    duration: u32,
    #[arg(short = 'v', long)]
    create_video: bool,
    #[arg(short, long)]
    refresh: bool,
    #[arg(long)]
    no_burn_subtitles: bool,
    #[arg(long)]
    skip_charts: bool,
}

async fn read_input(path: &Path) -> Result<InputData> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid input JSON: {}", path.display()))
}

fn apply_run_overrides(input: &mut InputData, args: &RunArgs) {
    if let Some(style) = args.style {
        input.video_style = style;
        input.target_seconds = style.default_seconds();
    }
    if let Some(seconds) = args.seconds {
        input.target_seconds = seconds;
    }
    if let Some(mood) = &args.mood {
        input.mood = mood.clone();
    }
    if let Some(voice) = &args.voice {
        input.voice_id = Some(voice.clone());
    }
}

fn quick_input(topic: &str, seconds: u32) -> InputData {
    let mut input = InputData::new(topic);
    input.target_seconds = seconds;
    input.mood = "informative".to_string();
    input
}

async fn run(settings: &Settings, args: RunArgs) -> Result<()> {
    let mut input = read_input(&args.input).await?;
    apply_run_overrides(&mut input, &args);
    let opts = RunOptions {
        use_ai_speech: args.ai_speech.then_some(true),
        burn_subtitles: !args.no_burn_subtitles,
    };
    let out = pipeline::run_pipeline(settings, &input, &args.out, &opts).await?;
    println!("Video:     {}", out.video.display());
    println!("Subtitles: {}", out.subtitles.display());
    println!("Manifest:  {}", out.manifest.display());
    Ok(())
}

async fn create(settings: &Settings, args: CreateArgs) -> Result<()> {
    let spec = VideoSpec::load(&args.spec).await?;
    let opts = CreateOptions {
        output_dir: args.output,
        force_refresh: args.refresh,
        burn_subtitles: !args.no_burn_subtitles,
    };
    let out = pipeline::create_video(settings, &spec, &opts).await?;
    println!("Video created: {}", out.video.display());
    Ok(())
}

fn print_progress(step: usize, name: &str, status: StepStatus) {
    println!("[{}/{}] {} {}", step, STEP_COUNT, name, status.as_str());
}

async fn generate(settings: &Settings, args: GenerateArgs) -> Result<()> {
    let input = match (&args.input, &args.topic) {
        (Some(path), _) => read_input(path).await?,
        (None, Some(topic)) => quick_input(topic, args.duration),
        (None, None) => bail!("Provide an input JSON file or --topic"),
    };
    let opts = GenerateOptions {
        output: args.output,
        skip_charts: args.skip_charts,
        create_video: args.create_video,
        force_refresh: args.refresh,
        burn_subtitles: !args.no_burn_subtitles,
        ..GenerateOptions::default()
    };
    let progress: Progress = &print_progress;
    let out = pipeline::generate_spec(settings, &input, &opts, Some(progress)).await?;

    println!("\n{}", out.spec.title);
    for (i, seg) in out.spec.segments.iter().take(3).enumerate() {
        let preview: String = seg.text.chars().take(80).collect();
        println!("  {}. {}", i + 1, preview);
    }
    if out.spec.segments.len() > 3 {
        println!("  ... {} more", out.spec.segments.len() - 3);
    }
    match &out.video {
        Some(video) => println!("Video created: {}", video.video.display()),
        None => println!("To create video: finshorts create {}", out.yaml_path.display()),
    }
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let settings = Settings::load(CONFIG_FILE).await?;
    init::ensure_directories(&settings).await?;
    if !init::check_ffmpeg().await {
        tracing::warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    match cli.command {
        Command::Run(args) => run(&settings, args).await,
        Command::Create(args) => create(&settings, args).await,
        Command::Generate(args) => generate(&settings, args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_override_input() {
        let cli = Cli::parse_from([
            "finshorts", "run", "--input", "in.json", "--out", "out", "--style", "documentary", "--voice",
            "journey_male",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut input = InputData::new("Nvidia");
        apply_run_overrides(&mut input, &args);
        assert_eq!(input.video_style, VideoStyle::Documentary);
        assert_eq!(input.target_seconds, 300);
        assert_eq!(input.voice_id.as_deref(), Some("journey_male"));
    }

    #[test]
    fn explicit_seconds_beat_style() {
        let cli = Cli::parse_from([
            "finshorts", "run", "--input", "i", "--out", "o", "--style", "documentary", "--seconds", "90",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut input = InputData::new("x");
        apply_run_overrides(&mut input, &args);
        assert_eq!(input.target_seconds, 90);
    }

    #[test]
    fn generate_short_flags() {
        let cli = Cli::parse_from(["finshorts", "generate", "-t", "Apple stock", "-d", "45", "-v"]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.topic.as_deref(), Some("Apple stock"));
        assert!(args.create_video);
        let input = quick_input("Apple stock", args.duration);
        assert_eq!(input.target_seconds, 45);
        assert_eq!(input.mood, "informative");
        assert!(input.facts.is_empty());
    }
}
