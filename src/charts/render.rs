use crate::config::Settings;
use crate::ffmpeg::{base_args, run_cmd};
use crate::{logi, logok, logw};
use anyhow::{Context, Result, bail};
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use walkdir::WalkDir;

/// Runs `CHART_RENDERER_CMD <chart.json> <out>` and optionally lays the
/// result over stock footage.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    program: String,
    args: Vec<String>,
    blur_background: bool,
    dims: (u32, u32),
}

impl ChartRenderer {
    /// `None` when no renderer command is configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        let renderer = Self::new(settings.chart_renderer_cmd.as_deref()?, settings.target_dims())?;
        Some(renderer.with_blur_background(settings.chart_blur_background))
    }

    pub fn new(command: &str, dims: (u32, u32)) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            blur_background: false,
            dims,
        })
    }

    pub fn with_blur_background(mut self, on: bool) -> Self {
        self.blur_background = on;
        self
    }

    async fn run_renderer(&self, data_json: &Path, out: &Path) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(data_json)
            .arg(out)
            .output()
            .await
            .with_context(|| format!("Failed to start chart renderer '{}'", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("chart renderer exited with {}: {}", output.status, stderr.trim());
        }
        if !fs::try_exists(out).await.unwrap_or(false) {
            bail!("chart renderer produced no file at {}", out.display());
        }
        Ok(())
    }

    /// Render `data_json` into `out_mp4`. With a background the chart is
    /// composited over it; if that fails the plain chart is kept.
    pub async fn render(&self, data_json: &Path, out_mp4: &Path, background: Option<&Path>) -> Result<PathBuf> {
        if let Some(parent) = out_mp4.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }

        let background = background.filter(|_| self.blur_background);
        let Some(bg) = background else {
            self.run_renderer(data_json, out_mp4).await?;
            logok(format!("Chart rendered: {}", out_mp4.display()));
            return Ok(out_mp4.to_path_buf());
        };

        let chart = out_mp4.with_extension("chart.mov");
        self.run_renderer(data_json, &chart).await?;
        match run_cmd(&compose_args(bg, &chart, out_mp4, self.dims)).await {
            Ok(()) => {
                fs::remove_file(&chart).await.ok();
                logok(format!("Chart composited over {}", bg.display()));
            }
            Err(err) => {
                logw(format!("Background composite failed ({:#}); keeping plain chart", err));
                fs::rename(&chart, out_mp4)
                    .await
                    .with_context(|| format!("Failed to move chart to {}", out_mp4.display()))?;
            }
        }
        Ok(out_mp4.to_path_buf())
    }
}

/// Blurred, cover-scaled background with the chart overlaid at the origin.
/// The chart's length decides the output length.
pub fn compose_args(background: &Path, chart: &Path, out: &Path, (w, h): (u32, u32)) -> Vec<String> {
    let graph = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},boxblur=20:2[bg];\
         [1:v]scale={w}:{h}:force_original_aspect_ratio=decrease[fg];\
         [bg][fg]overlay=(W-w)/2:(H-h)/2:format=auto:shortest=1[v]"
    );
    let mut args = base_args();
    args.extend([
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        background.display().to_string(),
        "-i".to_string(),
        chart.display().to_string(),
        "-filter_complex".to_string(),
        graph,
        "-map".to_string(),
        "[v]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-crf".to_string(),
        "18".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        out.display().to_string(),
    ]);
    args
}

/// A random downloaded clip to sit behind charts.
pub fn pick_background(dir: &Path) -> Option<PathBuf> {
    let mut clips: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("mp4") || x.eq_ignore_ascii_case("mov"))
        })
        .collect();
    clips.sort();
    let picked = clips.choose(&mut rand::thread_rng()).cloned();
    if let Some(p) = &picked {
        logi(format!("Chart background: {}", p.display()));
    }
    picked
}
