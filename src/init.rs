use crate::config::Settings;
use crate::logi;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

/// Working directories for a run: downloads, narration, chart data and output.
pub fn required_dirs(settings: &Settings) -> Vec<PathBuf> {
    vec![
        settings.videos_dir(),
        settings.audio_dir(),
        settings.charts_dir(),
        settings.output_dir.clone(),
    ]
}

/// Create missing working directories; returns the ones that were created.
pub async fn ensure_directories(settings: &Settings) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    for dir in required_dirs(settings) {
        if fs::try_exists(&dir).await.unwrap_or(false) {
            continue;
        }
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        logi(format!("Created directory: {}", dir.display()));
        created.push(dir);
    }
    Ok(created)
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg").arg("-version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
