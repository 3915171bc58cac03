//! Streamed downloads with retry, ZIP unpacking and ffprobe validation.

use crate::error::PipelineError;
use crate::{ffmpeg, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Files at or below this size are treated as truncated.
pub const MIN_VALID_BYTES: u64 = 10 * 1024;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const RETRY_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    pub retries: u32,
    pub skip_validation: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            retries: 2,
            skip_validation: false,
        }
    }
}

pub async fn file_len(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

async fn stream_to(client: &Client, url: &str, dest: &Path) -> Result<()> {
    let mut resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?;
    if !resp.status().is_success() {
        return Err(PipelineError::DownloadFailed(format!("HTTP {} for {}", resp.status().as_u16(), url)).into());
    }

    let mut file = fs::File::create(dest)
        .await
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    while let Some(chunk) = resp.chunk().await.context("download interrupted")? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

async fn is_zip(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path).await else {
        return false;
    };
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).await.is_ok() && &magic == ZIP_MAGIC
}

/// Name of the entry to pull out of an archive: the largest `.mp4`,
/// otherwise the largest `.mov`.
fn pick_video_entry(entries: &[(String, u64)]) -> Option<String> {
    let largest_with = |ext: &str| {
        entries
            .iter()
            .filter(|(name, _)| name.to_ascii_lowercase().ends_with(ext))
            .max_by_key(|(_, size)| *size)
            .map(|(name, _)| name.clone())
    };
    largest_with(".mp4").or_else(|| largest_with(".mov"))
}

fn extract_video_blocking(zip_path: &Path) -> Result<()> {
    let file = std::fs::File::open(zip_path)
        .with_context(|| format!("Failed to open {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("not a readable zip archive")?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if !entry.is_dir() {
            entries.push((entry.name().to_string(), entry.size()));
        }
    }
    let Some(name) = pick_video_entry(&entries) else {
        return Err(PipelineError::DownloadFailed("zip holds no video file".into()).into());
    };

    let parent = zip_path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    {
        let mut entry = archive.by_name(&name)?;
        let mut buf = vec![0u8; 256 * 1024];
        loop {
            let n = entry.read(&mut buf)?;
            if n == 0 {
                break;
            }
            tmp.write_all(&buf[..n])?;
        }
    }
    drop(archive);
    tmp.persist(zip_path)
        .map_err(|e| anyhow::anyhow!("Failed to replace archive: {}", e.error))?;
    Ok(())
}

/// Replace a downloaded ZIP with the video inside it.
pub async fn unpack_zip_in_place(path: &Path) -> Result<()> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_video_blocking(&owned))
        .await
        .context("zip task panicked")?
}

/// Download `url` to `dest`. An existing valid file is reused.
pub async fn download_file(client: &Client, url: &str, dest: &Path, opts: DownloadOptions) -> Result<()> {
    if file_len(dest).await > MIN_VALID_BYTES && ffmpeg::is_video_valid(dest).await {
        debug!("reusing {}", dest.display());
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }

    let mut last_err = None;
    for attempt in 0..=opts.retries {
        if attempt > 0 {
            tokio::time::sleep(RETRY_PAUSE).await;
        }
        match stream_to(client, url, dest).await {
            Ok(()) => {
                last_err = None;
                break;
            }
            Err(err) => {
                logw(format!("Download attempt {} failed: {:#}", attempt + 1, err));
                last_err = Some(err);
            }
        }
    }
    if let Some(err) = last_err {
        fs::remove_file(dest).await.ok();
        return Err(err);
    }

    if is_zip(dest).await {
        if let Err(err) = unpack_zip_in_place(dest).await {
            fs::remove_file(dest).await.ok();
            return Err(err);
        }
    }

    if !opts.skip_validation && !ffmpeg::is_video_valid(dest).await {
        fs::remove_file(dest).await.ok();
        return Err(PipelineError::DownloadFailed(format!("{} is not a playable video", dest.display())).into());
    }

    Ok(())
}
