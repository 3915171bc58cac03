//! Downloaded-footage cache with a JSON manifest alongside the files.

use crate::ffmpeg;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const MANIFEST_FILE: &str = "cache_manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub file_path: PathBuf,
    pub tags: Vec<String>,
    pub query: String,
    pub source: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub content_hash: Option<String>,
}

/// Provenance of a freshly downloaded clip, recorded into the manifest.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub segment_id: u32,
    pub clip_index: usize,
    pub tags: Vec<String>,
    pub query: String,
    pub source: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_mb: f64,
    pub sources: BTreeMap<String, usize>,
    pub orphaned_files: usize,
}

/// Short digest of the normalised tag set; order and case do not matter.
pub fn tags_hash(tags: &[String]) -> String {
    let mut normalized: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
    normalized.sort();
    let digest = Sha256::digest(normalized.join("|").as_bytes());
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

pub fn cache_key(segment_id: u32, clip_index: usize, tags: &[String]) -> String {
    let hash = if tags.is_empty() {
        "default".to_string()
    } else {
        tags_hash(tags)
    };
    if clip_index > 0 {
        format!("seg{:02}_clip{:02}_{}", segment_id, clip_index, hash)
    } else {
        format!("seg{:02}_{}", segment_id, hash)
    }
}

fn content_hash_blocking(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect())
}

pub async fn content_hash(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || content_hash_blocking(&owned))
        .await
        .context("hash task panicked")?
}

pub struct VideoCache {
    dir: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl VideoCache {
    /// Open (and create) the cache directory. A corrupt manifest starts empty.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create cache dir {}", dir.display()))?;

        let manifest = dir.join(MANIFEST_FILE);
        let entries = match fs::read_to_string(&manifest).await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!("cache manifest {} unreadable ({}); starting empty", manifest.display(), err);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Ok(Self { dir, entries })
    }

    pub fn path_for(&self, segment_id: u32, clip_index: usize, tags: &[String]) -> PathBuf {
        self.dir.join(format!("{}.mp4", cache_key(segment_id, clip_index, tags)))
    }

    pub fn get_entry(&self, segment_id: u32, clip_index: usize, tags: &[String]) -> Option<&CacheEntry> {
        self.entries.get(&cache_key(segment_id, clip_index, tags))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a downloaded file. Missing files are ignored.
    pub async fn add_entry(&mut self, record: CacheRecord) -> Result<()> {
        let path = self.path_for(record.segment_id, record.clip_index, &record.tags);
        let Ok(meta) = fs::metadata(&path).await else {
            debug!("not caching missing file {}", path.display());
            return Ok(());
        };
        let hash = content_hash(&path).await?;

        let key = cache_key(record.segment_id, record.clip_index, &record.tags);
        self.entries.insert(
            key,
            CacheEntry {
                file_path: path,
                tags: record.tags,
                query: record.query,
                source: record.source,
                url: record.url,
                width: record.width,
                height: record.height,
                duration_seconds: record.duration_seconds,
                file_size: meta.len(),
                created_at: Utc::now(),
                content_hash: Some(hash),
            },
        );
        Ok(())
    }

    pub fn find_duplicate(&self, hash: &str) -> Option<&CacheEntry> {
        self.entries
            .values()
            .find(|e| e.content_hash.as_deref() == Some(hash))
    }

    pub fn stats(&self) -> CacheStats {
        let total_size: u64 = self.entries.values().map(|e| e.file_size).sum();
        let mut sources = BTreeMap::new();
        for entry in self.entries.values() {
            *sources.entry(entry.source.clone()).or_insert(0) += 1;
        }

        let known: Vec<&std::ffi::OsStr> = self
            .entries
            .values()
            .filter_map(|e| e.file_path.file_name())
            .collect();
        let orphaned_files = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "mp4"))
            .filter(|e| !known.contains(&e.file_name()))
            .count();

        CacheStats {
            total_entries: self.entries.len(),
            total_size_mb: (total_size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            sources,
            orphaned_files,
        }
    }

    /// Drop entries whose file is gone or undecodable, deleting the bad files.
    pub async fn cleanup_invalid(&mut self) -> Result<usize> {
        let mut bad = Vec::new();
        for (key, entry) in &self.entries {
            let exists = fs::metadata(&entry.file_path).await.is_ok();
            if !exists || !ffmpeg::is_video_valid(&entry.file_path).await {
                if exists {
                    fs::remove_file(&entry.file_path).await.ok();
                }
                bad.push(key.clone());
            }
        }
        for key in &bad {
            self.entries.remove(key);
        }
        if !bad.is_empty() {
            self.flush().await?;
        }
        Ok(bad.len())
    }

    pub async fn flush(&self) -> Result<()> {
        let manifest = self.dir.join(MANIFEST_FILE);
        let text = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&manifest, text)
            .await
            .with_context(|| format!("Failed to write {}", manifest.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tag_hash_ignores_order_and_case() {
        let a = tags_hash(&tags(&["Stock Chart", "finance"]));
        let b = tags_hash(&tags(&["finance ", "stock chart"]));
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, tags_hash(&tags(&["finance"])));
    }

    #[test]
    fn keys_encode_segment_and_clip() {
        assert_eq!(cache_key(3, 0, &[]), "seg03_default");
        let key = cache_key(3, 2, &tags(&["city"]));
        assert!(key.starts_with("seg03_clip02_"));
    }

    fn record(seg: u32, source: &str) -> CacheRecord {
        CacheRecord {
            segment_id: seg,
            clip_index: 0,
            tags: tags(&["office"]),
            query: "office business".into(),
            source: source.into(),
            url: "https://example.com/v.mp4".into(),
            width: 1920,
            height: 1080,
            duration_seconds: 12.0,
        }
    }

    #[tokio::test]
    async fn add_flush_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = VideoCache::open(dir.path()).await.unwrap();

        let path = cache.path_for(1, 0, &tags(&["office"]));
        tokio::fs::write(&path, vec![7u8; 2048]).await.unwrap();
        tokio::fs::write(dir.path().join("stray.mp4"), b"x").await.unwrap();

        cache.add_entry(record(1, "pexels")).await.unwrap();
        cache.add_entry(record(2, "pixabay")).await.unwrap(); // file absent, ignored
        cache.flush().await.unwrap();

        let reopened = VideoCache::open(dir.path()).await.unwrap();
        assert_eq!(reopened.len(), 1);
        let entry = reopened.get_entry(1, 0, &tags(&["office"])).unwrap();
        assert_eq!(entry.file_size, 2048);
        let hash = entry.content_hash.clone().unwrap();
        assert_eq!(hash.len(), 16);
        assert!(reopened.find_duplicate(&hash).is_some());

        let stats = reopened.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.sources.get("pexels"), Some(&1));
        assert_eq!(stats.orphaned_files, 1);
    }

    #[tokio::test]
    async fn cleanup_drops_missing_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = VideoCache::open(dir.path()).await.unwrap();

        let broken = cache.path_for(1, 0, &tags(&["office"]));
        tokio::fs::write(&broken, vec![0u8; 512]).await.unwrap();
        cache.add_entry(record(1, "pexels")).await.unwrap();
        let gone = cache.path_for(2, 0, &tags(&["office"]));
        tokio::fs::write(&gone, vec![1u8; 512]).await.unwrap();
        cache.add_entry(record(2, "pixabay")).await.unwrap();
        cache.flush().await.unwrap();
        tokio::fs::remove_file(&gone).await.unwrap();
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.cleanup_invalid().await.unwrap(), 2);
        assert!(cache.is_empty());
        assert!(!broken.exists());

        let reopened = VideoCache::open(dir.path()).await.unwrap();
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn corrupt_manifest_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(MANIFEST_FILE), "{not json").await.unwrap();
        let cache = VideoCache::open(dir.path()).await.unwrap();
        assert!(cache.is_empty());
    }
}
