//! Footage search, ranking and fetch for every segment of a script.

use crate::cache::{CacheRecord, VideoCache};
use crate::download::{self, DownloadOptions, MIN_VALID_BYTES};
use crate::ffmpeg;
use crate::keywords::{build_search_query, extract_keywords, fallback_queries};
use crate::models::{Script, VisualAsset};
use crate::sources::{VideoResult, VideoSource};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

pub const SEARCH_LIMIT: usize = 8;
const DOWNLOAD_CANDIDATES: usize = 3;
const PARALLEL_SOURCES: usize = 2;
const PARALLEL_ANSWER_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONCURRENT_FETCHES: usize = 5;
const DEFAULT_CHART_DIMS: (u32, u32) = (1080, 1920);

/// Fit of one result against the target frame and clip length.
pub fn score_result(result: &VideoResult, target: (u32, u32), target_duration_ms: u64) -> f64 {
    let (tw, th) = (target.0.max(1) as f64, target.1.max(1) as f64);
    let (w, h) = (result.width as f64, result.height as f64);

    let res_score = (w / tw).min(h / th).min(1.5) * 25.0;

    let target_s = (target_duration_ms as f64 / 1000.0).max(f64::EPSILON);
    let dur = result.duration_seconds;
    let dur_score = if dur >= target_s {
        35.0
    } else if dur >= target_s * 0.5 {
        20.0
    } else {
        dur / target_s * 15.0
    };

    let target_portrait = target.1 > target.0;
    let aspect_score = if (result.height > result.width) == target_portrait {
        30.0
    } else if result.width == result.height {
        20.0
    } else {
        5.0
    };

    res_score + dur_score + aspect_score
}

/// Best first. Equal scores keep provider order.
pub fn rank_results(mut results: Vec<VideoResult>, target: (u32, u32), target_duration_ms: u64) -> Vec<VideoResult> {
    results.sort_by(|a, b| {
        score_result(b, target, target_duration_ms).total_cmp(&score_result(a, target, target_duration_ms))
    });
    results
}

#[derive(Debug, Clone)]
pub struct FetchedClip {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// `None` when an existing file was reused.
    pub result: Option<VideoResult>,
}

pub struct FootageFetcher {
    client: Client,
    sources: Vec<Arc<dyn VideoSource>>,
    target: (u32, u32),
}

impl FootageFetcher {
    pub fn new(client: Client, sources: Vec<Arc<dyn VideoSource>>, target: (u32, u32)) -> Self {
        Self {
            client,
            sources,
            target,
        }
    }

    fn available(&self) -> Vec<Arc<dyn VideoSource>> {
        self.sources.iter().filter(|s| s.is_available()).cloned().collect()
    }

    /// First available provider with a non-empty answer.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<VideoResult> {
        for source in self.available() {
            match source.search(query, limit).await {
                Ok(results) if !results.is_empty() => return results,
                Ok(_) => {}
                Err(err) => logw(format!("{} search failed: {:#}", source.name(), err)),
            }
        }
        Vec::new()
    }

    /// Race the first two available providers; the first non-empty answer
    /// wins and the others are aborted. Falls back to [`Self::search`].
    pub async fn search_parallel(&self, query: &str, limit: usize) -> Vec<VideoResult> {
        let racers: Vec<_> = self.available().into_iter().take(PARALLEL_SOURCES).collect();
        if racers.is_empty() {
            return Vec::new();
        }

        let mut set = JoinSet::new();
        for source in racers {
            let query = query.to_string();
            set.spawn(async move {
                let name = source.name();
                (name, source.search(&query, limit).await)
            });
        }

        loop {
            match tokio::time::timeout(PARALLEL_ANSWER_TIMEOUT, set.join_next()).await {
                Ok(Some(Ok((_, Ok(results))))) if !results.is_empty() => {
                    set.abort_all();
                    return results;
                }
                Ok(Some(Ok((name, Err(err))))) => debug!("{} search failed: {:#}", name, err),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    debug!("parallel search timed out for '{}'", query);
                    set.abort_all();
                    break;
                }
            }
        }

        self.search(query, limit).await
    }

    /// Primary query in parallel, then each broader fallback sequentially.
    pub async fn search_with_fallbacks(&self, query: &str, fallbacks: &[String], limit: usize) -> Vec<VideoResult> {
        let results = self.search_parallel(query, limit).await;
        if !results.is_empty() {
            return results;
        }
        for fallback in fallbacks {
            let results = self.search(fallback, limit).await;
            if !results.is_empty() {
                return results;
            }
        }
        Vec::new()
    }

    /// Find, rank and download a clip for `tags`/`narration` into `dest`.
    pub async fn fetch_video(
        &self,
        tags: &[String],
        narration: &str,
        dest: &Path,
        target_duration_ms: u64,
    ) -> Result<Option<FetchedClip>> {
        if download::file_len(dest).await > MIN_VALID_BYTES {
            if let Ok((width, height)) = ffmpeg::ffprobe_video_dimensions(dest).await {
                return Ok(Some(FetchedClip {
                    path: dest.to_path_buf(),
                    width,
                    height,
                    result: None,
                }));
            }
        }

        let primary = build_search_query(narration, tags);
        let fallbacks = fallback_queries(&primary);

        let results = self.search_with_fallbacks(&primary, &fallbacks, SEARCH_LIMIT).await;
        if results.is_empty() {
            return Ok(None);
        }

        let ranked = rank_results(results, self.target, target_duration_ms);
        for candidate in ranked.into_iter().take(DOWNLOAD_CANDIDATES) {
            match download::download_file(&self.client, &candidate.download_url, dest, DownloadOptions::default()).await {
                Ok(()) => {
                    return Ok(Some(FetchedClip {
                        path: dest.to_path_buf(),
                        width: candidate.width,
                        height: candidate.height,
                        result: Some(candidate),
                    }));
                }
                Err(err) => debug!("candidate {} failed: {:#}", candidate, err),
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone)]
struct FetchTask {
    segment_id: u32,
    clip_index: usize,
    tags: Vec<String>,
    narration: String,
    dest: PathBuf,
    duration_ms: u64,
}

impl FetchTask {
    fn asset(&self, width: u32, height: u32) -> VisualAsset {
        let path = self.dest.to_string_lossy().into_owned();
        VisualAsset {
            segment_id: self.segment_id,
            source_url: path,
            file_path: self.dest.clone(),
            width,
            height,
            duration_ms: self.duration_ms,
            trim_start_ms: 0,
            trim_end_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VisualFetchOptions {
    pub force_refresh: bool,
    pub target: (u32, u32),
    pub fps: u32,
}

/// Narration excerpt shown on a text card.
fn card_text(narration: &str) -> String {
    let words: Vec<&str> = narration.split_whitespace().collect();
    if words.len() <= 12 {
        words.join(" ")
    } else {
        format!("{}...", words[..12].join(" "))
    }
}

/// Fetch visuals for every segment. Assets per segment are ordered by
/// clip index; segments that end up empty get a generated text card.
pub async fn fetch_visuals_for_script(
    fetcher: Arc<FootageFetcher>,
    script: &Script,
    cache_dir: &Path,
    opts: VisualFetchOptions,
) -> Result<HashMap<u32, Vec<VisualAsset>>> {
    let mut cache = VideoCache::open(cache_dir).await?;
    match cache.cleanup_invalid().await {
        Ok(0) => {}
        Ok(n) => logi(format!("Removed {} invalid cache entries", n)),
        Err(err) => logw(format!("Cache cleanup failed: {:#}", err)),
    }

    let mut collected: HashMap<u32, Vec<(usize, VisualAsset)>> = HashMap::new();
    let mut tasks = Vec::new();

    for seg in &script.segments {
        if let Some(chart) = seg.chart_video.as_ref().filter(|p| p.exists()) {
            let (width, height) = ffmpeg::ffprobe_video_dimensions(chart)
                .await
                .unwrap_or(DEFAULT_CHART_DIMS);
            let asset = VisualAsset {
                segment_id: seg.id,
                source_url: "chart".to_string(),
                file_path: chart.clone(),
                width,
                height,
                duration_ms: seg.duration_ms(),
                trim_start_ms: 0,
                trim_end_ms: None,
            };
            collected.insert(seg.id, vec![(0, asset)]);
            continue;
        }

        if seg.clips().is_empty() {
            let tags = extract_keywords(&seg.narration, &seg.visual_tags);
            tasks.push(FetchTask {
                segment_id: seg.id,
                clip_index: 0,
                dest: cache.path_for(seg.id, 0, &tags),
                tags,
                narration: seg.narration.clone(),
                duration_ms: seg.duration_ms().max(1000),
            });
        } else {
            for (idx, clip) in seg.clips().iter().enumerate() {
                let duration_ms = (seg.duration_ms() as f64 * clip.duration_pct / 100.0) as u64;
                tasks.push(FetchTask {
                    segment_id: seg.id,
                    clip_index: idx,
                    dest: cache.path_for(seg.id, idx, &clip.tags),
                    tags: clip.tags.clone(),
                    narration: seg.narration.clone(),
                    duration_ms: duration_ms.max(500),
                });
            }
        }
    }

    let mut to_fetch = Vec::new();
    for task in tasks {
        if !opts.force_refresh && download::file_len(&task.dest).await > MIN_VALID_BYTES {
            let dims = match cache.get_entry(task.segment_id, task.clip_index, &task.tags) {
                Some(entry) => (entry.width, entry.height),
                None => ffmpeg::ffprobe_video_dimensions(&task.dest)
                    .await
                    .unwrap_or(DEFAULT_CHART_DIMS),
            };
            collected
                .entry(task.segment_id)
                .or_default()
                .push((task.clip_index, task.asset(dims.0, dims.1)));
        } else {
            to_fetch.push(task);
        }
    }

    let cached_count: usize = collected.values().map(Vec::len).sum();
    if cached_count > 0 {
        logi(format!("{} clips cached, {} to download", cached_count, to_fetch.len()));
    }

    if opts.force_refresh {
        for task in &to_fetch {
            tokio::fs::remove_file(&task.dest).await.ok();
        }
    }

    if !to_fetch.is_empty() {
        let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES.min(to_fetch.len())));
        let mut set = JoinSet::new();
        for task in to_fetch {
            let fetcher = Arc::clone(&fetcher);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = fetcher
                    .fetch_video(&task.tags, &task.narration, &task.dest, task.duration_ms)
                    .await;
                (task, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            let (task, outcome) = joined.context("footage task panicked")?;
            match outcome {
                Ok(Some(clip)) => {
                    if let Some(result) = &clip.result {
                        cache
                            .add_entry(CacheRecord {
                                segment_id: task.segment_id,
                                clip_index: task.clip_index,
                                tags: task.tags.clone(),
                                query: task.tags.iter().take(3).cloned().collect::<Vec<_>>().join(" "),
                                source: result.source.to_string(),
                                url: result.download_url.clone(),
                                width: clip.width,
                                height: clip.height,
                                duration_seconds: result.duration_seconds,
                            })
                            .await?;
                    }
                    collected
                        .entry(task.segment_id)
                        .or_default()
                        .push((task.clip_index, task.asset(clip.width, clip.height)));
                }
                Ok(None) => logw(format!(
                    "No footage for segment {} clip {}",
                    task.segment_id, task.clip_index
                )),
                Err(err) => logw(format!("Failed: segment {}: {:#}", task.segment_id, err)),
            }
        }
    }

    cache.flush().await?;

    for seg in &script.segments {
        if collected.get(&seg.id).is_some_and(|v| !v.is_empty()) {
            continue;
        }
        let dest = cache_dir.join(format!("card_seg{:02}.mp4", seg.id));
        let seconds = (seg.duration_ms().max(1000)) as f64 / 1000.0;
        match ffmpeg::make_text_card(&dest, &card_text(&seg.narration), seconds, opts.target, opts.fps).await {
            Ok(true) => {
                logw(format!("Segment {} uses a text card", seg.id));
                let asset = VisualAsset {
                    segment_id: seg.id,
                    source_url: "text-card".to_string(),
                    file_path: dest,
                    width: opts.target.0,
                    height: opts.target.1,
                    duration_ms: seg.duration_ms(),
                    trim_start_ms: 0,
                    trim_end_ms: None,
                };
                collected.insert(seg.id, vec![(0, asset)]);
            }
            Ok(false) => logw(format!("Segment {} has no visuals", seg.id)),
            Err(err) => logw(format!("Text card for segment {} failed: {:#}", seg.id, err)),
        }
    }

    let assets: HashMap<u32, Vec<VisualAsset>> = collected
        .into_iter()
        .map(|(id, mut clips)| {
            clips.sort_by_key(|(idx, _)| *idx);
            (id, clips.into_iter().map(|(_, a)| a).collect())
        })
        .collect();

    logok(format!(
        "Visuals ready for {}/{} segments",
        assets.len(),
        script.segments.len()
    ));
    Ok(assets)
}

/// Creative Commons background tracks.
pub const MUSIC_TRACKS: &[(&str, &str)] = &[
    (
        "Ambient Technology",
        "https://files.freemusicarchive.org/storage-freemusicarchive-org/music/ccCommunity/Kai_Engel/Satin/Kai_Engel_-_04_-_Sentinel.mp3",
    ),
    (
        "Cinematic Emotional",
        "https://files.freemusicarchive.org/storage-freemusicarchive-org/music/ccCommunity/Kai_Engel/Chapter_Two__Mild/Kai_Engel_-_08_-_Daemones.mp3",
    ),
];

fn mood_slug(mood: &str) -> String {
    let slug: String = mood
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() { "default".to_string() } else { slug }
}

/// Download a background track for `mood` into `audio_dir`. Any failure
/// means no music.
pub async fn fetch_background_music(client: &Client, mood: &str, audio_dir: &Path) -> Option<PathBuf> {
    let (name, url) = MUSIC_TRACKS.first()?;
    let dest = audio_dir.join(format!("bgm_{}.mp3", mood_slug(mood)));
    if download::file_len(&dest).await > MIN_VALID_BYTES {
        return Some(dest);
    }

    let opts = DownloadOptions {
        skip_validation: true,
        ..DownloadOptions::default()
    };
    match download::download_file(client, url, &dest, opts).await {
        Ok(()) => {
            logi(format!("Background music: {}", name));
            Some(dest)
        }
        Err(err) => {
            logw(format!("Background music unavailable: {:#}", err));
            None
        }
    }
}
