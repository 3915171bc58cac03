use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod agents;
pub mod api;
pub mod arranger;
pub mod cache;
pub mod charts;
pub mod config;
pub mod download;
pub mod error;
pub mod ffmpeg;
pub mod footage;
pub mod init;
pub mod keywords;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod script;
pub mod sources;
pub mod ssml;
pub mod subtitles;
pub mod tts;
pub mod video_spec;
pub mod voice;

pub type PipelineLogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<PipelineLogHook>>> = Lazy::new(|| Mutex::new(None));

/// Mirror every pipeline log line into `hook` (or stop mirroring with `None`).
pub fn set_log_hook(hook: Option<PipelineLogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("{}", message),
        _ => tracing::info!("[{}] {}", tag, message),
    }

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
