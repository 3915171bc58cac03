//! Fatal pipeline conditions surfaced to the CLI.

use std::path::PathBuf;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing configuration:\n{}", .0.join("\n"))]
    MissingConfig(Vec<String>),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid video spec: {0}")]
    InvalidSpec(String),

    #[error("no renderable segments (every segment lacked visuals or audio)")]
    NoRenderableSegments,

    #[error("ffmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("ffprobe failed for {path}: {message}")]
    FfprobeFailed { path: PathBuf, message: String },

    #[error("LLM returned an empty response")]
    EmptyLlmResponse,

    #[error("TTS failed: {0}")]
    TtsFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),
}

impl PipelineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec(message.into())
    }

    pub fn ffmpeg(message: impl Into<String>, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self::FfmpegFailed {
            message: message.into(),
            stderr: if stderr.is_empty() { None } else { Some(stderr) },
        }
    }

    pub fn ffprobe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FfprobeFailed {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_lists_every_item() {
        let err = PipelineError::MissingConfig(vec![
            "OPENAI_API_KEY".to_string(),
            "GOOGLE_API_KEY".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("OPENAI_API_KEY"));
        assert!(text.contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn empty_stderr_is_dropped() {
        match PipelineError::ffmpeg("render", "") {
            PipelineError::FfmpegFailed { stderr, .. } => assert!(stderr.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
