// Error types for the download engine and the download controller

use thiserror::Error;

/// Guidance shown when the merge tool is missing.
pub const MERGER_MISSING_MESSAGE: &str = "FFmpeg was not found, so video and audio cannot be merged.\n\
     Install FFmpeg (or set FFMPEG_PATH) or pick a format that does not need merging.";

/// Errors raised by a `MediaEngine` implementation
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// yt-dlp binary could not be started
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Process-level failure (spawn, wait, pipes, timeout)
    #[error("execution error: {0}")]
    Execution(String),

    /// Engine output could not be understood
    #[error("parse error: {0}")]
    Parse(String),

    /// Engine reported a failure; carries its error text
    #[error("{0}")]
    Failed(String),

    /// Transfer aborted because the progress hook asked for it
    #[error("cancelled")]
    Cancelled,
}

/// Resolution-time failure (network, invalid URL, private or missing video)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to analyze video: {0}")]
pub struct AnalysisError(pub String);

impl From<EngineError> for AnalysisError {
    fn from(e: EngineError) -> Self {
        Self(e.to_string())
    }
}

/// Transfer-time failure, carried by `DownloadPhase::Failed`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    /// The merge tool (FFmpeg) is missing
    #[error("{}", MERGER_MISSING_MESSAGE)]
    MergerMissing,

    #[error("download failed: {0}")]
    Failed(String),
}

impl DownloadError {
    /// Classify raw engine error text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.to_lowercase().contains("ffmpeg") {
            return Self::MergerMissing;
        }
        Self::Failed(message)
    }
}

impl From<EngineError> for DownloadError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled => Self::Cancelled,
            EngineError::Failed(msg) => Self::from_message(msg),
            other => Self::from_message(other.to_string()),
        }
    }
}
