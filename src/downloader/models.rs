// Data models for the download flow
//
// Two views of the same data live here:
// - engine side: what yt-dlp reports (EngineInfo, EngineFormat, EngineProgress)
// - controller side: what the front end consumes (VideoMetadata, FormatDescriptor,
//   DownloadProgress, DownloadEvent)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;

/// Video metadata snapshot returned by a resolution request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub uploader_name: String,
    pub thumbnail_url: String,
    pub duration_seconds: u64,
}

impl VideoMetadata {
    /// Duration as `m:ss`
    pub fn formatted_duration(&self) -> String {
        format!("{}:{:02}", self.duration_seconds / 60, self.duration_seconds % 60)
    }
}

/// Selectable video format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub height_pixels: Option<u32>,
    pub container_ext: String,
    pub approx_size_bytes: Option<u64>,
    pub display_label: String,
}

/// A single download. Immutable once the transfer starts.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub source_url: String,
    /// `None` means "best auto"
    pub format_id: Option<String>,
    pub destination_directory: PathBuf,
}

impl DownloadRequest {
    pub fn new(source_url: impl Into<String>, destination_directory: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            format_id: None,
            destination_directory: destination_directory.into(),
        }
    }

    pub fn with_format(mut self, format_id: Option<String>) -> Self {
        self.format_id = format_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadPhase {
    Downloading,
    /// Transfer done, post-processing (audio/video mux) pending
    Merging,
    Done,
    Failed(DownloadError),
}

impl DownloadPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// 0 to 100
    pub fraction_complete: f32,
    pub phase: DownloadPhase,
}

/// Event delivered to the front end while a download runs
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Status(String),
}

/// Raw metadata from the engine's `--dump-single-json` output.
///
/// Only the fields this crate reads are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Vec<EngineFormat>,
}

/// One entry of the engine's format list, in engine order
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub height: Option<u32>,
    /// "none" for audio-only streams
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

impl EngineFormat {
    /// Exact size if known, otherwise the engine's estimate
    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }

    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Downloading,
    Finished,
    Error,
    #[serde(other)]
    Other,
}

/// Payload of one progress-hook invocation
#[derive(Debug, Clone, Deserialize)]
pub struct EngineProgress {
    pub status: EngineStatus,
    #[serde(default)]
    pub downloaded_bytes: Option<f64>,
    #[serde(default)]
    pub total_bytes: Option<f64>,
    #[serde(default)]
    pub total_bytes_estimate: Option<f64>,
    /// bytes per second
    #[serde(default)]
    pub speed: Option<f64>,
    /// seconds
    #[serde(default)]
    pub eta: Option<f64>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl EngineProgress {
    pub fn downloading(downloaded: f64, total: Option<f64>) -> Self {
        Self {
            status: EngineStatus::Downloading,
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            total_bytes_estimate: None,
            speed: None,
            eta: None,
            filename: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            status: EngineStatus::Finished,
            ..Self::downloading(0.0, None)
        }
    }

    /// Exact total if known, otherwise the estimate
    pub fn total(&self) -> Option<f64> {
        self.total_bytes
            .or(self.total_bytes_estimate)
            .filter(|t| *t > 0.0)
    }
}

/// Answer of the progress hook to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    Abort,
}

/// Options handed to the engine for one call
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Format-selection expression (`-f`)
    pub format: Option<String>,
    /// Output path template (`-o`)
    pub output_template: Option<String>,
    /// Netscape cookie file
    pub cookie_file: Option<PathBuf>,
    /// Merge tool location (`--ffmpeg-location`)
    pub ffmpeg_location: Option<PathBuf>,
    pub proxy: Option<String>,
    /// Socket timeout in seconds
    pub socket_timeout: Option<u32>,
}
