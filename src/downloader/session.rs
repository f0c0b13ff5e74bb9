// Download session controller
//
// Wraps a MediaEngine:
// - resolve(): metadata-only extraction + format list
// - start(): one download on its own task, events streamed over a channel
//
// Cancellation is cooperative. The token is checked at every progress-hook
// call; once observed, the hook answers Abort and nothing else is emitted
// until the single terminal Failed(Cancelled) event.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::errors::{AnalysisError, DownloadError};
use super::format_selector::FormatSelector;
use super::models::{
    DownloadEvent, DownloadPhase, DownloadProgress, DownloadRequest, EngineOptions,
    EngineProgress, EngineStatus, FormatDescriptor, HookAction, VideoMetadata,
};
use super::traits::MediaEngine;
use super::utils::format_speed;
use crate::config::DownloadConfig;
use crate::credentials::CredentialStore;

#[derive(Clone)]
pub struct DownloadSession {
    engine: Arc<dyn MediaEngine>,
    credentials: CredentialStore,
    config: DownloadConfig,
}

impl DownloadSession {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        credentials: CredentialStore,
        config: DownloadConfig,
    ) -> Self {
        Self {
            engine,
            credentials,
            config,
        }
    }

    fn engine_options(&self) -> EngineOptions {
        // A broken credential file should not block public videos
        let cookie_file = match self.credentials.cookie_file() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "[Download] Ignoring unreadable credentials");
                None
            }
        };

        EngineOptions {
            cookie_file,
            ffmpeg_location: self.config.ffmpeg_path.clone(),
            proxy: self.config.proxy.clone(),
            socket_timeout: Some(self.config.socket_timeout_secs),
            ..Default::default()
        }
    }

    /// Resolve a URL into metadata and its selectable formats
    pub async fn resolve(
        &self,
        url: &str,
    ) -> Result<(VideoMetadata, Vec<FormatDescriptor>), AnalysisError> {
        tracing::info!(url, engine = self.engine.name(), "[Download] Resolving");
        let info = self
            .engine
            .extract_info(url, &self.engine_options())
            .await
            .map_err(|e| {
                tracing::warn!(url, error = %e, "[Download] Resolution failed");
                AnalysisError::from(e)
            })?;

        let metadata = VideoMetadata {
            title: info.title.unwrap_or_else(|| "Unknown title".to_string()),
            uploader_name: info.uploader.unwrap_or_else(|| "Unknown uploader".to_string()),
            thumbnail_url: info.thumbnail.unwrap_or_default(),
            duration_seconds: info.duration.filter(|d| *d > 0.0).unwrap_or(0.0) as u64,
        };
        let formats = FormatSelector::build_options(&info.formats);
        tracing::info!(
            title = %metadata.title,
            formats = formats.len(),
            "[Download] Resolved"
        );
        Ok((metadata, formats))
    }

    /// Start a download on its own task
    pub fn start(&self, request: DownloadRequest) -> DownloadHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { session.run(request, token, tx).await });

        DownloadHandle {
            events: rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            task,
        }
    }

    /// Drive one download to its terminal outcome, emitting events on `events`
    pub async fn run(
        &self,
        request: DownloadRequest,
        cancel: CancellationToken,
        events: UnboundedSender<DownloadEvent>,
    ) -> Result<(), DownloadError> {
        let mut translator = ProgressTranslator::new(cancel, events.clone());
        let outcome = self.transfer(&request, &mut translator).await;

        match &outcome {
            Ok(()) => {
                tracing::info!(url = %request.source_url, "[Download] ✓ Done");
                let _ = events.send(DownloadEvent::Progress(DownloadProgress {
                    fraction_complete: 100.0,
                    phase: DownloadPhase::Done,
                }));
                let _ = events.send(DownloadEvent::Status("Download complete!".to_string()));
            }
            Err(e) => {
                tracing::warn!(url = %request.source_url, error = %e, "[Download] ✗ Failed");
                let _ = events.send(DownloadEvent::Progress(DownloadProgress {
                    fraction_complete: translator.last_fraction,
                    phase: DownloadPhase::Failed(e.clone()),
                }));
            }
        }
        outcome
    }

    async fn transfer(
        &self,
        request: &DownloadRequest,
        translator: &mut ProgressTranslator,
    ) -> Result<(), DownloadError> {
        translator.status("Initializing download engine...".to_string());

        tokio::fs::create_dir_all(&request.destination_directory)
            .await
            .map_err(|e| {
                DownloadError::Failed(format!(
                    "cannot create {}: {}",
                    request.destination_directory.display(),
                    e
                ))
            })?;

        let mut options = self.engine_options();
        options.format = Some(FormatSelector::format_spec(request.format_id.as_deref()));
        options.output_template = Some(
            request
                .destination_directory
                .join("%(title)s.%(ext)s")
                .to_string_lossy()
                .to_string(),
        );

        translator.status(format!(
            "Starting download (format: {})...",
            request.format_id.as_deref().unwrap_or("auto")
        ));
        tracing::info!(
            url = %request.source_url,
            format = ?options.format,
            cookies = options.cookie_file.is_some(),
            "[Download] Starting"
        );

        let result = self
            .engine
            .download(&request.source_url, &options, &mut |p| translator.on_progress(p))
            .await;

        if translator.aborted {
            return Err(DownloadError::Cancelled);
        }
        result.map_err(DownloadError::from)
    }
}

/// Maps engine progress payloads onto controller events
struct ProgressTranslator {
    cancel: CancellationToken,
    events: UnboundedSender<DownloadEvent>,
    last_fraction: f32,
    aborted: bool,
}

impl ProgressTranslator {
    fn new(cancel: CancellationToken, events: UnboundedSender<DownloadEvent>) -> Self {
        Self {
            cancel,
            events,
            last_fraction: 0.0,
            aborted: false,
        }
    }

    fn status(&self, text: String) {
        if !self.aborted {
            let _ = self.events.send(DownloadEvent::Status(text));
        }
    }

    fn progress(&mut self, fraction_complete: f32, phase: DownloadPhase) {
        self.last_fraction = fraction_complete;
        let _ = self.events.send(DownloadEvent::Progress(DownloadProgress {
            fraction_complete,
            phase,
        }));
    }

    fn on_progress(&mut self, p: EngineProgress) -> HookAction {
        if self.aborted {
            return HookAction::Abort;
        }
        if self.cancel.is_cancelled() {
            tracing::info!("[Download] Cancellation observed, aborting transfer");
            self.aborted = true;
            return HookAction::Abort;
        }

        match p.status {
            EngineStatus::Downloading => {
                if let Some(total) = p.total() {
                    let downloaded = p.downloaded_bytes.unwrap_or(0.0);
                    let fraction = (downloaded / total * 100.0).clamp(0.0, 100.0) as f32;
                    self.progress(fraction, DownloadPhase::Downloading);
                }
                let speed = p
                    .speed
                    .filter(|s| *s > 0.0)
                    .map(format_speed)
                    .unwrap_or_else(|| "Calculating...".to_string());
                let eta = p.eta.unwrap_or(0.0).max(0.0) as u64;
                self.status(format!("Downloading... speed: {} | ETA: {}s", speed, eta));
            }
            EngineStatus::Finished => {
                self.status("Download finished, processing/merging file...".to_string());
                self.progress(99.0, DownloadPhase::Merging);
            }
            EngineStatus::Error | EngineStatus::Other => {}
        }
        HookAction::Continue
    }
}

/// Handle to a running download
pub struct DownloadHandle {
    events: UnboundedReceiver<DownloadEvent>,
    cancel: CancellationToken,
    /// Dropping the handle cancels the operation
    _guard: DropGuard,
    task: JoinHandle<Result<(), DownloadError>>,
}

impl DownloadHandle {
    /// Next event, or `None` once the download has finished and all
    /// events were drained
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Request cancellation; observed at the next progress report
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<(), DownloadError> {
        self.task
            .await
            .map_err(|e| DownloadError::Failed(format!("download task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> (ProgressTranslator, UnboundedReceiver<DownloadEvent>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (ProgressTranslator::new(cancel.clone(), tx), rx, cancel)
    }

    fn drain(rx: &mut UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[test]
    fn test_unknown_total_emits_status_only() {
        let (mut t, mut rx, _) = translator();
        let mut p = EngineProgress::downloading(4096.0, None);
        p.speed = Some(2048.0);
        p.eta = Some(7.0);
        assert_eq!(t.on_progress(p), HookAction::Continue);

        assert_eq!(
            drain(&mut rx),
            vec![DownloadEvent::Status(
                "Downloading... speed: 2.00 KB/s | ETA: 7s".to_string()
            )]
        );
    }

    #[test]
    fn test_estimate_is_used_as_total() {
        let (mut t, mut rx, _) = translator();
        let mut p = EngineProgress::downloading(25.0, None);
        p.total_bytes_estimate = Some(100.0);
        t.on_progress(p);

        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            DownloadEvent::Progress(DownloadProgress {
                fraction_complete: 25.0,
                phase: DownloadPhase::Downloading,
            })
        );
        assert_eq!(
            events[1],
            DownloadEvent::Status("Downloading... speed: Calculating... | ETA: 0s".to_string())
        );
    }

    #[test]
    fn test_cancel_aborts_silently() {
        let (mut t, mut rx, cancel) = translator();
        cancel.cancel();
        assert_eq!(t.on_progress(EngineProgress::finished()), HookAction::Abort);
        assert_eq!(
            t.on_progress(EngineProgress::downloading(1.0, Some(2.0))),
            HookAction::Abort
        );
        assert!(t.aborted);
        assert!(drain(&mut rx).is_empty());
    }
}
