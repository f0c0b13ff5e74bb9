// yt-dlp engine - drives the native yt-dlp binary
//
// Metadata: `--dump-single-json` (no download; playlists come back as one
//   object with `entries`)
// Download: `--newline --progress-template "download:[progress] %(progress)j"`
//   so each progress-hook payload arrives on stdout as one JSON line.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use crate::downloader::errors::EngineError;
use crate::downloader::models::{EngineInfo, EngineOptions, EngineProgress, HookAction};
use crate::downloader::tools::{ToolManager, ToolType};
use crate::downloader::traits::{MediaEngine, ProgressHook};
use crate::downloader::utils::{run_output_with_timeout, summarize_stderr};

const PROGRESS_PREFIX: &str = "[progress] ";
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress)j";

/// What a non-progress stdout line tells us (logged only)
#[derive(Debug, PartialEq)]
enum OutputLine {
    Destination(String),
    Merging(String),
    AlreadyDownloaded,
}

fn classify_line(line: &str) -> Option<OutputLine> {
    lazy_static::lazy_static! {
        static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
        static ref MERGE_RE: Regex = Regex::new(r#"\[Merger\]\s+Merging formats into\s+"?([^"]+)"?"#).unwrap();
        static ref ALREADY_RE: Regex = Regex::new(r"has already been downloaded").unwrap();
    }

    if let Some(caps) = DEST_RE.captures(line) {
        return caps.get(1).map(|m| OutputLine::Destination(m.as_str().trim().to_string()));
    }
    if let Some(caps) = MERGE_RE.captures(line) {
        return caps.get(1).map(|m| OutputLine::Merging(m.as_str().trim().to_string()));
    }
    if ALREADY_RE.is_match(line) {
        return Some(OutputLine::AlreadyDownloaded);
    }
    None
}

/// Parse one `[progress] {...}` line
fn parse_progress_line(line: &str) -> Option<EngineProgress> {
    let json = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    match serde_json::from_str(json) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::debug!(error = %e, "[yt-dlp] Unparseable progress line");
            None
        }
    }
}

pub struct YtDlpEngine {
    ytdlp_path: PathBuf,
    info_timeout_secs: u64,
}

impl YtDlpEngine {
    pub fn new(ytdlp_path: PathBuf, info_timeout_secs: u64) -> Self {
        Self {
            ytdlp_path,
            info_timeout_secs,
        }
    }

    /// Use the configured path, else discover yt-dlp, else rely on PATH
    pub fn discover(configured: Option<PathBuf>, info_timeout_secs: u64) -> Self {
        let path = configured
            .or_else(|| ToolManager::new().locate(ToolType::YtDlp))
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));
        tracing::debug!(path = %path.display(), "[yt-dlp] Using binary");
        Self::new(path, info_timeout_secs)
    }

    fn common_args(options: &EngineOptions) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--encoding".to_string(),
            "utf-8".to_string(),
        ];
        if let Some(timeout) = options.socket_timeout {
            args.push("--socket-timeout".to_string());
            args.push(timeout.to_string());
        }
        if let Some(path) = &options.cookie_file {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().to_string());
        }
        if let Some(proxy) = &options.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args
    }

    fn info_args(url: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = vec!["--dump-single-json".to_string()];
        args.extend(Self::common_args(options));
        args.push(url.to_string());
        args
    }

    fn download_args(url: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "--no-update".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
        ];
        args.extend(Self::common_args(options));
        if let Some(format) = &options.format {
            args.push("-f".to_string());
            args.push(format.clone());
        }
        if let Some(template) = &options.output_template {
            args.push("-o".to_string());
            args.push(template.clone());
        }
        if let Some(ffmpeg) = &options.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().to_string());
        }
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract_info(
        &self,
        url: &str,
        options: &EngineOptions,
    ) -> Result<EngineInfo, EngineError> {
        let args = Self::info_args(url, options);
        tracing::debug!(args = %args.join(" "), "[yt-dlp] Extracting info");

        let output = run_output_with_timeout(&self.ytdlp_path, args, self.info_timeout_secs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed(summarize_stderr(&stderr)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| EngineError::Parse(format!("Invalid JSON: {}", e)))
    }

    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        hook: &mut ProgressHook<'_>,
    ) -> Result<(), EngineError> {
        let args = Self::download_args(url, options);
        tracing::debug!(args = %args.join(" "), "[yt-dlp] Starting download");

        let display = self.ytdlp_path.display().to_string();
        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EngineError::ToolNotFound(display.clone()),
                _ => EngineError::Execution(format!("Failed to start yt-dlp: {}", e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Execution("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Execution("Failed to capture stderr".to_string()))?;

        // Collect stderr concurrently so the pipe never fills up
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        });

        // Raw byte lines: a title in the console's legacy codepage must not
        // stop the drain, or yt-dlp blocks on a full pipe
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "[yt-dlp] Failed to read stdout");
                    break;
                }
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);

            if let Some(progress) = parse_progress_line(line) {
                if hook(progress) == HookAction::Abort {
                    tracing::info!("[yt-dlp] Abort requested, killing process");
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(EngineError::Cancelled);
                }
                continue;
            }

            match classify_line(line) {
                Some(OutputLine::Destination(path)) => {
                    tracing::info!(path = %path, "[yt-dlp] Destination");
                }
                Some(OutputLine::Merging(path)) => {
                    tracing::info!(path = %path, "[yt-dlp] Merging formats");
                }
                Some(OutputLine::AlreadyDownloaded) => {
                    tracing::info!("[yt-dlp] File already downloaded");
                }
                None => tracing::trace!(line = %line, "[yt-dlp]"),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Execution(format!("Process error: {}", e)))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Failed(summarize_stderr(&stderr_output)))
        }
    }
}
