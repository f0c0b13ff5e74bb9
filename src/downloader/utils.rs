// Helper functions shared by the engine and the controller

use std::path::Path;
use std::process::Stdio;

use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use super::errors::EngineError;

/// Run command with timeout, collecting stdout and stderr
pub async fn run_output_with_timeout(
    program: &Path,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, EngineError> {
    let display = program.display().to_string();
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::ToolNotFound(display.clone()),
            _ => EngineError::Execution(format!("Failed to start {}: {}", display, e)),
        })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::Execution(format!("Failed to capture stdout from {}", display)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::Execution(format!("Failed to capture stderr from {}", display)))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| EngineError::Execution(format!("Failed to wait for {}: {}", display, e)))?;
            let stdout = join_pipe(stdout_task, "stdout").await?;
            let stderr = join_pipe(stderr_task, "stderr").await?;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(EngineError::Execution(format!("Timed out after {}s", timeout_secs)))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, EngineError> {
    task.await
        .map_err(|e| EngineError::Execution(format!("{} task failed: {}", name, e)))?
        .map_err(|e| EngineError::Execution(format!("Failed to read {}: {}", name, e)))
}

/// Pick the meaningful part of yt-dlp's stderr.
///
/// Prefers `ERROR:` lines; otherwise the last non-empty line.
pub fn summarize_stderr(stderr: &str) -> String {
    lazy_static::lazy_static! {
        static ref ERROR_RE: Regex = Regex::new(r"^\s*ERROR:\s*(.+)$").unwrap();
    }

    let errors: Vec<&str> = stderr
        .lines()
        .filter_map(|l| ERROR_RE.captures(l))
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim()))
        .collect();
    if !errors.is_empty() {
        return errors.join(" | ");
    }

    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Unknown error")
        .to_string()
}

/// Human-readable transfer speed
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec > 1024.0 * 1024.0 {
        format!("{:.2} MB/s", bytes_per_sec / 1024.0 / 1024.0)
    } else if bytes_per_sec > 1024.0 {
        format!("{:.2} KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.2} B/s", bytes_per_sec)
    }
}
