// External tool discovery (yt-dlp engine, FFmpeg merge tool)

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    /// Environment variable that overrides discovery
    pub fn env_override(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "YTDLP_PATH",
            ToolType::Ffmpeg => "FFMPEG_PATH",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
}

pub struct ToolManager;

impl ToolManager {
    pub fn new() -> Self {
        Self
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = self.locate(tool_type);
        let version = path.as_deref().and_then(|p| self.get_version(p, tool_type));

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: version.is_some(),
            version,
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    /// Find a tool: env override, then common install paths, then PATH
    pub fn locate(&self, tool_type: ToolType) -> Option<PathBuf> {
        if let Ok(path) = std::env::var(tool_type.env_override()) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path.trim()));
            }
        }

        let binary_name = tool_type.as_str();
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];
        for path in common_paths {
            if Path::new(&path).exists() {
                return Some(PathBuf::from(path));
            }
        }

        let finder = if cfg!(windows) { "where" } else { "which" };
        if let Ok(output) = Command::new(finder).arg(binary_name).output() {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if let Some(first) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
                    return Some(PathBuf::from(first));
                }
            }
        }

        None
    }

    fn get_version(&self, path: &Path, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a banner; the first line carries the version
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .map(|l| l.trim().to_string())
            }
            _ => None,
        }
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}
