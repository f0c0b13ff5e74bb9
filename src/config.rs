// Application configuration
//
// Loaded from `<config_dir>/bilibili-downloader/config.json` when present;
// every field has a default so a partial (or missing) file is fine.
// `YTDLP_PATH`, `FFMPEG_PATH` and `BILIDL_PROXY` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialStore;

pub const APP_DIR: &str = "bilibili-downloader";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub login: LoginConfig,
    pub download: DownloadConfig,
    pub credentials: CredentialConfig,
}

/// QR-login endpoints and polling behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub generate_url: String,
    pub poll_url: String,
    /// Site whose cookies make up the credential bundle
    pub cookie_url: String,
    pub user_agent: String,
    pub referer: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub proxy: Option<String>,
}

impl LoginConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            generate_url: "https://passport.bilibili.com/x/passport-login/web/qrcode/generate"
                .to_string(),
            poll_url: "https://passport.bilibili.com/x/passport-login/web/qrcode/poll".to_string(),
            cookie_url: "https://www.bilibili.com/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
            referer: "https://www.bilibili.com/".to_string(),
            poll_interval_ms: 2000,
            request_timeout_secs: 15,
            proxy: None,
        }
    }
}

/// Engine and output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// yt-dlp binary; discovered when unset
    pub ytdlp_path: Option<PathBuf>,
    /// FFmpeg binary handed to yt-dlp for merging; discovered when unset
    pub ffmpeg_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub proxy: Option<String>,
    pub socket_timeout_secs: u32,
    /// Upper bound for a metadata-only extraction
    pub info_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            output_dir: dirs::download_dir()
                .unwrap_or_else(|| PathBuf::from("downloads")),
            proxy: None,
            socket_timeout_secs: 30,
            info_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub netscape_path: PathBuf,
    pub json_path: PathBuf,
    pub cookie_domain: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        let dir = dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            netscape_path: dir.join("cookies.txt"),
            json_path: dir.join("cookies.json"),
            cookie_domain: ".bilibili.com".to_string(),
        }
    }
}

impl CredentialConfig {
    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(&self.netscape_path, &self.json_path, &self.cookie_domain)
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.json"))
    }

    /// Load from `path` (or the default location), then apply env overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(&p)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "[Config] Loaded config file");
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(p) = env_non_empty("YTDLP_PATH") {
            self.download.ytdlp_path = Some(PathBuf::from(p));
        }
        if let Some(p) = env_non_empty("FFMPEG_PATH") {
            self.download.ffmpeg_path = Some(PathBuf::from(p));
        }
        if let Some(proxy) = env_non_empty("BILIDL_PROXY") {
            self.login.proxy = Some(proxy.clone());
            self.download.proxy = Some(proxy);
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoginConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(config.poll_url.ends_with("/qrcode/poll"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"login": {"poll_interval_ms": 500}, "download": {"output_dir": "/tmp/videos"}}"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.login.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.login.request_timeout_secs, 15);
        assert_eq!(config.download.output_dir, PathBuf::from("/tmp/videos"));
        assert_eq!(config.credentials.cookie_domain, ".bilibili.com");
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(AppConfig::from_file(&path), Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_missing_explicit_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.login.poll_interval_ms, 2000);
    }
}
