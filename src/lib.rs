pub mod config;
pub mod credentials;
pub mod downloader;
pub mod login;
pub mod ytdlp;

pub use config::AppConfig;
pub use credentials::{CredentialBundle, CredentialStore};
pub use downloader::{DownloadSession, MediaEngine};
pub use login::{LoginApi, LoginSession, PassportClient};
pub use ytdlp::YtDlpEngine;

/// Initialize tracing for the binary.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
