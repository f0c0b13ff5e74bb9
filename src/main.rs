// bilidl - terminal front end for the login and download controllers
//
// Drains each controller's event channel and renders it; Ctrl-C cancels the
// running operation.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use bilibili_downloader::config::AppConfig;
use bilibili_downloader::downloader::tools::{ToolManager, ToolType};
use bilibili_downloader::downloader::{
    DownloadEvent, DownloadPhase, DownloadRequest, DownloadSession,
};
use bilibili_downloader::login::qr::render_terminal;
use bilibili_downloader::login::{LoginEvent, LoginSession, PassportClient};
use bilibili_downloader::{init_tracing, YtDlpEngine};

#[derive(Parser)]
#[command(name = "bilidl", about = "Bilibili video downloader")]
struct Cli {
    /// Config file (defaults to <config dir>/bilibili-downloader/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in by scanning a QR code with the mobile app
    Login,
    /// Forget saved login cookies
    Logout,
    /// Show video details and available formats
    Info {
        /// Video URL
        url: String,
    },
    /// Download a video
    Download {
        /// Video URL
        url: String,
        /// Format ID from `info`; best MP4 when omitted
        #[arg(long, short)]
        format: Option<String>,
        /// Destination directory
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show yt-dlp / FFmpeg status
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Login => login(&config).await,
        Commands::Logout => {
            config
                .credentials
                .store()
                .clear()
                .context("Failed to remove saved cookies")?;
            println!("Logged out.");
            Ok(())
        }
        Commands::Info { url } => info(&config, &url).await,
        Commands::Download {
            url,
            format,
            output,
        } => download(&config, url, format, output).await,
        Commands::Tools => {
            for tool in ToolManager::new().get_all_tools() {
                match (&tool.path, &tool.version) {
                    (Some(path), Some(version)) => {
                        println!("{:<8} {} ({})", tool.name, version, path.display())
                    }
                    (Some(path), None) => {
                        println!("{:<8} found at {} but not runnable", tool.name, path.display())
                    }
                    _ => println!("{:<8} not found", tool.name),
                }
            }
            Ok(())
        }
    }
}

fn download_session(config: &AppConfig) -> DownloadSession {
    let mut download = config.download.clone();
    if download.ffmpeg_path.is_none() {
        download.ffmpeg_path = ToolManager::new().locate(ToolType::Ffmpeg);
    }
    let engine = YtDlpEngine::discover(download.ytdlp_path.clone(), download.info_timeout_secs);
    DownloadSession::new(Arc::new(engine), config.credentials.store(), download)
}

async fn login(config: &AppConfig) -> anyhow::Result<()> {
    let store = config.credentials.store();
    if store.is_logged_in() {
        println!("Already logged in; scanning again replaces the saved cookies.");
    }

    let api = PassportClient::new(&config.login).context("Failed to set up login client")?;
    let mut handle = LoginSession::new(Arc::new(api), config.login.poll_interval()).start();
    let cancel = handle.cancel_token();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut failure = None;
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(LoginEvent::QrReady(ticket)) => {
                    let qr = render_terminal(&ticket.qr_payload_url)
                        .context("Failed to render QR code")?;
                    println!("{}", qr);
                    println!("Scan with the Bilibili mobile app to log in.");
                }
                Some(LoginEvent::StatusUpdate(text)) => println!("{}", text),
                Some(LoginEvent::LoginSucceeded(bundle)) => {
                    store.save(&bundle).context("Failed to save login cookies")?;
                    println!("Login successful ({} cookies saved).", bundle.len());
                }
                Some(LoginEvent::LoginFailed(reason)) => failure = Some(reason),
                Some(LoginEvent::Cancelled) => println!("Login cancelled."),
                None => break,
            },
            _ = &mut ctrl_c, if !cancel.is_cancelled() => cancel.cancel(),
        }
    }

    handle.join().await;
    match failure {
        Some(reason) => bail!("Login failed: {}", reason),
        None => Ok(()),
    }
}

async fn info(config: &AppConfig, url: &str) -> anyhow::Result<()> {
    let session = download_session(config);
    let (meta, formats) = session.resolve(url).await?;

    println!("Title:    {}", meta.title);
    println!("Uploader: {}", meta.uploader_name);
    println!("Duration: {}", meta.formatted_duration());
    if !meta.thumbnail_url.is_empty() {
        println!("Cover:    {}", meta.thumbnail_url);
    }
    println!();
    if formats.is_empty() {
        println!("No selectable video formats; `download` will pick the best available.");
    }
    for f in &formats {
        println!("  {:<10} {}", f.format_id, f.display_label);
    }
    Ok(())
}

async fn download(
    config: &AppConfig,
    url: String,
    format: Option<String>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let session = download_session(config);
    let destination = output.unwrap_or_else(|| config.download.output_dir.clone());
    let request = DownloadRequest::new(url, destination).with_format(format);

    let mut handle = session.start(request);
    let cancel = handle.cancel_token();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdout = std::io::stdout();
    let mut percent = 0.0_f32;
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(DownloadEvent::Status(text)) => {
                    print!("\r\x1b[2K{:>5.1}% {}", percent, text);
                    stdout.flush().ok();
                }
                Some(DownloadEvent::Progress(p)) => match p.phase {
                    DownloadPhase::Downloading | DownloadPhase::Merging => {
                        percent = p.fraction_complete;
                    }
                    DownloadPhase::Done => println!("\r\x1b[2K100.0%"),
                    DownloadPhase::Failed(_) => println!(),
                },
                None => break,
            },
            _ = &mut ctrl_c, if !cancel.is_cancelled() => cancel.cancel(),
        }
    }

    handle.join().await?;
    println!();
    Ok(())
}
