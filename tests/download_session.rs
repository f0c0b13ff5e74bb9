use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use bilibili_downloader::config::DownloadConfig;
use bilibili_downloader::credentials::{CredentialBundle, CredentialStore};
use bilibili_downloader::downloader::format_selector::DEFAULT_FORMAT_SPEC;
use bilibili_downloader::downloader::{
    AnalysisError, DownloadError, DownloadEvent, DownloadPhase, DownloadProgress,
    DownloadRequest, DownloadSession, EngineError, EngineFormat, EngineInfo, EngineOptions,
    EngineProgress, HookAction, MediaEngine, ProgressHook,
};

/// Engine that replays a fixed list of progress reports
#[derive(Default)]
struct ScriptedEngine {
    info: Option<Result<EngineInfo, EngineError>>,
    steps: Vec<EngineProgress>,
    result: Option<Result<(), EngineError>>,
    /// Cancel this token right after the report at the given index
    cancel_after: Option<(usize, CancellationToken)>,
    /// Keep reporting even when the hook asks to abort
    ignore_abort: bool,
    /// Wait for this after the first report
    gate: Option<Arc<Notify>>,
    hook_calls: Mutex<usize>,
    seen_options: Mutex<Option<EngineOptions>>,
    outcome: Mutex<Option<Result<(), EngineError>>>,
    done: Notify,
}

impl ScriptedEngine {
    async fn play(&self, hook: &mut ProgressHook<'_>) -> Result<(), EngineError> {
        for (i, step) in self.steps.iter().enumerate() {
            *self.hook_calls.lock().unwrap() += 1;
            if hook(step.clone()) == HookAction::Abort && !self.ignore_abort {
                return Err(EngineError::Cancelled);
            }
            if let Some((at, token)) = &self.cancel_after {
                if *at == i {
                    token.cancel();
                }
            }
            if let (0, Some(gate)) = (i, &self.gate) {
                gate.notified().await;
            }
        }
        self.result.clone().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract_info(
        &self,
        _url: &str,
        options: &EngineOptions,
    ) -> Result<EngineInfo, EngineError> {
        *self.seen_options.lock().unwrap() = Some(options.clone());
        self.info.clone().unwrap_or_else(|| Ok(EngineInfo::default()))
    }

    async fn download(
        &self,
        _url: &str,
        options: &EngineOptions,
        hook: &mut ProgressHook<'_>,
    ) -> Result<(), EngineError> {
        *self.seen_options.lock().unwrap() = Some(options.clone());
        let result = self.play(hook).await;
        *self.outcome.lock().unwrap() = Some(result.clone());
        self.done.notify_one();
        result
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn store(&self) -> CredentialStore {
        CredentialStore::new(
            self.dir.path().join("cookies.txt"),
            self.dir.path().join("cookies.json"),
            ".bilibili.com",
        )
    }

    fn session(&self, engine: Arc<ScriptedEngine>) -> DownloadSession {
        let config = DownloadConfig {
            ffmpeg_path: Some("/opt/ffmpeg/bin/ffmpeg".into()),
            output_dir: self.dir.path().join("out"),
            ..DownloadConfig::default()
        };
        DownloadSession::new(engine, self.store(), config)
    }

    fn request(&self, format_id: Option<&str>) -> DownloadRequest {
        DownloadRequest::new("https://www.bilibili.com/video/BV1xx411c7mD", self.dir.path().join("out"))
            .with_format(format_id.map(str::to_string))
    }
}

fn video(id: &str, height: Option<u32>) -> EngineFormat {
    EngineFormat {
        format_id: id.to_string(),
        ext: "mp4".to_string(),
        height,
        vcodec: Some("avc1.640032".to_string()),
        ..Default::default()
    }
}

fn audio(id: &str) -> EngineFormat {
    EngineFormat {
        format_id: id.to_string(),
        ext: "m4a".to_string(),
        vcodec: Some("none".to_string()),
        acodec: Some("mp4a.40.2".to_string()),
        ..Default::default()
    }
}

async fn run(
    session: &DownloadSession,
    request: DownloadRequest,
    cancel: CancellationToken,
) -> (Vec<DownloadEvent>, Result<(), DownloadError>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = session.run(request, cancel, tx).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (events, result)
}

fn progress_of(events: &[DownloadEvent]) -> Vec<DownloadProgress> {
    events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::Progress(p) => Some(p.clone()),
            _ => None,
        })
        .collect()
}

fn at(fraction_complete: f32, phase: DownloadPhase) -> DownloadProgress {
    DownloadProgress {
        fraction_complete,
        phase,
    }
}

#[tokio::test]
async fn test_resolve_builds_metadata_and_formats() {
    let fx = Fixture::new();
    let engine = Arc::new(ScriptedEngine {
        info: Some(Ok(EngineInfo {
            title: Some("测试视频".to_string()),
            uploader: None,
            duration: Some(95.4),
            formats: vec![
                audio("30280"),
                video("100026", Some(1080)),
                video("100024", Some(720)),
                video("100022", None),
            ],
            ..Default::default()
        })),
        ..Default::default()
    });

    let (meta, formats) = fx.session(engine.clone()).resolve("https://b23.tv/abc").await.unwrap();
    assert_eq!(meta.title, "测试视频");
    assert_eq!(meta.uploader_name, "Unknown uploader");
    assert_eq!(meta.duration_seconds, 95);

    let ids: Vec<_> = formats.iter().map(|f| f.format_id.as_str()).collect();
    assert_eq!(ids, vec!["100024", "100026"]);
    assert_eq!(formats[0].height_pixels, Some(720));

    let options = engine.seen_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.cookie_file, None);
    assert_eq!(options.format, None);
}

#[tokio::test]
async fn test_resolve_failure_is_analysis_error() {
    let fx = Fixture::new();
    let engine = Arc::new(ScriptedEngine {
        info: Some(Err(EngineError::Failed("ERROR: Video unavailable".to_string()))),
        ..Default::default()
    });

    let err = fx.session(engine).resolve("https://b23.tv/gone").await.unwrap_err();
    assert_eq!(err, AnalysisError("ERROR: Video unavailable".to_string()));
    assert_eq!(err.to_string(), "failed to analyze video: ERROR: Video unavailable");
}

#[tokio::test]
async fn test_successful_download_progress_sequence() {
    let fx = Fixture::new();
    let engine = Arc::new(ScriptedEngine {
        steps: vec![
            EngineProgress::downloading(50.0, Some(100.0)),
            EngineProgress::downloading(80.0, Some(100.0)),
            EngineProgress::finished(),
        ],
        ..Default::default()
    });

    let (events, result) = run(
        &fx.session(engine.clone()),
        fx.request(Some("100026")),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(result, Ok(()));
    assert_eq!(
        progress_of(&events),
        vec![
            at(50.0, DownloadPhase::Downloading),
            at(80.0, DownloadPhase::Downloading),
            at(99.0, DownloadPhase::Merging),
            at(100.0, DownloadPhase::Done),
        ]
    );
    assert_eq!(
        events.first(),
        Some(&DownloadEvent::Status("Initializing download engine...".to_string()))
    );
    assert_eq!(
        events.last(),
        Some(&DownloadEvent::Status("Download complete!".to_string()))
    );

    let options = engine.seen_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.format.as_deref(), Some("100026+bestaudio/best"));
    assert!(options
        .output_template
        .as_deref()
        .unwrap()
        .ends_with("%(title)s.%(ext)s"));
    assert_eq!(options.ffmpeg_location, Some("/opt/ffmpeg/bin/ffmpeg".into()));
    assert!(fx.dir.path().join("out").is_dir());
}

#[tokio::test]
async fn test_default_format_and_saved_cookies() {
    let fx = Fixture::new();
    let mut bundle = CredentialBundle::new();
    bundle.insert("SESSDATA", "abc");
    fx.store().save(&bundle).unwrap();

    let engine = Arc::new(ScriptedEngine::default());
    let (_, result) = run(&fx.session(engine.clone()), fx.request(None), CancellationToken::new()).await;
    assert_eq!(result, Ok(()));

    let options = engine.seen_options.lock().unwrap().clone().unwrap();
    assert_eq!(options.format.as_deref(), Some(DEFAULT_FORMAT_SPEC));
    assert_eq!(options.cookie_file, Some(fx.store().netscape_path().to_path_buf()));
}

#[tokio::test]
async fn test_missing_ffmpeg_is_rewritten() {
    let fx = Fixture::new();
    let engine = Arc::new(ScriptedEngine {
        steps: vec![EngineProgress::downloading(40.0, Some(100.0))],
        result: Some(Err(EngineError::Failed(
            "ERROR: You have requested merging of multiple formats but ffmpeg is not installed"
                .to_string(),
        ))),
        ..Default::default()
    });

    let (events, result) = run(&fx.session(engine), fx.request(None), CancellationToken::new()).await;
    assert_eq!(result, Err(DownloadError::MergerMissing));
    assert_eq!(
        progress_of(&events).last(),
        Some(&at(40.0, DownloadPhase::Failed(DownloadError::MergerMissing)))
    );
}

#[tokio::test]
async fn test_other_failures_pass_through() {
    let fx = Fixture::new();
    let engine = Arc::new(ScriptedEngine {
        result: Some(Err(EngineError::Failed("HTTP Error 403: Forbidden".to_string()))),
        ..Default::default()
    });

    let (events, result) = run(&fx.session(engine), fx.request(None), CancellationToken::new()).await;
    let expected = DownloadError::Failed("HTTP Error 403: Forbidden".to_string());
    assert_eq!(result, Err(expected.clone()));
    assert_eq!(
        progress_of(&events),
        vec![at(0.0, DownloadPhase::Failed(expected))]
    );
}

#[tokio::test]
async fn test_cancel_between_reports() {
    let fx = Fixture::new();
    let cancel = CancellationToken::new();
    let engine = Arc::new(ScriptedEngine {
        steps: vec![
            EngineProgress::downloading(10.0, Some(100.0)),
            EngineProgress::downloading(20.0, Some(100.0)),
            EngineProgress::downloading(30.0, Some(100.0)),
        ],
        cancel_after: Some((0, cancel.clone())),
        ..Default::default()
    });

    let (events, result) = run(&fx.session(engine.clone()), fx.request(None), cancel).await;

    assert_eq!(result, Err(DownloadError::Cancelled));
    assert_eq!(*engine.hook_calls.lock().unwrap(), 2);
    assert_eq!(
        progress_of(&events),
        vec![
            at(10.0, DownloadPhase::Downloading),
            at(10.0, DownloadPhase::Failed(DownloadError::Cancelled)),
        ]
    );
    assert!(matches!(events.last(), Some(DownloadEvent::Progress(_))));
}

#[tokio::test]
async fn test_cancel_wins_over_engine_success() {
    let fx = Fixture::new();
    let cancel = CancellationToken::new();
    let engine = Arc::new(ScriptedEngine {
        steps: vec![
            EngineProgress::downloading(10.0, Some(100.0)),
            EngineProgress::downloading(20.0, Some(100.0)),
            EngineProgress::finished(),
        ],
        cancel_after: Some((0, cancel.clone())),
        ignore_abort: true,
        ..Default::default()
    });

    let (events, result) = run(&fx.session(engine), fx.request(None), cancel).await;

    assert_eq!(result, Err(DownloadError::Cancelled));
    let failed: Vec<_> = progress_of(&events)
        .into_iter()
        .filter(|p| p.phase.is_terminal())
        .collect();
    assert_eq!(failed, vec![at(10.0, DownloadPhase::Failed(DownloadError::Cancelled))]);
}

#[tokio::test]
async fn test_spawned_download_streams_events() {
    let fx = Fixture::new();
    let engine = Arc::new(ScriptedEngine {
        steps: vec![
            EngineProgress::downloading(1.0, Some(4.0)),
            EngineProgress::finished(),
        ],
        ..Default::default()
    });

    let mut handle = fx.session(engine).start(fx.request(Some("100024")));
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    assert_eq!(handle.join().await, Ok(()));
    assert_eq!(
        progress_of(&events),
        vec![
            at(25.0, DownloadPhase::Downloading),
            at(99.0, DownloadPhase::Merging),
            at(100.0, DownloadPhase::Done),
        ]
    );
}

#[tokio::test]
async fn test_dropping_handle_aborts_download() {
    let fx = Fixture::new();
    let gate = Arc::new(Notify::new());
    let engine = Arc::new(ScriptedEngine {
        steps: vec![
            EngineProgress::downloading(10.0, Some(100.0)),
            EngineProgress::downloading(20.0, Some(100.0)),
            EngineProgress::downloading(30.0, Some(100.0)),
        ],
        gate: Some(gate.clone()),
        ..Default::default()
    });

    let mut handle = fx.session(engine.clone()).start(fx.request(None));
    loop {
        match handle.next_event().await {
            Some(DownloadEvent::Progress(_)) => break,
            Some(DownloadEvent::Status(_)) => continue,
            None => panic!("download ended before reporting progress"),
        }
    }
    drop(handle);
    gate.notify_one();

    tokio::time::timeout(std::time::Duration::from_secs(5), engine.done.notified())
        .await
        .expect("engine never finished");
    assert!(matches!(
        *engine.outcome.lock().unwrap(),
        Some(Err(EngineError::Cancelled))
    ));
    assert_eq!(*engine.hook_calls.lock().unwrap(), 2);
}
