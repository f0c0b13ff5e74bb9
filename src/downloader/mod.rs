// Downloader module - download session controller over an external engine

pub mod errors;
pub mod format_selector;
pub mod models;
pub mod session;
pub mod tools;
pub mod traits;
pub mod utils;

pub use errors::{AnalysisError, DownloadError, EngineError};
pub use format_selector::FormatSelector;
pub use models::{
    DownloadEvent, DownloadPhase, DownloadProgress, DownloadRequest, EngineFormat, EngineInfo,
    EngineOptions, EngineProgress, EngineStatus, FormatDescriptor, HookAction, VideoMetadata,
};
pub use session::{DownloadHandle, DownloadSession};
pub use traits::{MediaEngine, ProgressHook};
