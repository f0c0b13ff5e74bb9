// Media engine trait definition

use async_trait::async_trait;

use super::errors::EngineError;
use super::models::{EngineInfo, EngineOptions, EngineProgress, HookAction};

/// Progress hook registered with the engine for one download.
///
/// Called for every progress report, in engine order. Returning
/// `HookAction::Abort` asks the engine to stop the transfer and fail with
/// `EngineError::Cancelled`.
pub type ProgressHook<'a> = dyn FnMut(EngineProgress) -> HookAction + Send + 'a;

/// External extraction/download engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Name of the engine (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a URL into metadata and its format list, without downloading
    async fn extract_info(&self, url: &str, options: &EngineOptions)
        -> Result<EngineInfo, EngineError>;

    /// Download a URL, reporting progress through `hook`
    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        hook: &mut ProgressHook<'_>,
    ) -> Result<(), EngineError>;
}
