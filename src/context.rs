use crate::config::AppConfig;
use crate::core::ProgressTracker;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppContext {
    pub config: std::sync::Arc<AppConfig>,
    pub progress: ProgressTracker,
    /// Cancelling stops new transfers from being admitted.
    pub cancel: CancellationToken,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: std::sync::Arc::new(config),
            progress: ProgressTracker::new(),
            cancel: CancellationToken::new(),
        }
    }
}
