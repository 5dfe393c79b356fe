use thiserror::Error;

use crate::observer::ObserverError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Observer error: {0}")]
    Observer(#[from] ObserverError),
    #[error("Cycle task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Decision channel closed")]
    ChannelClosed,
    #[error("Scheduler already running")]
    AlreadyRunning,
}
