use thiserror::Error;

/// Contract violations surfaced to the caller. Per-repository failures never
/// end up here; they live in the result map.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a bulk operation is already running")]
    AlreadyRunning,
    #[error("no bulk operation is running")]
    NotRunning,
    #[error("abort was already requested for this run")]
    AlreadyAborted,
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("failed to spawn scheduler thread")]
    SchedulerSpawn(#[source] std::io::Error),
    #[error("scheduler thread panicked")]
    SchedulerPanicked,
}
