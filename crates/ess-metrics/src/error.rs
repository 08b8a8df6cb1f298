use ess_storage::StorageError;

/// Errors produced while collecting or submitting usage statistics.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The server could not answer a statistics query.
    #[error("collection failed: {0}")]
    Collection(String),

    /// A storage-backed count failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The sink rejected or could not deliver a report.
    #[error("sink error: {0}")]
    Sink(String),

    /// Serialization failure while rendering a report.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Metrics configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The server owner opted out of statistics.
    #[error("metrics are opted out")]
    OptedOut,
}

/// Result alias for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;
