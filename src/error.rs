//! Error handling and types

use compio_sync::SemaphoreError;
use thiserror::Error;

/// Pipeline setup and stage errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Standard I/O error from the source or sink
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Semaphore could not be created
    #[error("Semaphore error: {0}")]
    Semaphore(#[from] SemaphoreError),

    /// A stage task panicked or could not be joined
    #[error("{stage} stage failed")]
    StageFailed {
        /// Name of the failing stage
        stage: &'static str,
    },

    /// The other end of an inter-stage buffer was dropped mid-stream
    #[error("Peer stage went away before the end of the stream")]
    Disconnected,

    /// The line sink rejected output
    #[error("Sink error: {0}")]
    Sink(String),
}

/// Result alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
