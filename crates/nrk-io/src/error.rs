//! Error types for NRRD I/O and batch import.

use std::path::PathBuf;

use nrk_core::CoreError;
use thiserror::Error;

/// Main error type for nrk-io operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// Caller passed an option outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A single file could not be converted under the `raise` error policy.
    #[error("Error converting file {} to neuron", file.display())]
    ImportError {
        file: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The NRRD codec could not read or write a file.
    #[error("Codec error: {0:#}")]
    Codec(anyhow::Error),

    /// Filesystem failure outside the codec (directory scans).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker pool could not be created.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Model construction rejected its inputs.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for nrk-io operations.
pub type Result<T> = std::result::Result<T, IoError>;

impl IoError {
    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Wrap a per-file failure.
    pub fn import(file: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::ImportError {
            file: file.into(),
            source,
        }
    }
}
