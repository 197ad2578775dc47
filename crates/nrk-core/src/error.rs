//! Error types for the neuron model and spatial transforms.
//!
//! Every variant here is a caller or data validation error. They are
//! raised immediately and are never subject to a batch error policy.

use thiserror::Error;

/// Main error type for nrk-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Array or tensor with the wrong number of rows or columns.
    #[error("Shape error: {0}")]
    ShapeError(String),

    /// Labeled point table without one or more of the x/y/z columns.
    #[error("Missing columns: point table must have x/y/z columns, missing {missing:?}")]
    MissingColumns { missing: Vec<String> },

    /// Landmarks that do not determine a thin-plate spline.
    #[error("Degenerate landmarks: {0}")]
    DegenerateLandmarks(String),

    /// A point cloud with no points.
    #[error("Empty point cloud: {0}")]
    EmptyPointCloud(String),

    /// Parameter outside its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for nrk-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a shape error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeError(msg.into())
    }

    /// Create a degenerate landmarks error.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateLandmarks(msg.into())
    }

    /// Create an empty point cloud error.
    pub fn empty(msg: impl Into<String>) -> Self {
        Self::EmptyPointCloud(msg.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}
