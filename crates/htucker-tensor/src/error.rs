//! Error type of the hierarchical Tucker engine

use htucker_core::DimTreeError;
use thiserror::Error;

/// Errors raised by HT tensor construction and operations
///
/// A missed accuracy target is not an error: truncation reports it through
/// the `satisfied` flag of [`crate::RankChoice`] and [`crate::NodeTruncation`].
#[derive(Error, Debug)]
pub enum HtError {
    /// Bad input detected at a public entry point
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Operands or trees whose structure does not fit the requested operation
    #[error("Structural mismatch: {0}")]
    StructuralMismatch(String),

    #[error("Operation requires an orthogonal tensor")]
    NotOrthogonal,

    #[error("Linear algebra failure: {0}")]
    Linalg(String),

    #[error(transparent)]
    Tree(#[from] DimTreeError),

    #[error("Tensor kernel failed: {0}")]
    Kernel(#[from] anyhow::Error),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Result alias used throughout the crate
pub type HtResult<T> = Result<T, HtError>;
