use std::fmt::Debug;
use thiserror::Error;

use crate::bounds::Bounds;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum QuadTreeError {
    /// The requested region does not intersect the dataset extent.
    #[error("Requested region {bounds} does not overlap any chunk")]
    NoOverlap { bounds: Bounds },

    /// Inverted, degenerate or non-finite range.
    #[error("Malformed bounds: {0}")]
    MalformedBounds(String),

    /// Sizes that cannot produce a usable point budget.
    #[error("Infeasible point budget: {0}")]
    BudgetInfeasible(String),

    /// Coordinate union join could not reconcile the inputs.
    #[error("Merge failure: {0}")]
    MergeFailure(String),

    /// A split or selection left a spatial axis without samples.
    #[error("Empty grid: {0}")]
    EmptyGrid(String),

    /// Misuse of a grid accessor.
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// The merge scan collected more chunks than allowed.
    #[error("Query exceeded the limit of {limit} visited chunks")]
    QueryLimitExceeded { limit: usize },

    #[error("Export error: {0}")]
    Export(String),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "toml")]
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, QuadTreeError>;
