use serde::{Deserialize, Serialize};

/// Which coordinates a chunk's bounds are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundsMode {
    /// First and last coordinate of the downsampled grid. With a stride that
    /// does not divide the axis length the far edge moves inward.
    #[default]
    Downsampled,
    /// First and last coordinate of the chunk's full-resolution extent.
    FullResolution,
}

/// Build and query settings for a [`QuadTree`](crate::QuadTree).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Size of the full dataset, in the same unit as `max_chunk_size`.
    pub original_file_size: f64,
    /// Target size of a bottom-layer chunk.
    pub max_chunk_size: f64,
    /// Build the four children of every split in parallel.
    pub parallel: bool,
    pub bounds_mode: BoundsMode,
    /// Maximum number of overlapping chunks a merge scan may collect.
    pub merge_visit_limit: Option<usize>,
}

impl TreeConfig {
    pub fn new(original_file_size: f64, max_chunk_size: f64) -> Self {
        Self {
            original_file_size,
            max_chunk_size,
            ..Default::default()
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_bounds_mode(mut self, bounds_mode: BoundsMode) -> Self {
        self.bounds_mode = bounds_mode;
        self
    }

    pub fn with_merge_visit_limit(mut self, limit: usize) -> Self {
        self.merge_visit_limit = Some(limit);
        self
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(s: &str) -> crate::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            original_file_size: 1.0,
            max_chunk_size: 1.0,
            parallel: true,
            bounds_mode: BoundsMode::Downsampled,
            merge_visit_limit: None,
        }
    }
}
