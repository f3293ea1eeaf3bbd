use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuadTreeError, Result};

/// Spatial axis of a gridded dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Lat,
    Lon,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Lat, Axis::Lon];

    /// Dimension names recognised for this axis.
    pub fn names(&self) -> &'static [&'static str] {
        match self {
            Axis::Lat => &["lat", "latitude"],
            Axis::Lon => &["lon", "longitude"],
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.names().contains(&name)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Lat => f.write_str("lat"),
            Axis::Lon => f.write_str("lon"),
        }
    }
}

/// Half-open index range `start..end` taking every `step`-th index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl IndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            step: 1,
        }
    }

    pub fn full(len: usize) -> Self {
        Self::new(0, len)
    }

    pub fn with_step(self, step: usize) -> Self {
        Self { step, ..self }
    }

    /// Number of indices selected.
    pub fn len(&self) -> usize {
        if self.end <= self.start || self.step == 0 {
            0
        } else {
            (self.end - self.start).div_ceil(self.step)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks the range against an axis of length `axis_len`.
    pub fn check(&self, axis_len: usize) -> Result<()> {
        if self.step == 0 {
            return Err(QuadTreeError::InvalidGrid("index step must be positive".into()));
        }
        if self.start > self.end || self.end > axis_len {
            return Err(QuadTreeError::InvalidGrid(format!(
                "index range {}..{} out of bounds for axis of length {axis_len}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Capability over a labeled grid with (at least) latitude and longitude
/// dimensions. The quad-tree only ever talks to data through this trait.
pub trait GridAccessor: Clone + Send + Sync + Sized {
    /// Dimension names and sizes, in storage order.
    fn dimension_sizes(&self) -> Vec<(String, usize)>;

    fn axis_len(&self, axis: Axis) -> usize;

    /// Coordinate value at `index` along a spatial axis.
    fn coordinate_at(&self, axis: Axis, index: usize) -> Option<f64>;

    fn select_by_index_range(&self, axis: Axis, range: IndexRange) -> Result<Self>;

    /// Inclusive selection of the samples whose coordinate lies in
    /// `[min, max]`.
    fn select_by_coordinate_range(&self, axis: Axis, min: f64, max: f64) -> Result<Self>;

    /// Product of all dimension sizes.
    fn total_point_count(&self) -> usize {
        self.dimension_sizes().iter().map(|(_, size)| size).product()
    }

    /// Outer join of views over the union of their coordinates. Cells no
    /// view covers hold a fill value. Conflicting values where views overlap
    /// are a `MergeFailure`.
    fn merge_by_coordinate_union(views: &[Self]) -> Result<Self>;
}
