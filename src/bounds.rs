use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuadTreeError, Result};
use crate::grid::{Axis, GridAccessor};

/// Two intervals `[start1, end1]` and `[start2, end2]` overlap with positive
/// length. Intervals that only touch at an endpoint do not overlap.
pub fn strict_overlap(start1: f64, end1: f64, start2: f64, end2: f64) -> bool {
    end1 > start2 && end2 > start1
}

/// Closed interval `[min, max]` along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Orders two endpoints, so a descending coordinate axis still yields
    /// `min <= max`.
    pub fn from_endpoints(first: f64, last: f64) -> Self {
        if first <= last {
            Self::new(first, last)
        } else {
            Self::new(last, first)
        }
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        strict_overlap(self.min, self.max, other.min, other.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    fn validate(&self, axis: Axis) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(QuadTreeError::MalformedBounds(format!(
                "{axis} range [{}, {}] is not finite",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(QuadTreeError::MalformedBounds(format!(
                "{axis} range [{}, {}] is inverted",
                self.min, self.max
            )));
        }
        if self.min == self.max {
            return Err(QuadTreeError::MalformedBounds(format!(
                "{axis} range [{}, {}] is degenerate",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Spatial extent as `(lat, lon)` intervals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lat: Interval,
    pub lon: Interval,
}

impl Bounds {
    pub fn new(lat: (f64, f64), lon: (f64, f64)) -> Self {
        Self {
            lat: Interval::new(lat.0, lat.1),
            lon: Interval::new(lon.0, lon.1),
        }
    }

    /// Bounds of a grid from the first and last coordinate of each spatial
    /// axis.
    pub fn of<G: GridAccessor>(grid: &G) -> Result<Self> {
        Ok(Self {
            lat: axis_interval(grid, Axis::Lat)?,
            lon: axis_interval(grid, Axis::Lon)?,
        })
    }

    /// Both axes overlap strictly.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.lat.overlaps(&other.lat) && self.lon.overlaps(&other.lon)
    }

    /// Rejects query boxes that are non-finite, inverted or degenerate.
    pub fn validate(&self) -> Result<()> {
        self.lat.validate(Axis::Lat)?;
        self.lon.validate(Axis::Lon)
    }

    pub fn interval(&self, axis: Axis) -> Interval {
        match axis {
            Axis::Lat => self.lat,
            Axis::Lon => self.lon,
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lat {}, lon {})", self.lat, self.lon)
    }
}

fn axis_interval<G: GridAccessor>(grid: &G, axis: Axis) -> Result<Interval> {
    let len = grid.axis_len(axis);
    let missing = || QuadTreeError::EmptyGrid(format!("{axis} axis has no coordinates"));
    if len == 0 {
        return Err(missing());
    }
    let first = grid.coordinate_at(axis, 0).ok_or_else(missing)?;
    let last = grid.coordinate_at(axis, len - 1).ok_or_else(missing)?;
    Ok(Interval::from_endpoints(first, last))
}
