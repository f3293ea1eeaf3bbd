//! Multi-resolution quad-tree index over latitude/longitude grids.
//!
//! [`QuadTree::build`] recursively splits a dataset into quadrants and keeps
//! a downsampled copy of every quadrant, so a region query can be answered
//! from the shallowest layer that covers it at a useful resolution.

mod affine;
mod bounds;
mod budget;
mod chunk;
mod config;
pub mod error;
mod export;
mod geo_key_directory;
mod grid;
mod labeled;
mod query;
mod tree;

pub use affine::AffineTransform;
pub use bounds::{strict_overlap, Bounds, Interval};
pub use budget::{num_layers, point_budget, stride_for};
pub use chunk::{Chunk, ChunkId, Quadrant};
pub use config::{BoundsMode, TreeConfig};
pub use error::{QuadTreeError, Result};
pub use export::{encode_geotiff, ChunkStore, DEFAULT_EPSG};
pub use geo_key_directory::{GeoKeyDirectory, GeoKeyTag};
pub use grid::{Axis, GridAccessor, IndexRange};
pub use labeled::{FillValue, LabeledGrid};
pub use query::{ChunkBudget, ChunkSelection, MergePlan, MergeStrategy, MergedSelection, SaturatingScan};
pub use tree::QuadTree;
