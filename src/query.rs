//! Region queries over a built [`QuadTree`].
//!
//! All queries use strict overlap on both axes: a chunk whose bounds merely
//! touch the requested box is not a candidate.

use crate::bounds::Bounds;
use crate::chunk::ChunkId;
use crate::error::{QuadTreeError, Result};
use crate::grid::{Axis, GridAccessor};
use crate::tree::QuadTree;

/// Grid of a single chunk returned by a query.
#[derive(Clone, Debug)]
pub struct ChunkSelection<G> {
    pub grid: G,
    pub bounds: Bounds,
    pub chunk: ChunkId,
}

/// Combined grid of several same-depth chunks.
#[derive(Clone, Debug)]
pub struct MergedSelection<G> {
    pub grid: G,
    pub bounds: Bounds,
    pub depth: u32,
    pub chunks: Vec<ChunkId>,
}

/// Chunks a merge strategy decided to combine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergePlan {
    pub depth: u32,
    pub chunks: Vec<ChunkId>,
}

/// Chooses which same-depth chunks a merged query combines.
pub trait MergeStrategy {
    /// `bounds` is validated and overlaps the root.
    fn plan<G>(&self, tree: &QuadTree<G>, bounds: &Bounds) -> Result<MergePlan>;
}

/// Breadth-first scan that stops once four overlapping chunks share the
/// deepest depth reached, stepping back one depth if that depth collected more
/// than four.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaturatingScan {
    /// Maximum number of overlapping chunks the scan may collect.
    pub visit_limit: Option<usize>,
}

const SATURATION: usize = 4;

impl MergeStrategy for SaturatingScan {
    fn plan<G>(&self, tree: &QuadTree<G>, bounds: &Bounds) -> Result<MergePlan> {
        let root = tree.root();
        let mut visited = vec![(root.id(), root.depth())];
        // Breadth-first order visits depths in ascending order, so only the
        // deepest depth reached needs a count.
        let mut deepest = root.depth();
        let mut deepest_count = 1;

        let mut next = 0;
        loop {
            let (id, _) = visited[next];
            for child in tree.children(id) {
                if child.bounds().overlaps(bounds) {
                    visited.push((child.id(), child.depth()));
                    if child.depth() == deepest {
                        deepest_count += 1;
                    } else {
                        deepest = child.depth();
                        deepest_count = 1;
                    }
                    if let Some(limit) = self.visit_limit {
                        if visited.len() > limit {
                            return Err(QuadTreeError::QueryLimitExceeded { limit });
                        }
                    }
                }
            }

            if deepest_count >= SATURATION {
                break;
            }
            next += 1;
            if next == visited.len() {
                break;
            }
        }

        let depth = if deepest_count > SATURATION {
            (deepest - 1).max(root.depth())
        } else {
            deepest
        };
        let chunks = visited
            .iter()
            .filter(|(_, d)| *d == depth)
            .map(|(id, _)| *id)
            .collect();
        Ok(MergePlan { depth, chunks })
    }
}

/// Deepest layer whose overlapping chunks number at most `max_chunks`. The
/// scan stops at the first layer over that count; the root is the fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkBudget {
    pub max_chunks: usize,
}

impl MergeStrategy for ChunkBudget {
    fn plan<G>(&self, tree: &QuadTree<G>, bounds: &Bounds) -> Result<MergePlan> {
        let root = tree.root();
        let mut best = MergePlan {
            depth: root.depth(),
            chunks: vec![root.id()],
        };
        let mut layer = best.chunks.clone();
        loop {
            let deeper: Vec<ChunkId> = layer
                .iter()
                .flat_map(|id| tree.children(*id))
                .filter(|child| child.bounds().overlaps(bounds))
                .map(|child| child.id())
                .collect();
            if deeper.is_empty() || deeper.len() > self.max_chunks {
                break;
            }
            best = MergePlan {
                depth: tree.chunk(deeper[0]).depth(),
                chunks: deeper.clone(),
            };
            layer = deeper;
        }
        Ok(best)
    }
}

impl<G: GridAccessor> QuadTree<G> {
    /// Descends from the root while exactly one child overlaps `bounds` and
    /// returns the chunk where descent stops. Zero or several overlapping
    /// children end the descent, preferring a coarser but unambiguous chunk.
    ///
    /// With `trim` the grid is cut to the requested coordinate range and the
    /// returned bounds are those of the trimmed grid. A range that falls
    /// between the chunk's stored coordinates yields a grid with an empty
    /// spatial axis, reported with the requested bounds.
    pub fn query_unique(&self, bounds: &Bounds, trim: bool) -> Result<ChunkSelection<G>> {
        self.check_query(bounds)?;

        let mut current = self.root();
        loop {
            let mut overlapping = self
                .children(current.id())
                .filter(|child| child.bounds().overlaps(bounds));
            match (overlapping.next(), overlapping.next()) {
                (Some(only), None) => current = only,
                _ => break,
            }
            log::trace!("descending into chunk {} at depth {}", current.id(), current.depth());
        }
        log::debug!("query {bounds} resolved to chunk {} at depth {}", current.id(), current.depth());

        if trim {
            let grid = trim_to(current.grid(), bounds)?;
            Ok(ChunkSelection {
                bounds: selection_bounds(&grid, bounds)?,
                grid,
                chunk: current.id(),
            })
        } else {
            Ok(ChunkSelection {
                grid: current.grid().clone(),
                bounds: *current.bounds(),
                chunk: current.id(),
            })
        }
    }

    /// Merges same-depth overlapping chunks picked by [`SaturatingScan`].
    /// Cells of the coordinate union that no chunk stores hold the grid's fill
    /// value. Trimming behaves as in [`QuadTree::query_unique`].
    pub fn query_merged(&self, bounds: &Bounds, trim: bool) -> Result<MergedSelection<G>> {
        let strategy = SaturatingScan {
            visit_limit: self.config().merge_visit_limit,
        };
        self.query_merged_with(&strategy, bounds, trim)
    }

    pub fn query_merged_with<S: MergeStrategy>(
        &self,
        strategy: &S,
        bounds: &Bounds,
        trim: bool,
    ) -> Result<MergedSelection<G>> {
        self.check_query(bounds)?;

        let plan = strategy.plan(self, bounds)?;
        log::debug!(
            "merging {} chunks at depth {} for query {bounds}",
            plan.chunks.len(),
            plan.depth
        );
        let grids: Vec<G> = plan
            .chunks
            .iter()
            .map(|id| self.chunk(*id).grid().clone())
            .collect();
        let mut grid = G::merge_by_coordinate_union(&grids)?;
        if trim {
            grid = trim_to(&grid, bounds)?;
        }

        Ok(MergedSelection {
            bounds: selection_bounds(&grid, bounds)?,
            grid,
            depth: plan.depth,
            chunks: plan.chunks,
        })
    }

    /// The root's coarse overview of the whole dataset.
    pub fn initial_view(&self) -> ChunkSelection<G> {
        let root = self.root();
        ChunkSelection {
            grid: root.grid().clone(),
            bounds: *root.bounds(),
            chunk: root.id(),
        }
    }

    fn check_query(&self, bounds: &Bounds) -> Result<()> {
        if let Err(err) = bounds.validate() {
            log::warn!("rejecting query: {err}");
            return Err(err);
        }
        if !self.root().bounds().overlaps(bounds) {
            log::warn!("rejecting query {bounds} outside {}", self.root().bounds());
            return Err(QuadTreeError::NoOverlap { bounds: *bounds });
        }
        Ok(())
    }
}

fn trim_to<G: GridAccessor>(grid: &G, bounds: &Bounds) -> Result<G> {
    grid.select_by_coordinate_range(Axis::Lat, bounds.lat.min, bounds.lat.max)?
        .select_by_coordinate_range(Axis::Lon, bounds.lon.min, bounds.lon.max)
}

/// Bounds of a query result; an empty selection keeps the requested bounds.
fn selection_bounds<G: GridAccessor>(grid: &G, requested: &Bounds) -> Result<Bounds> {
    if grid.axis_len(Axis::Lat) == 0 || grid.axis_len(Axis::Lon) == 0 {
        log::debug!("query {requested} selected no stored coordinates");
        return Ok(*requested);
    }
    Bounds::of(grid)
}
