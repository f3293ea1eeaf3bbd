use std::fmt;
use std::ops::Range;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bounds::Bounds;
use crate::budget::stride_for;
use crate::config::BoundsMode;
use crate::error::{QuadTreeError, Result};
use crate::grid::{Axis, GridAccessor, IndexRange};

/// Handle of a chunk inside its [`QuadTree`](crate::QuadTree).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub(crate) usize);

impl ChunkId {
    pub const ROOT: ChunkId = ChunkId(0);

    /// Position in breadth-first order.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of a child inside its parent. North is the upper half of the
/// latitude index range, west the lower half of the longitude index range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    /// Child order of every split.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    /// Local `(lat, lon)` index ranges of this quadrant, split at the
    /// midpoint index of each axis.
    pub fn index_ranges(&self, lat_len: usize, lon_len: usize) -> (Range<usize>, Range<usize>) {
        let lat_mid = lat_len / 2;
        let lon_mid = lon_len / 2;
        match self {
            Quadrant::NorthWest => (lat_mid..lat_len, 0..lon_mid),
            Quadrant::NorthEast => (lat_mid..lat_len, lon_mid..lon_len),
            Quadrant::SouthWest => (0..lat_mid, 0..lon_mid),
            Quadrant::SouthEast => (0..lat_mid, lon_mid..lon_len),
        }
    }
}

/// One node of the quad-tree: a downsampled view of its spatial extent.
#[derive(Clone, Debug)]
pub struct Chunk<G> {
    pub(crate) id: ChunkId,
    pub(crate) parent: Option<ChunkId>,
    pub(crate) quadrant: Option<Quadrant>,
    pub(crate) depth: u32,
    pub(crate) max_depth: u32,
    pub(crate) grid: G,
    pub(crate) bounds: Bounds,
    pub(crate) resolution: f64,
    pub(crate) stride: usize,
    pub(crate) lat_range: Range<usize>,
    pub(crate) lon_range: Range<usize>,
    pub(crate) children: Option<[ChunkId; 4]>,
}

impl<G> Chunk<G> {
    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn parent(&self) -> Option<ChunkId> {
        self.parent
    }

    /// `None` for the root.
    pub fn quadrant(&self) -> Option<Quadrant> {
        self.quadrant
    }

    /// Layer of this chunk; the root is at depth 1.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The stored, downsampled grid.
    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Stored points over full-resolution points of the same extent.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Latitude indices covered, in full-resolution dataset index space.
    pub fn lat_range(&self) -> Range<usize> {
        self.lat_range.clone()
    }

    /// Longitude indices covered, in full-resolution dataset index space.
    pub fn lon_range(&self) -> Range<usize> {
        self.lon_range.clone()
    }

    /// Either empty or the four children in [`Quadrant::ALL`] order.
    pub fn children(&self) -> &[ChunkId] {
        match &self.children {
            Some(children) => &children[..],
            None => &[],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Settings shared by every node of one build.
pub(crate) struct BuildContext {
    pub(crate) max_depth: u32,
    pub(crate) point_budget: f64,
    pub(crate) parallel: bool,
    pub(crate) bounds_mode: BoundsMode,
}

/// A chunk together with its children, before arena ids are assigned.
pub(crate) struct Branch<G> {
    pub(crate) chunk: Chunk<G>,
    pub(crate) children: Option<Box<[Branch<G>; 4]>>,
}

/// Full-resolution input of one node.
pub(crate) struct NodeSpec<G> {
    pub(crate) grid: G,
    pub(crate) depth: u32,
    pub(crate) quadrant: Option<Quadrant>,
    pub(crate) lat_range: Range<usize>,
    pub(crate) lon_range: Range<usize>,
}

impl<G: GridAccessor> NodeSpec<G> {
    pub(crate) fn root(grid: G) -> Self {
        let lat_range = 0..grid.axis_len(Axis::Lat);
        let lon_range = 0..grid.axis_len(Axis::Lon);
        Self {
            grid,
            depth: 1,
            quadrant: None,
            lat_range,
            lon_range,
        }
    }

    fn child(&self, quadrant: Quadrant) -> Result<Self> {
        let (lat, lon) =
            quadrant.index_ranges(self.grid.axis_len(Axis::Lat), self.grid.axis_len(Axis::Lon));
        let grid = self
            .grid
            .select_by_index_range(Axis::Lat, IndexRange::new(lat.start, lat.end))?
            .select_by_index_range(Axis::Lon, IndexRange::new(lon.start, lon.end))?;
        Ok(Self {
            grid,
            depth: self.depth + 1,
            quadrant: Some(quadrant),
            lat_range: self.lat_range.start + lat.start..self.lat_range.start + lat.end,
            lon_range: self.lon_range.start + lon.start..self.lon_range.start + lon.end,
        })
    }

    /// Builds this node and, above the bottom layer, its four children.
    /// Children are built before the node downsamples its own grid.
    pub(crate) fn build(self, ctx: &BuildContext) -> Result<Branch<G>> {
        let lat_len = self.grid.axis_len(Axis::Lat);
        let lon_len = self.grid.axis_len(Axis::Lon);
        if self.grid.total_point_count() == 0 {
            return Err(QuadTreeError::EmptyGrid(format!(
                "chunk at depth {} has a {lat_len}x{lon_len} grid",
                self.depth
            )));
        }

        let children = if self.depth < ctx.max_depth {
            if lat_len < 2 || lon_len < 2 {
                return Err(QuadTreeError::EmptyGrid(format!(
                    "cannot split a {lat_len}x{lon_len} grid at depth {} of {}",
                    self.depth, ctx.max_depth
                )));
            }
            let [nw, ne, sw, se] = Quadrant::ALL.map(|quadrant| self.child(quadrant));
            let (nw, ne, sw, se) = (nw?, ne?, sw?, se?);
            let ((nw, ne), (sw, se)) = if ctx.parallel {
                rayon::join(
                    || rayon::join(|| nw.build(ctx), || ne.build(ctx)),
                    || rayon::join(|| sw.build(ctx), || se.build(ctx)),
                )
            } else {
                ((nw.build(ctx), ne.build(ctx)), (sw.build(ctx), se.build(ctx)))
            };
            Some(Box::new([nw?, ne?, sw?, se?]))
        } else {
            None
        };

        let stride = stride_for(lon_len, lat_len, ctx.point_budget);
        let downsampled = self
            .grid
            .select_by_index_range(Axis::Lat, IndexRange::full(lat_len).with_step(stride))?
            .select_by_index_range(Axis::Lon, IndexRange::full(lon_len).with_step(stride))?;
        let resolution =
            downsampled.total_point_count() as f64 / self.grid.total_point_count() as f64;
        let bounds = match ctx.bounds_mode {
            BoundsMode::Downsampled => Bounds::of(&downsampled)?,
            BoundsMode::FullResolution => Bounds::of(&self.grid)?,
        };
        log::trace!(
            "built chunk at depth {} (lat {:?}, lon {:?}) with stride {stride}, resolution {resolution:.4}",
            self.depth,
            self.lat_range,
            self.lon_range,
        );

        Ok(Branch {
            chunk: Chunk {
                id: ChunkId::ROOT,
                parent: None,
                quadrant: self.quadrant,
                depth: self.depth,
                max_depth: ctx.max_depth,
                grid: downsampled,
                bounds,
                resolution,
                stride,
                lat_range: self.lat_range,
                lon_range: self.lon_range,
                children: None,
            },
            children,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::labeled::LabeledGrid;
    use ndarray::Array2;

    fn sample(rows: usize, cols: usize) -> LabeledGrid<f64> {
        let data = Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64);
        let lat = (0..rows).map(|r| r as f64).collect();
        let lon = (0..cols).map(|c| c as f64).collect();
        LabeledGrid::from_2d(data, lat, lon).unwrap()
    }

    fn context(max_depth: u32, point_budget: f64) -> BuildContext {
        BuildContext {
            max_depth,
            point_budget,
            parallel: false,
            bounds_mode: BoundsMode::Downsampled,
        }
    }

    #[test]
    fn quadrant_ranges_partition_odd_axes() {
        let mut hits = [[0; 7]; 5];
        for quadrant in Quadrant::ALL {
            let (lat, lon) = quadrant.index_ranges(5, 7);
            for r in lat.clone() {
                for c in lon.clone() {
                    hits[r][c] += 1;
                }
            }
        }
        assert!(hits.iter().flatten().all(|&hits| hits == 1));
        assert_eq!(Quadrant::NorthWest.index_ranges(5, 7), (2..5, 0..3));
        assert_eq!(Quadrant::SouthEast.index_ranges(5, 7), (0..2, 3..7));
    }

    #[test]
    fn quadrant_primitive_round_trip() {
        assert_eq!(Quadrant::try_from(2u8).unwrap(), Quadrant::SouthWest);
        assert_eq!(u8::from(Quadrant::NorthEast), 1);
        assert!(Quadrant::try_from(4u8).is_err());
    }

    #[test]
    fn leaf_keeps_full_resolution_within_budget() {
        let branch = NodeSpec::root(sample(4, 4)).build(&context(1, 16.0)).unwrap();
        assert!(branch.children.is_none());
        assert_eq!(branch.chunk.stride, 1);
        assert_eq!(branch.chunk.resolution, 1.0);
        assert_eq!(branch.chunk.bounds, Bounds::new((0.0, 3.0), (0.0, 3.0)));
    }

    #[test]
    fn root_is_downsampled_and_split() {
        let branch = NodeSpec::root(sample(8, 8)).build(&context(2, 16.0)).unwrap();
        assert_eq!(branch.chunk.stride, 2);
        assert_eq!(branch.chunk.resolution, 0.25);
        // Stride 2 drops the last row and column.
        assert_eq!(branch.chunk.bounds, Bounds::new((0.0, 6.0), (0.0, 6.0)));

        let children = branch.children.unwrap();
        let nw = &children[0].chunk;
        assert_eq!(nw.quadrant, Some(Quadrant::NorthWest));
        assert_eq!((nw.lat_range.clone(), nw.lon_range.clone()), (4..8, 0..4));
        assert_eq!(nw.bounds, Bounds::new((4.0, 7.0), (0.0, 3.0)));
        let se = &children[3].chunk;
        assert_eq!((se.lat_range.clone(), se.lon_range.clone()), (0..4, 4..8));
        for child in children.iter() {
            assert_eq!(child.chunk.depth, 2);
            assert_eq!(child.chunk.stride, 1);
            assert!(child.children.is_none());
        }
    }

    #[test]
    fn full_resolution_bounds_mode() {
        let mut ctx = context(1, 16.0);
        ctx.bounds_mode = BoundsMode::FullResolution;
        let branch = NodeSpec::root(sample(8, 8)).build(&ctx).unwrap();
        assert_eq!(branch.chunk.stride, 2);
        assert_eq!(branch.chunk.bounds, Bounds::new((0.0, 7.0), (0.0, 7.0)));
    }

    #[test]
    fn splitting_a_single_row_fails() {
        let err = NodeSpec::root(sample(1, 8)).build(&context(2, 4.0)).err().unwrap();
        assert!(matches!(err, QuadTreeError::EmptyGrid(_)));
    }

    #[test]
    fn parallel_build_matches_sequential() {
        let mut ctx = context(3, 10.0);
        let sequential = NodeSpec::root(sample(16, 12)).build(&ctx).unwrap();
        ctx.parallel = true;
        let parallel = NodeSpec::root(sample(16, 12)).build(&ctx).unwrap();

        let flatten = |branch: &Branch<LabeledGrid<f64>>| {
            let mut out = Vec::new();
            let mut stack = vec![branch];
            while let Some(b) = stack.pop() {
                out.push((b.chunk.lat_range.clone(), b.chunk.lon_range.clone(), b.chunk.stride));
                if let Some(children) = &b.children {
                    stack.extend(children.iter());
                }
            }
            out
        };
        assert_eq!(flatten(&sequential), flatten(&parallel));
    }
}
