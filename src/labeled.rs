//! An ndarray-backed [`GridAccessor`] over named dimensions.
//!
//! Data and coordinates live in reference-counted arrays, so index
//! selections share the parent's buffer instead of copying it.

use ndarray::{ArcArray, ArcArray1, Array1, Array2, ArrayD, Axis as ArrayAxis, IxDyn, Slice};

use crate::affine::AffineTransform;
use crate::error::{QuadTreeError, Result};
use crate::grid::{Axis, GridAccessor, IndexRange};

#[derive(Clone, Debug)]
struct Dimension {
    name: String,
    coords: ArcArray1<f64>,
}

/// Labeled n-dimensional grid with latitude and longitude dimensions plus any
/// number of extra dimensions (e.g. time) that are carried along untouched.
#[derive(Clone, Debug)]
pub struct LabeledGrid<A> {
    data: ArcArray<A, IxDyn>,
    dims: Vec<Dimension>,
    lat_axis: usize,
    lon_axis: usize,
}

impl<A: Clone> LabeledGrid<A> {
    /// Builds a grid from an array and one `(name, coordinates)` pair per
    /// array axis, in axis order.
    pub fn new(data: ArrayD<A>, dims: Vec<(String, Vec<f64>)>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(QuadTreeError::InvalidGrid(format!(
                "{} dimension labels for an array of {} axes",
                dims.len(),
                data.ndim()
            )));
        }
        for (i, (name, coords)) in dims.iter().enumerate() {
            if coords.len() != data.len_of(ArrayAxis(i)) {
                return Err(QuadTreeError::InvalidGrid(format!(
                    "dimension {name} has {} coordinates but {} samples",
                    coords.len(),
                    data.len_of(ArrayAxis(i))
                )));
            }
        }
        let find = |axis: Axis| {
            dims.iter()
                .position(|(name, _)| axis.matches(name))
                .ok_or_else(|| {
                    QuadTreeError::InvalidGrid(format!(
                        "no dimension named {}",
                        axis.names().join(" or ")
                    ))
                })
        };
        let lat_axis = find(Axis::Lat)?;
        let lon_axis = find(Axis::Lon)?;

        let dims = dims
            .into_iter()
            .map(|(name, coords)| Dimension {
                name,
                coords: Array1::from(coords).into_shared(),
            })
            .collect();
        Ok(Self {
            data: data.into_shared(),
            dims,
            lat_axis,
            lon_axis,
        })
    }

    /// Two-dimensional grid with rows along latitude and columns along
    /// longitude.
    pub fn from_2d(data: Array2<A>, lat: Vec<f64>, lon: Vec<f64>) -> Result<Self> {
        Self::new(
            data.into_dyn(),
            vec![("lat".to_string(), lat), ("lon".to_string(), lon)],
        )
    }

    /// Two-dimensional grid whose coordinates are the pixel centres of a
    /// north-up raster.
    pub fn from_affine(data: Array2<A>, transform: &AffineTransform) -> Result<Self> {
        let (rows, cols) = data.dim();
        let (lon, lat) = transform.pixel_centres(cols, rows)?;
        Self::from_2d(data, lat, lon)
    }

    pub fn data(&self) -> &ArcArray<A, IxDyn> {
        &self.data
    }

    pub fn coordinates(&self, axis: Axis) -> &ArcArray1<f64> {
        &self.dims[self.axis_index(axis)].coords
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dims.iter().map(|dim| dim.name.as_str())
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Array axis holding a spatial dimension.
    pub fn axis_index(&self, axis: Axis) -> usize {
        match axis {
            Axis::Lat => self.lat_axis,
            Axis::Lon => self.lon_axis,
        }
    }
}

/// Element types that can mark cells missing from a coordinate union.
pub trait FillValue: Clone {
    fn fill_value() -> Self;

    fn is_fill(&self) -> bool;
}

macro_rules! float_fill {
    ($($t:ty),*) => {$(
        impl FillValue for $t {
            fn fill_value() -> Self {
                <$t>::NAN
            }

            fn is_fill(&self) -> bool {
                self.is_nan()
            }
        }
    )*};
}

// netCDF default fill values.
macro_rules! int_fill {
    ($($t:ty => $fill:expr),*) => {$(
        impl FillValue for $t {
            fn fill_value() -> Self {
                $fill
            }

            fn is_fill(&self) -> bool {
                *self == $fill
            }
        }
    )*};
}

float_fill!(f32, f64);
int_fill!(
    i8 => -127,
    i16 => -32767,
    i32 => -2147483647,
    i64 => -9223372036854775806,
    u8 => u8::MAX,
    u16 => u16::MAX,
    u32 => u32::MAX,
    u64 => u64::MAX - 1
);

impl<A> GridAccessor for LabeledGrid<A>
where
    A: FillValue + PartialEq + Send + Sync,
{
    fn dimension_sizes(&self) -> Vec<(String, usize)> {
        self.dims
            .iter()
            .map(|dim| (dim.name.clone(), dim.coords.len()))
            .collect()
    }

    fn axis_len(&self, axis: Axis) -> usize {
        self.data.len_of(ArrayAxis(self.axis_index(axis)))
    }

    fn coordinate_at(&self, axis: Axis, index: usize) -> Option<f64> {
        self.coordinates(axis).get(index).copied()
    }

    fn select_by_index_range(&self, axis: Axis, range: IndexRange) -> Result<Self> {
        let ax = self.axis_index(axis);
        range.check(self.axis_len(axis))?;
        let slice = Slice::new(range.start as isize, Some(range.end as isize), range.step as isize);

        let mut out = self.clone();
        out.data.slice_axis_inplace(ArrayAxis(ax), slice);
        out.dims[ax].coords.slice_axis_inplace(ArrayAxis(0), slice);
        Ok(out)
    }

    fn select_by_coordinate_range(&self, axis: Axis, min: f64, max: f64) -> Result<Self> {
        let coords = self.coordinates(axis);
        let inside = |c: &f64| min <= *c && *c <= max;
        let range = match coords.iter().position(inside) {
            Some(start) => {
                let end = coords.iter().rposition(inside).unwrap_or(start) + 1;
                IndexRange::new(start, end)
            }
            None => IndexRange::new(0, 0),
        };
        self.select_by_index_range(axis, range)
    }

    fn total_point_count(&self) -> usize {
        self.data.len()
    }

    fn merge_by_coordinate_union(views: &[Self]) -> Result<Self> {
        let first = views
            .first()
            .ok_or_else(|| QuadTreeError::MergeFailure("no grids to merge".into()))?;
        if views.len() == 1 {
            return Ok(first.clone());
        }
        for view in &views[1..] {
            if !view.dimension_names().eq(first.dimension_names()) {
                return Err(QuadTreeError::MergeFailure(
                    "grids have different dimensions".into(),
                ));
            }
            for (i, dim) in first.dims.iter().enumerate() {
                if i != first.lat_axis && i != first.lon_axis && view.dims[i].coords != dim.coords {
                    return Err(QuadTreeError::MergeFailure(format!(
                        "coordinates of dimension {} differ between grids",
                        dim.name
                    )));
                }
            }
        }

        let lat = UnionAxis::new(views, first.lat_axis);
        let lon = UnionAxis::new(views, first.lon_axis);

        let mut dims = first.dims.clone();
        dims[first.lat_axis].coords = Array1::from(lat.coords.clone()).into_shared();
        dims[first.lon_axis].coords = Array1::from(lon.coords.clone()).into_shared();

        let shape: Vec<usize> = dims.iter().map(|dim| dim.coords.len()).collect();
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }

        let mut cells: Vec<Option<A>> = vec![None; shape.iter().product()];
        for view in views {
            // Output position of every local index, per axis.
            let positions: Vec<Vec<usize>> = (0..view.ndim())
                .map(|ax| {
                    let coords = &view.dims[ax].coords;
                    if ax == first.lat_axis {
                        lat.positions(coords)
                    } else if ax == first.lon_axis {
                        lon.positions(coords)
                    } else {
                        Ok((0..coords.len()).collect())
                    }
                })
                .collect::<Result<_>>()?;

            for (index, value) in view.data.indexed_iter() {
                let flat: usize = (0..view.ndim())
                    .map(|ax| positions[ax][index[ax]] * strides[ax])
                    .sum();
                if let Some(existing) = &cells[flat] {
                    if existing != value && !(existing.is_fill() && value.is_fill()) {
                        return Err(QuadTreeError::MergeFailure(format!(
                            "conflicting values at lat {}, lon {}",
                            lat.coords[positions[first.lat_axis][index[first.lat_axis]]],
                            lon.coords[positions[first.lon_axis][index[first.lon_axis]]],
                        )));
                    }
                    continue;
                }
                cells[flat] = Some(value.clone());
            }
        }

        let missing = cells.iter().filter(|cell| cell.is_none()).count();
        if missing > 0 {
            log::trace!("filling {missing} cells missing from the coordinate union");
        }
        let cells: Vec<A> = cells
            .into_iter()
            .map(|cell| cell.unwrap_or_else(A::fill_value))
            .collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), cells)
            .map_err(|err| QuadTreeError::MergeFailure(err.to_string()))?;

        Ok(Self {
            data: data.into_shared(),
            dims,
            lat_axis: first.lat_axis,
            lon_axis: first.lon_axis,
        })
    }
}

/// Sorted union of one spatial axis' coordinates across several grids.
struct UnionAxis {
    coords: Vec<f64>,
    descending: bool,
}

impl UnionAxis {
    fn new<A>(views: &[LabeledGrid<A>], ax: usize) -> Self {
        let descending = views
            .iter()
            .find_map(|view| {
                let coords = &view.dims[ax].coords;
                (coords.len() >= 2).then(|| coords[0] > coords[1])
            })
            .unwrap_or(false);

        let mut coords: Vec<f64> = views
            .iter()
            .flat_map(|view| view.dims[ax].coords.iter().copied())
            .collect();
        coords.sort_by(f64::total_cmp);
        coords.dedup();
        if descending {
            coords.reverse();
        }
        Self { coords, descending }
    }

    fn positions(&self, local: &ArcArray1<f64>) -> Result<Vec<usize>> {
        local
            .iter()
            .map(|value| {
                self.coords
                    .binary_search_by(|probe| {
                        if self.descending {
                            value.total_cmp(probe)
                        } else {
                            probe.total_cmp(value)
                        }
                    })
                    .map_err(|_| {
                        QuadTreeError::MergeFailure(format!(
                            "coordinate {value} runs against the merge direction"
                        ))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{array, Array3};

    fn sample(rows: usize, cols: usize) -> LabeledGrid<f64> {
        let data = Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f64);
        let lat = (0..rows).map(|r| r as f64).collect();
        let lon = (0..cols).map(|c| 100.0 + c as f64).collect();
        LabeledGrid::from_2d(data, lat, lon).unwrap()
    }

    #[test]
    fn rejects_missing_spatial_dimension() {
        let data = Array2::<f64>::zeros((2, 2)).into_dyn();
        let err = LabeledGrid::new(
            data,
            vec![("y".into(), vec![0.0, 1.0]), ("lon".into(), vec![0.0, 1.0])],
        )
        .unwrap_err();
        assert!(matches!(err, QuadTreeError::InvalidGrid(_)));
    }

    #[test]
    fn rejects_coordinate_mismatch() {
        let data = Array2::<f64>::zeros((2, 3));
        assert!(LabeledGrid::from_2d(data, vec![0.0, 1.0], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn long_dimension_names_are_recognised() {
        let data = Array2::<f64>::zeros((2, 3)).into_dyn();
        let grid = LabeledGrid::new(
            data,
            vec![
                ("longitude".into(), vec![0.0, 1.0]),
                ("latitude".into(), vec![0.0, 1.0, 2.0]),
            ],
        )
        .unwrap();
        assert_eq!(grid.axis_len(Axis::Lat), 3);
        assert_eq!(grid.axis_len(Axis::Lon), 2);
    }

    #[test]
    fn index_selection_with_step() {
        let grid = sample(8, 8);
        let view = grid
            .select_by_index_range(Axis::Lat, IndexRange::new(1, 8).with_step(3))
            .unwrap();
        assert_eq!(view.axis_len(Axis::Lat), 3);
        assert_eq!(view.coordinates(Axis::Lat).to_vec(), vec![1.0, 4.0, 7.0]);
        assert_eq!(view.data()[IxDyn(&[1, 2])], 34.0);
        assert_eq!(view.total_point_count(), 24);
    }

    #[test]
    fn index_selection_out_of_bounds() {
        let grid = sample(4, 4);
        assert!(grid
            .select_by_index_range(Axis::Lon, IndexRange::new(2, 5))
            .is_err());
    }

    #[test]
    fn coordinate_selection_is_inclusive() {
        let grid = sample(8, 8);
        let view = grid
            .select_by_coordinate_range(Axis::Lon, 102.0, 104.0)
            .unwrap();
        assert_eq!(view.coordinates(Axis::Lon).to_vec(), vec![102.0, 103.0, 104.0]);

        let empty = grid
            .select_by_coordinate_range(Axis::Lat, 2.2, 2.8)
            .unwrap();
        assert_eq!(empty.axis_len(Axis::Lat), 0);
    }

    #[test]
    fn merge_reassembles_quadrants() {
        let grid = sample(4, 6);
        let mut parts = Vec::new();
        for lat in [IndexRange::new(2, 4), IndexRange::new(0, 2)] {
            for lon in [IndexRange::new(0, 3), IndexRange::new(3, 6)] {
                let part = grid
                    .select_by_index_range(Axis::Lat, lat)
                    .and_then(|g| g.select_by_index_range(Axis::Lon, lon))
                    .unwrap();
                parts.push(part);
            }
        }
        let merged = LabeledGrid::merge_by_coordinate_union(&parts).unwrap();
        assert_eq!(merged.data(), grid.data());
        assert_eq!(merged.coordinates(Axis::Lat), grid.coordinates(Axis::Lat));
        assert_eq!(merged.coordinates(Axis::Lon), grid.coordinates(Axis::Lon));
    }

    #[test]
    fn merge_fills_cells_outside_every_grid() {
        let grid = sample(4, 4);
        let north_west = grid
            .select_by_index_range(Axis::Lat, IndexRange::new(2, 4))
            .and_then(|g| g.select_by_index_range(Axis::Lon, IndexRange::new(0, 2)))
            .unwrap();
        let south_east = grid
            .select_by_index_range(Axis::Lat, IndexRange::new(0, 2))
            .and_then(|g| g.select_by_index_range(Axis::Lon, IndexRange::new(2, 4)))
            .unwrap();
        let merged = LabeledGrid::merge_by_coordinate_union(&[north_west, south_east]).unwrap();
        assert_eq!(merged.coordinates(Axis::Lat), grid.coordinates(Axis::Lat));
        assert_eq!(merged.coordinates(Axis::Lon), grid.coordinates(Axis::Lon));
        for ((r, c), value) in grid.data().indexed_iter().map(|(i, v)| ((i[0], i[1]), *v)) {
            let merged_value = merged.data()[IxDyn(&[r, c])];
            if (r >= 2) == (c < 2) {
                assert_eq!(merged_value, value);
            } else {
                assert!(merged_value.is_nan(), "cell ({r}, {c})");
            }
        }
    }

    #[test]
    fn merge_of_misaligned_strides() {
        // Neighbours downsampled with strides 2 and 3 share no latitude.
        let grid = sample(6, 12);
        let west = grid
            .select_by_index_range(Axis::Lon, IndexRange::new(0, 6))
            .and_then(|g| g.select_by_index_range(Axis::Lat, IndexRange::full(6).with_step(2)))
            .and_then(|g| g.select_by_index_range(Axis::Lon, IndexRange::full(6).with_step(2)))
            .unwrap();
        let east = grid
            .select_by_index_range(Axis::Lon, IndexRange::new(6, 12))
            .and_then(|g| g.select_by_index_range(Axis::Lat, IndexRange::full(6).with_step(3)))
            .and_then(|g| g.select_by_index_range(Axis::Lon, IndexRange::full(6).with_step(3)))
            .unwrap();
        let merged = LabeledGrid::merge_by_coordinate_union(&[west, east]).unwrap();
        assert_eq!(
            merged.coordinates(Axis::Lat).to_vec(),
            vec![0.0, 2.0, 3.0, 4.0]
        );
        assert_eq!(
            merged.coordinates(Axis::Lon).to_vec(),
            vec![100.0, 102.0, 104.0, 106.0, 109.0]
        );
        // lat 2 only exists in the west grid, lat 3 only in the east one.
        assert_eq!(merged.data()[IxDyn(&[1, 0])], 24.0);
        assert!(merged.data()[IxDyn(&[1, 3])].is_nan());
        assert_eq!(merged.data()[IxDyn(&[2, 4])], 45.0);
        assert!(merged.data()[IxDyn(&[2, 0])].is_nan());
        assert_eq!(merged.data().iter().filter(|v| v.is_nan()).count(), 20 - 9 - 4);
    }

    #[test]
    fn integer_grids_use_netcdf_fill() {
        let a = LabeledGrid::from_2d(array![[1i32]], vec![0.0], vec![0.0]).unwrap();
        let b = LabeledGrid::from_2d(array![[2i32]], vec![1.0], vec![1.0]).unwrap();
        let merged = LabeledGrid::merge_by_coordinate_union(&[a, b]).unwrap();
        assert_eq!(
            merged.data().iter().copied().collect::<Vec<_>>(),
            vec![1, i32::fill_value(), i32::fill_value(), 2]
        );
        assert!(i32::fill_value().is_fill());
    }

    #[test]
    fn matching_fill_values_do_not_conflict() {
        let a = LabeledGrid::from_2d(array![[f64::NAN, 2.0]], vec![0.0], vec![0.0, 1.0]).unwrap();
        let b = LabeledGrid::from_2d(array![[f64::NAN]], vec![0.0], vec![0.0]).unwrap();
        let merged = LabeledGrid::merge_by_coordinate_union(&[a, b]).unwrap();
        assert!(merged.data()[IxDyn(&[0, 0])].is_nan());
        assert_eq!(merged.data()[IxDyn(&[0, 1])], 2.0);
    }

    #[test]
    fn merge_rejects_conflicting_values() {
        let a = LabeledGrid::from_2d(array![[1.0, 2.0]], vec![0.0], vec![0.0, 1.0]).unwrap();
        let b = LabeledGrid::from_2d(array![[9.0, 3.0]], vec![0.0], vec![1.0, 2.0]).unwrap();
        assert!(LabeledGrid::merge_by_coordinate_union(&[a.clone(), b]).is_err());

        let c = LabeledGrid::from_2d(array![[2.0, 3.0]], vec![0.0], vec![1.0, 2.0]).unwrap();
        let merged = LabeledGrid::merge_by_coordinate_union(&[a, c]).unwrap();
        assert_eq!(merged.data().iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn merge_keeps_descending_latitude() {
        let north = LabeledGrid::from_2d(array![[1.0], [2.0]], vec![3.0, 2.0], vec![0.0]).unwrap();
        let south = LabeledGrid::from_2d(array![[3.0], [4.0]], vec![1.0, 0.0], vec![0.0]).unwrap();
        let merged = LabeledGrid::merge_by_coordinate_union(&[south, north]).unwrap();
        assert_eq!(
            merged.coordinates(Axis::Lat).to_vec(),
            vec![3.0, 2.0, 1.0, 0.0]
        );
        assert_eq!(
            merged.data().iter().copied().collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn extra_dimensions_are_carried() {
        let data = Array3::from_shape_fn((2, 4, 4), |(t, r, c)| (t * 100 + r * 4 + c) as i32);
        let grid = LabeledGrid::new(
            data.into_dyn(),
            vec![
                ("time".into(), vec![0.0, 1.0]),
                ("lat".into(), vec![0.0, 1.0, 2.0, 3.0]),
                ("lon".into(), vec![0.0, 1.0, 2.0, 3.0]),
            ],
        )
        .unwrap();
        assert_eq!(grid.total_point_count(), 32);

        let west = grid
            .select_by_index_range(Axis::Lon, IndexRange::new(0, 2))
            .unwrap();
        let east = grid
            .select_by_index_range(Axis::Lon, IndexRange::new(2, 4))
            .unwrap();
        assert_eq!(west.dimension_sizes()[0], ("time".to_string(), 2));
        let merged = LabeledGrid::merge_by_coordinate_union(&[east, west]).unwrap();
        assert_eq!(merged.data(), grid.data());
    }
}
