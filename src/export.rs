//! Writing chunks out as single-band GeoTIFFs to an [`ObjectStore`].

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use ndarray::IxDyn;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tiff::encoder::{colortype, TiffEncoder};

use crate::affine::AffineTransform;
use crate::error::{QuadTreeError, Result};
use crate::geo_key_directory::{self, GeoKeyDirectory};
use crate::grid::Axis;
use crate::labeled::LabeledGrid;
use crate::tree::QuadTree;

/// WGS 84.
pub const DEFAULT_EPSG: u16 = 4326;

/// Destination for exported chunks: every file lands at
/// `<prefix>/<name>.tif` in the wrapped store.
#[derive(Clone, Debug)]
pub struct ChunkStore {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
    epsg: u16,
}

impl ChunkStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: Path) -> Self {
        Self {
            store,
            prefix,
            epsg: DEFAULT_EPSG,
        }
    }

    pub fn with_epsg(mut self, epsg: u16) -> Self {
        self.epsg = epsg;
        self
    }

    pub fn path_for(&self, name: &str) -> Path {
        self.prefix.child(format!("{name}.tif"))
    }

    /// Encodes a two-dimensional grid and stores it under `name`.
    pub async fn export<A>(&self, grid: &LabeledGrid<A>, name: &str) -> Result<Path>
    where
        A: Copy + Into<f64>,
    {
        let bytes = encode_geotiff(grid, self.epsg)?;
        let path = self.path_for(name);
        log::debug!("writing {} bytes to {path}", bytes.len());
        self.store.put(&path, PutPayload::from(bytes)).await?;
        Ok(path)
    }

    /// Exports every chunk of `tree`. The root is stored as `root`, every
    /// other chunk as `chunk_<quadkey>`.
    pub async fn export_tree<A>(&self, tree: &QuadTree<LabeledGrid<A>>) -> Result<Vec<Path>>
    where
        A: Copy + Into<f64>,
    {
        let mut paths = Vec::with_capacity(tree.len());
        for chunk in tree.chunks() {
            let quadkey = tree.quadkey(chunk.id());
            let name = if quadkey.is_empty() {
                "root".to_string()
            } else {
                format!("chunk_{quadkey}")
            };
            paths.push(self.export(chunk.grid(), &name).await?);
        }
        Ok(paths)
    }
}

/// Encodes a two-dimensional grid as a `Gray64Float` GeoTIFF with north-up
/// rows. Georeferencing tags are only written when both axes have at least
/// two samples to derive a pixel size from.
pub fn encode_geotiff<A>(grid: &LabeledGrid<A>, epsg: u16) -> Result<Bytes>
where
    A: Copy + Into<f64>,
{
    if grid.ndim() != 2 {
        return Err(QuadTreeError::Export(format!(
            "only two-dimensional grids can be written, got {} dimensions",
            grid.ndim()
        )));
    }
    let lat = grid.coordinates(Axis::Lat);
    let lon = grid.coordinates(Axis::Lon);
    let (height, width) = (lat.len(), lon.len());
    if height == 0 || width == 0 {
        return Err(QuadTreeError::EmptyGrid("nothing to export".into()));
    }

    let ascending = lat[0] < lat[height - 1];
    let lat_axis = grid.axis_index(Axis::Lat);
    let mut samples = Vec::with_capacity(height * width);
    for row in 0..height {
        let i = if ascending { height - 1 - row } else { row };
        for j in 0..width {
            let mut index = [0usize; 2];
            index[lat_axis] = i;
            index[1 - lat_axis] = j;
            let value: f64 = grid.data()[IxDyn(&index)].into();
            samples.push(value);
        }
    }

    let (north, next_lat) = if ascending {
        (lat[height - 1], height.checked_sub(2).map(|i| lat[i]))
    } else {
        (lat[0], lat.get(1).copied())
    };
    let transform = AffineTransform::from_pixel_centres(lon[0], lon.get(1).copied(), north, next_lat);

    let to_u32 = |n: usize| {
        u32::try_from(n).map_err(|_| QuadTreeError::Export(format!("{n} pixels exceed TIFF limits")))
    };
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer)?;
        let mut image = encoder.new_image::<colortype::Gray64Float>(to_u32(width)?, to_u32(height)?)?;
        match transform {
            Some(transform) => {
                image.encoder().write_tag(
                    geo_key_directory::tag(geo_key_directory::MODEL_PIXEL_SCALE),
                    &[transform.a(), -transform.e(), 0.0][..],
                )?;
                image.encoder().write_tag(
                    geo_key_directory::tag(geo_key_directory::MODEL_TIEPOINT),
                    &[0.0, 0.0, 0.0, transform.c(), transform.f(), 0.0][..],
                )?;
            }
            None => log::debug!("{width}x{height} grid has no pixel size, writing it without a transform"),
        }
        image.encoder().write_tag(
            geo_key_directory::tag(geo_key_directory::GEO_KEY_DIRECTORY),
            &GeoKeyDirectory::geographic(epsg).encode()[..],
        )?;
        image.write_data(&samples)?;
    }
    Ok(Bytes::from(buffer.into_inner()))
}
