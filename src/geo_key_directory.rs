use num_enum::{IntoPrimitive, TryFromPrimitive};
use tiff::tags::Tag;

use crate::error::{QuadTreeError, Result};

/// GeoTIFF tags written alongside exported chunks.
pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;

pub(crate) fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

#[derive(Clone, Copy, Debug, PartialEq, TryFromPrimitive, IntoPrimitive, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum GeoKeyTag {
    // GeoTIFF configuration keys
    ModelType = 1024,
    RasterType = 1025,

    // Geodetic CRS Parameter Keys
    GeographicType = 2048,
    GeogAngularUnits = 2054,
}

const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const ANGULAR_UNIT_DEGREE: u16 = 9102;

/// GeoKey directory holding short-valued keys only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeoKeyDirectory {
    keys: Vec<(GeoKeyTag, u16)>,
}

impl GeoKeyDirectory {
    /// Keys of a pixel-is-area raster in a geographic CRS given by EPSG code.
    pub fn geographic(epsg: u16) -> Self {
        Self {
            keys: vec![
                (GeoKeyTag::ModelType, MODEL_TYPE_GEOGRAPHIC),
                (GeoKeyTag::RasterType, RASTER_PIXEL_IS_AREA),
                (GeoKeyTag::GeographicType, epsg),
                (GeoKeyTag::GeogAngularUnits, ANGULAR_UNIT_DEGREE),
            ],
        }
    }

    pub fn get(&self, key: GeoKeyTag) -> Option<u16> {
        self.keys
            .iter()
            .find(|(tag, _)| *tag == key)
            .map(|(_, value)| *value)
    }

    /// Values of the `GeoKeyDirectoryTag`: a version header followed by one
    /// `(key, location, count, value)` entry per key, sorted by key.
    pub fn encode(&self) -> Vec<u16> {
        let mut keys = self.keys.clone();
        keys.sort();
        let mut out = vec![1, 1, 0, keys.len() as u16];
        for (key, value) in keys {
            out.extend([u16::from(key), 0, 1, value]);
        }
        out
    }

    pub fn decode(values: &[u16]) -> Result<Self> {
        let invalid = |msg: &str| QuadTreeError::Export(format!("invalid GeoKey directory: {msg}"));
        if values.len() < 4 {
            return Err(invalid("missing header"));
        }
        let (header, entries) = values.split_at(4);
        let count = header[3] as usize;
        if entries.len() < count * 4 {
            return Err(invalid("truncated entries"));
        }
        let mut keys = Vec::with_capacity(count);
        for entry in entries.chunks_exact(4).take(count) {
            // Only keys stored inline in the directory are supported.
            if entry[1] != 0 {
                continue;
            }
            if let Ok(key) = GeoKeyTag::try_from(entry[0]) {
                keys.push((key, entry[3]));
            }
        }
        Ok(Self { keys })
    }
}
