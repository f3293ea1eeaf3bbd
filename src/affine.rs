use crate::error::{QuadTreeError, Result};

/// Affine pixel-to-coordinate transform in GDAL order:
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform(f64, f64, f64, f64, f64, f64);

impl AffineTransform {
    pub fn new(a: f64, b: f64, xoff: f64, d: f64, e: f64, yoff: f64) -> Self {
        Self(a, b, xoff, d, e, yoff)
    }

    /// North-up transform from a pixel size and the top-left corner.
    pub fn from_origin(west: f64, north: f64, x_size: f64, y_size: f64) -> Self {
        Self(x_size, 0.0, west, 0.0, -y_size, north)
    }

    pub fn a(&self) -> f64 {
        self.0
    }

    pub fn b(&self) -> f64 {
        self.1
    }

    pub fn c(&self) -> f64 {
        self.2
    }

    pub fn d(&self) -> f64 {
        self.3
    }

    pub fn e(&self) -> f64 {
        self.4
    }

    pub fn f(&self) -> f64 {
        self.5
    }

    /// No rotation or shear terms.
    pub fn is_rectilinear(&self) -> bool {
        self.b() == 0.0 && self.d() == 0.0
    }

    /// Coordinate of a (fractional) pixel position.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a() * col + self.b() * row + self.c(),
            self.d() * col + self.e() * row + self.f(),
        )
    }

    /// Pixel-centre coordinates of `width` columns and `height` rows, as
    /// `(lon, lat)` vectors.
    pub(crate) fn pixel_centres(&self, width: usize, height: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        if !self.is_rectilinear() {
            return Err(QuadTreeError::InvalidGrid(
                "rotated or sheared transforms have no per-axis coordinates".into(),
            ));
        }
        let lon = (0..width)
            .map(|col| self.apply(col as f64 + 0.5, 0.0).0)
            .collect();
        let lat = (0..height)
            .map(|row| self.apply(0.0, row as f64 + 0.5).1)
            .collect();
        Ok((lon, lat))
    }

    /// Inverse of [`Self::pixel_centres`] for a north-up raster whose first
    /// row is `north_lat`. Axes with a single sample have no spacing and
    /// yield `None`.
    pub(crate) fn from_pixel_centres(
        west_lon: f64,
        next_lon: Option<f64>,
        north_lat: f64,
        next_lat: Option<f64>,
    ) -> Option<Self> {
        let x_size = (next_lon? - west_lon).abs();
        let y_size = (north_lat - next_lat?).abs();
        Some(Self::from_origin(
            west_lon - x_size / 2.0,
            north_lat + y_size / 2.0,
            x_size,
            y_size,
        ))
    }
}
