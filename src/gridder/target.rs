//! Target-pixel assembly for the two gridder shapes.
//!
//! Both shapes reduce to the same representation: a flat list of retained
//! output pixels, each with its (x, y) cube coordinate, sky position and a
//! precomputed unit vector for the distance filter. Pixels whose projection
//! is undefined (signalled by non-finite coordinates) are dropped here, once,
//! and stay zero in the cubes.

use nalgebra::Vector3;
use tracing::info;

use crate::error::GridError;
use crate::sphere::lonlat_to_uvec;

#[derive(Debug)]
pub(crate) struct TargetGrid {
    /// Output cube shape (channels, ny, nx).
    pub(crate) shape: (usize, usize, usize),
    pub(crate) xs: Vec<u32>,
    pub(crate) ys: Vec<u32>,
    pub(crate) lons_rad: Vec<f64>,
    pub(crate) lats_rad: Vec<f64>,
    pub(crate) uvecs: Vec<Vector3<f64>>,
}

impl TargetGrid {
    fn empty(shape: (usize, usize, usize)) -> Self {
        Self {
            shape,
            xs: Vec::new(),
            ys: Vec::new(),
            lons_rad: Vec::new(),
            lats_rad: Vec::new(),
            uvecs: Vec::new(),
        }
    }

    fn push(&mut self, x: u32, y: u32, lon_deg: f64, lat_deg: f64) {
        let lon = lon_deg.to_radians();
        let lat = lat_deg.to_radians();
        self.xs.push(x);
        self.ys.push(y);
        self.lons_rad.push(lon);
        self.lats_rad.push(lat);
        self.uvecs.push(lonlat_to_uvec(lon, lat));
    }

    pub(crate) fn len(&self) -> usize {
        self.xs.len()
    }

    /// Rectangular projection grid. `pixel_to_world` maps 1-based pixel
    /// indices (x, y) to (lon, lat) in degrees.
    pub(crate) fn from_projection(
        shape: (usize, usize, usize),
        pixel_to_world: impl Fn(f64, f64) -> (f64, f64),
    ) -> Self {
        let (_, ny, nx) = shape;
        let mut grid = Self::empty(shape);
        let mut outside = 0usize;
        for y in 0..ny {
            for x in 0..nx {
                let (lon, lat) = pixel_to_world((x + 1) as f64, (y + 1) as f64);
                if lon.is_finite() && lat.is_finite() {
                    grid.push(x as u32, y as u32, lon, lat);
                } else {
                    outside += 1;
                }
            }
        }
        info!(
            "prepared {} target pixels ({} outside projection)",
            grid.len(),
            outside
        );
        grid
    }

    /// Unordered list of sight-line positions (degrees), treated as a
    /// (channels, 1, n) cube with one position per x index.
    pub(crate) fn from_sight_lines(
        lons_deg: &[f64],
        lats_deg: &[f64],
        channels: usize,
    ) -> Result<Self, GridError> {
        if lons_deg.len() != lats_deg.len() {
            return Err(GridError::ShapeMismatch(format!(
                "sight-line lons has {} entries but lats has {}",
                lons_deg.len(),
                lats_deg.len()
            )));
        }
        let mut grid = Self::empty((channels, 1, lons_deg.len()));
        let mut outside = 0usize;
        for (i, (&lon, &lat)) in lons_deg.iter().zip(lats_deg).enumerate() {
            if lon.is_finite() && lat.is_finite() {
                grid.push(i as u32, 0, lon, lat);
            } else {
                outside += 1;
            }
        }
        info!(
            "prepared {} sight lines ({} with non-finite coordinates dropped)",
            grid.len(),
            outside
        );
        Ok(grid)
    }
}
