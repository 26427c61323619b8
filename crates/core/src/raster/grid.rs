//! Common output grid of a run

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use crate::vector::BBox;

/// EPSG code of WGS84 geographic coordinates.
pub const WGS84_EPSG: u32 = 4326;

/// Approximate metres per degree of latitude, used to express a metric
/// resolution on a geographic grid.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// The north-up grid every time slice of a run is resampled onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetGrid {
    pub epsg: u32,
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

impl TargetGrid {
    /// Grid covering `extent` (in the units of `epsg`) with square cells of
    /// `cell_size`. The origin is snapped to a multiple of the cell size so
    /// that runs over the same CRS share pixel boundaries.
    pub fn covering(extent: &BBox, epsg: u32, cell_size: f64) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::config("resolution", cell_size.to_string(), "cell size must be positive"));
        }
        if extent.width() <= 0.0 || extent.height() <= 0.0 {
            return Err(Error::config("bbox", extent.to_string(), "grid extent is empty"));
        }

        let origin_x = (extent.min_x / cell_size).floor() * cell_size;
        let origin_y = (extent.max_y / cell_size).ceil() * cell_size;
        let cols = (((extent.max_x - origin_x) / cell_size).ceil() as usize).max(1);
        let rows = (((origin_y - extent.min_y) / cell_size).ceil() as usize).max(1);

        Ok(Self {
            epsg,
            transform: GeoTransform::new(origin_x, origin_y, cell_size, -cell_size),
            rows,
            cols,
        })
    }

    /// Grid in projected metres, or in degrees when `epsg` is WGS84.
    pub fn for_resolution(extent: &BBox, epsg: u32, resolution_m: u32) -> Result<Self> {
        let cell = if epsg == WGS84_EPSG {
            resolution_m as f64 / METRES_PER_DEGREE
        } else {
            resolution_m as f64
        };
        Self::covering(extent, epsg, cell)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.pixel_center(col, row)
    }

    pub fn extent(&self) -> BBox {
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.cols, self.rows);
        BBox::new(min_x, min_y, max_x, max_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn covers_extent_with_snapped_origin() {
        let extent = BBox::new(604_123.0, 9_020_010.0, 604_987.0, 9_021_005.0);
        let grid = TargetGrid::covering(&extent, 32720, 10.0).unwrap();

        assert_relative_eq!(grid.transform.origin_x, 604_120.0);
        assert_relative_eq!(grid.transform.origin_y, 9_021_010.0);
        assert_eq!(grid.cols, 87);
        assert_eq!(grid.rows, 100);

        let covered = grid.extent();
        assert!(covered.min_x <= extent.min_x && covered.max_x >= extent.max_x);
        assert!(covered.min_y <= extent.min_y && covered.max_y >= extent.max_y);
    }

    #[test]
    fn tiny_extent_gets_one_pixel() {
        let extent = BBox::new(100.0, 100.0, 100.5, 100.5);
        let grid = TargetGrid::covering(&extent, 32630, 60.0).unwrap();
        assert_eq!(grid.shape(), (1, 1));
    }

    #[test]
    fn geographic_grid_uses_degrees() {
        let extent = BBox::new(-63.95, -8.85, -63.80, -8.75);
        let grid = TargetGrid::for_resolution(&extent, WGS84_EPSG, 10).unwrap();
        assert!(grid.cell_size() < 1e-3);
        assert!(grid.cols > 1000);
    }

    #[test]
    fn rejects_bad_cell_size() {
        let extent = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(TargetGrid::covering(&extent, 32630, 0.0).is_err());
        assert!(TargetGrid::covering(&extent, 32630, f64::NAN).is_err());
    }
}
