//! Nearest-neighbour resampling of a read window onto a run's target grid.

use ndarray::Array2;
use saag_core::{GeoTransform, TargetGrid};

use crate::error::Result;
use crate::reproject;

/// A block of one band read from a COG, in the COG's native CRS.
///
/// No-data samples are already NaN.
#[derive(Debug, Clone)]
pub struct BandWindow {
    pub data: Array2<f32>,
    /// Transform of the window's top-left pixel.
    pub transform: GeoTransform,
    pub epsg: u32,
}

impl BandWindow {
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Sample at a map position in the window's CRS, NaN outside.
    pub fn sample(&self, x: f64, y: f64) -> f32 {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        if !(col.is_finite() && row.is_finite()) || col < 0.0 || row < 0.0 {
            return f32::NAN;
        }
        let (rows, cols) = self.shape();
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        if row >= rows || col >= cols {
            return f32::NAN;
        }
        self.data[(row, col)]
    }
}

/// Resample `window` onto `grid` by nearest neighbour.
///
/// Grid pixel centres are reprojected into the window's CRS when the two
/// differ. Grid pixels falling outside the window are NaN.
pub fn resample_nearest(window: &BandWindow, grid: &TargetGrid) -> Result<Array2<f32>> {
    let (rows, cols) = grid.shape();

    if window.epsg == grid.epsg {
        return Ok(Array2::from_shape_fn((rows, cols), |(r, c)| {
            let (x, y) = grid.pixel_center(r, c);
            window.sample(x, y)
        }));
    }

    let mut out = Array2::from_elem((rows, cols), f32::NAN);
    for ((r, c), value) in out.indexed_iter_mut() {
        let (x, y) = grid.pixel_center(r, c);
        let (wx, wy) = reproject::transform_point(x, y, grid.epsg, window.epsg)?;
        *value = window.sample(wx, wy);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use saag_core::BBox;

    fn window_10m() -> BandWindow {
        // 4x4 window of 10 m pixels, top-left at (1000, 2040)
        BandWindow {
            data: Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f32),
            transform: GeoTransform::new(1000.0, 2040.0, 10.0, -10.0),
            epsg: 32720,
        }
    }

    #[test]
    fn identical_grid_copies_window() {
        let window = window_10m();
        let grid = TargetGrid::covering(&BBox::new(1000.0, 2000.0, 1040.0, 2040.0), 32720, 10.0).unwrap();
        let out = resample_nearest(&window, &grid).unwrap();
        assert_eq!(out, window.data);
    }

    #[test]
    fn coarser_grid_picks_nearest_source_pixel() {
        let window = window_10m();
        let grid = TargetGrid::covering(&BBox::new(1000.0, 2000.0, 1040.0, 2040.0), 32720, 20.0).unwrap();
        let out = resample_nearest(&window, &grid).unwrap();
        // Centres at (1010, 2030), (1030, 2030), ... fall on pixel corners and
        // resolve to the lower-right neighbour
        assert_eq!(out, array![[5.0, 7.0], [13.0, 15.0]]);
    }

    #[test]
    fn outside_pixels_are_nan() {
        let window = window_10m();
        let grid = TargetGrid::covering(&BBox::new(1020.0, 2000.0, 1060.0, 2040.0), 32720, 10.0).unwrap();
        let out = resample_nearest(&window, &grid).unwrap();
        assert_eq!(out[(0, 0)], 2.0);
        assert_eq!(out[(0, 1)], 3.0);
        assert!(out[(0, 2)].is_nan());
        assert!(out[(3, 3)].is_nan());
    }

    #[test]
    fn nan_samples_stay_nan() {
        let mut window = window_10m();
        window.data[(0, 0)] = f32::NAN;
        let grid = TargetGrid::covering(&BBox::new(1000.0, 2030.0, 1010.0, 2040.0), 32720, 10.0).unwrap();
        let out = resample_nearest(&window, &grid).unwrap();
        assert!(out[(0, 0)].is_nan());
    }

    #[test]
    fn reprojects_between_crs() {
        // Window in UTM 20S around (-63.85, -8.80), grid in WGS84
        let (e, n) = reproject::transform_point(-63.85, -8.80, 4326, 32720).unwrap();
        let window = BandWindow {
            data: Array2::from_elem((100, 100), 0.25),
            transform: GeoTransform::new(e - 500.0, n + 500.0, 10.0, -10.0),
            epsg: 32720,
        };
        let grid = TargetGrid::covering(&BBox::new(-63.851, -8.801, -63.849, -8.799), 4326, 0.0005).unwrap();
        let out = resample_nearest(&window, &grid).unwrap();
        assert!(out.iter().all(|v| (*v - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn unsupported_crs_pair_is_an_error() {
        let mut window = window_10m();
        window.epsg = 3857;
        let grid = TargetGrid::covering(&BBox::new(0.0, 0.0, 1.0, 1.0), 4326, 0.5).unwrap();
        assert!(resample_nearest(&window, &grid).is_err());
    }
}
