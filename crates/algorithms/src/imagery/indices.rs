//! Spectral vegetation index
//!
//! `NDVI = (NIR - Red) / (NIR + Red + ε)`
//!
//! Values for valid reflectance range from -1 to 1:
//! - Dense vegetation: 0.6 to 0.9
//! - Sparse vegetation: 0.2 to 0.5
//! - Bare soil: 0.1 to 0.2
//! - Water/clouds: -1.0 to 0.0
//!
//! The result is not clamped. A non-finite input yields NaN.

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use saag_core::{IndexCube, RasterCube, Result};

use crate::maybe_rayon::*;

/// Added to the denominator so that `red = nir = 0` gives 0 instead of NaN.
pub const NDVI_EPSILON: f32 = 1e-6;

/// NDVI of a single pixel.
#[inline]
pub fn ndvi(red: f32, nir: f32) -> f32 {
    if !(red.is_finite() && nir.is_finite()) {
        return f32::NAN;
    }
    (nir - red) / (nir + red + NDVI_EPSILON)
}

fn ndvi_slice(red: ArrayView2<'_, f32>, nir: ArrayView2<'_, f32>) -> Array2<f32> {
    Zip::from(&red).and(&nir).map_collect(|&r, &n| ndvi(r, n))
}

/// NDVI of every slice of a normalized cube, slices computed in parallel.
pub fn ndvi_cube(cube: &RasterCube) -> Result<IndexCube> {
    let (rows, cols) = cube.grid().shape();
    let red = cube.red();
    let nir = cube.nir();

    let slices: Vec<Array2<f32>> = (0..cube.len())
        .into_par_iter()
        .map(|t| ndvi_slice(red.index_axis(Axis(0), t), nir.index_axis(Axis(0), t)))
        .collect();

    let mut values = Array3::from_elem((slices.len(), rows, cols), f32::NAN);
    for (t, slice) in slices.iter().enumerate() {
        values.index_axis_mut(Axis(0), t).assign(slice);
    }

    IndexCube::new(cube.acquired().to_vec(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use saag_core::{BandSlice, GeoTransform, TargetGrid};

    fn grid(rows: usize, cols: usize) -> TargetGrid {
        TargetGrid {
            epsg: 32720,
            transform: GeoTransform::new(0.0, 0.0, 10.0, -10.0),
            rows,
            cols,
        }
    }

    #[test]
    fn test_ndvi_pixel() {
        // (0.4 - 0.1) / (0.4 + 0.1 + 1e-6)
        assert_relative_eq!(ndvi(0.1, 0.4), 0.6, epsilon = 1e-5);
        assert_eq!(ndvi(0.0, 0.0), 0.0);
        assert!(ndvi(f32::NAN, 0.3).is_nan());
        assert!(ndvi(0.3, f32::INFINITY).is_nan());
    }

    #[test]
    fn test_ndvi_range_on_valid_reflectance() {
        let steps: Vec<f32> = (0..=20).map(|i| i as f32 / 20.0).collect();
        for &r in &steps {
            for &n in &steps {
                if r == 0.0 && n == 0.0 {
                    continue;
                }
                let v = ndvi(r, n);
                assert!((-1.0..=1.0).contains(&v), "ndvi({r}, {n}) = {v}");
            }
        }
    }

    #[test]
    fn test_saturated_pixels_are_not_clamped() {
        // Negative reflectance after a linear offset can push past -1
        assert!(ndvi(0.2, -0.05) < -1.0);
    }

    #[test]
    fn test_ndvi_cube() {
        let mut red = Array2::from_elem((2, 3), 0.1f32);
        red[[1, 2]] = f32::NAN;
        let slices = vec![
            BandSlice {
                scene_id: "a".into(),
                acquired: Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap(),
                red,
                nir: Array2::from_elem((2, 3), 0.4f32),
            },
            BandSlice {
                scene_id: "b".into(),
                acquired: Utc.with_ymd_and_hms(2024, 6, 18, 14, 0, 0).unwrap(),
                red: Array2::from_elem((2, 3), 0.2f32),
                nir: Array2::from_elem((2, 3), 0.2f32),
            },
        ];
        let cube = RasterCube::from_slices(grid(2, 3), slices).unwrap();
        let index = ndvi_cube(&cube).unwrap();

        assert_eq!(index.values().dim(), (2, 2, 3));
        assert_eq!(index.acquired(), cube.acquired());
        assert_relative_eq!(index.values()[[0, 0, 0]], 0.6, epsilon = 1e-5);
        assert!(index.values()[[0, 1, 2]].is_nan());
        assert_relative_eq!(index.values()[[1, 1, 1]], 0.0);
    }

    #[test]
    fn test_empty_cube() {
        let cube = RasterCube::from_slices(grid(2, 2), Vec::new()).unwrap();
        let index = ndvi_cube(&cube).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.values().dim(), (0, 2, 2));
    }
}
