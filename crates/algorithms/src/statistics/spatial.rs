//! Spatial reduction of an index cube to one value per acquisition.
//!
//! Non-finite pixels are excluded. A slice with no finite pixel yields a
//! value of `None`, never zero.

use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use saag_core::IndexCube;

use crate::maybe_rayon::*;

/// Statistic used to collapse a slice to a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialStatistic {
    /// Median of finite pixels (robust to residual cloud and edge pixels)
    #[default]
    Median,
    /// Arithmetic mean of finite pixels
    Mean,
}

impl std::str::FromStr for SpatialStatistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "median" => Ok(SpatialStatistic::Median),
            "mean" => Ok(SpatialStatistic::Mean),
            other => Err(format!("unknown statistic '{other}', expected median or mean")),
        }
    }
}

/// Reduced value of one slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceValue {
    pub acquired: DateTime<Utc>,
    pub value: Option<f64>,
}

fn finite_values(slice: &ArrayView2<'_, f32>) -> Vec<f64> {
    slice
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| v as f64)
        .collect()
}

/// Median of the finite pixels, `None` when there are none.
pub fn median_finite(slice: &ArrayView2<'_, f32>) -> Option<f64> {
    let mut vals = finite_values(slice);
    if vals.is_empty() {
        return None;
    }
    vals.sort_by(f64::total_cmp);
    let n = vals.len();
    let median = if n % 2 == 0 {
        (vals[n / 2 - 1] + vals[n / 2]) / 2.0
    } else {
        vals[n / 2]
    };
    Some(median)
}

/// Mean of the finite pixels, `None` when there are none.
pub fn mean_finite(slice: &ArrayView2<'_, f32>) -> Option<f64> {
    let vals = finite_values(slice);
    if vals.is_empty() {
        return None;
    }
    Some(vals.iter().sum::<f64>() / vals.len() as f64)
}

/// Reduce every slice of `cube`, in cube order.
pub fn reduce_cube(cube: &IndexCube, statistic: SpatialStatistic) -> Vec<SliceValue> {
    let slices: Vec<(DateTime<Utc>, ArrayView2<'_, f32>)> = cube.slices().collect();

    let values: Vec<SliceValue> = slices
        .into_par_iter()
        .map(|(acquired, slice)| {
            let value = match statistic {
                SpatialStatistic::Median => median_finite(&slice),
                SpatialStatistic::Mean => mean_finite(&slice),
            };
            SliceValue { acquired, value }
        })
        .collect();

    let gaps = values.iter().filter(|v| v.value.is_none()).count();
    if gaps > 0 {
        tracing::debug!(gaps, "Slices without any finite pixel");
    }
    values
}
