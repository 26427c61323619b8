//! Multi-temporal band and index cubes, indexed `(time, y, x)`.

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut3, Axis};

use crate::error::{Error, Result};
use crate::raster::TargetGrid;

/// RED and NIR of one scene, already resampled onto the run grid.
#[derive(Debug, Clone)]
pub struct BandSlice {
    pub scene_id: String,
    pub acquired: DateTime<Utc>,
    pub red: Array2<f32>,
    pub nir: Array2<f32>,
}

/// RED/NIR reflectance for every loaded scene of a run. No-data is NaN.
#[derive(Debug, Clone)]
pub struct RasterCube {
    grid: TargetGrid,
    scene_ids: Vec<String>,
    acquired: Vec<DateTime<Utc>>,
    red: Array3<f32>,
    nir: Array3<f32>,
}

impl RasterCube {
    /// Stack slices in the given order. Every slice must match the grid shape.
    pub fn from_slices(grid: TargetGrid, slices: Vec<BandSlice>) -> Result<Self> {
        let (rows, cols) = grid.shape();
        let n = slices.len();
        let mut red = Array3::from_elem((n, rows, cols), f32::NAN);
        let mut nir = Array3::from_elem((n, rows, cols), f32::NAN);
        let mut scene_ids = Vec::with_capacity(n);
        let mut acquired = Vec::with_capacity(n);

        for (t, slice) in slices.into_iter().enumerate() {
            for band in [&slice.red, &slice.nir] {
                if band.dim() != (rows, cols) {
                    return Err(Error::InvalidSeries(format!(
                        "slice {} has shape {:?}, grid is {:?}",
                        slice.scene_id,
                        band.dim(),
                        (rows, cols)
                    )));
                }
            }
            red.index_axis_mut(Axis(0), t).assign(&slice.red);
            nir.index_axis_mut(Axis(0), t).assign(&slice.nir);
            scene_ids.push(slice.scene_id);
            acquired.push(slice.acquired);
        }

        Ok(Self {
            grid,
            scene_ids,
            acquired,
            red,
            nir,
        })
    }

    pub fn grid(&self) -> &TargetGrid {
        &self.grid
    }

    /// Number of time slices.
    pub fn len(&self) -> usize {
        self.acquired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acquired.is_empty()
    }

    pub fn acquired(&self) -> &[DateTime<Utc>] {
        &self.acquired
    }

    pub fn scene_ids(&self) -> &[String] {
        &self.scene_ids
    }

    pub fn red(&self) -> ArrayView3<'_, f32> {
        self.red.view()
    }

    pub fn nir(&self) -> ArrayView3<'_, f32> {
        self.nir.view()
    }

    /// Mutable access to both bands at once.
    pub fn bands_mut(&mut self) -> (ArrayViewMut3<'_, f32>, ArrayViewMut3<'_, f32>) {
        (self.red.view_mut(), self.nir.view_mut())
    }
}

/// Per-pixel index values with the acquisition time of every slice.
#[derive(Debug, Clone)]
pub struct IndexCube {
    acquired: Vec<DateTime<Utc>>,
    values: Array3<f32>,
}

impl IndexCube {
    pub fn new(acquired: Vec<DateTime<Utc>>, values: Array3<f32>) -> Result<Self> {
        if values.len_of(Axis(0)) != acquired.len() {
            return Err(Error::InvalidSeries(format!(
                "{} timestamps for {} index slices",
                acquired.len(),
                values.len_of(Axis(0))
            )));
        }
        Ok(Self { acquired, values })
    }

    pub fn len(&self) -> usize {
        self.acquired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acquired.is_empty()
    }

    pub fn acquired(&self) -> &[DateTime<Utc>] {
        &self.acquired
    }

    pub fn values(&self) -> ArrayView3<'_, f32> {
        self.values.view()
    }

    /// `(acquired, slice)` pairs in cube order.
    pub fn slices(&self) -> impl Iterator<Item = (DateTime<Utc>, ArrayView2<'_, f32>)> + '_ {
        self.acquired
            .iter()
            .copied()
            .zip(self.values.axis_iter(Axis(0)))
    }
}
