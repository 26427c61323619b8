//! # SAAG Algorithms
//!
//! Raster-to-series algorithms for the SAAG vegetation-index pipeline.
//!
//! ## Available Algorithm Categories
//!
//! - **imagery**: band resolution, reflectance normalization, NDVI
//! - **statistics**: per-slice spatial reduction (median, mean)
//! - **timeseries**: series assembly and the synthetic demo series

pub mod imagery;
pub(crate) mod maybe_rayon;
pub mod statistics;
pub mod timeseries;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{
        ndvi, ndvi_cube, normalize, BandPair, BandResolver, ReflectanceScaling, ScaleDecision,
    };
    pub use crate::statistics::{reduce_cube, SliceValue, SpatialStatistic};
    pub use crate::timeseries::{assemble, demo_series};
    pub use saag_core::prelude::*;
}
