//! Statistical reductions for raster data
//!
//! - **spatial**: one statistic per time slice over its finite pixels

pub mod spatial;

pub use spatial::{mean_finite, median_finite, reduce_cube, SliceValue, SpatialStatistic};
