//! # SAAG Core
//!
//! Core types shared by the SAAG vegetation-index pipeline.
//!
//! This crate provides:
//! - `RunParams`: validated request (AOI, date range, resolution, collection)
//! - `Scene`: one catalog acquisition and its asset access descriptors
//! - `TargetGrid`, `RasterCube`, `IndexCube`: the per-run raster model
//! - `TimeSeries`: the chronological index series handed to exporters
//! - `Error`: the run-level error taxonomy

pub mod error;
pub mod params;
pub mod raster;
pub mod scene;
pub mod series;
pub mod vector;

pub use error::{Error, Result};
pub use params::RunParams;
pub use raster::{BandSlice, GeoTransform, IndexCube, RasterCube, TargetGrid, WGS84_EPSG};
pub use scene::{AssetAccess, Scene, SkippedScene};
pub use series::{Provenance, TimeSeries, TimeSeriesPoint, NDVI};
pub use vector::BBox;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::params::RunParams;
    pub use crate::raster::{IndexCube, RasterCube, TargetGrid};
    pub use crate::scene::{Scene, SkippedScene};
    pub use crate::series::{Provenance, TimeSeries, TimeSeriesPoint};
    pub use crate::vector::BBox;
}
