//! Raster grids and multi-temporal cubes

mod cube;
mod geotransform;
mod grid;

pub use cube::{BandSlice, IndexCube, RasterCube};
pub use geotransform::GeoTransform;
pub use grid::{TargetGrid, WGS84_EPSG};
