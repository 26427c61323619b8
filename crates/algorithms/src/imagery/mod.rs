//! Imagery algorithms
//!
//! - Band resolution: which asset keys hold RED and NIR
//! - Reflectance normalization: raw values to unit reflectance
//! - Spectral index: per-pixel NDVI over a band cube

pub mod bands;
pub mod indices;
pub mod reflectance;

pub use bands::{BandConvention, BandPair, BandResolver, DEFAULT_CONVENTIONS};
pub use indices::{ndvi, ndvi_cube, NDVI_EPSILON};
pub use reflectance::{normalize, ReflectanceScaling, ScaleDecision};
