//! Error types for catalog search and COG band reads.

use thiserror::Error;

/// Transport, catalog and TIFF decoding failures.
///
/// These stay below the run-level taxonomy: a failed search becomes
/// `saag_core::Error::CatalogUnavailable`, a failed band read becomes a
/// skipped scene.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("server does not support Range requests for {url}")]
    RangeNotSupported { url: String },

    #[error("invalid TIFF: {reason}")]
    InvalidTiff { reason: String },

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u16),

    #[error("unsupported data type: bits_per_sample={bps}, sample_format={sf}")]
    UnsupportedDataType { bps: u16, sf: u16 },

    #[error("unsupported planar configuration: {0} (only chunky=1 supported)")]
    UnsupportedPlanarConfig(u16),

    #[error("unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("raster has no EPSG code in its GeoKeys")]
    MissingCrs,

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scene has no asset '{key}'")]
    MissingAsset { key: String },

    #[error("tile {tile_idx} out of range (max {max})")]
    TileOutOfRange { tile_idx: usize, max: usize },

    #[error("no IFD entries found in TIFF")]
    NoIfd,

    #[error("bbox does not intersect raster extent")]
    BBoxOutside,

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("core error: {0}")]
    Core(#[from] saag_core::Error),
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
