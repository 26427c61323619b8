//! # SAAG Cloud
//!
//! Scene discovery and band loading for SAAG.
//!
//! A [`SceneCatalog`] searches a STAC API (Planetary Computer by default) and
//! returns [`saag_core::Scene`]s with signed asset hrefs. A [`RasterLoader`]
//! then reads the RED and NIR assets of each scene, fetching only the COG
//! tiles that cover the area of interest through HTTP Range requests, and
//! resamples them onto one [`saag_core::TargetGrid`].
//!
//! ## Features
//!
//! - `deflate` (default): DEFLATE decompression via `flate2`
//! - `lzw` (default): LZW decompression via `weezl`

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod cog_reader;
pub mod decompress;
pub mod error;
pub mod geotiff_keys;
pub mod http;
pub mod ifd;
pub mod loader;
pub mod reproject;
pub mod resample;
pub mod stac_client;
pub mod stac_models;
pub mod tile_index;

pub use auth::{ApiKeyAuth, CloudAuth, NoAuth};
pub use catalog::{CatalogQuery, SceneCatalog, StacSceneCatalog, DEFAULT_MAX_CLOUD_COVER, DEFAULT_MAX_ITEMS};
pub use cog_reader::{CogMetadata, CogReader, CogReaderOptions, MemorySource, OverviewInfo, RangeRead};
pub use error::{CloudError, Result};
pub use loader::{
    grid_for_scenes, BandSource, CogBandSource, LoadOutcome, RasterLoader, SceneOutcome,
    DEFAULT_FETCH_CONCURRENCY,
};
pub use resample::BandWindow;
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};
