//! Scene search: turns run parameters into a STAC query and STAC items into
//! [`Scene`]s.

use std::fmt;

use async_trait::async_trait;
use saag_core::{AssetAccess, BBox, RunParams, Scene};

use crate::error::Result;
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};
use crate::stac_models::{StacItem, StacSearchParams};

/// Scenes at or above this cloud cover (%) are excluded by default.
pub const DEFAULT_MAX_CLOUD_COVER: f64 = 60.0;
/// Default cap on items returned by one search.
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// What to ask the catalog for.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub collection: String,
    pub bbox: BBox,
    /// Inclusive ISO-8601 interval.
    pub datetime: String,
    /// Strict upper bound on `eo:cloud_cover`.
    pub max_cloud_cover: f64,
    pub max_items: usize,
}

impl CatalogQuery {
    pub fn from_params(params: &RunParams) -> Self {
        Self {
            collection: params.collection().to_string(),
            bbox: *params.bbox(),
            datetime: params.datetime_interval(),
            max_cloud_cover: DEFAULT_MAX_CLOUD_COVER,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    pub fn with_max_cloud_cover(mut self, pct: f64) -> Self {
        self.max_cloud_cover = pct;
        self
    }

    pub fn with_max_items(mut self, n: usize) -> Self {
        self.max_items = n;
        self
    }

    /// STAC Item Search body for this query.
    pub fn to_search_params(&self) -> StacSearchParams {
        StacSearchParams::new()
            .collections(&[self.collection.as_str()])
            .bbox(&self.bbox)
            .datetime(&self.datetime)
            .limit(self.max_items.min(u32::MAX as usize) as u32)
            .cloud_cover_below(self.max_cloud_cover)
    }

    /// Whether a scene's reported cloud cover passes the filter.
    ///
    /// Scenes that report no cloud cover pass.
    pub fn accepts_cloud_cover(&self, pct: Option<f64>) -> bool {
        pct.map_or(true, |p| p < self.max_cloud_cover)
    }
}

impl fmt::Display for CatalogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "collection={} bbox={} datetime={} eo:cloud_cover<{} limit={}",
            self.collection, self.bbox, self.datetime, self.max_cloud_cover, self.max_items
        )
    }
}

/// A searchable archive of scenes.
///
/// Returns scenes in catalog order with fetchable asset hrefs. An empty
/// result is not an error.
#[async_trait]
pub trait SceneCatalog: Send + Sync {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<Scene>>;

    /// Short name for logs.
    fn name(&self) -> String;
}

/// [`SceneCatalog`] backed by a STAC API.
pub struct StacSceneCatalog {
    client: StacClient,
}

impl StacSceneCatalog {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        Ok(Self {
            client: StacClient::new(catalog, options)?,
        })
    }

    pub fn client(&self) -> &StacClient {
        &self.client
    }
}

#[async_trait]
impl SceneCatalog for StacSceneCatalog {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<Scene>> {
        let mut params = query.to_search_params();
        params.limit = Some(self.client.options().page_limit.min(params.limit.unwrap_or(u32::MAX)));

        let mut items = self.client.search_all(&params).await?;
        items.truncate(query.max_items);
        self.client.sign_items(&mut items, &query.collection).await?;

        let scenes = items_to_scenes(items, query);
        tracing::info!(catalog = %self.client.catalog(), scenes = scenes.len(), "Catalog search returned");
        Ok(scenes)
    }

    fn name(&self) -> String {
        self.client.catalog().to_string()
    }
}

/// Convert items in order, dropping undated and too-cloudy ones.
pub fn items_to_scenes(items: Vec<StacItem>, query: &CatalogQuery) -> Vec<Scene> {
    items
        .into_iter()
        .filter_map(|item| {
            let id = item.id.clone();
            match item_to_scene(item, &query.collection) {
                Some(scene) if query.accepts_cloud_cover(scene.cloud_cover_pct) => Some(scene),
                Some(scene) => {
                    tracing::debug!(scene = %id, cloud_cover = ?scene.cloud_cover_pct, "Dropping cloudy scene");
                    None
                }
                None => {
                    tracing::warn!(scene = %id, "Dropping item without a parseable datetime");
                    None
                }
            }
        })
        .collect()
}

/// `None` when the item has no usable acquisition time.
pub fn item_to_scene(item: StacItem, default_collection: &str) -> Option<Scene> {
    let acquired = item.acquired()?;
    let epsg = item.epsg();

    let mut scene = Scene::new(item.id, acquired);
    scene.cloud_cover_pct = item.properties.eo_cloud_cover;
    scene.collection = Some(item.collection.unwrap_or_else(|| default_collection.to_string()));
    scene.epsg = epsg;
    scene.assets = item
        .assets
        .into_iter()
        .map(|(key, asset)| {
            let access = AssetAccess {
                href: asset.href,
                media_type: asset.media_type,
            };
            (key, access)
        })
        .collect();
    Some(scene)
}
