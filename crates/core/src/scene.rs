//! Catalog scenes as seen by the rest of the pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How to fetch one asset of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAccess {
    /// Fetchable URL (already signed when the catalog requires it).
    pub href: String,
    /// Media type reported by the catalog, if any.
    pub media_type: Option<String>,
}

impl AssetAccess {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            media_type: None,
        }
    }
}

/// One satellite acquisition returned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub cloud_cover_pct: Option<f64>,
    pub collection: Option<String>,
    /// Native CRS of the scene's rasters, when the catalog reports it.
    pub epsg: Option<u32>,
    pub assets: BTreeMap<String, AssetAccess>,
}

impl Scene {
    pub fn new(id: impl Into<String>, acquired: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            acquired,
            cloud_cover_pct: None,
            collection: None,
            epsg: None,
            assets: BTreeMap::new(),
        }
    }

    /// Builder-style asset insertion.
    pub fn with_asset(mut self, key: impl Into<String>, access: AssetAccess) -> Self {
        self.assets.insert(key.into(), access);
        self
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    pub fn with_cloud_cover(mut self, pct: f64) -> Self {
        self.cloud_cover_pct = Some(pct);
        self
    }

    /// Calendar date (UTC) of the acquisition.
    pub fn acquisition_date(&self) -> NaiveDate {
        self.acquired.date_naive()
    }

    pub fn asset(&self, key: &str) -> Option<&AssetAccess> {
        self.assets.get(key)
    }

    /// Asset keys in sorted order.
    pub fn asset_keys(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }
}

/// A scene that contributed no time slice, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedScene {
    pub scene_id: String,
    pub acquired: DateTime<Utc>,
    pub reason: String,
}

impl std::fmt::Display for SkippedScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.scene_id, self.acquired.date_naive(), self.reason)
    }
}
