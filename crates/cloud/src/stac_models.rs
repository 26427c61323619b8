//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Lightweight serde models for STAC Item Search (POST /search) responses,
//! covering the subset the scene search needs: bbox, datetime, collections,
//! property queries, pagination via `links`, and asset access.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use saag_core::BBox;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search` (STAC API Item Search).
///
/// Unset fields are omitted from the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,

    /// ISO-8601 instant or `start/end` interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Query extension filter, e.g. `{"eo:cloud_cover": {"lt": 60}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,
}

impl StacSearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bbox(mut self, bbox: &BBox) -> Self {
        self.bbox = Some(bbox.to_array());
        self
    }

    pub fn datetime(mut self, interval: &str) -> Self {
        self.datetime = Some(interval.to_string());
        self
    }

    pub fn collections(mut self, ids: &[&str]) -> Self {
        self.collections = Some(ids.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Keep only items whose `eo:cloud_cover` is strictly below `pct`.
    /// Other query terms are kept.
    pub fn cloud_cover_below(mut self, pct: f64) -> Self {
        let mut query = match self.query.take() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        query.insert("eo:cloud_cover".into(), serde_json::json!({ "lt": pct }));
        self.query = Some(serde_json::Value::Object(query));
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// One page of search results (a GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize)]
pub struct StacItemCollection {
    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched")]
    pub number_matched: Option<u64>,
}

impl StacItemCollection {
    /// The `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// One acquisition as published by the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct StacItem {
    pub id: String,

    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,

    pub collection: Option<String>,
}

impl StacItem {
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// EPSG code from the projection extension.
    ///
    /// Reads `proj:epsg` (projection extension v1) or `proj:code`
    /// (`"EPSG:32720"`, v2).
    pub fn epsg(&self) -> Option<u32> {
        let extra = &self.properties.extra;
        if let Some(code) = extra.get("proj:epsg").and_then(|v| v.as_u64()) {
            return u32::try_from(code).ok();
        }
        extra
            .get("proj:code")
            .and_then(|v| v.as_str())
            .and_then(|s| s.strip_prefix("EPSG:"))
            .and_then(|s| s.parse().ok())
    }

    /// Acquisition instant: `datetime`, or `start_datetime` for items that
    /// only carry a range.
    pub fn acquired(&self) -> Option<DateTime<Utc>> {
        let props = &self.properties;
        props
            .datetime
            .as_deref()
            .or_else(|| props.extra.get("start_datetime").and_then(|v| v.as_str()))
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacItemProperties {
    /// `null` for range-only items.
    pub datetime: Option<String>,

    #[serde(rename = "eo:cloud_cover")]
    pub eo_cloud_cover: Option<f64>,

    /// Everything else, including the projection extension.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacAsset {
    pub href: String,

    /// e.g. `"image/tiff; application=geotiff; profile=cloud-optimized"`
    #[serde(rename = "type")]
    pub media_type: Option<String>,
}

/// A link; only `"next"` is followed.
#[derive(Debug, Clone, Deserialize)]
pub struct StacLink {
    pub rel: String,

    pub href: String,

    /// `"POST"` for body-based pagination, GET when absent.
    pub method: Option<String>,

    /// Request body for POST-based pagination.
    pub body: Option<serde_json::Value>,

    /// Whether `body` overlays the previous request body.
    pub merge: Option<bool>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
