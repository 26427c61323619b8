//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Planetary Computer and Earth Search out of the box, plus
//! arbitrary STAC API endpoints via [`StacCatalog::Custom`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::{CloudAuth, NoAuth};
use crate::error::{CloudError, Result};
use crate::http::HttpClient;
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

const PC_SAS_TOKEN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/token";
const AZURE_BLOB_SUFFIX: &str = ".blob.core.windows.net";

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer STAC API.
    #[default]
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Any STAC API endpoint (provide the root URL, e.g.
    /// `"https://my-stac.example.com/api/v1"`).
    Custom(String),
}

impl StacCatalog {
    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string(),
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`. Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.trim().to_string()),
        }
    }

    /// Whether asset hrefs need a SAS token before they can be fetched.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }

    /// Endpoint issuing a read token for one collection's storage container.
    pub fn sas_token_url(&self, collection: &str) -> Option<String> {
        self.needs_signing()
            .then(|| format!("{PC_SAS_TOKEN_URL}/{collection}"))
    }
}

impl fmt::Display for StacCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanetaryComputer => f.write_str("planetary-computer"),
            Self::EarthSearch => f.write_str("earth-search"),
            Self::Custom(url) => f.write_str(url),
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// Maximum total items to fetch across pages (default 100).
    pub max_items: usize,
    /// Page size requested from the server (default 100).
    pub page_limit: u32,
    /// Authentication for catalog and token requests (default: none).
    pub auth: Arc<dyn CloudAuth>,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_items: 100,
            page_limit: 100,
            auth: Arc::new(NoAuth),
        }
    }
}

/// Reply of the Planetary Computer token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SasToken {
    pub token: String,
    #[serde(rename = "msft:expiry")]
    pub expiry: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search.
///
/// Requests are sent once; a failed page fails the whole search.
pub struct StacClient {
    catalog: StacCatalog,
    http: HttpClient,
    options: StacClientOptions,
}

impl StacClient {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let http = HttpClient::new(options.request_timeout)?;
        Ok(Self {
            catalog,
            http,
            options,
        })
    }

    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &StacClientOptions {
        &self.options
    }

    // ── Single-page search ──────────────────────────────────────────

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        self.http.post_json(&url, params, self.options.auth.as_ref()).await
    }

    // ── Paginated search ────────────────────────────────────────────

    /// Search with pagination, collecting up to `max_items` items in server
    /// order.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let max = self.options.max_items;
        let mut params = params.clone();
        if params.limit.is_none() {
            params.limit = Some(self.options.page_limit.min(max.try_into().unwrap_or(u32::MAX)));
        }

        let mut all_items: Vec<StacItem> = Vec::new();
        let mut page = self.search(&params).await?;
        let mut pages = 1;

        loop {
            let next = page.next_link().cloned();
            all_items.append(&mut page.features);

            if all_items.len() >= max {
                break;
            }
            let Some(link) = next else {
                break;
            };
            page = self.follow_next(&link, &params).await?;
            pages += 1;
            if page.is_empty() {
                break;
            }
        }

        all_items.truncate(max);
        tracing::debug!(catalog = %self.catalog, pages, items = all_items.len(), "STAC search complete");
        Ok(all_items)
    }

    // ── Planetary Computer SAS tokens ───────────────────────────────

    /// Fetch a read token for `collection`.
    pub async fn sas_token(&self, collection: &str) -> Result<SasToken> {
        let url = self
            .catalog
            .sas_token_url(collection)
            .ok_or_else(|| CloudError::Auth(format!("{} does not issue SAS tokens", self.catalog)))?;
        self.http
            .get_json(&url, self.options.auth.as_ref())
            .await
            .map_err(|e| CloudError::Auth(format!("SAS token for {collection}: {e}")))
    }

    /// Append a SAS token to every blob-storage asset href of `items`.
    ///
    /// One token is requested per distinct collection. Items without a
    /// collection use `default_collection`. A no-op for catalogs that do not
    /// need signing.
    pub async fn sign_items(&self, items: &mut [StacItem], default_collection: &str) -> Result<()> {
        if !self.catalog.needs_signing() || items.is_empty() {
            return Ok(());
        }

        let collections: BTreeSet<String> = items
            .iter()
            .map(|i| i.collection.clone().unwrap_or_else(|| default_collection.to_string()))
            .collect();

        let mut tokens = HashMap::new();
        for collection in collections {
            let token = self.sas_token(&collection).await?;
            tracing::debug!(collection = %collection, expiry = ?token.expiry, "Obtained SAS token");
            tokens.insert(collection, token.token);
        }

        for item in items.iter_mut() {
            let collection = item.collection.as_deref().unwrap_or(default_collection);
            let Some(token) = tokens.get(collection) else {
                continue;
            };
            for asset in item.assets.values_mut() {
                if is_blob_storage(&asset.href) {
                    asset.href = append_token(&asset.href, token);
                }
            }
        }
        Ok(())
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(&self, link: &StacLink, original: &StacSearchParams) -> Result<StacItemCollection> {
        let auth = self.options.auth.as_ref();
        let method = link.method.as_deref().unwrap_or("GET").to_uppercase();
        if method == "POST" {
            let body = next_page_body(link, original)?;
            self.http.post_json(&link.href, &body, auth).await
        } else {
            self.http.get_json(&link.href, auth).await
        }
    }
}

/// Body of the POST request for a `next` link.
///
/// With `merge: true` the link body overlays the original parameters;
/// otherwise the link body replaces them.
pub fn next_page_body(link: &StacLink, original: &StacSearchParams) -> Result<serde_json::Value> {
    let mut base = serde_json::to_value(original)?;
    match &link.body {
        Some(body) if link.merge.unwrap_or(false) => {
            if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), body.as_object()) {
                for (k, v) in link_obj {
                    base_obj.insert(k.clone(), v.clone());
                }
            }
            Ok(base)
        }
        Some(body) => Ok(body.clone()),
        None => Ok(base),
    }
}

/// `href` with `token` appended as query parameters.
pub fn append_token(href: &str, token: &str) -> String {
    let token = token.trim_start_matches('?');
    if href.contains('?') {
        format!("{href}&{token}")
    } else {
        format!("{href}?{token}")
    }
}

/// Whether `href` points at Azure blob storage (the only hrefs a SAS token
/// applies to).
pub fn is_blob_storage(href: &str) -> bool {
    let rest = href.split_once("://").map_or(href, |(_, rest)| rest);
    let host = rest.split(['/', '?']).next().unwrap_or_default();
    host.ends_with(AZURE_BLOB_SUFFIX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_search_urls() {
        assert_eq!(
            StacCatalog::PlanetaryComputer.search_url(),
            "https://planetarycomputer.microsoft.com/api/stac/v1/search"
        );
        assert_eq!(
            StacCatalog::EarthSearch.search_url(),
            "https://earth-search.aws.element84.com/v1/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac".into()).search_url(),
            "https://example.com/stac/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac/search".into()).search_url(),
            "https://example.com/stac/search"
        );
        assert_eq!(
            StacCatalog::Custom("https://example.com/stac/".into()).search_url(),
            "https://example.com/stac/search"
        );
    }

    #[test]
    fn catalog_from_str_or_url() {
        assert_eq!(StacCatalog::from_str_or_url("pc"), StacCatalog::PlanetaryComputer);
        assert_eq!(StacCatalog::from_str_or_url("Earth-Search"), StacCatalog::EarthSearch);
        assert_eq!(
            StacCatalog::from_str_or_url("https://My-Stac.com/v1"),
            StacCatalog::Custom("https://My-Stac.com/v1".into())
        );
    }

    #[test]
    fn only_planetary_computer_signs() {
        assert!(StacCatalog::PlanetaryComputer.needs_signing());
        assert!(!StacCatalog::EarthSearch.needs_signing());
        assert_eq!(
            StacCatalog::PlanetaryComputer.sas_token_url("sentinel-2-l2a").as_deref(),
            Some("https://planetarycomputer.microsoft.com/api/sas/v1/token/sentinel-2-l2a")
        );
        assert_eq!(StacCatalog::EarthSearch.sas_token_url("sentinel-2-l2a"), None);
    }

    #[test]
    fn token_is_appended_as_query() {
        assert_eq!(
            append_token("https://a.blob.core.windows.net/c/B04.tif", "st=2024&sig=x"),
            "https://a.blob.core.windows.net/c/B04.tif?st=2024&sig=x"
        );
        assert_eq!(
            append_token("https://a.blob.core.windows.net/c/B04.tif?v=1", "?sig=x"),
            "https://a.blob.core.windows.net/c/B04.tif?v=1&sig=x"
        );
    }

    #[test]
    fn blob_storage_detection() {
        assert!(is_blob_storage("https://sentinel2l2a01.blob.core.windows.net/sentinel2-l2/B04.tif"));
        assert!(!is_blob_storage("https://planetarycomputer.microsoft.com/api/data/v1/item/preview.png"));
        assert!(!is_blob_storage("https://evil.com/x.blob.core.windows.net/B04.tif"));
    }

    #[test]
    fn next_body_merges_token_into_original() {
        let original = StacSearchParams::new()
            .collections(&["sentinel-2-l2a"])
            .limit(100)
            .cloud_cover_below(60.0);
        let link = StacLink {
            rel: "next".into(),
            href: "https://planetarycomputer.microsoft.com/api/stac/v1/search".into(),
            method: Some("POST".into()),
            body: Some(serde_json::json!({"token": "next:abc"})),
            merge: Some(true),
        };
        let body = next_page_body(&link, &original).unwrap();
        assert_eq!(body["token"], "next:abc");
        assert_eq!(body["limit"], 100);
        assert_eq!(body["query"]["eo:cloud_cover"]["lt"], 60.0);

        let replace = StacLink { merge: None, ..link };
        let body = next_page_body(&replace, &original).unwrap();
        assert_eq!(body, serde_json::json!({"token": "next:abc"}));
    }

    #[test]
    fn sas_token_reply_parses() {
        let token: SasToken =
            serde_json::from_str(r#"{"msft:expiry": "2024-07-01T00:00:00Z", "token": "st=1&se=2&sig=abc"}"#)
                .unwrap();
        assert_eq!(token.token, "st=1&se=2&sig=abc");
        assert_eq!(token.expiry.as_deref(), Some("2024-07-01T00:00:00Z"));
    }
}
