//! Pipeline configuration.
//!
//! Every field has a default; [`PipelineConfig::from_env`] overrides them
//! from `SAAG_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use saag_algorithms::statistics::SpatialStatistic;
use saag_cloud::auth::{ApiKeyAuth, CloudAuth, NoAuth};
use saag_cloud::catalog::{DEFAULT_MAX_CLOUD_COVER, DEFAULT_MAX_ITEMS};
use saag_cloud::cog_reader::CogReaderOptions;
use saag_cloud::loader::DEFAULT_FETCH_CONCURRENCY;
use saag_cloud::stac_client::{StacCatalog, StacClientOptions};
use saag_core::{Error, Result};

/// Directory exports land in unless configured otherwise.
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

/// Timeout applied to every catalog and asset request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration of one pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// STAC API to search.
    pub catalog: StacCatalog,
    /// Strict upper bound on scene cloud cover (%).
    pub max_cloud_cover: f64,
    /// Cap on scenes returned by one search.
    pub max_items: usize,
    /// Scenes loaded at the same time.
    pub fetch_concurrency: usize,
    pub request_timeout: Duration,
    pub output_dir: PathBuf,
    /// Skip the catalog entirely and produce the synthetic series.
    pub demo: bool,
    /// Substitute the synthetic series when imagery is unavailable.
    pub allow_fallback: bool,
    /// Subscription key sent to the catalog.
    pub api_key: Option<String>,
    /// Treat a missing `api_key` as missing credentials.
    pub require_api_key: bool,
    /// Per-date reduction of the index cube.
    pub statistic: SpatialStatistic,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog: StacCatalog::default(),
            max_cloud_cover: DEFAULT_MAX_CLOUD_COVER,
            max_items: DEFAULT_MAX_ITEMS,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            demo: false,
            allow_fallback: true,
            api_key: None,
            require_api_key: false,
            statistic: SpatialStatistic::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `SAAG_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `SAAG_*` name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(v) = get("SAAG_CATALOG") {
            config.catalog = StacCatalog::from_str_or_url(&v);
        }
        if let Some(v) = get("SAAG_MAX_CLOUD_COVER") {
            config.max_cloud_cover = parse_number("SAAG_MAX_CLOUD_COVER", &v)?;
        }
        if let Some(v) = get("SAAG_MAX_ITEMS") {
            config.max_items = parse_positive("SAAG_MAX_ITEMS", &v)?;
        }
        if let Some(v) = get("SAAG_FETCH_CONCURRENCY") {
            config.fetch_concurrency = parse_positive("SAAG_FETCH_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("SAAG_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_positive::<u64>("SAAG_REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("SAAG_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SAAG_DEMO") {
            config.demo = parse_flag("SAAG_DEMO", &v)?;
        }
        if let Some(v) = get("SAAG_ALLOW_FALLBACK") {
            config.allow_fallback = parse_flag("SAAG_ALLOW_FALLBACK", &v)?;
        }
        config.api_key = get("SAAG_API_KEY");
        if let Some(v) = get("SAAG_REQUIRE_API_KEY") {
            config.require_api_key = parse_flag("SAAG_REQUIRE_API_KEY", &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Range checks shared by every way of building a configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            return Err(Error::config(
                "SAAG_MAX_CLOUD_COVER",
                self.max_cloud_cover.to_string(),
                "must be between 0 and 100",
            ));
        }
        for (field, value) in [
            ("SAAG_MAX_ITEMS", self.max_items),
            ("SAAG_FETCH_CONCURRENCY", self.fetch_concurrency),
        ] {
            if value == 0 {
                return Err(Error::config(field, "0", "must be positive"));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("SAAG_REQUEST_TIMEOUT_SECS", "0", "must be positive"));
        }
        Ok(())
    }

    /// Why imagery cannot be used at all, if it cannot.
    pub fn missing_credentials(&self) -> Option<String> {
        (self.require_api_key && self.api_key.is_none()).then(|| "no credentials: SAAG_API_KEY is not set".to_string())
    }

    /// Request signer for catalog and asset calls.
    pub fn auth(&self) -> Result<Arc<dyn CloudAuth>> {
        match &self.api_key {
            Some(key) => {
                let auth = ApiKeyAuth::planetary_computer(key.clone())
                    .map_err(|e| Error::config("SAAG_API_KEY", "***", e.to_string()))?;
                Ok(Arc::new(auth))
            }
            None => Ok(Arc::new(NoAuth)),
        }
    }

    pub fn stac_options(&self) -> Result<StacClientOptions> {
        Ok(StacClientOptions {
            request_timeout: self.request_timeout,
            max_items: self.max_items,
            auth: self.auth()?,
            ..StacClientOptions::default()
        })
    }

    pub fn cog_options(&self) -> Result<CogReaderOptions> {
        Ok(CogReaderOptions {
            request_timeout: self.request_timeout,
            auth: self.auth()?,
            ..CogReaderOptions::default()
        })
    }
}

fn parse_number<T: FromStr>(field: &'static str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| Error::config(field, raw, "not a number"))
}

fn parse_positive<T: FromStr + PartialOrd + Default>(field: &'static str, raw: &str) -> Result<T> {
    let value: T = parse_number(field, raw)?;
    if value <= T::default() {
        return Err(Error::config(field, raw, "must be positive"));
    }
    Ok(value)
}

fn parse_flag(field: &'static str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(field, raw, "expected true or false")),
    }
}
