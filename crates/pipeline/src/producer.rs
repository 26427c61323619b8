//! Series producers: the imagery pipeline and the synthetic demo.

use std::sync::Arc;

use async_trait::async_trait;
use saag_algorithms::imagery::{ndvi_cube, normalize, BandResolver, ReflectanceScaling};
use saag_algorithms::statistics::{reduce_cube, SpatialStatistic};
use saag_algorithms::timeseries::{assemble, demo_series};
use saag_cloud::catalog::{CatalogQuery, SceneCatalog, StacSceneCatalog};
use saag_cloud::loader::{grid_for_scenes, CogBandSource, RasterLoader};
use saag_core::{Error, Provenance, Result, RunParams, TimeSeries};

use crate::config::PipelineConfig;
use crate::context::{RunContext, RunState};

/// Turns a run's parameters into a time series.
#[async_trait]
pub trait SeriesProducer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Produce the series for `params`, moving `ctx` through the stages it
    /// runs. Leaves the terminal transition to the caller.
    async fn produce_series(&self, params: &RunParams, ctx: &mut RunContext) -> Result<TimeSeries>;
}

/// Search, load and reduce real imagery.
pub struct ImageryProducer {
    catalog: Arc<dyn SceneCatalog>,
    loader: RasterLoader,
    resolver: BandResolver,
    statistic: SpatialStatistic,
    max_cloud_cover: f64,
    max_items: usize,
}

impl ImageryProducer {
    pub fn new(catalog: Arc<dyn SceneCatalog>, loader: RasterLoader, config: &PipelineConfig) -> Self {
        Self {
            catalog,
            loader,
            resolver: BandResolver::default(),
            statistic: config.statistic,
            max_cloud_cover: config.max_cloud_cover,
            max_items: config.max_items,
        }
    }

    pub fn with_resolver(mut self, resolver: BandResolver) -> Self {
        self.resolver = resolver;
        self
    }

    fn query(&self, params: &RunParams) -> CatalogQuery {
        CatalogQuery::from_params(params)
            .with_max_cloud_cover(self.max_cloud_cover)
            .with_max_items(self.max_items)
    }
}

#[async_trait]
impl SeriesProducer for ImageryProducer {
    fn name(&self) -> &'static str {
        "imagery"
    }

    async fn produce_series(&self, params: &RunParams, ctx: &mut RunContext) -> Result<TimeSeries> {
        ctx.enter(RunState::Searching)?;
        let query = self.query(params);
        tracing::info!(catalog = %self.catalog.name(), "Searching {query}");
        let scenes = self
            .catalog
            .search(&query)
            .await
            .map_err(|e| Error::CatalogUnavailable {
                query: query.to_string(),
                reason: e.to_string(),
            })?;
        if scenes.is_empty() {
            return Err(Error::NoScenesFound {
                query: query.to_string(),
            });
        }

        ctx.enter(RunState::BandResolving)?;
        let bands = self.resolver.resolve(&scenes[0])?;

        ctx.enter(RunState::Loading)?;
        let grid = grid_for_scenes(params.bbox(), &scenes, params.resolution_m())?;
        tracing::info!(
            scenes = scenes.len(),
            epsg = grid.epsg,
            rows = grid.rows,
            cols = grid.cols,
            red = %bands.red_key,
            nir = %bands.nir_key,
            "Loading bands"
        );
        let loaded = self.loader.load(&scenes, &bands.red_key, &bands.nir_key, grid).await?;
        let (cube, skipped) = loaded.into_parts();
        ctx.record_skipped(skipped);
        let mut cube = cube?;

        ctx.enter(RunState::Normalizing)?;
        let scaling = ReflectanceScaling::for_collection(params.collection());
        let decision = normalize(&mut cube, scaling);
        tracing::info!(?decision, "Reflectance normalized");

        ctx.enter(RunState::ComputingIndex)?;
        let index = ndvi_cube(&cube)?;

        ctx.enter(RunState::Reducing)?;
        let values = reduce_cube(&index, self.statistic);

        ctx.enter(RunState::Assembling)?;
        let provenance = Provenance::Measured {
            scenes_used: cube.len(),
            scenes_skipped: ctx.skipped().len(),
        };
        assemble(&values, provenance)
    }
}

/// Deterministic synthetic series. Always tagged synthetic.
#[derive(Debug, Clone)]
pub struct DemoProducer {
    reason: String,
}

impl DemoProducer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl SeriesProducer for DemoProducer {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn produce_series(&self, params: &RunParams, ctx: &mut RunContext) -> Result<TimeSeries> {
        if ctx.state() != RunState::FallingBack {
            ctx.fall_back(self.reason.clone())?;
        }
        let reason = ctx.fallback_reason().unwrap_or(&self.reason).to_string();
        demo_series(params.start(), params.end(), reason)
    }
}

/// Pick the producer for a run. Called once per run, so credentials and the
/// catalog client are checked afresh each time.
///
/// Imagery is used unless demo mode is requested, credentials are required
/// but absent, or the catalog client cannot be built. The last two only fall
/// back when `allow_fallback` is set.
pub fn select_producer(config: &PipelineConfig) -> Result<Box<dyn SeriesProducer>> {
    if config.demo {
        return Ok(Box::new(DemoProducer::new("demo mode requested")));
    }

    if let Some(reason) = config.missing_credentials() {
        if config.allow_fallback {
            return Ok(Box::new(DemoProducer::new(reason)));
        }
        return Err(Error::config("SAAG_API_KEY", "", reason));
    }

    let catalog = StacSceneCatalog::new(config.catalog.clone(), config.stac_options()?);
    match catalog {
        Ok(catalog) => {
            let source = CogBandSource::new(config.cog_options()?);
            let loader = RasterLoader::new(Arc::new(source)).with_fetch_concurrency(config.fetch_concurrency);
            Ok(Box::new(ImageryProducer::new(Arc::new(catalog), loader, config)))
        }
        Err(e) if config.allow_fallback => Ok(Box::new(DemoProducer::new(format!("catalog client unavailable: {e}")))),
        Err(e) => Err(Error::CatalogUnavailable {
            query: config.catalog.to_string(),
            reason: e.to_string(),
        }),
    }
}
