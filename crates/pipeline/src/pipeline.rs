//! Run orchestration: validate, produce, fall back, export.

use std::path::Path;

use saag_core::{Error, Result, RunParams, TimeSeries};

use crate::config::PipelineConfig;
use crate::context::{RunContext, RunState};
use crate::export::{export_all, ExportedFiles};
use crate::producer::{select_producer, DemoProducer, SeriesProducer};

/// Raw request as it arrives from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// `"minx,miny,maxx,maxy"` in WGS84 degrees.
    pub bbox: String,
    pub start: String,
    pub end: String,
    /// Metres.
    pub resolution: String,
    pub collection: Option<String>,
}

impl RunRequest {
    pub fn new(
        bbox: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        resolution: impl Into<String>,
    ) -> Self {
        Self {
            bbox: bbox.into(),
            start: start.into(),
            end: end.into(),
            resolution: resolution.into(),
            collection: None,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn validate(&self) -> Result<RunParams> {
        let params = RunParams::from_raw(&self.bbox, &self.start, &self.end, &self.resolution)?;
        match &self.collection {
            Some(c) => params.with_collection(c.clone()),
            None => Ok(params),
        }
    }
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub params: RunParams,
    pub series: TimeSeries,
    pub context: RunContext,
    /// Name of the producer that ran.
    pub producer: &'static str,
    /// Set by [`Pipeline::run`].
    pub files: Option<ExportedFiles>,
}

impl RunOutcome {
    pub fn is_synthetic(&self) -> bool {
        self.series.is_synthetic()
    }
}

/// A failed run: the error and the context it failed in.
#[derive(Debug)]
pub struct RunFailure {
    pub error: Error,
    pub context: RunContext,
}

impl RunFailure {
    /// Move `context` to `Failed` for `error`.
    fn new(error: Error, mut context: RunContext) -> Self {
        context.fail(&error);
        Self { error, context }
    }
}

impl From<RunFailure> for Error {
    fn from(failure: RunFailure) -> Self {
        failure.error
    }
}

/// One configured pipeline, reusable across runs.
pub struct Pipeline {
    config: PipelineConfig,
    /// Fixed producer; when absent one is selected for every run.
    producer: Option<Box<dyn SeriesProducer>>,
}

impl Pipeline {
    /// Pipeline that calls [`select_producer`] at the start of each run.
    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config, producer: None }
    }

    pub fn with_producer(config: PipelineConfig, producer: Box<dyn SeriesProducer>) -> Self {
        Self {
            config,
            producer: Some(producer),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The fixed producer's name, `None` when it is chosen per run.
    pub fn producer_name(&self) -> Option<&'static str> {
        self.producer.as_ref().map(|p| p.name())
    }

    /// Produce the series for validated parameters.
    ///
    /// A fallback-eligible failure yields the synthetic series when the
    /// configuration allows it; anything else fails the run.
    pub async fn execute(&self, params: RunParams) -> Result<RunOutcome> {
        Ok(self.execute_in(params, RunContext::new()).await?)
    }

    async fn execute_in(&self, params: RunParams, mut ctx: RunContext) -> std::result::Result<RunOutcome, RunFailure> {
        let selected: Box<dyn SeriesProducer>;
        let producer: &dyn SeriesProducer = match &self.producer {
            Some(fixed) => fixed.as_ref(),
            None => match select_producer(&self.config) {
                Ok(p) => {
                    selected = p;
                    selected.as_ref()
                }
                Err(e) => return Err(RunFailure::new(e, ctx)),
            },
        };
        tracing::info!(
            producer = producer.name(),
            bbox = %params.bbox(),
            start = %params.start(),
            end = %params.end(),
            resolution_m = params.resolution_m(),
            "Run started"
        );

        let series = match producer.produce_series(&params, &mut ctx).await {
            Ok(series) => series,
            Err(e) if e.is_fallback_eligible() && self.config.allow_fallback => {
                if let Err(e) = ctx.fall_back(e.to_string()) {
                    return Err(RunFailure::new(e, ctx));
                }
                match DemoProducer::new(e.to_string()).produce_series(&params, &mut ctx).await {
                    Ok(series) => series,
                    Err(e) => return Err(RunFailure::new(e, ctx)),
                }
            }
            Err(e) => return Err(RunFailure::new(e, ctx)),
        };

        if let Err(e) = ctx.enter(RunState::Ready) {
            return Err(RunFailure::new(e, ctx));
        }
        tracing::info!(
            points = series.len(),
            synthetic = series.is_synthetic(),
            skipped = ctx.skipped().len(),
            "Run ready"
        );
        Ok(RunOutcome {
            params,
            series,
            context: ctx,
            producer: producer.name(),
            files: None,
        })
    }

    /// Validate, execute and export, keeping the context of a failed run.
    ///
    /// Invalid requests fail in `Validating`, before anything is searched.
    pub async fn try_run(&self, request: &RunRequest) -> std::result::Result<RunOutcome, RunFailure> {
        let ctx = RunContext::new();
        let params = match request.validate() {
            Ok(params) => params,
            Err(e) => return Err(RunFailure::new(e, ctx)),
        };
        let mut outcome = self.execute_in(params, ctx).await?;
        match export_all(&outcome.series, &outcome.params, &self.config.output_dir) {
            Ok(files) => {
                outcome.files = Some(files);
                Ok(outcome)
            }
            Err(error) => {
                tracing::error!("Export failed: {error}");
                Err(RunFailure {
                    error,
                    context: outcome.context,
                })
            }
        }
    }

    /// Validate, execute and export into the configured output directory.
    pub async fn run(&self, request: &RunRequest) -> Result<RunOutcome> {
        Ok(self.try_run(request).await?)
    }

    /// [`Pipeline::run`] on a private current-thread runtime.
    pub fn run_blocking(&self, request: &RunRequest) -> Result<RunOutcome> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(self.run(request))
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }
}
