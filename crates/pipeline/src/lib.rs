//! # SAAG Pipeline
//!
//! Turns an area of interest, a date range and a ground resolution into an
//! NDVI time series, then exports it.
//!
//! A [`Pipeline`] owns a [`PipelineConfig`] and picks a [`SeriesProducer`]
//! for each run. Each run gets its own [`RunContext`], which records the
//! stages it passes through, including a failed validation. When imagery cannot be obtained the run falls back to a
//! deterministic synthetic series that is always flagged as such.
//!
//! ```no_run
//! use saag_pipeline::{Pipeline, PipelineConfig, RunRequest};
//!
//! let pipeline = Pipeline::from_config(PipelineConfig::from_env()?);
//! let request = RunRequest::new("-63.95,-8.85,-63.80,-8.75", "2024-06-01", "2024-06-30", "10");
//! let outcome = pipeline.run_blocking(&request)?;
//! println!("{} points, synthetic: {}", outcome.series.len(), outcome.is_synthetic());
//! # Ok::<(), saag_core::Error>(())
//! ```

pub mod config;
pub mod context;
pub mod export;
pub mod pipeline;
pub mod producer;

pub use config::PipelineConfig;
pub use context::{RunContext, RunState, Transition};
pub use export::{export_all, read_csv, read_parquet, write_csv, write_geojson, write_parquet, ExportedFiles};
pub use pipeline::{Pipeline, RunFailure, RunOutcome, RunRequest};
pub use producer::{select_producer, DemoProducer, ImageryProducer, SeriesProducer};
pub use saag_algorithms::statistics::SpatialStatistic;
