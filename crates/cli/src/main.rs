//! SAAG CLI - NDVI time series for an area of interest

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use saag_cloud::StacCatalog;
use saag_core::series::SeriesSummary;
use saag_core::{Provenance, TimeSeries};
use saag_pipeline::{read_csv, Pipeline, PipelineConfig, RunOutcome, RunRequest, RunState, SpatialStatistic};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "saag")]
#[command(author, version, about = "NDVI time series from satellite imagery", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the NDVI series for an area and date range, then export it
    Run(RunArgs),
    /// Print a previously exported series
    Show {
        /// CSV written by `saag run`
        input: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Area of interest as "minx,miny,maxx,maxy" (WGS84 degrees)
    #[arg(long, allow_hyphen_values = true)]
    bbox: String,
    /// First date (YYYY-MM-DD)
    #[arg(long)]
    start: String,
    /// Last date, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: String,
    /// Ground resolution in metres
    #[arg(short, long, default_value = "10")]
    resolution: String,
    /// Catalog collection id
    #[arg(long)]
    collection: Option<String>,
    /// STAC catalog: pc, earth-search or an API URL
    #[arg(long)]
    catalog: Option<String>,
    /// Exclude scenes with at least this cloud cover (%)
    #[arg(long)]
    max_cloud_cover: Option<f64>,
    /// Maximum number of scenes to search
    #[arg(long)]
    max_items: Option<usize>,
    /// Scenes loaded concurrently
    #[arg(long)]
    concurrency: Option<usize>,
    /// Per-date statistic: median or mean
    #[arg(long)]
    statistic: Option<SpatialStatistic>,
    /// Directory for ts_ndvi.csv and ts_ndvi.geojson
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Skip the catalog and produce the synthetic demo series
    #[arg(long)]
    demo: bool,
    /// Fail instead of falling back to the demo series
    #[arg(long)]
    no_fallback: bool,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Environment configuration with command-line flags applied on top.
fn build_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Invalid SAAG_* environment")?;
    if let Some(catalog) = &args.catalog {
        config.catalog = StacCatalog::from_str_or_url(catalog);
    }
    if let Some(pct) = args.max_cloud_cover {
        config.max_cloud_cover = pct;
    }
    if let Some(n) = args.max_items {
        config.max_items = n;
    }
    if let Some(n) = args.concurrency {
        config.fetch_concurrency = n;
    }
    if let Some(statistic) = args.statistic {
        config.statistic = statistic;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    config.demo |= args.demo;
    if args.no_fallback {
        config.allow_fallback = false;
    }
    config.validate().context("Invalid run options")?;
    Ok(config)
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

fn print_series(series: &TimeSeries) {
    println!("{:<12} {:>8}", "date", series.index_name());
    for point in series.points() {
        println!("{:<12} {:>8}", point.date, fmt_value(point.value));
    }
}

fn print_summary(summary: &SeriesSummary) {
    println!("\nStatistics:");
    println!("  Dates: {} ({} valid)", summary.n_obs, summary.n_valid);
    println!("  Min: {}", fmt_value(summary.min));
    println!("  Max: {}", fmt_value(summary.max));
    println!("  Mean: {}", fmt_value(summary.mean));
}

fn print_provenance(provenance: &Provenance) {
    match provenance {
        Provenance::Measured {
            scenes_used,
            scenes_skipped,
        } => println!("Source: {scenes_used} scenes ({scenes_skipped} skipped)"),
        Provenance::Synthetic { reason } => println!("Source: SYNTHETIC demo series ({reason})"),
    }
}

fn done(outcome: &RunOutcome, elapsed: Duration) {
    print_provenance(outcome.series.provenance());
    for skipped in outcome.context.skipped() {
        println!("  skipped {skipped}");
    }
    println!();
    print_series(&outcome.series);
    print_summary(&outcome.series.summary());
    if let Some(files) = &outcome.files {
        println!("\nSeries saved to: {}", files.csv.display());
        println!("                 {}", files.parquet.display());
        println!("AOI saved to: {}", files.geojson.display());
    }
    println!("  Processing time: {:.2?}", elapsed);
}

fn show(input: &Path) -> Result<()> {
    let series = read_csv(input).with_context(|| format!("Failed to read {}", input.display()))?;
    println!("File: {}", input.display());
    print_provenance(series.provenance());
    println!();
    print_series(&series);
    print_summary(&series.summary());
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run(args) => {
            let config = build_config(&args)?;
            let pipeline = Pipeline::from_config(config);
            info!(output = %pipeline.output_dir().display(), "Starting run");

            let mut request = RunRequest::new(args.bbox, args.start, args.end, args.resolution);
            request.collection = args.collection;

            let start = Instant::now();
            let pb = spinner("Building NDVI series...");
            let outcome = pipeline.run_blocking(&request);
            pb.finish_and_clear();
            let outcome = outcome.context("Run failed")?;

            if outcome.context.history().contains(&RunState::FallingBack) {
                eprintln!("warning: real imagery unavailable, exported series is synthetic");
            }
            done(&outcome, start.elapsed());
        }
        Commands::Show { input } => show(&input)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_negative_bbox() {
        let cli = Cli::try_parse_from([
            "saag",
            "run",
            "--bbox",
            "-63.95,-8.85,-63.80,-8.75",
            "--start",
            "2024-06-01",
            "--end",
            "2024-06-30",
            "--statistic",
            "mean",
            "--no-fallback",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.bbox, "-63.95,-8.85,-63.80,-8.75");
        assert_eq!(args.resolution, "10");
        assert_eq!(args.statistic, Some(SpatialStatistic::Mean));
        assert!(args.no_fallback);
    }

    #[test]
    fn unknown_statistic_is_rejected() {
        let parsed = Cli::try_parse_from([
            "saag", "run", "--bbox", "1,2,3,4", "--start", "2024-06-01", "--end", "2024-06-02", "--statistic", "mode",
        ]);
        assert!(parsed.is_err());
    }

    fn run_args(extra: &[&str]) -> RunArgs {
        let base = ["saag", "run", "--bbox", "1,2,3,4", "--start", "2024-06-01", "--end", "2024-06-02"];
        let cli = Cli::try_parse_from(base.iter().chain(extra)).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        args
    }

    #[test]
    fn flags_go_through_config_validation() {
        assert!(build_config(&run_args(&["--max-cloud-cover", "150"])).is_err());
        assert!(build_config(&run_args(&["--max-items", "0"])).is_err());
        assert!(build_config(&run_args(&["--concurrency", "0"])).is_err());
    }

    #[test]
    fn gaps_print_as_dash() {
        assert_eq!(fmt_value(None), "-");
        assert_eq!(fmt_value(Some(0.61234)), "0.6123");
    }
}
