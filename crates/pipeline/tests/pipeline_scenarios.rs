//! End-to-end runs against an in-memory catalog and band source.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use ndarray::Array2;
use saag_cloud::catalog::{CatalogQuery, SceneCatalog};
use saag_cloud::loader::{BandSource, RasterLoader};
use saag_cloud::CloudError;
use saag_core::{AssetAccess, Error, Provenance, Scene, TargetGrid};
use saag_pipeline::{read_parquet, ImageryProducer, Pipeline, PipelineConfig, RunRequest, RunState};

const BBOX: &str = "-63.95,-8.85,-63.80,-8.75";

/// Catalog returning a fixed answer and counting searches.
struct FixedCatalog {
    scenes: std::result::Result<Vec<Scene>, String>,
    searches: Arc<AtomicUsize>,
}

#[async_trait]
impl SceneCatalog for FixedCatalog {
    async fn search(&self, query: &CatalogQuery) -> saag_cloud::Result<Vec<Scene>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        assert_eq!(query.max_cloud_cover, 60.0);
        self.scenes.clone().map_err(CloudError::Network)
    }

    fn name(&self) -> String {
        "fixed".into()
    }
}

/// Integer-scaled reflectance: RED 1000 / NIR 5000 early in the month,
/// RED 2000 / NIR 4000 afterwards. Scenes from tile T20LNR read RED 3000.
/// The top row is no-data.
struct ScaledSource;

#[async_trait]
impl BandSource for ScaledSource {
    async fn read_band(&self, scene: &Scene, key: &str, grid: &TargetGrid) -> saag_cloud::Result<Array2<f32>> {
        if scene.id.contains("corrupt") {
            return Err(CloudError::InvalidTiff { reason: "truncated tile".into() });
        }
        let early = scene.acquisition_date() < NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let value = match (key, early) {
            ("B04", _) if scene.id.ends_with("T20LNR") => 3000.0,
            ("B04", true) => 1000.0,
            ("B04", false) => 2000.0,
            (_, true) => 5000.0,
            (_, false) => 4000.0,
        };
        let mut band = Array2::from_elem(grid.shape(), value);
        band.row_mut(0).fill(f32::NAN);
        Ok(band)
    }
}

fn scene(id: &str, day: u32, keys: &[&str]) -> Scene {
    let acquired = Utc.with_ymd_and_hms(2024, 6, day, 14, 10, 0).unwrap();
    keys.iter().fold(
        Scene::new(id, acquired).with_epsg(32720).with_cloud_cover(10.0),
        |s, k| s.with_asset(*k, AssetAccess::new(format!("https://blob.example/{id}/{k}.tif"))),
    )
}

fn june_scenes() -> Vec<Scene> {
    vec![
        scene("S2A_20240603", 3, &["B04", "B08"]),
        scene("S2B_20240608", 8, &["B04"]),
        scene("S2A_20240618", 18, &["B04", "B08"]),
    ]
}

struct Harness {
    pipeline: Pipeline,
    searches: Arc<AtomicUsize>,
    _dir: tempfile::TempDir,
}

fn harness(scenes: std::result::Result<Vec<Scene>, String>, allow_fallback: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        output_dir: dir.path().join("outputs"),
        allow_fallback,
        ..PipelineConfig::default()
    };
    let searches = Arc::new(AtomicUsize::new(0));
    let catalog = FixedCatalog {
        scenes,
        searches: Arc::clone(&searches),
    };
    let loader = RasterLoader::new(Arc::new(ScaledSource)).with_fetch_concurrency(2);
    let producer = ImageryProducer::new(Arc::new(catalog), loader, &config);
    Harness {
        pipeline: Pipeline::with_producer(config, Box::new(producer)),
        searches,
        _dir: dir,
    }
}

fn june() -> RunRequest {
    RunRequest::new(BBOX, "2024-06-01", "2024-06-30", "10")
}

#[tokio::test]
async fn scene_missing_a_band_is_skipped() {
    let h = harness(Ok(june_scenes()), true);
    let outcome = h.pipeline.run(&june()).await.unwrap();

    let dates: Vec<NaiveDate> = outcome.series.dates().collect();
    assert_eq!(
        dates,
        vec![NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(), NaiveDate::from_ymd_opt(2024, 6, 18).unwrap()]
    );
    // (0.5 - 0.1) / (0.5 + 0.1) and (0.4 - 0.2) / (0.4 + 0.2)
    assert_abs_diff_eq!(outcome.series.points()[0].value.unwrap(), 2.0 / 3.0, epsilon = 1e-4);
    assert_abs_diff_eq!(outcome.series.points()[1].value.unwrap(), 1.0 / 3.0, epsilon = 1e-4);
    assert_eq!(
        outcome.series.provenance(),
        &Provenance::Measured {
            scenes_used: 2,
            scenes_skipped: 1
        }
    );

    let skipped = outcome.context.skipped();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].scene_id, "S2B_20240608");
    assert!(skipped[0].reason.contains("B08"));

    assert_eq!(
        outcome.context.history(),
        vec![
            RunState::Validating,
            RunState::Searching,
            RunState::BandResolving,
            RunState::Loading,
            RunState::Normalizing,
            RunState::ComputingIndex,
            RunState::Reducing,
            RunState::Assembling,
            RunState::Ready,
        ]
    );

    let files = outcome.files.unwrap();
    let csv = fs::read_to_string(&files.csv).unwrap();
    assert_eq!(csv.lines().next(), Some("date,NDVI"));
    assert_eq!(csv.lines().count(), 3);
    assert_eq!(read_parquet(&files.parquet).unwrap().points(), outcome.series.points());
}

#[tokio::test]
async fn zero_scenes_fall_back_to_synthetic() {
    let h = harness(Ok(Vec::new()), true);
    let outcome = h.pipeline.run(&june()).await.unwrap();

    assert!(outcome.is_synthetic());
    assert!(outcome.context.history().contains(&RunState::FallingBack));
    assert_eq!(outcome.context.state(), RunState::Ready);
    assert!(outcome.context.fallback_reason().unwrap().contains("no scenes found"));

    let dates: Vec<NaiveDate> = outcome.series.dates().collect();
    assert_eq!(dates.first(), Some(&NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
    assert_eq!(dates.len(), 5);
    assert!(dates.windows(2).all(|w| (w[1] - w[0]).num_days() == 7));

    let files = outcome.files.unwrap();
    let csv = fs::read_to_string(&files.csv).unwrap();
    assert!(csv.starts_with("date,NDVI,note"));
    assert!(csv.lines().skip(1).all(|l| l.contains("fallback_demo: ")));
    let geojson = fs::read_to_string(&files.geojson).unwrap();
    assert!(geojson.contains("\"synthetic\": true"));
}

#[tokio::test]
async fn malformed_bbox_fails_before_search() {
    let h = harness(Ok(june_scenes()), true);
    let request = RunRequest::new("1,2,3", "2024-06-01", "2024-06-30", "10");

    match h.pipeline.try_run(&request).await {
        Err(failure) => {
            assert!(matches!(failure.error, Error::Configuration { field: "bbox", .. }));
            assert_eq!(failure.context.history(), vec![RunState::Validating, RunState::Failed]);
        }
        Ok(outcome) => panic!("expected a configuration error, got {outcome:?}"),
    }
    assert_eq!(h.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn catalog_outage_falls_back() {
    let h = harness(Err("connection refused".into()), true);
    let outcome = h.pipeline.run(&june()).await.unwrap();
    assert!(outcome.is_synthetic());
    assert!(outcome.context.fallback_reason().unwrap().contains("connection refused"));
    assert_eq!(h.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fallback_disabled_surfaces_the_error() {
    let h = harness(Ok(Vec::new()), false);
    let err = h.pipeline.run(&june()).await.unwrap_err();
    assert!(matches!(err, Error::NoScenesFound { .. }));
}

#[tokio::test]
async fn unknown_band_vocabulary_is_fatal() {
    let h = harness(Ok(vec![scene("L9_20240605", 5, &["SR_B4", "SR_B5"])]), true);
    match h.pipeline.run(&june()).await {
        Err(Error::BandNotFound { observed }) => assert_eq!(observed, vec!["SR_B4", "SR_B5"]),
        other => panic!("expected BandNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn no_loadable_scene_falls_back() {
    let scenes = vec![
        scene("S2A_corrupt_0603", 3, &["B04", "B08"]),
        scene("S2B_20240608", 8, &["B04"]),
    ];
    let h = harness(Ok(scenes), true);
    let outcome = h.pipeline.run(&june()).await.unwrap();

    assert!(outcome.is_synthetic());
    let skipped: Vec<&str> = outcome.context.skipped().iter().map(|s| s.scene_id.as_str()).collect();
    assert_eq!(skipped, vec!["S2A_corrupt_0603", "S2B_20240608"]);
    assert!(outcome.context.skipped()[0].reason.contains("truncated tile"));
    assert!(outcome.context.fallback_reason().unwrap().contains("none of the 2 scenes"));
    assert_eq!(
        outcome.context.history(),
        vec![
            RunState::Validating,
            RunState::Searching,
            RunState::BandResolving,
            RunState::Loading,
            RunState::FallingBack,
            RunState::Ready,
        ]
    );
}

#[tokio::test]
async fn duplicate_dates_keep_the_first_scene() {
    let scenes = vec![
        scene("S2A_20240618_T20LNQ", 18, &["B04", "B08"]),
        scene("S2A_20240603", 3, &["B04", "B08"]),
        scene("S2A_20240618_T20LNR", 18, &["B04", "B08"]),
    ];
    let h = harness(Ok(scenes), true);
    let outcome = h.pipeline.run(&june()).await.unwrap();

    assert_eq!(outcome.series.len(), 2);
    assert_eq!(outcome.series.first_date(), NaiveDate::from_ymd_opt(2024, 6, 3));
    assert_eq!(outcome.series.last_date(), NaiveDate::from_ymd_opt(2024, 6, 18));
    // T20LNQ: (0.4 - 0.2) / (0.4 + 0.2); T20LNR would give (0.4 - 0.3) / (0.4 + 0.3)
    assert_abs_diff_eq!(outcome.series.points()[1].value.unwrap(), 1.0 / 3.0, epsilon = 1e-4);
}

#[tokio::test]
async fn later_duplicate_wins_when_listed_first() {
    let scenes = vec![
        scene("S2A_20240618_T20LNR", 18, &["B04", "B08"]),
        scene("S2A_20240618_T20LNQ", 18, &["B04", "B08"]),
    ];
    let h = harness(Ok(scenes), true);
    let outcome = h.pipeline.run(&june()).await.unwrap();

    assert_eq!(outcome.series.len(), 1);
    assert_abs_diff_eq!(outcome.series.points()[0].value.unwrap(), 1.0 / 7.0, epsilon = 1e-4);
}

#[tokio::test]
async fn demo_runs_are_deterministic() {
    let a = harness(Ok(Vec::new()), true).pipeline.run(&june()).await.unwrap();
    let b = harness(Ok(Vec::new()), true).pipeline.run(&june()).await.unwrap();
    assert_eq!(a.series, b.series);
}
