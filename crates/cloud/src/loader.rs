//! Per-scene band loading onto a common grid.
//!
//! Each scene is loaded independently; a failure skips that scene only.
//! Scenes are fetched concurrently but stacked in catalog order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use ndarray::Array2;
use saag_core::{BBox, BandSlice, RasterCube, Scene, SkippedScene, TargetGrid, WGS84_EPSG};

use crate::cog_reader::{CogReader, CogReaderOptions};
use crate::error::{CloudError, Result};
use crate::reproject;
use crate::resample::resample_nearest;

/// Scenes loaded at the same time by default.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Reads one asset of a scene onto a target grid.
#[async_trait]
pub trait BandSource: Send + Sync {
    /// The asset `key` of `scene`, clipped and resampled onto `grid`.
    /// No-data pixels are NaN.
    async fn read_band(&self, scene: &Scene, key: &str, grid: &TargetGrid) -> Result<Array2<f32>>;
}

/// [`BandSource`] reading COG assets over HTTP.
#[derive(Clone, Default)]
pub struct CogBandSource {
    options: CogReaderOptions,
}

impl CogBandSource {
    pub fn new(options: CogReaderOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BandSource for CogBandSource {
    async fn read_band(&self, scene: &Scene, key: &str, grid: &TargetGrid) -> Result<Array2<f32>> {
        let asset = scene.asset(key).ok_or_else(|| CloudError::MissingAsset { key: key.to_string() })?;
        let mut reader = CogReader::open(&asset.href, self.options.clone()).await?;
        let epsg = reader.epsg()?;

        let native = reproject::transform_bbox(&grid.extent(), grid.epsg, epsg)?;
        let native_cell = native.width() / grid.cols.max(1) as f64;
        let level = reader.level_for_cell_size(native_cell);

        let window = reader.read_window(&native, level).await?;
        tracing::debug!(
            scene = %scene.id,
            band = key,
            level,
            window = ?window.shape(),
            "Read band window"
        );
        resample_nearest(&window, grid)
    }
}

/// What happened to one scene.
#[derive(Debug, Clone)]
pub enum SceneOutcome {
    Loaded(BandSlice),
    Skipped(SkippedScene),
}

/// The stacked cube plus every scene that did not make it in.
///
/// `cube` is `None` when no scene loaded; the skips are kept either way.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub cube: Option<RasterCube>,
    pub skipped: Vec<SkippedScene>,
    pub attempted: usize,
}

impl LoadOutcome {
    /// The cube, or `NoUsableScenes` listing every skip reason, alongside the
    /// skipped scenes.
    pub fn into_parts(self) -> (saag_core::Result<RasterCube>, Vec<SkippedScene>) {
        let cube = self.cube.ok_or_else(|| saag_core::Error::NoUsableScenes {
            attempted: self.attempted,
            reasons: self.skipped.iter().map(ToString::to_string).collect(),
        });
        (cube, self.skipped)
    }
}

/// Loads RED/NIR for a list of scenes onto one grid.
#[derive(Clone)]
pub struct RasterLoader {
    source: Arc<dyn BandSource>,
    fetch_concurrency: usize,
}

impl RasterLoader {
    pub fn new(source: Arc<dyn BandSource>) -> Self {
        Self {
            source,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    /// At least one scene is always in flight.
    pub fn with_fetch_concurrency(mut self, n: usize) -> Self {
        self.fetch_concurrency = n.max(1);
        self
    }

    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency
    }

    /// Load one scene. Never fails: errors become a skip record.
    pub async fn load_scene(&self, scene: &Scene, red_key: &str, nir_key: &str, grid: &TargetGrid) -> SceneOutcome {
        let skip = |reason: String| {
            tracing::warn!(scene = %scene.id, date = %scene.acquisition_date(), "Skipping scene: {reason}");
            SceneOutcome::Skipped(SkippedScene {
                scene_id: scene.id.clone(),
                acquired: scene.acquired,
                reason,
            })
        };

        if let Some(key) = [red_key, nir_key].into_iter().find(|k| scene.asset(k).is_none()) {
            return skip(CloudError::MissingAsset { key: key.to_string() }.to_string());
        }

        let bands = futures::try_join!(
            self.source.read_band(scene, red_key, grid),
            self.source.read_band(scene, nir_key, grid),
        );
        match bands {
            Ok((red, nir)) if red.dim() == grid.shape() && nir.dim() == grid.shape() => {
                SceneOutcome::Loaded(BandSlice {
                    scene_id: scene.id.clone(),
                    acquired: scene.acquired,
                    red,
                    nir,
                })
            }
            Ok((red, _)) => skip(format!("band shape {:?} does not match grid {:?}", red.dim(), grid.shape())),
            Err(e) => skip(e.to_string()),
        }
    }

    /// Load every scene, keeping catalog order in the cube.
    ///
    /// Only stacking the loaded slices can fail; a run where no scene loads
    /// comes back with `cube: None`.
    pub async fn load(
        &self,
        scenes: &[Scene],
        red_key: &str,
        nir_key: &str,
        grid: TargetGrid,
    ) -> saag_core::Result<LoadOutcome> {
        let grid_ref = &grid;
        let pending: Vec<BoxFuture<'_, (usize, SceneOutcome)>> = scenes
            .iter()
            .enumerate()
            .map(|(idx, scene)| {
                async move { (idx, self.load_scene(scene, red_key, nir_key, grid_ref).await) }.boxed()
            })
            .collect();
        let mut outcomes: Vec<(usize, SceneOutcome)> =
            stream::iter(pending).buffer_unordered(self.fetch_concurrency).collect().await;
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut slices = Vec::new();
        let mut skipped = Vec::new();
        for (_, outcome) in outcomes {
            match outcome {
                SceneOutcome::Loaded(slice) => slices.push(slice),
                SceneOutcome::Skipped(s) => skipped.push(s),
            }
        }

        tracing::info!(loaded = slices.len(), skipped = skipped.len(), "Scenes loaded");
        let cube = if slices.is_empty() {
            None
        } else {
            Some(RasterCube::from_slices(grid, slices)?)
        };
        Ok(LoadOutcome {
            cube,
            skipped,
            attempted: scenes.len(),
        })
    }
}

/// Grid for a run: the AOI in the native CRS of the first scene reporting a
/// supported one, WGS84 otherwise.
pub fn grid_for_scenes(aoi: &BBox, scenes: &[Scene], resolution_m: u32) -> saag_core::Result<TargetGrid> {
    let epsg = scenes
        .iter()
        .filter_map(|s| s.epsg)
        .find(|&e| reproject::is_supported(e))
        .unwrap_or(WGS84_EPSG);

    let extent = reproject::transform_bbox(aoi, WGS84_EPSG, epsg)
        .map_err(|e| saag_core::Error::config("bbox", aoi.to_string(), e.to_string()))?;
    TargetGrid::for_resolution(&extent, epsg, resolution_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use saag_core::AssetAccess;
    use std::time::Duration;

    /// Fills RED with 0.1 and NIR with 0.5; fails scenes whose id contains "bad".
    /// Earlier scenes answer more slowly so completion order is reversed.
    struct FakeSource;

    #[async_trait]
    impl BandSource for FakeSource {
        async fn read_band(&self, scene: &Scene, key: &str, grid: &TargetGrid) -> Result<Array2<f32>> {
            let day = scene.acquisition_date().format("%d").to_string().parse::<u64>().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(30u64.saturating_sub(day))).await;
            if scene.id.contains("bad") {
                return Err(CloudError::InvalidTiff { reason: "corrupt".into() });
            }
            let value = if key == "B04" { 0.1 } else { 0.5 };
            Ok(Array2::from_elem(grid.shape(), value))
        }
    }

    fn scene(id: &str, day: u32, keys: &[&str]) -> Scene {
        let acquired = Utc.with_ymd_and_hms(2024, 6, day, 14, 0, 0).unwrap();
        keys.iter().fold(Scene::new(id, acquired).with_epsg(32720), |s, k| {
            s.with_asset(*k, AssetAccess::new(format!("https://x/{id}/{k}.tif")))
        })
    }

    fn grid() -> TargetGrid {
        TargetGrid::covering(&BBox::new(0.0, 0.0, 40.0, 40.0), 32720, 10.0).unwrap()
    }

    fn loader() -> RasterLoader {
        RasterLoader::new(Arc::new(FakeSource)).with_fetch_concurrency(4)
    }

    #[tokio::test]
    async fn keeps_catalog_order_and_records_skips() {
        let scenes = vec![
            scene("a", 3, &["B04", "B08"]),
            scene("b", 8, &["B04"]),
            scene("c_bad", 13, &["B04", "B08"]),
            scene("d", 18, &["B04", "B08"]),
        ];
        let outcome = loader().load(&scenes, "B04", "B08", grid()).await.unwrap();
        assert_eq!(outcome.attempted, 4);

        let cube = outcome.cube.as_ref().unwrap();
        assert_eq!(cube.scene_ids(), &["a".to_string(), "d".to_string()]);
        assert_eq!(cube.red().dim(), (2, 4, 4));
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(outcome.skipped[0].scene_id, "b");
        assert!(outcome.skipped[0].reason.contains("B08"));
        assert_eq!(outcome.skipped[1].scene_id, "c_bad");
    }

    #[tokio::test]
    async fn no_loaded_scene_keeps_the_skips() {
        let scenes = vec![scene("x_bad", 3, &["B04", "B08"]), scene("y", 5, &["red"])];
        let outcome = loader().load(&scenes, "B04", "B08", grid()).await.unwrap();
        assert!(outcome.cube.is_none());

        let (cube, skipped) = outcome.into_parts();
        let ids: Vec<&str> = skipped.iter().map(|s| s.scene_id.as_str()).collect();
        assert_eq!(ids, vec!["x_bad", "y"]);
        match cube.unwrap_err() {
            saag_core::Error::NoUsableScenes { attempted, reasons } => {
                assert_eq!(attempted, 2);
                assert_eq!(reasons.len(), 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    /// `load` as an `#[async_trait]` method body would await it.
    fn boxed_load<'a>(
        loader: &'a RasterLoader,
        scenes: &'a [Scene],
        grid: TargetGrid,
    ) -> BoxFuture<'a, saag_core::Result<LoadOutcome>> {
        async move { loader.load(scenes, "B04", "B08", grid).await }.boxed()
    }

    #[tokio::test]
    async fn load_runs_inside_a_send_future() {
        let loader = loader();
        let scenes = vec![scene("a", 3, &["B04", "B08"]), scene("b", 8, &["B04", "B08"])];
        let outcome = boxed_load(&loader, &scenes, grid()).await.unwrap();
        assert_eq!(outcome.cube.map(|c| c.len()), Some(2));
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn concurrency_is_at_least_one() {
        assert_eq!(RasterLoader::new(Arc::new(FakeSource)).with_fetch_concurrency(0).fetch_concurrency(), 1);
        assert_eq!(RasterLoader::new(Arc::new(FakeSource)).fetch_concurrency(), DEFAULT_FETCH_CONCURRENCY);
    }

    #[test]
    fn grid_follows_first_scene_crs() {
        let aoi = BBox::new(-63.95, -8.85, -63.80, -8.75);
        let scenes = vec![scene("a", 3, &[])];
        let grid = grid_for_scenes(&aoi, &scenes, 10).unwrap();
        assert_eq!(grid.epsg, 32720);
        assert_eq!(grid.cell_size(), 10.0);
        // ~16.5 km wide at 10 m
        assert!(grid.cols > 1500 && grid.cols < 1800);
    }

    #[test]
    fn grid_falls_back_to_wgs84() {
        let aoi = BBox::new(-63.95, -8.85, -63.80, -8.75);
        let undeclared = Scene::new("z", Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap());
        let grid = grid_for_scenes(&aoi, &[undeclared], 10).unwrap();
        assert_eq!(grid.epsg, WGS84_EPSG);
    }
}
