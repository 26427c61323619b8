//! Core COG reader: open remote COGs, read band windows by bounding box.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesOrdered, StreamExt};
use ndarray::Array2;
use saag_core::{BBox, GeoTransform};

use crate::auth::{CloudAuth, NoAuth};
use crate::cache::{TileCache, TileKey, TileSamples};
use crate::decompress;
use crate::error::{CloudError, Result};
use crate::geotiff_keys::GeoTiffMeta;
use crate::http::{strip_query, HttpClient};
use crate::ifd::{self, tags, IfdInfo, TagSet, TiffByteOrder};
use crate::resample::BandWindow;
use crate::tile_index::{self, TileLayout, TileMapping};

/// First read of a COG; usually covers the header and every IFD.
const INITIAL_FETCH: u64 = 64 * 1024;
/// Guard against corrupt IFD chains.
const MAX_IFDS: usize = 32;
/// NewSubfileType bit marking a transparency mask.
const SUBFILE_MASK: u64 = 4;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Options for configuring a [`CogReader`].
#[derive(Clone)]
pub struct CogReaderOptions {
    /// Maximum number of concurrent tile fetches (default: 8).
    pub max_concurrent_fetches: usize,
    /// Number of decoded tiles to keep in the LRU cache (default: 64).
    pub cache_capacity: usize,
    /// Timeout per HTTP request (default: 30 s).
    pub request_timeout: Duration,
    /// Authentication provider (default: [`NoAuth`]).
    pub auth: Arc<dyn CloudAuth>,
}

impl Default for CogReaderOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            cache_capacity: 64,
            request_timeout: Duration::from_secs(30),
            auth: Arc::new(NoAuth),
        }
    }
}

/// Metadata exposed by [`CogReader::metadata`].
#[derive(Debug, Clone)]
pub struct CogMetadata {
    pub location: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub predictor: u16,
    pub geo_transform: GeoTransform,
    pub epsg: Option<u32>,
    pub nodata: Option<f64>,
    pub num_overviews: usize,
}

/// Overview level information.
#[derive(Debug, Clone, PartialEq)]
pub struct OverviewInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub cell_size: f64,
}

/// Random access to the bytes of a remote or in-memory file.
#[async_trait]
pub trait RangeRead: Send + Sync {
    /// Up to `length` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Several ranges, results in request order.
    async fn read_ranges(&self, ranges: &[(u64, u64)]) -> Result<Vec<Vec<u8>>> {
        let mut futs: FuturesOrdered<_> = ranges
            .iter()
            .map(|&(offset, length)| self.read_range(offset, length))
            .collect();
        let mut out = Vec::with_capacity(ranges.len());
        while let Some(res) = futs.next().await {
            out.push(res?);
        }
        Ok(out)
    }

    /// Location for logs and metadata, without credentials.
    fn location(&self) -> String;
}

/// HTTP Range requests against a (possibly signed) URL.
pub struct HttpRangeSource {
    client: HttpClient,
    url: String,
    auth: Arc<dyn CloudAuth>,
}

impl HttpRangeSource {
    pub fn new(client: HttpClient, url: impl Into<String>, auth: Arc<dyn CloudAuth>) -> Self {
        Self {
            client,
            url: url.into(),
            auth,
        }
    }
}

#[async_trait]
impl RangeRead for HttpRangeSource {
    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.client
            .fetch_range(&self.url, offset, length, self.auth.as_ref())
            .await
    }

    async fn read_ranges(&self, ranges: &[(u64, u64)]) -> Result<Vec<Vec<u8>>> {
        self.client
            .fetch_ranges(&self.url, ranges, self.auth.as_ref())
            .await
    }

    fn location(&self) -> String {
        strip_query(&self.url).to_string()
    }
}

/// A file already held in memory.
pub struct MemorySource {
    name: String,
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[async_trait]
impl RangeRead for MemorySource {
    async fn read_range(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start >= self.bytes.len() {
            return Err(CloudError::InvalidTiff {
                reason: format!("read at {offset} past end of {} byte file", self.bytes.len()),
            });
        }
        let end = start.saturating_add(length as usize).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }

    fn location(&self) -> String {
        self.name.clone()
    }
}

/// Cloud Optimized GeoTIFF reader.
///
/// Reads tiles on demand via range reads with LRU caching. The cache lives
/// and dies with the reader.
pub struct CogReader {
    source: Box<dyn RangeRead>,
    byte_order: TiffByteOrder,
    ifds: Vec<IfdInfo>,
    geo_meta: GeoTiffMeta,
    cache: TileCache,
    max_concurrent_fetches: usize,
}

// ---------------------------------------------------------------------------
// Implementation
// ---------------------------------------------------------------------------

impl CogReader {
    /// Open a remote COG by URL.
    pub async fn open(url: &str, options: CogReaderOptions) -> Result<Self> {
        let client = HttpClient::new(options.request_timeout)?;
        let source = HttpRangeSource::new(client, url, Arc::clone(&options.auth));
        Self::from_source(Box::new(source), &options).await
    }

    /// Open a COG from any byte source.
    ///
    /// Parses the header and the whole IFD chain (full resolution first, then
    /// overviews), fetching out-of-line tag values that the initial read did
    /// not cover. Mask IFDs are skipped.
    pub async fn from_source(source: Box<dyn RangeRead>, options: &CogReaderOptions) -> Result<Self> {
        let prefix = source.read_range(0, INITIAL_FETCH).await?;
        let header = ifd::parse_header(&prefix)?;
        let byte_order = header.byte_order;

        let mut ifds = Vec::new();
        let mut geo_meta = None;
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset as u64;

        while offset != 0 {
            if !seen.insert(offset) || seen.len() > MAX_IFDS {
                return Err(CloudError::InvalidTiff {
                    reason: "IFD chain loops or is too long".into(),
                });
            }

            let count_bytes = read_at(source.as_ref(), &prefix, offset, 2).await?;
            let entry_count = ifd::ifd_entry_count(byte_order, &count_bytes)?;
            let ifd_len = ifd::ifd_byte_len(entry_count) as u64;
            let ifd_bytes = read_at(source.as_ref(), &prefix, offset, ifd_len).await?;
            let raw = ifd::parse_ifd(byte_order, &ifd_bytes)?;

            let full_resolution = geo_meta.is_none();
            let mut tag_set = TagSet::new(byte_order, raw.entries);
            let wanted: Vec<u16> = if full_resolution {
                tags::STRUCTURE.iter().chain(tags::GEO).copied().collect()
            } else {
                tags::STRUCTURE.to_vec()
            };
            for (tag, value_offset, len) in tag_set.pending_external(&wanted) {
                let bytes = read_at(source.as_ref(), &prefix, value_offset, len).await?;
                tag_set.insert_external(tag, bytes);
            }

            let is_mask = tag_set.u64_value(tags::NEW_SUBFILE_TYPE).unwrap_or(0) & SUBFILE_MASK != 0;
            if full_resolution {
                ifds.push(IfdInfo::from_tags(&tag_set)?);
                geo_meta = Some(GeoTiffMeta::from_tags(&tag_set));
            } else if is_mask {
                tracing::debug!(location = %source.location(), "Skipping mask IFD");
            } else {
                match IfdInfo::from_tags(&tag_set) {
                    Ok(info) => ifds.push(info),
                    Err(e) => tracing::debug!(location = %source.location(), "Skipping overview: {e}"),
                }
            }

            offset = raw.next_ifd_offset as u64;
        }

        let geo_meta = geo_meta.ok_or(CloudError::NoIfd)?;
        tracing::debug!(
            location = %source.location(),
            width = ifds[0].width,
            height = ifds[0].height,
            overviews = ifds.len() - 1,
            epsg = ?geo_meta.epsg,
            "Opened COG"
        );

        Ok(Self {
            source,
            byte_order,
            ifds,
            geo_meta,
            cache: TileCache::new(options.cache_capacity),
            max_concurrent_fetches: options.max_concurrent_fetches.max(1),
        })
    }

    /// Return metadata about the COG.
    pub fn metadata(&self) -> CogMetadata {
        let ifd = &self.ifds[0];
        CogMetadata {
            location: self.source.location(),
            width: ifd.width,
            height: ifd.height,
            tile_width: ifd.tile_width,
            tile_height: ifd.tile_height,
            bits_per_sample: ifd.bits_per_sample,
            sample_format: ifd.sample_format,
            compression: ifd.compression,
            predictor: ifd.predictor,
            geo_transform: self.geo_meta.geo_transform,
            epsg: self.geo_meta.epsg,
            nodata: self.geo_meta.nodata,
            num_overviews: self.ifds.len() - 1,
        }
    }

    /// Return overview information (full resolution excluded).
    pub fn overviews(&self) -> Vec<OverviewInfo> {
        self.ifds
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, ifd)| OverviewInfo {
                index,
                width: ifd.width,
                height: ifd.height,
                cell_size: self.geo_transform_for(index).cell_size(),
            })
            .collect()
    }

    /// EPSG code of the raster's CRS.
    pub fn epsg(&self) -> Result<u32> {
        self.geo_meta.epsg.ok_or(CloudError::MissingCrs)
    }

    /// Pixel size of every level, full resolution first.
    pub fn cell_sizes(&self) -> Vec<f64> {
        (0..self.ifds.len())
            .map(|idx| self.geo_transform_for(idx).cell_size())
            .collect()
    }

    /// Coarsest level whose pixel size does not exceed `cell_size`.
    pub fn level_for_cell_size(&self, cell_size: f64) -> usize {
        tile_index::select_overview(&self.cell_sizes(), cell_size)
    }

    /// Read the part of level `level` (0 = full resolution) covering `bbox`.
    ///
    /// `bbox` is in the raster's CRS. No-data samples come back as NaN.
    pub async fn read_window(&mut self, bbox: &BBox, level: usize) -> Result<BandWindow> {
        let ifd = self.ifds.get(level).cloned().ok_or_else(|| CloudError::InvalidTiff {
            reason: format!("level {} out of range (have {})", level, self.ifds.len()),
        })?;
        let epsg = self.epsg()?;
        let gt = self.geo_transform_for(level);

        let mapping =
            tile_index::tiles_for_bbox(bbox, &gt, TileLayout::from(&ifd)).ok_or(CloudError::BBoxOutside)?;

        let tiles = self.load_tiles(level, &ifd, &mapping).await?;
        let data = assemble_window(&ifd, &mapping, &tiles, self.geo_meta.nodata);

        let (min_col, min_row, _, _) = mapping.pixel_window;
        let (origin_x, origin_y) = gt.pixel_corner(min_col, min_row);
        Ok(BandWindow {
            data,
            transform: GeoTransform {
                origin_x,
                origin_y,
                ..gt
            },
            epsg,
        })
    }

    /// Number of decoded tiles currently cached.
    pub fn cached_tiles(&self) -> usize {
        self.cache.len()
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn geo_transform_for(&self, level: usize) -> GeoTransform {
        let full = &self.ifds[0];
        match self.ifds.get(level) {
            Some(ovr) if level > 0 => self.geo_meta.geo_transform.scaled(
                full.width as f64 / ovr.width as f64,
                full.height as f64 / ovr.height as f64,
            ),
            _ => self.geo_meta.geo_transform,
        }
    }

    /// Decoded samples for every tile of `mapping` that has data.
    ///
    /// Tiles with a zero byte count are sparse and stay absent.
    async fn load_tiles(
        &mut self,
        level: usize,
        ifd: &IfdInfo,
        mapping: &TileMapping,
    ) -> Result<HashMap<usize, TileSamples>> {
        let mut tiles = HashMap::with_capacity(mapping.tiles.len());
        let mut to_fetch = Vec::new();

        for tile in &mapping.tiles {
            let key = TileKey {
                ifd_idx: level,
                tile_idx: tile.tile_idx,
            };
            if let Some(samples) = self.cache.get(&key) {
                tiles.insert(tile.tile_idx, samples);
                continue;
            }
            let offset = ifd.tile_offsets.get(tile.tile_idx).copied();
            let length = ifd.tile_byte_counts.get(tile.tile_idx).copied();
            match (offset, length) {
                (Some(offset), Some(length)) if length > 0 => to_fetch.push((tile.tile_idx, offset, length)),
                (None, _) | (_, None) => {
                    return Err(CloudError::TileOutOfRange {
                        tile_idx: tile.tile_idx,
                        max: ifd.tile_offsets.len(),
                    })
                }
                _ => {}
            }
        }

        for chunk in to_fetch.chunks(self.max_concurrent_fetches) {
            let ranges: Vec<(u64, u64)> = chunk.iter().map(|&(_, o, l)| (o, l)).collect();
            let fetched = self.source.read_ranges(&ranges).await?;

            for (&(tile_idx, _, _), bytes) in chunk.iter().zip(fetched) {
                let samples: TileSamples = Arc::new(decompress::decode_tile(&bytes, self.byte_order, ifd)?);
                self.cache.insert(
                    TileKey {
                        ifd_idx: level,
                        tile_idx,
                    },
                    Arc::clone(&samples),
                );
                tiles.insert(tile_idx, samples);
            }
        }

        tracing::trace!(
            location = %self.source.location(),
            level,
            requested = mapping.tiles.len(),
            fetched = to_fetch.len(),
            "Loaded tiles"
        );
        Ok(tiles)
    }
}

/// Copy the first sample of each pixel in the window out of its tile.
///
/// Pixels of missing tiles and pixels equal to `nodata` are NaN.
fn assemble_window(
    ifd: &IfdInfo,
    mapping: &TileMapping,
    tiles: &HashMap<usize, TileSamples>,
    nodata: Option<f64>,
) -> Array2<f32> {
    let tw = ifd.tile_width as usize;
    let th = ifd.tile_height as usize;
    let spp = ifd.samples_per_pixel.max(1) as usize;
    let (min_col, min_row, max_col, max_row) = mapping.pixel_window;

    let mut output = Array2::from_elem(mapping.output_shape, f32::NAN);

    for tile in &mapping.tiles {
        let Some(samples) = tiles.get(&tile.tile_idx) else {
            continue;
        };
        let tile_col0 = tile.tile_col * tw;
        let tile_row0 = tile.tile_row * th;

        let rows = tile_row0.max(min_row)..(tile_row0 + th).min(max_row);
        let cols = tile_col0.max(min_col)..(tile_col0 + tw).min(max_col);
        for img_row in rows {
            for img_col in cols.clone() {
                let idx = ((img_row - tile_row0) * tw + (img_col - tile_col0)) * spp;
                let Some(&value) = samples.get(idx) else {
                    continue;
                };
                let is_nodata = nodata.is_some_and(|nd| value as f64 == nd);
                output[(img_row - min_row, img_col - min_col)] = if is_nodata { f32::NAN } else { value };
            }
        }
    }

    output
}

/// Slice from the initial read when it covers the range, else fetch.
async fn read_at(source: &dyn RangeRead, prefix: &[u8], offset: u64, length: u64) -> Result<Vec<u8>> {
    let start = offset as usize;
    match start.checked_add(length as usize) {
        Some(end) if end <= prefix.len() => Ok(prefix[start..end].to_vec()),
        _ => source.read_range(offset, length).await,
    }
}
