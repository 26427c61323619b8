//! Tile grid math for COG files.
//!
//! Maps bounding boxes in the raster's CRS to tile indices and the pixel
//! window they cover, and picks the overview level for a target resolution.

use saag_core::{BBox, GeoTransform};

use crate::ifd::IfdInfo;

/// Relative slack when comparing an overview's pixel size to the target.
const RESOLUTION_TOLERANCE: f64 = 1e-6;

/// Image and tile dimensions of one IFD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl TileLayout {
    pub fn tiles_across(&self) -> usize {
        (self.width as usize).div_ceil(self.tile_width as usize)
    }

    pub fn tiles_down(&self) -> usize {
        (self.height as usize).div_ceil(self.tile_height as usize)
    }
}

impl From<&IfdInfo> for TileLayout {
    fn from(ifd: &IfdInfo) -> Self {
        Self {
            width: ifd.width,
            height: ifd.height,
            tile_width: ifd.tile_width,
            tile_height: ifd.tile_height,
        }
    }
}

/// Descriptor for a tile that needs to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRequest {
    /// Linear tile index in the TIFF tile array.
    pub tile_idx: usize,
    pub tile_col: usize,
    pub tile_row: usize,
}

/// Result of mapping a bbox to the tile grid.
#[derive(Debug, Clone)]
pub struct TileMapping {
    /// Tiles that need to be fetched, row-major.
    pub tiles: Vec<TileRequest>,
    /// Pixel range in the image: (min_col, min_row, max_col_exclusive, max_row_exclusive).
    pub pixel_window: (usize, usize, usize, usize),
    /// Window dimensions (rows, cols).
    pub output_shape: (usize, usize),
}

/// Tiles and pixel window covering `bbox`, or `None` when the bbox misses
/// the image.
pub fn tiles_for_bbox(bbox: &BBox, geo_transform: &GeoTransform, layout: TileLayout) -> Option<TileMapping> {
    let iw = layout.width as usize;
    let ih = layout.height as usize;
    let tw = layout.tile_width as usize;
    let th = layout.tile_height as usize;
    if tw == 0 || th == 0 {
        return None;
    }

    // North-up: max_y is the top row
    let (col_a, row_a) = geo_transform.geo_to_pixel(bbox.min_x, bbox.max_y);
    let (col_b, row_b) = geo_transform.geo_to_pixel(bbox.max_x, bbox.min_y);

    let clamp = |v: f64, hi: usize| -> usize {
        if v.is_nan() || v <= 0.0 {
            0
        } else {
            (v as usize).min(hi)
        }
    };
    let min_col = clamp(col_a.min(col_b).floor(), iw);
    let max_col = clamp(col_a.max(col_b).ceil(), iw);
    let min_row = clamp(row_a.min(row_b).floor(), ih);
    let max_row = clamp(row_a.max(row_b).ceil(), ih);

    if min_col >= max_col || min_row >= max_row {
        return None;
    }

    let tiles_across = layout.tiles_across();
    let tile_col_max = max_col.div_ceil(tw).min(tiles_across);
    let tile_row_max = max_row.div_ceil(th).min(layout.tiles_down());

    let mut tiles = Vec::new();
    for tile_row in min_row / th..tile_row_max {
        for tile_col in min_col / tw..tile_col_max {
            tiles.push(TileRequest {
                tile_idx: tile_row * tiles_across + tile_col,
                tile_col,
                tile_row,
            });
        }
    }

    Some(TileMapping {
        tiles,
        pixel_window: (min_col, min_row, max_col, max_row),
        output_shape: (max_row - min_row, max_col - min_col),
    })
}

/// Index of the coarsest level whose pixel size does not exceed
/// `target_cell_size`.
///
/// `cell_sizes` lists the pixel size of each IFD, full resolution first.
/// Falls back to full resolution when the target is finer than every level.
pub fn select_overview(cell_sizes: &[f64], target_cell_size: f64) -> usize {
    let limit = target_cell_size * (1.0 + RESOLUTION_TOLERANCE);
    cell_sizes
        .iter()
        .enumerate()
        .filter(|(_, &size)| size.is_finite() && size <= limit)
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map_or(0, |(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(width: u32, height: u32, tile: u32) -> TileLayout {
        TileLayout {
            width,
            height,
            tile_width: tile,
            tile_height: tile,
        }
    }

    #[test]
    fn window_inside_one_tile_row() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bbox = BBox::new(10.0, 10.0, 30.0, 30.0);

        let mapping = tiles_for_bbox(&bbox, &gt, layout(100, 100, 32)).unwrap();

        // cols 10..30, rows 70..90
        assert_eq!(mapping.pixel_window, (10, 70, 30, 90));
        assert_eq!(mapping.output_shape, (20, 20));
        let ids: Vec<usize> = mapping.tiles.iter().map(|t| t.tile_idx).collect();
        // rows 70..90 sit in tile row 2 (pixels 64..96), cols in tile col 0
        assert_eq!(ids, vec![8]);
    }

    #[test]
    fn window_crossing_tile_boundaries() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bbox = BBox::new(20.0, 40.0, 40.0, 70.0);

        let mapping = tiles_for_bbox(&bbox, &gt, layout(100, 100, 32)).unwrap();

        assert_eq!(mapping.pixel_window, (20, 30, 40, 60));
        let ids: Vec<usize> = mapping.tiles.iter().map(|t| t.tile_idx).collect();
        // rows 30..60 span tile rows 0 and 1, cols 20..40 span tile cols 0 and 1
        assert_eq!(ids, vec![0, 1, 4, 5]);
        assert_eq!((mapping.tiles[3].tile_row, mapping.tiles[3].tile_col), (1, 1));
    }

    #[test]
    fn test_tiles_for_bbox_clamps_to_image() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bbox = BBox::new(-50.0, 90.0, 10.0, 150.0);
        let mapping = tiles_for_bbox(&bbox, &gt, layout(100, 100, 32)).unwrap();
        assert_eq!(mapping.pixel_window, (0, 0, 10, 10));
        assert_eq!(mapping.tiles.len(), 1);
    }

    #[test]
    fn test_tiles_for_bbox_outside() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let bbox = BBox::new(200.0, 200.0, 300.0, 300.0);
        assert!(tiles_for_bbox(&bbox, &gt, layout(100, 100, 32)).is_none());
    }

    #[test]
    fn test_select_overview_by_resolution() {
        let sizes = [10.0, 20.0, 40.0, 80.0];
        assert_eq!(select_overview(&sizes, 10.0), 0);
        assert_eq!(select_overview(&sizes, 30.0), 1);
        assert_eq!(select_overview(&sizes, 40.0), 2);
        assert_eq!(select_overview(&sizes, 500.0), 3);
        // finer than the data: full resolution
        assert_eq!(select_overview(&sizes, 5.0), 0);
        assert_eq!(select_overview(&[], 10.0), 0);
    }
}
