//! GeoTIFF georeferencing from IFD tags.
//!
//! Reads ModelPixelScale + ModelTiepoint (or ModelTransformation), the EPSG
//! code from the GeoKeyDirectory, and GDAL_NODATA.

use saag_core::GeoTransform;

use crate::ifd::{tags, TagSet};

/// ProjectedCSTypeGeoKey
const PROJECTED_CS_TYPE: u64 = 3072;
/// GeographicTypeGeoKey
const GEOGRAPHIC_TYPE: u64 = 2048;
/// Value meaning "user-defined" in GeoKeys.
const USER_DEFINED: u64 = 32767;

/// Georeferencing of the full-resolution image.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffMeta {
    pub geo_transform: GeoTransform,
    pub epsg: Option<u32>,
    pub nodata: Option<f64>,
}

impl GeoTiffMeta {
    /// Extract from a tag set whose geo tags have been loaded.
    pub fn from_tags(tags: &TagSet) -> Self {
        Self {
            geo_transform: geotransform(tags),
            epsg: epsg(tags),
            nodata: nodata(tags),
        }
    }
}

fn geotransform(set: &TagSet) -> GeoTransform {
    let scale = set.f64_values(tags::MODEL_PIXEL_SCALE);
    let tiepoint = set.f64_values(tags::MODEL_TIEPOINT);

    if let (Some(scale), Some(tp)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tp.len() >= 6 {
            // Tiepoint maps raster (i, j) to model (x, y)
            return GeoTransform::new(
                tp[3] - tp[0] * scale[0],
                tp[4] + tp[1] * scale[1],
                scale[0],
                -scale[1],
            );
        }
    }

    // Row-major 4x4: x = t[3] + col*t[0] + row*t[1], y = t[7] + col*t[4] + row*t[5]
    if let Some(t) = set.f64_values(tags::MODEL_TRANSFORMATION) {
        if t.len() >= 16 {
            return GeoTransform {
                origin_x: t[3],
                origin_y: t[7],
                pixel_width: t[0],
                pixel_height: t[5],
                row_rotation: t[1],
                col_rotation: t[4],
            };
        }
    }

    GeoTransform::default()
}

fn epsg(set: &TagSet) -> Option<u32> {
    // [version, revision, minor, count, (key, location, count, value)...]
    let dir = set.u64_values(tags::GEO_KEY_DIRECTORY)?;
    if dir.len() < 4 {
        return None;
    }
    let keys = dir[4..].chunks_exact(4).take(dir[3] as usize);

    let mut geographic = None;
    for key in keys {
        // location 0 means the value is stored in the entry itself
        let (id, location, value) = (key[0], key[1], key[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            PROJECTED_CS_TYPE => return u32::try_from(value).ok(),
            GEOGRAPHIC_TYPE => geographic = u32::try_from(value).ok(),
            _ => {}
        }
    }
    geographic
}

fn nodata(set: &TagSet) -> Option<f64> {
    set.ascii(tags::GDAL_NODATA)?.trim().parse::<f64>().ok()
}
