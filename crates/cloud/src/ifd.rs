//! TIFF IFD (Image File Directory) parsing for COG files.
//!
//! Works on byte slices fetched with Range requests, without `Read + Seek`.
//! A [`TagSet`] holds the entries of one IFD together with the out-of-line
//! values fetched so far, and decodes inline and external values the same way.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CloudError, Result};

/// Byte order of the TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffByteOrder {
    LittleEndian,
    BigEndian,
}

/// TIFF tag IDs used by the reader.
pub mod tags {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GEO_DOUBLE_PARAMS: u16 = 34736;
    pub const GEO_ASCII_PARAMS: u16 = 34737;
    pub const GDAL_NODATA: u16 = 42113;

    /// Tags describing the pixel layout of an IFD.
    pub const STRUCTURE: &[u16] = &[
        NEW_SUBFILE_TYPE,
        IMAGE_WIDTH,
        IMAGE_LENGTH,
        BITS_PER_SAMPLE,
        COMPRESSION,
        SAMPLES_PER_PIXEL,
        PLANAR_CONFIG,
        PREDICTOR,
        TILE_WIDTH,
        TILE_LENGTH,
        TILE_OFFSETS,
        TILE_BYTE_COUNTS,
        SAMPLE_FORMAT,
    ];

    /// Georeferencing tags, read from the full-resolution IFD only.
    pub const GEO: &[u16] = &[
        MODEL_PIXEL_SCALE,
        MODEL_TIEPOINT,
        MODEL_TRANSFORMATION,
        GEO_KEY_DIRECTORY,
        GEO_DOUBLE_PARAMS,
        GEO_ASCII_PARAMS,
        GDAL_NODATA,
    ];
}

/// Byte size of one value of a TIFF field type.
fn type_byte_size(type_id: u16) -> Option<usize> {
    match type_id {
        1 | 2 | 6 | 7 => Some(1), // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => Some(2),         // SHORT, SSHORT
        4 | 9 | 11 => Some(4),    // LONG, SLONG, FLOAT
        5 | 10 | 12 | 16 => Some(8), // RATIONAL, SRATIONAL, DOUBLE, LONG8
        _ => None,
    }
}

/// One 12-byte IFD entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTagEntry {
    pub tag: u16,
    pub type_id: u16,
    pub count: u32,
    /// The 4-byte value field: the value itself when it fits, else an offset.
    pub value_field: [u8; 4],
}

impl RawTagEntry {
    /// Total size of the tag's value in bytes.
    pub fn byte_len(&self) -> u64 {
        type_byte_size(self.type_id).unwrap_or(1) as u64 * self.count as u64
    }

    pub fn is_inline(&self) -> bool {
        self.byte_len() <= 4
    }

    /// File offset of an out-of-line value.
    pub fn offset(&self, order: TiffByteOrder) -> u64 {
        read_u32(order, &self.value_field) as u64
    }
}

/// Parsed TIFF header.
#[derive(Debug, Clone)]
pub struct TiffHeader {
    pub byte_order: TiffByteOrder,
    pub first_ifd_offset: u32,
}

/// A single parsed IFD with the offset to the next one (0 = last).
#[derive(Debug, Clone)]
pub struct RawIfd {
    pub entries: Vec<RawTagEntry>,
    pub next_ifd_offset: u32,
}

/// Parse the 8-byte classic TIFF header.
pub fn parse_header(data: &[u8]) -> Result<TiffHeader> {
    if data.len() < 8 {
        return Err(CloudError::InvalidTiff {
            reason: "header too short".into(),
        });
    }

    let byte_order = match (data[0], data[1]) {
        (b'I', b'I') => TiffByteOrder::LittleEndian,
        (b'M', b'M') => TiffByteOrder::BigEndian,
        _ => {
            return Err(CloudError::InvalidTiff {
                reason: "invalid byte order marker".into(),
            });
        }
    };

    match read_u16(byte_order, &data[2..4]) {
        42 => {}
        43 => {
            return Err(CloudError::InvalidTiff {
                reason: "BigTIFF is not supported".into(),
            })
        }
        magic => {
            return Err(CloudError::InvalidTiff {
                reason: format!("expected magic 42, got {magic}"),
            })
        }
    }

    Ok(TiffHeader {
        byte_order,
        first_ifd_offset: read_u32(byte_order, &data[4..8]),
    })
}

/// Bytes needed to parse an IFD with `entry_count` entries.
pub fn ifd_byte_len(entry_count: usize) -> usize {
    2 + entry_count * 12 + 4
}

/// Number of entries announced by the first two bytes of an IFD.
pub fn ifd_entry_count(byte_order: TiffByteOrder, data: &[u8]) -> Result<usize> {
    if data.len() < 2 {
        return Err(CloudError::InvalidTiff {
            reason: "IFD too short".into(),
        });
    }
    Ok(read_u16(byte_order, &data[0..2]) as usize)
}

/// Parse one IFD. `data` must start at the IFD offset.
pub fn parse_ifd(byte_order: TiffByteOrder, data: &[u8]) -> Result<RawIfd> {
    let entry_count = ifd_entry_count(byte_order, data)?;
    let needed = ifd_byte_len(entry_count);
    if data.len() < needed {
        return Err(CloudError::InvalidTiff {
            reason: format!("IFD needs {} bytes but only {} available", needed, data.len()),
        });
    }

    let entries = data[2..2 + entry_count * 12]
        .chunks_exact(12)
        .map(|e| RawTagEntry {
            tag: read_u16(byte_order, &e[0..2]),
            type_id: read_u16(byte_order, &e[2..4]),
            count: read_u32(byte_order, &e[4..8]),
            value_field: [e[8], e[9], e[10], e[11]],
        })
        .collect();

    let next_pos = 2 + entry_count * 12;
    Ok(RawIfd {
        entries,
        next_ifd_offset: read_u32(byte_order, &data[next_pos..next_pos + 4]),
    })
}

/// Entries of one IFD plus the external values fetched for them.
#[derive(Debug, Clone)]
pub struct TagSet {
    byte_order: TiffByteOrder,
    entries: Vec<RawTagEntry>,
    external: HashMap<u16, Vec<u8>>,
}

impl TagSet {
    pub fn new(byte_order: TiffByteOrder, entries: Vec<RawTagEntry>) -> Self {
        Self {
            byte_order,
            entries,
            external: HashMap::new(),
        }
    }

    pub fn byte_order(&self) -> TiffByteOrder {
        self.byte_order
    }

    pub fn entry(&self, tag: u16) -> Option<&RawTagEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// `(tag, offset, length)` of out-of-line values among `wanted` not yet loaded.
    pub fn pending_external(&self, wanted: &[u16]) -> Vec<(u16, u64, u64)> {
        self.entries
            .iter()
            .filter(|e| wanted.contains(&e.tag) && !e.is_inline())
            .filter(|e| !self.external.contains_key(&e.tag))
            .map(|e| (e.tag, e.offset(self.byte_order), e.byte_len()))
            .collect()
    }

    pub fn insert_external(&mut self, tag: u16, bytes: Vec<u8>) {
        self.external.insert(tag, bytes);
    }

    fn value_bytes(&self, tag: u16) -> Option<(&RawTagEntry, &[u8])> {
        let entry = self.entry(tag)?;
        if entry.is_inline() {
            Some((entry, &entry.value_field[..]))
        } else {
            self.external.get(&tag).map(|b| (entry, b.as_slice()))
        }
    }

    /// Integer values of a BYTE/SHORT/LONG/LONG8 tag.
    pub fn u64_values(&self, tag: u16) -> Option<Vec<u64>> {
        let (entry, data) = self.value_bytes(tag)?;
        let size = match entry.type_id {
            1 => 1,
            3 => 2,
            4 => 4,
            16 => 8,
            _ => return None,
        };
        let values = data
            .chunks_exact(size)
            .take(entry.count as usize)
            .map(|c| match size {
                1 => c[0] as u64,
                2 => read_u16(self.byte_order, c) as u64,
                4 => read_u32(self.byte_order, c) as u64,
                _ => read_u64(self.byte_order, c),
            })
            .collect();
        Some(values)
    }

    pub fn u64_value(&self, tag: u16) -> Option<u64> {
        self.u64_values(tag).and_then(|v| v.first().copied())
    }

    /// Values of a FLOAT/DOUBLE tag.
    pub fn f64_values(&self, tag: u16) -> Option<Vec<f64>> {
        let (entry, data) = self.value_bytes(tag)?;
        let values: Vec<f64> = match entry.type_id {
            11 => data
                .chunks_exact(4)
                .take(entry.count as usize)
                .map(|c| read_f32(self.byte_order, c) as f64)
                .collect(),
            12 => data
                .chunks_exact(8)
                .take(entry.count as usize)
                .map(|c| read_f64(self.byte_order, c))
                .collect(),
            _ => return None,
        };
        Some(values)
    }

    /// NUL-terminated ASCII value.
    pub fn ascii(&self, tag: u16) -> Option<String> {
        let (entry, data) = self.value_bytes(tag)?;
        let bytes = &data[..(entry.count as usize).min(data.len())];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Pixel layout of one IFD.
#[derive(Debug, Clone)]
pub struct IfdInfo {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub predictor: u16,
    pub samples_per_pixel: u16,
    pub planar_config: u16,
}

impl IfdInfo {
    /// Build from a tag set whose structure tags have been loaded.
    pub fn from_tags(tags: &TagSet) -> Result<Self> {
        let width = tags.u64_value(tags::IMAGE_WIDTH).unwrap_or(0) as u32;
        let height = tags.u64_value(tags::IMAGE_LENGTH).unwrap_or(0) as u32;
        if width == 0 || height == 0 {
            return Err(CloudError::InvalidTiff {
                reason: "missing image dimensions".into(),
            });
        }

        let tile_offsets = tags.u64_values(tags::TILE_OFFSETS).unwrap_or_default();
        let tile_byte_counts = tags.u64_values(tags::TILE_BYTE_COUNTS).unwrap_or_default();
        if tile_offsets.is_empty() || tile_offsets.len() != tile_byte_counts.len() {
            return Err(CloudError::InvalidTiff {
                reason: "not a tiled TIFF (missing or inconsistent tile offsets)".into(),
            });
        }

        let info = Self {
            width,
            height,
            tile_width: tags.u64_value(tags::TILE_WIDTH).unwrap_or(width as u64) as u32,
            tile_height: tags.u64_value(tags::TILE_LENGTH).unwrap_or(height as u64) as u32,
            tile_offsets,
            tile_byte_counts,
            bits_per_sample: tags.u64_value(tags::BITS_PER_SAMPLE).unwrap_or(8) as u16,
            sample_format: tags.u64_value(tags::SAMPLE_FORMAT).unwrap_or(1) as u16,
            compression: tags.u64_value(tags::COMPRESSION).unwrap_or(1) as u16,
            predictor: tags.u64_value(tags::PREDICTOR).unwrap_or(1) as u16,
            samples_per_pixel: tags.u64_value(tags::SAMPLES_PER_PIXEL).unwrap_or(1) as u16,
            planar_config: tags.u64_value(tags::PLANAR_CONFIG).unwrap_or(1) as u16,
        };

        if info.samples_per_pixel != 1 && info.planar_config != 1 {
            return Err(CloudError::UnsupportedPlanarConfig(info.planar_config));
        }
        if info.tile_offsets.len() != info.tiles_across() * info.tiles_down() {
            return Err(CloudError::InvalidTiff {
                reason: format!(
                    "{} tile offsets for a {}x{} tile grid",
                    info.tile_offsets.len(),
                    info.tiles_across(),
                    info.tiles_down()
                ),
            });
        }
        Ok(info)
    }

    pub fn tiles_across(&self) -> usize {
        (self.width as usize).div_ceil(self.tile_width as usize)
    }

    pub fn tiles_down(&self) -> usize {
        (self.height as usize).div_ceil(self.tile_height as usize)
    }

    /// Decompressed size of one tile in bytes.
    pub fn raw_tile_size(&self) -> usize {
        let bytes_per_sample = (self.bits_per_sample as usize).div_ceil(8);
        self.tile_width as usize
            * self.tile_height as usize
            * self.samples_per_pixel as usize
            * bytes_per_sample
    }
}

// ---- Byte order helpers ----

fn read_u16(order: TiffByteOrder, data: &[u8]) -> u16 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u16(data),
        TiffByteOrder::BigEndian => BigEndian::read_u16(data),
    }
}

fn read_u32(order: TiffByteOrder, data: &[u8]) -> u32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u32(data),
        TiffByteOrder::BigEndian => BigEndian::read_u32(data),
    }
}

fn read_u64(order: TiffByteOrder, data: &[u8]) -> u64 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u64(data),
        TiffByteOrder::BigEndian => BigEndian::read_u64(data),
    }
}

fn read_f32(order: TiffByteOrder, data: &[u8]) -> f32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_f32(data),
        TiffByteOrder::BigEndian => BigEndian::read_f32(data),
    }
}

fn read_f64(order: TiffByteOrder, data: &[u8]) -> f64 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_f64(data),
        TiffByteOrder::BigEndian => BigEndian::read_f64(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_le(tag: u16, type_id: u16, count: u32, value: u32) -> Vec<u8> {
        let mut e = Vec::new();
        e.extend_from_slice(&tag.to_le_bytes());
        e.extend_from_slice(&type_id.to_le_bytes());
        e.extend_from_slice(&count.to_le_bytes());
        e.extend_from_slice(&value.to_le_bytes());
        e
    }

    #[test]
    fn test_parse_header() {
        let header = parse_header(&[b'I', b'I', 42, 0, 8, 0, 0, 0]).unwrap();
        assert_eq!(header.byte_order, TiffByteOrder::LittleEndian);
        assert_eq!(header.first_ifd_offset, 8);

        let header = parse_header(&[b'M', b'M', 0, 42, 0, 0, 0, 8]).unwrap();
        assert_eq!(header.byte_order, TiffByteOrder::BigEndian);
        assert_eq!(header.first_ifd_offset, 8);

        assert!(parse_header(&[b'I', b'I', 43, 0, 8, 0, 0, 0]).is_err());
        assert!(parse_header(&[b'X', b'X', 42, 0]).is_err());
    }

    #[test]
    fn test_parse_ifd_truncated() {
        let mut data = 3u16.to_le_bytes().to_vec();
        data.extend(entry_le(256, 3, 1, 512));
        assert!(parse_ifd(TiffByteOrder::LittleEndian, &data).is_err());
    }

    #[test]
    fn test_inline_short_big_endian() {
        // SHORT 512 stored left-justified in the value field
        let mut data = vec![0, 1];
        data.extend_from_slice(&256u16.to_be_bytes());
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0x02, 0x00, 0, 0]);
        data.extend_from_slice(&0u32.to_be_bytes());

        let ifd = parse_ifd(TiffByteOrder::BigEndian, &data).unwrap();
        let tags = TagSet::new(TiffByteOrder::BigEndian, ifd.entries);
        assert_eq!(tags.u64_value(256), Some(512));
    }

    #[test]
    fn test_tagset_external_values() {
        let mut data = 2u16.to_le_bytes().to_vec();
        data.extend(entry_le(tags::TILE_OFFSETS, 4, 2, 100));
        data.extend(entry_le(tags::IMAGE_WIDTH, 3, 1, 700));
        data.extend_from_slice(&0u32.to_le_bytes());

        let ifd = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        let mut set = TagSet::new(TiffByteOrder::LittleEndian, ifd.entries);

        assert_eq!(set.u64_value(tags::IMAGE_WIDTH), Some(700));
        assert_eq!(set.u64_values(tags::TILE_OFFSETS), None);
        assert_eq!(
            set.pending_external(tags::STRUCTURE),
            vec![(tags::TILE_OFFSETS, 100, 8)]
        );

        let mut ext = Vec::new();
        ext.extend_from_slice(&4096u32.to_le_bytes());
        ext.extend_from_slice(&9000u32.to_le_bytes());
        set.insert_external(tags::TILE_OFFSETS, ext);

        assert_eq!(set.u64_values(tags::TILE_OFFSETS), Some(vec![4096, 9000]));
        assert!(set.pending_external(tags::STRUCTURE).is_empty());
    }

    #[test]
    fn test_ifd_info_requires_tiles() {
        let mut data = 2u16.to_le_bytes().to_vec();
        data.extend(entry_le(tags::IMAGE_WIDTH, 3, 1, 512));
        data.extend(entry_le(tags::IMAGE_LENGTH, 3, 1, 512));
        data.extend_from_slice(&0u32.to_le_bytes());
        let ifd = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        let set = TagSet::new(TiffByteOrder::LittleEndian, ifd.entries);
        assert!(IfdInfo::from_tags(&set).is_err());
    }

    #[test]
    fn test_ifd_info_tile_grid() {
        let mut data = 6u16.to_le_bytes().to_vec();
        data.extend(entry_le(tags::IMAGE_WIDTH, 3, 1, 600));
        data.extend(entry_le(tags::IMAGE_LENGTH, 3, 1, 300));
        data.extend(entry_le(tags::BITS_PER_SAMPLE, 3, 1, 16));
        data.extend(entry_le(tags::TILE_WIDTH, 3, 1, 256));
        data.extend(entry_le(tags::TILE_LENGTH, 3, 1, 256));
        data.extend(entry_le(tags::TILE_OFFSETS, 4, 6, 1000));
        data.extend_from_slice(&0u32.to_le_bytes());
        let ifd = parse_ifd(TiffByteOrder::LittleEndian, &data).unwrap();
        let mut set = TagSet::new(TiffByteOrder::LittleEndian, ifd.entries);
        let offsets: Vec<u8> = (0..6u32).flat_map(|i| (2000 + i * 10).to_le_bytes()).collect();
        set.insert_external(tags::TILE_OFFSETS, offsets);

        // No byte counts yet
        assert!(IfdInfo::from_tags(&set).is_err());

        set.entries.push(RawTagEntry {
            tag: tags::TILE_BYTE_COUNTS,
            type_id: 4,
            count: 6,
            value_field: 1100u32.to_le_bytes(),
        });
        set.insert_external(tags::TILE_BYTE_COUNTS, vec![10u8, 0, 0, 0].repeat(6));

        let info = IfdInfo::from_tags(&set).unwrap();
        assert_eq!((info.tiles_across(), info.tiles_down()), (3, 2));
        assert_eq!(info.raw_tile_size(), 256 * 256 * 2);
        assert_eq!(info.tile_offsets[5], 2050);
    }
}
