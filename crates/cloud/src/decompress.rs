//! Tile decoding: decompression, predictor reversal, sample conversion.
//!
//! Supports DEFLATE (via `flate2`), LZW (via `weezl`) and uncompressed
//! tiles, with or without horizontal differencing.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use num_traits::NumCast;

use crate::error::{CloudError, Result};
use crate::ifd::{IfdInfo, TiffByteOrder};

/// TIFF compression codes.
pub mod compression {
    pub const NONE: u16 = 1;
    pub const LZW: u16 = 5;
    pub const DEFLATE: u16 = 8;
    pub const ADOBE_DEFLATE: u16 = 32946;
}

/// TIFF sample format codes.
pub mod sample_format {
    pub const UNSIGNED_INT: u16 = 1;
    pub const SIGNED_INT: u16 = 2;
    pub const FLOAT: u16 = 3;
}

/// TIFF predictor codes.
pub mod predictor {
    pub const NONE: u16 = 1;
    pub const HORIZONTAL: u16 = 2;
    pub const FLOATING_POINT: u16 = 3;
}

/// Decompress raw tile bytes according to the compression method.
#[cfg_attr(not(feature = "deflate"), allow(unused_variables))]
pub fn decompress_tile(data: &[u8], compression_code: u16, expected_raw_size: usize) -> Result<Vec<u8>> {
    match compression_code {
        compression::NONE => Ok(data.to_vec()),

        #[cfg(feature = "deflate")]
        compression::DEFLATE | compression::ADOBE_DEFLATE => {
            use std::io::Read;
            // TIFF DEFLATE is normally zlib-wrapped; some writers emit raw deflate
            let mut out = Vec::with_capacity(expected_raw_size);
            if flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
                return Ok(out);
            }
            out.clear();
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| CloudError::Decompress(format!("DEFLATE: {e}")))?;
            Ok(out)
        }

        #[cfg(feature = "lzw")]
        compression::LZW => {
            let mut decoder = weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8);
            decoder
                .decode(data)
                .map_err(|e| CloudError::Decompress(format!("LZW: {e}")))
        }

        _ => Err(CloudError::UnsupportedCompression(compression_code)),
    }
}

/// Undo TIFF horizontal differencing in place.
///
/// Each row of `row_width` pixels stores the first sample as-is and every
/// following sample as the difference to its left neighbour (per sample
/// plane, wrapping integer arithmetic).
pub fn undo_horizontal_predictor(
    raw: &mut [u8],
    byte_order: TiffByteOrder,
    bits_per_sample: u16,
    samples_per_pixel: u16,
    row_width: usize,
) -> Result<()> {
    let spp = samples_per_pixel.max(1) as usize;
    let bytes = (bits_per_sample as usize).div_ceil(8);
    let row_bytes = row_width * spp * bytes;
    if row_bytes == 0 {
        return Ok(());
    }

    for row in raw.chunks_exact_mut(row_bytes) {
        match bits_per_sample {
            8 => {
                for i in spp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - spp]);
                }
            }
            16 => {
                for i in spp..row.len() / 2 {
                    let prev = get_u16(byte_order, row, i - spp);
                    let cur = get_u16(byte_order, row, i);
                    put_u16(byte_order, row, i, cur.wrapping_add(prev));
                }
            }
            32 => {
                for i in spp..row.len() / 4 {
                    let prev = get_u32(byte_order, row, i - spp);
                    let cur = get_u32(byte_order, row, i);
                    put_u32(byte_order, row, i, cur.wrapping_add(prev));
                }
            }
            other => {
                return Err(CloudError::Decompress(format!(
                    "horizontal predictor with {other}-bit samples"
                )))
            }
        }
    }
    Ok(())
}

/// Full decode of one tile of `ifd` to `f32` samples.
pub fn decode_tile(data: &[u8], byte_order: TiffByteOrder, ifd: &IfdInfo) -> Result<Vec<f32>> {
    let mut raw = decompress_tile(data, ifd.compression, ifd.raw_tile_size())?;
    match ifd.predictor {
        predictor::NONE => {}
        predictor::HORIZONTAL => undo_horizontal_predictor(
            &mut raw,
            byte_order,
            ifd.bits_per_sample,
            ifd.samples_per_pixel,
            ifd.tile_width as usize,
        )?,
        other => {
            return Err(CloudError::Decompress(format!(
                "unsupported predictor {other}{}",
                if other == predictor::FLOATING_POINT { " (floating point)" } else { "" }
            )))
        }
    }
    bytes_to_f32(&raw, byte_order, ifd.bits_per_sample, ifd.sample_format)
}

/// Interpret decompressed bytes as samples and convert them to `f32`.
pub fn bytes_to_f32(
    raw: &[u8],
    byte_order: TiffByteOrder,
    bits_per_sample: u16,
    sample_format: u16,
) -> Result<Vec<f32>> {
    let bps = bits_per_sample;
    let sf = sample_format;
    let size = (bps as usize).div_ceil(8).max(1);
    if raw.len() % size != 0 {
        return Err(CloudError::Decompress(format!(
            "raw data length {} not aligned to element size {}",
            raw.len(),
            size
        )));
    }

    let le = byte_order == TiffByteOrder::LittleEndian;
    let values = match (bps, sf) {
        (8, sample_format::UNSIGNED_INT) => cast_all(raw.iter().copied()),
        (8, sample_format::SIGNED_INT) => cast_all(raw.iter().map(|&b| b as i8)),
        (16, sample_format::UNSIGNED_INT) => cast_all(raw.chunks_exact(2).map(|c| {
            if le { LittleEndian::read_u16(c) } else { BigEndian::read_u16(c) }
        })),
        (16, sample_format::SIGNED_INT) => cast_all(raw.chunks_exact(2).map(|c| {
            if le { LittleEndian::read_i16(c) } else { BigEndian::read_i16(c) }
        })),
        (32, sample_format::UNSIGNED_INT) => cast_all(raw.chunks_exact(4).map(|c| {
            if le { LittleEndian::read_u32(c) } else { BigEndian::read_u32(c) }
        })),
        (32, sample_format::SIGNED_INT) => cast_all(raw.chunks_exact(4).map(|c| {
            if le { LittleEndian::read_i32(c) } else { BigEndian::read_i32(c) }
        })),
        (32, sample_format::FLOAT) => cast_all(raw.chunks_exact(4).map(|c| {
            if le { LittleEndian::read_f32(c) } else { BigEndian::read_f32(c) }
        })),
        (64, sample_format::FLOAT) => cast_all(raw.chunks_exact(8).map(|c| {
            if le { LittleEndian::read_f64(c) } else { BigEndian::read_f64(c) }
        })),
        _ => return Err(CloudError::UnsupportedDataType { bps, sf }),
    };
    Ok(values)
}

fn cast_all<S: NumCast>(values: impl Iterator<Item = S>) -> Vec<f32> {
    values.map(|v| NumCast::from(v).unwrap_or(f32::NAN)).collect()
}

fn get_u16(order: TiffByteOrder, row: &[u8], i: usize) -> u16 {
    let c = &row[i * 2..i * 2 + 2];
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u16(c),
        TiffByteOrder::BigEndian => BigEndian::read_u16(c),
    }
}

fn put_u16(order: TiffByteOrder, row: &mut [u8], i: usize, v: u16) {
    let c = &mut row[i * 2..i * 2 + 2];
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::write_u16(c, v),
        TiffByteOrder::BigEndian => BigEndian::write_u16(c, v),
    }
}

fn get_u32(order: TiffByteOrder, row: &[u8], i: usize) -> u32 {
    let c = &row[i * 4..i * 4 + 4];
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u32(c),
        TiffByteOrder::BigEndian => BigEndian::read_u32(c),
    }
}

fn put_u32(order: TiffByteOrder, row: &mut [u8], i: usize, v: u32) {
    let c = &mut row[i * 4..i * 4 + 4];
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::write_u32(c, v),
        TiffByteOrder::BigEndian => BigEndian::write_u32(c, v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LE: TiffByteOrder = TiffByteOrder::LittleEndian;

    #[test]
    fn test_decompress_none() {
        let data = vec![1, 2, 3, 4];
        assert_eq!(decompress_tile(&data, compression::NONE, 4).unwrap(), data);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_decompress_zlib_and_raw_deflate() {
        use std::io::Write;
        let original: Vec<u8> = (0..=255u8).cycle().take(1024).collect();

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(&original).unwrap();
        let zlib = zlib.finish().unwrap();
        assert_eq!(decompress_tile(&zlib, compression::DEFLATE, 1024).unwrap(), original);

        let mut raw = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        raw.write_all(&original).unwrap();
        let raw = raw.finish().unwrap();
        assert_eq!(decompress_tile(&raw, compression::ADOBE_DEFLATE, 1024).unwrap(), original);
    }

    #[test]
    fn test_unsupported_compression() {
        // JPEG
        assert!(matches!(
            decompress_tile(&[0], 7, 1),
            Err(CloudError::UnsupportedCompression(7))
        ));
    }

    #[test]
    fn test_horizontal_predictor_u16() {
        // Two rows of three pixels: [1000, 1010, 990] and [5, 7, 2]
        let diffs: [u16; 6] = [1000, 10, 65516, 5, 2, 65531];
        let mut raw: Vec<u8> = diffs.iter().flat_map(|v| v.to_le_bytes()).collect();
        undo_horizontal_predictor(&mut raw, LE, 16, 1, 3).unwrap();
        let values = bytes_to_f32(&raw, LE, 16, sample_format::UNSIGNED_INT).unwrap();
        assert_eq!(values, vec![1000.0, 1010.0, 990.0, 5.0, 7.0, 2.0]);
    }

    #[test]
    fn test_bytes_to_f32_formats() {
        let raw: Vec<u8> = [100u16, 200, 10000].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(
            bytes_to_f32(&raw, LE, 16, sample_format::UNSIGNED_INT).unwrap(),
            vec![100.0, 200.0, 10000.0]
        );

        let raw: Vec<u8> = [-3i16, 7].iter().flat_map(|v| v.to_be_bytes()).collect();
        assert_eq!(
            bytes_to_f32(&raw, TiffByteOrder::BigEndian, 16, sample_format::SIGNED_INT).unwrap(),
            vec![-3.0, 7.0]
        );

        let raw: Vec<u8> = [0.25f32, 1.5].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(
            bytes_to_f32(&raw, LE, 32, sample_format::FLOAT).unwrap(),
            vec![0.25, 1.5]
        );

        assert!(matches!(
            bytes_to_f32(&[0, 0], LE, 12, sample_format::UNSIGNED_INT),
            Err(CloudError::UnsupportedDataType { bps: 12, sf: 1 })
        ));
    }

    #[test]
    fn test_decode_tile_pipeline() {
        let ifd = IfdInfo {
            width: 2,
            height: 2,
            tile_width: 2,
            tile_height: 2,
            tile_offsets: vec![0],
            tile_byte_counts: vec![8],
            bits_per_sample: 16,
            sample_format: sample_format::UNSIGNED_INT,
            compression: compression::NONE,
            predictor: predictor::HORIZONTAL,
            samples_per_pixel: 1,
            planar_config: 1,
        };
        let diffs: [u16; 4] = [10, 1, 1, 1];
        let raw: Vec<u8> = diffs.iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(decode_tile(&raw, LE, &ifd).unwrap(), vec![10.0, 11.0, 1.0, 2.0]);

        let floating = IfdInfo {
            predictor: predictor::FLOATING_POINT,
            ..ifd
        };
        assert!(decode_tile(&raw, LE, &floating).is_err());
    }
}
