//! Compression strategies for tile layer grids
//!
//! The tile cache stores every layer grid compressed. The strategy is chosen
//! when the cache is created and must be the same one that produced the
//! stored tiles.

use byteorder::{ByteOrder, LittleEndian};
use recast_common::{Error, Result};

/// Compresses and decompresses tile layer grids
pub trait TileCacheCompressor: Send + Sync + std::fmt::Debug {
    /// Upper bound of the compressed size of `buffer_size` input bytes
    fn max_compressed_size(&self, buffer_size: usize) -> usize;

    /// Compresses `buffer`
    fn compress(&self, buffer: &[u8]) -> Result<Vec<u8>>;

    /// Decompresses `compressed`, failing unless exactly `expected_len`
    /// bytes are produced
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}

/// Longest literal run of the run length scheme
const RLE_MAX_LITERAL: usize = 128;
/// Shortest and longest repeat run of the run length scheme
const RLE_MIN_REPEAT: usize = 3;
const RLE_MAX_REPEAT: usize = RLE_MIN_REPEAT + 127;

/// Byte oriented run length compressor
///
/// A control byte below 0x80 is followed by `control + 1` literal bytes, a
/// control byte at or above 0x80 repeats the following byte
/// `control - 0x80 + 3` times. Layer grids are dominated by long runs of
/// identical areas and heights, which this handles well at a very low
/// cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct RleCompressor;

impl TileCacheCompressor for RleCompressor {
    fn max_compressed_size(&self, buffer_size: usize) -> usize {
        buffer_size + buffer_size.div_ceil(RLE_MAX_LITERAL)
    }

    fn compress(&self, buffer: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.max_compressed_size(buffer.len()));
        let mut literal_start = 0;
        let mut i = 0;

        while i < buffer.len() {
            let value = buffer[i];
            let run = buffer[i..]
                .iter()
                .take(RLE_MAX_REPEAT)
                .take_while(|&&b| b == value)
                .count();

            if run >= RLE_MIN_REPEAT {
                flush_literals(&mut out, &buffer[literal_start..i]);
                out.push(0x80 | (run - RLE_MIN_REPEAT) as u8);
                out.push(value);
                i += run;
                literal_start = i;
            } else {
                i += 1;
            }
        }
        flush_literals(&mut out, &buffer[literal_start..]);
        Ok(out)
    }

    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(expected_len);
        let mut i = 0;

        while i < compressed.len() {
            let control = compressed[i] as usize;
            i += 1;
            if control < 0x80 {
                let len = control + 1;
                let literals = compressed
                    .get(i..i + len)
                    .ok_or_else(|| Error::Compression("truncated literal run".into()))?;
                out.extend_from_slice(literals);
                i += len;
            } else {
                let value = *compressed
                    .get(i)
                    .ok_or_else(|| Error::Compression("truncated repeat run".into()))?;
                let len = control - 0x80 + RLE_MIN_REPEAT;
                out.resize(out.len() + len, value);
                i += 1;
            }
            if out.len() > expected_len {
                break;
            }
        }

        if out.len() != expected_len {
            return Err(Error::Compression(format!(
                "decompressed {} bytes, expected {}",
                out.len(),
                expected_len
            )));
        }
        Ok(out)
    }
}

fn flush_literals(out: &mut Vec<u8>, literals: &[u8]) {
    for chunk in literals.chunks(RLE_MAX_LITERAL) {
        out.push((chunk.len() - 1) as u8);
        out.extend_from_slice(chunk);
    }
}

/// LZ4 block compressor
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl TileCacheCompressor for Lz4Compressor {
    fn max_compressed_size(&self, buffer_size: usize) -> usize {
        // Size prefix plus the block bound
        4 + lz4_flex::block::get_maximum_output_size(buffer_size)
    }

    fn compress(&self, buffer: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(buffer))
    }

    fn decompress(&self, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        if compressed.len() < 4 {
            return Err(Error::Compression(format!(
                "lz4 block of {} bytes has no size prefix",
                compressed.len()
            )));
        }
        // Check the prefix before allocating anything for it
        let stored_len = LittleEndian::read_u32(&compressed[..4]) as usize;
        if stored_len != expected_len {
            return Err(Error::Compression(format!(
                "lz4 size prefix {} does not match expected {}",
                stored_len, expected_len
            )));
        }
        let mut out = vec![0u8; expected_len];
        let written = lz4_flex::block::decompress_into(&compressed[4..], &mut out)
            .map_err(|e| Error::Compression(e.to_string()))?;
        if written != expected_len {
            return Err(Error::Compression(format!(
                "decompressed {} bytes, expected {}",
                written, expected_len
            )));
        }
        Ok(out)
    }
}
