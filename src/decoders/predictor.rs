//! Predictor implementations for Flate and LZW streams.
//!
//! PDF streams can use PNG predictors (10-15) or TIFF Predictor 2 to improve
//! compression. These predictors encode differences between adjacent
//! samples, which are then reversed during decoding.
//!
//! With a PNG predictor every row carries its own algorithm tag, so the
//! exact value 10-15 only matters when encoding.

use crate::decoders::DecodedStream;
use crate::error::{Error, Result};
use crate::object::Dictionary;

/// Decode parameters for stream filters (`/DecodeParms`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample (default 1)
    pub colors: usize,
    /// Bits per component (default 8)
    pub bits_per_component: usize,
    /// LZW `/EarlyChange` (default true)
    pub early_change: bool,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1, // No prediction
            columns: 1,
            colors: 1,
            bits_per_component: 8,
            early_change: true,
        }
    }
}

impl DecodeParams {
    /// Read parameters from a `/DecodeParms` dictionary; absent or invalid
    /// entries keep their defaults.
    pub fn from_dict(dict: &Dictionary) -> Self {
        let defaults = Self::default();
        let positive = |key: &str, default: usize| {
            dict.get(key)
                .and_then(|v| v.as_integer())
                .filter(|&v| v > 0)
                .map(|v| v as usize)
                .unwrap_or(default)
        };
        Self {
            predictor: dict
                .get("Predictor")
                .and_then(|v| v.as_integer())
                .unwrap_or(defaults.predictor),
            columns: positive("Columns", defaults.columns),
            colors: positive("Colors", defaults.colors),
            bits_per_component: positive("BitsPerComponent", defaults.bits_per_component),
            early_change: dict
                .get("EarlyChange")
                .and_then(|v| v.as_integer())
                .map(|v| v != 0)
                .unwrap_or(defaults.early_change),
        }
    }

    /// Number of bytes of sample data per row (without PNG tag).
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8).max(1)
    }

    /// Bytes per complete pixel, at least 1.
    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse a predictor.
///
/// A trailing incomplete row is dropped and reported as partial output.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<DecodedStream> {
    match params.predictor {
        1 => Ok(DecodedStream::complete(data.to_vec())),
        2 => decode_tiff_predictor(data, params),
        10..=15 => Ok(decode_png_predictor(data, params)),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// Apply a predictor so that [`decode_predictor`] restores `data`.
///
/// `data` must hold whole rows.
pub fn encode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.pixel_bytes_per_row();
    if !data.len().is_multiple_of(row_len) {
        return Err(Error::Decode(format!(
            "Predictor input length {} is not a multiple of row size {}",
            data.len(),
            row_len
        )));
    }
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => encode_tiff_predictor(data, params),
        10..=15 => Ok(encode_png_predictor(data, params)),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

/// TIFF Predictor 2: each sample is the difference from the sample to its left.
fn decode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<DecodedStream> {
    let row_len = params.pixel_bytes_per_row();
    let whole = data.len() - data.len() % row_len;
    let mut output = data[..whole].to_vec();

    for row in output.chunks_mut(row_len) {
        match params.bits_per_component {
            8 => {
                for i in params.colors..row.len() {
                    row[i] = row[i].wrapping_add(row[i - params.colors]);
                }
            },
            16 => {
                let stride = params.colors * 2;
                let mut i = stride;
                while i + 1 < row.len() {
                    let left = u16::from_be_bytes([row[i - stride], row[i - stride + 1]]);
                    let cur = u16::from_be_bytes([row[i], row[i + 1]]);
                    row[i..i + 2].copy_from_slice(&cur.wrapping_add(left).to_be_bytes());
                    i += 2;
                }
            },
            bpc => {
                return Err(Error::Decode(format!(
                    "TIFF predictor with {} bits per component is not supported",
                    bpc
                )));
            },
        }
    }

    if whole < data.len() {
        log::warn!("Predictor: dropping incomplete final row of {} bytes", data.len() - whole);
        return Ok(DecodedStream::truncated(output));
    }
    Ok(DecodedStream::complete(output))
}

fn encode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.pixel_bytes_per_row();
    let mut output = data.to_vec();

    for (row, source) in output.chunks_mut(row_len).zip(data.chunks(row_len)) {
        match params.bits_per_component {
            8 => {
                for i in params.colors..row.len() {
                    row[i] = source[i].wrapping_sub(source[i - params.colors]);
                }
            },
            16 => {
                let stride = params.colors * 2;
                let mut i = stride;
                while i + 1 < row.len() {
                    let left = u16::from_be_bytes([source[i - stride], source[i - stride + 1]]);
                    let cur = u16::from_be_bytes([source[i], source[i + 1]]);
                    row[i..i + 2].copy_from_slice(&cur.wrapping_sub(left).to_be_bytes());
                    i += 2;
                }
            },
            bpc => {
                return Err(Error::Decode(format!(
                    "TIFF predictor with {} bits per component is not supported",
                    bpc
                )));
            },
        }
    }
    Ok(output)
}

/// Decode PNG predictors (10-15): each row starts with its algorithm tag.
fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> DecodedStream {
    let row_len = params.pixel_bytes_per_row();
    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len());
    let mut prior = vec![0u8; row_len];

    for row in data.chunks(row_len + 1) {
        if row.len() < row_len + 1 {
            log::warn!("PNG predictor: dropping incomplete final row of {} bytes", row.len());
            return DecodedStream::truncated(output);
        }
        let tag = row[0];
        let mut current = row[1..].to_vec();

        for i in 0..row_len {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = prior[i];
            let up_left = if i >= bpp { prior[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth_predictor(left, up, up_left),
                _ => {
                    log::warn!("Invalid PNG predictor tag: {}", tag);
                    return DecodedStream::truncated(output);
                },
            };
            current[i] = current[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&current);
        prior = current;
    }

    DecodedStream::complete(output)
}

fn encode_png_predictor(data: &[u8], params: &DecodeParams) -> Vec<u8> {
    let row_len = params.pixel_bytes_per_row();
    let bpp = params.bytes_per_pixel();
    let zero_row = vec![0u8; row_len];
    let mut output = Vec::with_capacity(data.len() + data.len() / row_len + 1);
    let mut prior: &[u8] = &zero_row;

    for row in data.chunks(row_len) {
        let tag = match params.predictor {
            15 => best_png_tag(row, prior, bpp),
            fixed => (fixed - 10) as u8,
        };
        output.push(tag);
        output.extend(png_filter_row(tag, row, prior, bpp));
        prior = row;
    }
    output
}

fn png_filter_row(tag: u8, row: &[u8], prior: &[u8], bpp: usize) -> Vec<u8> {
    (0..row.len())
        .map(|i| {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prior[i];
            let up_left = if i >= bpp { prior[i - bpp] } else { 0 };
            let predicted = match tag {
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth_predictor(left, up, up_left),
                _ => 0,
            };
            row[i].wrapping_sub(predicted)
        })
        .collect()
}

/// Pick the tag with the smallest sum of absolute residuals.
fn best_png_tag(row: &[u8], prior: &[u8], bpp: usize) -> u8 {
    (0..=4u8)
        .min_by_key(|&tag| {
            png_filter_row(tag, row, prior, bpp)
                .iter()
                .map(|&b| (b as i8).unsigned_abs() as u64)
                .sum::<u64>()
        })
        .unwrap_or(0)
}

/// Paeth predictor function from PNG specification.
fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let (a16, b16, c16) = (a as i16, b as i16, c as i16);
    let p = a16 + b16 - c16;
    let pa = (p - a16).abs();
    let pb = (p - b16).abs();
    let pc = (p - c16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
