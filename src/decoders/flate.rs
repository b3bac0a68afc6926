//! FlateDecode (zlib/deflate) implementation.
//!
//! This is the most common PDF compression filter. Uses the flate2 crate for
//! zlib, with the inflate and libflate crates as fallbacks for streams that
//! flate2 rejects outright.

use crate::decoders::{DecodedStream, StreamFilter};
use crate::error::{Error, Result};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use inflate::inflate_bytes_zlib;
use libflate::zlib::Decoder as LibflateDecoder;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamFilter for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<DecodedStream> {
        // Strategy 1: zlib, keeping whatever precedes a corruption
        let zlib = inflate_with(input, true);
        if zlib.complete {
            return Ok(DecodedStream::complete(zlib.data));
        }
        if !zlib.data.is_empty() {
            log::warn!(
                "FlateDecode partial recovery: extracted {} bytes before corruption",
                zlib.data.len()
            );
            return Ok(DecodedStream::truncated(zlib.data));
        }

        // Strategy 2: raw deflate (no zlib wrapper), then after skipping a
        // corrupt 2-byte header
        log::info!("Zlib decode failed, trying raw deflate");
        for skip in [0usize, 2] {
            if input.len() <= skip {
                break;
            }
            let raw = inflate_with(&input[skip..], false);
            if raw.complete {
                return Ok(DecodedStream::complete(raw.data));
            }
            if !raw.data.is_empty() {
                log::warn!("Raw deflate partial recovery: {} bytes (skipped {})", raw.data.len(), skip);
                return Ok(DecodedStream::truncated(raw.data));
            }
        }

        // Strategy 3: inflate crate
        match inflate_bytes_zlib(input) {
            Ok(data) => {
                log::info!("Inflate crate recovery succeeded: {} bytes", data.len());
                return Ok(DecodedStream::complete(data));
            },
            Err(e) => log::debug!("Inflate crate failed: {:?}", e),
        }

        // Strategy 4: libflate
        if let Ok(mut decoder) = LibflateDecoder::new(input) {
            let mut output = Vec::new();
            match decoder.read_to_end(&mut output) {
                Ok(_) if !output.is_empty() => return Ok(DecodedStream::complete(output)),
                Err(_) if !output.is_empty() => return Ok(DecodedStream::truncated(output)),
                _ => log::debug!("Libflate read failed"),
            }
        }

        log::warn!("FlateDecode: nothing recoverable from {} bytes", input.len());
        Ok(DecodedStream::truncated(Vec::new()))
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(input)
            .map_err(|e| Error::Decode(format!("FlateDecode compression failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| Error::Decode(format!("FlateDecode compression failed: {}", e)))
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

struct Inflated {
    data: Vec<u8>,
    complete: bool,
}

/// Inflate until the stream ends, the input runs out, or the data turns bad.
fn inflate_with(input: &[u8], zlib_header: bool) -> Inflated {
    let mut inflater = Decompress::new(zlib_header);
    let mut data = Vec::with_capacity(input.len().saturating_mul(4).max(64));

    loop {
        if data.len() == data.capacity() {
            data.reserve(data.capacity().max(1024));
        }
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();
        let rest = input.get(consumed..).unwrap_or_default();

        match inflater.decompress_vec(rest, &mut data, FlushDecompress::None) {
            Ok(Status::StreamEnd) => return Inflated { data, complete: true },
            Ok(_) => {
                let stalled =
                    inflater.total_in() as usize == consumed && inflater.total_out() == produced;
                if stalled {
                    return Inflated { data, complete: false };
                }
            },
            Err(e) => {
                log::debug!("Inflate error after {} bytes: {}", data.len(), e);
                return Inflated { data, complete: false };
            },
        }
    }
}
