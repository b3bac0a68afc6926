//! LZWDecode implementation for PDF.
//!
//! Lempel-Ziv-Welch compression as specified in the PDF Reference
//! (Section 7.4.4):
//! - MSB-first bit ordering
//! - Starts with 9-bit codes, grows to 12 bits
//! - Clear code is 256, EOD code is 257, first free code is 258
//! - `/EarlyChange 1` (the default) widens codes one code earlier than
//!   GIF; `/EarlyChange 0` waits until the table is full

use crate::decoders::{DecodedStream, StreamFilter};
use crate::error::{Error, Result};
use weezl::{BitOrder, decode::Decoder as WeezlDecoder, encode::Encoder as WeezlEncoder};

/// LZWDecode filter implementation.
#[derive(Debug, Clone, Copy)]
pub struct LzwDecoder {
    early_change: bool,
}

impl LzwDecoder {
    /// Codec with the given `/EarlyChange` setting.
    pub fn new(early_change: bool) -> Self {
        Self { early_change }
    }
}

impl Default for LzwDecoder {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StreamFilter for LzwDecoder {
    fn decode(&self, input: &[u8]) -> Result<DecodedStream> {
        let mut decoder = if self.early_change {
            WeezlDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            WeezlDecoder::new(BitOrder::Msb, 8)
        };

        let mut output = Vec::new();
        let result = decoder.into_vec(&mut output).decode_all(input);
        match result.status {
            Ok(_) => Ok(DecodedStream::complete(output)),
            Err(e) if !output.is_empty() => {
                log::warn!("LZWDecode stopped after {} bytes: {:?}", output.len(), e);
                Ok(DecodedStream::truncated(output))
            },
            Err(e) => {
                // Fall back to the table-driven decoder for edge cases
                log::debug!("Weezl LZW decode failed: {:?}, falling back", e);
                Ok(decode_lzw_custom(input, self.early_change))
            },
        }
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = if self.early_change {
            WeezlEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            WeezlEncoder::new(BitOrder::Msb, 8)
        };
        encoder
            .encode(input)
            .map_err(|e| Error::Decode(format!("LZW encoding failed: {:?}", e)))
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}

/// Table-driven LZW decoder. Stops at the first invalid code.
fn decode_lzw_custom(input: &[u8], early_change: bool) -> DecodedStream {
    const CLEAR_CODE: usize = 256;
    const EOD_CODE: usize = 257;
    const MAX_CODE_BITS: u8 = 12;

    let early = early_change as usize;
    let mut output = Vec::new();
    let mut table = init_lzw_table();
    let mut code_bits = 9;
    let mut bit_reader = BitReader::new(input);
    let mut prev: Option<usize> = None;

    loop {
        if code_bits < MAX_CODE_BITS && table.len() + early >= (1 << code_bits) {
            code_bits += 1;
        }

        let Some(code) = bit_reader.read_bits(code_bits) else {
            break;
        };
        let code = code as usize;

        if code == EOD_CODE {
            break;
        }
        if code == CLEAR_CODE {
            table = init_lzw_table();
            code_bits = 9;
            prev = None;
            continue;
        }

        let entry = match (table.get(code), prev) {
            (Some(entry), _) => entry.clone(),
            // code == next code: previous string + its first byte
            (None, Some(p)) if code == table.len() => {
                let mut s = table[p].clone();
                s.push(table[p][0]);
                s
            },
            _ => {
                log::warn!("Invalid LZW code {} (table size {})", code, table.len());
                return DecodedStream::truncated(output);
            },
        };

        output.extend_from_slice(&entry);

        if let Some(p) = prev {
            if table.len() < (1 << MAX_CODE_BITS) {
                let mut new_entry = table[p].clone();
                new_entry.push(entry[0]);
                table.push(new_entry);
            }
        }
        prev = Some(code);
    }

    DecodedStream::complete(output)
}

/// Initial table: 256 single-byte strings plus placeholders for the
/// clear and EOD codes.
fn init_lzw_table() -> Vec<Vec<u8>> {
    let mut table: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
    table.push(Vec::new());
    table.push(Vec::new());
    table
}

/// Bit reader for MSB-first bit ordering.
struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8, // 0-7, position within current byte (0 = MSB)
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    fn read_bits(&mut self, n: u8) -> Option<u32> {
        let mut result = 0u32;
        let mut remaining = n;

        while remaining > 0 {
            let byte = *self.data.get(self.byte_pos)?;
            let available = 8 - self.bit_pos;
            let take = remaining.min(available);
            let shift = available - take;
            let bits = (byte as u32 >> shift) & ((1u32 << take) - 1);

            result = (result << take) | bits;
            self.bit_pos += take;
            if self.bit_pos == 8 {
                self.byte_pos += 1;
                self.bit_pos = 0;
            }
            remaining -= take;
        }

        Some(result)
    }
}
