//! ASCIIHexDecode implementation.
//!
//! Decodes hexadecimal-encoded data (e.g., "48656C6C6F" -> "Hello").
//! Whitespace is ignored, and odd-length input is padded with implicit '0'.

use crate::decoders::{DecodedStream, StreamFilter};
use crate::error::Result;
use crate::lexer::{hex_value, is_whitespace};

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamFilter for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<DecodedStream> {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut high: Option<u8> = None;

        for &c in input {
            if c == b'>' {
                break;
            }
            if is_whitespace(c) {
                continue;
            }
            let Some(nibble) = hex_value(c) else {
                log::warn!("ASCIIHexDecode: invalid hex digit '{}', stopping", c as char);
                return Ok(DecodedStream::truncated(output));
            };
            match high.take() {
                Some(h) => output.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }

        // If odd length, pad with '0'
        if let Some(h) = high {
            output.push(h << 4);
        }

        Ok(DecodedStream::complete(output))
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
        let mut output = Vec::with_capacity(input.len() * 2 + input.len() / 32 + 1);
        for (i, &byte) in input.iter().enumerate() {
            if i > 0 && i % 32 == 0 {
                output.push(b'\n');
            }
            output.push(DIGITS[(byte >> 4) as usize]);
            output.push(DIGITS[(byte & 0x0F) as usize]);
        }
        output.push(b'>');
        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}
