//! ASCII85Decode (Base85) implementation.
//!
//! Represents 4 bytes as 5 ASCII characters in the range '!' to 'u'.
//! Special case: 'z' represents a group of 4 zero bytes. A final group of
//! n bytes (1-3) is zero-padded, encoded, and cut to its first n+1
//! characters. Encoded data ends with the `~>` marker.

use crate::decoders::{DecodedStream, StreamFilter};
use crate::error::Result;
use crate::lexer::is_whitespace;

/// ASCII85Decode filter implementation.
pub struct Ascii85Decoder;

impl StreamFilter for Ascii85Decoder {
    fn decode(&self, input: &[u8]) -> Result<DecodedStream> {
        let mut output = Vec::with_capacity(input.len() * 4 / 5);
        let mut group = [0u8; 5];
        let mut count = 0;

        // Optional "<~" prefix
        let body = match input.iter().position(|&c| !is_whitespace(c)) {
            Some(start) if input[start..].starts_with(b"<~") => &input[start + 2..],
            _ => input,
        };

        for &byte in body {
            match byte {
                b'~' => break, // End marker '~>'
                b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
                b'!'..=b'u' => {
                    group[count] = byte - b'!';
                    count += 1;
                    if count == 5 {
                        match group_value(&group) {
                            Some(value) => output.extend_from_slice(&value.to_be_bytes()),
                            None => {
                                log::warn!("ASCII85Decode: group out of range, stopping");
                                return Ok(DecodedStream::truncated(output));
                            },
                        }
                        count = 0;
                    }
                },
                _ if is_whitespace(byte) => {},
                _ => {
                    log::warn!("ASCII85Decode: invalid character 0x{:02x}, stopping", byte);
                    return Ok(DecodedStream::truncated(output));
                },
            }
        }

        // Final partial group: pad with 'u' and keep count-1 bytes
        match count {
            0 => Ok(DecodedStream::complete(output)),
            1 => {
                log::warn!("ASCII85Decode: dangling single character in final group");
                Ok(DecodedStream::truncated(output))
            },
            _ => {
                for slot in group.iter_mut().skip(count) {
                    *slot = 84;
                }
                match group_value(&group) {
                    Some(value) => {
                        output.extend_from_slice(&value.to_be_bytes()[..count - 1]);
                        Ok(DecodedStream::complete(output))
                    },
                    None => Ok(DecodedStream::truncated(output)),
                }
            },
        }
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() * 5 / 4 + 8);
        let mut line = 0;

        for chunk in input.chunks(4) {
            let mut padded = [0u8; 4];
            padded[..chunk.len()].copy_from_slice(chunk);
            let value = u32::from_be_bytes(padded);

            if chunk.len() == 4 && value == 0 {
                output.push(b'z');
                line += 1;
            } else {
                let mut digits = [0u8; 5];
                let mut v = value;
                for slot in digits.iter_mut().rev() {
                    *slot = (v % 85) as u8 + b'!';
                    v /= 85;
                }
                output.extend_from_slice(&digits[..chunk.len() + 1]);
                line += chunk.len() + 1;
            }

            if line >= 75 {
                output.push(b'\n');
                line = 0;
            }
        }

        output.extend_from_slice(b"~>");
        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

/// Value of five base-85 digits, or `None` when it exceeds 32 bits.
fn group_value(digits: &[u8; 5]) -> Option<u32> {
    digits
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85)?.checked_add(d as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &[u8]) -> DecodedStream {
        Ascii85Decoder.decode(input).unwrap()
    }

    #[test]
    fn test_ascii85_decode_simple() {
        // "Test" encoded in ASCII85 (4 bytes = 1 complete group)
        assert_eq!(decode(b"<+U,m").data, b"Test");
        assert_eq!(decode(b"<~<+U,m~>").data, b"Test");
    }

    #[test]
    fn test_ascii85_decode_z_special_case() {
        assert_eq!(decode(b"z").data, [0u8; 4]);
        assert_eq!(decode(b"zz~>").data, [0u8; 8]);
    }

    #[test]
    fn test_ascii85_decode_with_whitespace() {
        assert_eq!(decode(b"<+U ,m").data, b"Test");
    }

    #[test]
    fn test_ascii85_decode_empty() {
        let out = decode(b"~>");
        assert!(out.data.is_empty());
        assert!(!out.partial);
        assert!(decode(b"").data.is_empty());
    }

    #[test]
    fn test_ascii85_partial_group() {
        // "Te" -> 3 characters
        let encoded = Ascii85Decoder.encode(b"Te").unwrap();
        assert_eq!(encoded.len(), 3 + 2);
        assert_eq!(decode(&encoded).data, b"Te");
    }

    #[test]
    fn test_ascii85_encode_known_vector() {
        assert_eq!(Ascii85Decoder.encode(b"Test").unwrap(), b"<+U,m~>");
    }

    #[test]
    fn test_ascii85_zero_group_encodes_to_z() {
        assert_eq!(Ascii85Decoder.encode(&[0, 0, 0, 0]).unwrap(), b"z~>");
        // A short zero group is not abbreviated
        assert_eq!(Ascii85Decoder.encode(&[0, 0]).unwrap(), b"!!!~>");
    }

    #[test]
    fn test_empty_is_distinct_from_z() {
        let empty = Ascii85Decoder.encode(b"").unwrap();
        let zero = Ascii85Decoder.encode(&[0, 0, 0, 0]).unwrap();
        assert_ne!(empty, zero);
        assert!(decode(&empty).data.is_empty());
    }

    #[test]
    fn test_ascii85_invalid_character_truncates() {
        let out = decode(b"<+U,mHe{llo");
        assert_eq!(out.data, b"Test");
        assert!(out.partial);
    }

    #[test]
    fn test_ascii85_z_inside_group_truncates() {
        let out = decode(b"!z");
        assert!(out.partial);
    }

    #[test]
    fn test_ascii85_single_trailing_char_is_partial() {
        let out = decode(b"<+U,m!");
        assert_eq!(out.data, b"Test");
        assert!(out.partial);
    }

    #[test]
    fn test_ascii85_overflowing_group_truncates() {
        let out = decode(b"uuuuu");
        assert!(out.data.is_empty());
        assert!(out.partial);
    }

    #[test]
    fn test_ascii85_decoder_name() {
        assert_eq!(Ascii85Decoder.name(), "ASCII85Decode");
    }
}
