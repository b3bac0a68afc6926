//! Pass-through codec for image filters and `/Crypt`.
//!
//! DCTDecode, CCITTFaxDecode, JBIG2Decode and JPXDecode payloads are already
//! in their final image format and are handed to image consumers unchanged.
//! `/Crypt` is resolved by the security handler before the pipeline runs.

use crate::decoders::{DecodedStream, StreamFilter};
use crate::error::Result;

/// Identity codec carrying the filter name it stands in for.
pub struct PassthroughDecoder {
    name: &'static str,
}

impl PassthroughDecoder {
    /// Pass-through for the named filter.
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl StreamFilter for PassthroughDecoder {
    fn decode(&self, input: &[u8]) -> Result<DecodedStream> {
        Ok(DecodedStream::complete(input.to_vec()))
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dct_decode_passthrough() {
        let decoder = PassthroughDecoder::new("DCTDecode");
        let jpeg_data = b"\xFF\xD8\xFF\xE0\x00\x10JFIF"; // JPEG header
        let output = decoder.decode(jpeg_data).unwrap();
        assert_eq!(output.data, jpeg_data);
        assert!(!output.partial);
        assert_eq!(decoder.name(), "DCTDecode");
    }

    #[test]
    fn test_crypt_is_identity() {
        let decoder = PassthroughDecoder::new("Crypt");
        assert_eq!(decoder.encode(b"abc").unwrap(), b"abc");
    }
}
