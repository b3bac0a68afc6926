//! Stream filter implementations for PDF streams.
//!
//! This module provides codecs for the standard PDF filters:
//! - FlateDecode (zlib/deflate) - most common
//! - LZWDecode - LZW compression, honoring `/EarlyChange`
//! - ASCII85Decode - base-85 encoding
//! - ASCIIHexDecode - hexadecimal encoding
//! - RunLengthDecode - run-length encoding
//! - DCTDecode, CCITTFaxDecode, JBIG2Decode, JPXDecode - recognized, passed through
//!
//! Filters are chained in the order given by `/Filter`; `/DecodeParms` is
//! matched positionally. Decoding is best-effort: a truncated or damaged
//! payload yields the bytes decoded so far with [`DecodedStream::partial`]
//! set, never an error.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser_config::ParserOptions;

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod passthrough;
mod predictor;
mod runlength;

pub use ascii_hex::AsciiHexDecoder;
pub use ascii85::Ascii85Decoder;
pub use flate::FlateDecoder;
pub use lzw::LzwDecoder;
pub use passthrough::PassthroughDecoder;
pub use predictor::{DecodeParams, decode_predictor, encode_predictor};
pub use runlength::RunLengthDecoder;

/// Output size past which the decompression ratio limit applies.
const RATIO_CHECK_THRESHOLD: usize = 1024 * 1024;

/// PDF stream filter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// FlateDecode (deflate/zlib compression)
    FlateDecode,
    /// ASCIIHexDecode (hexadecimal encoding)
    ASCIIHexDecode,
    /// ASCII85Decode (base-85 encoding)
    ASCII85Decode,
    /// LZWDecode (Lempel-Ziv-Welch compression)
    LZWDecode,
    /// RunLengthDecode (run-length encoding)
    RunLengthDecode,
    /// DCTDecode (JPEG compression)
    DCTDecode,
    /// CCITTFaxDecode (CCITT Fax compression)
    CCITTFaxDecode,
    /// JBIG2Decode (JBIG2 compression)
    JBIG2Decode,
    /// JPXDecode (JPEG 2000)
    JPXDecode,
    /// Crypt (handled by the security layer)
    Crypt,
}

impl Filter {
    /// Look up a filter by name, accepting inline-image abbreviations.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            "DCTDecode" | "DCT" => Some(Filter::DCTDecode),
            "CCITTFaxDecode" | "CCF" => Some(Filter::CCITTFaxDecode),
            "JBIG2Decode" => Some(Filter::JBIG2Decode),
            "JPXDecode" => Some(Filter::JPXDecode),
            "Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }

    /// Canonical filter name.
    pub fn name(&self) -> &'static str {
        match self {
            Filter::FlateDecode => "FlateDecode",
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::LZWDecode => "LZWDecode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::DCTDecode => "DCTDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::JPXDecode => "JPXDecode",
            Filter::Crypt => "Crypt",
        }
    }

    /// Image codecs that are left for a collaborator to decode.
    pub fn is_image_codec(&self) -> bool {
        matches!(
            self,
            Filter::DCTDecode | Filter::CCITTFaxDecode | Filter::JBIG2Decode | Filter::JPXDecode
        )
    }

    fn uses_predictor(&self) -> bool {
        matches!(self, Filter::FlateDecode | Filter::LZWDecode)
    }
}

/// Result of running a filter (or a whole pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedStream {
    /// Decoded bytes
    pub data: Vec<u8>,
    /// True when the input was truncated or damaged and decoding stopped
    /// at the last complete unit
    pub partial: bool,
}

impl DecodedStream {
    /// Fully decoded output.
    pub fn complete(data: Vec<u8>) -> Self {
        Self {
            data,
            partial: false,
        }
    }

    /// Output cut short by damaged input.
    pub fn truncated(data: Vec<u8>) -> Self {
        Self {
            data,
            partial: true,
        }
    }
}

/// A reversible stream filter.
///
/// Each implementation covers one PDF filter algorithm. `decode` recovers
/// what it can from damaged input and reports it through
/// [`DecodedStream::partial`]; `encode` produces output that `decode` maps
/// back to the original bytes.
pub trait StreamFilter {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<DecodedStream>;

    /// Encode the input data.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this filter (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Codec for one pipeline stage.
pub fn filter_impl(filter: Filter, params: &DecodeParams) -> Box<dyn StreamFilter> {
    match filter {
        Filter::FlateDecode => Box::new(FlateDecoder),
        Filter::ASCIIHexDecode => Box::new(AsciiHexDecoder),
        Filter::ASCII85Decode => Box::new(Ascii85Decoder),
        Filter::LZWDecode => Box::new(LzwDecoder::new(params.early_change)),
        Filter::RunLengthDecode => Box::new(RunLengthDecoder),
        other => Box::new(PassthroughDecoder::new(other.name())),
    }
}

/// Read `/Filter` and `/DecodeParms` (or the inline `/F` and `/DP`) from a
/// stream dictionary.
///
/// Both may be a single value or an array. Unknown filter names fail with
/// [`Error::UnsupportedFilter`]. Indirect values must be resolved by the
/// caller; an unresolved parameter dictionary falls back to defaults.
pub fn filters_from_dict(dict: &Dictionary) -> Result<Vec<(Filter, DecodeParams)>> {
    let names: Vec<&Object> = match dict.get("Filter").or_else(|| dict.get("F")) {
        None | Some(Object::Null) => return Ok(Vec::new()),
        Some(Object::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    };
    let parms: Vec<Option<&Dictionary>> = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(Object::Array(items)) => items.iter().map(Object::as_dict).collect(),
        Some(single) => vec![single.as_dict()],
        None => Vec::new(),
    };

    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let Object::Name(name) = name else {
                return Err(Error::InvalidObjectType {
                    expected: "Name".to_string(),
                    found: name.type_name().to_string(),
                });
            };
            let filter = name
                .as_str()
                .and_then(Filter::from_name)
                .ok_or_else(|| Error::UnsupportedFilter(name.to_string()))?;
            let params = parms
                .get(i)
                .copied()
                .flatten()
                .map(DecodeParams::from_dict)
                .unwrap_or_default();
            Ok((filter, params))
        })
        .collect()
}

/// Decode a stream payload according to its dictionary.
pub fn decode_stream_object(
    dict: &Dictionary,
    data: &[u8],
    options: &ParserOptions,
) -> Result<DecodedStream> {
    let filters = filters_from_dict(dict)?;
    decode_filters(data, &filters, options)
}

/// Run a filter chain over `data`, with decompression bomb protection.
///
/// Image codecs stop the chain: their input is returned as-is.
pub fn decode_filters(
    data: &[u8],
    filters: &[(Filter, DecodeParams)],
    options: &ParserOptions,
) -> Result<DecodedStream> {
    let compressed_size = data.len().max(1);
    let mut current = DecodedStream::complete(data.to_vec());

    for (filter, params) in filters {
        if filter.is_image_codec() {
            log::debug!("{} left undecoded", filter.name());
            break;
        }

        let decoded = filter_impl(*filter, params).decode(&current.data)?;
        let mut data = decoded.data;
        let mut partial = current.partial || decoded.partial;

        if filter.uses_predictor() && params.predictor > 1 {
            let predicted = decode_predictor(&data, params)?;
            partial |= predicted.partial;
            data = predicted.data;
        }

        check_limits(compressed_size, data.len(), options)?;
        current = DecodedStream { data, partial };
    }

    if current.partial {
        log::warn!("Stream decoded partially: {} bytes recovered", current.data.len());
    }
    Ok(current)
}

/// Encode `data` so that [`decode_filters`] with the same chain restores it.
///
/// Filters are applied in reverse order. Image codecs cannot be produced
/// here and fail with [`Error::UnsupportedFilter`].
pub fn encode_filters(data: &[u8], filters: &[(Filter, DecodeParams)]) -> Result<Vec<u8>> {
    let mut current = data.to_vec();
    for (filter, params) in filters.iter().rev() {
        if filter.is_image_codec() {
            return Err(Error::UnsupportedFilter(format!("cannot encode {}", filter.name())));
        }
        if filter.uses_predictor() && params.predictor > 1 {
            current = encode_predictor(&current, params)?;
        }
        current = filter_impl(*filter, params).encode(&current)?;
    }
    Ok(current)
}

fn check_limits(compressed_size: usize, decoded_size: usize, options: &ParserOptions) -> Result<()> {
    let max_ratio = options.max_decompression_ratio as usize;
    if max_ratio > 0 && decoded_size > RATIO_CHECK_THRESHOLD {
        let ratio = decoded_size / compressed_size;
        if ratio > max_ratio {
            return Err(Error::Decode(format!(
                "Decompression bomb detected: ratio {}:1 exceeds limit {}:1 (compressed: {} bytes, decompressed: {} bytes)",
                ratio, max_ratio, compressed_size, decoded_size
            )));
        }
    }

    let max_size = options.max_decompressed_size;
    if max_size > 0 && decoded_size > max_size {
        return Err(Error::Decode(format!(
            "Decompression bomb detected: decompressed size {} bytes exceeds limit {} bytes",
            decoded_size, max_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::dictionary;

    fn chain(names: &[&str]) -> Vec<(Filter, DecodeParams)> {
        names
            .iter()
            .map(|n| (Filter::from_name(n).unwrap(), DecodeParams::default()))
            .collect()
    }

    #[test]
    fn test_decode_no_filters() {
        let decoded = decode_stream_object(&Dictionary::new(), b"Hello", &ParserOptions::default()).unwrap();
        assert_eq!(decoded, DecodedStream::complete(b"Hello".to_vec()));
    }

    #[test]
    fn test_unsupported_filter() {
        let dict = dictionary([("Filter", Object::name("Bogus"))]);
        match filters_from_dict(&dict) {
            Err(Error::UnsupportedFilter(name)) => assert_eq!(name, "Bogus"),
            other => panic!("Expected UnsupportedFilter error, got {:?}", other),
        }
    }

    #[test]
    fn test_abbreviated_names() {
        assert_eq!(Filter::from_name("AHx"), Some(Filter::ASCIIHexDecode));
        assert_eq!(Filter::from_name("Fl"), Some(Filter::FlateDecode));
        assert_eq!(Filter::from_name("CCF"), Some(Filter::CCITTFaxDecode));
        assert_eq!(Filter::from_name("RL").map(|f| f.name()), Some("RunLengthDecode"));
    }

    #[test]
    fn test_filter_array_with_positional_params() {
        let dict = dictionary([
            (
                "Filter",
                Object::Array(vec![Object::name("ASCIIHexDecode"), Object::name("LZWDecode")]),
            ),
            (
                "DecodeParms",
                Object::Array(vec![
                    Object::Null,
                    Object::Dictionary(dictionary([("EarlyChange", Object::Integer(0))])),
                ]),
            ),
        ]);
        let filters = filters_from_dict(&dict).unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].0, Filter::ASCIIHexDecode);
        assert!(filters[0].1.early_change);
        assert!(!filters[1].1.early_change);
    }

    #[test]
    fn test_pipeline_order() {
        let filters = chain(&["ASCIIHexDecode", "FlateDecode"]);
        let encoded = encode_filters(b"pipeline payload", &filters).unwrap();
        assert!(encoded.iter().all(|b| b.is_ascii_hexdigit() || *b == b'>'));
        let decoded = decode_filters(&encoded, &filters, &ParserOptions::default()).unwrap();
        assert_eq!(decoded.data, b"pipeline payload");
        assert!(!decoded.partial);
    }

    #[test]
    fn test_image_codec_passes_through() {
        let dict = dictionary([("Filter", Object::name("DCTDecode"))]);
        let decoded = decode_stream_object(&dict, b"\xFF\xD8jpeg", &ParserOptions::default()).unwrap();
        assert_eq!(decoded.data, b"\xFF\xD8jpeg");
        assert!(!decoded.partial);
        assert!(encode_filters(b"x", &chain(&["DCTDecode"])).is_err());
    }

    #[test]
    fn test_truncated_input_is_partial() {
        let decoded = decode_filters(b"48656C6CZZ", &chain(&["ASCIIHexDecode"]), &ParserOptions::default()).unwrap();
        assert_eq!(decoded.data, b"Hell");
        assert!(decoded.partial);
    }

    #[test]
    fn test_decompressed_size_limit() {
        let filters = chain(&["FlateDecode"]);
        let encoded = encode_filters(&vec![0u8; 4096], &filters).unwrap();
        let options = ParserOptions {
            max_decompressed_size: 1024,
            ..ParserOptions::default()
        };
        assert!(matches!(decode_filters(&encoded, &filters, &options), Err(Error::Decode(_))));
    }

    #[test]
    fn test_ratio_limit_ignores_small_outputs() {
        let filters = chain(&["FlateDecode"]);
        let encoded = encode_filters(&vec![0u8; 64 * 1024], &filters).unwrap();
        let decoded = decode_filters(&encoded, &filters, &ParserOptions::default()).unwrap();
        assert_eq!(decoded.data.len(), 64 * 1024);
    }

    #[test]
    fn test_predictor_applied_after_flate() {
        let params = DecodeParams {
            predictor: 12,
            columns: 4,
            ..DecodeParams::default()
        };
        let filters = vec![(Filter::FlateDecode, params)];
        let data: Vec<u8> = (0u8..32).collect();
        let encoded = encode_filters(&data, &filters).unwrap();
        let decoded = decode_filters(&encoded, &filters, &ParserOptions::default()).unwrap();
        assert_eq!(decoded.data, data);
    }
}
