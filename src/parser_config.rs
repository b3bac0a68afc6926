//! Parser configuration for controlling lenient/strict parsing modes.

/// Parser options for controlling error handling and recovery behavior.
///
/// These options allow you to trade strict PDF compliance for broader compatibility
/// with malformed or non-standard PDF files.
///
/// # Example
///
/// ```
/// use pdf_oxide_core::parser_config::ParserOptions;
///
/// // Lenient mode - repair and continue (default)
/// let lenient = ParserOptions::lenient();
///
/// // Strict mode - fail on first structural error
/// let strict = ParserOptions::strict();
///
/// // Custom configuration
/// let custom = ParserOptions {
///     max_nesting: 32,
///     ..ParserOptions::lenient()
/// };
/// assert!(!custom.strict);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Fail on first error (true) or attempt recovery (false)
    ///
    /// In strict mode a damaged cross-reference table is an open error
    /// instead of triggering the brute-force repair scan, and a missing
    /// `endobj` is a parse error.
    pub strict: bool,

    /// Maximum object nesting depth (DoS protection)
    ///
    /// Prevents stack overflow from deeply nested arrays/dictionaries
    /// in malicious PDFs.
    ///
    /// PDF Spec: ISO 32000-1:2008, Section H.1 - Implementation Limits
    pub max_nesting: usize,

    /// Allow objects without "endobj" keyword
    pub allow_missing_endobj: bool,

    /// Allow streams with missing or incorrect Length
    pub allow_malformed_streams: bool,

    /// Maximum decompression ratio (decompressed:compressed)
    ///
    /// Only enforced once a stream expands past one mebibyte, so small,
    /// highly repetitive payloads are never rejected.
    ///
    /// Default: 100 (100:1 ratio). Set to 0 to disable check.
    pub max_decompression_ratio: u32,

    /// Maximum decompressed stream size in bytes
    ///
    /// Default: 100 MB. Set to 0 to disable check.
    pub max_decompressed_size: usize,

    /// Maximum depth of nested indirect lookups (e.g. `/Length` chains)
    pub max_recursion_depth: u32,

    /// Maximum PDF file size in bytes
    ///
    /// Default: 500 MB. Set to 0 to disable check.
    pub max_file_size: usize,

    /// Maximum number of cross-reference sections followed through `/Prev`
    pub max_xref_chain: usize,
}

impl Default for ParserOptions {
    /// Default configuration: lenient mode with error limits
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: fail on any structural error
    ///
    /// Use this for validating PDF compliance or when parsing trusted files.
    pub fn strict() -> Self {
        Self {
            strict: true,
            max_nesting: 100, // PDF spec recommended limit
            allow_missing_endobj: false,
            allow_malformed_streams: false,
            max_decompression_ratio: 100,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            max_recursion_depth: 100,
            max_file_size: 500 * 1024 * 1024, // 500 MB
            max_xref_chain: 100,
        }
    }

    /// Lenient mode: attempt to recover from parsing errors
    ///
    /// Use this for parsing potentially malformed PDFs from untrusted sources.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            max_nesting: 100,
            allow_missing_endobj: true,
            allow_malformed_streams: true,
            max_decompression_ratio: 100,
            max_decompressed_size: 100 * 1024 * 1024,
            max_recursion_depth: 100,
            max_file_size: 500 * 1024 * 1024,
            max_xref_chain: 100,
        }
    }

    /// Very lenient mode: maximum compatibility
    ///
    /// Use this for extracting data from heavily damaged PDFs.
    pub fn very_lenient() -> Self {
        Self {
            max_nesting: 200,
            max_decompression_ratio: 200,
            max_decompressed_size: 200 * 1024 * 1024, // 200 MB
            max_recursion_depth: 200,
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            max_xref_chain: 1000,
            ..Self::lenient()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_mode() {
        let opts = ParserOptions::strict();
        assert!(opts.strict);
        assert!(!opts.allow_missing_endobj);
        assert!(!opts.allow_malformed_streams);
    }

    #[test]
    fn test_lenient_mode() {
        let opts = ParserOptions::lenient();
        assert!(!opts.strict);
        assert!(opts.allow_missing_endobj);
        assert!(opts.allow_malformed_streams);
    }

    #[test]
    fn test_default_is_lenient() {
        assert_eq!(ParserOptions::default(), ParserOptions::lenient());
    }

    #[test]
    fn test_very_lenient_raises_limits() {
        let opts = ParserOptions::very_lenient();
        assert!(opts.max_nesting > ParserOptions::lenient().max_nesting);
        assert!(opts.max_xref_chain > ParserOptions::lenient().max_xref_chain);
        assert!(!opts.strict);
    }
}
