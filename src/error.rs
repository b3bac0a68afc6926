//! Error types for the PDF engine.
//!
//! Reading is best-effort: lexical glitches, damaged cross-reference data and
//! truncated filter payloads are recovered from and only logged. The variants
//! below are what is left over when recovery is impossible, or when a caller
//! asked for something the file cannot provide. Writing is strict and reports
//! every problem before any byte reaches the destination.

use crate::object::ObjectRef;

/// Result type alias for PDF engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Mirrors the recovery policy of each layer: lexical and xref problems are
/// normally repaired internally, filter problems degrade to partial output,
/// and security problems are always surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed token.
    Lexical,
    /// Missing key, wrong type or broken object syntax.
    Structural,
    /// Cross-reference data that could not be used.
    XRefCorruption,
    /// Stream filter failure.
    Filter,
    /// Wrong password or unsupported encryption.
    Security,
    /// Underlying I/O failure.
    Io,
    /// Output could not be produced.
    Write,
    /// Caller requested cancellation.
    Cancelled,
}

/// Error types that can occur while reading or writing a PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)] // "Invalid" prefix is intentional for clarity
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Byte sequence that does not form any PDF token
    #[error("Lexical error at byte {offset}: unexpected '{found}'")]
    Lexical {
        /// Byte offset of the offending sequence
        offset: usize,
        /// Offending bytes, lossily rendered
        found: String,
    },

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Required dictionary entry is absent
    #[error("Missing required key /{0}")]
    MissingKey(String),

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Invalid cross-reference data
    #[error("Invalid cross-reference data: {0}")]
    InvalidXref(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Encryption failure (bad key material, malformed ciphertext)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Encryption scheme this handler does not implement
    #[error("Unsupported encryption: V={version}, R={revision}")]
    UnsupportedEncryption {
        /// /V entry
        version: u32,
        /// /R entry
        revision: u32,
    },

    /// Supplied password is neither the user nor the owner password
    #[error("Invalid password")]
    InvalidPassword,

    /// Document is locked; encrypted content cannot be returned
    #[error("Password required to access encrypted content")]
    PasswordRequired,

    /// Output could not be assembled
    #[error("Write error: {0}")]
    Write(String),

    /// Circular reference detected
    #[error("Circular reference detected: object {0}")]
    CircularReference(ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// Operation stopped through a cancel flag
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Lexical { .. } => ErrorKind::Lexical,
            Error::InvalidHeader(_)
            | Error::ParseError { .. }
            | Error::UnexpectedEof
            | Error::InvalidObjectType { .. }
            | Error::MissingKey(_)
            | Error::ObjectNotFound(..)
            | Error::CircularReference(_)
            | Error::RecursionLimitExceeded(_) => ErrorKind::Structural,
            Error::InvalidXref(_) => ErrorKind::XRefCorruption,
            Error::Decode(_) | Error::UnsupportedFilter(_) => ErrorKind::Filter,
            Error::Encryption(_)
            | Error::UnsupportedEncryption { .. }
            | Error::InvalidPassword
            | Error::PasswordRequired => ErrorKind::Security,
            Error::Write(_) => ErrorKind::Write,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for a structural parse error.
    pub(crate) fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Error::ParseError {
            offset,
            reason: reason.into(),
        }
    }
}
