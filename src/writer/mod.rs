//! PDF writing module.
//!
//! Serializes a [`Document`] back to bytes, either as a complete rewrite or
//! as an incremental update appended after the original file.
//!
//! ## Architecture
//!
//! ```text
//! Document (+ pending updates)
//!     ↓
//! [save] (object selection, renumbering, encryption, packing)
//!     ↓
//! [PdfWriter] (offsets, xref table or stream, trailer)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! PDF bytes
//! ```
//!
//! Output is staged in memory and handed over only when complete; a failed
//! save never leaves a truncated file behind.
//!
//! ## Example
//!
//! ```
//! use pdf_oxide_core::document::Document;
//! use pdf_oxide_core::object::{dictionary, Object};
//! use pdf_oxide_core::writer::{save_to_bytes, SaveOptions, XRefLayout};
//!
//! let mut doc = Document::new((1, 7));
//! let pages = doc.add_object(Object::Dictionary(dictionary([
//!     ("Type", Object::name("Pages")),
//!     ("Kids", Object::Array(vec![])),
//!     ("Count", Object::Integer(0)),
//! ])));
//! let catalog = doc.add_object(Object::Dictionary(dictionary([
//!     ("Type", Object::name("Catalog")),
//!     ("Pages", Object::Reference(pages)),
//! ])));
//! doc.set_root(catalog);
//!
//! let bytes = save_to_bytes(&doc, &SaveOptions::default().with_xref_layout(XRefLayout::Table))?;
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! # Ok::<(), pdf_oxide_core::error::Error>(())
//! ```

mod object_serializer;
mod pdf_writer;
mod save;

pub use object_serializer::ObjectSerializer;
pub use pdf_writer::PdfWriter;

use crate::document::Document;
use crate::encryption::EncryptionConfig;
use crate::error::{Error, Result};
use std::io::Write;
use std::path::Path;

/// How much of the document is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Rewrite every live object with dense numbering.
    #[default]
    Full,
    /// Keep the original bytes and append changed objects, a new
    /// cross-reference section and a trailer whose `/Prev` points back.
    Incremental,
}

/// Form of the cross-reference section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XRefLayout {
    /// Full saves use a stream from PDF 1.5 on; incremental saves match the
    /// section they extend.
    #[default]
    Auto,
    /// Classic `xref` table.
    Table,
    /// Cross-reference stream (PDF 1.5).
    Stream,
}

/// Encryption of the output.
#[derive(Debug, Clone, Default)]
pub enum EncryptionMode {
    /// Keep the document's current security handler, if any.
    #[default]
    Preserve,
    /// Write everything in the clear.
    Remove,
    /// Encrypt with a new `/Encrypt` dictionary (full saves only).
    Apply(EncryptionConfig),
}

/// Options for saving a document.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Full rewrite or incremental append
    pub mode: SaveMode,
    /// Table or stream cross-reference section
    pub xref_layout: XRefLayout,
    /// Flate-encode unfiltered streams (and generated streams)
    pub compress: bool,
    /// Pack non-stream objects into object streams (full saves only)
    pub object_streams: bool,
    /// Drop objects unreachable from `/Root` and `/Info` (full saves only)
    pub garbage_collect: bool,
    /// Output encryption
    pub encryption: EncryptionMode,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            mode: SaveMode::Full,
            xref_layout: XRefLayout::Auto,
            compress: true,
            object_streams: false,
            garbage_collect: false,
            encryption: EncryptionMode::Preserve,
        }
    }
}

impl SaveOptions {
    /// Options for a full rewrite.
    pub fn full() -> Self {
        Self::default()
    }

    /// Options for an incremental update.
    pub fn incremental() -> Self {
        Self {
            mode: SaveMode::Incremental,
            ..Self::default()
        }
    }

    /// Choose the cross-reference layout.
    pub fn with_xref_layout(mut self, layout: XRefLayout) -> Self {
        self.xref_layout = layout;
        self
    }

    /// Enable or disable stream compression.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Enable or disable object stream packing.
    pub fn with_object_streams(mut self, enabled: bool) -> Self {
        self.object_streams = enabled;
        self
    }

    /// Enable or disable garbage collection.
    pub fn with_garbage_collection(mut self, enabled: bool) -> Self {
        self.garbage_collect = enabled;
        self
    }

    /// Choose the output encryption.
    pub fn with_encryption(mut self, encryption: EncryptionMode) -> Self {
        self.encryption = encryption;
        self
    }
}

/// Serialize `doc` and write the result to `out` in one piece.
pub fn save<W: Write>(doc: &Document, out: &mut W, options: &SaveOptions) -> Result<()> {
    let bytes = save::write_document(doc, options)?;
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

/// Serialize `doc` into memory.
pub fn save_to_bytes(doc: &Document, options: &SaveOptions) -> Result<Vec<u8>> {
    save::write_document(doc, options)
}

/// Serialize `doc` to `path`.
///
/// The output goes to a temporary file in the same directory that replaces
/// `path` only once it is complete, so the source file of an incremental
/// save may be the destination.
pub fn save_to_path(doc: &Document, path: impl AsRef<Path>, options: &SaveOptions) -> Result<()> {
    let path = path.as_ref();
    let bytes = save::write_document(doc, options)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(&bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| Error::Io(e.error))?;

    log::info!("Saved {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
