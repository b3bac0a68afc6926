// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
#![warn(missing_docs)]

//! # PDF Oxide Core
//!
//! Low-level PDF engine: read, repair, decrypt and write PDF files at the
//! object level (ISO 32000-1:2008, ISO 32000-2 for AES-256).
//!
//! ## Core Features
//!
//! ### Reading
//! - **Lexer and Parser**: every object type, with strict and lenient modes
//! - **Cross-References**: tables, streams and hybrid files, `/Prev` chains
//! - **Repair**: brute-force object scan when the xref data is unusable
//! - **Object Streams**: lazy, expanded at most once, safe across threads
//! - **Stream Filters**: Flate, LZW, ASCIIHex, ASCII85, RunLength, predictors
//! - **Decompression limits**: ratio and absolute caps against bombs
//!
//! ### Security
//! - **Standard security handler**: R2-R6, RC4 40/128, AES-128, AES-256
//! - **Password classification**: owner, user or invalid
//! - **Permissions**: exposed, never enforced
//!
//! ### Writing
//! - **Full rewrite**: dense renumbering, optional object streams and
//!   garbage collection, encryption preserved, removed or applied
//! - **Incremental update**: original bytes untouched, `/Prev` chained
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_oxide_core::config::OpenOptions;
//! use pdf_oxide_core::document::Document;
//! use pdf_oxide_core::writer::{save_to_path, SaveOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = Document::open_path("input.pdf", OpenOptions::default().with_password("secret"))?;
//! let catalog = doc.catalog()?;
//! println!("catalog has {} entries", catalog.len());
//!
//! save_to_path(&doc, "output.pdf", &SaveOptions::full().with_object_streams(true))?;
//! # Ok(())
//! # }
//! ```

// Error handling
pub mod error;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod parser_config;
pub mod xref;
pub mod xref_reconstruction;

// Stream decoders
pub mod decoders;

// Encryption support
pub mod encryption;

// Open options
pub mod config;

// PDF writing
pub mod writer;

// Re-exports
pub use config::{CancelFlag, OpenOptions, PasswordPolicy};
pub use document::Document;
pub use error::{Error, Result};
pub use object::{Name, Object, ObjectRef};
pub use parser_config::ParserOptions;
pub use writer::{SaveMode, SaveOptions};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
