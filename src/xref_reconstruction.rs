//! Cross-reference table reconstruction for damaged PDFs.
//!
//! When the xref chain is missing, corrupted, or fails its consistency
//! check, this module rebuilds it by scanning the entire file for
//! `N G obj` markers. Objects packed inside any object stream found during
//! the scan are indexed too, and the trailer is recovered from the last
//! `trailer` dictionary or the last object carrying `/Root`.
//!
//! This is a fallback mechanism used only when standard xref parsing fails.
//! It never fails except when cancelled.

use crate::config::CancelFlag;
use crate::decoders;
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm;
use crate::parser::Parser;
use crate::parser_config::ParserOptions;
use crate::xref::{CrossRefTable, XRefEntry, XRefLocation};
use lazy_static::lazy_static;
use std::collections::BTreeMap;

lazy_static! {
    /// Regex for finding "N G obj" patterns in PDF files
    static ref RE_OBJ_PATTERN: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(\d{1,10})[ \t\r\n\f\x00]+(\d{1,5})[ \t\r\n\f\x00]+obj").unwrap();

    /// Regex for finding "trailer <<" patterns
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"trailer\s*<<").unwrap();
}

/// Trailer keys carried over from whichever trailer-like dictionary has them.
const RECOVERED_KEYS: [&str; 4] = ["Root", "Encrypt", "Info", "ID"];

/// Facts about one readable object found by the scan.
struct Found {
    offset: u64,
    generation: u16,
    object_stream: bool,
    root: Option<Object>,
    catalog: bool,
}

/// Reconstruct the cross-reference table by scanning the entire file.
///
/// When an object number occurs more than once, the readable occurrence at
/// the highest byte offset wins. Occurrences whose bytes do not parse as an
/// object are discarded before the tie-break.
///
/// # Errors
///
/// Only `Error::Cancelled`, when `cancel` trips during the scan.
///
/// # Example
///
/// ```
/// use pdf_oxide_core::parser_config::ParserOptions;
/// use pdf_oxide_core::xref_reconstruction::reconstruct_xref;
///
/// let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";
/// let xref = reconstruct_xref(data, &ParserOptions::default(), None).unwrap();
/// assert_eq!(xref.len(), 1);
/// assert!(xref.trailer().contains_key("Root"));
/// ```
pub fn reconstruct_xref(
    data: &[u8],
    options: &ParserOptions,
    cancel: Option<&CancelFlag>,
) -> Result<CrossRefTable> {
    log::info!("Reconstructing xref table by scanning {} bytes...", data.len());

    let mut found: BTreeMap<u32, Found> = BTreeMap::new();
    let mut candidates = 0usize;

    for capture in RE_OBJ_PATTERN.captures_iter(data) {
        CancelFlag::check(cancel)?;
        candidates += 1;

        let (Some(whole), Some(num), Some(gen)) = (capture.get(0), capture.get(1), capture.get(2)) else {
            continue;
        };
        let Some(number) = parse_decimal::<u32>(num.as_bytes()) else {
            continue;
        };
        let Some(generation) = parse_decimal::<u16>(gen.as_bytes()) else {
            continue;
        };
        let offset = whole.start();

        // A digit run glued to a preceding regular character is not a header
        if offset > 0 && crate::lexer::is_regular(data[offset - 1]) {
            continue;
        }

        let parsed = Parser::at(data, offset).with_options(*options).parse_indirect_object();
        let object = match parsed {
            Ok((id, object)) if id == ObjectRef::new(number, generation) => object,
            Ok(_) => continue,
            Err(e) => {
                log::debug!("Skipping unreadable object header {} {} at offset {}: {}", number, generation, offset, e);
                continue;
            },
        };

        let dict = match &object {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        };
        let type_name = dict.and_then(|d| d.get("Type")).and_then(Object::as_name);

        // Later readable occurrences replace earlier ones
        found.insert(
            number,
            Found {
                offset: offset as u64,
                generation,
                object_stream: type_name == Some("ObjStm") && matches!(object, Object::Stream { .. }),
                root: dict.and_then(|d| d.get("Root")).cloned(),
                catalog: type_name == Some("Catalog"),
            },
        );
    }

    log::info!("Reconstructed {} objects from {} header candidates", found.len(), candidates);

    let mut xref = CrossRefTable::new();
    for (&number, f) in &found {
        xref.add_entry(number, XRefEntry::uncompressed(f.offset, f.generation));
    }

    let sources = trailer_sources(data, options, &found);

    // Object stream bodies of encrypted files cannot be read until a key
    // exists; the document falls back to what the direct scan found
    let encrypted = sources.iter().any(|(_, dict)| dict.contains_key("Encrypt"));
    let packed_catalogs = if encrypted {
        Vec::new()
    } else {
        index_object_streams(data, options, &found, &mut xref, cancel)?
    };

    let trailer = recover_trailer(&sources, &found, &packed_catalogs, &xref);
    xref.set_trailer(trailer);

    Ok(xref)
}

fn parse_decimal<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Add compressed entries for objects held in object streams. Direct
/// occurrences already in the table take precedence.
///
/// Returns the packed members that are catalogs, in file order.
fn index_object_streams(
    data: &[u8],
    options: &ParserOptions,
    found: &BTreeMap<u32, Found>,
    xref: &mut CrossRefTable,
    cancel: Option<&CancelFlag>,
) -> Result<Vec<ObjectRef>> {
    let mut containers: Vec<(u64, u32)> = found
        .iter()
        .filter(|(_, f)| f.object_stream)
        .map(|(&n, f)| (f.offset, n))
        .collect();
    containers.sort_unstable();

    let mut catalogs = Vec::new();
    for (offset, container) in containers {
        CancelFlag::check(cancel)?;

        let Ok((_, Object::Stream { dict, data: raw })) =
            Parser::at(data, offset as usize).with_options(*options).parse_indirect_object()
        else {
            continue;
        };
        let body = match decoders::decode_stream_object(&dict, &raw, options) {
            Ok(decoded) => decoded.data,
            Err(e) => {
                log::debug!("Cannot decode object stream {} during repair: {}", container, e);
                continue;
            },
        };
        let count = dict.get("N").and_then(Object::as_integer).unwrap_or(0);
        let first = dict.get("First").and_then(Object::as_integer).unwrap_or(0);
        let Ok(header) = objstm::read_header(&body, count, first) else {
            continue;
        };
        let first = first as usize;

        for (index, (number, relative)) in header.into_iter().enumerate() {
            let direct = xref
                .get(number)
                .is_some_and(|e| matches!(e.location, XRefLocation::Offset(_)));
            if direct || number == container {
                continue;
            }
            xref.add_entry(number, XRefEntry::compressed(container, index as u32));

            let member = Parser::at(&body, first + relative).with_options(*options).parse_object();
            if let Ok(Object::Dictionary(d)) = member {
                if d.get("Type").and_then(Object::as_name) == Some("Catalog") {
                    catalogs.push(ObjectRef::new(number, 0));
                }
            }
        }
    }
    Ok(catalogs)
}

/// Trailer-like dictionaries, newest first: `trailer` dictionaries and
/// objects carrying `/Root` (cross-reference streams).
fn trailer_sources(data: &[u8], options: &ParserOptions, found: &BTreeMap<u32, Found>) -> Vec<(u64, Dictionary)> {
    let mut sources: Vec<(u64, Dictionary)> = RE_TRAILER
        .find_iter(data)
        .filter_map(|m| {
            let start = m.start() + b"trailer".len();
            match Parser::at(data, start).with_options(*options).parse_object() {
                Ok(Object::Dictionary(dict)) => Some((m.start() as u64, dict)),
                _ => None,
            }
        })
        .collect();

    for f in found.values().filter(|f| f.root.is_some()) {
        if let Ok((_, object)) = Parser::at(data, f.offset as usize).with_options(*options).parse_indirect_object() {
            if let Some(dict) = match object {
                Object::Dictionary(d) => Some(d),
                Object::Stream { dict, .. } => Some(dict),
                _ => None,
            } {
                sources.push((f.offset, dict));
            }
        }
    }
    sources.sort_by(|a, b| b.0.cmp(&a.0));
    sources
}

/// Rebuild the trailer dictionary.
///
/// Takes `/Root` from the newest trailer-like dictionary whose root is in
/// the rebuilt table, then falls back to the last direct catalog object and
/// finally to the last packed one. `/Encrypt`, `/Info` and `/ID` are filled
/// from the newest trailer-like dictionary that has them.
fn recover_trailer(
    sources: &[(u64, Dictionary)],
    found: &BTreeMap<u32, Found>,
    packed_catalogs: &[ObjectRef],
    xref: &CrossRefTable,
) -> Dictionary {
    let mut trailer = Dictionary::new();
    for key in RECOVERED_KEYS {
        let value = sources.iter().find_map(|(_, dict)| match dict.get(key) {
            Some(Object::Reference(r)) if key == "Root" && !xref.contains(r.id) => None,
            other => other.cloned(),
        });
        if let Some(value) = value {
            trailer.insert(key.into(), value);
        }
    }

    if !trailer.contains_key("Root") {
        let catalog = found
            .iter()
            .filter(|(_, f)| f.catalog)
            .max_by_key(|(_, f)| f.offset)
            .map(|(&n, f)| ObjectRef::new(n, f.generation))
            .or_else(|| packed_catalogs.last().copied());
        match catalog {
            Some(root) => {
                log::info!("Recovered /Root from catalog object {}", root);
                trailer.insert("Root".into(), Object::Reference(root));
            },
            None => log::warn!("No catalog found during xref reconstruction"),
        }
    }

    let size = if xref.is_empty() { 1 } else { xref.max_object_number() as i64 + 1 };
    trailer.insert("Size".into(), Object::Integer(size));
    trailer
}
