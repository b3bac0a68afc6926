//! Cross-reference table parser.
//!
//! The xref table maps object numbers to byte offsets in the PDF file (or
//! to a slot inside an object stream), enabling random access to PDF
//! objects.
//!
//! Supports both traditional xref tables (PDF 1.0-1.4) and
//! cross-reference streams (PDF 1.5+), chained through `/Prev` for
//! incremental updates and `/XRefStm` for hybrid files. Sections are
//! visited newest first; the first entry seen for an object number wins,
//! and a free entry hides every older entry for that number.

use crate::config::CancelFlag;
use crate::decoders;
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Dictionary, Object};
use crate::parser::{Parser, rfind_keyword};
use crate::parser_config::ParserOptions;
use byteorder::{BigEndian, ByteOrder};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefLocation {
    /// Byte offset of `N G obj` in the file
    Offset(u64),
    /// Slot `index` inside object stream `container`
    Compressed {
        /// Object number of the ObjStm
        container: u32,
        /// Index within the stream header
        index: u32,
    },
    /// Free (deleted) object
    Free,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Generation number (always 0 for compressed entries)
    pub generation: u16,
    /// Location of the object
    pub location: XRefLocation,
}

impl XRefEntry {
    /// Create a new uncompressed entry.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            generation,
            location: XRefLocation::Offset(offset),
        }
    }

    /// Create a new compressed entry (object in object stream).
    pub fn compressed(container: u32, index: u32) -> Self {
        Self {
            generation: 0,
            location: XRefLocation::Compressed { container, index },
        }
    }

    /// Create a new free entry.
    pub fn free(generation: u16) -> Self {
        Self {
            generation,
            location: XRefLocation::Free,
        }
    }

    /// Whether this entry marks a deleted object.
    pub fn is_free(&self) -> bool {
        self.location == XRefLocation::Free
    }
}

/// Cross-reference table that maps object numbers to their locations.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dictionary,
    startxref: Option<u64>,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = trailer;
    }

    /// Merged trailer dictionary (newest section first).
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Offset named by the file's last `startxref`, if the table was read
    /// from a chain rather than reconstructed.
    pub fn startxref(&self) -> Option<u64> {
        self.startxref
    }

    /// Add or replace an entry.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Remove an entry.
    pub fn remove(&mut self, object_number: u32) -> Option<XRefEntry> {
        self.entries.remove(&object_number)
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Check if an object exists in the xref table.
    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    /// All object numbers, ascending.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// All entries, ascending by object number.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().map(|(n, e)| (*n, e))
    }

    /// Highest object number in the table.
    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Get the number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One xref table or stream plus its trailer.
#[derive(Debug, Clone)]
pub(crate) struct XRefSection {
    pub(crate) entries: Vec<(u32, XRefEntry)>,
    pub(crate) trailer: Dictionary,
}

/// Find the byte offset named by the last `startxref` keyword.
///
/// # Errors
///
/// Returns `Error::InvalidXref` if the keyword is missing or not followed
/// by a non-negative integer.
pub fn find_startxref(data: &[u8]) -> Result<u64> {
    // Search the tail first; fall back to the whole file for junk-padded files
    let tail_start = data.len().saturating_sub(4096);
    let pos = rfind_keyword(&data[tail_start..], b"startxref")
        .map(|p| p + tail_start)
        .or_else(|| rfind_keyword(data, b"startxref"))
        .ok_or_else(|| Error::InvalidXref("startxref not found".to_string()))?;

    let mut lexer = Lexer::at(data, pos + b"startxref".len());
    match lexer.next_significant() {
        Token::Integer(offset) if offset >= 0 => Ok(offset as u64),
        other => Err(Error::InvalidXref(format!("invalid startxref offset: {:?}", other))),
    }
}

/// Build the merged cross-reference table by walking the update chain.
///
/// Fails with `Error::InvalidXref` when any part of the chain is unusable or
/// the result does not pass [`validate`]; callers fall back to
/// [`reconstruct_xref`](crate::xref_reconstruction::reconstruct_xref).
pub fn load_xref(
    data: &[u8],
    options: &ParserOptions,
    cancel: Option<&CancelFlag>,
) -> Result<CrossRefTable> {
    let start = find_startxref(data)?;
    let mut table = CrossRefTable {
        startxref: Some(start),
        ..CrossRefTable::default()
    };
    let mut visited = HashSet::new();
    let mut next = Some(start);
    let mut newest = true;

    while let Some(offset) = next {
        CancelFlag::check(cancel)?;

        if !visited.insert(offset) {
            log::warn!("Cycle in /Prev chain at offset {}, stopping", offset);
            break;
        }
        if visited.len() > options.max_xref_chain {
            return Err(Error::InvalidXref(format!(
                "xref chain longer than {} sections",
                options.max_xref_chain
            )));
        }

        let mut section = parse_section(data, offset, options)?;
        log::debug!("XRef section at offset {}: {} entries", offset, section.entries.len());

        // Hybrid file: the referenced xref stream fills slots this table
        // left free or absent
        if let Some(stm_offset) = section.trailer.get("XRefStm").and_then(Object::as_integer) {
            let stm_offset = stm_offset.max(0) as u64;
            if visited.insert(stm_offset) {
                let stream = parse_section(data, stm_offset, options)?;
                merge_hybrid(&mut section, stream);
            }
        }

        for (number, entry) in section.entries {
            table.entries.entry(number).or_insert(entry);
        }

        next = section
            .trailer
            .get("Prev")
            .and_then(Object::as_integer)
            .filter(|&prev| prev >= 0)
            .map(|prev| prev as u64);

        if newest {
            table.trailer = section.trailer;
            newest = false;
        } else {
            for (key, value) in section.trailer {
                if key != "Prev" && key != "XRefStm" {
                    table.trailer.entry(key).or_insert(value);
                }
            }
        }
    }

    table.entries.retain(|_, entry| !entry.is_free());
    table.entries.remove(&0);

    validate(&table, data)?;
    Ok(table)
}

fn merge_hybrid(section: &mut XRefSection, stream: XRefSection) {
    let classic: HashMap<u32, XRefEntry> = section.entries.iter().copied().collect();
    for (number, entry) in stream.entries {
        match classic.get(&number) {
            Some(existing) if !existing.is_free() => {},
            Some(_) => {
                section.entries.retain(|(n, _)| *n != number);
                section.entries.push((number, entry));
            },
            None => section.entries.push((number, entry)),
        }
    }
}

/// Parse the table or stream at `offset`.
pub(crate) fn parse_section(data: &[u8], offset: u64, options: &ParserOptions) -> Result<XRefSection> {
    let offset = usize::try_from(offset)
        .ok()
        .filter(|&o| o < data.len())
        .ok_or_else(|| Error::InvalidXref(format!("xref offset {} outside file", offset)))?;

    let mut lexer = Lexer::at(data, offset);
    match lexer.next_significant() {
        Token::XRef => parse_table(data, lexer.position(), options),
        Token::Integer(_) => parse_stream(data, offset, options),
        other => Err(Error::InvalidXref(format!(
            "expected xref table or stream at offset {}, found {:?}",
            offset, other
        ))),
    }
}

/// Parse a traditional cross-reference table (PDF 1.0-1.4).
///
/// The xref table format is:
/// ```text
/// xref
/// 0 6             % Start at object 0, 6 entries
/// 0000000000 65535 f   % Object 0 (free)
/// 0000000018 00000 n   % Object 1 at byte 18
/// 0000000154 00000 n   % Object 2 at byte 154
/// ...
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn parse_table(data: &[u8], body: usize, options: &ParserOptions) -> Result<XRefSection> {
    let mut lexer = Lexer::at(data, body);
    let mut entries = Vec::new();

    loop {
        let start = match lexer.next_significant() {
            Token::Trailer => break,
            Token::Integer(n) if n >= 0 => n as u32,
            other => return Err(Error::InvalidXref(format!("bad subsection header: {:?}", other))),
        };
        let count = match lexer.next_significant() {
            Token::Integer(n) if (0..=10_000_000).contains(&n) => n as u32,
            other => return Err(Error::InvalidXref(format!("bad subsection count: {:?}", other))),
        };

        for i in 0..count {
            let offset = match lexer.next_significant() {
                Token::Integer(n) if n >= 0 => n as u64,
                other => return Err(Error::InvalidXref(format!("bad xref entry offset: {:?}", other))),
            };
            let generation = match lexer.next_significant() {
                Token::Integer(n) if (0..=u16::MAX as i64).contains(&n) => n as u16,
                other => return Err(Error::InvalidXref(format!("bad xref entry generation: {:?}", other))),
            };
            let entry = match lexer.next_significant() {
                Token::Keyword(b"n") => XRefEntry::uncompressed(offset, generation),
                Token::Keyword(b"f") => XRefEntry::free(generation),
                other => return Err(Error::InvalidXref(format!("bad xref entry type: {:?}", other))),
            };
            entries.push((start.saturating_add(i), entry));
        }
    }

    let mut parser = Parser::at(data, lexer.position()).with_options(*options);
    let trailer = match parser.parse_object() {
        Ok(Object::Dictionary(dict)) => dict,
        Ok(other) => {
            return Err(Error::InvalidXref(format!("trailer is a {}", other.type_name())));
        },
        Err(e) => return Err(Error::InvalidXref(format!("unreadable trailer: {}", e))),
    };

    Ok(XRefSection { entries, trailer })
}

/// Parse a cross-reference stream (PDF 1.5+).
///
/// The stream dictionary contains:
/// - `/W [w1 w2 w3]` - Field widths in bytes
/// - `/Size` - Total number of entries
/// - `/Index [start1 count1 start2 count2...]` - Optional subsection ranges
///
/// Each entry consists of 3 big-endian fields:
/// - Field 1: Entry type (0=free, 1=uncompressed, 2=compressed; default 1)
/// - Field 2: Offset (type 1) or container object number (type 2)
/// - Field 3: Generation (types 0, 1) or index within container (type 2)
fn parse_stream(data: &[u8], offset: usize, options: &ParserOptions) -> Result<XRefSection> {
    let (_, object) = Parser::at(data, offset)
        .with_options(*options)
        .parse_indirect_object()
        .map_err(|e| Error::InvalidXref(format!("unreadable xref stream: {}", e)))?;

    let Object::Stream { dict, data: raw } = object else {
        return Err(Error::InvalidXref("xref stream is not a stream object".to_string()));
    };
    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        return Err(Error::InvalidXref("expected /Type /XRef".to_string()));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| w.iter().filter_map(Object::as_integer).map(|v| v.max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(Error::InvalidXref(format!("invalid /W {:?}", widths)));
    }
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 {
        return Err(Error::InvalidXref("zero-width xref stream entries".to_string()));
    }

    let size = dict.get("Size").and_then(Object::as_integer).unwrap_or(0).max(0) as u32;
    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks_exact(2)
            .filter_map(|pair| Some((pair[0].as_integer()? as u32, pair[1].as_integer()? as u32)))
            .collect(),
        None => vec![(0, size)],
    };

    let decoded = decoders::decode_stream_object(&dict, &raw, options)?;
    let body = decoded.data;

    let field = |entry: &[u8], idx: usize, default: u64| -> u64 {
        let start: usize = widths[..idx].iter().sum();
        match widths[idx] {
            0 => default,
            w => BigEndian::read_uint(&entry[start..start + w], w),
        }
    };

    let mut entries = Vec::new();
    let mut records = body.chunks_exact(entry_size);
    'ranges: for (start, count) in ranges {
        for i in 0..count {
            let Some(entry) = records.next() else {
                log::warn!("XRef stream data ends early ({} bytes)", body.len());
                break 'ranges;
            };
            let number = start.saturating_add(i);
            let f2 = field(entry, 1, 0);
            let f3 = field(entry, 2, 0);
            let parsed = match field(entry, 0, 1) {
                0 => XRefEntry::free(f3 as u16),
                1 => XRefEntry::uncompressed(f2, f3 as u16),
                2 => XRefEntry::compressed(f2 as u32, f3 as u32),
                other => {
                    // Unknown types are references to the null object
                    log::debug!("Ignoring xref stream entry type {} for object {}", other, number);
                    continue;
                },
            };
            entries.push((number, parsed));
        }
    }

    Ok(XRefSection {
        entries,
        trailer: dict,
    })
}

/// Internal consistency check for a merged table.
///
/// The trailer must name a `/Root`, every in-file offset must land on the
/// matching `N G obj` header, and every compressed entry must point into a
/// container that is itself an in-file object.
pub fn validate(table: &CrossRefTable, data: &[u8]) -> Result<()> {
    if table.trailer.get("Root").and_then(Object::as_reference).is_none() {
        return Err(Error::InvalidXref("trailer has no /Root reference".to_string()));
    }

    for (number, entry) in table.iter() {
        match entry.location {
            XRefLocation::Offset(offset) => {
                if !header_matches(data, offset, number, entry.generation) {
                    return Err(Error::InvalidXref(format!(
                        "object {} not found at offset {}",
                        number, offset
                    )));
                }
            },
            XRefLocation::Compressed { container, .. } => {
                let in_file = table
                    .get(container)
                    .is_some_and(|c| matches!(c.location, XRefLocation::Offset(_)));
                if !in_file {
                    return Err(Error::InvalidXref(format!(
                        "object {} lives in missing object stream {}",
                        number, container
                    )));
                }
            },
            XRefLocation::Free => {},
        }
    }
    Ok(())
}

/// Whether `N G obj` for the given numbers starts at `offset`.
pub(crate) fn header_matches(data: &[u8], offset: u64, number: u32, generation: u16) -> bool {
    let Ok(offset) = usize::try_from(offset) else {
        return false;
    };
    if offset >= data.len() {
        return false;
    }
    let mut lexer = Lexer::at(data, offset);
    matches!(
        (lexer.next_token(), lexer.next_token(), lexer.next_token()),
        (Token::Integer(n), Token::Integer(g), Token::ObjStart)
            if n == number as i64 && g == generation as i64
    )
}
