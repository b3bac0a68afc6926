//! Object stream parsing (PDF 1.5+).
//!
//! Object streams (/Type /ObjStm) allow multiple objects to be compressed together
//! in a single stream for better compression ratios. This module handles parsing
//! these streams and materializing individual objects on demand.
//!
//! # Format
//!
//! An object stream has this structure:
//! ```text
//! N 0 obj
//! << /Type /ObjStm
//!    /N 5              % Number of objects in stream
//!    /First 30         % Byte offset to first object's data
//!    /Filter /FlateDecode
//! >>
//! stream
//! 10 0 11 15 12 28 13 42 14 55    % Pairs: (obj_num, offset)
//! <dict>                           % Object 10 at offset 0
//! <array>                          % Object 11 at offset 15
//! ...
//! endstream
//! endobj
//! ```
//!
//! The first part contains N pairs of integers (object number, byte offset relative
//! to /First). The second part contains the actual object data.
//!
//! Each contained object is parsed the first time it is requested and cached
//! in its own slot; concurrent requests for the same slot block on that slot
//! only. `/Extends` chains are not followed: every container is read on its
//! own.

use crate::decoders;
use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Dictionary, Object};
use crate::parser::Parser;
use crate::parser_config::ParserOptions;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Upper bound for `/N`.
const MAX_OBJECTS: i64 = 1_000_000;

/// A decoded object stream with lazily materialized members.
#[derive(Debug)]
pub struct ObjectStream {
    number: u32,
    body: Vec<u8>,
    first: usize,
    entries: Vec<(u32, usize)>,
    slots: Vec<OnceLock<Option<Object>>>,
    options: ParserOptions,
    parse_count: AtomicUsize,
    integrity_violations: AtomicUsize,
}

impl ObjectStream {
    /// Decode a container stream through its filters and read its header.
    ///
    /// The stream data must already be decrypted.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not a `/Type /ObjStm` stream, the
    /// filters fail, or `/N` and `/First` are missing or out of range.
    pub fn parse(number: u32, stream: &Object, options: &ParserOptions) -> Result<Self> {
        let Object::Stream { dict, data } = stream else {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: stream.type_name().to_string(),
            });
        };
        let decoded = decoders::decode_stream_object(dict, data, options)?;
        if decoded.partial {
            log::warn!("Object stream {} decoded only partially", number);
        }
        Self::from_body(number, dict, decoded.data, options)
    }

    /// Build from an already decoded body.
    pub fn from_body(number: u32, dict: &Dictionary, body: Vec<u8>, options: &ParserOptions) -> Result<Self> {
        if let Some(type_name) = dict.get("Type").and_then(Object::as_name) {
            if type_name != "ObjStm" {
                return Err(Error::parse(
                    0,
                    format!("expected /Type /ObjStm, got /Type /{}", type_name),
                ));
            }
        }
        if dict.contains_key("Extends") {
            log::debug!("Object stream {} has /Extends; ignored", number);
        }

        let count = dict
            .get("N")
            .and_then(Object::as_integer)
            .ok_or_else(|| Error::MissingKey("N".to_string()))?;
        let first = dict
            .get("First")
            .and_then(Object::as_integer)
            .ok_or_else(|| Error::MissingKey("First".to_string()))?;

        let entries = read_header(&body, count, first)?;
        let slots = (0..entries.len()).map(|_| OnceLock::new()).collect();

        Ok(Self {
            number,
            body,
            first: first as usize,
            entries,
            slots,
            options: *options,
            parse_count: AtomicUsize::new(0),
            integrity_violations: AtomicUsize::new(0),
        })
    }

    /// Object number of the container.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Number of contained objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container holds no objects.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Contained object numbers in header order.
    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    /// Slot index of an object number.
    pub fn index_of(&self, object_number: u32) -> Option<usize> {
        self.entries.iter().position(|(n, _)| *n == object_number)
    }

    /// Object at slot `index`, parsing it on first access.
    ///
    /// # Errors
    ///
    /// `ParseError` for an out-of-range index or when the slot's bytes do
    /// not form an object.
    pub fn get(&self, index: usize) -> Result<&Object> {
        let (number, _) = *self.entries.get(index).ok_or_else(|| {
            Error::parse(0, format!("slot {} outside object stream {}", index, self.number))
        })?;

        let slot = self.slots[index].get_or_init(|| self.materialize(index));
        slot.as_ref().ok_or_else(|| {
            Error::parse(
                self.first + self.entries[index].1,
                format!("object {} in object stream {} is unreadable", number, self.number),
            )
        })
    }

    /// Object with the given number, parsing it on first access.
    pub fn get_by_number(&self, object_number: u32) -> Result<&Object> {
        let index = self
            .index_of(object_number)
            .ok_or(Error::ObjectNotFound(object_number, 0))?;
        self.get(index)
    }

    /// How many slots have been parsed so far.
    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::Relaxed)
    }

    /// How many contained objects turned out to be streams.
    pub fn integrity_violations(&self) -> usize {
        self.integrity_violations.load(Ordering::Relaxed)
    }

    fn materialize(&self, index: usize) -> Option<Object> {
        self.parse_count.fetch_add(1, Ordering::Relaxed);

        let (number, relative) = self.entries[index];
        let start = self.first + relative;
        let end = self
            .entries
            .get(index + 1)
            .map(|(_, next)| self.first + next)
            .filter(|&end| end > start)
            .unwrap_or(self.body.len());

        let mut parser = Parser::at(&self.body[..end], start).with_options(self.options);
        match parser.parse_object() {
            Ok(Object::Stream { .. }) => {
                self.integrity_violations.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Object {} in object stream {} is a stream; substituting null",
                    number,
                    self.number
                );
                Some(Object::Null)
            },
            Ok(object) => Some(object),
            Err(e) => {
                log::warn!("Failed to parse object {} in object stream {}: {}", number, self.number, e);
                None
            },
        }
    }
}

/// Read the `(object number, relative offset)` pairs before `/First`.
///
/// Fewer pairs than `/N` is tolerated; pairs whose offset lies past the end of
/// the body are dropped.
pub(crate) fn read_header(body: &[u8], count: i64, first: i64) -> Result<Vec<(u32, usize)>> {
    if !(0..=MAX_OBJECTS).contains(&count) {
        return Err(Error::parse(0, format!("invalid object stream /N value: {}", count)));
    }
    let first = usize::try_from(first)
        .ok()
        .filter(|&f| f <= body.len())
        .ok_or_else(|| Error::parse(0, format!("object stream /First {} outside {} byte body", first, body.len())))?;

    let mut lexer = Lexer::new(&body[..first]);
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (Token::Integer(number), Token::Integer(offset)) = (lexer.next_significant(), lexer.next_significant())
        else {
            log::warn!("Object stream header ends after {} of {} pairs", entries.len(), count);
            break;
        };
        let in_body = usize::try_from(offset).ok().filter(|&o| first + o < body.len());
        match (u32::try_from(number), in_body) {
            (Ok(number), Some(offset)) => entries.push((number, offset)),
            _ => log::warn!("Skipping object stream header pair ({}, {})", number, offset),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::dictionary;
    use std::sync::Arc;

    fn container(body: &[u8], n: i64, first: i64) -> ObjectStream {
        let dict = dictionary([
            ("Type", Object::name("ObjStm")),
            ("N", Object::Integer(n)),
            ("First", Object::Integer(first)),
        ]);
        ObjectStream::from_body(12, &dict, body.to_vec(), &ParserOptions::default()).unwrap()
    }

    #[test]
    fn test_read_header() {
        let header = read_header(b"10 0 11 3 42 (x)", 2, 10).unwrap();
        assert_eq!(header, vec![(10, 0), (11, 3)]);
    }

    #[test]
    fn test_read_header_rejects_bad_first() {
        assert!(read_header(b"1 0", 1, 99).is_err());
        assert!(read_header(b"1 0", 1, -1).is_err());
        assert!(read_header(b"1 0", -5, 0).is_err());
    }

    #[test]
    fn test_short_header_is_tolerated() {
        let header = read_header(b"10 0 x", 3, 6).unwrap();
        assert_eq!(header, vec![]);
        let header = read_header(b"10 0 11 (abcdef)", 2, 8).unwrap();
        assert_eq!(header, vec![(10, 0)]);
    }

    #[test]
    fn test_lazy_members() {
        let objs = container(b"10 0 11 3 42 /Name", 2, 10);
        assert_eq!(objs.len(), 2);
        assert_eq!(objs.parse_count(), 0);

        assert_eq!(objs.get_by_number(11).unwrap(), &Object::name("Name"));
        assert_eq!(objs.parse_count(), 1);
        assert_eq!(objs.get(0).unwrap(), &Object::Integer(42));
        assert_eq!(objs.get(0).unwrap(), &Object::Integer(42));
        assert_eq!(objs.parse_count(), 2);
        assert_eq!(objs.object_numbers().collect::<Vec<_>>(), vec![10, 11]);
    }

    #[test]
    fn test_member_bounded_by_next_offset() {
        // Object 1's bytes stop where object 2 starts
        let objs = container(b"1 0 2 2 5 6", 2, 8);
        assert_eq!(objs.get(0).unwrap(), &Object::Integer(5));
        assert_eq!(objs.get(1).unwrap(), &Object::Integer(6));
    }

    #[test]
    fn test_stream_member_becomes_null() {
        let body = b"1 0 2 37 << /Length 3 >> stream\nabc\nendstream (ok)";
        let objs = container(body, 2, 9);
        assert_eq!(objs.get(0).unwrap(), &Object::Null);
        assert_eq!(objs.integrity_violations(), 1);
        assert_eq!(objs.get(1).unwrap(), &Object::string(b"ok".to_vec()));
    }

    #[test]
    fn test_unreadable_member_is_an_error_for_that_object_only() {
        let strict = ParserOptions::strict();
        let dict = dictionary([("N", Object::Integer(2)), ("First", Object::Integer(8))]);
        let objs = ObjectStream::from_body(3, &dict, b"1 0 2 2 ) (fine)".to_vec(), &strict).unwrap();
        assert!(objs.get(0).is_err());
        assert!(objs.get(0).is_err());
        assert_eq!(objs.parse_count(), 1);
        assert_eq!(objs.get(1).unwrap(), &Object::string(b"fine".to_vec()));
    }

    #[test]
    fn test_missing_n_is_an_error() {
        let dict = dictionary([("First", Object::Integer(0))]);
        assert!(matches!(
            ObjectStream::from_body(1, &dict, Vec::new(), &ParserOptions::default()),
            Err(Error::MissingKey(key)) if key == "N"
        ));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let dict = dictionary([
            ("Type", Object::name("XRef")),
            ("N", Object::Integer(0)),
            ("First", Object::Integer(0)),
        ]);
        assert!(ObjectStream::from_body(1, &dict, Vec::new(), &ParserOptions::default()).is_err());
    }

    #[test]
    fn test_concurrent_access_parses_once() {
        let objs = Arc::new(container(b"7 0 8 11 << /A 1 >> [1 2 3]", 2, 9));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let objs = Arc::clone(&objs);
                std::thread::spawn(move || objs.get_by_number(8).unwrap().clone())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_array().map(Vec::len), Some(3));
        }
        assert_eq!(objs.parse_count(), 1);
    }

    #[test]
    fn test_parse_decodes_filters() {
        use crate::decoders::{FlateDecoder, StreamFilter};
        let body = b"5 0 (packed)";
        let compressed = FlateDecoder.encode(body).unwrap();
        let dict = dictionary([
            ("Type", Object::name("ObjStm")),
            ("N", Object::Integer(1)),
            ("First", Object::Integer(4)),
            ("Filter", Object::name("FlateDecode")),
        ]);
        let stream = Object::stream(dict, compressed);
        let objs = ObjectStream::parse(20, &stream, &ParserOptions::default()).unwrap();
        assert_eq!(objs.get_by_number(5).unwrap(), &Object::string(b"packed".to_vec()));
    }
}
