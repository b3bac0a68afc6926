//! PDF object parser.
//!
//! Recursive descent over [`Lexer`] tokens. Handles the two-token lookahead
//! that tells `10 0 R` (a reference) apart from two numbers, indirect object
//! definitions (`N G obj ... endobj`), and stream bodies whose `/Length`
//! may be missing, indirect or simply wrong.
//!
//! PDF Spec: ISO 32000-1:2008, Section 7.3 - Objects

use crate::error::{Error, Result};
use crate::lexer::{Lexer, Token};
use crate::object::{Dictionary, Object, ObjectRef, StringFormat};
use crate::parser_config::ParserOptions;

/// Resolves an indirect `/Length` while a stream body is being read.
///
/// Implemented by the document, which performs a one-off lookup through the
/// cross-reference table.
pub trait LengthResolver {
    /// Integer value of the referenced object, if it can be found.
    fn resolve_length(&self, reference: ObjectRef) -> Option<i64>;
}

/// Parser over a byte buffer.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    options: ParserOptions,
    resolver: Option<&'a dyn LengthResolver>,
}

impl<'a> Parser<'a> {
    /// Parser at the start of `data` with default (lenient) options.
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Parser positioned at byte `offset`.
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self {
            lexer: Lexer::at(data, offset),
            options: ParserOptions::default(),
            resolver: None,
        }
    }

    /// Replace the parser options.
    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a resolver for indirect `/Length` values.
    pub fn with_length_resolver(mut self, resolver: &'a dyn LengthResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    /// Move to a byte offset.
    pub fn seek(&mut self, offset: usize) {
        self.lexer.seek(offset);
    }

    /// Access the underlying lexer (xref tables are read token by token).
    pub fn lexer_mut(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Parse one object. A dictionary followed by `stream` becomes a stream.
    pub fn parse_object(&mut self) -> Result<Object> {
        let object = self.parse_value(0)?;
        match object {
            Object::Dictionary(dict) if self.peek() == Token::StreamStart => {
                self.lexer.next_significant();
                self.parse_stream_body(dict)
            },
            other => Ok(other),
        }
    }

    /// Parse `N G obj <object> endobj` at the current position.
    ///
    /// A missing `endobj` is tolerated unless the options forbid it.
    pub fn parse_indirect_object(&mut self) -> Result<(ObjectRef, Object)> {
        let start = self.position();
        let id = match self.lexer.next_significant() {
            Token::Integer(n) if (0..=u32::MAX as i64).contains(&n) => n as u32,
            other => return Err(Error::parse(start, format!("expected object number, found {:?}", other))),
        };
        let gen = match self.lexer.next_significant() {
            Token::Integer(g) if (0..=u16::MAX as i64).contains(&g) => g as u16,
            other => return Err(Error::parse(start, format!("expected generation, found {:?}", other))),
        };
        match self.lexer.next_significant() {
            Token::ObjStart => {},
            other => return Err(Error::parse(start, format!("expected 'obj', found {:?}", other))),
        }

        let reference = ObjectRef::new(id, gen);
        if self.peek() == Token::ObjEnd {
            self.lexer.next_significant();
            return Ok((reference, Object::Null));
        }

        let object = self.parse_object()?;

        if self.peek() == Token::ObjEnd {
            self.lexer.next_significant();
        } else if self.options.allow_missing_endobj {
            log::warn!("Object {} at byte {} has no 'endobj'", reference, start);
        } else {
            return Err(Error::parse(self.position(), format!("missing 'endobj' for object {}", reference)));
        }

        Ok((reference, object))
    }

    /// Next significant token without consuming it.
    fn peek(&mut self) -> Token<'a> {
        let saved = self.lexer.position();
        let token = self.lexer.next_significant();
        self.lexer.seek(saved);
        token
    }

    fn parse_value(&mut self, depth: usize) -> Result<Object> {
        if depth > self.options.max_nesting {
            return Err(Error::RecursionLimitExceeded(self.options.max_nesting as u32));
        }

        loop {
            let offset = self.lexer.position();
            let token = self.lexer.next_significant();
            return match token {
                Token::Integer(n) => Ok(self.integer_or_reference(n)),
                Token::Real(r) => Ok(Object::Real(r)),
                Token::Boolean(b) => Ok(Object::Boolean(b)),
                Token::Null => Ok(Object::Null),
                Token::String(s) => Ok(Object::String(s, StringFormat::Literal)),
                Token::HexString(s) => Ok(Object::String(s, StringFormat::Hexadecimal)),
                Token::Name(n) => Ok(Object::Name(n)),
                Token::ArrayStart => self.parse_array(depth + 1),
                Token::DictStart => self.parse_dictionary(depth + 1),
                Token::Error(bytes) => {
                    if self.options.strict {
                        return Err(lexical(offset, bytes));
                    }
                    log::warn!("Skipping malformed token at byte {}", offset);
                    continue;
                },
                Token::Eof => Err(Error::UnexpectedEof),
                other => Err(Error::parse(offset, format!("unexpected token {:?}", other))),
            };
        }
    }

    /// `N` alone, or `N G R` when both integers are followed by `R`.
    fn integer_or_reference(&mut self, n: i64) -> Object {
        let saved = self.lexer.position();
        if let Token::Integer(gen) = self.lexer.next_significant() {
            if self.lexer.next_significant() == Token::R
                && (0..=u32::MAX as i64).contains(&n)
                && (0..=u16::MAX as i64).contains(&gen)
            {
                return Object::Reference(ObjectRef::new(n as u32, gen as u16));
            }
        }
        self.lexer.seek(saved);
        Object::Integer(n)
    }

    fn parse_array(&mut self, depth: usize) -> Result<Object> {
        let mut items = Vec::new();
        loop {
            let offset = self.lexer.position();
            match self.peek() {
                Token::ArrayEnd => {
                    self.lexer.next_significant();
                    return Ok(Object::Array(items));
                },
                Token::Eof => {
                    if self.options.strict {
                        return Err(Error::UnexpectedEof);
                    }
                    log::warn!("Unterminated array at end of input");
                    return Ok(Object::Array(items));
                },
                Token::DictEnd | Token::ObjEnd | Token::StreamStart | Token::StreamEnd => {
                    if self.options.strict {
                        return Err(Error::parse(offset, "unterminated array"));
                    }
                    log::warn!("Unterminated array at byte {}", offset);
                    return Ok(Object::Array(items));
                },
                token @ (Token::Error(_) | Token::Keyword(_) | Token::R) => {
                    if self.options.strict {
                        return Err(Error::parse(offset, format!("unexpected token {:?} in array", token)));
                    }
                    log::warn!("Skipping unexpected token in array at byte {}", offset);
                    self.lexer.next_significant();
                },
                _ => items.push(self.parse_value(depth)?),
            }
        }
    }

    fn parse_dictionary(&mut self, depth: usize) -> Result<Object> {
        let mut dict = Dictionary::new();
        loop {
            let offset = self.lexer.position();
            match self.peek() {
                Token::DictEnd => {
                    self.lexer.next_significant();
                    return Ok(Object::Dictionary(dict));
                },
                Token::Eof => {
                    if self.options.strict {
                        return Err(Error::UnexpectedEof);
                    }
                    log::warn!("Unterminated dictionary at end of input");
                    return Ok(Object::Dictionary(dict));
                },
                Token::ArrayEnd | Token::ObjEnd | Token::StreamStart | Token::StreamEnd => {
                    if self.options.strict {
                        return Err(Error::parse(offset, "unterminated dictionary"));
                    }
                    log::warn!("Unterminated dictionary at byte {}", offset);
                    return Ok(Object::Dictionary(dict));
                },
                Token::Name(key) => {
                    self.lexer.next_significant();
                    let value = self.parse_dict_value(depth)?;
                    dict.insert(key, value);
                },
                other => {
                    if self.options.strict {
                        return Err(Error::parse(offset, format!("dictionary key must be a name, found {:?}", other)));
                    }
                    log::warn!("Skipping non-name dictionary key at byte {}", offset);
                    match other {
                        Token::ArrayStart | Token::DictStart => {
                            self.parse_value(depth)?;
                        },
                        _ => {
                            self.lexer.next_significant();
                        },
                    }
                },
            }
        }
    }

    fn parse_dict_value(&mut self, depth: usize) -> Result<Object> {
        let offset = self.lexer.position();
        match self.peek() {
            Token::DictEnd | Token::Eof | Token::ObjEnd | Token::StreamStart => {
                if self.options.strict {
                    return Err(Error::parse(offset, "dictionary key without value"));
                }
                log::warn!("Dictionary key without value at byte {}", offset);
                Ok(Object::Null)
            },
            Token::Keyword(bytes) => {
                if self.options.strict {
                    return Err(lexical(offset, bytes));
                }
                self.lexer.next_significant();
                log::warn!("Replacing unexpected keyword with null at byte {}", offset);
                Ok(Object::Null)
            },
            _ => self.parse_value(depth),
        }
    }

    /// Read raw stream bytes after the `stream` keyword.
    ///
    /// `/Length` is trusted only when `endstream` follows it; otherwise the
    /// bytes up to the next `endstream` are taken and the dictionary's
    /// length is corrected.
    fn parse_stream_body(&mut self, mut dict: Dictionary) -> Result<Object> {
        let data = self.lexer.data();
        let mut start = self.lexer.position();

        // The keyword is followed by CRLF or LF; a lone CR is tolerated.
        if data[start..].starts_with(b"\r\n") {
            start += 2;
        } else if data[start..].starts_with(b"\n") || data[start..].starts_with(b"\r") {
            start += 1;
        } else {
            log::debug!("No end-of-line after 'stream' at byte {}", start);
        }

        let declared = match dict.get("Length") {
            Some(Object::Integer(n)) => Some(*n),
            Some(Object::Reference(r)) => self.resolver.and_then(|res| res.resolve_length(*r)),
            _ => None,
        };

        let mut body = None;
        if let Some(len) = declared.filter(|&n| n >= 0).map(|n| n as usize) {
            if let Some(end) = start.checked_add(len).filter(|&end| end <= data.len()) {
                let mut after = Lexer::at(data, end);
                if after.next_significant() == Token::StreamEnd {
                    body = Some((end, after.position()));
                }
            }
            if body.is_none() {
                log::warn!("Stream /Length {} does not reach 'endstream' (stream at byte {})", len, start);
            }
        }

        let (end, resume) = match body {
            Some(found) => found,
            None => match find_keyword(data, start, b"endstream") {
                Some(pos) => (trim_eol(data, start, pos), pos + b"endstream".len()),
                None => {
                    if !self.options.allow_malformed_streams {
                        return Err(Error::parse(start, "stream without 'endstream'"));
                    }
                    log::warn!("Stream at byte {} has no 'endstream'; taking rest of input", start);
                    (data.len(), data.len())
                },
            },
        };

        let actual = (end - start) as i64;
        if dict.get("Length").and_then(Object::as_integer) != Some(actual) {
            dict.insert("Length".into(), Object::Integer(actual));
        }
        self.lexer.seek(resume);

        Ok(Object::Stream {
            dict,
            data: bytes::Bytes::copy_from_slice(&data[start..end]),
        })
    }
}

fn lexical(offset: usize, bytes: &[u8]) -> Error {
    Error::Lexical {
        offset,
        found: String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Drop one end-of-line marker that precedes `end`.
fn trim_eol(data: &[u8], start: usize, end: usize) -> usize {
    if end >= start + 2 && &data[end - 2..end] == b"\r\n" {
        end - 2
    } else if end > start && (data[end - 1] == b'\n' || data[end - 1] == b'\r') {
        end - 1
    } else {
        end
    }
}

/// Position of the first `keyword` at or after `from`.
pub(crate) fn find_keyword(data: &[u8], from: usize, keyword: &[u8]) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(keyword.len())
        .position(|window| window == keyword)
        .map(|p| from + p)
}

/// Position of the last `keyword` in `data`.
pub(crate) fn rfind_keyword(data: &[u8], keyword: &[u8]) -> Option<usize> {
    data.windows(keyword.len()).rposition(|window| window == keyword)
}

/// Parse a single object from a byte slice.
///
/// # Example
///
/// ```
/// use pdf_oxide_core::parser::parse_object;
///
/// let obj = parse_object(b"[ 1 2 /Name (string) [ 3 4 ] ]").unwrap();
/// assert_eq!(obj.as_array().map(|a| a.len()), Some(5));
/// ```
pub fn parse_object(input: &[u8]) -> Result<Object> {
    Parser::new(input).parse_object()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(input: &[u8]) -> Object {
        parse_object(input).unwrap()
    }

    fn strict(input: &[u8]) -> Result<Object> {
        Parser::new(input).with_options(ParserOptions::strict()).parse_object()
    }

    // ========================================================================
    // Primitive Tests
    // ========================================================================

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"-17"), Object::Integer(-17));
        assert_eq!(parse(b"3.5"), Object::Real(3.5));
        assert_eq!(parse(b"/Type"), Object::name("Type"));
        assert_eq!(parse(b"(Hi)"), Object::string("Hi"));
        assert_eq!(parse(b"<4869>"), Object::hex_string("Hi"));
    }

    #[test]
    fn test_leading_comment_is_skipped() {
        assert_eq!(parse(b"% header\n42"), Object::Integer(42));
    }

    // ========================================================================
    // Reference Tests
    // ========================================================================

    #[test]
    fn test_parse_indirect_reference() {
        assert_eq!(parse(b"10 0 R"), Object::Reference(ObjectRef::new(10, 0)));
        assert_eq!(parse(b"42 5 R"), Object::Reference(ObjectRef::new(42, 5)));
    }

    #[test]
    fn test_parse_integer_not_reference() {
        let mut parser = Parser::new(b"10 20");
        assert_eq!(parser.parse_object().unwrap(), Object::Integer(10));
        assert_eq!(parser.parse_object().unwrap(), Object::Integer(20));
    }

    #[test]
    fn test_negative_number_is_never_reference() {
        let obj = parse(b"[ -1 0 R ]");
        // "R" is a keyword the array skips in lenient mode
        assert_eq!(obj, Object::Array(vec![Object::Integer(-1), Object::Integer(0)]));
    }

    #[test]
    fn test_real_generation_is_not_reference() {
        assert_eq!(
            parse(b"[ 1 2.0 R ]"),
            Object::Array(vec![Object::Integer(1), Object::Real(2.0)])
        );
    }

    // ========================================================================
    // Array Tests
    // ========================================================================

    #[test]
    fn test_parse_empty_array() {
        assert_eq!(parse(b"[]"), Object::Array(vec![]));
    }

    #[test]
    fn test_parse_array_mixed_types() {
        assert_eq!(
            parse(b"[ 1 /Name (string) true ]"),
            Object::Array(vec![
                Object::Integer(1),
                Object::name("Name"),
                Object::string("string"),
                Object::Boolean(true),
            ])
        );
    }

    #[test]
    fn test_parse_nested_arrays() {
        assert_eq!(
            parse(b"[ 1 [ 2 3 ] 4 ]"),
            Object::Array(vec![
                Object::Integer(1),
                Object::Array(vec![Object::Integer(2), Object::Integer(3)]),
                Object::Integer(4),
            ])
        );
    }

    #[test]
    fn test_parse_array_with_references_and_numbers() {
        assert_eq!(
            parse(b"[ 10 0 R 20 0 R 7 8 9 ]"),
            Object::Array(vec![
                Object::Reference(ObjectRef::new(10, 0)),
                Object::Reference(ObjectRef::new(20, 0)),
                Object::Integer(7),
                Object::Integer(8),
                Object::Integer(9),
            ])
        );
    }

    #[test]
    fn test_unterminated_array() {
        assert_eq!(parse(b"[ 1 2"), Object::Array(vec![Object::Integer(1), Object::Integer(2)]));
        assert!(matches!(strict(b"[ 1 2"), Err(Error::UnexpectedEof)));
    }

    // ========================================================================
    // Dictionary Tests
    // ========================================================================

    #[test]
    fn test_parse_dictionary_multiple_entries() {
        let obj = parse(b"<< /Type /Page /Count 3 /Title (My Page) /Parent 2 0 R >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.len(), 4);
        assert_eq!(dict.get("Type").unwrap().as_name(), Some("Page"));
        assert_eq!(dict.get("Count").unwrap().as_integer(), Some(3));
        assert_eq!(dict.get("Title").unwrap().as_string(), Some(&b"My Page"[..]));
        assert_eq!(dict.get("Parent").unwrap().as_reference(), Some(ObjectRef::new(2, 0)));
    }

    #[test]
    fn test_parse_nested_dictionaries() {
        let obj = parse(b"<< /Outer << /Inner /Value >> /Box [0 0 612 792] >>");
        let outer = obj.as_dict().unwrap();
        let inner = outer.get("Outer").unwrap().as_dict().unwrap();
        assert_eq!(inner.get("Inner").unwrap().as_name(), Some("Value"));
        assert_eq!(outer.get("Box").unwrap().as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_dictionary_missing_value_becomes_null() {
        let obj = parse(b"<< /A 1 /B >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("B"), Some(&Object::Null));
        assert!(strict(b"<< /A 1 /B >>").is_err());
    }

    #[test]
    fn test_dictionary_non_name_key_skipped() {
        let obj = parse(b"<< 5 /A 1 >>");
        let entries: HashMap<_, _> = obj.as_dict().unwrap().clone().into_iter().collect();
        assert_eq!(entries.get(&crate::object::Name::from("A")), Some(&Object::Integer(1)));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_nesting_limit() {
        let options = ParserOptions {
            max_nesting: 3,
            ..ParserOptions::lenient()
        };
        let result = Parser::new(b"[[[[[1]]]]]").with_options(options).parse_object();
        assert!(matches!(result, Err(Error::RecursionLimitExceeded(3))));
        assert!(Parser::new(b"[[1]]").with_options(options).parse_object().is_ok());
    }

    #[test]
    fn test_malformed_token_skipped_in_lenient_mode() {
        assert_eq!(parse(b") 42"), Object::Integer(42));
        assert!(matches!(strict(b") 42"), Err(Error::Lexical { offset: 0, .. })));
    }

    // ========================================================================
    // Indirect Objects and Streams
    // ========================================================================

    #[test]
    fn test_parse_indirect_object() {
        let mut parser = Parser::new(b"12 0 obj\n<< /Type /Catalog >>\nendobj\n");
        let (reference, obj) = parser.parse_indirect_object().unwrap();
        assert_eq!(reference, ObjectRef::new(12, 0));
        assert_eq!(obj.dict_type(), Some("Catalog"));
    }

    #[test]
    fn test_missing_endobj() {
        let input = b"1 0 obj 42 2 0 obj";
        let (_, obj) = Parser::new(input).parse_indirect_object().unwrap();
        assert_eq!(obj, Object::Integer(42));
        let strict_result = Parser::new(input)
            .with_options(ParserOptions::strict())
            .parse_indirect_object();
        assert!(strict_result.is_err());
    }

    #[test]
    fn test_empty_indirect_object_is_null() {
        let (_, obj) = Parser::new(b"3 0 obj endobj").parse_indirect_object().unwrap();
        assert_eq!(obj, Object::Null);
    }

    #[test]
    fn test_stream_with_correct_length() {
        let input = b"1 0 obj\n<< /Length 5 >>\nstream\r\nHello\nendstream\nendobj";
        let (_, obj) = Parser::new(input).parse_indirect_object().unwrap();
        assert_eq!(obj.stream_data().unwrap().as_ref(), b"Hello");
    }

    #[test]
    fn test_stream_wrong_length_is_corrected() {
        let input = b"1 0 obj\n<< /Length 99 >>\nstream\nHello world\nendstream\nendobj";
        let (_, obj) = Parser::new(input).parse_indirect_object().unwrap();
        assert_eq!(obj.stream_data().unwrap().as_ref(), b"Hello world");
        assert_eq!(obj.as_dict().unwrap().get("Length"), Some(&Object::Integer(11)));
    }

    #[test]
    fn test_stream_short_length_is_corrected() {
        let input = b"<< /Length 2 >>\nstream\nHello\nendstream";
        let obj = parse(input);
        assert_eq!(obj.stream_data().unwrap().as_ref(), b"Hello");
    }

    #[test]
    fn test_stream_length_through_resolver() {
        struct Fixed;
        impl LengthResolver for Fixed {
            fn resolve_length(&self, reference: ObjectRef) -> Option<i64> {
                (reference == ObjectRef::new(9, 0)).then_some(4)
            }
        }
        let input = b"<< /Length 9 0 R >>\nstream\nab\ncdendstream";
        let resolver = Fixed;
        let obj = Parser::new(input).with_length_resolver(&resolver).parse_object().unwrap();
        assert_eq!(obj.stream_data().unwrap().as_ref(), b"ab\ncd");
        assert_eq!(obj.as_dict().unwrap().get("Length"), Some(&Object::Integer(5)));
    }

    #[test]
    fn test_stream_binary_payload_containing_keyword() {
        let mut input = b"<< /Length 12 >>\nstream\n".to_vec();
        input.extend_from_slice(b"xxendstreamx");
        input.extend_from_slice(b"\nendstream");
        let obj = parse(&input);
        assert_eq!(obj.stream_data().unwrap().as_ref(), b"xxendstreamx");
    }

    #[test]
    fn test_stream_without_endstream() {
        let input = b"<< >>\nstream\nabc";
        assert_eq!(parse(input).stream_data().unwrap().as_ref(), b"abc");
        assert!(strict(input).is_err());
    }

    #[test]
    fn test_find_keyword_helpers() {
        let data = b"a trailer b trailer c";
        assert_eq!(find_keyword(data, 0, b"trailer"), Some(2));
        assert_eq!(find_keyword(data, 3, b"trailer"), Some(12));
        assert_eq!(rfind_keyword(data, b"trailer"), Some(12));
        assert_eq!(find_keyword(data, 100, b"trailer"), None);
    }
}
