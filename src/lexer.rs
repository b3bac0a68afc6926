//! PDF lexer (tokenizer).
//!
//! This module provides low-level tokenization of PDF byte streams.
//! It recognizes all PDF token types including numbers, strings, names,
//! keywords, comments and delimiters.
//!
//! # PDF Syntax Overview
//!
//! PDF uses a PostScript-like syntax with the following token types:
//! - Numbers: integers (42, -123, +007) and reals (3.14, -2.5, .5, 5.)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: identifiers starting with / (/Type, /Pages, /A#20B)
//! - Keywords: true, false, null, obj, endobj, stream, endstream, R,
//!   xref, trailer, startxref, and any other run of regular characters
//! - Delimiters: `[`, `]`, `<<`, `>>`
//!
//! The lexer never fails. A byte sequence that does not start any token
//! yields [`Token::Error`] and scanning resumes at the next whitespace or
//! delimiter, which lets the repair path keep going over damaged files.

use crate::object::Name;
use nom::{
    IResult,
    bytes::complete::take_till,
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, opt},
    sequence::preceded,
};

/// Token types recognized by the PDF lexer.
///
/// Tokens are the atomic units of PDF syntax. The parser combines tokens
/// into higher-level objects (dictionaries, arrays, etc.).
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Comment text after `%`, up to (not including) the end of line
    Comment(&'a [u8]),

    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real (floating-point) number (e.g., 3.14, -2.5, .5)
    Real(f64),

    /// Boolean keyword
    Boolean(bool),

    /// Literal string with escape sequences already decoded
    String(Vec<u8>),

    /// Hexadecimal string, decoded to bytes
    HexString(Vec<u8>),

    /// Name (e.g., "Type" from "/Type"), `#XX` escapes decoded
    Name(Name),

    /// Any other run of regular characters (content operators, `n`/`f`
    /// markers in xref tables)
    Keyword(&'a [u8]),

    /// Null keyword
    Null,

    /// Array start delimiter [
    ArrayStart,

    /// Array end delimiter ]
    ArrayEnd,

    /// Dictionary start delimiter <<
    DictStart,

    /// Dictionary end delimiter >>
    DictEnd,

    /// Indirect object start keyword "obj"
    ObjStart,

    /// Indirect object end keyword "endobj"
    ObjEnd,

    /// Stream start keyword "stream"
    StreamStart,

    /// Stream end keyword "endstream"
    StreamEnd,

    /// Reference keyword "R" (used in "10 0 R")
    R,

    /// "xref" keyword
    XRef,

    /// "trailer" keyword
    Trailer,

    /// "startxref" keyword
    StartXRef,

    /// Bytes that do not form a token
    Error(&'a [u8]),

    /// End of input
    Eof,
}

/// PDF whitespace (PDF Ref 1.7, Table 3.1): NUL, TAB, LF, FF, CR, SPACE.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Regular characters: anything that is neither whitespace nor a delimiter.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

/// Parse a comment (% to end of line).
fn comment(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n'))(input)
}

/// Parse an integer or real number.
///
/// PDF numbers can be:
/// - Integers: 42, -123, +17, 007
/// - Reals: 3.14, -2.5, .5, 0., -.002
///
/// Integers that overflow `i64` are returned as reals.
fn number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    // Must have digits somewhere: "." and "-" alone are not numbers
    let has_digits = int_part.is_some() || matches!(frac_part, Some(Some(_)));
    if !has_digits {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)));
    }

    let mut text = String::new();
    if sign == Some('-') {
        text.push('-');
    }
    // digit1 only matches ASCII digits, so the lossy conversion never replaces anything
    text.push_str(&String::from_utf8_lossy(int_part.unwrap_or(&b"0"[..])));

    if let Some(frac) = frac_part {
        text.push('.');
        text.push_str(&String::from_utf8_lossy(frac.unwrap_or(&b"0"[..])));
        let value = text.parse::<f64>().unwrap_or(0.0);
        return Ok((input, Token::Real(value)));
    }

    match text.parse::<i64>() {
        Ok(value) => Ok((input, Token::Integer(value))),
        Err(_) => Ok((input, Token::Real(text.parse::<f64>().unwrap_or(0.0)))),
    }
}

/// Decode #XX escape sequences in PDF names.
///
/// PDF Spec: ISO 32000-1:2008, Section 7.3.5 - Name Objects
///
/// Invalid sequences are kept literally. The result is raw bytes: names are
/// not required to be UTF-8.
///
/// # Examples
///
/// ```
/// # use pdf_oxide_core::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), b"A B#C");
/// assert_eq!(decode_name_escapes(b"Type"), b"Type");
/// assert_eq!(decode_name_escapes(b"A#"), b"A#");
/// assert_eq!(decode_name_escapes(b"caf#E9"), b"caf\xE9");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            if let (Some(hi), Some(lo)) = (hex_value(raw[i + 1]), hex_value(raw[i + 2])) {
                bytes.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    bytes
}

/// Value of one hexadecimal digit.
pub(crate) fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Stateful tokenizer over a byte buffer.
///
/// The cursor can be saved with [`position`](Lexer::position) and restored
/// with [`seek`](Lexer::seek) at any token boundary, which is how the parser
/// implements its `N G R` lookahead.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Create a lexer positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to a byte offset.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    /// Whole input buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Unconsumed input.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Whether the cursor reached the end of input.
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Skip whitespace (not comments).
    pub fn skip_whitespace(&mut self) {
        while self.pos < self.data.len() && is_whitespace(self.data[self.pos]) {
            self.pos += 1;
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> Token<'a> {
        let saved = self.pos;
        let token = self.next_token();
        self.pos = saved;
        token
    }

    /// Next token that is not a comment.
    pub fn next_significant(&mut self) -> Token<'a> {
        loop {
            match self.next_token() {
                Token::Comment(_) => continue,
                token => return token,
            }
        }
    }

    /// Produce the next token, comments included.
    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        let start = self.pos;
        let data = self.data;

        let Some(&c) = data.get(start) else {
            return Token::Eof;
        };

        match c {
            b'%' => match comment(&data[start..]) {
                Ok((rest, text)) => {
                    self.pos = data.len() - rest.len();
                    Token::Comment(text)
                },
                Err(_) => self.error_from(start),
            },
            b'/' => {
                let mut end = start + 1;
                while end < data.len() && is_regular(data[end]) {
                    end += 1;
                }
                self.pos = end;
                Token::Name(Name::new(decode_name_escapes(&data[start + 1..end])))
            },
            b'(' => self.literal_string(start),
            b'<' => {
                if data.get(start + 1) == Some(&b'<') {
                    self.pos = start + 2;
                    Token::DictStart
                } else {
                    self.hex_string(start)
                }
            },
            b'>' => {
                if data.get(start + 1) == Some(&b'>') {
                    self.pos = start + 2;
                    Token::DictEnd
                } else {
                    self.error_from(start)
                }
            },
            b'[' => {
                self.pos = start + 1;
                Token::ArrayStart
            },
            b']' => {
                self.pos = start + 1;
                Token::ArrayEnd
            },
            b')' | b'{' | b'}' => self.error_from(start),
            _ => {
                let mut end = start;
                while end < data.len() && is_regular(data[end]) {
                    end += 1;
                }
                self.pos = end;
                classify_run(&data[start..end])
            },
        }
    }

    /// Emit an error token and resynchronize at the next whitespace or delimiter.
    fn error_from(&mut self, start: usize) -> Token<'a> {
        let mut end = start + 1;
        while end < self.data.len() && is_regular(self.data[end]) {
            end += 1;
        }
        self.pos = end;
        let bad = &self.data[start..end];
        log::trace!(
            "Lexical error at byte {}: {:?}",
            start,
            String::from_utf8_lossy(bad)
        );
        Token::Error(bad)
    }

    /// Literal string enclosed in parentheses.
    ///
    /// Handles balanced nested parentheses, the escapes `\n \r \t \b \f \( \) \\`,
    /// octal `\ddd` (1-3 digits), backslash line continuation, and normalizes
    /// unescaped CR/CRLF line ends to LF.
    fn literal_string(&mut self, start: usize) -> Token<'a> {
        let data = self.data;
        let mut out = Vec::new();
        let mut depth = 1usize;
        let mut i = start + 1;

        while i < data.len() {
            let c = data[i];
            match c {
                b'\\' => {
                    i += 1;
                    let Some(&esc) = data.get(i) else { break };
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'(' | b')' | b'\\' => out.push(esc),
                        b'0'..=b'7' => {
                            let mut value: u32 = 0;
                            let mut digits = 0;
                            while digits < 3 && i < data.len() && (b'0'..=b'7').contains(&data[i]) {
                                value = value * 8 + (data[i] - b'0') as u32;
                                i += 1;
                                digits += 1;
                            }
                            out.push((value & 0xFF) as u8);
                            continue;
                        },
                        b'\r' => {
                            // Line continuation: backslash + CR or CRLF
                            if data.get(i + 1) == Some(&b'\n') {
                                i += 1;
                            }
                        },
                        b'\n' => {},
                        // Unknown escape: the backslash is ignored
                        other => out.push(other),
                    }
                    i += 1;
                },
                b'(' => {
                    depth += 1;
                    out.push(c);
                    i += 1;
                },
                b')' => {
                    depth -= 1;
                    i += 1;
                    if depth == 0 {
                        self.pos = i;
                        return Token::String(out);
                    }
                    out.push(c);
                },
                b'\r' => {
                    out.push(b'\n');
                    i += 1;
                    if data.get(i) == Some(&b'\n') {
                        i += 1;
                    }
                },
                _ => {
                    out.push(c);
                    i += 1;
                },
            }
        }

        // Unterminated string
        self.error_from(start)
    }

    /// Hexadecimal string enclosed in angle brackets.
    ///
    /// Whitespace is ignored; an odd number of digits is padded with a
    /// trailing zero nibble.
    fn hex_string(&mut self, start: usize) -> Token<'a> {
        let data = self.data;
        let mut out = Vec::new();
        let mut high: Option<u8> = None;
        let mut i = start + 1;

        while i < data.len() {
            let c = data[i];
            if c == b'>' {
                if let Some(h) = high {
                    out.push(h << 4);
                }
                self.pos = i + 1;
                return Token::HexString(out);
            }
            if is_whitespace(c) {
                i += 1;
                continue;
            }
            match hex_value(c) {
                Some(v) => {
                    match high.take() {
                        Some(h) => out.push((h << 4) | v),
                        None => high = Some(v),
                    }
                    i += 1;
                },
                None => break,
            }
        }

        self.error_from(start)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = (usize, Token<'a>);

    /// Yields `(offset, token)` pairs until end of input.
    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let offset = self.pos;
        match self.next_token() {
            Token::Eof => None,
            token => Some((offset, token)),
        }
    }
}

/// Classify a run of regular characters as a number or keyword.
fn classify_run(run: &[u8]) -> Token<'_> {
    match run {
        b"true" => return Token::Boolean(true),
        b"false" => return Token::Boolean(false),
        b"null" => return Token::Null,
        b"obj" => return Token::ObjStart,
        b"endobj" => return Token::ObjEnd,
        b"stream" => return Token::StreamStart,
        b"endstream" => return Token::StreamEnd,
        b"R" => return Token::R,
        b"xref" => return Token::XRef,
        b"trailer" => return Token::Trailer,
        b"startxref" => return Token::StartXRef,
        _ => {},
    }

    if let Ok((_, token)) = all_consuming(number)(run) {
        return token;
    }

    Token::Keyword(run)
}

/// Tokenize a whole buffer, comments included.
pub fn tokenize(data: &[u8]) -> Vec<Token<'_>> {
    Lexer::new(data).map(|(_, token)| token).collect()
}
