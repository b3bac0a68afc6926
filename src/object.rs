//! PDF object model.
//!
//! Objects form a tree; links between indirect objects are kept as
//! [`ObjectRef`] values that are resolved through the document's
//! cross-reference table, never as owning pointers. That keeps cyclic
//! documents (page -> parent -> kids -> page) representable without
//! reference cycles.

use crate::decoders::{self, DecodedStream};
use crate::error::{Error, Result};
use crate::parser_config::ParserOptions;
use indexmap::{Equivalent, IndexMap};
use std::hash::{Hash, Hasher};

/// Dictionary payload. Keys are names without the leading slash.
///
/// Insertion order is not significant for PDF semantics; an ordered map
/// keeps serialized output stable and close to the input order. Lookups
/// take plain `&str` keys (`dict.get("Type")`).
pub type Dictionary = IndexMap<Name, Object>;

/// PDF name: raw bytes with `#xx` escapes already decoded, without the
/// leading slash.
///
/// Names are byte strings, not text. `/caf#E9` and `/caf#C3#A9` are
/// different names and both survive a read/write cycle unchanged.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Name(Vec<u8>);

impl Name {
    /// Name from its decoded bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Name(bytes.into())
    }

    /// Decoded bytes of the name.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The name as text, when its bytes are UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Consume the name, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

// Must agree with `str`'s hash for UTF-8 names so `&str` lookups work.
impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.as_str() {
            Some(text) => text.hash(state),
            None => self.0.hash(state),
        }
    }
}

impl Equivalent<Name> for str {
    fn equivalent(&self, key: &Name) -> bool {
        self.as_bytes() == key.as_bytes()
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Name(name.as_bytes().to_vec())
    }
}

impl From<String> for Name {
    fn from(name: String) -> Self {
        Name(name.into_bytes())
    }
}

impl From<&[u8]> for Name {
    fn from(bytes: &[u8]) -> Self {
        Name(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Name {
    fn from(bytes: Vec<u8>) -> Self {
        Name(bytes)
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_str() {
            Some(text) => write!(f, "/{}", text),
            None => write!(f, "/{:02X?}", self.0),
        }
    }
}

/// How a string was written in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringFormat {
    /// `(...)` literal string
    #[default]
    Literal,
    /// `<...>` hexadecimal string
    Hexadecimal,
}

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String bytes plus the syntax it was written in
    String(Vec<u8>, StringFormat),
    /// Name (starting with /)
    Name(Name),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + raw, still filter-encoded data)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Stream data
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl Object {
    /// Literal string from anything byte-like.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(bytes.into(), StringFormat::Literal)
    }

    /// Hexadecimal string from anything byte-like.
    pub fn hex_string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(bytes.into(), StringFormat::Hexadecimal)
    }

    /// Name object.
    pub fn name(name: impl Into<Name>) -> Self {
        Object::Name(name.into())
    }

    /// Stream object; `/Length` is set from the payload.
    pub fn stream(mut dict: Dictionary, data: impl Into<bytes::Bytes>) -> Self {
        let data = data.into();
        dict.insert("Length".into(), Object::Integer(data.len() as i64));
        Object::Stream { dict, data }
    }

    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(..) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Check if this object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to real. Integers widen.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to cast to string bytes.
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s, _) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to name.
    ///
    /// Names whose bytes are not UTF-8 yield `None`; see [`Object::as_name_bytes`].
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(n) => n.as_str(),
            _ => None,
        }
    }

    /// Try to cast to name bytes.
    pub fn as_name_bytes(&self) -> Option<&[u8]> {
        match self {
            Object::Name(n) => Some(n.as_bytes()),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to cast to dictionary.
    ///
    /// Streams expose their dictionary as well.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable dictionary access, streams included.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Raw stream payload.
    pub fn stream_data(&self) -> Option<&bytes::Bytes> {
        match self {
            Object::Stream { data, .. } => Some(data),
            _ => None,
        }
    }

    /// `/Type` of a dictionary or stream.
    pub fn dict_type(&self) -> Option<&str> {
        self.as_dict()?.get("Type").and_then(|t| t.as_name())
    }

    /// True when this object, or anything nested in it, is a string or stream.
    pub fn contains_encryptable(&self) -> bool {
        match self {
            Object::String(..) | Object::Stream { .. } => true,
            Object::Array(items) => items.iter().any(Object::contains_encryptable),
            Object::Dictionary(dict) => dict.values().any(Object::contains_encryptable),
            _ => false,
        }
    }

    /// Run the stream's filter pipeline over its payload.
    ///
    /// The payload must already be decrypted; `Document::decoded_stream_bytes`
    /// takes care of that for objects loaded from a file. `/Length` must be
    /// direct, which holds for every stream produced by the parser.
    pub fn decode_stream_data(&self, options: &ParserOptions) -> Result<DecodedStream> {
        match self {
            Object::Stream { dict, data } => decoders::decode_stream_object(dict, data, options),
            _ => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Real(value)
    }
}

impl From<ObjectRef> for Object {
    fn from(value: ObjectRef) -> Self {
        Object::Reference(value)
    }
}

impl From<Dictionary> for Object {
    fn from(value: Dictionary) -> Self {
        Object::Dictionary(value)
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::Array(value)
    }
}

/// Build a [`Dictionary`] from `(key, value)` pairs.
///
/// ```
/// use pdf_oxide_core::object::{dictionary, Object};
///
/// let dict = dictionary([("Type", Object::name("Catalog"))]);
/// assert_eq!(dict.get("Type").and_then(|t| t.as_name()), Some("Catalog"));
/// ```
pub fn dictionary<K, I>(entries: I) -> Dictionary
where
    K: Into<Name>,
    I: IntoIterator<Item = (K, Object)>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_display() {
        assert_eq!(ObjectRef::new(10, 0).to_string(), "10 0 R");
        assert_eq!(ObjectRef::new(7, 3).to_string(), "7 3 R");
    }

    #[test]
    fn test_object_ref_ordering() {
        let mut refs = vec![ObjectRef::new(3, 0), ObjectRef::new(1, 2), ObjectRef::new(1, 0)];
        refs.sort();
        assert_eq!(refs, vec![ObjectRef::new(1, 0), ObjectRef::new(1, 2), ObjectRef::new(3, 0)]);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Object::Null.type_name(), "Null");
        assert_eq!(Object::string("x").type_name(), "String");
        assert_eq!(Object::stream(Dictionary::new(), vec![1u8]).type_name(), "Stream");
        assert_eq!(Object::Reference(ObjectRef::new(1, 0)).type_name(), "Reference");
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Object::Integer(42).as_integer(), Some(42));
        assert_eq!(Object::Integer(42).as_real(), Some(42.0));
        assert_eq!(Object::Real(1.5).as_integer(), None);
        assert_eq!(Object::Boolean(true).as_bool(), Some(true));
        assert_eq!(Object::name("Type").as_name(), Some("Type"));
        assert_eq!(Object::hex_string(vec![0xAB]).as_string(), Some(&[0xAB][..]));
        assert!(Object::Null.is_null());
        assert!(Object::Integer(0).as_dict().is_none());
    }

    #[test]
    fn test_string_format_is_preserved() {
        let literal = Object::string("abc");
        let hex = Object::hex_string("abc");
        assert_ne!(literal, hex);
        assert!(matches!(hex, Object::String(_, StringFormat::Hexadecimal)));
    }

    #[test]
    fn test_stream_sets_length() {
        let stream = Object::stream(Dictionary::new(), b"hello".to_vec());
        let dict = stream.as_dict().unwrap();
        assert_eq!(dict.get("Length").and_then(|l| l.as_integer()), Some(5));
        assert_eq!(stream.stream_data().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_names_are_bytes() {
        let latin1 = Name::new(b"caf\xE9".to_vec());
        let utf8 = Name::from("caf\u{e9}");
        assert_ne!(latin1, utf8);
        assert_eq!(latin1.as_str(), None);
        assert_eq!(utf8, "caf\u{e9}");

        let mut dict = Dictionary::new();
        dict.insert(latin1.clone(), Object::Integer(1));
        dict.insert(utf8, Object::Integer(2));
        assert_eq!(dict.len(), 2);
        assert_eq!(dict["caf\u{e9}"], Object::Integer(2));
        assert_eq!(dict[&latin1], Object::Integer(1));
        assert_eq!(Object::Name(latin1).as_name_bytes(), Some(&b"caf\xE9"[..]));
    }

    #[test]
    fn test_dict_type() {
        let obj = Object::Dictionary(dictionary([("Type", Object::name("Catalog"))]));
        assert_eq!(obj.dict_type(), Some("Catalog"));
        assert_eq!(Object::Null.dict_type(), None);
    }

    #[test]
    fn test_contains_encryptable() {
        assert!(!Object::Integer(1).contains_encryptable());
        assert!(Object::Array(vec![Object::Null, Object::string("s")]).contains_encryptable());
        let nested = Object::Dictionary(dictionary([(
            "Kids",
            Object::Array(vec![Object::Reference(ObjectRef::new(2, 0))]),
        )]));
        assert!(!nested.contains_encryptable());
    }

    #[test]
    fn test_decode_stream_data_requires_stream() {
        let result = Object::Integer(1).decode_stream_data(&ParserOptions::default());
        assert!(matches!(result, Err(Error::InvalidObjectType { .. })));
    }

    #[test]
    fn test_decode_stream_data_unfiltered() {
        let stream = Object::stream(Dictionary::new(), b"raw".to_vec());
        let decoded = stream.decode_stream_data(&ParserOptions::default()).unwrap();
        assert_eq!(decoded.data, b"raw");
        assert!(!decoded.partial);
    }
}
