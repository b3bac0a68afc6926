//! PDF document model.
//!
//! A [`Document`] owns the file bytes, the merged cross-reference table, the
//! active trailer and the security handler. Objects are parsed on demand and
//! cached; links between objects stay as [`ObjectRef`] keys resolved through
//! the table.

use crate::config::{CancelFlag, OpenOptions, PasswordPolicy};
use crate::decoders::{self, DecodedStream};
use crate::encryption::{PasswordValidity, Permissions, SecurityContext, SecurityHandler};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Name, Object, ObjectRef};
use crate::objstm::ObjectStream;
use crate::parser::{LengthResolver, Parser};
use crate::xref::{self, CrossRefTable, XRefLocation};
use crate::xref_reconstruction::reconstruct_xref;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// How far into the file the `%PDF-` header may start.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Pending edit to one object number.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Update {
    /// Object added or replaced, with its generation
    Set(u16, Object),
    /// Object deleted; carries the generation it had
    Deleted(u16),
}

type ContainerSlot = Arc<Mutex<Option<Arc<ObjectStream>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// PDF document.
///
/// Resolution takes `&self`, so a document can be shared between threads;
/// edits take `&mut self`.
///
/// # Example
///
/// ```
/// use pdf_oxide_core::config::OpenOptions;
/// use pdf_oxide_core::document::Document;
/// use pdf_oxide_core::object::{dictionary, Object};
///
/// let mut doc = Document::new((1, 7));
/// let catalog = doc.add_object(Object::Dictionary(dictionary([("Type", Object::name("Catalog"))])));
/// doc.set_root(catalog);
/// let bytes = pdf_oxide_core::writer::save_to_bytes(&doc, &Default::default())?;
///
/// let reopened = Document::from_bytes(bytes, OpenOptions::default())?;
/// assert_eq!(reopened.catalog()?.get("Type"), Some(&Object::name("Catalog")));
/// # Ok::<(), pdf_oxide_core::error::Error>(())
/// ```
pub struct Document {
    data: Bytes,
    version: (u8, u8),
    xref: CrossRefTable,
    trailer: Dictionary,
    security: Option<SecurityHandler>,
    encrypt_ref: Option<ObjectRef>,
    options: OpenOptions,
    repaired: bool,
    cache: RwLock<HashMap<ObjectRef, Object>>,
    containers: Mutex<HashMap<u32, ContainerSlot>>,
    updates: BTreeMap<u32, Update>,
    next_number: u32,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("bytes", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .field("encrypted", &self.security.is_some())
            .field("repaired", &self.repaired)
            .field("pending_updates", &self.updates.len())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Create an empty document for building from scratch.
    ///
    /// Set a catalog with [`set_root`](Self::set_root) before saving.
    pub fn new(version: (u8, u8)) -> Self {
        Self {
            data: Bytes::new(),
            version,
            xref: CrossRefTable::new(),
            trailer: Dictionary::new(),
            security: None,
            encrypt_ref: None,
            options: OpenOptions::default(),
            repaired: false,
            cache: RwLock::new(HashMap::new()),
            containers: Mutex::new(HashMap::new()),
            updates: BTreeMap::new(),
            next_number: 1,
        }
    }

    /// Read a whole document from `reader`.
    pub fn open<R: Read>(mut reader: R, options: OpenOptions) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(data, options)
    }

    /// Open a document from a file path.
    pub fn open_path(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data, options)
    }

    /// Open a document held in memory.
    ///
    /// The cross-reference chain is loaded first; if it is unusable and the
    /// parser is lenient, the file is scanned for objects instead. For
    /// encrypted files the supplied password (or the empty password) is
    /// tried and [`PasswordPolicy`] decides what a failure means.
    ///
    /// # Errors
    ///
    /// - `InvalidHeader` when no `%PDF-` header is found (strict parser only)
    /// - `InvalidXref` when the table is damaged and the parser is strict
    /// - `InvalidPassword`/`PasswordRequired` under [`PasswordPolicy::Strict`]
    /// - `UnsupportedEncryption` for security handlers other than Standard
    pub fn from_bytes(data: impl Into<Bytes>, options: OpenOptions) -> Result<Self> {
        let data: Bytes = data.into();
        let parser = options.parser;
        if parser.max_file_size > 0 && data.len() > parser.max_file_size {
            return Err(Error::parse(
                0,
                format!("file of {} bytes exceeds the {} byte limit", data.len(), parser.max_file_size),
            ));
        }

        let version = parse_header(&data, parser.strict)?;
        let cancel = options.cancel.as_ref();

        let (xref, repaired) = match xref::load_xref(&data, &parser, cancel) {
            Ok(table) => (table, false),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) if parser.strict => return Err(e),
            Err(e) => {
                log::warn!("Cross-reference data unusable ({}), rebuilding by scanning", e);
                (reconstruct_xref(&data, &parser, cancel)?, true)
            },
        };

        let trailer = xref.trailer().clone();
        let next_number = next_free_number(&xref, &trailer);
        let mut document = Self {
            data,
            version,
            xref,
            trailer,
            security: None,
            encrypt_ref: None,
            options,
            repaired,
            cache: RwLock::new(HashMap::new()),
            containers: Mutex::new(HashMap::new()),
            updates: BTreeMap::new(),
            next_number,
        };
        document.init_security()?;

        log::debug!(
            "Opened PDF {}.{} with {} objects{}",
            version.0,
            version.1,
            document.xref.len(),
            if repaired { " (repaired)" } else { "" }
        );
        Ok(document)
    }

    fn init_security(&mut self) -> Result<()> {
        let encrypt = match self.trailer.get("Encrypt") {
            None | Some(Object::Null) => return Ok(()),
            Some(Object::Reference(r)) => {
                self.encrypt_ref = Some(*r);
                // No handler exists yet, so this loads the dictionary as stored
                self.resolve(*r)?
            },
            Some(other) => other.clone(),
        };
        let encrypt = encrypt.as_dict().cloned().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: encrypt.type_name().to_string(),
        })?;

        let file_id = match self.trailer.get("ID").and_then(Object::as_array).and_then(|ids| ids.first()) {
            Some(id) => id.as_string().map(<[u8]>::to_vec).unwrap_or_default(),
            None => {
                log::warn!("Encrypted file has no /ID; using an empty file identifier");
                Vec::new()
            },
        };

        let mut handler = SecurityHandler::new(&encrypt, &file_id)?;
        let supplied = self.options.password.clone();
        let attempt = match &supplied {
            Some(password) => Some(password.as_slice()),
            None if self.options.try_empty_password => Some(&b""[..]),
            None => None,
        };
        if let Some(password) = attempt {
            handler.authenticate(password)?;
        }

        if !handler.is_authenticated() {
            match self.options.password_policy {
                PasswordPolicy::Strict if attempt.is_some() => return Err(Error::InvalidPassword),
                PasswordPolicy::Strict => return Err(Error::PasswordRequired),
                PasswordPolicy::Locked => {
                    log::warn!("No password unlocked the document; encrypted content stays unavailable");
                },
            }
        }
        self.security = Some(handler);
        Ok(())
    }

    /// Try another password on an encrypted document.
    ///
    /// A successful attempt unlocks the document; a failed one leaves an
    /// earlier successful authentication in place.
    pub fn authenticate(&mut self, password: &[u8]) -> Result<PasswordValidity> {
        match self.security.as_mut() {
            Some(handler) => handler.authenticate(password),
            None => Ok(PasswordValidity::OwnerPassword),
        }
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Active trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Set a trailer entry such as `/Info`.
    pub fn set_trailer_entry(&mut self, key: impl Into<Name>, value: Object) {
        self.trailer.insert(key.into(), value);
    }

    /// Point the trailer's `/Root` at `catalog`.
    pub fn set_root(&mut self, catalog: ObjectRef) {
        self.trailer.insert("Root".into(), Object::Reference(catalog));
    }

    /// The `/Root` reference.
    pub fn root(&self) -> Option<ObjectRef> {
        self.trailer.get("Root").and_then(Object::as_reference)
    }

    /// Resolve the document catalog.
    pub fn catalog(&self) -> Result<Dictionary> {
        let root = self.root().ok_or_else(|| Error::MissingKey("Root".to_string()))?;
        let catalog = self.resolve(root)?;
        catalog.as_dict().cloned().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: catalog.type_name().to_string(),
        })
    }

    /// Whether the cross-reference table was rebuilt by scanning.
    pub fn was_repaired(&self) -> bool {
        self.repaired
    }

    /// Whether the file has an `/Encrypt` dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    /// How the password was classified. Unencrypted documents grant full
    /// access and report `OwnerPassword`.
    pub fn password_validity(&self) -> PasswordValidity {
        match &self.security {
            Some(handler) => handler.validity(),
            None => PasswordValidity::OwnerPassword,
        }
    }

    /// Security parameters, for encrypted documents.
    pub fn security_context(&self) -> Option<SecurityContext> {
        self.security.as_ref().map(SecurityHandler::context)
    }

    /// Advisory permissions; everything for unencrypted documents.
    pub fn permissions(&self) -> Permissions {
        self.security
            .as_ref()
            .map(SecurityHandler::permissions)
            .unwrap_or_else(Permissions::all)
    }

    /// Live object numbers, including pending edits.
    pub fn object_numbers(&self) -> Vec<u32> {
        let mut numbers: BTreeSet<u32> = self.xref.object_numbers().collect();
        for (&number, update) in &self.updates {
            match update {
                Update::Set(..) => numbers.insert(number),
                Update::Deleted(_) => numbers.remove(&number),
            };
        }
        numbers.into_iter().collect()
    }

    /// Live references, including pending edits.
    pub fn references(&self) -> Vec<ObjectRef> {
        self.object_numbers()
            .into_iter()
            .filter_map(|number| self.generation(number).map(|gen| ObjectRef::new(number, gen)))
            .collect()
    }

    fn generation(&self, number: u32) -> Option<u16> {
        match self.updates.get(&number) {
            Some(Update::Set(gen, _)) => Some(*gen),
            Some(Update::Deleted(_)) => None,
            None => self.xref.get(number).map(|entry| entry.generation),
        }
    }

    /// Resolve an indirect object.
    ///
    /// Strings and stream payloads come back decrypted; stream payloads are
    /// still filter-encoded (see [`decoded_stream_bytes`](Self::decoded_stream_bytes)).
    ///
    /// # Errors
    ///
    /// `ObjectNotFound` for unknown, free or deleted objects and generation
    /// mismatches; `PasswordRequired` when a locked document would have to
    /// decrypt the object.
    pub fn resolve(&self, reference: ObjectRef) -> Result<Object> {
        if let Some(update) = self.updates.get(&reference.id) {
            return match update {
                Update::Set(gen, object) if *gen == reference.gen => Ok(object.clone()),
                _ => Err(Error::ObjectNotFound(reference.id, reference.gen)),
            };
        }

        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(object) = cache.get(&reference) {
                return Ok(object.clone());
            }
        }

        let object = self.load(reference)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reference, object.clone());
        Ok(object)
    }

    /// Follow references until a direct object is reached.
    pub fn resolve_value(&self, object: &Object) -> Result<Object> {
        let mut current = object.clone();
        let mut seen = HashSet::new();
        while let Object::Reference(reference) = current {
            if !seen.insert(reference) {
                return Err(Error::CircularReference(reference));
            }
            if seen.len() > self.options.parser.max_recursion_depth as usize {
                return Err(Error::RecursionLimitExceeded(self.options.parser.max_recursion_depth));
            }
            current = self.resolve(reference)?;
        }
        Ok(current)
    }

    /// Decode a stream through its filter chain, reporting partial output.
    ///
    /// `stream` is either a stream object obtained from [`resolve`](Self::resolve)
    /// or a reference to one. Indirect `/Filter` and `/DecodeParms` values
    /// are resolved first.
    pub fn decode_stream(&self, stream: &Object) -> Result<DecodedStream> {
        match self.resolve_value(stream)? {
            Object::Stream { dict, data } => self.decode_payload(&dict, &data),
            other => Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Fully decoded stream bytes.
    pub fn decoded_stream_bytes(&self, stream: &Object) -> Result<Vec<u8>> {
        Ok(self.decode_stream(stream)?.data)
    }

    fn decode_payload(&self, dict: &Dictionary, data: &[u8]) -> Result<DecodedStream> {
        let mut dict = dict.clone();
        for key in ["Filter", "DecodeParms"] {
            if let Some(value) = dict.get(key).cloned() {
                let resolved = match self.resolve_value(&value)? {
                    Object::Array(items) => Object::Array(
                        items
                            .iter()
                            .map(|item| self.resolve_value(item))
                            .collect::<Result<Vec<_>>>()?,
                    ),
                    other => other,
                };
                dict.insert(key.into(), resolved);
            }
        }
        decoders::decode_stream_object(&dict, data, &self.options.parser)
    }

    fn load(&self, reference: ObjectRef) -> Result<Object> {
        let not_found = || Error::ObjectNotFound(reference.id, reference.gen);
        let entry = *self.xref.get(reference.id).ok_or_else(not_found)?;
        if entry.generation != reference.gen {
            log::debug!(
                "Reference {} does not match generation {} in the xref table",
                reference,
                entry.generation
            );
            return Err(not_found());
        }

        match entry.location {
            XRefLocation::Offset(offset) => {
                let object = self.parse_at(reference, offset)?;
                self.decrypt(reference, object)
            },
            XRefLocation::Compressed { container, index } => {
                let stream = self.container(container)?;
                let index = match stream.object_numbers().nth(index as usize) {
                    Some(number) if number == reference.id => index as usize,
                    _ => stream.index_of(reference.id).ok_or_else(not_found)?,
                };
                // Members were decrypted with their container
                Ok(stream.get(index)?.clone())
            },
            XRefLocation::Free => Err(not_found()),
        }
    }

    fn parse_at(&self, reference: ObjectRef, offset: u64) -> Result<Object> {
        if offset >= self.data.len() as u64 {
            return Err(Error::InvalidXref(format!(
                "object {} at offset {} lies outside the file",
                reference, offset
            )));
        }
        let (id, object) = Parser::at(&self.data, offset as usize)
            .with_options(self.options.parser)
            .with_length_resolver(self)
            .parse_indirect_object()?;
        if id != reference {
            return Err(Error::parse(
                offset as usize,
                format!("expected object {}, found {}", reference, id),
            ));
        }
        Ok(object)
    }

    fn decrypt(&self, reference: ObjectRef, mut object: Object) -> Result<Object> {
        match &self.security {
            Some(handler) if self.encrypt_ref != Some(reference) && object.contains_encryptable() => {
                handler.decrypt_object(reference, &mut object)?;
                Ok(object)
            },
            _ => Ok(object),
        }
    }

    /// Decoded object stream, loaded at most once per document.
    fn container(&self, number: u32) -> Result<Arc<ObjectStream>> {
        let slot = Arc::clone(lock(&self.containers).entry(number).or_default());
        let mut guard = lock(&slot);
        if let Some(stream) = guard.as_ref() {
            return Ok(Arc::clone(stream));
        }
        CancelFlag::check(self.options.cancel.as_ref())?;

        let entry = *self.xref.get(number).ok_or(Error::ObjectNotFound(number, 0))?;
        let XRefLocation::Offset(offset) = entry.location else {
            return Err(Error::InvalidXref(format!("object stream {} is not stored directly", number)));
        };
        let reference = ObjectRef::new(number, entry.generation);
        let Object::Stream { dict, data } = self.parse_at(reference, offset)? else {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: "non-stream object stream container".to_string(),
            });
        };

        let raw = match &self.security {
            Some(handler) => handler.decrypt_stream(reference, &dict, &data)?,
            None => data.to_vec(),
        };
        let decoded = self.decode_payload(&dict, &raw)?;
        if decoded.partial {
            log::warn!("Object stream {} decoded only partially", number);
        }

        let stream = Arc::new(ObjectStream::from_body(number, &dict, decoded.data, &self.options.parser)?);
        log::debug!("Loaded object stream {} with {} members", number, stream.len());
        *guard = Some(Arc::clone(&stream));
        Ok(stream)
    }

    /// Add a new object and return its reference.
    pub fn add_object(&mut self, object: Object) -> ObjectRef {
        let number = self.next_number;
        self.next_number += 1;
        self.updates.insert(number, Update::Set(0, object));
        ObjectRef::new(number, 0)
    }

    /// Replace an existing object.
    pub fn set_object(&mut self, reference: ObjectRef, object: Object) -> Result<()> {
        if self.generation(reference.id) != Some(reference.gen) {
            return Err(Error::ObjectNotFound(reference.id, reference.gen));
        }
        self.updates.insert(reference.id, Update::Set(reference.gen, object));
        self.forget(reference);
        Ok(())
    }

    /// Delete an existing object.
    pub fn delete_object(&mut self, reference: ObjectRef) -> Result<()> {
        if self.generation(reference.id) != Some(reference.gen) {
            return Err(Error::ObjectNotFound(reference.id, reference.gen));
        }
        if self.xref.contains(reference.id) {
            self.updates.insert(reference.id, Update::Deleted(reference.gen));
        } else {
            // Never written, so nothing to free
            self.updates.remove(&reference.id);
        }
        self.forget(reference);
        Ok(())
    }

    fn forget(&mut self, reference: ObjectRef) {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&reference);
    }

    pub(crate) fn data(&self) -> &Bytes {
        &self.data
    }

    pub(crate) fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    pub(crate) fn updates(&self) -> &BTreeMap<u32, Update> {
        &self.updates
    }

    pub(crate) fn security(&self) -> Option<&SecurityHandler> {
        self.security.as_ref()
    }

    pub(crate) fn encrypt_ref(&self) -> Option<ObjectRef> {
        self.encrypt_ref
    }
}

impl LengthResolver for Document {
    fn resolve_length(&self, reference: ObjectRef) -> Option<i64> {
        if let Some(update) = self.updates.get(&reference.id) {
            return match update {
                Update::Set(_, object) => object.as_integer(),
                Update::Deleted(_) => None,
            };
        }
        if let Some(object) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(&reference) {
            return object.as_integer();
        }
        // Lengths are plain integers; parse them without a resolver so a
        // length pointing back at its own stream cannot recurse
        match self.xref.get(reference.id)?.location {
            XRefLocation::Offset(offset) => {
                let (id, object) = Parser::at(&self.data, usize::try_from(offset).ok()?)
                    .with_options(self.options.parser)
                    .parse_indirect_object()
                    .ok()?;
                if id.id != reference.id {
                    return None;
                }
                object.as_integer()
            },
            XRefLocation::Compressed { container, .. } => {
                let slot = lock(&self.containers).get(&container).cloned()?;
                let guard = slot.try_lock().ok()?;
                guard.as_ref()?.get_by_number(reference.id).ok()?.as_integer()
            },
            XRefLocation::Free => None,
        }
    }
}

fn next_free_number(xref: &CrossRefTable, trailer: &Dictionary) -> u32 {
    let size = trailer
        .get("Size")
        .and_then(Object::as_integer)
        .and_then(|s| u32::try_from(s).ok())
        .unwrap_or(0);
    size.max(xref.max_object_number().saturating_add(1)).max(1)
}

/// Parse the `%PDF-M.m` header.
///
/// Lenient parsing accepts junk before the header and falls back to 1.4
/// when none is found.
pub fn parse_header(data: &[u8], strict: bool) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let position = window.windows(5).position(|w| w == b"%PDF-");

    let version = position.and_then(|pos| {
        let digits = data.get(pos + 5..pos + 8)?;
        (digits[0].is_ascii_digit() && digits[1] == b'.' && digits[2].is_ascii_digit())
            .then(|| (digits[0] - b'0', digits[2] - b'0'))
    });

    match (position, version) {
        (Some(0), Some(version)) => Ok(version),
        (Some(pos), Some(version)) if !strict => {
            log::warn!("PDF header found at offset {} instead of 0", pos);
            Ok(version)
        },
        _ if strict => {
            let found = String::from_utf8_lossy(&data[..data.len().min(8)]).to_string();
            Err(Error::InvalidHeader(found))
        },
        _ => {
            log::warn!("No usable PDF header; assuming version 1.4");
            Ok((1, 4))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::dictionary;
    use crate::parser_config::ParserOptions;

    /// Assemble a file with a correct classic xref table.
    fn build(objects: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                trailer_extra,
                xref_at
            )
            .as_bytes(),
        );
        out
    }

    fn open(data: Vec<u8>) -> Document {
        Document::from_bytes(data, OpenOptions::default()).unwrap()
    }

    #[test]
    fn test_header_versions() {
        assert_eq!(parse_header(b"%PDF-1.7\n", true).unwrap(), (1, 7));
        assert_eq!(parse_header(b"junk%PDF-2.0\n", false).unwrap(), (2, 0));
        assert!(matches!(parse_header(b"junk%PDF-2.0\n", true), Err(Error::InvalidHeader(_))));
        assert_eq!(parse_header(b"garbage", false).unwrap(), (1, 4));
    }

    #[test]
    fn test_resolve_and_catalog() {
        let doc = open(build(&["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Count 0 >>"], ""));
        assert!(!doc.was_repaired());
        assert_eq!(doc.version(), (1, 4));
        assert_eq!(doc.catalog().unwrap().get("Type"), Some(&Object::name("Catalog")));
        let pages = doc.resolve(ObjectRef::new(2, 0)).unwrap();
        assert_eq!(pages.dict_type(), Some("Pages"));
        assert_eq!(doc.object_numbers(), vec![1, 2]);
    }

    #[test]
    fn test_missing_and_mismatched_objects() {
        let doc = open(build(&["<< /Type /Catalog >>"], ""));
        assert!(matches!(doc.resolve(ObjectRef::new(9, 0)), Err(Error::ObjectNotFound(9, 0))));
        assert!(matches!(doc.resolve(ObjectRef::new(1, 3)), Err(Error::ObjectNotFound(1, 3))));
    }

    #[test]
    fn test_indirect_length_is_resolved() {
        let doc = open(build(&["<< /Type /Catalog >>", "<< /Length 3 0 R >>\nstream\nabcdef\nendstream", "6"], ""));
        let stream = doc.resolve(ObjectRef::new(2, 0)).unwrap();
        assert_eq!(stream.stream_data().unwrap().as_ref(), b"abcdef");
        assert_eq!(doc.decoded_stream_bytes(&Object::Reference(ObjectRef::new(2, 0))).unwrap(), b"abcdef");
    }

    #[test]
    fn test_decoded_stream_with_indirect_filter() {
        let doc = open(build(
            &["<< /Type /Catalog >>", "<< /Length 7 /Filter 3 0 R >>\nstream\n616263>\nendstream", "/ASCIIHexDecode"],
            "",
        ));
        let decoded = doc.decode_stream(&Object::Reference(ObjectRef::new(2, 0))).unwrap();
        assert_eq!(decoded.data, b"abc");
        assert!(!decoded.partial);
    }

    #[test]
    fn test_broken_startxref_is_repaired() {
        let mut data = build(&["<< /Type /Catalog >>"], "");
        let pos = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(pos);
        let doc = open(data);
        assert!(doc.was_repaired());
        assert_eq!(doc.catalog().unwrap().get("Type"), Some(&Object::name("Catalog")));
    }

    #[test]
    fn test_strict_mode_refuses_repair() {
        let mut data = build(&["<< /Type /Catalog >>"], "");
        let pos = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(pos);
        let options = OpenOptions::new().with_parser_options(ParserOptions::strict());
        assert!(Document::from_bytes(data, options).is_err());
    }

    #[test]
    fn test_edits() {
        let mut doc = open(build(&["<< /Type /Catalog >>", "(old)"], ""));
        let added = doc.add_object(Object::Integer(7));
        assert_eq!(added, ObjectRef::new(3, 0));

        doc.set_object(ObjectRef::new(2, 0), Object::string(b"new".to_vec())).unwrap();
        assert_eq!(doc.resolve(ObjectRef::new(2, 0)).unwrap(), Object::string(b"new".to_vec()));
        assert!(doc.set_object(ObjectRef::new(2, 1), Object::Null).is_err());

        doc.delete_object(ObjectRef::new(2, 0)).unwrap();
        assert!(doc.resolve(ObjectRef::new(2, 0)).is_err());
        assert_eq!(doc.object_numbers(), vec![1, 3]);
    }

    #[test]
    fn test_new_document() {
        let mut doc = Document::new((2, 0));
        let catalog = doc.add_object(Object::Dictionary(dictionary([("Type", Object::name("Catalog"))])));
        doc.set_root(catalog);
        assert_eq!(doc.root(), Some(ObjectRef::new(1, 0)));
        assert_eq!(doc.catalog().unwrap().len(), 1);
        assert_eq!(doc.password_validity(), PasswordValidity::OwnerPassword);
        assert!(doc.permissions().can_modify());
    }

    #[test]
    fn test_resolve_value_detects_cycles() {
        let doc = open(build(&["<< /Type /Catalog >>", "3 0 R", "2 0 R"], ""));
        // The chain 2 -> 3 -> 2 never reaches a direct object
        assert!(matches!(
            doc.resolve_value(&Object::Reference(ObjectRef::new(2, 0))),
            Err(Error::CircularReference(_))
        ));
    }

    #[test]
    fn test_header_generation_must_match() {
        let data = build(&["<< /Type /Catalog >>", "(stale)"], "");
        let offset = data.windows(7).position(|w| w == b"2 0 obj").unwrap() as u64;
        let doc = open(data);
        assert_eq!(doc.parse_at(ObjectRef::new(2, 0), offset).unwrap(), Object::string(b"stale".to_vec()));
        assert!(matches!(
            doc.parse_at(ObjectRef::new(2, 1), offset),
            Err(Error::ParseError { .. })
        ));
    }

    #[test]
    fn test_document_is_shareable() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Document>();
    }
}
