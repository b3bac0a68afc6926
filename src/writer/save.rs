//! Full rewrite and incremental append.

use super::object_serializer::ObjectSerializer;
use super::pdf_writer::PdfWriter;
use super::{EncryptionMode, SaveMode, SaveOptions, XRefLayout};
use crate::decoders::{FlateDecoder, StreamFilter};
use crate::document::{Document, Update};
use crate::encryption::{self, Algorithm, SecurityHandler};
use crate::error::{Error, Result};
use crate::lexer::is_whitespace;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::xref::XRefEntry;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Members per packed object stream.
const OBJECTS_PER_STREAM: usize = 100;

/// Trailer keys that only describe a cross-reference section.
const SECTION_KEYS: [&str; 11] = [
    "Prev", "XRefStm", "Type", "W", "Index", "Filter", "DecodeParms", "Length", "DL", "F", "N",
];

pub(crate) fn write_document(doc: &Document, options: &SaveOptions) -> Result<Vec<u8>> {
    match options.mode {
        SaveMode::Full => write_full(doc, options),
        SaveMode::Incremental => write_incremental(doc, options),
    }
}

/// Security handler, `/Encrypt` dictionary and `/ID` for a full rewrite.
struct OutputSecurity {
    handler: Option<SecurityHandler>,
    encrypt: Option<Dictionary>,
    id: Option<Object>,
}

fn output_security(doc: &Document, mode: &EncryptionMode) -> Result<OutputSecurity> {
    let existing_id = doc.trailer().get("ID").cloned();
    match mode {
        EncryptionMode::Remove => Ok(OutputSecurity {
            handler: None,
            encrypt: None,
            id: existing_id,
        }),
        EncryptionMode::Preserve => {
            let Some(handler) = doc.security() else {
                return Ok(OutputSecurity {
                    handler: None,
                    encrypt: None,
                    id: existing_id,
                });
            };
            if !handler.is_authenticated() {
                return Err(Error::PasswordRequired);
            }
            let encrypt = match (doc.encrypt_ref(), doc.trailer().get("Encrypt")) {
                (Some(reference), _) => doc.resolve(reference)?,
                (None, Some(inline)) => inline.clone(),
                (None, None) => return Err(Error::Write("encrypted document lost its /Encrypt entry".to_string())),
            };
            let encrypt = encrypt
                .as_dict()
                .cloned()
                .ok_or_else(|| Error::Write("/Encrypt is not a dictionary".to_string()))?;
            Ok(OutputSecurity {
                handler: Some(handler.clone()),
                encrypt: Some(encrypt),
                id: existing_id,
            })
        },
        EncryptionMode::Apply(config) => {
            let first = existing_id
                .as_ref()
                .and_then(Object::as_array)
                .and_then(|ids| ids.first())
                .and_then(Object::as_string)
                .map(<[u8]>::to_vec);
            // Readers derive the key from whatever /ID[0] the file carries
            let (file_id, id) = match (first, existing_id) {
                (Some(first), Some(id)) => (first, id),
                _ => {
                    let fresh = encryption::generate_file_id();
                    let id = Object::Array(vec![Object::hex_string(fresh.clone()), Object::hex_string(fresh.clone())]);
                    (fresh, id)
                },
            };
            let (handler, encrypt) = SecurityHandler::create(config, &file_id)?;
            Ok(OutputSecurity {
                handler: Some(handler),
                encrypt: Some(encrypt),
                id: Some(id),
            })
        },
    }
}

/// Rewrite every live object with dense numbering.
fn write_full(doc: &Document, options: &SaveOptions) -> Result<Vec<u8>> {
    let root = doc.root().ok_or_else(|| Error::Write("document has no /Root".to_string()))?;

    let mut objects: BTreeMap<ObjectRef, Object> = BTreeMap::new();
    for reference in doc.references() {
        if Some(reference) == doc.encrypt_ref() {
            continue;
        }
        let mut object = doc.resolve(reference)?;
        if let Object::Stream { dict, data } = &mut object {
            // Packing and xref streams are regenerated
            if matches!(dict.get("Type").and_then(Object::as_name), Some("XRef" | "ObjStm")) {
                continue;
            }
            dict.insert("Length".into(), Object::Integer(data.len() as i64));
        }
        objects.insert(reference, object);
    }

    if options.garbage_collect {
        let live = reachable(&objects, doc.trailer(), doc.encrypt_ref());
        let before = objects.len();
        objects.retain(|reference, _| live.contains(reference));
        log::debug!("Garbage collection dropped {} objects", before - objects.len());
    }

    let renumbered: HashMap<ObjectRef, ObjectRef> = objects
        .keys()
        .enumerate()
        .map(|(i, old)| (*old, ObjectRef::new(i as u32 + 1, 0)))
        .collect();
    let mut next = objects.len() as u32 + 1;

    let mut trailer = Dictionary::new();
    let new_root = renumbered
        .get(&root)
        .copied()
        .ok_or_else(|| Error::Write(format!("catalog {} is not a live object", root)))?;
    trailer.insert("Root".into(), Object::Reference(new_root));
    if let Some(mut info) = doc.trailer().get("Info").cloned() {
        rewrite_references(&mut info, &renumbered);
        if !info.is_null() {
            trailer.insert("Info".into(), info);
        }
    }

    let security = output_security(doc, &options.encryption)?;
    if let Some(id) = security.id {
        trailer.insert("ID".into(), id);
    }

    let use_stream = match options.xref_layout {
        XRefLayout::Stream => true,
        XRefLayout::Table => false,
        XRefLayout::Auto => doc.version() >= (1, 5) || options.object_streams,
    };
    let pack = options.object_streams && use_stream;
    if options.object_streams && !use_stream {
        log::warn!("Object streams need a cross-reference stream; writing objects directly");
    }

    let mut version = doc.version();
    if use_stream {
        version = version.max((1, 5));
    }
    if let EncryptionMode::Apply(config) = &options.encryption {
        version = version.max(minimum_version(config.algorithm));
    }

    let mut writer = PdfWriter::new(version)?;
    if let Some(encrypt) = security.encrypt {
        let reference = ObjectRef::new(next, 0);
        next += 1;
        writer.write_object(reference, &Object::Dictionary(encrypt))?;
        trailer.insert("Encrypt".into(), Object::Reference(reference));
    }

    let mut packed = Vec::new();
    for (old, mut object) in objects {
        let reference = renumbered[&old];
        rewrite_references(&mut object, &renumbered);
        if options.compress {
            compress_stream(&mut object)?;
        }
        if pack && !matches!(object, Object::Stream { .. }) {
            packed.push((reference, object));
            continue;
        }
        if let Some(handler) = &security.handler {
            handler.encrypt_object(reference, &mut object)?;
        }
        writer.write_object(reference, &object)?;
    }

    for chunk in packed.chunks(OBJECTS_PER_STREAM) {
        let reference = ObjectRef::new(next, 0);
        next += 1;
        let mut container = build_object_stream(chunk, options.compress)?;
        for (index, (member, _)) in chunk.iter().enumerate() {
            writer.record(member.id, XRefEntry::compressed(reference.id, index as u32));
        }
        if let Some(handler) = &security.handler {
            handler.encrypt_object(reference, &mut container)?;
        }
        writer.write_object(reference, &container)?;
    }

    log::debug!(
        "Full rewrite: {} objects, {} packed, xref {}",
        next - 1,
        packed.len(),
        if use_stream { "stream" } else { "table" }
    );

    if use_stream {
        writer.finish_stream(trailer, next, options.compress)
    } else {
        writer.finish_table(trailer)
    }
}

/// Append changed objects after the untouched original bytes.
fn write_incremental(doc: &Document, options: &SaveOptions) -> Result<Vec<u8>> {
    let base = doc.data();
    if base.is_empty() {
        return Err(Error::Write("incremental save needs a document read from a file".to_string()));
    }
    if doc.was_repaired() {
        return Err(Error::Write(
            "cross-reference data was rebuilt; use a full rewrite instead of appending".to_string(),
        ));
    }
    let prev = doc
        .xref()
        .startxref()
        .ok_or_else(|| Error::Write("original startxref is unknown".to_string()))?;
    if !matches!(options.encryption, EncryptionMode::Preserve) {
        return Err(Error::Write("encryption can only change in a full rewrite".to_string()));
    }

    if doc.updates().is_empty() && doc.trailer() == doc.xref().trailer() {
        log::debug!("No changes; incremental save returns the original bytes");
        return Ok(base.to_vec());
    }

    let handler = doc.security();
    if handler.is_some_and(|h| !h.is_authenticated()) && !doc.updates().is_empty() {
        return Err(Error::PasswordRequired);
    }

    let use_stream = match options.xref_layout {
        XRefLayout::Stream => true,
        XRefLayout::Table => false,
        XRefLayout::Auto => !section_is_table(base, prev),
    };

    let mut writer = PdfWriter::appending(base);
    for (&number, update) in doc.updates() {
        match update {
            Update::Set(gen, object) => {
                let reference = ObjectRef::new(number, *gen);
                let mut object = object.clone();
                if options.compress {
                    compress_stream(&mut object)?;
                }
                if let Some(handler) = handler {
                    if doc.encrypt_ref() != Some(reference) {
                        handler.encrypt_object(reference, &mut object)?;
                    }
                }
                writer.write_object(reference, &object)?;
            },
            Update::Deleted(gen) => {
                writer.record(number, XRefEntry::free(gen.saturating_add(1)));
            },
        }
    }

    let mut trailer = doc.trailer().clone();
    for key in SECTION_KEYS {
        trailer.shift_remove(key);
    }
    trailer.insert("Prev".into(), Object::Integer(prev as i64));

    log::debug!("Incremental update: {} changed objects after offset {}", doc.updates().len(), base.len());

    if use_stream {
        // The stream takes the first number no section has used
        let number = trailer
            .get("Size")
            .and_then(Object::as_integer)
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0)
            .max(writer.size())
            .max(doc.object_numbers().last().map_or(1, |n| n + 1));
        writer.finish_stream(trailer, number, options.compress)
    } else {
        writer.finish_table(trailer)
    }
}

/// Whether the section at `offset` is a classic `xref` table.
fn section_is_table(data: &[u8], offset: u64) -> bool {
    let rest = usize::try_from(offset).ok().and_then(|o| data.get(o..)).unwrap_or_default();
    let start = rest.iter().position(|&b| !is_whitespace(b)).unwrap_or(rest.len());
    rest[start..].starts_with(b"xref")
}

fn minimum_version(algorithm: Algorithm) -> (u8, u8) {
    match algorithm {
        Algorithm::RC4_40 => (1, 1),
        Algorithm::Rc4_128 => (1, 4),
        Algorithm::Aes128 => (1, 6),
        Algorithm::Aes256 => (1, 7),
    }
}

/// Objects reachable from `/Root` and `/Info`.
fn reachable(
    objects: &BTreeMap<ObjectRef, Object>,
    trailer: &Dictionary,
    encrypt: Option<ObjectRef>,
) -> HashSet<ObjectRef> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<ObjectRef> = VecDeque::new();
    for key in ["Root", "Info"] {
        if let Some(value) = trailer.get(key) {
            collect_references(value, &mut queue);
        }
    }
    while let Some(reference) = queue.pop_front() {
        if Some(reference) == encrypt || !seen.insert(reference) {
            continue;
        }
        if let Some(object) = objects.get(&reference) {
            collect_references(object, &mut queue);
        }
    }
    seen
}

fn collect_references(object: &Object, out: &mut VecDeque<ObjectRef>) {
    match object {
        Object::Reference(r) => out.push_back(*r),
        Object::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            dict.values().for_each(|value| collect_references(value, out))
        },
        _ => {},
    }
}

/// Map references to their new numbers; dangling ones become `null`.
fn rewrite_references(object: &mut Object, renumbered: &HashMap<ObjectRef, ObjectRef>) {
    match object {
        Object::Reference(r) => {
            *object = match renumbered.get(r) {
                Some(new) => Object::Reference(*new),
                None => {
                    log::debug!("Dropping dangling reference {}", r);
                    Object::Null
                },
            };
        },
        Object::Array(items) => items.iter_mut().for_each(|item| rewrite_references(item, renumbered)),
        Object::Dictionary(dict) | Object::Stream { dict, .. } => {
            dict.values_mut().for_each(|value| rewrite_references(value, renumbered))
        },
        _ => {},
    }
}

/// Flate-encode a stream that carries no filter yet.
fn compress_stream(object: &mut Object) -> Result<()> {
    let Object::Stream { dict, data } = object else {
        return Ok(());
    };
    if data.is_empty() || !matches!(dict.get("Filter"), None | Some(Object::Null)) {
        return Ok(());
    }
    let encoded = FlateDecoder.encode(data)?;
    if encoded.len() < data.len() {
        dict.insert("Filter".into(), Object::name("FlateDecode"));
        dict.shift_remove("DecodeParms");
        *data = encoded.into();
    }
    Ok(())
}

/// Pack non-stream objects into one `/Type /ObjStm` stream.
fn build_object_stream(members: &[(ObjectRef, Object)], compress: bool) -> Result<Object> {
    let serializer = ObjectSerializer::compact();
    let mut header = String::new();
    let mut body = Vec::new();
    for (reference, object) in members {
        header.push_str(&format!("{} {} ", reference.id, body.len()));
        body.extend_from_slice(&serializer.serialize(object)?);
        body.push(b'\n');
    }

    let first = header.len();
    let mut data = header.into_bytes();
    data.extend_from_slice(&body);

    let mut dict = Dictionary::new();
    dict.insert("Type".into(), Object::name("ObjStm"));
    dict.insert("N".into(), Object::Integer(members.len() as i64));
    dict.insert("First".into(), Object::Integer(first as i64));
    if compress {
        dict.insert("Filter".into(), Object::name("FlateDecode"));
        data = FlateDecoder.encode(&data)?;
    }
    Ok(Object::stream(dict, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objstm::ObjectStream;
    use crate::object::dictionary;
    use crate::parser_config::ParserOptions;

    #[test]
    fn test_object_stream_round_trip() {
        let members = vec![
            (ObjectRef::new(4, 0), Object::Dictionary(dictionary([("A", Object::Integer(1))]))),
            (ObjectRef::new(5, 0), Object::Array(vec![Object::string(b"x".to_vec())])),
        ];
        for compress in [false, true] {
            let container = build_object_stream(&members, compress).unwrap();
            let stream = ObjectStream::parse(9, &container, &ParserOptions::default()).unwrap();
            assert_eq!(stream.get_by_number(4).unwrap(), &members[0].1);
            assert_eq!(stream.get_by_number(5).unwrap(), &members[1].1);
        }
    }

    #[test]
    fn test_rewrite_references_drops_dangling() {
        let renumbered = HashMap::from([(ObjectRef::new(7, 0), ObjectRef::new(1, 0))]);
        let mut object = Object::Array(vec![
            Object::Reference(ObjectRef::new(7, 0)),
            Object::Reference(ObjectRef::new(8, 0)),
        ]);
        rewrite_references(&mut object, &renumbered);
        assert_eq!(object, Object::Array(vec![Object::Reference(ObjectRef::new(1, 0)), Object::Null]));
    }

    #[test]
    fn test_reachable_skips_orphans() {
        let objects = BTreeMap::from([
            (ObjectRef::new(1, 0), Object::Dictionary(dictionary([("Pages", Object::Reference(ObjectRef::new(2, 0)))]))),
            (ObjectRef::new(2, 0), Object::Dictionary(dictionary([("Parent", Object::Reference(ObjectRef::new(1, 0)))]))),
            (ObjectRef::new(3, 0), Object::Integer(1)),
        ]);
        let trailer = dictionary([("Root", Object::Reference(ObjectRef::new(1, 0)))]);
        let live = reachable(&objects, &trailer, None);
        assert!(live.contains(&ObjectRef::new(2, 0)));
        assert!(!live.contains(&ObjectRef::new(3, 0)));
    }

    #[test]
    fn test_compress_only_unfiltered_streams() {
        let mut plain = Object::stream(Dictionary::new(), vec![b'a'; 200]);
        compress_stream(&mut plain).unwrap();
        assert_eq!(plain.as_dict().unwrap().get("Filter"), Some(&Object::name("FlateDecode")));

        let hex = dictionary([("Filter", Object::name("ASCIIHexDecode"))]);
        let mut filtered = Object::stream(hex, b"6162>".to_vec());
        let before = filtered.clone();
        compress_stream(&mut filtered).unwrap();
        assert_eq!(filtered, before);
    }

    #[test]
    fn test_section_kind_detection() {
        let data = b"%PDF-1.4\n\nxref\n0 1\n";
        assert!(section_is_table(data, 9));
        assert!(!section_is_table(b"%PDF-1.5\n5 0 obj", 9));
    }
}
