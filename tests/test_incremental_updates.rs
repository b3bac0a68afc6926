//! Incremental update tests: appended sections, `/Prev` chains and
//! newest-wins resolution.

use pdf_oxide_core::config::OpenOptions;
use pdf_oxide_core::document::Document;
use pdf_oxide_core::error::Error;
use pdf_oxide_core::object::{dictionary, Object, ObjectRef};
use pdf_oxide_core::writer::{save_to_bytes, save_to_path, SaveMode, SaveOptions, XRefLayout};

/// Catalog plus three numbered payload objects (2, 3, 4).
fn base_document(layout: XRefLayout) -> Vec<u8> {
    let mut doc = Document::new((1, 4));
    for value in ["one", "two", "three"] {
        doc.add_object(Object::string(value.as_bytes().to_vec()));
    }
    let catalog = doc.add_object(Object::Dictionary(dictionary([("Type", Object::name("Catalog"))])));
    doc.set_root(catalog);
    save_to_bytes(&doc, &SaveOptions::default().with_xref_layout(layout)).unwrap()
}

fn text(doc: &Document, number: u32) -> Vec<u8> {
    doc.resolve(ObjectRef::new(number, 0))
        .unwrap()
        .as_string()
        .unwrap()
        .to_vec()
}

#[test]
fn test_two_updates_overwrite_disjoint_objects() {
    for layout in [XRefLayout::Table, XRefLayout::Stream] {
        let original = base_document(layout);

        let mut doc = Document::from_bytes(original.clone(), OpenOptions::default()).unwrap();
        doc.set_object(ObjectRef::new(1, 0), Object::string(b"ONE".to_vec())).unwrap();
        let first = save_to_bytes(&doc, &SaveOptions::incremental()).unwrap();
        assert!(first.starts_with(&original));

        let mut doc = Document::from_bytes(first.clone(), OpenOptions::default()).unwrap();
        assert_eq!(text(&doc, 1), b"ONE");
        doc.set_object(ObjectRef::new(3, 0), Object::string(b"THREE".to_vec())).unwrap();
        let second = save_to_bytes(&doc, &SaveOptions::incremental()).unwrap();
        assert!(second.starts_with(&first));

        let doc = Document::from_bytes(second, OpenOptions::default()).unwrap();
        assert!(!doc.was_repaired());
        assert_eq!(text(&doc, 1), b"ONE");
        assert_eq!(text(&doc, 2), b"two");
        assert_eq!(text(&doc, 3), b"THREE");
        assert_eq!(doc.catalog().unwrap()["Type"], Object::name("Catalog"));
    }
}

#[test]
fn test_appended_section_matches_original_layout() {
    let original = base_document(XRefLayout::Table);
    let mut doc = Document::from_bytes(original.clone(), OpenOptions::default()).unwrap();
    doc.set_object(ObjectRef::new(2, 0), Object::Integer(2)).unwrap();
    let updated = save_to_bytes(&doc, &SaveOptions::incremental()).unwrap();

    let appended = String::from_utf8_lossy(&updated[original.len()..]).to_string();
    assert!(appended.contains("\nxref\n2 1\n"));
    assert!(appended.contains("/Prev "));
    assert!(appended.ends_with("%%EOF\n"));
}

#[test]
fn test_unchanged_document_is_byte_identical() {
    let original = base_document(XRefLayout::Table);
    let doc = Document::from_bytes(original.clone(), OpenOptions::default()).unwrap();
    assert_eq!(save_to_bytes(&doc, &SaveOptions::incremental()).unwrap(), original);
}

#[test]
fn test_new_and_deleted_objects() {
    let original = base_document(XRefLayout::Stream);
    let mut doc = Document::from_bytes(original, OpenOptions::default()).unwrap();
    doc.delete_object(ObjectRef::new(2, 0)).unwrap();
    let added = doc.add_object(Object::name("Added"));
    let updated = save_to_bytes(&doc, &SaveOptions::incremental()).unwrap();

    let doc = Document::from_bytes(updated, OpenOptions::default()).unwrap();
    assert!(doc.resolve(ObjectRef::new(2, 0)).is_err());
    assert!(!doc.object_numbers().contains(&2));
    assert_eq!(doc.resolve(added).unwrap(), Object::name("Added"));
    assert_eq!(text(&doc, 1), b"one");
}

#[test]
fn test_trailer_change_alone_is_written() {
    let original = base_document(XRefLayout::Table);
    let mut doc = Document::from_bytes(original.clone(), OpenOptions::default()).unwrap();
    let info = doc.add_object(Object::Dictionary(dictionary([("Title", Object::string(b"T".to_vec()))])));
    doc.set_trailer_entry("Info", Object::Reference(info));
    let updated = save_to_bytes(&doc, &SaveOptions::incremental()).unwrap();
    assert!(updated.len() > original.len());

    let doc = Document::from_bytes(updated, OpenOptions::default()).unwrap();
    let info = doc.resolve_value(&doc.trailer()["Info"]).unwrap();
    assert_eq!(info.as_dict().unwrap()["Title"], Object::string(b"T".to_vec()));
}

#[test]
fn test_new_document_cannot_append() {
    let mut doc = Document::new((1, 4));
    let catalog = doc.add_object(Object::Dictionary(dictionary([("Type", Object::name("Catalog"))])));
    doc.set_root(catalog);
    assert!(matches!(
        save_to_bytes(&doc, &SaveOptions::incremental()),
        Err(Error::Write(_))
    ));
}

#[test]
fn test_repaired_document_cannot_append() {
    let mut damaged = base_document(XRefLayout::Table);
    let at = damaged.windows(9).rposition(|w| w == b"startxref").unwrap();
    damaged.truncate(at);

    let mut doc = Document::from_bytes(damaged, OpenOptions::default()).unwrap();
    assert!(doc.was_repaired());
    doc.set_object(ObjectRef::new(1, 0), Object::Null).unwrap();
    assert!(matches!(
        save_to_bytes(&doc, &SaveOptions::incremental()),
        Err(Error::Write(_))
    ));
    // A full rewrite still works
    assert!(save_to_bytes(&doc, &SaveOptions::full()).is_ok());
}

#[test]
fn test_save_to_path_appends_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, base_document(XRefLayout::Table)).unwrap();

    let mut doc = Document::open_path(&path, OpenOptions::default()).unwrap();
    doc.set_object(ObjectRef::new(2, 0), Object::string(b"TWO".to_vec())).unwrap();
    let options = SaveOptions {
        mode: SaveMode::Incremental,
        ..SaveOptions::default()
    };
    save_to_path(&doc, &path, &options).unwrap();

    let doc = Document::open_path(&path, OpenOptions::default()).unwrap();
    assert_eq!(text(&doc, 2), b"TWO");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
