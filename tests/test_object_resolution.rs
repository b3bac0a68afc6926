//! Test object resolution and xref handling.

use pdf_oxide_core::config::OpenOptions;
use pdf_oxide_core::document::Document;
use pdf_oxide_core::error::Error;
use pdf_oxide_core::object::{Object, ObjectRef};
use pdf_oxide_core::parser_config::ParserOptions;
use pdf_oxide_core::writer::{save_to_bytes, SaveOptions, XRefLayout};
use std::sync::Arc;

/// Build a classic-xref file from `(number, generation, body)` triples.
fn classic_pdf(objects: &[(u32, u16, &str)], trailer: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let size = objects.iter().map(|(n, _, _)| n + 1).max().unwrap_or(1);
    let mut rows = vec![format!("{:010} {:05} f \n", 0, 65535); size as usize];
    for (number, gen, body) in objects {
        rows[*number as usize] = format!("{:010} {:05} n \n", out.len(), gen);
        out.extend_from_slice(format!("{} {} obj\n{}\nendobj\n", number, gen, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    for row in rows {
        out.extend_from_slice(row.as_bytes());
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {} {} >>\nstartxref\n{}\n%%EOF\n", size, trailer, xref).as_bytes(),
    );
    out
}

fn sample() -> Vec<u8> {
    classic_pdf(
        &[
            (1, 0, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, 0, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
            (3, 0, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>"),
            (4, 2, "(second generation)"),
            (5, 0, "6 0 R"),
            (6, 0, "5 0 R"),
        ],
        "/Root 1 0 R",
    )
}

#[test]
fn test_open_and_walk_page_tree() {
    let doc = Document::from_bytes(sample(), OpenOptions::default()).unwrap();
    assert_eq!(doc.version(), (1, 4));
    assert!(!doc.was_repaired());
    assert!(!doc.is_encrypted());

    let catalog = doc.catalog().unwrap();
    let pages = doc.resolve_value(&catalog["Pages"]).unwrap();
    let kids = pages.as_dict().unwrap()["Kids"].as_array().unwrap().clone();
    let page = doc.resolve_value(&kids[0]).unwrap();
    assert_eq!(page.dict_type(), Some("Page"));
    assert_eq!(doc.object_numbers(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_generation_must_match() {
    let doc = Document::from_bytes(sample(), OpenOptions::default()).unwrap();
    assert_eq!(
        doc.resolve(ObjectRef::new(4, 2)).unwrap(),
        Object::string(b"second generation".to_vec())
    );
    assert!(matches!(doc.resolve(ObjectRef::new(4, 0)), Err(Error::ObjectNotFound(4, 0))));
}

#[test]
fn test_missing_and_free_objects() {
    let doc = Document::from_bytes(sample(), OpenOptions::default()).unwrap();
    assert!(matches!(doc.resolve(ObjectRef::new(0, 65535)), Err(Error::ObjectNotFound(..))));
    assert!(matches!(doc.resolve(ObjectRef::new(99, 0)), Err(Error::ObjectNotFound(99, 0))));
}

#[test]
fn test_reference_cycle_is_detected() {
    let doc = Document::from_bytes(sample(), OpenOptions::default()).unwrap();
    let result = doc.resolve_value(&Object::Reference(ObjectRef::new(5, 0)));
    assert!(matches!(result, Err(Error::CircularReference(_))));
}

#[test]
fn test_header_after_junk() {
    let mut data = b"garbage before header\n".to_vec();
    data.extend_from_slice(&save_to_bytes(&built(), &SaveOptions::default()).unwrap());

    // Offsets are shifted, so lenient opening goes through repair
    let doc = Document::from_bytes(data.clone(), OpenOptions::default()).unwrap();
    assert_eq!(doc.catalog().unwrap().get("Type"), Some(&Object::name("Catalog")));

    let strict = OpenOptions::default().with_parser_options(ParserOptions::strict());
    assert!(Document::from_bytes(data, strict).is_err());
}

fn built() -> Document {
    let mut doc = Document::new((1, 4));
    let info = doc.add_object(Object::Dictionary(pdf_oxide_core::object::dictionary([(
        "Title",
        Object::string(b"Resolution".to_vec()),
    )])));
    let catalog = doc.add_object(Object::Dictionary(pdf_oxide_core::object::dictionary([(
        "Type",
        Object::name("Catalog"),
    )])));
    doc.set_root(catalog);
    doc.set_trailer_entry("Info", Object::Reference(info));
    doc
}

#[test]
fn test_xref_stream_file_resolves() {
    let bytes = save_to_bytes(
        &built(),
        &SaveOptions::default().with_xref_layout(XRefLayout::Stream),
    )
    .unwrap();
    assert!(!String::from_utf8_lossy(&bytes).contains("\nxref\n"));

    let doc = Document::from_bytes(bytes, OpenOptions::default()).unwrap();
    assert!(doc.version() >= (1, 5));
    let info = doc.resolve_value(&doc.trailer()["Info"]).unwrap();
    assert_eq!(info.as_dict().unwrap()["Title"], Object::string(b"Resolution".to_vec()));
}

#[test]
fn test_concurrent_resolution() {
    let doc = Arc::new(Document::from_bytes(sample(), OpenOptions::default()).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let doc = Arc::clone(&doc);
            std::thread::spawn(move || {
                (1..=3)
                    .map(|n| doc.resolve(ObjectRef::new(n, 0)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let expected: Vec<Object> = (1..=3).map(|n| doc.resolve(ObjectRef::new(n, 0)).unwrap()).collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_edits_shadow_file_objects() {
    let mut doc = Document::from_bytes(sample(), OpenOptions::default()).unwrap();
    let page = ObjectRef::new(3, 0);
    doc.set_object(page, Object::Integer(7)).unwrap();
    assert_eq!(doc.resolve(page).unwrap(), Object::Integer(7));

    doc.delete_object(page).unwrap();
    assert!(doc.resolve(page).is_err());
    assert!(!doc.object_numbers().contains(&3));

    let added = doc.add_object(Object::Boolean(true));
    assert_eq!(added.id, 7);
    assert!(doc.set_object(ObjectRef::new(4, 0), Object::Null).is_err());
}
