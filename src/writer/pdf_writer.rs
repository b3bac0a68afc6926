//! PDF file assembly.
//!
//! Objects, the cross-reference section and the trailer are staged in one
//! buffer. Nothing reaches the destination until [`PdfWriter::finish_table`]
//! or [`PdfWriter::finish_stream`] has produced the complete output.

use super::object_serializer::ObjectSerializer;
use crate::decoders::{FlateDecoder, StreamFilter};
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::xref::{XRefEntry, XRefLocation};
use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeMap;
use std::io::Write;

/// Staging writer for one output file or one appended update.
#[derive(Debug)]
pub struct PdfWriter {
    output: Vec<u8>,
    entries: BTreeMap<u32, XRefEntry>,
    serializer: ObjectSerializer,
    /// Emit object 0 and fill gaps with free entries
    complete: bool,
}

impl PdfWriter {
    /// Start a complete file with a header for `version`.
    pub fn new(version: (u8, u8)) -> Result<Self> {
        let mut output = Vec::new();
        writeln!(output, "%PDF-{}.{}", version.0, version.1)?;
        // Binary marker (recommended for binary content)
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Ok(Self {
            output,
            entries: BTreeMap::new(),
            serializer: ObjectSerializer::compact(),
            complete: true,
        })
    }

    /// Start an incremental update after `base`, which is kept byte for byte.
    pub fn appending(base: &[u8]) -> Self {
        let mut output = Vec::with_capacity(base.len() + 4096);
        output.extend_from_slice(base);
        if !matches!(base.last(), Some(b'\n' | b'\r')) {
            output.push(b'\n');
        }
        Self {
            output,
            entries: BTreeMap::new(),
            serializer: ObjectSerializer::compact(),
            complete: false,
        }
    }

    /// Current output length.
    pub fn position(&self) -> u64 {
        self.output.len() as u64
    }

    /// Write an indirect object and record its offset.
    pub fn write_object(&mut self, reference: ObjectRef, object: &Object) -> Result<()> {
        let offset = self.position();
        let bytes = self.serializer.serialize_indirect(reference.id, reference.gen, object)?;
        self.output.extend_from_slice(&bytes);
        self.entries
            .insert(reference.id, XRefEntry::uncompressed(offset, reference.gen));
        Ok(())
    }

    /// Record an entry written some other way (packed or freed objects).
    pub fn record(&mut self, number: u32, entry: XRefEntry) {
        self.entries.insert(number, entry);
    }

    /// One past the highest recorded object number.
    pub fn size(&self) -> u32 {
        self.entries.keys().next_back().map_or(1, |n| n + 1)
    }

    /// `/Size` for the trailer: never smaller than an earlier section's.
    fn trailer_size(&self, trailer: &Dictionary) -> i64 {
        let previous = trailer.get("Size").and_then(Object::as_integer).unwrap_or(0);
        previous.max(self.size() as i64)
    }

    /// Contiguous runs of recorded numbers as `(first, count)`.
    fn subsections(&self) -> Vec<(u32, u32)> {
        if self.complete {
            return vec![(0, self.size())];
        }
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for &number in self.entries.keys() {
            match runs.last_mut() {
                Some((first, count)) if *first + *count == number => *count += 1,
                _ => runs.push((number, 1)),
            }
        }
        runs
    }

    fn entry(&self, number: u32) -> XRefEntry {
        match self.entries.get(&number) {
            Some(entry) => *entry,
            None if number == 0 => XRefEntry::free(65535),
            None => XRefEntry::free(0),
        }
    }

    /// Finish with a classic `xref` table followed by `trailer`.
    pub fn finish_table(mut self, mut trailer: Dictionary) -> Result<Vec<u8>> {
        let size = self.trailer_size(&trailer);
        trailer.insert("Size".into(), Object::Integer(size));
        trailer.shift_remove("XRefStm");

        let xref_start = self.position();
        writeln!(self.output, "xref")?;
        for (first, count) in self.subsections() {
            writeln!(self.output, "{} {}", first, count)?;
            for number in first..first + count {
                match self.entry(number).location {
                    XRefLocation::Offset(offset) => {
                        writeln!(self.output, "{:010} {:05} n ", offset, self.entry(number).generation)?
                    },
                    XRefLocation::Free => writeln!(self.output, "{:010} {:05} f ", 0, self.entry(number).generation)?,
                    XRefLocation::Compressed { .. } => {
                        return Err(crate::error::Error::Write(format!(
                            "object {} is packed in an object stream; a cross-reference stream is required",
                            number
                        )));
                    },
                }
            }
        }

        writeln!(self.output, "trailer")?;
        let trailer_bytes = self.serializer.serialize(&Object::Dictionary(trailer))?;
        self.output.extend_from_slice(&trailer_bytes);
        writeln!(self.output)?;
        write!(self.output, "startxref\n{}\n%%EOF\n", xref_start)?;

        log::debug!("Wrote xref table with {} entries at {}", self.entries.len(), xref_start);
        Ok(self.output)
    }

    /// Finish with a cross-reference stream numbered `number`.
    ///
    /// `trailer` supplies `/Root`, `/Info`, `/ID`, `/Encrypt` and `/Prev`;
    /// the stream is never encrypted.
    pub fn finish_stream(mut self, trailer: Dictionary, number: u32, compress: bool) -> Result<Vec<u8>> {
        let xref_start = self.position();
        self.entries.insert(number, XRefEntry::uncompressed(xref_start, 0));

        let largest = self
            .entries
            .values()
            .map(|entry| match entry.location {
                XRefLocation::Offset(offset) => offset,
                XRefLocation::Compressed { container, .. } => container as u64,
                XRefLocation::Free => 0,
            })
            .max()
            .unwrap_or(0);
        let width = (8 - (largest.leading_zeros() / 8) as usize).max(1);

        let subsections = self.subsections();
        let mut rows = Vec::new();
        for &(first, count) in &subsections {
            for n in first..first + count {
                let entry = self.entry(n);
                let (kind, field2, field3) = match entry.location {
                    XRefLocation::Free => (0u8, 0u64, entry.generation as u64),
                    XRefLocation::Offset(offset) => (1, offset, entry.generation as u64),
                    XRefLocation::Compressed { container, index } => (2, container as u64, index as u64),
                };
                let mut row = vec![0u8; 1 + width + 2];
                row[0] = kind;
                BigEndian::write_uint(&mut row[1..1 + width], field2, width);
                BigEndian::write_u16(&mut row[1 + width..], field3.min(u16::MAX as u64) as u16);
                rows.extend_from_slice(&row);
            }
        }

        let mut dict = Dictionary::new();
        dict.insert("Type".into(), Object::name("XRef"));
        dict.insert("Size".into(), Object::Integer(self.trailer_size(&trailer)));
        dict.insert(
            "W".into(),
            Object::Array(vec![Object::Integer(1), Object::Integer(width as i64), Object::Integer(2)]),
        );
        if !self.complete {
            let index = subsections
                .iter()
                .flat_map(|&(first, count)| [Object::Integer(first as i64), Object::Integer(count as i64)])
                .collect();
            dict.insert("Index".into(), Object::Array(index));
        }
        for key in ["Root", "Info", "ID", "Encrypt", "Prev"] {
            if let Some(value) = trailer.get(key) {
                dict.insert(key.into(), value.clone());
            }
        }
        let data = if compress {
            dict.insert("Filter".into(), Object::name("FlateDecode"));
            FlateDecoder.encode(&rows)?
        } else {
            rows
        };

        let bytes = self
            .serializer
            .serialize_indirect(number, 0, &Object::Stream { dict, data: data.into() })?;
        self.output.extend_from_slice(&bytes);
        write!(self.output, "startxref\n{}\n%%EOF\n", xref_start)?;

        log::debug!("Wrote xref stream {} with {} entries at {}", number, self.entries.len(), xref_start);
        Ok(self.output)
    }
}
