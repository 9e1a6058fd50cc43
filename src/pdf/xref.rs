//! PDF cross-reference table implementation

use std::collections::{btree_map, BTreeMap};
use std::io::{Read, Seek};

use byteorder::{BigEndian, ReadBytesExt};
use log::{debug, trace};

use super::parser::is_whitespace;
use super::{ByteCursor, Dictionary, Object, ObjectParser};
use crate::config::ResolverConfig;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{PDFResolverError, PDFResult};

/// Largest object number a table will be sized for
pub const MAX_OBJECT_ID: u32 = 8_388_607;

/// Stream dictionary keys that describe the xref stream itself rather
/// than the document revision
const XREF_STREAM_ONLY_KEYS: [&str; 6] = ["Length", "Filter", "DecodeParms", "W", "Index", "Type"];

/// Where an object lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Deleted or never allocated
    Free { next: u32, generation: u16 },
    /// Stored at a byte offset in the file
    Normal { offset: u64, generation: u16 },
    /// Stored inside an object stream
    Compressed { stream_id: u32, index: u32 },
}

impl EntryKind {
    /// Generation number; objects in object streams always have 0
    pub fn generation(&self) -> u16 {
        match *self {
            EntryKind::Free { generation, .. } | EntryKind::Normal { generation, .. } => generation,
            EntryKind::Compressed { .. } => 0,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, EntryKind::Free { .. })
    }
}

/// Object table slot
#[derive(Debug, Clone, PartialEq)]
pub struct XrefEntry {
    pub kind: EntryKind,
    cached: Option<Box<Object>>,
}

impl XrefEntry {
    pub fn new(kind: EntryKind) -> Self {
        Self { kind, cached: None }
    }

    /// Parsed and decrypted value, once resolved
    pub fn cached(&self) -> Option<&Object> {
        self.cached.as_deref()
    }
}

/// Result of offering an entry to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Inserted,
    /// A newer section already populated the slot
    Occupied,
    /// The id lies beyond the table size
    OutOfRange,
}

/// Unified object table, indexed by object number
///
/// The size comes from the newest trailer; only ids some section
/// describes take up memory.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    size: u32,
    entries: BTreeMap<u32, XrefEntry>,
}

impl ObjectTable {
    pub fn with_size(size: u32) -> Self {
        Self {
            size: size.min(MAX_OBJECT_ID + 1),
            entries: BTreeMap::new(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn get(&self, id: u32) -> Option<&XrefEntry> {
        self.entries.get(&id)
    }

    /// Insert unless a newer section already did
    pub fn merge(&mut self, id: u32, kind: EntryKind) -> Merge {
        if id >= self.size {
            return Merge::OutOfRange;
        }
        match self.entries.entry(id) {
            btree_map::Entry::Occupied(_) => Merge::Occupied,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(XrefEntry::new(kind));
                Merge::Inserted
            }
        }
    }

    /// Slot 0 is always the head of the free list
    pub fn force_free_head(&mut self) {
        if self.size > 0 {
            self.entries.insert(
                0,
                XrefEntry::new(EntryKind::Free {
                    next: 0,
                    generation: 65535,
                }),
            );
        }
    }

    pub fn cached(&self, id: u32) -> Option<&Object> {
        self.get(id).and_then(XrefEntry::cached)
    }

    /// Store a resolved value; ignored for ids without an entry
    pub fn set_cached(&mut self, id: u32, value: Object) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.cached = Some(Box::new(value));
        }
    }

    /// Populated entries in id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XrefEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }
}

/// One parsed cross-reference section
#[derive(Debug, Clone)]
pub struct XrefSection {
    /// Entries in the order the section lists them
    pub entries: Vec<(u32, EntryKind)>,
    pub trailer: Dictionary,
    /// True for a cross-reference stream
    pub is_stream: bool,
}

impl XrefSection {
    pub fn prev(&self) -> Option<u64> {
        offset_value(&self.trailer, "Prev")
    }

    /// Hybrid-file stream offset; both spellings occur in the wild
    pub fn xref_stm(&self) -> Option<u64> {
        offset_value(&self.trailer, "XRefStm").or_else(|| offset_value(&self.trailer, "XrefStm"))
    }
}

fn offset_value(dict: &Dictionary, key: &str) -> Option<u64> {
    dict.get_integer(key).and_then(|v| u64::try_from(v).ok())
}

/// Reads one cross-reference section at a byte offset
pub struct XrefSectionReader<'a, R> {
    cursor: &'a mut ByteCursor<R>,
    config: &'a ResolverConfig,
    diagnostics: &'a mut Diagnostics,
}

impl<'a, R: Read + Seek> XrefSectionReader<'a, R> {
    pub fn new(
        cursor: &'a mut ByteCursor<R>,
        config: &'a ResolverConfig,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            cursor,
            config,
            diagnostics,
        }
    }

    /// Parse the section at `offset`, classical table or xref stream
    pub fn read(&mut self, offset: u64) -> PDFResult<XrefSection> {
        if offset >= self.cursor.len() {
            return Err(PDFResolverError::xref(format!(
                "section offset {} beyond end of file",
                offset
            )));
        }
        self.cursor.seek(offset)?;
        while let Some(b) = self.cursor.peek_byte()? {
            if !is_whitespace(b) {
                break;
            }
            self.cursor.read_byte()?;
        }

        match self.cursor.peek_byte()? {
            Some(b'x') => self.read_table(offset),
            Some(b) if b.is_ascii_digit() => self.read_stream(offset),
            _ => Err(PDFResolverError::xref(format!(
                "no cross-reference section at offset {}",
                offset
            ))),
        }
    }

    fn read_table(&mut self, offset: u64) -> PDFResult<XrefSection> {
        debug!("Reading xref table at offset {}", offset);
        let keyword = self.cursor.read_line()?;
        if trim_ascii(&keyword) != b"xref" {
            return Err(PDFResolverError::xref("expected 'xref' keyword"));
        }

        let mut entries = Vec::new();
        let trailer = loop {
            let line_start = self.cursor.tell()?;
            if self.cursor.is_eof()? {
                return Err(PDFResolverError::xref("xref table without trailer"));
            }
            let line = self.cursor.read_line()?;
            let text = trim_ascii(&line);
            if text.is_empty() {
                continue;
            }
            if text.starts_with(b"trailer") {
                let lead = line.len() - trim_start_ascii(&line).len();
                self.cursor.seek(line_start + lead as u64 + b"trailer".len() as u64)?;
                let mut parser = ObjectParser::new(self.cursor, self.diagnostics);
                match parser.parse_value()? {
                    Object::Dictionary(dict) => break dict,
                    other => {
                        return Err(PDFResolverError::xref(format!(
                            "trailer is a {}, not a dictionary",
                            other.type_name()
                        )))
                    }
                }
            }

            let (first, count) = parse_subsection_header(text)?;
            trace!("Xref subsection {} {}", first, count);
            for i in 0..count {
                let id = first.checked_add(i).ok_or_else(|| {
                    PDFResolverError::xref("subsection overflows object numbers")
                })?;
                entries.push((id, self.read_record()?));
            }
        };

        // Entries past the revision's own /Size are dropped rather than
        // trusted.
        if let Some(size) = trailer.get_integer("Size") {
            let before = entries.len();
            entries.retain(|&(id, _)| (id as i64) < size);
            if entries.len() < before {
                self.diagnostics.warn(
                    WarningKind::EntryOutOfRange,
                    Some(offset),
                    format!("{} entries beyond /Size {}", before - entries.len(), size),
                );
            }
        }

        Ok(XrefSection {
            entries,
            trailer,
            is_stream: false,
        })
    }

    fn read_record(&mut self) -> PDFResult<EntryKind> {
        loop {
            if self.cursor.is_eof()? {
                return Err(PDFResolverError::xref("truncated xref record"));
            }
            let line = self.cursor.read_line()?;
            let text = String::from_utf8_lossy(&line);
            let fields: Vec<&str> = text.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            return match fields.as_slice() {
                [offset, generation, kind, ..] => {
                    let value = offset.parse::<u64>().map_err(|_| {
                        PDFResolverError::xref(format!("invalid xref offset '{}'", offset))
                    })?;
                    let generation = generation.parse::<u16>().map_err(|_| {
                        PDFResolverError::xref(format!("invalid xref generation '{}'", generation))
                    })?;
                    match *kind {
                        "n" => Ok(EntryKind::Normal {
                            offset: value,
                            generation,
                        }),
                        "f" => Ok(EntryKind::Free {
                            next: value.min(u32::MAX as u64) as u32,
                            generation,
                        }),
                        other => Err(PDFResolverError::xref(format!(
                            "invalid xref entry type '{}'",
                            other
                        ))),
                    }
                }
                _ => Err(PDFResolverError::xref(format!("invalid xref record '{}'", text.trim()))),
            };
        }
    }

    fn read_stream(&mut self, offset: u64) -> PDFResult<XrefSection> {
        debug!("Reading xref stream at offset {}", offset);
        let (_, object) = ObjectParser::new(self.cursor, self.diagnostics).parse_indirect_object(offset)?;
        let stream = object
            .into_stream()
            .map_err(|_| PDFResolverError::xref("xref stream object is not a stream"))?;
        if let Some(kind) = stream.dict().get_name("Type") {
            if kind != "XRef" {
                return Err(PDFResolverError::xref(format!("expected /Type /XRef, found /{}", kind)));
            }
        }

        let dict = stream.dict();
        let size = dict
            .get_integer("Size")
            .and_then(|s| u32::try_from(s).ok())
            .ok_or_else(|| PDFResolverError::xref("xref stream without valid /Size"))?;
        if size > MAX_OBJECT_ID + 1 {
            return Err(PDFResolverError::LimitExceeded(format!("xref /Size {}", size)));
        }
        let widths = read_widths(dict)?;
        let ranges = read_index(dict, size)?;

        let data = stream.decode(self.config.max_decoded_stream_size)?;
        let entries = decode_rows(&data, widths, &ranges)?;

        let mut trailer = dict.clone();
        for key in XREF_STREAM_ONLY_KEYS {
            trailer.remove(key);
        }

        Ok(XrefSection {
            entries,
            trailer,
            is_stream: true,
        })
    }
}

fn trim_start_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !is_whitespace(*b)).unwrap_or(bytes.len());
    &bytes[start..]
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let bytes = trim_start_ascii(bytes);
    let end = bytes.iter().rposition(|b| !is_whitespace(*b)).map_or(0, |p| p + 1);
    &bytes[..end]
}

fn parse_subsection_header(text: &[u8]) -> PDFResult<(u32, u32)> {
    let text = String::from_utf8_lossy(text);
    let mut fields = text.split_whitespace().map(str::parse::<u32>);
    match (fields.next(), fields.next()) {
        (Some(Ok(first)), Some(Ok(count))) => Ok((first, count)),
        _ => Err(PDFResolverError::xref(format!(
            "invalid xref subsection header '{}'",
            text
        ))),
    }
}

fn read_widths(dict: &Dictionary) -> PDFResult<[usize; 3]> {
    let array = dict
        .get_array("W")
        .ok_or_else(|| PDFResolverError::xref("xref stream without /W"))?;
    if array.len() < 3 {
        return Err(PDFResolverError::xref("/W needs three widths"));
    }

    let mut widths = [0usize; 3];
    for (slot, value) in widths.iter_mut().zip(array) {
        *slot = value
            .as_integer()
            .and_then(|w| usize::try_from(w).ok())
            .filter(|w| *w <= 8)
            .ok_or_else(|| PDFResolverError::xref(format!("invalid /W width {}", value)))?;
    }
    if widths.iter().sum::<usize>() == 0 {
        return Err(PDFResolverError::xref("/W widths are all zero"));
    }
    Ok(widths)
}

fn read_index(dict: &Dictionary, size: u32) -> PDFResult<Vec<(u32, u32)>> {
    let array = match dict.get_array("Index") {
        Some(array) => array,
        None => return Ok(vec![(0, size)]),
    };
    if array.len() % 2 != 0 {
        return Err(PDFResolverError::xref("/Index has an odd number of values"));
    }

    array
        .chunks(2)
        .map(|pair| {
            let first = pair[0].as_integer().and_then(|v| u32::try_from(v).ok());
            let count = pair[1].as_integer().and_then(|v| u32::try_from(v).ok());
            match (first, count) {
                (Some(first), Some(count)) if first as u64 + count as u64 <= size as u64 => {
                    Ok((first, count))
                }
                (Some(first), Some(count)) => Err(PDFResolverError::xref(format!(
                    "/Index range {} {} exceeds /Size {}",
                    first, count, size
                ))),
                _ => Err(PDFResolverError::xref("invalid /Index value")),
            }
        })
        .collect()
}

fn read_field(mut bytes: &[u8], width: usize, default: u64) -> PDFResult<u64> {
    if width == 0 {
        return Ok(default);
    }
    Ok(bytes.read_uint::<BigEndian>(width)?)
}

fn decode_rows(data: &[u8], widths: [usize; 3], ranges: &[(u32, u32)]) -> PDFResult<Vec<(u32, EntryKind)>> {
    let row_len: usize = widths.iter().sum();
    let rows: u64 = ranges.iter().map(|&(_, count)| count as u64).sum();
    if (data.len() as u64) < rows * row_len as u64 {
        return Err(PDFResolverError::xref(format!(
            "xref stream holds {} bytes, {} rows of {} needed",
            data.len(),
            rows,
            row_len
        )));
    }

    let mut entries = Vec::with_capacity(rows as usize);
    let mut rows_iter = data.chunks_exact(row_len);
    for &(first, count) in ranges {
        for id in first..first + count {
            let row = rows_iter
                .next()
                .ok_or_else(|| PDFResolverError::xref("truncated xref stream"))?;
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);

            let kind = read_field(f1, widths[0], 1)?;
            let field2 = read_field(f2, widths[1], 0)?;
            let field3 = read_field(f3, widths[2], 0)?;

            let entry = match kind {
                0 => EntryKind::Free {
                    next: narrow(field2, "next free object")?,
                    generation: narrow(field3, "generation")?,
                },
                1 => EntryKind::Normal {
                    offset: field2,
                    generation: narrow(field3, "generation")?,
                },
                2 => EntryKind::Compressed {
                    stream_id: narrow(field2, "object stream number")?,
                    index: narrow(field3, "object stream index")?,
                },
                other => {
                    // Unknown types are reserved; the object stays absent.
                    trace!("Skipping xref entry {} with type {}", id, other);
                    continue;
                }
            };
            entries.push((id, entry));
        }
    }
    Ok(entries)
}

fn narrow<T: TryFrom<u64>>(value: u64, what: &str) -> PDFResult<T> {
    T::try_from(value).map_err(|_| PDFResolverError::xref(format!("{} {} out of range", what, value)))
}
