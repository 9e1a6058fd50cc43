//! Cross-reference chain loading
//!
//! Finds the newest section through `startxref`, then walks `/Prev`
//! links into older revisions. Newer entries shadow older ones: a slot,
//! once filled, is never overwritten. A classical section's `/XRefStm`
//! stream is merged just before the table itself.

use std::collections::HashSet;
use std::io::{Read, Seek};

use log::{debug, info};

use super::cursor::find_sequence_backwards;
use super::xref::{Merge, ObjectTable, XrefSection, XrefSectionReader, MAX_OBJECT_ID};
use super::{ByteCursor, Dictionary};
use crate::config::ResolverConfig;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{PDFResolverError, PDFResult};

const PDF_MAGIC: &[u8] = b"%PDF-";
const STARTXREF: &[u8] = b"startxref";

/// Output of a successful load
#[derive(Debug, Clone)]
pub struct LoadedXref {
    pub table: ObjectTable,
    /// Trailer keys merged newest first
    pub trailer: Dictionary,
    /// Header version as `major * 10 + minor`, 0 when unreadable
    pub version: u32,
    /// Offset of the newest section
    pub startxref: u64,
}

/// Builds the unified object table for a document
pub struct XrefLoader<'a, R> {
    cursor: &'a mut ByteCursor<R>,
    config: &'a ResolverConfig,
    diagnostics: &'a mut Diagnostics,
}

impl<'a, R: Read + Seek> XrefLoader<'a, R> {
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

    pub fn load(mut self) -> PDFResult<LoadedXref> {
        let version = self.read_header()?;
        let startxref = self.find_startxref()?;
        debug!("PDF version {}, startxref {}", version, startxref);

        let (table, trailer) = self.walk_chain(startxref)?;
        info!(
            "Loaded xref for {} objects ({} populated)",
            table.size(),
            table.iter().count()
        );

        Ok(LoadedXref {
            table,
            trailer,
            version,
            startxref,
        })
    }

    fn read_header(&mut self) -> PDFResult<u32> {
        self.cursor.seek(0)?;
        let line = self.cursor.read_line()?;
        if !line.starts_with(PDF_MAGIC) {
            return Err(PDFResolverError::malformed("missing %PDF- header"));
        }

        match parse_version(&line[PDF_MAGIC.len()..]) {
            Some(version) => Ok(version),
            None => {
                self.diagnostics.warn(
                    WarningKind::BadHeaderVersion,
                    Some(0),
                    format!("unreadable version '{}'", String::from_utf8_lossy(&line)),
                );
                Ok(0)
            }
        }
    }

    fn find_startxref(&mut self) -> PDFResult<u64> {
        let len = self.cursor.len();
        let window = (self.config.tail_window as u64).min(len);
        let start = len - window;
        self.cursor.seek(start)?;
        let tail = self.cursor.read_n(window as usize)?;

        let idx = find_sequence_backwards(&tail, STARTXREF)
            .ok_or_else(|| PDFResolverError::malformed("no startxref"))?;
        let digits: String = tail[idx + STARTXREF.len()..]
            .iter()
            .skip_while(|b| b.is_ascii_whitespace())
            .take_while(|b| b.is_ascii_digit())
            .map(|&b| b as char)
            .collect();

        digits
            .parse::<u64>()
            .map_err(|_| PDFResolverError::malformed("startxref without offset"))
    }

    /// Visit sections with an explicit stack so hostile chains cannot
    /// recurse without bound
    fn walk_chain(&mut self, startxref: u64) -> PDFResult<(ObjectTable, Dictionary)> {
        let mut table: Option<ObjectTable> = None;
        let mut trailer = Dictionary::new();
        let mut visited = HashSet::new();
        let mut stack = vec![startxref];
        let mut sections = 0usize;

        while let Some(offset) = stack.pop() {
            if !visited.insert(offset) {
                self.diagnostics.warn(
                    WarningKind::XrefCycle,
                    Some(offset),
                    "cross-reference section visited twice",
                );
                continue;
            }
            if sections == self.config.max_xref_sections {
                self.diagnostics.warn(
                    WarningKind::ChainTruncated,
                    Some(offset),
                    format!("stopped after {} sections", sections),
                );
                break;
            }
            sections += 1;

            let section = match self.read_section(offset) {
                Ok(section) => section,
                // The newest section must be readable.
                Err(e) if table.is_none() => return Err(e),
                Err(e) => {
                    self.diagnostics.warn(
                        WarningKind::BrokenXrefLink,
                        Some(offset),
                        format!("older section skipped: {}", e),
                    );
                    continue;
                }
            };

            if table.is_none() {
                table = Some(ObjectTable::with_size(table_size(&section)?));
            }
            let Some(current) = table.as_mut() else {
                continue;
            };

            // A hybrid file's stream entries take precedence over its own
            // table. Only the table's trailer counts; the stream's /Prev
            // is never followed.
            if !section.is_stream {
                if let Some(stm) = section.xref_stm() {
                    self.merge_hybrid_stream(current, &mut visited, stm);
                }
            }
            self.merge_entries(current, &section, offset);
            for (key, value) in section.trailer.iter() {
                trailer.set_if_absent(key, value.clone());
            }

            if let Some(prev) = section.prev() {
                stack.push(prev);
            }
        }

        let mut table = table.ok_or_else(|| PDFResolverError::xref("no cross-reference section"))?;
        table.force_free_head();
        Ok((table, trailer))
    }

    fn read_section(&mut self, offset: u64) -> PDFResult<XrefSection> {
        XrefSectionReader::new(self.cursor, self.config, self.diagnostics).read(offset)
    }

    fn merge_hybrid_stream(&mut self, table: &mut ObjectTable, visited: &mut HashSet<u64>, offset: u64) {
        if !visited.insert(offset) {
            self.diagnostics.warn(
                WarningKind::XrefCycle,
                Some(offset),
                "/XRefStm points at a section already visited",
            );
            return;
        }
        match self.read_section(offset) {
            Ok(stream) if stream.is_stream => self.merge_entries(table, &stream, offset),
            Ok(_) => self.diagnostics.warn(
                WarningKind::BrokenXrefLink,
                Some(offset),
                "/XRefStm does not point at a cross-reference stream",
            ),
            Err(e) => self.diagnostics.warn(
                WarningKind::BrokenXrefLink,
                Some(offset),
                format!("hybrid stream skipped: {}", e),
            ),
        }
    }

    fn merge_entries(&mut self, table: &mut ObjectTable, section: &XrefSection, offset: u64) {
        let mut out_of_range = 0usize;
        for &(id, kind) in &section.entries {
            if table.merge(id, kind) == Merge::OutOfRange {
                out_of_range += 1;
            }
        }
        if out_of_range > 0 {
            self.diagnostics.warn(
                WarningKind::EntryOutOfRange,
                Some(offset),
                format!("{} entries beyond table size {}", out_of_range, table.size()),
            );
        }
    }
}

fn table_size(section: &XrefSection) -> PDFResult<u32> {
    let size = section
        .trailer
        .get_integer("Size")
        .ok_or_else(|| PDFResolverError::xref("trailer without /Size"))?;
    u32::try_from(size)
        .ok()
        .filter(|s| *s <= MAX_OBJECT_ID + 1)
        .ok_or_else(|| PDFResolverError::xref(format!("invalid trailer /Size {}", size)))
}

fn parse_version(bytes: &[u8]) -> Option<u32> {
    match bytes {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Some((major - b'0') as u32 * 10 + (minor - b'0') as u32)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::xref::EntryKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn load(data: &[u8]) -> PDFResult<(LoadedXref, Diagnostics)> {
        let mut cursor = ByteCursor::from_bytes(data.to_vec());
        let config = ResolverConfig::default();
        let mut diagnostics = Diagnostics::new();
        let loaded = XrefLoader::new(&mut cursor, &config, &mut diagnostics).load()?;
        Ok((loaded, diagnostics))
    }

    #[rstest]
    #[case(b"1.7", Some(17))]
    #[case(b"1.4\r", Some(14))]
    #[case(b"2.0 junk", Some(20))]
    #[case(b"x.y", None)]
    #[case(b"1", None)]
    fn test_parse_version(#[case] input: &[u8], #[case] expected: Option<u32>) {
        assert_eq!(parse_version(input), expected);
    }

    #[test_log::test]
    fn test_missing_header() {
        let result = load(b"Not a PDF file\nstartxref\n0\n%%EOF");
        assert!(matches!(result, Err(PDFResolverError::MalformedPDF(_))));
    }

    #[test_log::test]
    fn test_missing_startxref() {
        let result = load(b"%PDF-1.4\nxref\n0 1\n0000000000 65535 f \ntrailer << /Size 1 >>\n%%EOF");
        assert!(matches!(result, Err(PDFResolverError::MalformedPDF(ref m)) if m == "no startxref"));
    }

    #[test_log::test]
    fn test_single_section() {
        let data = b"%PDF-1.4\nxref\n0 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer << /Size 2 /Root 1 0 R >>\nstartxref\n9\n%%EOF";
        let (loaded, diagnostics) = load(data).unwrap();

        assert_eq!(loaded.version, 14);
        assert_eq!(loaded.startxref, 9);
        assert_eq!(loaded.table.size(), 2);
        assert_eq!(
            loaded.table.get(1).unwrap().kind,
            EntryKind::Normal { offset: 9, generation: 0 }
        );
        assert!(diagnostics.warnings().is_empty());
    }

    #[test_log::test]
    fn test_bad_version_is_not_fatal() {
        let data = b"%PDF-x\nxref\n0 1\n0000000000 65535 f \ntrailer << /Size 1 >>\nstartxref\n7\n%%EOF";
        let (loaded, diagnostics) = load(data).unwrap();
        assert_eq!(loaded.version, 0);
        assert!(diagnostics.has(WarningKind::BadHeaderVersion));
    }

    #[test_log::test]
    fn test_self_referencing_prev() {
        let data = b"%PDF-1.4\nxref\n0 1\n0000000000 65535 f \ntrailer << /Size 1 /Prev 9 >>\nstartxref\n9\n%%EOF";
        let (loaded, diagnostics) = load(data).unwrap();
        assert_eq!(loaded.table.size(), 1);
        assert!(diagnostics.has(WarningKind::XrefCycle));
    }

    /// Classical table whose object 2 is free, backed by an `/XRefStm`
    /// that places it in object stream 3
    fn hybrid_file(stream_extra: &str) -> Vec<u8> {
        let mut data = b"%PDF-1.5\n".to_vec();
        let stm = data.len();
        data.extend_from_slice(
            format!(
                "4 0 obj\n<< /Type /XRef /Size 3 /Index [2 1] /W [1 2 1] /Length 4 {} >>\nstream\n",
                stream_extra
            )
            .as_bytes(),
        );
        data.extend_from_slice(&[2, 0, 3, 0]);
        data.extend_from_slice(b"\nendstream\nendobj\n");
        let xref = data.len();
        data.extend_from_slice(
            format!(
                "xref\n0 3\n0000000000 65535 f \n0000000009 00000 n \n0000000000 00001 f \n\
                 trailer\n<< /Size 5 /Root 1 0 R /XRefStm {} >>\nstartxref\n{}\n%%EOF",
                stm, xref
            )
            .as_bytes(),
        );
        data
    }

    #[test_log::test]
    fn test_hybrid_stream_shadows_legacy_free_entry() {
        let (loaded, diagnostics) = load(&hybrid_file("")).unwrap();

        assert_eq!(
            loaded.table.get(2).unwrap().kind,
            EntryKind::Compressed { stream_id: 3, index: 0 }
        );
        assert_eq!(
            loaded.table.get(1).unwrap().kind,
            EntryKind::Normal { offset: 9, generation: 0 }
        );
        assert_eq!(loaded.table.size(), 5);
        assert_eq!(loaded.trailer.get_integer("Size"), Some(5));
        assert!(diagnostics.warnings().is_empty());
    }

    #[test_log::test]
    fn test_hybrid_stream_prev_is_not_followed() {
        // Offset 0 holds the header, which would be a broken section.
        let (loaded, diagnostics) = load(&hybrid_file("/Prev 0")).unwrap();
        assert!(loaded.table.get(2).is_some());
        assert!(diagnostics.warnings().is_empty());
    }

    #[test_log::test]
    fn test_broken_hybrid_stream_keeps_table() {
        let data = b"%PDF-1.4\nxref\n0 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer << /Size 2 /XRefStm 0 >>\nstartxref\n9\n%%EOF";
        let (loaded, diagnostics) = load(data).unwrap();
        assert!(loaded.table.get(1).is_some());
        assert!(diagnostics.has(WarningKind::BrokenXrefLink));
    }

    #[test_log::test]
    fn test_huge_size_is_not_preallocated() {
        let data = b"%PDF-1.4\nxref\n0 1\n0000000000 65535 f \ntrailer << /Size 8388608 >>\nstartxref\n9\n%%EOF";
        let (loaded, _) = load(data).unwrap();
        assert_eq!(loaded.table.size(), 8_388_608);
        assert_eq!(loaded.table.iter().count(), 1);
    }

    #[test_log::test]
    fn test_broken_root_section_is_fatal() {
        let data = b"%PDF-1.4\ngarbage\nstartxref\n9\n%%EOF";
        assert!(matches!(load(data), Err(PDFResolverError::XRefError(_))));
    }
}
