//! Document-level object resolution
//!
//! `Resolver` ties the pieces together: it loads the cross-reference chain
//! once, sets up the security handler when the trailer carries `/Encrypt`,
//! and then materializes objects on demand. Every resolved value is cached
//! in its object table slot, and expanding an object stream fills the slots
//! of all its members at once.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use log::{debug, info, trace, warn};

use crate::config::ResolverConfig;
use crate::diagnostics::{Diagnostics, Warning, WarningKind};
use crate::error::{PDFResolverError, PDFResult};
use crate::handlers::SecurityHandler;
use crate::pdf::{
    ByteCursor, Dictionary, EntryKind, Object, ObjectId, ObjectParser, ObjectStreamExpander,
    ObjectTable, Stream, XrefEntry, XrefLoader,
};
use crate::security::{decrypt_object, SecurityState};
use crate::{EncryptionInfo, Permissions};

/// Security setup for an encrypted document
struct Encryption {
    handler: SecurityHandler,
    /// Where the encryption dictionary lives when it is indirect
    dict_id: Option<ObjectId>,
    /// Set once a password has been accepted
    state: Option<SecurityState>,
}

/// Resolves object ids of one document to decrypted values
pub struct Resolver<R> {
    cursor: ByteCursor<R>,
    config: ResolverConfig,
    diagnostics: Diagnostics,
    table: ObjectTable,
    trailer: Dictionary,
    version: u32,
    encryption: Option<Encryption>,
    /// Objects currently being loaded, to stop self-referencing chains
    in_progress: HashSet<u32>,
}

impl Resolver<Cursor<Vec<u8>>> {
    /// Open a document held in memory
    pub fn from_bytes(data: Vec<u8>) -> PDFResult<Self> {
        Self::open(Cursor::new(data))
    }
}

impl Resolver<BufReader<File>> {
    /// Open a document on disk
    pub fn open_path(path: impl AsRef<Path>) -> PDFResult<Self> {
        let file = File::open(path.as_ref())?;
        debug!("Opening {}", path.as_ref().display());
        Self::open(BufReader::new(file))
    }
}

impl<R: Read + Seek> Resolver<R> {
    /// Open a document with the default configuration
    pub fn open(reader: R) -> PDFResult<Self> {
        Self::with_config(reader, ResolverConfig::default())
    }

    /// Load the cross-reference chain and, for encrypted documents, set up
    /// the security handler and try the empty password
    pub fn with_config(reader: R, config: ResolverConfig) -> PDFResult<Self> {
        let mut cursor = ByteCursor::new(reader)?;
        let mut diagnostics = Diagnostics::new();
        let loaded = XrefLoader::new(&mut cursor, &config, &mut diagnostics).load()?;

        let mut resolver = Self {
            cursor,
            config,
            diagnostics,
            table: loaded.table,
            trailer: loaded.trailer,
            version: loaded.version,
            encryption: None,
            in_progress: HashSet::new(),
        };
        resolver.setup_encryption()?;
        Ok(resolver)
    }

    fn setup_encryption(&mut self) -> PDFResult<()> {
        let (dict, dict_id) = match self.trailer.get("Encrypt").cloned() {
            None => return Ok(()),
            Some(Object::Reference(id)) => {
                let dict = self.load(id.0, id.1)?.expect_dict()?.clone();
                (dict, Some(id))
            }
            Some(Object::Dictionary(dict)) => (dict, None),
            Some(other) => {
                return Err(PDFResolverError::invalid_dict_value(
                    "Encrypt",
                    format!("expected dictionary, found {}", other.type_name()),
                ))
            }
        };

        let file_id = self
            .trailer
            .get_array("ID")
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .ok_or_else(|| PDFResolverError::malformed("encrypted document without /ID"))?
            .to_vec();

        let handler = SecurityHandler::from_encrypt_dict(&dict, &file_id)?;
        info!(
            "Document is encrypted with {} (R{})",
            handler.algorithm(),
            handler.revision()
        );

        let state = match handler.authenticate_password(b"") {
            Ok(state) => Some(state),
            Err(PDFResolverError::AuthenticationFailed) => {
                debug!("Empty password rejected, a password is required");
                None
            }
            Err(e) => return Err(e),
        };

        self.encryption = Some(Encryption {
            handler,
            dict_id,
            state,
        });
        Ok(())
    }

    /// Fully resolved value of object `id gen`
    ///
    /// A value that is itself a reference is followed until a direct value
    /// is reached, up to the configured depth.
    pub fn get_object(&mut self, id: u32, generation: u16) -> PDFResult<Object> {
        if !self.is_authenticated() {
            return Err(PDFResolverError::PasswordRequired);
        }

        let mut seen = HashSet::from([id]);
        let mut value = self.load(id, generation)?;
        let mut hops = 0usize;

        while let Object::Reference((next_id, next_gen)) = value {
            hops += 1;
            if hops > self.config.max_reference_depth {
                return Err(PDFResolverError::LimitExceeded(format!(
                    "more than {} references from {} {} R",
                    self.config.max_reference_depth, id, generation
                )));
            }
            if !seen.insert(next_id) {
                return Err(PDFResolverError::malformed(format!(
                    "reference cycle through {} {} R",
                    next_id, next_gen
                )));
            }
            value = self.load(next_id, next_gen)?;
        }

        Ok(value)
    }

    /// Dereference `object` when it is a reference
    pub fn resolve(&mut self, object: &Object) -> PDFResult<Object> {
        match object {
            Object::Reference((id, generation)) => self.get_object(*id, *generation),
            other => Ok(other.clone()),
        }
    }

    /// The document catalog named by the trailer `/Root`
    pub fn root(&mut self) -> PDFResult<Object> {
        let (id, generation) = self
            .trailer
            .get_reference("Root")
            .ok_or_else(|| PDFResolverError::missing("Root"))?;
        self.get_object(id, generation)
    }

    /// Merged trailer, newest keys first
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Header version as `major * 10 + minor`, 0 when unreadable
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn warnings(&self) -> &[Warning] {
        self.diagnostics.warnings()
    }

    /// Table entry for `id`, `None` for unallocated ids
    pub fn entry(&self, id: u32) -> Option<&XrefEntry> {
        self.table.get(id)
    }

    /// Number of slots in the object table
    pub fn size(&self) -> u32 {
        self.table.size()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        match &self.encryption {
            None => true,
            Some(encryption) => encryption.state.is_some(),
        }
    }

    /// Offer a password; on failure the previous state is kept
    pub fn authenticate(&mut self, password: &[u8]) -> PDFResult<()> {
        let encryption = match self.encryption.as_mut() {
            None => return Ok(()),
            Some(encryption) => encryption,
        };
        let state = encryption.handler.authenticate_password(password)?;
        encryption.state = Some(state);
        Ok(())
    }

    pub fn try_authenticate(&mut self, password: &[u8]) -> bool {
        match self.authenticate(password) {
            Ok(()) => true,
            Err(e) => {
                debug!("Password not accepted: {}", e);
                false
            }
        }
    }

    pub fn permissions(&self) -> Option<Permissions> {
        self.encryption
            .as_ref()
            .map(|encryption| encryption.handler.permissions())
    }

    pub fn encryption_info(&self) -> Option<EncryptionInfo> {
        self.encryption.as_ref().map(|encryption| EncryptionInfo {
            algorithm: encryption.handler.algorithm(),
            revision: encryption.handler.revision(),
            permissions: encryption.handler.permissions(),
            authenticated: encryption.state.is_some(),
        })
    }

    pub fn security_state(&self) -> Option<&SecurityState> {
        self.encryption
            .as_ref()
            .and_then(|encryption| encryption.state.as_ref())
    }

    /// Load one object through the table, caching the result
    fn load(&mut self, id: u32, generation: u16) -> PDFResult<Object> {
        if let Some(value) = self.table.cached(id) {
            return Ok(value.clone());
        }

        let kind = match self.table.get(id) {
            Some(entry) if entry.kind.generation() == generation && !entry.kind.is_free() => entry.kind,
            _ => return Err(PDFResolverError::ObjectNotFound(id, generation)),
        };

        if !self.in_progress.insert(id) {
            return Err(PDFResolverError::malformed(format!(
                "object {} {} R depends on itself",
                id, generation
            )));
        }
        let result = match kind {
            EntryKind::Normal { offset, .. } => self.load_normal(id, generation, offset),
            EntryKind::Compressed { stream_id, .. } => self.load_compressed(id, stream_id),
            EntryKind::Free { .. } => Err(PDFResolverError::ObjectNotFound(id, generation)),
        };
        self.in_progress.remove(&id);

        let value = result?;
        self.table.set_cached(id, value.clone());
        Ok(value)
    }

    fn load_normal(&mut self, id: u32, generation: u16, offset: u64) -> PDFResult<Object> {
        let (found, mut object) =
            ObjectParser::new(&mut self.cursor, &mut self.diagnostics).parse_indirect_object(offset)?;
        if found != (id, generation) {
            return Err(PDFResolverError::malformed(format!(
                "offset {} holds object {} {}, expected {} {}",
                offset, found.0, found.1, id, generation
            )));
        }

        if let Object::Stream(stream) = &mut object {
            self.settle_indirect_length(stream)?;
        }

        if let Some(encryption) = &self.encryption {
            if let Some(state) = &encryption.state {
                if encryption.dict_id != Some((id, generation)) {
                    decrypt_object(state, id, generation, &mut object)?;
                }
            }
        }
        Ok(object)
    }

    /// Re-read a stream whose `/Length` is a reference, once the length
    /// is known
    fn settle_indirect_length(&mut self, stream: &mut Stream) -> PDFResult<()> {
        let (length_id, length_gen) = match stream.dict().get("Length") {
            Some(Object::Reference(id)) => *id,
            _ => return Ok(()),
        };

        let length = match self.load(length_id, length_gen) {
            Ok(Object::Integer(n)) => n,
            Ok(other) => {
                self.diagnostics.warn(
                    WarningKind::StreamLength,
                    Some(stream.data_offset()),
                    format!("/Length {} {} R is {}, not an integer", length_id, length_gen, other.type_name()),
                );
                return Ok(());
            }
            Err(e) => {
                self.diagnostics.warn(
                    WarningKind::StreamLength,
                    Some(stream.data_offset()),
                    format!("/Length {} {} R unresolvable: {}", length_id, length_gen, e),
                );
                return Ok(());
            }
        };

        let fits = u64::try_from(length)
            .ok()
            .filter(|len| stream.data_offset().saturating_add(*len) <= self.cursor.len());
        match fits {
            Some(len) if len as usize == stream.data().len() => {}
            Some(len) => {
                trace!(
                    "Stream at {} re-read with /Length {} instead of {}",
                    stream.data_offset(),
                    len,
                    stream.data().len()
                );
                self.cursor.seek(stream.data_offset())?;
                let data = self.cursor.read_n(len as usize)?;
                stream.set_data(data);
            }
            None => self.diagnostics.warn(
                WarningKind::StreamLength,
                Some(stream.data_offset()),
                format!("indirect /Length {} runs past end of file", length),
            ),
        }
        Ok(())
    }

    fn load_compressed(&mut self, id: u32, stream_id: u32) -> PDFResult<Object> {
        match self.table.get(stream_id).map(|entry| entry.kind) {
            Some(EntryKind::Normal { .. }) => {}
            _ => {
                return Err(PDFResolverError::xref(format!(
                    "object {} points into {}, which is not a stored object stream",
                    id, stream_id
                )))
            }
        }

        // The container goes through decryption like any stored stream;
        // its members come out as plaintext.
        let container = self.load(stream_id, 0)?.into_stream()?;
        let members =
            ObjectStreamExpander::new(&self.config, &mut self.diagnostics).expand(stream_id, &container)?;

        let mut populated = 0usize;
        for member in members {
            let belongs = match self.table.get(member.id) {
                Some(entry) if entry.cached().is_none() => matches!(
                    entry.kind,
                    EntryKind::Compressed { stream_id: s, .. } if s == stream_id
                ),
                _ => false,
            };
            if belongs {
                self.table.set_cached(member.id, member.value);
                populated += 1;
            }
        }
        debug!("Object stream {} filled {} slots", stream_id, populated);

        match self.table.cached(id) {
            Some(value) => Ok(value.clone()),
            None => {
                warn!("Object {} missing from object stream {}", id, stream_id);
                Err(PDFResolverError::ObjectNotFound(id, 0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    const SIMPLE: &[u8] = b"%PDF-1.4
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj
2 0 obj
<< /Type /Pages /Kids [] /Count 0 >>
endobj
3 0 obj
4 0 R
endobj
4 0 obj
3 0 R
endobj
xref
0 5
0000000000 65535 f
0000000009 00000 n
0000000058 00000 n
0000000110 00000 n
0000000131 00000 n
trailer
<< /Size 5 /Root 1 0 R >>
startxref
152
%%EOF
";

    #[test]
    fn test_root_and_cache() {
        let mut resolver = Resolver::from_bytes(SIMPLE.to_vec()).unwrap();
        assert_eq!(resolver.version(), 14);
        assert!(!resolver.is_encrypted());
        assert!(resolver.is_authenticated());

        let root = resolver.root().unwrap();
        assert!(root.as_dict().unwrap().is_type("Catalog"));
        assert!(resolver.entry(1).unwrap().cached().is_some());

        let pages = resolver.resolve(root.as_dict().unwrap().get("Pages").unwrap()).unwrap();
        assert_eq!(pages.as_dict().unwrap().get_integer("Count"), Some(0));
    }

    #[test]
    fn test_reference_cycle() {
        let mut resolver = Resolver::from_bytes(SIMPLE.to_vec()).unwrap();
        assert!(matches!(
            resolver.get_object(3, 0),
            Err(PDFResolverError::MalformedPDF(_))
        ));
    }

    #[test]
    fn test_missing_and_free_objects() {
        let mut resolver = Resolver::from_bytes(SIMPLE.to_vec()).unwrap();
        assert!(matches!(
            resolver.get_object(0, 65535),
            Err(PDFResolverError::ObjectNotFound(0, 65535))
        ));
        assert!(matches!(
            resolver.get_object(9, 0),
            Err(PDFResolverError::ObjectNotFound(9, 0))
        ));
        assert!(matches!(
            resolver.get_object(1, 3),
            Err(PDFResolverError::ObjectNotFound(1, 3))
        ));
    }

    #[test]
    fn test_header_mismatch() {
        // Slot 2 points at object 1.
        let data = String::from_utf8(SIMPLE.to_vec())
            .unwrap()
            .replace("0000000058 00000 n", "0000000009 00000 n");
        let mut resolver = Resolver::from_bytes(data.into_bytes()).unwrap();
        assert!(matches!(
            resolver.get_object(2, 0),
            Err(PDFResolverError::MalformedPDF(_))
        ));
        assert!(resolver.get_object(1, 0).is_ok());
    }
}
