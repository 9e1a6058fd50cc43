//! Object stream expansion

use log::{debug, trace};

use super::parser::Token;
use super::{ByteCursor, Object, ObjectParser, Stream};
use crate::config::ResolverConfig;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{PDFResolverError, PDFResult};

/// One object unpacked from an object stream
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStreamMember {
    pub id: u32,
    /// Position in the stream header
    pub index: u32,
    pub value: Object,
}

/// Unpacks every member of an object stream in one pass
pub struct ObjectStreamExpander<'a> {
    config: &'a ResolverConfig,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> ObjectStreamExpander<'a> {
    pub fn new(config: &'a ResolverConfig, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            config,
            diagnostics,
        }
    }

    /// Decode `stream` and parse all of its members
    ///
    /// `stream` must already be decrypted; the members themselves are
    /// plaintext. Members that fail to parse are skipped with a warning.
    pub fn expand(&mut self, stream_id: u32, stream: &Stream) -> PDFResult<Vec<ObjectStreamMember>> {
        if let Some(kind) = stream.dict().get_name("Type") {
            if kind != "ObjStm" {
                return Err(PDFResolverError::malformed(format!(
                    "object {} is /Type /{}, not an object stream",
                    stream_id, kind
                )));
            }
        }

        let dict = stream.dict();
        let count = dict
            .get_integer("N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| PDFResolverError::malformed("object stream without valid /N"))?;
        if count > self.config.max_object_stream_objects {
            return Err(PDFResolverError::LimitExceeded(format!(
                "object stream {} declares {} objects",
                stream_id, count
            )));
        }
        let first = dict
            .get_integer("First")
            .and_then(|f| usize::try_from(f).ok())
            .ok_or_else(|| PDFResolverError::malformed("object stream without valid /First"))?;

        let data = stream.decode(self.config.max_decoded_stream_size)?;
        if first > data.len() {
            return Err(PDFResolverError::malformed(format!(
                "object stream /First {} beyond {} decoded bytes",
                first,
                data.len()
            )));
        }
        debug!("Expanding object stream {} with {} members", stream_id, count);

        let header = read_header(&data[..first], count)?;
        let mut cursor = ByteCursor::from_bytes(data);
        let mut members = Vec::with_capacity(count);

        for (index, (id, offset)) in header.into_iter().enumerate() {
            let position = first as u64 + offset;
            let parsed = if position < cursor.len() {
                let mut parser = ObjectParser::new(&mut cursor, self.diagnostics);
                parser.seek(position).and_then(|_| parser.parse_value())
            } else {
                Err(PDFResolverError::malformed("member offset beyond stream data"))
            };

            match parsed {
                Ok(value) => {
                    trace!("Object stream {} member {} is object {}", stream_id, index, id);
                    members.push(ObjectStreamMember {
                        id,
                        index: index as u32,
                        value,
                    });
                }
                Err(e) => self.diagnostics.warn(
                    WarningKind::BrokenObjectStreamMember,
                    Some(position),
                    format!("object {} in stream {}: {}", id, stream_id, e),
                ),
            }
        }

        Ok(members)
    }
}

/// Parse the `(id, offset)` pairs preceding `/First`
fn read_header(header: &[u8], count: usize) -> PDFResult<Vec<(u32, u64)>> {
    let mut cursor = ByteCursor::from_bytes(header.to_vec());
    let mut diagnostics = Diagnostics::new();
    let mut parser = ObjectParser::new(&mut cursor, &mut diagnostics);

    let mut next_integer = || -> PDFResult<i64> {
        match parser.next_token() {
            Ok(Some(Token::Integer(n))) => Ok(n),
            _ => Err(PDFResolverError::malformed("truncated object stream header")),
        }
    };

    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let id = next_integer()?;
        let offset = next_integer()?;
        match (u32::try_from(id), u64::try_from(offset)) {
            (Ok(id), Ok(offset)) => pairs.push((id, offset)),
            _ => {
                return Err(PDFResolverError::malformed(format!(
                    "invalid object stream header pair {} {}",
                    id, offset
                )))
            }
        }
    }
    Ok(pairs)
}
