//! PDF object syntax parser

use std::io::{Read, Seek};

use log::trace;

use super::{ByteCursor, Dictionary, Object, ObjectId, Stream};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{PDFResolverError, PDFResult};

const MAX_NESTING: usize = 256;
const ENDSTREAM: &[u8] = b"endstream";

/// Lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Integer(i64),
    Real(f64),
    Name(String),
    String(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Keyword(String),
}

pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

pub fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(byte: u8) -> bool {
    !is_whitespace(byte) && !is_delimiter(byte)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Parser for direct and indirect objects at arbitrary offsets
pub struct ObjectParser<'a, R> {
    cursor: &'a mut ByteCursor<R>,
    diagnostics: &'a mut Diagnostics,
    depth: usize,
}

impl<'a, R: Read + Seek> ObjectParser<'a, R> {
    pub fn new(cursor: &'a mut ByteCursor<R>, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            cursor,
            diagnostics,
            depth: 0,
        }
    }

    pub fn seek(&mut self, offset: u64) -> PDFResult<()> {
        self.cursor.seek(offset)?;
        Ok(())
    }

    /// Skip whitespace and comments
    pub fn skip_whitespace(&mut self) -> PDFResult<()> {
        while let Some(byte) = self.cursor.peek_byte()? {
            if is_whitespace(byte) {
                self.cursor.read_byte()?;
            } else if byte == b'%' {
                self.cursor.read_line()?;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Read the next token, `None` at end of data
    pub fn next_token(&mut self) -> PDFResult<Option<Token>> {
        self.skip_whitespace()?;
        let byte = match self.cursor.read_byte()? {
            Some(b) => b,
            None => return Ok(None),
        };

        let token = match byte {
            b'[' => Token::ArrayStart,
            b']' => Token::ArrayEnd,
            b'/' => Token::Name(self.read_name()?),
            b'(' => Token::String(self.read_literal_string()?),
            b'<' => {
                if self.cursor.peek_byte()? == Some(b'<') {
                    self.cursor.read_byte()?;
                    Token::DictStart
                } else {
                    Token::String(self.read_hex_string()?)
                }
            }
            b'>' => {
                if self.cursor.read_byte()? != Some(b'>') {
                    return Err(PDFResolverError::malformed("stray '>'"));
                }
                Token::DictEnd
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(byte)?,
            b if is_regular(b) => {
                let mut word = vec![b];
                word.extend(self.read_regular()?);
                Token::Keyword(String::from_utf8_lossy(&word).into_owned())
            }
            other => {
                return Err(PDFResolverError::malformed(format!(
                    "unexpected delimiter '{}'",
                    other as char
                )))
            }
        };
        Ok(Some(token))
    }

    fn read_regular(&mut self) -> PDFResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(b) = self.cursor.peek_byte()? {
            if !is_regular(b) {
                break;
            }
            out.push(b);
            self.cursor.read_byte()?;
        }
        Ok(out)
    }

    fn read_name(&mut self) -> PDFResult<String> {
        let raw = self.read_regular()?;
        let mut name = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'#' && i + 2 < raw.len() {
                if let (Some(hi), Some(lo)) = (hex_value(raw[i + 1]), hex_value(raw[i + 2])) {
                    name.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
            }
            name.push(raw[i]);
            i += 1;
        }
        Ok(String::from_utf8_lossy(&name).into_owned())
    }

    fn read_number(&mut self, first: u8) -> PDFResult<Token> {
        let mut text = vec![first];
        text.extend(self.read_regular()?);
        let text = String::from_utf8_lossy(&text).into_owned();

        if !text.contains('.') {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Token::Integer(i));
            }
        }
        text.parse::<f64>()
            .map(Token::Real)
            .map_err(|_| PDFResolverError::malformed(format!("invalid number '{}'", text)))
    }

    fn read_literal_string(&mut self) -> PDFResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut nesting = 1usize;

        loop {
            let byte = self
                .cursor
                .read_byte()?
                .ok_or_else(|| PDFResolverError::malformed("unterminated literal string"))?;
            match byte {
                b'(' => {
                    nesting += 1;
                    out.push(byte);
                }
                b')' => {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                    out.push(byte);
                }
                b'\\' => self.read_escape(&mut out)?,
                b'\r' => {
                    if self.cursor.peek_byte()? == Some(b'\n') {
                        self.cursor.read_byte()?;
                    }
                    out.push(b'\n');
                }
                _ => out.push(byte),
            }
        }
        Ok(out)
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) -> PDFResult<()> {
        let byte = match self.cursor.read_byte()? {
            Some(b) => b,
            None => return Err(PDFResolverError::malformed("unterminated escape")),
        };
        match byte {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'0'..=b'7' => {
                let mut value = (byte - b'0') as u16;
                for _ in 0..2 {
                    match self.cursor.peek_byte()? {
                        Some(d @ b'0'..=b'7') => {
                            self.cursor.read_byte()?;
                            value = value * 8 + (d - b'0') as u16;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xff) as u8);
            }
            // Line continuation
            b'\r' => {
                if self.cursor.peek_byte()? == Some(b'\n') {
                    self.cursor.read_byte()?;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
        Ok(())
    }

    fn read_hex_string(&mut self) -> PDFResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut high: Option<u8> = None;

        loop {
            let byte = self
                .cursor
                .read_byte()?
                .ok_or_else(|| PDFResolverError::malformed("unterminated hex string"))?;
            if byte == b'>' {
                break;
            }
            if is_whitespace(byte) {
                continue;
            }
            let digit = hex_value(byte).ok_or_else(|| {
                PDFResolverError::malformed(format!("invalid hex digit '{}'", byte as char))
            })?;
            match high.take() {
                Some(h) => out.push(h << 4 | digit),
                None => high = Some(digit),
            }
        }
        if let Some(h) = high {
            out.push(h << 4);
        }
        Ok(out)
    }

    /// Parse one direct object
    pub fn parse_value(&mut self) -> PDFResult<Object> {
        let token = self
            .next_token()?
            .ok_or_else(|| PDFResolverError::malformed("unexpected end of data"))?;
        self.parse_from_token(token)
    }

    fn parse_from_token(&mut self, token: Token) -> PDFResult<Object> {
        match token {
            Token::Integer(n) => self.maybe_reference(n),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::Name(n) => Ok(Object::Name(n)),
            Token::String(s) => Ok(Object::String(s)),
            Token::ArrayStart => self.parse_array(),
            Token::DictStart => self.parse_dict().map(Object::Dictionary),
            Token::Keyword(k) => match k.as_str() {
                "true" => Ok(Object::Boolean(true)),
                "false" => Ok(Object::Boolean(false)),
                "null" => Ok(Object::Null),
                other => Err(PDFResolverError::malformed(format!(
                    "unexpected keyword '{}'",
                    other
                ))),
            },
            Token::ArrayEnd | Token::DictEnd => {
                Err(PDFResolverError::malformed("unbalanced closing delimiter"))
            }
        }
    }

    /// `n` has been read; turn `n g R` into a reference, otherwise rewind
    fn maybe_reference(&mut self, n: i64) -> PDFResult<Object> {
        let rewind = self.cursor.tell()?;

        if let Ok(id) = u32::try_from(n) {
            if let Some(Token::Integer(g)) = self.next_token()? {
                if let Ok(gen) = u16::try_from(g) {
                    if let Some(Token::Keyword(k)) = self.next_token()? {
                        if k == "R" {
                            return Ok(Object::Reference((id, gen)));
                        }
                    }
                }
            }
        }

        self.cursor.seek(rewind)?;
        Ok(Object::Integer(n))
    }

    fn enter(&mut self) -> PDFResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(PDFResolverError::LimitExceeded(format!(
                "object nesting deeper than {}",
                MAX_NESTING
            )));
        }
        Ok(())
    }

    fn parse_array(&mut self) -> PDFResult<Object> {
        self.enter()?;
        let mut items = Vec::new();
        loop {
            match self.next_token()? {
                Some(Token::ArrayEnd) => break,
                Some(token) => items.push(self.parse_from_token(token)?),
                None => return Err(PDFResolverError::malformed("unterminated array")),
            }
        }
        self.depth -= 1;
        Ok(Object::Array(items))
    }

    fn parse_dict(&mut self) -> PDFResult<Dictionary> {
        self.enter()?;
        let mut dict = Dictionary::new();
        loop {
            match self.next_token()? {
                Some(Token::DictEnd) => break,
                Some(Token::Name(key)) => {
                    let value = self.parse_value()?;
                    // Null-valued entries are equivalent to absent ones.
                    if value != Object::Null {
                        dict.set(key, value);
                    }
                }
                Some(other) => {
                    return Err(PDFResolverError::malformed(format!(
                        "dictionary key must be a name, found {:?}",
                        other
                    )))
                }
                None => return Err(PDFResolverError::malformed("unterminated dictionary")),
            }
        }
        self.depth -= 1;
        Ok(dict)
    }

    fn expect_keyword(&mut self, keyword: &str) -> PDFResult<()> {
        match self.next_token()? {
            Some(Token::Keyword(k)) if k == keyword => Ok(()),
            other => Err(PDFResolverError::malformed(format!(
                "expected '{}', found {:?}",
                keyword, other
            ))),
        }
    }

    /// Parse `id gen obj ... endobj` at `offset`
    ///
    /// Streams are read with their direct `/Length` when it checks out and
    /// by scanning for `endstream` otherwise. An indirect `/Length` is left
    /// for the caller to settle.
    pub fn parse_indirect_object(&mut self, offset: u64) -> PDFResult<(ObjectId, Object)> {
        self.seek(offset)?;
        let id = match self.next_token()? {
            Some(Token::Integer(n)) => u32::try_from(n).ok(),
            _ => None,
        };
        let gen = match self.next_token()? {
            Some(Token::Integer(n)) => u16::try_from(n).ok(),
            _ => None,
        };
        let (id, gen) = match (id, gen) {
            (Some(id), Some(gen)) => (id, gen),
            _ => {
                return Err(PDFResolverError::malformed(format!(
                    "no object header at offset {}",
                    offset
                )))
            }
        };
        self.expect_keyword("obj")?;
        trace!("Parsing object {} {} at offset {}", id, gen, offset);

        let value = self.parse_value()?;
        let after_value = self.cursor.tell()?;

        let object = match (value, self.next_token()?) {
            (Object::Dictionary(dict), Some(Token::Keyword(k))) if k == "stream" => {
                Object::Stream(self.read_stream(dict)?)
            }
            (value, _) => {
                self.cursor.seek(after_value)?;
                value
            }
        };

        Ok(((id, gen), object))
    }

    fn read_stream(&mut self, dict: Dictionary) -> PDFResult<Stream> {
        // The keyword is followed by CRLF or LF; a lone CR is tolerated.
        match self.cursor.peek_byte()? {
            Some(b'\r') => {
                self.cursor.read_byte()?;
                if self.cursor.peek_byte()? == Some(b'\n') {
                    self.cursor.read_byte()?;
                }
            }
            Some(b'\n') => {
                self.cursor.read_byte()?;
            }
            _ => {}
        }
        let data_offset = self.cursor.tell()?;

        if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
            if let Some(data) = self.read_declared_length(data_offset, length)? {
                return Ok(Stream::new(dict, data, data_offset));
            }
            self.diagnostics.warn(
                WarningKind::StreamLength,
                Some(data_offset),
                format!("declared /Length {} does not reach endstream", length),
            );
        }

        let data = self.scan_to_endstream(data_offset)?;
        Ok(Stream::new(dict, data, data_offset))
    }

    /// Read `length` bytes and confirm `endstream` follows
    fn read_declared_length(&mut self, data_offset: u64, length: i64) -> PDFResult<Option<Vec<u8>>> {
        let length = match u64::try_from(length) {
            Ok(l) if data_offset.saturating_add(l) <= self.cursor.len() => l,
            _ => return Ok(None),
        };
        self.cursor.seek(data_offset)?;
        let data = self.cursor.read_n(length as usize)?;
        self.skip_whitespace()?;
        if self.at_keyword(ENDSTREAM)? {
            self.consume_endstream()?;
            return Ok(Some(data));
        }
        Ok(None)
    }

    fn at_keyword(&mut self, keyword: &[u8]) -> PDFResult<bool> {
        let pos = self.cursor.tell()?;
        let available = self.cursor.len().saturating_sub(pos) as usize;
        if available < keyword.len() {
            return Ok(false);
        }
        let found = self.cursor.read_n(keyword.len())? == keyword;
        self.cursor.seek(pos)?;
        Ok(found)
    }

    fn consume_endstream(&mut self) -> PDFResult<()> {
        self.expect_keyword("endstream")?;
        let pos = self.cursor.tell()?;
        match self.next_token()? {
            Some(Token::Keyword(k)) if k == "endobj" => {}
            _ => self.cursor.seek(pos)?,
        }
        Ok(())
    }

    /// Stream data up to the next `endstream`, minus the EOL before it
    fn scan_to_endstream(&mut self, data_offset: u64) -> PDFResult<Vec<u8>> {
        self.cursor.seek(data_offset)?;
        let end = self
            .cursor
            .find_forward(ENDSTREAM, u64::MAX)?
            .ok_or_else(|| PDFResolverError::malformed("stream without endstream"))?;

        self.cursor.seek(data_offset)?;
        let mut data = self.cursor.read_n((end - data_offset) as usize)?;
        if data.ends_with(b"\r\n") {
            data.truncate(data.len() - 2);
        } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
            data.truncate(data.len() - 1);
        }

        self.cursor.seek(end)?;
        self.consume_endstream()?;
        Ok(data)
    }
}

/// Parse a single direct object from a byte slice
pub fn parse_bytes(data: &[u8]) -> PDFResult<Object> {
    let mut cursor = ByteCursor::from_bytes(data.to_vec());
    let mut diagnostics = Diagnostics::new();
    ObjectParser::new(&mut cursor, &mut diagnostics).parse_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse_object_at(data: &[u8], offset: u64) -> PDFResult<(ObjectId, Object, Diagnostics)> {
        let mut cursor = ByteCursor::from_bytes(data.to_vec());
        let mut diagnostics = Diagnostics::new();
        let (id, object) = ObjectParser::new(&mut cursor, &mut diagnostics).parse_indirect_object(offset)?;
        Ok((id, object, diagnostics))
    }

    #[rstest]
    #[case(b"42", Object::Integer(42))]
    #[case(b"-17", Object::Integer(-17))]
    #[case(b"3.25", Object::Real(3.25))]
    #[case(b"-.5", Object::Real(-0.5))]
    #[case(b"true", Object::Boolean(true))]
    #[case(b"null", Object::Null)]
    #[case(b"/A#20B", Object::Name("A B".into()))]
    #[case(b"<48656C6C6F>", Object::String(b"Hello".to_vec()))]
    #[case(b"<901FA>", Object::String(vec![0x90, 0x1f, 0xa0]))]
    #[case(b"12 0 R", Object::Reference((12, 0)))]
    fn test_parse_simple_values(#[case] input: &[u8], #[case] expected: Object) {
        assert_eq!(parse_bytes(input).unwrap(), expected);
    }

    #[test_log::test]
    fn test_literal_string_escapes() {
        let parsed = parse_bytes(b"(a\\(b\\)c (nested) \\101\\n\\\nx)").unwrap();
        assert_eq!(parsed, Object::String(b"a(b)c (nested) A\nx".to_vec()));
    }

    #[test_log::test]
    fn test_array_with_numbers_and_references() {
        let parsed = parse_bytes(b"[1 2 3 0 R 4 % comment\n /N]").unwrap();
        assert_eq!(
            parsed,
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(2),
                Object::Reference((3, 0)),
                Object::Integer(4),
                Object::Name("N".into()),
            ])
        );
    }

    #[test_log::test]
    fn test_dictionary() {
        let parsed = parse_bytes(b"<</Type/Catalog/Pages 2 0 R/Gone null/Kids[]>>").unwrap();
        let dict = parsed.as_dict().unwrap();
        assert!(dict.is_type("Catalog"));
        assert_eq!(dict.get_reference("Pages"), Some((2, 0)));
        assert_eq!(dict.get_array("Kids"), Some(&[][..]));
        assert!(!dict.contains_key("Gone"));
    }

    #[test_log::test]
    fn test_nesting_limit() {
        let mut input = vec![b'['; MAX_NESTING + 1];
        input.extend(vec![b']'; MAX_NESTING + 1]);
        assert!(matches!(
            parse_bytes(&input),
            Err(PDFResolverError::LimitExceeded(_))
        ));
    }

    #[test_log::test]
    fn test_indirect_object() {
        let data = b"junk\n7 0 obj\n<< /Type /Page >>\nendobj\n";
        let (id, object, _) = parse_object_at(data, 5).unwrap();
        assert_eq!(id, (7, 0));
        assert!(object.as_dict().unwrap().is_type("Page"));
    }

    #[test_log::test]
    fn test_stream_with_direct_length() {
        let data = b"4 0 obj\n<< /Length 11 >>\nstream\r\nHello World\nendstream\nendobj\n";
        let (_, object, diagnostics) = parse_object_at(data, 0).unwrap();
        let stream = object.as_stream().unwrap();
        assert_eq!(stream.data(), b"Hello World");
        assert_eq!(stream.data_offset(), 33);
        assert!(diagnostics.warnings().is_empty());
    }

    #[test_log::test]
    fn test_stream_with_wrong_length_is_scanned() {
        let data = b"4 0 obj\n<< /Length 3 >>\nstream\nHello World\nendstream\nendobj\n";
        let (_, object, diagnostics) = parse_object_at(data, 0).unwrap();
        assert_eq!(object.as_stream().unwrap().data(), b"Hello World");
        assert!(diagnostics.has(WarningKind::StreamLength));
    }

    #[test_log::test]
    fn test_stream_without_endstream() {
        let data = b"4 0 obj\n<< /Length 99 >>\nstream\nHello";
        assert!(matches!(
            parse_object_at(data, 0),
            Err(PDFResolverError::MalformedPDF(_))
        ));
    }

    #[test_log::test]
    fn test_missing_header() {
        let data = b"<< /Type /Page >>";
        assert!(parse_object_at(data, 0).is_err());
    }
}
