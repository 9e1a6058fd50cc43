//! Small PDF writer for integration tests

#![allow(dead_code)]

use std::io::Write;

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Block};
use flate2::{write::ZlibEncoder, Compression};

use pdf_resolver::handlers::EncryptionDict;
use pdf_resolver::security::{
    compute_file_key, compute_object_key, compute_owner_hash, compute_user_hash, decrypt_bytes,
};
use pdf_resolver::{CryptMethod, Dictionary, Object, SecurityState};

pub const FILE_ID: [u8; 16] = [
    0x6b, 0x0f, 0x3a, 0x91, 0x22, 0xd4, 0x58, 0xe0, 0x1c, 0x77, 0xa2, 0x05, 0xbe, 0x49, 0x13, 0xf6,
];

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Row of a cross-reference stream
#[derive(Debug, Clone, Copy)]
pub enum Row {
    Free,
    Normal(u64, u16),
    Compressed(u32, u32),
}

/// Appends objects and cross-reference sections to a growing file
pub struct PdfBuilder {
    data: Vec<u8>,
    /// Objects written since the last section: (id, gen, offset)
    pending: Vec<(u32, u16, u64)>,
    /// Object stream members since the last section: (id, stream, index)
    compressed: Vec<(u32, u32, u32)>,
    /// Ids a classical table lists as free although they exist elsewhere
    free: Vec<u32>,
    sections: usize,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let mut data = format!("%PDF-{}\n", version).into_bytes();
        data.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            data,
            pending: Vec::new(),
            compressed: Vec::new(),
            free: Vec::new(),
            sections: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn object(&mut self, id: u32, gen: u16, body: &str) -> u64 {
        self.object_bytes(id, gen, body.as_bytes())
    }

    pub fn object_bytes(&mut self, id: u32, gen: u16, body: &[u8]) -> u64 {
        let offset = self.len();
        self.data.extend_from_slice(format!("{} {} obj\n", id, gen).as_bytes());
        self.data.extend_from_slice(body);
        self.data.extend_from_slice(b"\nendobj\n");
        self.pending.push((id, gen, offset));
        offset
    }

    /// Stream object with a direct `/Length`
    pub fn stream(&mut self, id: u32, gen: u16, dict: &str, data: &[u8]) -> u64 {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(id, gen, &body)
    }

    /// Pack `members` into a Flate-compressed object stream
    ///
    /// The container is encrypted with `encryptor` when given.
    pub fn object_stream(
        &mut self,
        id: u32,
        members: &[(u32, &str)],
        encryptor: Option<&Encryptor>,
    ) -> u64 {
        let mut header = String::new();
        let mut body = String::new();
        for (index, (member_id, value)) in members.iter().enumerate() {
            header.push_str(&format!("{} {} ", member_id, body.len()));
            body.push_str(value);
            body.push('\n');
            self.compressed.push((*member_id, id, index as u32));
        }
        let first = header.len();
        let mut plain = header.into_bytes();
        plain.extend_from_slice(body.as_bytes());

        let mut data = deflate(&plain);
        if let Some(encryptor) = encryptor {
            data = encryptor.encrypt_stream(id, 0, &data);
        }
        let dict = format!(
            "/Type /ObjStm /N {} /First {} /Filter /FlateDecode",
            members.len(),
            first
        );
        self.stream(id, 0, &dict, &data)
    }

    /// Classical table for the objects written since the last section,
    /// followed by trailer and `startxref`
    pub fn xref_table(&mut self, trailer: &str) -> u64 {
        let mut lines: Vec<(u32, String)> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(id, gen, off)| (id, format!("{:010} {:05} n\r\n", off, gen)))
            .collect();
        lines.extend(
            std::mem::take(&mut self.free)
                .into_iter()
                .map(|id| (id, "0000000000 00001 f\r\n".to_string())),
        );
        lines.sort_by_key(|line| line.0);

        let offset = self.len();
        let mut out = String::from("xref\n");
        if self.sections == 0 {
            out.push_str("0 1\n0000000000 65535 f\r\n");
        }
        for run in runs(&lines, |line| line.0) {
            out.push_str(&format!("{} {}\n", run[0].0, run.len()));
            for (_, line) in run {
                out.push_str(line);
            }
        }
        out.push_str(&format!("trailer\n<< {} >>\nstartxref\n{}\n%%EOF\n", trailer, offset));
        self.data.extend_from_slice(out.as_bytes());
        self.sections += 1;
        offset
    }

    /// Cross-reference stream object `id` covering every object written
    /// since the last section, itself included
    pub fn xref_stream(&mut self, id: u32, trailer: &str) -> u64 {
        let offset = self.len();
        let mut rows: Vec<(u32, Row)> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(id, gen, off)| (id, Row::Normal(off, gen)))
            .collect();
        rows.extend(
            std::mem::take(&mut self.compressed)
                .into_iter()
                .map(|(id, stream, index)| (id, Row::Compressed(stream, index))),
        );
        rows.push((id, Row::Normal(offset, 0)));
        if self.sections == 0 {
            rows.push((0, Row::Free));
        }
        self.write_xref_stream(id, &rows, trailer);
        self.data.extend_from_slice(format!("startxref\n{}\n%%EOF\n", offset).as_bytes());
        self.sections += 1;
        offset
    }

    /// Hybrid section: a classical table for the plain objects, where
    /// object stream members show up as free, plus an `/XRefStm` stream
    /// `id` that places those members in their containers
    pub fn hybrid_xref(&mut self, id: u32, trailer: &str) -> u64 {
        let members = std::mem::take(&mut self.compressed);
        let size = members.iter().map(|m| m.0).max().unwrap_or(0) + 1;
        let rows: Vec<(u32, Row)> = members
            .iter()
            .map(|&(member, stream, index)| (member, Row::Compressed(stream, index)))
            .collect();
        let stm = self.len();
        self.write_xref_stream(id, &rows, &format!("/Size {}", size));

        self.free.extend(members.iter().map(|m| m.0));
        self.xref_table(&format!("{} /XRefStm {}", trailer, stm))
    }

    fn write_xref_stream(&mut self, id: u32, rows: &[(u32, Row)], trailer: &str) {
        let mut rows = rows.to_vec();
        rows.sort_by_key(|row| row.0);

        let mut index = Vec::new();
        let mut data = Vec::new();
        for run in runs(&rows, |row| row.0) {
            index.push(format!("{} {}", run[0].0, run.len()));
            for (_, row) in run {
                let (kind, field2, field3): (u8, u32, u16) = match *row {
                    Row::Free => (0, 0, 65535),
                    Row::Normal(off, gen) => (1, off as u32, gen),
                    Row::Compressed(stream, idx) => (2, stream, idx as u16),
                };
                data.push(kind);
                data.extend_from_slice(&field2.to_be_bytes());
                data.extend_from_slice(&field3.to_be_bytes());
            }
        }

        let dict = format!(
            "/Type /XRef /W [1 4 2] /Index [{}] /Filter /FlateDecode {}",
            index.join(" "),
            trailer
        );
        let compressed = deflate(&data);
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict, compressed.len()).into_bytes();
        body.extend_from_slice(&compressed);
        body.extend_from_slice(b"\nendstream");

        self.data.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        self.data.extend_from_slice(&body);
        self.data.extend_from_slice(b"\nendobj\n");
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Splits id-sorted items into runs of consecutive ids
fn runs<T>(items: &[T], id: impl Fn(&T) -> u32) -> Vec<&[T]> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=items.len() {
        if i == items.len() || id(&items[i]) != id(&items[i - 1]) + 1 {
            if start < i {
                out.push(&items[start..i]);
            }
            start = i;
        }
    }
    out
}

/// Produces Standard handler values and encrypts payloads the way a
/// writer would
pub struct Encryptor {
    pub version: u8,
    pub revision: u8,
    pub key_length: usize,
    pub owner_hash: [u8; 32],
    pub user_hash: [u8; 32],
    pub state: SecurityState,
    aes: bool,
}

impl Encryptor {
    pub fn rc4(revision: u8, key_length: usize, user: &[u8], owner: &[u8]) -> Self {
        let version = if key_length == 5 { 1 } else { 2 };
        Self::build(version, revision, key_length, user, owner, false)
    }

    pub fn aes(user: &[u8], owner: &[u8]) -> Self {
        Self::build(4, 4, 16, user, owner, true)
    }

    fn build(version: u8, revision: u8, key_length: usize, user: &[u8], owner: &[u8], aes: bool) -> Self {
        let owner_hash = compute_owner_hash(owner, user, revision, key_length).unwrap();

        let mut dict = Dictionary::new();
        dict.set("Filter", Object::Name("Standard".into()));
        dict.set("V", Object::Integer(version as i64));
        dict.set("R", Object::Integer(revision as i64));
        dict.set("Length", Object::Integer(key_length as i64 * 8));
        dict.set("O", Object::String(owner_hash.to_vec()));
        dict.set("U", Object::String(vec![0; 32]));
        dict.set("P", Object::Integer(-4));
        let encryption_dict = EncryptionDict::from_dict(&dict).unwrap();

        let file_key = compute_file_key(&encryption_dict, &FILE_ID, user);
        let user_hash = compute_user_hash(&file_key, revision, &FILE_ID).unwrap();
        let method = if aes { CryptMethod::AESV2 } else { CryptMethod::RC4 };
        let state = SecurityState::new(file_key.to_vec(), method, method, revision, true);

        Self {
            version,
            revision,
            key_length,
            owner_hash,
            user_hash,
            state,
            aes,
        }
    }

    /// Body of the `/Encrypt` dictionary
    pub fn dict(&self) -> String {
        let mut dict = format!(
            "/Filter /Standard /V {} /R {} /Length {} /O <{}> /U <{}> /P -4",
            self.version,
            self.revision,
            self.key_length * 8,
            hex::encode(self.owner_hash),
            hex::encode(self.user_hash)
        );
        if self.aes {
            dict.push_str(" /CF << /StdCF << /CFM /AESV2 /Length 16 /AuthEvent /DocOpen >> >> /StmF /StdCF /StrF /StdCF");
        }
        dict
    }

    /// `/ID` entry for the trailer
    pub fn id_entry() -> String {
        format!("/ID [<{}> <{}>]", hex::encode(FILE_ID), hex::encode(FILE_ID))
    }

    pub fn encrypt_string(&self, id: u32, gen: u16, plain: &[u8]) -> String {
        format!("<{}>", hex::encode(self.encrypt_stream(id, gen, plain)))
    }

    pub fn encrypt_stream(&self, id: u32, gen: u16, plain: &[u8]) -> Vec<u8> {
        if !self.aes {
            // RC4 is its own inverse.
            return decrypt_bytes(&self.state, id, gen, false, plain).unwrap();
        }

        let key = compute_object_key(self.state.file_key(), id, gen, CryptMethod::AESV2);
        let cipher = Aes128::new_from_slice(&key).unwrap();
        let iv = [id as u8; 16];

        let pad = 16 - plain.len() % 16;
        let mut padded = plain.to_vec();
        padded.extend(std::iter::repeat(pad as u8).take(pad));

        let mut out = iv.to_vec();
        let mut prev = Block::clone_from_slice(&iv);
        for chunk in padded.chunks(16) {
            let mut block = Block::clone_from_slice(chunk);
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            cipher.encrypt_block(&mut block);
            out.extend_from_slice(&block);
            prev = block;
        }
        out
    }
}
