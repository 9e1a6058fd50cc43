//! Key derivation for the standard security handler, revisions 2 to 4

use zeroize::Zeroizing;

use super::CryptMethod;
use crate::crypto::rc4_apply;
use crate::error::PDFResult;
use crate::handlers::EncryptionDict;

/// Password padding string from ISO 32000-1, 7.6.3.3
pub const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41,
    0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80,
    0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Truncate or pad a password to exactly 32 bytes
pub fn pad_password(password: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut padded = Zeroizing::new([0u8; 32]);
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Re-hash the first `len` bytes of `digest` fifty times
fn md5_rounds(mut digest: [u8; 16], len: usize) -> [u8; 16] {
    for _ in 0..50 {
        digest = md5::compute(&digest[..len]).0;
    }
    digest
}

/// RC4 with every key byte XORed with `round`
fn rc4_xor_round(key: &[u8], round: u8, data: &mut [u8]) -> PDFResult<()> {
    let round_key: Zeroizing<Vec<u8>> = Zeroizing::new(key.iter().map(|b| b ^ round).collect());
    rc4_apply(&round_key, data)
}

/// Algorithm 2: the file encryption key for a candidate user password
pub fn compute_file_key(
    dict: &EncryptionDict,
    file_id: &[u8],
    password: &[u8],
) -> Zeroizing<Vec<u8>> {
    let n = dict.key_length;
    let mut context = md5::Context::new();
    context.consume(&pad_password(password)[..]);
    context.consume(&dict.owner_hash[..32]);
    context.consume(dict.permissions.to_le_bytes());
    context.consume(file_id);
    if dict.revision >= 4 && !dict.encrypt_metadata {
        context.consume([0xFFu8; 4]);
    }

    let mut digest = context.finalize().0;
    if dict.revision >= 3 {
        digest = md5_rounds(digest, n);
    }
    Zeroizing::new(digest[..n].to_vec())
}

/// RC4 key protecting the `/O` entry, derived from an owner password
pub fn compute_owner_key(owner_password: &[u8], revision: u8, key_length: usize) -> Zeroizing<Vec<u8>> {
    let mut digest = md5::compute(&pad_password(owner_password)[..]).0;
    if revision >= 3 {
        digest = md5_rounds(digest, 16);
    }
    Zeroizing::new(digest[..key_length].to_vec())
}

/// Algorithm 3: the `/O` value for a pair of passwords
///
/// An empty owner password falls back to the user password.
pub fn compute_owner_hash(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u8,
    key_length: usize,
) -> PDFResult<[u8; 32]> {
    let source = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let key = compute_owner_key(source, revision, key_length);

    let mut hash = *pad_password(user_password);
    rc4_apply(&key, &mut hash)?;
    if revision >= 3 {
        for round in 1..=19u8 {
            rc4_xor_round(&key, round, &mut hash)?;
        }
    }
    Ok(hash)
}

/// Algorithms 4 and 5: the `/U` value for a file key
///
/// For revision 3 and later only the first 16 bytes are significant; the
/// rest is zero filled.
pub fn compute_user_hash(file_key: &[u8], revision: u8, file_id: &[u8]) -> PDFResult<[u8; 32]> {
    if revision == 2 {
        let mut hash = PADDING;
        rc4_apply(file_key, &mut hash)?;
        return Ok(hash);
    }

    let mut context = md5::Context::new();
    context.consume(PADDING);
    context.consume(file_id);
    let mut digest = context.finalize().0;

    rc4_apply(file_key, &mut digest)?;
    for round in 1..=19u8 {
        rc4_xor_round(file_key, round, &mut digest)?;
    }

    let mut hash = [0u8; 32];
    hash[..16].copy_from_slice(&digest);
    Ok(hash)
}

/// Algorithm 1: the key for one object's strings and stream
pub fn compute_object_key(
    file_key: &[u8],
    id: u32,
    generation: u16,
    method: CryptMethod,
) -> Zeroizing<Vec<u8>> {
    let mut context = md5::Context::new();
    context.consume(file_key);
    context.consume(&id.to_le_bytes()[..3]);
    context.consume(generation.to_le_bytes());
    if method == CryptMethod::AESV2 {
        context.consume(b"sAlT");
    }

    let digest = Zeroizing::new(context.finalize().0);
    let len = (file_key.len() + 5).min(16);
    Zeroizing::new(digest[..len].to_vec())
}
