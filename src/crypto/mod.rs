//! Ciphers used by the Standard Security Handler

mod aes;
mod rc4;

pub use self::aes::AESProvider;
pub use self::rc4::{rc4_apply, RC4Provider};

#[cfg(test)]
pub(crate) use self::aes::{encrypt_blocks, encrypt_padded};

use crate::error::PDFResult;
use crate::security::CryptMethod;

/// Trait for decrypting one string or stream payload under an object key
pub trait CryptoProvider: Send + Sync {
    fn decrypt(&self, data: &[u8], key: &[u8]) -> PDFResult<Vec<u8>>;
}

static RC4: RC4Provider = RC4Provider;
static AES: AESProvider = AESProvider;

/// Provider for a crypt method, `None` when the method leaves data untouched
pub fn provider_for(method: CryptMethod) -> Option<&'static dyn CryptoProvider> {
    match method {
        CryptMethod::None => None,
        CryptMethod::RC4 => Some(&RC4),
        CryptMethod::AESV2 => Some(&AES),
    }
}
