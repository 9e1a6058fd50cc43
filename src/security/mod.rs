//! Standard security handler cryptography
//!
//! Key derivation and password checks for revisions 2 to 4, and the
//! per-object decryption applied to strings and stream bodies.

mod authentication;
mod key_derivation;
mod object_encryption;

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

pub use key_derivation::{
    compute_file_key, compute_object_key, compute_owner_hash, compute_owner_key,
    compute_user_hash, pad_password, PADDING,
};
pub use object_encryption::{decrypt_bytes, decrypt_object};

/// Cipher selected by a crypt filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// Identity: data is stored in the clear
    None,
    RC4,
    AESV2,
}

/// Key material and cipher choices produced by a successful
/// authentication
///
/// The file key is wiped when the state is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecurityState {
    file_key: Vec<u8>,
    #[zeroize(skip)]
    pub stream_method: CryptMethod,
    #[zeroize(skip)]
    pub string_method: CryptMethod,
    /// Named crypt filters a stream may select with a `/Crypt` filter
    #[zeroize(skip)]
    pub named_filters: Vec<(String, CryptMethod)>,
    #[zeroize(skip)]
    pub revision: u8,
    #[zeroize(skip)]
    pub encrypt_metadata: bool,
}

impl SecurityState {
    pub fn new(
        file_key: Vec<u8>,
        stream_method: CryptMethod,
        string_method: CryptMethod,
        revision: u8,
        encrypt_metadata: bool,
    ) -> Self {
        Self {
            file_key,
            stream_method,
            string_method,
            named_filters: Vec::new(),
            revision,
            encrypt_metadata,
        }
    }

    pub fn with_named_filters(mut self, filters: Vec<(String, CryptMethod)>) -> Self {
        self.named_filters = filters;
        self
    }

    pub fn file_key(&self) -> &[u8] {
        &self.file_key
    }

    /// Method of a named crypt filter; `Identity` is always known
    pub fn named_method(&self, name: &str) -> Option<CryptMethod> {
        if name == "Identity" {
            return Some(CryptMethod::None);
        }
        self.named_filters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, method)| *method)
    }

    /// Metadata streams stay in the clear when R4 says so
    pub fn skips_metadata(&self) -> bool {
        self.revision >= 4 && !self.encrypt_metadata
    }
}

impl fmt::Debug for SecurityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityState")
            .field("file_key", &"<redacted>")
            .field("key_length", &self.file_key.len())
            .field("stream_method", &self.stream_method)
            .field("string_method", &self.string_method)
            .field("revision", &self.revision)
            .field("encrypt_metadata", &self.encrypt_metadata)
            .finish()
    }
}
