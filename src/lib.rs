//! PDF logical-object resolver for Rust
//!
//! Rebuilds the object table of a PDF file from its cross-reference
//! sections, including incremental updates, cross-reference streams and
//! compressed object streams, and decrypts documents protected by the
//! password-based Standard Security Handler (revisions 2 to 4, RC4 and
//! AES-128).
//!
//! ```no_run
//! use pdf_resolver::Resolver;
//!
//! # fn main() -> pdf_resolver::PDFResult<()> {
//! let mut resolver = Resolver::open_path("document.pdf")?;
//! if !resolver.is_authenticated() {
//!     resolver.authenticate(b"secret")?;
//! }
//! let catalog = resolver.root()?;
//! println!("{}", catalog);
//! # Ok(())
//! # }
//! ```

use std::fmt;

mod config;
mod crypto;
mod diagnostics;
mod error;
pub mod handlers;
pub mod pdf;
mod resolver;
pub mod security;

pub use config::ResolverConfig;
pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use error::{ErrorKind, PDFResolverError, PDFResult};
pub use pdf::{Dictionary, EntryKind, Object, ObjectId, Stream, XrefEntry};
pub use resolver::Resolver;
pub use security::{CryptMethod, SecurityState};

/// Encryption algorithms the Standard handler can decrypt
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    /// RC4 encryption with 40-bit key (PDF 1.1)
    RC4_40,
    /// RC4 encryption with a longer key, up to 128 bits (PDF 1.4)
    RC4_128,
    /// AES encryption with 128-bit key (PDF 1.6)
    AES_128,
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionAlgorithm::RC4_40 => write!(f, "RC4-40"),
            EncryptionAlgorithm::RC4_128 => write!(f, "RC4-128"),
            EncryptionAlgorithm::AES_128 => write!(f, "AES-128"),
        }
    }
}

/// PDF permissions flags from the `/P` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(u32);

impl Permissions {
    /// No permissions
    pub const NONE: u32 = 0;
    /// Print the document
    pub const PRINT: u32 = 1 << 2;
    /// Modify the document
    pub const MODIFY: u32 = 1 << 3;
    /// Copy text and graphics
    pub const COPY: u32 = 1 << 4;
    /// Add or modify annotations
    pub const ANNOTATE: u32 = 1 << 5;
    /// Fill form fields
    pub const FILL_FORMS: u32 = 1 << 8;
    /// Extract text and graphics for accessibility
    pub const EXTRACT: u32 = 1 << 9;
    /// Assemble the document
    pub const ASSEMBLE: u32 = 1 << 10;
    /// Print in high quality
    pub const PRINT_HIGH: u32 = 1 << 11;
    /// All permissions
    pub const ALL: u32 = 0xF_FFFF;

    /// Create new permissions from raw bits
    pub fn new(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    /// Get raw permission bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Check if specific permission is granted
    pub fn has_permission(&self, permission: u32) -> bool {
        (self.0 & permission) == permission
    }
}

/// Summary of how a document is encrypted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionInfo {
    /// The encryption algorithm used
    pub algorithm: EncryptionAlgorithm,
    /// Standard handler revision (`/R`)
    pub revision: u8,
    pub permissions: Permissions,
    /// Whether a password has been accepted
    pub authenticated: bool,
}
