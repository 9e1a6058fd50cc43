//! Security handlers for PDF decryption

mod standard;

pub use standard::{EncryptionDict, StandardSecurityHandler};

use log::{debug, error};

use crate::error::{PDFResolverError, PDFResult};
use crate::pdf::Dictionary;
use crate::security::SecurityState;
use crate::{EncryptionAlgorithm, Permissions};

/// Security handler selected by the `/Filter` of an encryption dictionary
#[derive(Debug, Clone)]
pub enum SecurityHandler {
    /// Standard password-based security handler
    Standard(StandardSecurityHandler),
}

impl SecurityHandler {
    /// Set up the handler for a document
    ///
    /// Failures are logged with the handler name and version so unsupported
    /// files can be diagnosed.
    pub fn from_encrypt_dict(dict: &Dictionary, file_id: &[u8]) -> PDFResult<Self> {
        let handler = match dict.get_name("Filter") {
            Some("Standard") => StandardSecurityHandler::new(dict, file_id).map(SecurityHandler::Standard),
            Some(other) => Err(PDFResolverError::UnsupportedFilter(other.to_string())),
            None => Err(PDFResolverError::malformed("encryption dictionary without /Filter")),
        };
        if let Err(e) = &handler {
            error!(
                "Cannot set up security handler /{} V={} R={}: {}",
                dict.get_name("Filter").unwrap_or("?"),
                dict.get_integer("V").unwrap_or(0),
                dict.get_integer("R").unwrap_or(0),
                e
            );
        }
        handler
    }

    /// Authenticate with password
    pub fn authenticate_password(&self, password: &[u8]) -> PDFResult<SecurityState> {
        debug!("Attempting password authentication");
        match self {
            SecurityHandler::Standard(handler) => handler.authenticate_password(password),
        }
    }

    pub fn algorithm(&self) -> EncryptionAlgorithm {
        match self {
            SecurityHandler::Standard(handler) => handler.algorithm(),
        }
    }

    pub fn permissions(&self) -> Permissions {
        match self {
            SecurityHandler::Standard(handler) => handler.permissions(),
        }
    }

    pub fn revision(&self) -> u8 {
        match self {
            SecurityHandler::Standard(handler) => handler.revision(),
        }
    }
}
