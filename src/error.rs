//! Error types for the PDF resolver

use std::io;
use thiserror::Error;

/// Main error type for resolver operations
#[derive(Error, Debug)]
pub enum PDFResolverError {
    /// The offered password matched neither the user nor the owner check
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The document is encrypted and no working password has been supplied
    #[error("Password required")]
    PasswordRequired,

    /// Unsupported security handler named by `/Filter`
    #[error("Unsupported encryption filter: {0}")]
    UnsupportedFilter(String),

    /// Unsupported `/V` and `/R` combination
    #[error("Unsupported encryption version V={version} R={revision}")]
    UnsupportedRevision {
        version: i64,
        revision: i64,
    },

    /// Unsupported crypt filter method (`/CFM`)
    #[error("Unsupported crypt filter method: {0}")]
    UnsupportedCryptMethod(String),

    /// Key length not usable by the selected cipher
    #[error("Unsupported key length: {0} bytes")]
    UnsupportedKeyLength(usize),

    /// Stream filter the resolver does not decode
    #[error("Unsupported stream filter: {0}")]
    UnsupportedStreamFilter(String),

    /// Invalid key length handed to a cipher
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),

    /// Invalid data length
    #[error("Invalid data length for {operation}")]
    InvalidDataLength {
        operation: String,
    },

    /// AES padding byte outside `1..=16` or longer than the plaintext
    #[error("Invalid AES padding length: {0}")]
    InvalidPadding(u8),

    /// Malformed PDF structure
    #[error("Malformed PDF structure: {0}")]
    MalformedPDF(String),

    /// Cross reference table error
    #[error("Cross reference table error: {0}")]
    XRefError(String),

    /// Object not present in the object table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Invalid object type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        expected: &'static str,
        found: &'static str,
    },

    /// Missing required dictionary entry
    #[error("Missing required dictionary entry: {0}")]
    MissingDictionaryEntry(String),

    /// Invalid dictionary value
    #[error("Invalid dictionary value for key {key}: {message}")]
    InvalidDictionaryValue {
        key: String,
        message: String,
    },

    /// Decompression error
    #[error("Decompression error: {0}")]
    DecompressionError(String),

    /// A configured resource limit was exceeded
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Result type for resolver operations
pub type PDFResult<T> = Result<T, PDFResolverError>;

/// Coarse classification of errors used by callers to decide what to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file is structurally broken
    Format,
    /// The password was missing or wrong
    Auth,
    /// The file uses something this resolver does not implement
    Unsupported,
    /// The underlying byte source failed
    Io,
}

impl PDFResolverError {
    /// Create a new malformed PDF error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPDF(msg.into())
    }

    /// Create a new cross reference error
    pub fn xref(msg: impl Into<String>) -> Self {
        Self::XRefError(msg.into())
    }

    /// Create a new invalid data length error
    pub fn invalid_length(operation: impl Into<String>) -> Self {
        Self::InvalidDataLength {
            operation: operation.into(),
        }
    }

    /// Create a new invalid dictionary value error
    pub fn invalid_dict_value(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidDictionaryValue {
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a new missing entry error
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingDictionaryEntry(key.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailed | Self::PasswordRequired => ErrorKind::Auth,
            Self::UnsupportedFilter(_)
            | Self::UnsupportedRevision { .. }
            | Self::UnsupportedCryptMethod(_)
            | Self::UnsupportedKeyLength(_)
            | Self::UnsupportedStreamFilter(_) => ErrorKind::Unsupported,
            Self::IoError(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }

    /// Check if error is authentication related
    pub fn is_auth_error(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// Check if error means the file itself is malformed
    pub fn is_format_error(&self) -> bool {
        self.kind() == ErrorKind::Format
    }

    /// Check if error is an unsupported-feature report
    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }

    /// Message suitable for showing to an end user
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PasswordRequired => "password required",
            Self::AuthenticationFailed => "incorrect password",
            _ => match self.kind() {
                ErrorKind::Unsupported => "cannot open — unsupported encryption",
                ErrorKind::Io => "cannot open — read error",
                _ => "cannot open — corrupt cross-reference table",
            },
        }
    }
}
