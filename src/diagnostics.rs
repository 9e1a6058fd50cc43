//! Per-document warning sink
//!
//! Recoverable problems found while loading a document are logged through
//! `log` and also kept here so callers can inspect them without a logger.

use log::warn;
use std::fmt;

/// What kind of recoverable problem was seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// `%PDF-` header present but version unreadable
    BadHeaderVersion,
    /// An xref offset was reached a second time
    XrefCycle,
    /// An older `/Prev` or `/XRefStm` section could not be read
    BrokenXrefLink,
    /// An xref entry lies beyond the table size
    EntryOutOfRange,
    /// Stream `/Length` disagreed with the data found
    StreamLength,
    /// Section limit reached before the chain ended
    ChainTruncated,
    /// An object stream member could not be parsed
    BrokenObjectStreamMember,
}

/// A single recoverable problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub offset: Option<u64>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{:?} at {}: {}", self.kind, offset, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// Collects warnings for one document
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a warning
    pub fn warn(&mut self, kind: WarningKind, offset: Option<u64>, message: impl Into<String>) {
        let warning = Warning {
            kind,
            offset,
            message: message.into(),
        };
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}
