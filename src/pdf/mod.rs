//! PDF object model, syntax parsing and cross-reference loading

mod cursor;
mod dict;
mod filter;
mod loader;
mod object;
mod objstm;
mod parser;
mod stream;
mod xref;

pub use cursor::ByteCursor;
pub use dict::Dictionary;
pub use filter::Filter;
pub use loader::{LoadedXref, XrefLoader};
pub use object::{Object, ObjectId};
pub use objstm::{ObjectStreamExpander, ObjectStreamMember};
pub use parser::{parse_bytes, ObjectParser};
pub use stream::Stream;
pub use xref::{EntryKind, ObjectTable, XrefEntry, XrefSection, XrefSectionReader};
