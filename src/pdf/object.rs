//! PDF object types

use std::fmt;

use super::{Dictionary, Stream};
use crate::error::{PDFResolverError, PDFResult};

/// Object number and generation
pub type ObjectId = (u32, u16);

/// PDF object value
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real value
    Real(f64),
    /// String value (literal or hexadecimal), raw bytes
    String(Vec<u8>),
    /// Name object, without the leading slash
    Name(String),
    /// Array object
    Array(Vec<Object>),
    /// Dictionary object
    Dictionary(Dictionary),
    /// Stream object
    Stream(Stream),
    /// Indirect reference
    Reference(ObjectId),
}

impl Object {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Boolean(_) => "boolean",
            Object::Integer(_) => "integer",
            Object::Real(_) => "real",
            Object::String(_) => "string",
            Object::Name(_) => "name",
            Object::Array(_) => "array",
            Object::Dictionary(_) => "dictionary",
            Object::Stream(_) => "stream",
            Object::Reference(_) => "reference",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Object]> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionary of a dictionary or of a stream
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(s.dict()),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Dictionary of this object, or a type error
    pub fn expect_dict(&self) -> PDFResult<&Dictionary> {
        self.as_dict().ok_or(PDFResolverError::InvalidObjectType {
            expected: "dictionary",
            found: self.type_name(),
        })
    }

    /// Stream payload, or a type error
    pub fn into_stream(self) -> PDFResult<Stream> {
        match self {
            Object::Stream(s) => Ok(s),
            other => Err(PDFResolverError::InvalidObjectType {
                expected: "stream",
                found: other.type_name(),
            }),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Null => write!(f, "null"),
            Object::Boolean(b) => write!(f, "{}", b),
            Object::Integer(i) => write!(f, "{}", i),
            Object::Real(r) => write!(f, "{}", r),
            Object::String(s) => write!(f, "({})", String::from_utf8_lossy(s)),
            Object::Name(n) => write!(f, "/{}", n),
            Object::Array(a) => {
                write!(f, "[")?;
                for (i, item) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Object::Dictionary(d) => write!(f, "{}", d),
            Object::Stream(s) => write!(f, "{} stream[{} bytes]", s.dict(), s.data().len()),
            Object::Reference((id, gen)) => write!(f, "{} {} R", id, gen),
        }
    }
}
