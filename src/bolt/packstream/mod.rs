//! PackStream serialization format.
//!
//! PackStream is the binary format Bolt messages are written in. Only the
//! core value types are modelled here; graph and temporal structures come
//! through as raw [`PackStreamStructure`] values.
//!
//! # Markers
//!
//! | Range | Type |
//! |-------|------|
//! | `0x00..=0x7F`, `0xF0..=0xFF` | tiny integer |
//! | `0x80..=0x8F` | tiny string |
//! | `0x90..=0x9F` | tiny list |
//! | `0xA0..=0xAF` | tiny map |
//! | `0xB0..=0xBF` | structure |
//! | `0xC0..=0xDA` | sized types |

pub mod decoder;
pub mod encoder;

pub use decoder::decode;
pub use encoder::encode;

use std::collections::HashMap;
use std::fmt;

/// String-keyed map used for message metadata and parameters.
pub type BoltMap = HashMap<String, PackStreamValue>;

pub(crate) const NULL: u8 = 0xC0;
pub(crate) const FLOAT_64: u8 = 0xC1;
pub(crate) const FALSE: u8 = 0xC2;
pub(crate) const TRUE: u8 = 0xC3;
pub(crate) const INT_8: u8 = 0xC8;
pub(crate) const INT_16: u8 = 0xC9;
pub(crate) const INT_32: u8 = 0xCA;
pub(crate) const INT_64: u8 = 0xCB;
pub(crate) const BYTES_8: u8 = 0xCC;
pub(crate) const BYTES_16: u8 = 0xCD;
pub(crate) const BYTES_32: u8 = 0xCE;
pub(crate) const STRING_8: u8 = 0xD0;
pub(crate) const STRING_16: u8 = 0xD1;
pub(crate) const STRING_32: u8 = 0xD2;
pub(crate) const LIST_8: u8 = 0xD4;
pub(crate) const LIST_16: u8 = 0xD5;
pub(crate) const LIST_32: u8 = 0xD6;
pub(crate) const MAP_8: u8 = 0xD8;
pub(crate) const MAP_16: u8 = 0xD9;
pub(crate) const MAP_32: u8 = 0xDA;
pub(crate) const TINY_STRING: u8 = 0x80;
pub(crate) const TINY_LIST: u8 = 0x90;
pub(crate) const TINY_MAP: u8 = 0xA0;
pub(crate) const TINY_STRUCT: u8 = 0xB0;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Input ended in the middle of a value
    UnexpectedEof,
    /// Marker byte that no type uses
    UnknownMarker(u8),
    /// String payload is not UTF-8
    InvalidUtf8,
    /// Map key that is not a string
    InvalidMapKey,
    /// Collection or payload too large for a 32-bit size
    ValueTooLarge(usize),
    /// Structure with more than 15 fields
    StructureTooLarge(usize),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "unexpected end of data"),
            PackStreamError::UnknownMarker(m) => write!(f, "unknown marker 0x{:02X}", m),
            PackStreamError::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            PackStreamError::InvalidMapKey => write!(f, "map keys must be strings"),
            PackStreamError::ValueTooLarge(n) => write!(f, "value of size {} cannot be encoded", n),
            PackStreamError::StructureTooLarge(n) => {
                write!(f, "structure has {} fields (max 15)", n)
            }
        }
    }
}

impl std::error::Error for PackStreamError {}

/// A PackStream value.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamValue {
    /// Null
    Null,
    /// Boolean
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit float
    Float(f64),
    /// Byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// List
    List(Vec<PackStreamValue>),
    /// String-keyed map
    Map(BoltMap),
    /// Tagged structure
    Structure(PackStreamStructure),
}

/// A tagged structure (messages, nodes, temporal values).
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamStructure {
    /// Signature byte
    pub tag: u8,
    /// Fields in order
    pub fields: Vec<PackStreamValue>,
}

impl PackStreamStructure {
    /// Create a structure.
    pub fn new(tag: u8, fields: Vec<PackStreamValue>) -> Self {
        Self { tag, fields }
    }
}

impl PackStreamValue {
    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, PackStreamValue::Null)
    }

    /// Boolean content.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackStreamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PackStreamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Float content, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PackStreamValue::Float(f) => Some(*f),
            PackStreamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// String content.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// List content.
    pub fn as_list(&self) -> Option<&[PackStreamValue]> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Map content.
    pub fn as_map(&self) -> Option<&BoltMap> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Structure content.
    pub fn as_structure(&self) -> Option<&PackStreamStructure> {
        match self {
            PackStreamValue::Structure(s) => Some(s),
            _ => None,
        }
    }

    /// List of strings, skipping non-string items.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_list().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }
}

impl From<bool> for PackStreamValue {
    fn from(v: bool) -> Self {
        PackStreamValue::Boolean(v)
    }
}

impl From<i64> for PackStreamValue {
    fn from(v: i64) -> Self {
        PackStreamValue::Integer(v)
    }
}

impl From<i32> for PackStreamValue {
    fn from(v: i32) -> Self {
        PackStreamValue::Integer(v as i64)
    }
}

impl From<f64> for PackStreamValue {
    fn from(v: f64) -> Self {
        PackStreamValue::Float(v)
    }
}

impl From<&str> for PackStreamValue {
    fn from(v: &str) -> Self {
        PackStreamValue::String(v.to_string())
    }
}

impl From<String> for PackStreamValue {
    fn from(v: String) -> Self {
        PackStreamValue::String(v)
    }
}

impl From<Vec<PackStreamValue>> for PackStreamValue {
    fn from(v: Vec<PackStreamValue>) -> Self {
        PackStreamValue::List(v)
    }
}

impl From<Vec<String>> for PackStreamValue {
    fn from(v: Vec<String>) -> Self {
        PackStreamValue::List(v.into_iter().map(PackStreamValue::String).collect())
    }
}

impl From<BoltMap> for PackStreamValue {
    fn from(v: BoltMap) -> Self {
        PackStreamValue::Map(v)
    }
}

impl<T: Into<PackStreamValue>> From<Option<T>> for PackStreamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(PackStreamValue::Null)
    }
}
