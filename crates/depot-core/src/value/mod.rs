
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
};

///
/// Float64
///
/// `f64` with bitwise equality so values can serve as hashable key parts.
///

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Float64(pub f64);

impl PartialEq for Float64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Float64 {}

impl Hash for Float64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

///
/// ValueEnum
///
/// Enumerated value. Bound by `variant` name unless a small-integer `code`
/// is attached, in which case the code is written instead.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ValueEnum {
    pub variant: String,
    pub code: Option<i32>,
}

impl ValueEnum {
    #[must_use]
    pub fn named(variant: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn coded(variant: impl Into<String>, code: i32) -> Self {
        Self {
            variant: variant.into(),
            code: Some(code),
        }
    }
}

///
/// Value
///
/// Runtime value flowing between records, bound parameters, result rows and
/// cache keys. Only primitive payloads, so any value is serializable by value.
///
/// Null   → SQL NULL (also used for an absent key column).
/// List   → a natively bound array parameter; never stored in a record.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(Float64),
    Text(String),
    Blob(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Enum(ValueEnum),
    IntArray(Vec<i32>),
    List(Vec<Self>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True when this value cannot identify a row: null, or a numeric zero
    /// left behind by an unassigned identity column.
    #[must_use]
    pub fn is_absent_key_part(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Int(v) | Self::Timestamp(v) => *v == 0,
            Self::Float(v) => v.0 == 0.0,
            _ => false,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Pack a fixed-width integer array into its big-endian blob encoding.
    #[must_use]
    pub fn pack_int_array(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    /// Inverse of [`Value::pack_int_array`]; `None` on a ragged blob.
    #[must_use]
    pub fn unpack_int_array(bytes: &[u8]) -> Option<Vec<i32>> {
        if bytes.len() % 4 != 0 {
            return None;
        }

        Some(
            bytes
                .chunks_exact(4)
                .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) | Self::Timestamp(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{}", v.0),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Blob(v) => write!(f, "<blob {} bytes>", v.len()),
            Self::Enum(v) => write!(f, "{}", v.variant),
            Self::IntArray(v) => write!(f, "{v:?}"),
            Self::List(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

//
// Conversions
//

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(Float64(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<ValueEnum> for Value {
    fn from(v: ValueEnum) -> Self {
        Self::Enum(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
