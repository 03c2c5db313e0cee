//! Scalar types, record keys and column-name rules.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::{Error, Result};

/// Numeric type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit unsigned integer.
    U64,
}

impl ScalarType {
    /// `true` for `f32` / `f64`.
    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    /// Whether a column stored as `self` may be read as `requested`.
    ///
    /// Floats convert freely (the width is chosen per column). Integers only widen.
    pub fn can_read_as(self, requested: ScalarType) -> bool {
        use ScalarType::*;
        if self == requested || (self.is_float() && requested.is_float()) {
            return true;
        }
        matches!((self, requested), (I32, I64) | (U32, U64) | (U32, I64))
    }

    /// Short lowercase name (`"f32"`, `"u64"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::U32 => "u32",
            ScalarType::U64 => "u64",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" | "float" | "f" => Ok(ScalarType::F32),
            "f64" | "double" | "d" => Ok(ScalarType::F64),
            "i32" | "int" | "i" => Ok(ScalarType::I32),
            "i64" | "long" | "l" => Ok(ScalarType::I64),
            "u32" => Ok(ScalarType::U32),
            "u64" => Ok(ScalarType::U64),
            other => Err(format!(
                "unknown scalar type '{other}' (expected f32, f64, i32, i64, u32 or u64)"
            )),
        }
    }
}

/// A single typed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
}

impl Scalar {
    /// Type tag of this value.
    pub fn scalar_type(self) -> ScalarType {
        match self {
            Scalar::F32(_) => ScalarType::F32,
            Scalar::F64(_) => ScalarType::F64,
            Scalar::I32(_) => ScalarType::I32,
            Scalar::I64(_) => ScalarType::I64,
            Scalar::U32(_) => ScalarType::U32,
            Scalar::U64(_) => ScalarType::U64,
        }
    }

    /// Numeric conversion with `as` semantics.
    pub fn cast(self, ty: ScalarType) -> Scalar {
        if self.scalar_type() == ty {
            return self;
        }
        match ty {
            ScalarType::F32 => Scalar::F32(self.as_f64() as f32),
            ScalarType::F64 => Scalar::F64(self.as_f64()),
            ScalarType::I32 => Scalar::I32(self.as_i128() as i32),
            ScalarType::I64 => Scalar::I64(self.as_i128() as i64),
            ScalarType::U32 => Scalar::U32(self.as_i128() as u32),
            ScalarType::U64 => Scalar::U64(self.as_i128() as u64),
        }
    }

    /// Value as `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::F32(v) => f64::from(v),
            Scalar::F64(v) => v,
            Scalar::I32(v) => f64::from(v),
            Scalar::I64(v) => v as f64,
            Scalar::U32(v) => f64::from(v),
            Scalar::U64(v) => v as f64,
        }
    }

    /// Integer value as `i64`, `None` for floats or out-of-range values.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Scalar::F32(_) | Scalar::F64(_) => None,
            other => i64::try_from(other.as_i128()).ok(),
        }
    }

    /// Integer value as `u64`, `None` for floats or negative values.
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Scalar::F32(_) | Scalar::F64(_) => None,
            other => u64::try_from(other.as_i128()).ok(),
        }
    }

    fn as_i128(self) -> i128 {
        match self {
            Scalar::F32(v) => v as i128,
            Scalar::F64(v) => v as i128,
            Scalar::I32(v) => i128::from(v),
            Scalar::I64(v) => i128::from(v),
            Scalar::U32(v) => i128::from(v),
            Scalar::U64(v) => i128::from(v),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::U32(v) => write!(f, "{v}"),
            Scalar::U64(v) => write!(f, "{v}"),
        }
    }
}

/// Natural key of an event record: `(run, event, lumi block)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RecordKey {
    /// Run number.
    pub run: i64,
    /// Event number.
    pub event: u64,
    /// Luminosity block.
    pub lumi: i64,
}

impl RecordKey {
    /// Create a key.
    pub fn new(run: i64, event: u64, lumi: i64) -> Self {
        Self { run, event, lumi }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(run={}, event={}, lumi={})", self.run, self.event, self.lumi)
    }
}

/// Field names holding the three components of a [`RecordKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFields {
    /// Run-number field.
    pub run: String,
    /// Event-number field.
    pub event: String,
    /// Lumi-block field.
    pub lumi: String,
}

impl Default for KeyFields {
    fn default() -> Self {
        Self { run: "RunNumber".into(), event: "EventNumber".into(), lumi: "lumi".into() }
    }
}

impl KeyFields {
    /// The three field names in key order.
    pub fn names(&self) -> [&str; 3] {
        [&self.run, &self.event, &self.lumi]
    }
}

/// Check that `name` is a legal column identifier.
///
/// Accepted: ASCII letters, digits and `_`, not starting with a digit.
pub fn validate_column_name(name: &str) -> Result<()> {
    let invalid = |reason| Err(Error::InvalidName { name: name.to_string(), reason });
    let Some(first) = name.chars().next() else {
        return invalid("name is empty");
    };
    if first.is_ascii_digit() {
        return invalid("name starts with a digit");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return invalid("only ASCII letters, digits and '_' are allowed");
    }
    Ok(())
}
