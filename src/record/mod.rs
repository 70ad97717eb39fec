// src/record/mod.rs

//! Records flowing between stages.
//!
//! The scaffold treats records as opaque tuples of [`Field`]s. The only thing
//! it ever asks of a record is a totally ordered [`Key`], extracted from a
//! configured field index (see [`KeyLayout`]).

pub mod format;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{IterdagError, Result};

/// One value inside a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    Null,
    Long(i64),
    /// Serialised as its IEEE-754 bit pattern, so spilled values (NaN and
    /// the infinities included) read back bit for bit.
    Double(#[serde(with = "f64_bits")] f64),
    Text(String),
}

mod f64_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

impl Field {
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Field::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; `Long` widens to `f64`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Field::Double(v) => Some(*v),
            Field::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn estimated_size(&self) -> usize {
        match self {
            Field::Text(s) => std::mem::size_of::<Field>() + s.len(),
            _ => std::mem::size_of::<Field>(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Null => f.write_str("null"),
            Field::Long(v) => write!(f, "{v}"),
            Field::Double(v) => write!(f, "{v:?}"),
            Field::Text(s) => f.write_str(s),
        }
    }
}

/// Join/grouping key. Doubles are deliberately not keys: they have no total
/// order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Long(i64),
    Text(String),
}

impl Key {
    /// Canonical byte encoding used for stable hash partitioning.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Key::Long(v) => {
                let mut out = Vec::with_capacity(9);
                out.push(0);
                out.extend_from_slice(&v.to_le_bytes());
                out
            }
            Key::Text(s) => {
                let mut out = Vec::with_capacity(s.len() + 1);
                out.push(1);
                out.extend_from_slice(s.as_bytes());
                out
            }
        }
    }

    pub fn to_field(&self) -> Field {
        match self {
            Key::Long(v) => Field::Long(*v),
            Key::Text(s) => Field::Text(s.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Long(v) => write!(f, "{v}"),
            Key::Text(s) => f.write_str(s),
        }
    }
}

/// A user-defined tuple.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Extract the key stored at `index`.
    pub fn key(&self, index: usize) -> Result<Key> {
        match self.fields.get(index) {
            Some(Field::Long(v)) => Ok(Key::Long(*v)),
            Some(Field::Text(s)) => Ok(Key::Text(s.clone())),
            Some(other) => Err(IterdagError::MalformedRecord(format!(
                "field {index} of {self} is {other:?}, which cannot be used as a key"
            ))),
            None => Err(IterdagError::MalformedRecord(format!(
                "record {self} has no field {index} to use as a key"
            ))),
        }
    }

    /// Numeric field at `index`, or a `MalformedRecord` error.
    pub fn double(&self, index: usize) -> Result<f64> {
        self.fields
            .get(index)
            .and_then(Field::as_double)
            .ok_or_else(|| {
                IterdagError::MalformedRecord(format!(
                    "record {self} has no numeric field {index}"
                ))
            })
    }

    /// Rough heap footprint, used against partition memory budgets.
    pub fn estimated_size(&self) -> usize {
        std::mem::size_of::<Record>()
            + self.fields.iter().map(Field::estimated_size).sum::<usize>()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}")?;
        }
        f.write_str(")")
    }
}

/// Build a record from a list of values convertible into fields.
#[macro_export]
macro_rules! record {
    ($($value:expr),* $(,)?) => {
        $crate::record::Record::new(vec![$($crate::record::Field::from($value)),*])
    };
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Long(v)
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Double(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::Text(v.to_string())
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::Text(v)
    }
}

/// Which field holds the key, per kind of record in the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct KeyLayout {
    /// Iteration state: seed, head output, backchannel, tail output.
    #[serde(default)]
    pub state: usize,
    /// Static companion input joined by the intermediate stage.
    #[serde(default)]
    pub companion: usize,
    /// Partial results flowing from intermediate to tail.
    #[serde(default)]
    pub partial: usize,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self {
            state: 0,
            companion: 0,
            partial: 0,
        }
    }
}
