//! The pointer expression language.
//!
//! Expressions are a tagged union mirroring the external JSON schema:
//! literals (numbers keep their numeric form, hex strings keep their written
//! width), the `$wordsize` constant, variable references, n-ary arithmetic,
//! hashing, concatenation, resizing, region property lookups, and region
//! reads. Evaluation lives in [`crate::dereference`]; this module defines
//! the shape, the serde round trip, and the width-exact arithmetic.

use std::fmt;

use num_bigint::BigUint;
use serde::{de, ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tiny_keccak::{Hasher, Keccak};

use crate::{data::Data, error::PointerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Sum,
    Difference,
    Product,
    Quotient,
    Remainder,
}

impl ArithOp {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Sum => "$sum",
            Self::Difference => "$difference",
            Self::Product => "$product",
            Self::Quotient => "$quotient",
            Self::Remainder => "$remainder",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "$sum" => Self::Sum,
            "$difference" => Self::Difference,
            "$product" => Self::Product,
            "$quotient" => Self::Quotient,
            "$remainder" => Self::Remainder,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionProperty {
    Slot,
    Offset,
    Length,
}

impl RegionProperty {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Slot => ".slot",
            Self::Offset => ".offset",
            Self::Length => ".length",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Slot => "slot",
            Self::Offset => "offset",
            Self::Length => "length",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            ".slot" => Self::Slot,
            ".offset" => Self::Offset,
            ".length" => Self::Length,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// A JSON number literal.
    Number(u64),
    /// A hex string literal; written width is preserved.
    Hex(Data),
    /// `$wordsize`: 32, one byte wide.
    Wordsize,
    Variable(String),
    Arithmetic(ArithOp, Vec<Expression>),
    Keccak256(Vec<Expression>),
    Concat(Vec<Expression>),
    /// `$sizedN`: resize to exactly N bytes.
    Sized { size: usize, expr: Box<Expression> },
    /// `$wordsized`: resize to one word.
    Wordsized(Box<Expression>),
    /// `.offset` / `.length` / `.slot` of a named region (or `$this`).
    Lookup {
        property: RegionProperty,
        region: String,
    },
    /// `$read`: the bytes of a named region.
    Read(String),
}

impl Expression {
    pub fn number(n: u64) -> Self {
        Self::Number(n)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn lookup(property: RegionProperty, region: impl Into<String>) -> Self {
        Self::Lookup {
            property,
            region: region.into(),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(Self::Number)
                .ok_or_else(|| format!("literal out of range: {n}")),
            Value::String(s) => Ok(if s == "$wordsize" {
                Self::Wordsize
            } else if s.starts_with("0x") {
                Self::Hex(Data::from_hex(s).map_err(|e| format!("bad hex literal {s}: {e}"))?)
            } else {
                Self::Variable(s.clone())
            }),
            Value::Object(map) => {
                if map.len() != 1 {
                    return Err("expression object must have exactly one key".into());
                }
                let (key, inner) = map.iter().next().expect("checked length");
                Self::from_keyed(key, inner)
            }
            other => Err(format!("not an expression: {other}")),
        }
    }

    fn from_keyed(key: &str, inner: &Value) -> Result<Self, String> {
        if let Some(op) = ArithOp::from_key(key) {
            return Ok(Self::Arithmetic(op, Self::operand_list(key, inner)?));
        }
        if let Some(property) = RegionProperty::from_key(key) {
            let region = expect_string(key, inner)?;
            return Ok(Self::Lookup { property, region });
        }
        match key {
            "$keccak256" => Ok(Self::Keccak256(Self::operand_list(key, inner)?)),
            "$concat" => Ok(Self::Concat(Self::operand_list(key, inner)?)),
            "$wordsized" => Ok(Self::Wordsized(Box::new(Self::from_value(inner)?))),
            "$read" => Ok(Self::Read(expect_string(key, inner)?)),
            _ => {
                if let Some(digits) = key.strip_prefix("$sized") {
                    let size: usize = digits
                        .parse()
                        .map_err(|_| format!("bad resize keyword: {key}"))?;
                    return Ok(Self::Sized {
                        size,
                        expr: Box::new(Self::from_value(inner)?),
                    });
                }
                Err(format!("unknown expression keyword: {key}"))
            }
        }
    }

    fn operand_list(key: &str, inner: &Value) -> Result<Vec<Self>, String> {
        let Value::Array(items) = inner else {
            return Err(format!("{key} takes a list of operands"));
        };
        items.iter().map(Self::from_value).collect()
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::Hex(data) => Value::String(data.to_string()),
            Self::Wordsize => Value::String("$wordsize".into()),
            Self::Variable(name) => Value::String(name.clone()),
            Self::Arithmetic(op, operands) => keyed(op.key(), operand_values(operands)),
            Self::Keccak256(operands) => keyed("$keccak256", operand_values(operands)),
            Self::Concat(operands) => keyed("$concat", operand_values(operands)),
            Self::Sized { size, expr } => keyed(&format!("$sized{size}"), expr.to_value()),
            Self::Wordsized(expr) => keyed("$wordsized", expr.to_value()),
            Self::Lookup { property, region } => {
                keyed(property.key(), Value::String(region.clone()))
            }
            Self::Read(region) => keyed("$read", Value::String(region.clone())),
        }
    }
}

fn keyed(key: &str, value: Value) -> Value {
    let mut map = serde_json::Map::with_capacity(1);
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn operand_values(operands: &[Expression]) -> Value {
    Value::Array(operands.iter().map(Expression::to_value).collect())
}

fn expect_string(key: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(format!("{key} names a region, got {other}")),
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_value() {
            Value::Object(map) => {
                let mut s = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in &map {
                    s.serialize_entry(k, v)?;
                }
                s.end()
            }
            other => other.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Widen the minimal encoding of `value` with leading zeros up to
/// `min_width`; wider-than-minimum results keep their natural width.
fn widen(value: &BigUint, min_width: usize) -> Data {
    let data = Data::from_uint(value);
    if data.len() < min_width {
        data.resize(min_width)
    } else {
        data
    }
}

fn max_width(operands: &[Data]) -> usize {
    operands.iter().map(Data::len).max().unwrap_or(0)
}

impl ArithOp {
    /// Apply over evaluated operands.
    ///
    /// Widths follow the word rules: results carry at least the widest
    /// operand's width, and sums/products grow further when the true value
    /// needs more bytes. `$difference` saturates at zero instead of
    /// wrapping; dependent pointer arithmetic relies on that.
    pub fn apply(&self, operands: &[Data]) -> Result<Data, PointerError> {
        let width = max_width(operands);
        match self {
            Self::Sum => {
                let total: BigUint = operands.iter().map(Data::as_uint).sum();
                Ok(widen(&total, width))
            }
            Self::Product => {
                let total: BigUint = operands.iter().map(Data::as_uint).product();
                Ok(widen(&total, width))
            }
            Self::Difference => {
                let mut iter = operands.iter();
                let mut acc = iter.next().map(Data::as_uint).unwrap_or_default();
                for operand in iter {
                    let rhs = operand.as_uint();
                    // Saturating: a difference never goes negative.
                    acc = if acc >= rhs {
                        acc - rhs
                    } else {
                        BigUint::default()
                    };
                }
                Ok(Data::from_uint(&acc).resize(width))
            }
            Self::Quotient => fold_division(operands, width, |a, b| a / b),
            Self::Remainder => fold_division(operands, width, |a, b| a % b),
        }
    }
}

fn fold_division(
    operands: &[Data],
    width: usize,
    op: impl Fn(BigUint, &BigUint) -> BigUint,
) -> Result<Data, PointerError> {
    let mut iter = operands.iter();
    let mut acc = iter.next().map(Data::as_uint).unwrap_or_default();
    for operand in iter {
        let rhs = operand.as_uint();
        if rhs == BigUint::default() {
            return Err(PointerError::DivisionByZero);
        }
        acc = op(acc, &rhs);
    }
    Ok(Data::from_uint(&acc).resize(width))
}

/// keccak256 of the operands' bytes, concatenated with no padding between
/// them beyond each operand's own width.
pub fn keccak256_concat(operands: &[Data]) -> Data {
    let mut hasher = Keccak::v256();
    for operand in operands {
        hasher.update(operand.bytes());
    }
    let mut digest = [0u8; 32];
    hasher.finalize(&mut digest);
    Data::from_bytes(digest.to_vec())
}
