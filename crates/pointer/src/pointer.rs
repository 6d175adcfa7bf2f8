//! The declarative pointer schema.
//!
//! Pointers arrive as JSON debug metadata and describe one or more byte
//! regions, possibly parameterized by expressions: a single region, a named
//! group, a counted list with an iteration variable, a conditional, a
//! lexical scope of definitions, or a reference to a named template.

use std::fmt;

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::expression::Expression;

/// An EVM data location a region can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Stack,
    Memory,
    Storage,
    Calldata,
    Returndata,
    Transient,
    Code,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stack => "stack",
            Self::Memory => "memory",
            Self::Storage => "storage",
            Self::Calldata => "calldata",
            Self::Returndata => "returndata",
            Self::Transient => "transient",
            Self::Code => "code",
        }
    }

    fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "stack" => Self::Stack,
            "memory" => Self::Memory,
            "storage" => Self::Storage,
            "calldata" => Self::Calldata,
            "returndata" => Self::Returndata,
            "transient" => Self::Transient,
            "code" => Self::Code,
            _ => return None,
        })
    }

    /// Slot-addressed locations carry a `slot`; the rest address bytes.
    pub fn is_slot_based(&self) -> bool {
        matches!(self, Self::Stack | Self::Storage | Self::Transient)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single (possibly expression-parameterized) region.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: Option<String>,
    pub location: Location,
    pub slot: Option<Expression>,
    pub offset: Option<Expression>,
    pub length: Option<Expression>,
}

/// A pointer tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Pointer {
    Region(Box<Region>),
    /// Ordered sub-pointers; earlier siblings' names are visible to later
    /// ones.
    Group(Vec<Pointer>),
    /// `count` copies of `is`, with `each` bound to the index.
    List {
        count: Expression,
        each: String,
        is: Box<Pointer>,
    },
    /// Nonzero condition selects `then`, zero selects `otherwise` (which
    /// may be absent: the conditional then contributes nothing).
    Conditional {
        condition: Expression,
        then: Box<Pointer>,
        otherwise: Option<Box<Pointer>>,
    },
    /// Bindings visible only inside `body`.
    Scope {
        define: IndexMap<String, Expression>,
        body: Box<Pointer>,
    },
    /// Reference to a named template from the dereference options.
    Template(String),
}

/// A pointer parameterized by free variables the caller must bind.
///
/// `expect` exists to turn a would-be lookup failure deep inside expansion
/// into an upfront, named validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub expect: Vec<String>,
    pub body: Pointer,
}

impl Pointer {
    pub fn region(region: Region) -> Self {
        Self::Region(Box::new(region))
    }

    pub fn from_value(value: &Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err(format!("not a pointer: {value}"));
        };

        if map.contains_key("location") {
            return Ok(Self::Region(Box::new(Region::from_map(map)?)));
        }
        if let Some(group) = map.get("group") {
            let Value::Array(items) = group else {
                return Err("group takes a list of pointers".into());
            };
            let members = items.iter().map(Self::from_value).collect::<Result<_, _>>()?;
            return Ok(Self::Group(members));
        }
        if let Some(list) = map.get("list") {
            let Value::Object(fields) = list else {
                return Err("list takes an object".into());
            };
            let count = Expression::from_value(require(fields, "count")?)?;
            let each = expect_str(require(fields, "each")?)?;
            let is = Self::from_value(require(fields, "is")?)?;
            return Ok(Self::List {
                count,
                each,
                is: Box::new(is),
            });
        }
        if map.contains_key("if") {
            let condition = Expression::from_value(require(map, "if")?)?;
            let then = Self::from_value(require(map, "then")?)?;
            let otherwise = map
                .get("else")
                .map(Self::from_value)
                .transpose()?
                .map(Box::new);
            return Ok(Self::Conditional {
                condition,
                then: Box::new(then),
                otherwise,
            });
        }
        if map.contains_key("define") {
            let Value::Object(defs) = require(map, "define")? else {
                return Err("define takes an object of bindings".into());
            };
            let mut define = IndexMap::new();
            for (name, expr) in defs {
                define.insert(name.clone(), Expression::from_value(expr)?);
            }
            let body = Self::from_value(require(map, "in")?)?;
            return Ok(Self::Scope {
                define,
                body: Box::new(body),
            });
        }
        if let Some(template) = map.get("template") {
            return Ok(Self::Template(expect_str(template)?));
        }
        Err(format!("unrecognized pointer form: {value}"))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Region(region) => region.to_value(),
            Self::Group(members) => {
                let items = members.iter().map(Self::to_value).collect();
                object([("group", Value::Array(items))])
            }
            Self::List { count, each, is } => object([(
                "list",
                object([
                    ("count", count.to_value()),
                    ("each", Value::String(each.clone())),
                    ("is", is.to_value()),
                ]),
            )]),
            Self::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let mut fields = vec![("if", condition.to_value()), ("then", then.to_value())];
                if let Some(otherwise) = otherwise {
                    fields.push(("else", otherwise.to_value()));
                }
                object(fields)
            }
            Self::Scope { define, body } => {
                let mut defs = serde_json::Map::new();
                for (name, expr) in define {
                    defs.insert(name.clone(), expr.to_value());
                }
                object([("define", Value::Object(defs)), ("in", body.to_value())])
            }
            Self::Template(name) => object([("template", Value::String(name.clone()))]),
        }
    }
}

impl Region {
    fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self, String> {
        let location = expect_str(require(map, "location")?)?;
        let location = Location::from_str_opt(&location)
            .ok_or_else(|| format!("unknown location: {location}"))?;
        let field = |name: &str| -> Result<Option<Expression>, String> {
            map.get(name).map(Expression::from_value).transpose()
        };
        Ok(Self {
            name: match map.get("name") {
                Some(v) => Some(expect_str(v)?),
                None => None,
            },
            location,
            slot: field("slot")?,
            offset: field("offset")?,
            length: field("length")?,
        })
    }

    fn to_value(&self) -> Value {
        let mut fields = Vec::new();
        if let Some(name) = &self.name {
            fields.push(("name", Value::String(name.clone())));
        }
        fields.push(("location", Value::String(self.location.as_str().into())));
        if let Some(slot) = &self.slot {
            fields.push(("slot", slot.to_value()));
        }
        if let Some(offset) = &self.offset {
            fields.push(("offset", offset.to_value()));
        }
        if let Some(length) = &self.length {
            fields.push(("length", length.to_value()));
        }
        object(fields)
    }
}

impl Template {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err(format!("not a template: {value}"));
        };
        let expect = match map.get("expect") {
            Some(Value::Array(items)) => items
                .iter()
                .map(expect_str)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(format!("expect takes a list of names, got {other}")),
            None => Vec::new(),
        };
        let body = Pointer::from_value(require(map, "for")?)?;
        Ok(Self { expect, body })
    }

    pub fn to_value(&self) -> Value {
        object([
            (
                "expect",
                Value::Array(
                    self.expect
                        .iter()
                        .map(|s| Value::String(s.clone()))
                        .collect(),
                ),
            ),
            ("for", self.body.to_value()),
        ])
    }
}

fn object<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    let mut map = serde_json::Map::new();
    for (key, value) in fields {
        map.insert(key.to_string(), value);
    }
    Value::Object(map)
}

fn require<'v>(
    map: &'v serde_json::Map<String, Value>,
    key: &str,
) -> Result<&'v Value, String> {
    map.get(key).ok_or_else(|| format!("missing field: {key}"))
}

fn expect_str(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(format!("expected a string, got {other}")),
    }
}

impl Serialize for Pointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Pointer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}
