use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the single anonymous slot of a text-like block
pub const MAIN_SLOT: &str = "main";

/// Opaque, globally unique identifier of a block instance.
///
/// Assigned once when the instance is created (or carried over from a
/// persisted representation) and never regenerated on edit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Scalar property value
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl Serialize for PropertyValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropertyValue::Number(n) if is_integral(*n) => serializer.serialize_i64(*n as i64),
            PropertyValue::Number(n) => serializer.serialize_f64(*n),
            PropertyValue::Text(text) => serializer.serialize_str(text),
        }
    }
}

fn is_integral(n: f64) -> bool {
    n.fract() == 0.0 && n.abs() < 1e15
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            PropertyValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(number) => Some(*number),
            PropertyValue::Text(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Integral numbers print without a fractional part ("1", not "1.0")
            PropertyValue::Number(n) if is_integral(*n) => {
                write!(f, "{}", *n as i64)
            }
            PropertyValue::Number(n) => write!(f, "{n}"),
            PropertyValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Number(f64::from(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// Slot name to rich-text markup
pub type Slots = BTreeMap<String, String>;

/// How a block holds its editable content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    /// Content lives inline in a single anonymous `main` slot
    TextLike,
    /// Content lives in zero or more named, non-overlapping slots
    ObjectLike,
}

/// The canonical unit of structured content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInstance {
    pub uid: Uid,
    pub type_name: String,
    pub kind: BlockKind,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub slots: Slots,
}

impl BlockInstance {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }

    /// Equal in everything but identity
    pub fn same_content(&self, other: &BlockInstance) -> bool {
        self.type_name == other.type_name
            && self.kind == other.kind
            && self.properties == other.properties
            && self.slots == other.slots
    }
}
