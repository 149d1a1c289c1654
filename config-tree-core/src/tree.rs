use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use serde_json::{Number, Value};

/// A node in a loosely typed configuration tree.
///
/// Trees are built once from a received document and then only read. Every
/// accessor returns an `Option` so callers never assume that a key exists or
/// holds the expected kind of value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigNode {
    /// Explicit JSON `null`.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar, integer or floating point.
    Number(Number),
    /// String scalar.
    String(String),
    /// Ordered sequence of nodes.
    List(Vec<ConfigNode>),
    /// Key-value mapping with keys kept in sorted order.
    Map(BTreeMap<String, ConfigNode>),
}

impl ConfigNode {
    /// Build a map node from key-value pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ConfigNode)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list node.
    pub fn list(items: impl IntoIterator<Item = ConfigNode>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Short name of the node kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Return the value stored under `key` when this node is a map.
    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        match self {
            Self::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Walk a nested map path and return the terminal node if found.
    ///
    /// An empty path returns the node itself. Lists are not traversed; callers
    /// iterate them explicitly with [`ConfigNode::items`].
    pub fn get_path(&self, path: &[&str]) -> Option<&ConfigNode> {
        let mut current = self;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Walk a path and return the terminal string value.
    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get_path(path)?.as_str()
    }

    /// Walk a path and return the terminal integer value.
    pub fn get_i64(&self, path: &[&str]) -> Option<i64> {
        self.get_path(path)?.as_i64()
    }

    /// Walk a path and return the terminal boolean value.
    pub fn get_bool(&self, path: &[&str]) -> Option<bool> {
        self.get_path(path)?.as_bool()
    }

    /// Return the list elements found at `path`, or an empty slice when the
    /// path is missing or does not hold a list.
    pub fn items(&self, path: &[&str]) -> &[ConfigNode] {
        self.get_path(path)
            .and_then(ConfigNode::as_list)
            .unwrap_or(&[])
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer view of a number. Floating values with no fractional part are
    /// accepted because JSON producers do not always keep the distinction.
    pub fn as_i64(&self) -> Option<i64> {
        let Self::Number(number) = self else {
            return None;
        };
        if let Some(value) = number.as_i64() {
            return Some(value);
        }
        let value = number.as_f64()?;
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
            Some(value as i64)
        } else {
            None
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigNode]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigNode>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<Value> for ConfigNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ConfigNode {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigNode {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ConfigNode {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<bool> for ConfigNode {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl Display for ConfigNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{key:?}:{value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
