//! Hierarchical parameter lists
//!
//! Options are addressed by their full string name (`"filtering: type"`,
//! `"eigen-analysis: tolerance"`, ...), optionally behind a preconditioner
//! prefix. A list can be built programmatically or loaded from JSON:
//!
//! ```json
//! {
//!     "filtering: enable": true,
//!     "filtering: type": "projection",
//!     "filtering: eigenvalues to compute": 4,
//!     "eigen-analysis: tolerance": 1e-6
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading parameters
#[derive(Debug, Error)]
pub enum ParameterError {
    /// A key holds a value of the wrong type
    #[error("parameter `{key}` holds a {found}, expected {expected}")]
    TypeMismatch {
        /// Full key, prefix included
        key: String,
        /// Requested type
        expected: &'static str,
        /// Type actually stored
        found: &'static str,
    },

    /// A key holds a value outside its allowed set
    #[error("parameter `{key}` = `{value}` not recognized, expected one of {allowed}")]
    InvalidValue {
        /// Full key, prefix included
        key: String,
        /// Rejected value
        value: String,
        /// Accepted values
        allowed: &'static str,
    },

    /// JSON input could not be parsed
    #[error("invalid parameter JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Parameter file could not be read
    #[error("cannot read parameter file: {0}")]
    Io(#[from] std::io::Error),
}

/// A single parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Boolean flag
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Double(f64),
    /// String
    String(String),
    /// Nested list
    List(ParameterList),
}

impl ParameterValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::List(_) => "list",
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ParameterValue {
                fn from(value: $ty) -> Self {
                    ParameterValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Double,
    String => String,
    &str => String,
    ParameterList => List,
}

impl From<usize> for ParameterValue {
    fn from(value: usize) -> Self {
        ParameterValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

/// Types that can be read from a [`ParameterList`]
pub trait ParameterType: Sized {
    /// Name used in type-mismatch diagnostics
    const TYPE_NAME: &'static str;

    /// Extract a value, `None` if the stored variant does not fit
    fn from_value(value: &ParameterValue) -> Option<Self>;
}

impl ParameterType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl ParameterType for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl ParameterType for usize {
    const TYPE_NAME: &'static str = "non-negative int";

    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Int(i) => usize::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl ParameterType for f64 {
    const TYPE_NAME: &'static str = "double";

    // Integers written without a decimal point are accepted as doubles
    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Double(d) => Some(*d),
            ParameterValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl ParameterType for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl ParameterType for ParameterList {
    const TYPE_NAME: &'static str = "list";

    fn from_value(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::List(l) => Some(l.clone()),
            _ => None,
        }
    }
}

/// Ordered key/value store of options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterList {
    entries: BTreeMap<String, ParameterValue>,
}

impl ParameterList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object
    pub fn from_json_str(json: &str) -> Result<Self, ParameterError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ParameterError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Set `key`, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParameterValue>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Raw value stored at `key`
    pub fn get_value(&self, key: &str) -> Option<&ParameterValue> {
        self.entries.get(key)
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: &str) -> Option<ParameterValue> {
        self.entries.remove(key)
    }

    /// Typed read with a default for absent keys
    pub fn get_or<T: ParameterType>(&self, key: &str, default: T) -> Result<T, ParameterError> {
        match self.entries.get(key) {
            None => Ok(default),
            Some(value) => T::from_value(value).ok_or_else(|| ParameterError::TypeMismatch {
                key: key.to_string(),
                expected: T::TYPE_NAME,
                found: value.type_name(),
            }),
        }
    }

    /// Nested list stored at `key`
    pub fn sublist(&self, key: &str) -> Option<&ParameterList> {
        match self.entries.get(key) {
            Some(ParameterValue::List(list)) => Some(list),
            _ => None,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.entries.iter()
    }
}

/// Reads options of one preconditioner, all keys behind a common prefix
#[derive(Debug, Clone, Copy)]
pub struct PrefixedParameters<'p> {
    list: &'p ParameterList,
    prefix: &'p str,
}

impl<'p> PrefixedParameters<'p> {
    /// View `list` through `prefix`
    pub fn new(list: &'p ParameterList, prefix: &'p str) -> Self {
        Self { list, prefix }
    }

    /// Typed read of `<prefix><name>`
    pub fn get_or<T: ParameterType>(&self, name: &str, default: T) -> Result<T, ParameterError> {
        self.list.get_or(&self.key(name), default)
    }

    /// Whether `<prefix><name>` is present
    pub fn contains(&self, name: &str) -> bool {
        self.list.contains(&self.key(name))
    }

    /// Full key of `name`
    pub fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}
