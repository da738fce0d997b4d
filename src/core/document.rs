use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::core::{DbError, Result};

pub use serde_json::Value;

/// An ordered command document.
///
/// Field order is significant: by convention the first field of a request
/// body names the command, and its value (when a string) names the target
/// collection. A plain JSON map cannot guarantee that, so the document keeps
/// its fields as an ordered sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field, keeping any existing field with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Builder-style `append` for constructing documents inline.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.append(name, value);
        self
    }

    /// The value of the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes every field with the given name, returning the first match.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let first = self
            .fields
            .iter()
            .position(|(n, _)| n == name)
            .map(|idx| self.fields.remove(idx).1);
        self.fields.retain(|(n, _)| n != name);
        first
    }

    /// The first field, which by convention names the command.
    pub fn first(&self) -> Option<(&str, &Value)> {
        self.fields.first().map(|(n, v)| (n.as_str(), v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Converts into a JSON object value. Nested map ordering follows
    /// `serde_json`, so this is for subdocuments and reporting, not for
    /// round-tripping command bodies.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields.into_iter().collect())
    }

    /// Builds a document from a JSON object value.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            other => Err(DbError::TypeMismatch(format!(
                "expected an object, got {}",
                type_name(&other)
            ))),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\": {}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Truthiness of a reply indicator field: numbers are true when non-zero,
/// booleans are themselves, everything else is false.
pub fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
