use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// The root data a template is rendered against: a name-to-value mapping.
///
/// Values below the root may take any of the three resolvable shapes (plain
/// mappings, [`Object`](crate::Object) implementations with accessor
/// methods, or objects with attributes), nested arbitrarily.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    /// Bind `name` to `value` at the root.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Builder-style [`insert`](Context::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Context {
        self.insert(name, value);
        self
    }

    /// Decode a serialized JSON payload into a context. The payload must be
    /// a top-level object; its entries become the root bindings.
    pub fn from_json(payload: &str) -> Result<Context> {
        let json: serde_json::Value = serde_json::from_str(payload)?;
        match json {
            serde_json::Value::Object(entries) => Ok(Context {
                entries: entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            }),
            other => Err(Error::InvalidContext {
                message: format!(
                    "context payload must be a top-level object, got {}",
                    Value::from(other).type_name()
                ),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }
}

/// One step of dotted-name resolution: descend from `value` through
/// `segment`, probing the three capability shapes in fixed order — mapping
/// key, then zero-argument accessor, then plain attribute.
pub(crate) fn resolve_segment(value: &Value, segment: &str) -> Option<Value> {
    match value {
        Value::Map(entries) => entries.get(segment).cloned(),
        Value::Object(object) => object
            .key(segment)
            .or_else(|| object.invoke(segment))
            .or_else(|| object.attr(segment)),
        _ => None,
    }
}
