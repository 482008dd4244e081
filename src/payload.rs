//! The JSON payload DOM. A `Payload` is always a JSON object at the top level;
//! empty payload is represented as an empty map, which serializes to `{}` and
//! to zero wire bytes (§3).

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A JSON object payload with typed accessors. Backed by `serde_json::Value`
/// so the façades can round-trip arbitrary embedder-supplied JSON, while the
/// core only ever needs to know it parses as an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
  fields: serde_json::Map<String, Value>,
}

impl Payload {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds a `Payload` from a parsed JSON value, failing unless it is an
  /// object (arrays and scalars are not valid top-level payloads, §3).
  pub fn from_value(value: Value) -> Result<Self> {
    match value {
      Value::Object(fields) => Ok(Self { fields }),
      other => Err(Error::PayloadParseFailed(format!(
        "expected a JSON object at the top level, got {other}"
      ))),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }

  pub fn as_value(&self) -> Value {
    Value::Object(self.fields.clone())
  }

  pub fn into_value(self) -> Value {
    Value::Object(self.fields)
  }

  fn field(&self, key: &str) -> Result<&Value> {
    self.fields.get(key).ok_or_else(|| Error::key_not_found(key))
  }

  pub fn get_bool(&self, key: &str) -> Result<bool> {
    self
      .field(key)?
      .as_bool()
      .ok_or_else(|| Error::wrong_type(key, "bool"))
  }

  pub fn get_int(&self, key: &str) -> Result<i64> {
    self
      .field(key)?
      .as_i64()
      .ok_or_else(|| Error::wrong_type(key, "int"))
  }

  pub fn get_string(&self, key: &str) -> Result<&str> {
    self
      .field(key)?
      .as_str()
      .ok_or_else(|| Error::wrong_type(key, "string"))
  }

  pub fn get_array(&self, key: &str) -> Result<&Vec<Value>> {
    self
      .field(key)?
      .as_array()
      .ok_or_else(|| Error::wrong_type(key, "array"))
  }

  pub fn get_object(&self, key: &str) -> Result<&serde_json::Map<String, Value>> {
    self
      .field(key)?
      .as_object()
      .ok_or_else(|| Error::wrong_type(key, "object"))
  }

  pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
    self.fields.insert(key.into(), Value::Bool(value));
    self
  }

  pub fn set_int(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
    self.fields.insert(key.into(), Value::from(value));
    self
  }

  pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
    self.fields.insert(key.into(), Value::String(value.into()));
    self
  }

  pub fn set_array(&mut self, key: impl Into<String>, value: Vec<Value>) -> &mut Self {
    self.fields.insert(key.into(), Value::Array(value));
    self
  }

  pub fn set_object(
    &mut self,
    key: impl Into<String>,
    value: serde_json::Map<String, Value>,
  ) -> &mut Self {
    self.fields.insert(key.into(), Value::Object(value));
    self
  }

  /// Merges another payload's fields into this one, overwriting duplicate
  /// keys. Used by the `metadata` opcode's object-merge semantics (§4.7).
  pub fn merge(&mut self, other: &Payload) -> &mut Self {
    for (key, value) in &other.fields {
      self.fields.insert(key.clone(), value.clone());
    }
    self
  }

  /// Stable ordering of keys, handy for deterministic logging/tests.
  pub fn keys(&self) -> BTreeMap<&str, &Value> {
    self.fields.iter().map(|(k, v)| (k.as_str(), v)).collect()
  }
}

impl From<serde_json::Map<String, Value>> for Payload {
  fn from(fields: serde_json::Map<String, Value>) -> Self {
    Self { fields }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn empty_payload_is_empty_object() {
    let p = Payload::new();
    assert!(p.is_empty());
    assert_eq!(p.as_value(), json!({}));
  }

  #[test]
  fn rejects_non_object_top_level() {
    assert!(Payload::from_value(json!([1, 2])).is_err());
    assert!(Payload::from_value(json!("scalar")).is_err());
    assert!(Payload::from_value(json!(null)).is_err());
  }

  #[test]
  fn typed_accessors_roundtrip() {
    let mut p = Payload::new();
    p.set_bool("allocated", true)
      .set_int("players", 3)
      .set_string("name", "arena-1");

    assert_eq!(p.get_bool("allocated").unwrap(), true);
    assert_eq!(p.get_int("players").unwrap(), 3);
    assert_eq!(p.get_string("name").unwrap(), "arena-1");
  }

  #[test]
  fn missing_key_is_key_not_found() {
    let p = Payload::new();
    assert_eq!(p.get_bool("missing").unwrap_err(), Error::key_not_found("missing"));
  }

  #[test]
  fn wrong_type_is_reported() {
    let mut p = Payload::new();
    p.set_string("players", "three");
    assert_eq!(
      p.get_int("players").unwrap_err(),
      Error::wrong_type("players", "int")
    );
  }

  #[test]
  fn merge_overwrites_duplicate_keys() {
    let mut a = Payload::new();
    a.set_int("count", 1).set_string("keep", "a");
    let mut b = Payload::new();
    b.set_int("count", 2);
    a.merge(&b);
    assert_eq!(a.get_int("count").unwrap(), 2);
    assert_eq!(a.get_string("keep").unwrap(), "a");
  }
}
