//! Records - the unit shared between the store and the document.
//!
//! A record is a JSON object carrying a string `id` field. Its id is also
//! its key at the top level of the replicated document, and its type name
//! (the id prefix before the first `:`) decides whether it is persisted.

use crate::error::RecordError;
use crate::path::{resolve, PathKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use ulid::Ulid;

/// Type name of the synthetic records built from peer presence.
pub const PRESENCE_TYPE: &str = "instance_presence";

/// Type names of per-client records that never leave the local store.
const SESSION_TYPES: [&str; 4] = ["instance", "instance_page_state", "camera", "pointer"];

/// Globally unique identifier of a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id of the given type, e.g. `shape:01H...`.
    pub fn generate(type_name: &str) -> Self {
        Self(format!("{}:{}", type_name, Ulid::new()))
    }

    /// The id of the presence record for a peer.
    pub fn presence(peer_id: &str) -> Self {
        Self(format!("{}:{}", PRESENCE_TYPE, peer_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The type name encoded in the id prefix.
    pub fn type_name(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }

    pub fn scope(&self) -> RecordScope {
        RecordScope::of(self.type_name())
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for RecordId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Where a record lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordScope {
    /// Shared through the replicated document.
    Document,
    /// Local to one editor instance (camera, pointer, selection).
    Session,
    /// Ephemeral peer state merged from the awareness channel.
    Presence,
}

impl RecordScope {
    pub fn of(type_name: &str) -> Self {
        if type_name == PRESENCE_TYPE {
            RecordScope::Presence
        } else if SESSION_TYPES.contains(&type_name) {
            RecordScope::Session
        } else {
            RecordScope::Document
        }
    }

    /// Only document-scope records are written into the replicated document.
    pub fn is_persisted(self) -> bool {
        matches!(self, RecordScope::Document)
    }
}

/// A record: a JSON object whose `id` field equals its [`RecordId`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Record {
    id: RecordId,
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record holding only its id.
    pub fn new(id: impl Into<RecordId>) -> Self {
        let id = id.into();
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.0.clone()));
        Self { id, fields }
    }

    /// Build a record from a JSON object with a string `id` field.
    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let id = match value.get("id") {
            Some(Value::String(id)) => RecordId::new(id.clone()),
            _ if !value.is_object() => return Err(RecordError::NotAnObject(value_kind(&value))),
            _ => return Err(RecordError::MissingId),
        };
        Self::with_id(id, value)
    }

    /// Build a record for a known id. A missing `id` field is filled in;
    /// a conflicting one is rejected.
    pub fn with_id(id: RecordId, value: Value) -> Result<Self, RecordError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => return Err(RecordError::NotAnObject(value_kind(&other))),
        };
        match fields.get("id") {
            None => {
                fields.insert("id".to_string(), Value::String(id.0.clone()));
            }
            Some(Value::String(found)) if *found == id.0 => {}
            Some(found) => {
                return Err(RecordError::IdMismatch {
                    expected: id,
                    found: found.to_string(),
                })
            }
        }
        Ok(Self { id, fields })
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        self.id.type_name()
    }

    pub fn scope(&self) -> RecordScope {
        self.id.scope()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a nested value below the record root.
    pub fn get_at(&self, keys: &[PathKey]) -> Option<&Value> {
        let (first, rest) = keys.split_first()?;
        let child = self.fields.get(&first.to_string())?;
        resolve(child, rest).ok()
    }

    /// Set a top-level field. The `id` field is fixed and cannot be set.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if key != "id" {
            self.fields.insert(key, value.into());
        }
    }

    /// Builder form of [`Record::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        if key == "id" {
            return None;
        }
        self.fields.remove(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Record::from_value(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

/// Short name of a JSON value's kind, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
