// transport/wire.rs - Bulk summary wire format
//
// Request: JSON array of instance ids.
// Response: {"data": {"<id>": <entry>}} where each entry is either a summary
// ({"name", "fields", "types", "space"}) or {"error": {"message": ...}}.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Body of a bulk summary response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub data: HashMap<String, SummarySlot>,
}

impl SummaryResponse {
    pub fn insert(&mut self, id: impl Into<String>, entry: SummaryEntry) {
        self.data.insert(id.into(), SummarySlot::Entry(entry));
    }

    /// Raw slot for `id`, well-formed or not
    pub fn slot(&self, id: &str) -> Option<&SummarySlot> {
        self.data.get(id)
    }

    /// Well-formed entry for `id`
    pub fn entry(&self, id: &str) -> Option<&SummaryEntry> {
        self.slot(id).and_then(SummarySlot::as_entry)
    }
}

/// One id's value under `data`. Entries are parsed independently so a
/// null or malformed entry only affects its own id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummarySlot {
    Entry(SummaryEntry),
    Malformed(Value),
}

impl SummarySlot {
    pub fn as_entry(&self) -> Option<&SummaryEntry> {
        match self {
            SummarySlot::Entry(entry) => Some(entry),
            SummarySlot::Malformed(_) => None,
        }
    }

    /// `null` counts as no entry at all
    pub fn is_null(&self) -> bool {
        matches!(self, SummarySlot::Malformed(Value::Null))
    }
}

/// Per-instance entry of a summary response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SummaryError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<SummaryFields>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<InstanceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
}

impl SummaryEntry {
    /// Fields of the entry; anything other than a field map counts as none
    pub fn field_map(&self) -> IndexMap<String, FieldDescriptor> {
        match &self.fields {
            Some(SummaryFields::Map(fields)) => fields.clone(),
            _ => IndexMap::new(),
        }
    }
}

/// Backends occasionally send `fields` as something other than an object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SummaryFields {
    Map(IndexMap<String, FieldDescriptor>),
    Other(Value),
}

/// Error payload attached to a single id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryError {
    #[serde(default)]
    pub message: Value,
}

impl SummaryError {
    /// Human-readable message. Non-string messages are rendered as compact JSON.
    pub fn render(&self) -> String {
        match &self.message {
            Value::String(message) => message.clone(),
            Value::Null => "Unknown error".to_string(),
            other => other.to_string(),
        }
    }
}

/// A single displayable field of an instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            extra: serde_json::Map::new(),
        }
    }
}

/// Type of an instance as reported by the summary endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}
