//! Entries are the JSON objects stored in a document's flat list.
//!
//! Records and templates share documents and are told apart by the `type`
//! discriminator. Everything else about an entry is an open bag of fields,
//! kept in insertion order so a fetched document is written back without
//! reordering.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ID_FIELD: &str = "id";
pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const TYPE_FIELD: &str = "type";
pub const TEMPLATE_TYPE: &str = "template";

pub const RECORD_ID_PREFIX: &str = "QCI";
pub const TEMPLATE_ID_PREFIX: &str = "TPL";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Record,
    Template,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entry(Map<String, Value>);

impl Entry {
    pub fn new(fields: Map<String, Value>) -> Self {
        Entry(fields)
    }

    /// Returns `None` unless `value` is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Entry(fields)),
            _ => None,
        }
    }

    /// The entry id; empty strings and non-string ids count as missing.
    pub fn id(&self) -> Option<&str> {
        self.get_str(ID_FIELD).filter(|id| !id.is_empty())
    }

    pub fn kind(&self) -> EntryKind {
        match self.get_str(TYPE_FIELD) {
            Some(TEMPLATE_TYPE) => EntryKind::Template,
            _ => EntryKind::Record,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Assigns a fresh id when the entry has none and returns the id in use.
    pub fn ensure_id(&mut self, prefix: &str) -> String {
        match self.id() {
            Some(id) => id.to_string(),
            None => {
                let id = new_id(prefix);
                self.insert(ID_FIELD, id.clone());
                id
            }
        }
    }

    /// Assigns the current time when the entry has no non-empty timestamp.
    pub fn ensure_timestamp(&mut self) -> String {
        match self.get_str(TIMESTAMP_FIELD).filter(|ts| !ts.is_empty()) {
            Some(ts) => ts.to_string(),
            None => {
                let ts = now_iso();
                self.insert(TIMESTAMP_FIELD, ts.clone());
                ts
            }
        }
    }
}

impl From<Entry> for Value {
    fn from(entry: Entry) -> Self {
        entry.into_value()
    }
}

/// `<prefix>-<epoch millis>-<6 uppercase alphanumerics>`
pub fn new_id(prefix: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("{prefix}-{}-{suffix}", Utc::now().timestamp_millis())
}

/// Current UTC time as ISO-8601 with millisecond precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
