//! Domain entities: the concrete flat record used by the service and CLI layers

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::record::TreeRecord;

/// Record identifier as found in JSON input: integer or text.
///
/// Compared by value and variant, so `1` and `"1"` are different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{}", i),
            RecordId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Int(value)
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        RecordId::Int(i64::from(value))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::Text(value)
    }
}

/// A flat, parent-referencing record.
///
/// Keys other than `id`, `name`, `code` and `superiorId` are kept in `extra`
/// and are available for expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRecord {
    #[serde(default)]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "superior")]
    pub superior_id: Option<RecordId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlatRecord {
    pub fn new(id: impl Into<RecordId>, code: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
            code: Some(code.into()),
            superior_id: None,
            extra: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_superior(mut self, superior: impl Into<RecordId>) -> Self {
        self.superior_id = Some(superior.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn is_root(&self) -> bool {
        self.superior_id.is_none()
    }
}

fn id_value(id: Option<&RecordId>) -> Value {
    match id {
        Some(RecordId::Int(i)) => Value::from(*i),
        Some(RecordId::Text(s)) => Value::from(s.as_str()),
        None => Value::Null,
    }
}

fn text_value(text: Option<&str>) -> Value {
    text.map_or(Value::Null, Value::from)
}

impl TreeRecord for FlatRecord {
    type Id = RecordId;

    fn id(&self) -> Option<RecordId> {
        self.id.clone()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    fn superior_id(&self) -> Option<RecordId> {
        self.superior_id.clone()
    }

    fn field(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.extra.get(name) {
            return Some(value.clone());
        }
        match name {
            "id" => Some(id_value(self.id.as_ref())),
            "name" => Some(text_value(self.name.as_deref())),
            "code" => Some(text_value(self.code.as_deref())),
            "superiorId" => Some(id_value(self.superior_id.as_ref())),
            _ => None,
        }
    }
}
