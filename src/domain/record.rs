//! Record capability contract: the reads a record type must support to take part
//! in tree building.

use std::fmt::Debug;
use std::hash::Hash;

use serde::Serialize;
use serde_json::Value;

/// Minimal read-only view of a parent-referencing record.
///
/// Implemented once per concrete record type. All reads must be deterministic
/// and free of side effects; the builder may call them several times per build.
pub trait TreeRecord {
    /// Identifier type shared by `id` and `superior_id`, compared by value.
    type Id: Clone + Eq + Hash + Debug + Send + Sync;

    /// Identifier of this record. `None` means it cannot be read, which
    /// excludes the record from any tree.
    fn id(&self) -> Option<Self::Id>;

    /// Display label; absent names are allowed.
    fn name(&self) -> Option<&str>;

    /// Short external key, becomes the node code. Must be present and non-empty.
    fn code(&self) -> Option<&str>;

    /// Identifier of the parent record, `None` for root-level records.
    fn superior_id(&self) -> Option<Self::Id>;

    /// Generic read of a named field, used for expansion.
    ///
    /// Returns `None` when the field does not exist or cannot be read.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Look up a top-level field of any serializable value by name.
///
/// Serializes `value` to a JSON object and returns the named member. Anything
/// that does not serialize to an object yields `None`.
pub fn serialized_field<S: Serialize + ?Sized>(value: &S, name: &str) -> Option<Value> {
    match serde_json::to_value(value).ok()? {
        Value::Object(mut map) => map.remove(name),
        _ => None,
    }
}

/// Human readable label for error messages: code, then name, then id.
pub fn record_label<T: TreeRecord + ?Sized>(record: &T) -> String {
    if let Some(code) = record.code().filter(|c| !c.is_empty()) {
        return code.to_string();
    }
    if let Some(name) = record.name() {
        return name.to_string();
    }
    match record.id() {
        Some(id) => format!("{:?}", id),
        None => "<unidentified>".to_string(),
    }
}
