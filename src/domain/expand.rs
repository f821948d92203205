//! Expansion policy: copy caller-selected record fields onto tree nodes.

use std::convert::Infallible;
use std::str::FromStr;

use tracing::trace;

use crate::domain::node::TreeNode;
use crate::domain::record::TreeRecord;

/// Ordered, duplicate-free set of field names to expand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandFields(Vec<String>);

impl ExpandFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field name unless it is already present or blank.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ExpandFields {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut fields = Self::new();
        for name in iter {
            fields.insert(name);
        }
        fields
    }
}

/// Parses a comma separated list, e.g. `"weight, color"`.
impl FromStr for ExpandFields {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.split(',').collect())
    }
}

/// Attach the requested fields of `record` to `node`.
///
/// Best-effort: fields the record cannot provide are skipped without error.
/// `None` or an empty set leaves the node untouched.
pub fn expand<T: TreeRecord + ?Sized>(
    mut node: TreeNode,
    record: &T,
    fields: Option<&ExpandFields>,
) -> TreeNode {
    let Some(fields) = fields else {
        return node;
    };
    for name in fields.iter() {
        match record.field(name) {
            Some(value) => {
                node.expanded.insert(name.to_string(), value);
            }
            None => trace!(code = %node.code, field = name, "expansion field not available"),
        }
    }
    node
}
