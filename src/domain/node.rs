//! Output tree node and post-processing helpers.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use termtree::Tree;

/// A fully assembled node of the produced tree.
///
/// Nodes handed out by the builder are complete: children resolved and
/// expansion applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Stable key copied from the record code
    pub code: String,
    /// Display label of the record
    pub name: Option<String>,
    /// Name of the immediate parent, None for a root node
    pub superior: Option<String>,
    /// Direct children in scan order unless sorted afterwards
    #[serde(default)]
    pub children: Vec<TreeNode>,
    /// Caller-requested extra fields, in request order
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub expanded: Map<String, Value>,
}

impl TreeNode {
    pub fn new(code: impl Into<String>, name: Option<String>) -> Self {
        Self {
            code: code.into(),
            name,
            superior: None,
            children: Vec::new(),
            expanded: Map::new(),
        }
    }

    pub fn with_superior(mut self, superior: Option<String>) -> Self {
        self.superior = superior;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of levels in this subtree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(TreeNode::depth).max().unwrap_or(0)
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }

    /// Codes of this node and all descendants, depth-first pre-order.
    pub fn codes(&self) -> Vec<&str> {
        let mut out = vec![self.code.as_str()];
        for child in &self.children {
            out.extend(child.codes());
        }
        out
    }

    /// Find a node by code in this subtree.
    pub fn find(&self, code: &str) -> Option<&TreeNode> {
        if self.code == code {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(code))
    }

    /// Recursively sort children with the given comparator.
    pub fn sort_by<F>(&mut self, compare: &F)
    where
        F: Fn(&TreeNode, &TreeNode) -> Ordering,
    {
        self.children.sort_by(compare);
        for child in &mut self.children {
            child.sort_by(compare);
        }
    }

    /// Recursively sort by name; unnamed nodes go last, ties broken by code.
    pub fn sort_by_name(&mut self) {
        self.sort_by(&|a: &TreeNode, b: &TreeNode| match (&a.name, &b.name) {
            (Some(x), Some(y)) => x.cmp(y).then_with(|| a.code.cmp(&b.code)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.code.cmp(&b.code),
        });
    }

    /// Recursively sort by code.
    pub fn sort_by_code(&mut self) {
        self.sort_by(&|a: &TreeNode, b: &TreeNode| a.code.cmp(&b.code));
    }

    /// Render the subtree for terminal display.
    pub fn to_tree_string(&self) -> Tree<String> {
        let leaves: Vec<_> = self.children.iter().map(|c| c.to_tree_string()).collect();
        Tree::new(self.to_string()).with_leaves(leaves)
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.code, name)?,
            None => write!(f, "{}", self.code)?,
        }
        if !self.expanded.is_empty() {
            let fields: Vec<String> = self
                .expanded
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, " [{}]", fields.join(", "))?;
        }
        Ok(())
    }
}
