//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Failures raised while turning flat records into a tree.
///
/// All variants except `Cancelled` are scoped to a single record or subtree:
/// the builder reports them and keeps going with unrelated siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("record has no readable id: {record}")]
    MissingId { record: String },

    #[error("record has no readable code: {record}")]
    MissingCode { record: String },

    #[error("cycle detected in hierarchy at: {code}")]
    CycleDetected { code: String },

    #[error("maximum depth {max_depth} exceeded at: {code}")]
    DepthExceeded { code: String, max_depth: usize },

    #[error("tree build cancelled")]
    Cancelled,
}

impl TreeError {
    /// Record could not be read (id or code missing).
    pub fn is_access(&self) -> bool {
        matches!(self, Self::MissingId { .. } | Self::MissingCode { .. })
    }

    /// Parent/child chain is malformed (cycle or runaway depth).
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::CycleDetected { .. } | Self::DepthExceeded { .. })
    }
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
