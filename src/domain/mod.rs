//! Domain layer: record contract, tree building and the produced nodes
//!
//! This layer is independent of external concerns (no file I/O, no CLI, no config loading).

pub mod builder;
pub mod entities;
pub mod error;
pub mod expand;
pub mod membership;
pub mod node;
pub mod record;
pub mod source;

pub use builder::{BuildOptions, CancellationToken, TreeBuild, TreeBuilder, MAX_DEPTH_LIMIT};
pub use entities::{FlatRecord, RecordId};
pub use error::{TreeError, TreeResult};
pub use expand::{expand, ExpandFields};
pub use membership::is_child_of;
pub use node::TreeNode;
pub use record::{record_label, serialized_field, TreeRecord};
pub use source::{IndexedSource, RecordSource};
