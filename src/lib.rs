//! Build nested trees from flat, parent-referencing records.
//!
//! The core lives in [`domain`]: a record type implements [`domain::TreeRecord`],
//! a [`domain::RecordSource`] supplies the records as an async stream, and
//! [`domain::TreeBuilder`] streams back fully resolved [`domain::TreeNode`]
//! subtrees with per-record failures reported alongside.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
