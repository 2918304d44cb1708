//! B+ tree implementation.
//!
//! Point lookups, inserts with upward split propagation, and deletes
//! with redistribute/coalesce and root adjustment. All page access
//! goes through the pager.

mod search;
mod tree;

pub use search::find_last_leq;
pub use tree::{BPlusTree, Status};
