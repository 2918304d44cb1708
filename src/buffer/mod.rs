//! Buffer manager: in-memory page cache with LRU eviction.
//!
//! The pager mediates every page access. Reads and writes both count as
//! use for recency; dirty pages are written back before eviction.

mod lru;
mod pager;

pub use lru::LruIndex;
pub use pager::Pager;
