//! # bplus-store
//!
//! A single-file, disk-backed, ordered key-value store indexed by a
//! B+ tree. Keys are `i32`; values are byte strings.
//!
//! ## Architecture
//!
//! - **Page layer** (`page`): the node representation and its on-disk
//!   codec.
//! - **Storage layer** (`storage`): the database file, the 16 KiB
//!   metadata header, and the free list.
//! - **Buffer manager** (`buffer`): bounded LRU page cache with dirty
//!   write-back; all disk traffic goes through it.
//! - **Tree layer** (`btree`): lookup, insert and delete with split,
//!   redistribute, coalesce and root adjustment.
//!
//! The API is single-writer and single-threaded; every operation
//! completes before the next begins, and durability is best-effort
//! (dirty pages are flushed on [`Db::close`], not per operation).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bplus_store::{Config, Db};
//!
//! let mut db = Db::open(Config::new("my_database.db"))?;
//! db.insert(1, b"hello")?;
//! assert_eq!(db.get(1)?, Some(b"hello".to_vec()));
//! db.delete(1)?;
//! db.close()?;
//! ```

pub mod btree;
pub mod buffer;
pub mod error;
pub mod page;
pub mod storage;
pub mod types;

pub use btree::{BPlusTree, Status};
pub use error::{Result, StoreError};
pub use types::{PageId, DEFAULT_CACHE_CAPACITY, DEFAULT_PAGE_SIZE};

use std::path::PathBuf;

/// Database configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the database file
    pub path: PathBuf,
    /// Page size in bytes, applied when the file is created
    pub page_size: usize,
    /// Page cache capacity in number of pages
    pub cache_capacity: usize,
}

impl Config {
    /// Create a new configuration with default settings
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Set the page size used when creating a new database file.
    /// Ignored when opening an existing file, which keeps its own.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Set the page cache capacity
    pub fn cache_capacity(mut self, pages: usize) -> Self {
        self.cache_capacity = pages;
        self
    }
}

/// Main database handle
///
/// Wraps the B+ tree behind the store's public operations. One handle
/// owns the file; mutation goes through `&mut self`.
pub struct Db {
    tree: BPlusTree,
}

impl Db {
    /// Open or create a database at the configured path
    pub fn open(config: Config) -> Result<Self> {
        let tree = BPlusTree::open(&config.path, config.page_size, config.cache_capacity)?;
        Ok(Self { tree })
    }

    /// Insert or overwrite the value stored under `key`
    pub fn insert(&mut self, key: i32, value: &[u8]) -> Result<()> {
        self.tree.insert(key, value)
    }

    /// Get the value stored under `key`, or `None` if absent
    pub fn get(&mut self, key: i32) -> Result<Option<Vec<u8>>> {
        self.tree.get(key)
    }

    /// Delete the record under `key`
    ///
    /// Returns `true` iff a record was removed.
    pub fn delete(&mut self, key: i32) -> Result<bool> {
        self.tree.delete(key)
    }

    /// Report tree statistics
    pub fn status(&mut self) -> Result<Status> {
        self.tree.status()
    }

    /// Write all dirty pages and the metadata header to disk
    pub fn flush(&mut self) -> Result<()> {
        self.tree.flush()
    }

    /// Flush and close the database
    pub fn close(self) -> Result<()> {
        self.tree.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_basic_operations() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut db = Db::open(Config::new(&path))?;

        db.insert(1, b"value1")?;
        assert_eq!(db.get(1)?, Some(b"value1".to_vec()));

        // Overwrite
        db.insert(1, b"value2")?;
        assert_eq!(db.get(1)?, Some(b"value2".to_vec()));

        // Delete
        assert!(db.delete(1)?);
        assert_eq!(db.get(1)?, None);
        assert!(!db.delete(1)?);

        db.close()?;
        Ok(())
    }

    #[test]
    fn test_end_to_end_scenario() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut db = Db::open(Config::new(&path).cache_capacity(100))?;
            db.insert(1, b"a")?;
            db.insert(2, b"b")?;
            assert_eq!(db.get(1)?, Some(b"a".to_vec()));
            assert_eq!(db.get(2)?, Some(b"b".to_vec()));
            assert_eq!(db.get(3)?, None);
            db.close()?;
        }

        // Reopening sees the same records.
        let mut db = Db::open(Config::new(&path))?;
        assert_eq!(db.get(1)?, Some(b"a".to_vec()));
        assert_eq!(db.get(2)?, Some(b"b".to_vec()));
        db.close()?;
        Ok(())
    }

    #[test]
    fn test_status_smoke() -> Result<()> {
        let dir = tempdir().unwrap();
        let mut db = Db::open(Config::new(dir.path().join("test.db")))?;
        for key in 0..100 {
            db.insert(key, b"some bytes")?;
        }
        let status = db.status()?;
        assert_eq!(status.page_size, DEFAULT_PAGE_SIZE);
        assert!(status.node_count >= 1);
        Ok(())
    }
}
