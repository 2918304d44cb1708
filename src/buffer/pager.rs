//! The pager: cached, bounded access to every page.
//!
//! Nodes are handed out clone-on-fetch; the tree mutates its copy and
//! writes it back by id with [`Pager::put_page`]. The cache is the sole
//! owner of in-memory nodes, so eviction never has to account for
//! outstanding borrows.

use std::collections::HashMap;

use tracing::trace;

use crate::buffer::LruIndex;
use crate::error::{Result, StoreError};
use crate::page::{decode_node, encode_node, Node};
use crate::storage::{DiskManager, FreeList, Metadata};
use crate::types::PageId;

struct Frame {
    node: Node,
    dirty: bool,
}

/// Buffer manager over the database file
pub struct Pager {
    disk: DiskManager,
    frames: HashMap<PageId, Frame>,
    lru: LruIndex,
    free_list: FreeList,
    capacity: usize,
    max_page_id: u64,
}

impl Pager {
    /// Create a pager over an opened file.
    ///
    /// `free_list` and `max_page_id` come from the metadata record, or
    /// are empty/zero for a fresh database.
    pub fn new(disk: DiskManager, capacity: usize, free_list: FreeList, max_page_id: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            disk,
            frames: HashMap::with_capacity(capacity),
            lru: LruIndex::with_capacity(capacity),
            free_list,
            capacity,
            max_page_id,
        }
    }

    /// Page size of the underlying file
    pub fn page_size(&self) -> usize {
        self.disk.page_size()
    }

    /// Highest page id ever allocated
    pub fn max_page_id(&self) -> u64 {
        self.max_page_id
    }

    /// Snapshot of the free list for the metadata record
    pub fn free_ids(&self) -> Vec<u64> {
        self.free_list.to_ids()
    }

    /// Number of currently cached pages
    pub fn cached_count(&self) -> usize {
        self.frames.len()
    }

    /// Fetch the node stored at `page_id`.
    ///
    /// A hit refreshes recency and returns a copy of the cached node; a
    /// miss reads and decodes the page from disk, evicting the least
    /// recently used entry first if the cache is full. A page that
    /// fails to decode is never inserted.
    pub fn get_page(&mut self, page_id: PageId) -> Result<Node> {
        if page_id.is_null() || page_id.value() > self.max_page_id {
            return Err(StoreError::InvalidPageId(page_id.value()));
        }

        if let Some(frame) = self.frames.get(&page_id) {
            let node = frame.node.clone();
            self.lru.touch(page_id);
            return Ok(node);
        }

        let raw = self.disk.read_page(page_id)?;
        let node = decode_node(&raw, page_id)?;

        self.make_room()?;
        self.frames.insert(
            node.page_id,
            Frame {
                node: node.clone(),
                dirty: false,
            },
        );
        self.lru.touch(page_id);
        Ok(node)
    }

    /// Write `node` back into the cache and mark it dirty.
    ///
    /// Replacing an existing entry keeps it dirty; inserting a fresh
    /// entry may evict the least recently used page first.
    pub fn put_page(&mut self, node: Node) -> Result<()> {
        let page_id = node.page_id;
        if page_id.is_null() || page_id.value() > self.max_page_id {
            return Err(StoreError::InvalidPageId(page_id.value()));
        }

        if let Some(frame) = self.frames.get_mut(&page_id) {
            frame.node = node;
            frame.dirty = true;
        } else {
            self.make_room()?;
            self.frames.insert(page_id, Frame { node, dirty: true });
        }
        self.lru.touch(page_id);
        Ok(())
    }

    /// Hand out a fresh page id: the oldest freed id, or one past the
    /// current high-water mark. The sole source of new ids.
    pub fn allocate_page(&mut self) -> PageId {
        match self.free_list.pop() {
            Some(id) => id,
            None => {
                self.max_page_id += 1;
                PageId::new(self.max_page_id)
            }
        }
    }

    /// Return `page_id` to the free list, dropping any cached copy
    /// without writing it back.
    pub fn free_page(&mut self, page_id: PageId) {
        self.frames.remove(&page_id);
        self.lru.remove(page_id);
        self.free_list.push(page_id);
    }

    /// Write every dirty page to disk, clear the cache, and sync.
    pub fn flush(&mut self) -> Result<()> {
        while let Some(page_id) = self.lru.lru() {
            self.write_back(page_id)?;
            self.frames.remove(&page_id);
            self.lru.remove(page_id);
        }
        debug_assert!(self.frames.is_empty());
        self.disk.sync()?;
        Ok(())
    }

    /// Persist the metadata record.
    pub fn write_metadata(&mut self, metadata: &Metadata) -> Result<()> {
        self.disk.write_metadata(metadata)?;
        self.disk.sync()
    }

    /// Evict until one more frame fits.
    fn make_room(&mut self) -> Result<()> {
        while self.frames.len() >= self.capacity {
            let victim = match self.lru.lru() {
                Some(id) => id,
                None => break,
            };
            trace!(page_id = victim.value(), "evicting page");
            self.write_back(victim)?;
            self.frames.remove(&victim);
            self.lru.remove(victim);
        }
        Ok(())
    }

    /// Write `page_id` to disk if its frame is dirty. The frame stays
    /// cached (and stays dirty) if the write fails, so an I/O error
    /// leaves the cache consistent.
    fn write_back(&mut self, page_id: PageId) -> Result<()> {
        let frame = match self.frames.get(&page_id) {
            Some(frame) if frame.dirty => frame,
            _ => return Ok(()),
        };
        let raw = encode_node(&frame.node, self.disk.page_size())?;
        self.disk.write_page(page_id, &raw)?;
        if let Some(frame) = self.frames.get_mut(&page_id) {
            frame.dirty = false;
        }
        Ok(())
    }
}
