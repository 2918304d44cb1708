//! B+ tree core implementation.
//!
//! The tree owns the pager and delegates all page I/O to it. Nodes are
//! fetched by id, mutated locally, and written back; structural
//! mutations (split, coalesce, redistribute, root collapse) bubble
//! toward the root one parent fetch at a time.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::btree::find_last_leq;
use crate::buffer::Pager;
use crate::error::{Result, StoreError};
use crate::page::{Node, Value, NODE_HEADER_SIZE};
use crate::storage::{DiskManager, FreeList, Metadata};
use crate::types::{merge_threshold, varint_len, PageId, MIN_PAGE_SIZE};

/// Snapshot of tree statistics, as reported by [`BPlusTree::status`]
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub page_size: usize,
    pub root_page_id: u64,
    pub height: u32,
    pub node_count: u64,
    pub split_count: u64,
    pub merge_count: u64,
    /// Unused bytes across all leaf pages over total leaf bytes on disk
    pub fill_rate: f64,
}

/// A disk-backed B+ tree over `i32` keys and byte-string values
pub struct BPlusTree {
    pager: Pager,
    root_page_id: PageId,
    page_size: usize,
    merge_size: usize,
    height: u32,
    node_count: u64,
    split_count: u64,
    merge_count: u64,
    fill_rate: f64,
    filename: String,
}

impl BPlusTree {
    /// Open an existing database file or create a new one.
    ///
    /// `page_size` applies only on creation; an existing file keeps the
    /// page size stored in its metadata. A fresh database starts as a
    /// single empty leaf root and persists its header immediately.
    pub fn open(path: &Path, page_size: usize, cache_capacity: usize) -> Result<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(StoreError::InvalidPageSize(page_size));
        }
        let (disk, metadata) = DiskManager::open(path, page_size)?;
        let filename = path.display().to_string();

        match metadata {
            Some(meta) => {
                let pager = Pager::new(
                    disk,
                    cache_capacity,
                    FreeList::from_ids(&meta.empty_page_ids),
                    meta.max_page_id,
                );
                Ok(Self {
                    pager,
                    root_page_id: PageId::new(meta.root_page_id),
                    page_size: meta.page_size as usize,
                    merge_size: merge_threshold(meta.page_size as usize),
                    height: meta.height,
                    node_count: meta.node_count,
                    split_count: meta.split_count,
                    merge_count: meta.merge_count,
                    fill_rate: meta.fill_rate,
                    filename,
                })
            }
            None => {
                let mut pager = Pager::new(disk, cache_capacity, FreeList::new(), 0);
                let root_id = pager.allocate_page();
                pager.put_page(Node::new_leaf(root_id))?;

                let mut tree = Self {
                    pager,
                    root_page_id: root_id,
                    page_size,
                    merge_size: merge_threshold(page_size),
                    height: 1,
                    node_count: 1,
                    split_count: 0,
                    merge_count: 0,
                    fill_rate: 0.0,
                    filename,
                };
                tree.pager.flush()?;
                tree.write_metadata()?;
                Ok(tree)
            }
        }
    }

    /// Page id of the current root
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Levels from root to leaf inclusive
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total splits performed over the life of the database
    pub fn split_count(&self) -> u64 {
        self.split_count
    }

    /// Total coalesces performed over the life of the database
    pub fn merge_count(&self) -> u64 {
        self.merge_count
    }

    /// Look up the value stored under `key`.
    pub fn get(&mut self, key: i32) -> Result<Option<Vec<u8>>> {
        let mut node = self.pager.get_page(self.root_page_id)?;
        loop {
            let index = match find_last_leq(&node.keys, key) {
                Some(index) => index,
                // Below the smallest key in this subtree.
                None => return Ok(None),
            };
            if node.is_leaf {
                if node.keys[index] == key {
                    return Ok(Some(node.payload(index)?.to_vec()));
                }
                return Ok(None);
            }
            node = self.pager.get_page(node.child(index)?)?;
        }
    }

    /// Insert `value` under `key`, overwriting any existing value.
    pub fn insert(&mut self, key: i32, value: &[u8]) -> Result<()> {
        let single_record = NODE_HEADER_SIZE + 4 + varint_len(value.len() as u64) + value.len();
        if single_record > self.page_size {
            return Err(StoreError::ValueTooLarge {
                size: value.len(),
                max: self.page_size - NODE_HEADER_SIZE - 4 - varint_len(value.len() as u64),
            });
        }

        let mut node = self.pager.get_page(self.root_page_id)?;
        while !node.is_leaf {
            // A key below the subtree minimum descends leftmost; the
            // routing keys are corrected after the insert lands.
            let index = find_last_leq(&node.keys, key).unwrap_or(0);
            node = self.pager.get_page(node.child(index)?)?;
        }

        match find_last_leq(&node.keys, key) {
            Some(index) if node.keys[index] == key => {
                node.values[index] = Value::Bytes(value.to_vec());
                self.pager.put_page(node.clone())?;
            }
            position => {
                let at = position.map_or(0, |i| i + 1);
                node.insert_record(at, key, Value::Bytes(value.to_vec()));
                self.pager.put_page(node.clone())?;
                if at == 0 && !node.is_root() {
                    self.update_routing_keys(&node)?;
                }
            }
        }

        while node.encoded_size() > self.page_size {
            node = self.split_node(node)?;
        }
        Ok(())
    }

    /// Remove the record stored under `key`.
    ///
    /// Returns `true` iff a record was removed.
    pub fn delete(&mut self, key: i32) -> Result<bool> {
        let mut node = self.pager.get_page(self.root_page_id)?;
        while !node.is_leaf {
            let index = match find_last_leq(&node.keys, key) {
                Some(index) => index,
                None => return Ok(false),
            };
            node = self.pager.get_page(node.child(index)?)?;
        }

        let index = match find_last_leq(&node.keys, key) {
            Some(index) if node.keys[index] == key => index,
            _ => return Ok(false),
        };

        node.remove_record(index);
        self.pager.put_page(node.clone())?;

        if index == 0 && !node.is_empty() && !node.is_root() {
            self.update_routing_keys(&node)?;
        }

        // The root leaf may shrink to empty; everything else must stay
        // half full.
        if !node.is_root() && node.encoded_size() < self.merge_size {
            self.coalesce_or_redistribute(node)?;
        }
        Ok(true)
    }

    /// Report tree statistics, recomputing the fill rate by walking the
    /// leaf chain.
    pub fn status(&mut self) -> Result<Status> {
        let mut node = self.pager.get_page(self.root_page_id)?;
        while !node.is_leaf {
            node = self.pager.get_page(node.child(0)?)?;
        }

        let mut unused_bytes = 0u64;
        let mut leaf_count = 0u64;
        loop {
            unused_bytes += (self.page_size - node.encoded_size()) as u64;
            leaf_count += 1;
            if node.next_id.is_null() {
                break;
            }
            node = self.pager.get_page(node.next_id)?;
        }

        let fill_rate = unused_bytes as f64 / (leaf_count * self.page_size as u64) as f64;
        self.fill_rate = (fill_rate * 10000.0).round() / 10000.0;

        Ok(Status {
            page_size: self.page_size,
            root_page_id: self.root_page_id.value(),
            height: self.height,
            node_count: self.node_count,
            split_count: self.split_count,
            merge_count: self.merge_count,
            fill_rate: self.fill_rate,
        })
    }

    /// Write all dirty pages and refresh the metadata header.
    pub fn flush(&mut self) -> Result<()> {
        self.pager.flush()?;
        self.write_metadata()
    }

    /// Flush and release the database file.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        info!(file = %self.filename, "closed database");
        Ok(())
    }

    fn write_metadata(&mut self) -> Result<()> {
        let metadata = Metadata {
            root_page_id: self.root_page_id.value(),
            page_size: self.page_size as u32,
            fill_rate: self.fill_rate,
            height: self.height,
            node_count: self.node_count,
            split_count: self.split_count,
            merge_count: self.merge_count,
            max_page_id: self.pager.max_page_id(),
            empty_page_ids: self.pager.free_ids(),
            filename: self.filename.clone(),
        };
        self.pager.write_metadata(&metadata)
    }

    /// Split an overfull node, returning its parent (which may itself
    /// now be overfull).
    fn split_node(&mut self, mut node: Node) -> Result<Node> {
        let mid = node.keys.len() / 2;
        let right_id = self.pager.allocate_page();
        self.node_count += 1;

        let mut right = if node.is_leaf {
            Node::new_leaf(right_id)
        } else {
            Node::new_internal(right_id)
        };
        right.keys = node.keys.split_off(mid);
        right.values = node.values.split_off(mid);
        right.prev_id = node.page_id;
        right.next_id = node.next_id;

        let was_root = node.is_root();
        let mut parent = if was_root {
            let parent_id = self.pager.allocate_page();
            self.node_count += 1;
            Node::new_internal(parent_id)
        } else {
            self.pager.get_page(node.parent_id)?
        };

        if parent.is_empty() {
            parent.keys = vec![node.keys[0], right.keys[0]];
            parent.values = vec![Value::Child(node.page_id), Value::Child(right_id)];
        } else {
            let at = find_last_leq(&parent.keys, right.keys[0]).map_or(0, |i| i + 1);
            parent.insert_record(at, right.keys[0], Value::Child(right_id));
        }

        // Stitch the sibling chain around the new node.
        if !right.next_id.is_null() {
            let mut neighbor = self.pager.get_page(right.next_id)?;
            neighbor.prev_id = right_id;
            self.pager.put_page(neighbor)?;
        }
        node.next_id = right_id;
        node.parent_id = parent.page_id;
        right.parent_id = parent.page_id;

        // Children handed to the right sibling get a new parent.
        if !right.is_leaf {
            for i in 0..right.record_count() {
                let child_id = right.child(i)?;
                let mut child = self.pager.get_page(child_id)?;
                child.parent_id = right_id;
                self.pager.put_page(child)?;
            }
        }

        if was_root {
            self.root_page_id = parent.page_id;
            self.height += 1;
        }

        debug!(
            left = node.page_id.value(),
            right = right_id.value(),
            parent = parent.page_id.value(),
            new_root = was_root,
            "split node"
        );

        self.pager.put_page(node)?;
        self.pager.put_page(right)?;
        self.pager.put_page(parent.clone())?;
        self.split_count += 1;
        Ok(parent)
    }

    /// Restore the half-full invariant for an underfull non-root node.
    fn coalesce_or_redistribute(&mut self, node: Node) -> Result<()> {
        let (sibling, sibling_is_left) = match self.pick_sibling(&node)? {
            Some(found) => found,
            // No same-parent sibling: the tree is already minimal here.
            None => return Ok(()),
        };

        if node.encoded_size() + sibling.encoded_size() <= self.page_size {
            self.coalesce(node, sibling, sibling_is_left)
        } else {
            self.redistribute(node, sibling, sibling_is_left)
        }
    }

    /// A sibling sharing `node`'s parent, preferring the left one.
    fn pick_sibling(&mut self, node: &Node) -> Result<Option<(Node, bool)>> {
        if !node.prev_id.is_null() {
            let prev = self.pager.get_page(node.prev_id)?;
            if prev.parent_id == node.parent_id {
                return Ok(Some((prev, true)));
            }
        }
        if !node.next_id.is_null() {
            let next = self.pager.get_page(node.next_id)?;
            if next.parent_id == node.parent_id {
                return Ok(Some((next, false)));
            }
        }
        Ok(None)
    }

    /// Merge `node` with its sibling, freeing the right page of the
    /// pair, then fix up the parent.
    fn coalesce(&mut self, node: Node, sibling: Node, sibling_is_left: bool) -> Result<()> {
        let (mut left, mut right) = if sibling_is_left {
            (sibling, node)
        } else {
            (node, sibling)
        };
        if left.parent_id != right.parent_id {
            return Err(StoreError::invariant(format!(
                "coalescing pages {} and {} with different parents",
                left.page_id, right.page_id
            )));
        }

        debug!(
            left = left.page_id.value(),
            right = right.page_id.value(),
            "coalescing nodes"
        );

        let absorbed_children: Vec<PageId> = if right.is_leaf {
            Vec::new()
        } else {
            (0..right.record_count())
                .map(|i| right.child(i))
                .collect::<Result<_>>()?
        };

        left.keys.append(&mut right.keys);
        left.values.append(&mut right.values);
        left.next_id = right.next_id;
        if !left.next_id.is_null() {
            let mut neighbor = self.pager.get_page(left.next_id)?;
            neighbor.prev_id = left.page_id;
            self.pager.put_page(neighbor)?;
        }
        for child_id in absorbed_children {
            let mut child = self.pager.get_page(child_id)?;
            child.parent_id = left.page_id;
            self.pager.put_page(child)?;
        }

        let right_id = right.page_id;
        let parent_id = left.parent_id;
        self.pager.put_page(left.clone())?;
        self.pager.free_page(right_id);
        self.node_count -= 1;
        self.merge_count += 1;

        let mut parent = self.pager.get_page(parent_id)?;
        let position = parent.position_of_child(right_id).ok_or_else(|| {
            StoreError::invariant(format!(
                "parent {} has no routing entry for merged page {}",
                parent_id, right_id
            ))
        })?;
        parent.remove_record(position);
        self.pager.put_page(parent)?;

        // The merge may have lowered the left node's minimum (the right
        // node of the pair survives in it); keep routing keys exact.
        // Re-fetch the parent afterwards: the fix-up may have rewritten
        // one of its routing keys.
        self.update_routing_keys(&left)?;
        let parent = self.pager.get_page(parent_id)?;

        if parent.is_root() {
            self.adjust_root(parent)
        } else if parent.encoded_size() < self.merge_size {
            self.coalesce_or_redistribute(parent)
        } else {
            Ok(())
        }
    }

    /// Move records from `sibling` into `node` until the half-full
    /// invariant holds again, updating the routing key of whichever
    /// node's minimum changed. Fails with `InvariantViolation` when no
    /// sequence of boundary moves can restore the bound.
    fn redistribute(&mut self, mut node: Node, mut sibling: Node, sibling_is_left: bool) -> Result<()> {
        let mut parent = self.pager.get_page(node.parent_id)?;
        let mut moved_children: Vec<PageId> = Vec::new();
        let mut moved = 0usize;

        while node.encoded_size() < self.merge_size && sibling.record_count() > 1 {
            let take = if sibling_is_left {
                sibling.record_count() - 1
            } else {
                0
            };
            let record_size = 4 + sibling.values[take].encoded_size();
            if node.encoded_size() + record_size > self.page_size
                || sibling.encoded_size() - record_size < self.merge_size
            {
                break;
            }

            let (key, value) = sibling.remove_record(take);
            if let Value::Child(child_id) = &value {
                moved_children.push(*child_id);
            }
            if sibling_is_left {
                node.insert_record(0, key, value);
            } else {
                let at = node.record_count();
                node.insert_record(at, key, value);
            }
            moved += 1;
        }

        debug!(
            node = node.page_id.value(),
            sibling = sibling.page_id.value(),
            moved,
            "redistributed records"
        );

        if moved > 0 {
            // Whichever node lost or gained a head record has a new
            // minimum; its routing key follows.
            let changed = if sibling_is_left { &node } else { &sibling };
            let position = parent.position_of_child(changed.page_id).ok_or_else(|| {
                StoreError::invariant(format!(
                    "parent {} has no routing entry for page {}",
                    parent.page_id, changed.page_id
                ))
            })?;
            parent.keys[position] = changed.keys[0];

            for child_id in &moved_children {
                let mut child = self.pager.get_page(*child_id)?;
                child.parent_id = node.page_id;
                self.pager.put_page(child)?;
            }
        }

        let node_id = node.page_id;
        let final_size = node.encoded_size();
        self.pager.put_page(node)?;
        self.pager.put_page(sibling)?;
        self.pager.put_page(parent)?;

        // The loop can stall when the only donor record adjacent to the
        // shared boundary is too large to move; a node left below the
        // half-full bound is surfaced, never swallowed.
        if final_size < self.merge_size {
            return Err(StoreError::invariant(format!(
                "page {} still below the half-full threshold after redistribute ({} < {})",
                node_id, final_size, self.merge_size
            )));
        }
        Ok(())
    }

    /// Collapse a single-child internal root into its child, keeping
    /// the root's own page id stable.
    fn adjust_root(&mut self, mut root: Node) -> Result<()> {
        while !root.is_leaf && root.record_count() == 1 {
            let child_id = root.child(0)?;
            let child = self.pager.get_page(child_id)?;

            debug!(
                root = root.page_id.value(),
                child = child_id.value(),
                "collapsing root into its single child"
            );

            root.is_leaf = child.is_leaf;
            root.prev_id = child.prev_id;
            root.next_id = child.next_id;
            root.keys = child.keys;
            root.values = child.values;

            if !root.is_leaf {
                for i in 0..root.record_count() {
                    let grandchild_id = root.child(i)?;
                    let mut grandchild = self.pager.get_page(grandchild_id)?;
                    grandchild.parent_id = root.page_id;
                    self.pager.put_page(grandchild)?;
                }
            }

            self.pager.free_page(child_id);
            self.node_count -= 1;
            self.height -= 1;
            self.pager.put_page(root.clone())?;
        }
        Ok(())
    }

    /// Propagate a changed subtree minimum up the parent chain so that
    /// every routing key equals the minimum key of its child.
    fn update_routing_keys(&mut self, start: &Node) -> Result<()> {
        if start.is_empty() {
            return Ok(());
        }
        let mut child_id = start.page_id;
        let mut child_min = start.keys[0];
        let mut parent_id = start.parent_id;

        while !parent_id.is_null() {
            let mut parent = self.pager.get_page(parent_id)?;
            let position = parent.position_of_child(child_id).ok_or_else(|| {
                StoreError::invariant(format!(
                    "parent {} has no routing entry for page {}",
                    parent_id, child_id
                ))
            })?;
            if parent.keys[position] == child_min {
                break;
            }
            parent.keys[position] = child_min;
            self.pager.put_page(parent.clone())?;
            if position != 0 {
                break;
            }
            child_id = parent.page_id;
            child_min = parent.keys[0];
            parent_id = parent.parent_id;
        }
        Ok(())
    }
}
