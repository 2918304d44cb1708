//! Recency tracking for the page cache.
//!
//! An intrusive doubly linked list over a slot vector, with a map from
//! page id to slot, so touch, remove and pop are all O(1). This tracks
//! order only; the cached nodes themselves live in the pager's frame
//! map.

use std::collections::HashMap;

use crate::types::PageId;

/// LRU ordering over a set of page ids
#[derive(Debug, Default)]
pub struct LruIndex {
    slot_of: HashMap<PageId, usize>,
    links: Vec<Link>,
    head: Option<usize>,
    tail: Option<usize>,
    free_slots: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    page_id: PageId,
    prev: Option<usize>,
    next: Option<usize>,
}

impl LruIndex {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slot_of: HashMap::with_capacity(capacity),
            links: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            free_slots: Vec::new(),
        }
    }

    /// Record a use of `page_id`, moving it to the most-recent end
    /// (inserting it if absent).
    pub fn touch(&mut self, page_id: PageId) {
        match self.slot_of.get(&page_id) {
            Some(&slot) => self.move_to_front(slot),
            None => self.insert_front(page_id),
        }
    }

    /// Forget `page_id` entirely.
    pub fn remove(&mut self, page_id: PageId) {
        if let Some(slot) = self.slot_of.remove(&page_id) {
            self.unlink(slot);
            self.free_slots.push(slot);
        }
    }

    /// The least recently used page id, if any.
    pub fn lru(&self) -> Option<PageId> {
        self.tail.map(|slot| self.links[slot].page_id)
    }

    /// Remove and return the least recently used page id.
    pub fn pop_lru(&mut self) -> Option<PageId> {
        let page_id = self.lru()?;
        self.remove(page_id);
        Some(page_id)
    }

    pub fn len(&self) -> usize {
        self.slot_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_of.is_empty()
    }

    fn insert_front(&mut self, page_id: PageId) {
        let link = Link {
            page_id,
            prev: None,
            next: self.head,
        };
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.links[slot] = link;
                slot
            }
            None => {
                self.links.push(link);
                self.links.len() - 1
            }
        };

        if let Some(old_head) = self.head {
            self.links[old_head].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
        self.slot_of.insert(page_id, slot);
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }

        self.unlink(slot);
        self.links[slot].prev = None;
        self.links[slot].next = self.head;
        if let Some(old_head) = self.head {
            self.links[old_head].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn unlink(&mut self, slot: usize) {
        let link = self.links[slot];
        match link.prev {
            Some(prev) => self.links[prev].next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => self.links[next].prev = link.prev,
            None => self.tail = link.prev,
        }
    }
}
