//! Doubly linked list indexed both by disk offset and by value.
//!
//! Nodes live in a `BTreeMap` keyed by offset, which doubles as the ordered
//! offset index. Links are offsets into that map, never references.

use crate::StoreError;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq)]
pub struct Node<T> {
    offset: u32,
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
    dirty: u32,
}

impl<T> Node<T> {
    fn new(offset: u32, value: T, next: Option<u32>) -> Self {
        Self {
            offset,
            value,
            prev: None,
            next,
            dirty: 0,
        }
    }

    /// Position of this node's record in the file. Also its identity.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Offset of the node closer to the front.
    pub fn prev(&self) -> Option<u32> {
        self.prev
    }

    /// Offset of the node closer to the back.
    pub fn next(&self) -> Option<u32> {
        self.next
    }

    /// Link mutations not yet written to disk.
    pub fn dirty(&self) -> u32 {
        self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty > 0
    }

    pub fn into_value(self) -> T {
        self.value
    }

    fn set_prev(&mut self, prev: Option<u32>) {
        self.prev = prev;
        self.dirty += 1;
    }

    fn set_next(&mut self, next: Option<u32>) {
        self.next = next;
        self.dirty += 1;
    }
}

pub struct QuickList<T> {
    nodes: BTreeMap<u32, Node<T>>,
    by_value: HashMap<T, u32>,
    first: Option<u32>,
    last: Option<u32>,
}

impl<T: Eq + Hash + Clone> QuickList<T> {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            by_value: HashMap::new(),
            first: None,
            last: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn first(&self) -> Option<&Node<T>> {
        self.first.and_then(|offset| self.nodes.get(&offset))
    }

    pub fn last(&self) -> Option<&Node<T>> {
        self.last.and_then(|offset| self.nodes.get(&offset))
    }

    pub fn get(&self, offset: u32) -> Option<&Node<T>> {
        self.nodes.get(&offset)
    }

    /// Node with the highest offset.
    pub fn highest(&self) -> Option<&Node<T>> {
        self.nodes.values().next_back()
    }

    pub fn lookup_by_value<Q>(&self, value: &Q) -> Option<&Node<T>>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.by_value
            .get(value)
            .and_then(|offset| self.nodes.get(offset))
    }

    pub fn contains_value<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.by_value.contains_key(value)
    }

    /// Creates a node at `offset` and makes it the new front.
    ///
    /// Fails without touching the list when the offset or the value is already linked.
    pub fn link_front(&mut self, offset: u32, value: T) -> Result<&Node<T>, StoreError> {
        if self.nodes.contains_key(&offset) {
            return Err(StoreError::OffsetInUse(offset));
        }
        if self.by_value.contains_key(&value) {
            return Err(StoreError::DuplicateValue);
        }

        let old_first = self.first;
        match old_first.and_then(|f| self.nodes.get_mut(&f)) {
            Some(f) => f.set_prev(Some(offset)),
            None => self.last = Some(offset),
        }

        self.first = Some(offset);
        self.by_value.insert(value.clone(), offset);
        let node = self
            .nodes
            .entry(offset)
            .or_insert(Node::new(offset, value, old_first));
        Ok(node)
    }

    /// Detaches the node at `offset` from any chain position.
    ///
    /// Neighbours are relinked and marked dirty. The returned node has no links.
    pub fn unlink(&mut self, offset: u32) -> Option<Node<T>> {
        let mut node = self.nodes.remove(&offset)?;
        self.by_value.remove(&node.value);
        self.detach_links(&node);

        node.prev = None;
        node.next = None;
        Some(node)
    }

    pub fn unlink_last(&mut self) -> Option<Node<T>> {
        let last = self.last?;
        self.unlink(last)
    }

    /// Relinks an existing node as the front without changing its offset.
    ///
    /// Returns false if no node lives at `offset`.
    pub fn move_to_front(&mut self, offset: u32) -> bool {
        let Some(node) = self.nodes.get(&offset) else {
            return false;
        };
        if self.first == Some(offset) {
            return true;
        }

        let (prev, next) = (node.prev, node.next);
        self.relink_neighbours(offset, prev, next);

        let old_first = self.first;
        if let Some(f) = old_first.and_then(|f| self.nodes.get_mut(&f)) {
            f.set_prev(Some(offset));
        }
        if let Some(node) = self.nodes.get_mut(&offset) {
            node.set_prev(None);
            node.set_next(old_first);
        }
        self.first = Some(offset);
        true
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.by_value.clear();
        self.first = None;
        self.last = None;
    }

    /// Nodes in ascending offset order.
    pub fn iter_by_offset(&self) -> impl Iterator<Item = &Node<T>> + '_ {
        self.nodes.values()
    }

    /// Nodes from `first` to `last`.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.first,
            remaining: self.nodes.len(),
        }
    }

    /// Nodes with unwritten link changes.
    pub fn dirty_nodes(&self) -> impl Iterator<Item = &Node<T>> + '_ {
        self.nodes.values().filter(|node| node.is_dirty())
    }

    pub(crate) fn mark_clean(&mut self, offset: u32) {
        if let Some(node) = self.nodes.get_mut(&offset) {
            node.dirty = 0;
        }
    }

    pub(crate) fn mark_all_clean(&mut self) {
        self.nodes.values_mut().for_each(|node| node.dirty = 0);
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        self.nodes.values_mut().for_each(|node| node.dirty += 1);
    }

    /// Checks that both indexes and the chain describe the same node set.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self)
    where
        T: std::fmt::Debug,
    {
        assert_eq!(self.nodes.len(), self.by_value.len());
        for (value, offset) in &self.by_value {
            assert_eq!(self.nodes[offset].value(), value);
        }

        let walked: Vec<u32> = self.iter().map(|n| n.offset()).collect();
        assert_eq!(walked.len(), self.len());
        assert_eq!(walked.first().copied(), self.first);
        assert_eq!(walked.last().copied(), self.last);

        // Back links mirror forward links
        for pair in walked.windows(2) {
            assert_eq!(self.nodes[&pair[0]].next(), Some(pair[1]));
            assert_eq!(self.nodes[&pair[1]].prev(), Some(pair[0]));
        }
        if let Some(f) = self.first() {
            assert_eq!(f.prev(), None);
        }
        if let Some(l) = self.last() {
            assert_eq!(l.next(), None);
        }
    }

    fn detach_links(&mut self, node: &Node<T>) {
        self.relink_neighbours(node.offset, node.prev, node.next);
    }

    /// Points `prev` and `next` at each other, closing the hole left by `offset`.
    fn relink_neighbours(&mut self, offset: u32, prev: Option<u32>, next: Option<u32>) {
        match prev.and_then(|p| self.nodes.get_mut(&p)) {
            Some(p) => p.set_next(next),
            None => self.first = next,
        }
        match next.and_then(|n| self.nodes.get_mut(&n)) {
            Some(n) => n.set_prev(prev),
            None => self.last = prev,
        }
        if self.first == Some(offset) {
            self.first = next;
        }
        if self.last == Some(offset) {
            self.last = prev;
        }
    }
}

impl<T: Eq + Hash + Clone> Default for QuickList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain-order iterator. Bounded by the node count, so a damaged chain cannot loop.
pub struct Iter<'a, T> {
    list: &'a QuickList<T>,
    cursor: Option<u32>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a Node<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.list.nodes.get(&self.cursor?)?;
        self.cursor = node.next;
        self.remaining -= 1;
        Some(node)
    }
}
