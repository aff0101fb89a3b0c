//! Cursors over the skiplist's bottom-level chain.
//!
//! Iterators are produced by the engine ([`SkipList::begin`],
//! [`SkipList::prefix_search_begin`] and friends) and traverse the chain one
//! independently locked hop at a time. They hold no locks between calls, so
//! a long-running iteration never blocks unrelated writers; the trade-off is
//! that a full iteration is not one consistent snapshot. Callers needing
//! stable visibility pin a sequence and filter with
//! [`StorageIterator::sequence`], relying on the append-only multi-version
//! ordering.

use std::sync::Arc;

use bytes::Bytes;

use crate::{Node, SkipList};

/// The closed set of iterator kinds the engine can hand out. Future kinds
/// are added as new variants, not subclasses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorKind {
    Skiplist,
}

/// The capability contract every engine iterator satisfies.
///
/// Dereferencing an iterator that is not [`StorageIterator::valid`] is a
/// contract violation, not a recoverable condition: [`StorageIterator::entry`]
/// and [`StorageIterator::sequence`] panic in that case. Callers check
/// `valid()` first.
pub trait StorageIterator {
    /// Which variant of iterator this is.
    fn kind(&self) -> IteratorKind;

    /// `true` if the iterator is positioned on a real node.
    fn valid(&self) -> bool;

    /// `true` if the iterator is positioned past the last node.
    fn is_end(&self) -> bool;

    /// Advances to the bottom-level successor.
    fn advance(&mut self);

    /// Skips `n` nodes forward, stopping early at the end of the chain.
    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            if self.is_end() {
                break;
            }
            self.advance();
        }
    }

    /// The positioned node's sequence (version) tag.
    fn sequence(&self) -> u64;

    /// The positioned node's (key, value) pair.
    fn entry(&self) -> (Bytes, Bytes);
}

/// A cursor over a [`SkipList`]'s bottom-level chain.
pub struct SkiplistIter<'a> {
    list: &'a SkipList,
    current: Option<Arc<Node>>,
}

impl<'a> SkiplistIter<'a> {
    pub(crate) fn new(list: &'a SkipList, current: Option<Arc<Node>>) -> Self {
        SkiplistIter { list, current }
    }

    /// The positioned node's key. Panics if the iterator is not valid.
    pub fn key(&self) -> &[u8] {
        match &self.current {
            Some(node) => node.key(),
            None => panic!("key() called on an invalid iterator"),
        }
    }

    /// The positioned node's value. Panics if the iterator is not valid.
    pub fn value(&self) -> &[u8] {
        match &self.current {
            Some(node) => node.value(),
            None => panic!("value() called on an invalid iterator"),
        }
    }

    /// Position identity: two iterators are equal when they sit on the same
    /// node, or are both past the end.
    pub fn equals(&self, other: &SkiplistIter<'_>) -> bool {
        match (&self.current, &other.current) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl StorageIterator for SkiplistIter<'_> {
    fn kind(&self) -> IteratorKind {
        IteratorKind::Skiplist
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn is_end(&self) -> bool {
        self.current.is_none()
    }

    fn advance(&mut self) {
        if let Some(node) = self.current.take() {
            self.current = self.list.next_node(&node);
        }
    }

    fn sequence(&self) -> u64 {
        match &self.current {
            Some(node) => node.sequence(),
            None => panic!("sequence() called on an invalid iterator"),
        }
    }

    fn entry(&self) -> (Bytes, Bytes) {
        match &self.current {
            Some(node) => (node.key_bytes(), node.value_bytes()),
            None => panic!("entry() called on an invalid iterator"),
        }
    }
}

impl PartialEq for SkiplistIter<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for SkiplistIter<'_> {}

impl Iterator for SkiplistIter<'_> {
    type Item = (Bytes, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current.take()?;
        self.current = self.list.next_node(&node);
        Some((node.key_bytes(), node.value_bytes()))
    }
}

/// The smallest key strictly greater than every key sharing `prefix`, or
/// `None` when the prefix is empty or all 0xFF and no such key exists.
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Bytes> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last == u8::MAX {
            upper.pop();
        } else {
            *last += 1;
            return Some(Bytes::from(upper));
        }
    }
    None
}
