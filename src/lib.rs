#![doc = include_str!("../README.md")]
//! The core, concurrent, multi-version skiplist implementation.
//!
//! This module provides [`SkipList`], the ordered in-memory index that backs
//! a storage engine's memtable. Every key/value pair is stored as an
//! immutable [`Node`] tagged with a sequence number; updates append a new
//! node instead of mutating in place, so readers at a pinned sequence see a
//! stable view.
//!
//! # Internals
//!
//! -   **Nodes:** each node carries one forward link per level it
//!     participates in. Links are reference counted (`Arc`); they only ever
//!     point toward later positions in the chain, so no cycles can form and
//!     a node stays alive exactly as long as some predecessor references it.
//! -   **Ordering:** every level is kept strictly ordered by the composite
//!     key `(key ascending, sequence descending)`, so the newest version of
//!     a key is the first node of that key's run on the bottom level.
//! -   **Locking:** the key space is split into 256 contiguous ranges, each
//!     guarded by its own reader-writer lock (see [`shard`]). Individual
//!     link hops and splices are additionally made atomic by per-link locks,
//!     so a predecessor chain that crosses shard boundaries stays safe.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ::metrics::{counter, gauge};
use bytes::Bytes;
use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use tracing::debug;

pub mod error;
pub mod iter;
pub mod metrics;
mod shard;

pub use iter::{IteratorKind, SkiplistIter, StorageIterator};

use crate::error::Error;
use crate::metrics::{
    FLUSH_ENTRIES_TOTAL, LABEL_OPERATION_TYPE, NODE_COUNT, OPERATIONS_TOTAL, SIZE_BYTES,
};
use crate::shard::{range_index, ShardLockTable};

const DEFAULT_MAX_LEVEL: usize = 16;
const DEFAULT_P: f64 = 0.5;

/// A forward link: shared ownership of the next node at one level, guarded
/// so a splice is atomic with respect to hops through the same link.
type Link = RwLock<Option<Arc<Node>>>;

/// A single version of a key: an immutable key/value record with per-level
/// forward links and a sequence tag.
///
/// Nodes are created by [`SkipList::insert`] and never mutated afterwards
/// except for their forward links during splicing. [`SkipList::get`] hands
/// nodes out to callers that need version metadata alongside the value.
pub struct Node {
    key: Bytes,
    value: Bytes,
    seq: u64,
    forward: Vec<Link>,
    /// Set while the node is being unlinked, so a concurrent splice using it
    /// as a predecessor re-derives its predecessor array.
    deleted: AtomicBool,
}

impl Node {
    /// Creates the head sentinel, present at every level and never deleted.
    fn sentinel(max_level: usize) -> Self {
        Node {
            key: Bytes::new(),
            value: Bytes::new(),
            seq: 0,
            forward: (0..max_level).map(|_| RwLock::new(None)).collect(),
            deleted: AtomicBool::new(false),
        }
    }

    /// Creates a data node participating in levels `0..=level`.
    fn new(key: Bytes, value: Bytes, level: usize, seq: u64) -> Self {
        Node {
            key,
            value,
            seq,
            forward: (0..=level).map(|_| RwLock::new(None)).collect(),
            deleted: AtomicBool::new(false),
        }
    }

    /// The node's key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The node's value.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The sequence (transaction id) this version was written at.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    pub(crate) fn key_bytes(&self) -> Bytes {
        self.key.clone()
    }

    pub(crate) fn value_bytes(&self) -> Bytes {
        self.value.clone()
    }

    fn entry_size(&self) -> usize {
        self.key.len() + self.value.len()
    }

    /// Whether this node sorts strictly before the composite target
    /// `(key, seq)`. Ties on key are broken by sequence descending, so a
    /// higher sequence sorts first.
    fn precedes(&self, key: &[u8], seq: u64) -> bool {
        use std::cmp::Ordering as KeyOrdering;
        match self.key.as_ref().cmp(key) {
            KeyOrdering::Less => true,
            KeyOrdering::Greater => false,
            KeyOrdering::Equal => self.seq > seq,
        }
    }
}

/// A concurrent, multi-version skiplist memtable.
///
/// Multiple threads may call every operation concurrently. Writers to
/// disjoint key ranges proceed in parallel under independent shard locks;
/// readers share their shard's lock with each other but never with a writer.
/// [`SkipList::flush`] takes every shard exclusively and extracts one
/// consistent, ascending snapshot for the persistence layer.
pub struct SkipList {
    head: Arc<Node>,
    max_level: usize,
    p: f64,
    level: CachePadded<AtomicUsize>,
    size_bytes: CachePadded<AtomicUsize>,
    node_count: CachePadded<AtomicUsize>,
    shards: ShardLockTable,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    /// Creates a new, empty `SkipList` with the default level ceiling.
    pub fn new() -> Self {
        Self::build(DEFAULT_MAX_LEVEL, DEFAULT_P)
    }

    /// Creates a new, empty `SkipList` with a specified level ceiling.
    pub fn with_max_level(max_level: usize) -> Result<Self, Error> {
        Self::with_max_level_and_p(max_level, DEFAULT_P)
    }

    /// Creates a new, empty `SkipList` with a specified level ceiling and
    /// probability factor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `max_level` is zero or `p` is not
    /// strictly between 0 and 1.
    pub fn with_max_level_and_p(max_level: usize, p: f64) -> Result<Self, Error> {
        if max_level == 0 {
            return Err(Error::Configuration(
                "max_level must be at least 1".to_string(),
            ));
        }
        if !(p > 0.0 && p < 1.0) {
            return Err(Error::Configuration(format!(
                "probability factor must be in (0, 1), got {}",
                p
            )));
        }
        Ok(Self::build(max_level, p))
    }

    fn build(max_level: usize, p: f64) -> Self {
        SkipList {
            head: Arc::new(Node::sentinel(max_level)),
            max_level,
            p,
            level: CachePadded::new(AtomicUsize::new(0)),
            size_bytes: CachePadded::new(AtomicUsize::new(0)),
            node_count: CachePadded::new(AtomicUsize::new(0)),
            shards: ShardLockTable::new(),
        }
    }

    /// Returns the number of nodes reachable on the bottom level.
    pub fn node_count(&self) -> usize {
        self.node_count.load(Ordering::Relaxed)
    }

    /// Returns the summed key and value byte length of all nodes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes.load(Ordering::Relaxed)
    }

    /// Returns `true` if the skiplist contains no nodes.
    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    /// Generates a random level for a new node based on the probability
    /// factor `p`. The generator is thread local, so concurrent inserts do
    /// not contend on, or correlate through, shared random state.
    fn random_level(&self) -> usize {
        let mut level = 0;
        while fastrand::f64() < self.p && level < self.max_level - 1 {
            level += 1;
        }
        level
    }

    /// Finds, for every level, the last node sorting strictly before the
    /// composite target `(key, seq)`. The resulting predecessor array is
    /// what insert and delete splice against.
    fn find_preds(&self, key: &[u8], seq: u64) -> Vec<Arc<Node>> {
        let mut preds = vec![self.head.clone(); self.max_level];
        let mut current = self.head.clone();
        for i in (0..self.max_level).rev() {
            loop {
                let next = current.forward[i].read().clone();
                match next {
                    Some(node) if node.precedes(key, seq) => current = node,
                    _ => break,
                }
            }
            preds[i] = current.clone();
        }
        preds
    }

    /// Inserts a key/value pair tagged with sequence `seq`.
    ///
    /// Inserting is append-only with respect to versions: an existing key
    /// gains a brand-new node rather than being overwritten, ordered so the
    /// newest sequence precedes older ones in the chain.
    ///
    /// Returns `false` only when a node with the exact same `(key, seq)`
    /// already exists; the list is unchanged in that case.
    pub fn insert(&self, key: impl Into<Bytes>, value: impl Into<Bytes>, seq: u64) -> bool {
        counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "insert").increment(1);
        let key = key.into();
        let value = value.into();
        let new_level = self.random_level();
        let shard = range_index(&key);

        loop {
            // A draw above the current level rewires the head's upper links,
            // which requires the head's protection in addition to the shard.
            let with_head = new_level > self.level.load(Ordering::Acquire);
            let _guard = self.shards.write(shard, with_head);
            if !with_head && new_level > self.level.load(Ordering::Acquire) {
                // The level dropped between the check and the acquisition;
                // retake the locks with the head covered.
                continue;
            }

            let mut preds = self.find_preds(&key, seq);

            // Exact (key, seq) duplicates are rejected; concurrent writers of
            // the same key are serialized by the shard lock, so this check is
            // race free.
            if let Some(next) = preds[0].forward[0].read().clone() {
                if next.key == key && next.seq == seq {
                    return false;
                }
            }

            let node = Arc::new(Node::new(key.clone(), value.clone(), new_level, seq));

            // Splice bottom-up so the subset property holds even for a
            // partially linked node. Each level validates under the link
            // lock and re-derives the predecessor array on conflict, the
            // same re-find-and-retry shape a CAS loop would have.
            let mut i = 0;
            while i < node.forward.len() {
                let pred = preds[i].clone();
                let mut slot = pred.forward[i].write();
                if pred.deleted.load(Ordering::Acquire) {
                    drop(slot);
                    preds = self.find_preds(&key, seq);
                    continue;
                }
                match slot.clone() {
                    Some(next) if next.precedes(&key, seq) => {
                        // Another shard's writer spliced in ahead of us at
                        // this level; walk past it.
                        drop(slot);
                        preds[i] = next;
                    }
                    next => {
                        *node.forward[i].write() = next;
                        *slot = Some(node.clone());
                        i += 1;
                    }
                }
            }

            self.level.fetch_max(new_level, Ordering::AcqRel);
            self.node_count.fetch_add(1, Ordering::Relaxed);
            self.size_bytes.fetch_add(node.entry_size(), Ordering::Relaxed);
            self.publish_gauges();
            return true;
        }
    }

    /// Physically removes every version node matching `key`.
    ///
    /// Returns `false` if the key is absent, which is an expected outcome,
    /// not an error. After removal the current level is lowered while the
    /// topmost level has no node.
    pub fn delete(&self, key: &[u8]) -> bool {
        counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "delete").increment(1);
        let shard = range_index(key);
        let mut removed = 0usize;
        let mut freed = 0usize;
        {
            let _guard = self.shards.write(shard, false);
            let mut preds = self.find_preds(key, u64::MAX);
            loop {
                let target = match preds[0].forward[0].read().clone() {
                    Some(node) if node.key.as_ref() == key => node,
                    _ => break,
                };
                self.unlink(&target, &mut preds);
                removed += 1;
                freed += target.entry_size();
            }
            if removed > 0 {
                self.node_count.fetch_sub(removed, Ordering::Relaxed);
                self.size_bytes.fetch_sub(freed, Ordering::Relaxed);
                self.publish_gauges();
            }
        }
        if removed > 0 {
            self.try_lower_level();
            debug!(key = ?String::from_utf8_lossy(key), versions = removed, "deleted key");
        }
        removed > 0
    }

    /// Unsplices `target` from every level it participates in. The caller
    /// holds the write lock on the shard owning `target`'s key.
    fn unlink(&self, target: &Arc<Node>, preds: &mut [Arc<Node>]) {
        // Marked before the first rewire, so a splice in another shard that
        // still holds this node as a predecessor notices and retries.
        target.deleted.store(true, Ordering::Release);
        for i in (0..target.forward.len()).rev() {
            loop {
                let pred = preds[i].clone();
                let mut slot = pred.forward[i].write();
                if pred.deleted.load(Ordering::Acquire) {
                    // The predecessor was unlinked by a delete in another
                    // shard; rewiring its links would be invisible to the
                    // live chain.
                    drop(slot);
                    let refreshed = self.find_preds(&target.key, target.seq);
                    preds.clone_from_slice(&refreshed);
                    continue;
                }
                match slot.clone() {
                    Some(next) if Arc::ptr_eq(&next, target) => {
                        *slot = target.forward[i].read().clone();
                        break;
                    }
                    Some(next) if next.precedes(&target.key, target.seq) => {
                        // A concurrent cross-shard splice moved the true
                        // predecessor forward.
                        drop(slot);
                        preds[i] = next;
                    }
                    // The predecessor never linked to the target at this
                    // level; levels above behave the same.
                    _ => break,
                }
            }
        }
    }

    /// Lowers the current level while the topmost level is empty. Runs under
    /// the head's protection; raises racing through `fetch_max` win.
    fn try_lower_level(&self) {
        let _guard = self.shards.write(0, false);
        let mut level = self.level.load(Ordering::Acquire);
        while level > 0 && self.head.forward[level].read().is_none() {
            match self.level.compare_exchange(
                level,
                level - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => level -= 1,
                Err(_) => break,
            }
        }
    }

    /// Returns the value of the newest version of `key` whose sequence is at
    /// or below `seq` (snapshot-read semantics), or `None` if no such
    /// version exists.
    pub fn contain(&self, key: &[u8], seq: u64) -> Option<Bytes> {
        counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "contain").increment(1);
        let _guard = self.shards.read(range_index(key));
        let preds = self.find_preds(key, seq);
        let next = preds[0].forward[0].read().clone();
        match next {
            Some(node) if node.key.as_ref() == key => Some(node.value_bytes()),
            _ => None,
        }
    }

    /// Like [`SkipList::contain`], but returns the node handle for callers
    /// that need version metadata alongside the value.
    pub fn get(&self, key: &[u8], seq: u64) -> Option<Arc<Node>> {
        counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "get").increment(1);
        let _guard = self.shards.read(range_index(key));
        let preds = self.find_preds(key, seq);
        let next = preds[0].forward[0].read().clone();
        match next {
            Some(node) if node.key.as_ref() == key => Some(node),
            _ => None,
        }
    }

    /// Extracts the current content as an ordered sequence of (key, value)
    /// pairs: the newest version per key, ascending, duplicate free. This is
    /// the hand-off point to the persistence layer.
    ///
    /// Holds every shard exclusively for the duration of the walk, so the
    /// snapshot is consistent and matches the counters exactly. Whether to
    /// clear or retain the structure afterwards is the caller's decision.
    pub fn flush(&self) -> Vec<(Bytes, Bytes)> {
        counter!(OPERATIONS_TOTAL, LABEL_OPERATION_TYPE => "flush").increment(1);
        let _guards = self.shards.write_all();
        let mut entries = Vec::with_capacity(self.node_count.load(Ordering::Relaxed));
        let mut last_key: Option<Bytes> = None;
        let mut current = self.head.forward[0].read().clone();
        while let Some(node) = current {
            // Versions of one key are adjacent, newest first; keep the first.
            if last_key.as_ref() != Some(&node.key) {
                entries.push((node.key_bytes(), node.value_bytes()));
                last_key = Some(node.key_bytes());
            }
            current = node.forward[0].read().clone();
        }
        counter!(FLUSH_ENTRIES_TOTAL).increment(entries.len() as u64);
        debug!(
            entries = entries.len(),
            nodes = self.node_count.load(Ordering::Relaxed),
            "flushed memtable snapshot"
        );
        entries
    }

    /// An iterator positioned on the first node, or [`SkipList::end`] if the
    /// list is empty.
    pub fn begin(&self) -> SkiplistIter<'_> {
        SkiplistIter::new(self, self.first_node())
    }

    /// The past-the-last iterator position.
    pub fn end(&self) -> SkiplistIter<'_> {
        SkiplistIter::new(self, None)
    }

    /// An iterator positioned on the first node whose key is at or past
    /// `prefix`.
    pub fn prefix_search_begin(&self, prefix: &[u8]) -> SkiplistIter<'_> {
        SkiplistIter::new(self, self.seek(prefix, u64::MAX))
    }

    /// An iterator positioned on the first node whose key does not share
    /// `prefix`; together with [`SkipList::prefix_search_begin`] this bounds
    /// iteration to the keys starting with `prefix`.
    pub fn prefix_search_end(&self, prefix: &[u8]) -> SkiplistIter<'_> {
        match iter::prefix_successor(prefix) {
            Some(upper) => SkiplistIter::new(self, self.seek(&upper, u64::MAX)),
            // An all-0xFF prefix has no successor; every key past it shares it.
            None => self.end(),
        }
    }

    /// Positions an iterator on the first node of the chain.
    pub fn seek_to_first(&self) -> SkiplistIter<'_> {
        self.begin()
    }

    /// Positions an iterator on the last node of the chain, or
    /// [`SkipList::end`] if the list is empty.
    pub fn seek_to_last(&self) -> SkiplistIter<'_> {
        let mut current = self.head.clone();
        for i in (0..self.max_level).rev() {
            loop {
                let next = {
                    let _guard = self.shards.read(range_index(&current.key));
                    current.forward[i].read().clone()
                };
                match next {
                    Some(node) => current = node,
                    None => break,
                }
            }
        }
        if Arc::ptr_eq(&current, &self.head) {
            self.end()
        } else {
            SkiplistIter::new(self, Some(current))
        }
    }

    /// First node on the bottom level, under the head shard's read lock.
    pub(crate) fn first_node(&self) -> Option<Arc<Node>> {
        let _guard = self.shards.read(0);
        self.head.forward[0].read().clone()
    }

    /// Bottom-level successor of `node`, under its shard's read lock. Each
    /// hop is an independently locked step; iterators hold nothing between
    /// calls.
    pub(crate) fn next_node(&self, node: &Node) -> Option<Arc<Node>> {
        let _guard = self.shards.read(range_index(&node.key));
        node.forward[0].read().clone()
    }

    /// First node at or past the composite target `(key, seq)`, under the
    /// target shard's read lock.
    pub(crate) fn seek(&self, key: &[u8], seq: u64) -> Option<Arc<Node>> {
        let _guard = self.shards.read(range_index(key));
        let preds = self.find_preds(key, seq);
        let next = preds[0].forward[0].read().clone();
        next
    }

    fn publish_gauges(&self) {
        gauge!(SIZE_BYTES).set(self.size_bytes.load(Ordering::Relaxed) as f64);
        gauge!(NODE_COUNT).set(self.node_count.load(Ordering::Relaxed) as f64);
    }
}
