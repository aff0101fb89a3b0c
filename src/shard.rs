//! The sharded range-lock table that serializes structural mutation.
//!
//! The key space is partitioned into [`SHARD_COUNT`] contiguous ranges by the
//! leading key byte, each guarded by its own reader-writer lock. Shard 0 also
//! protects the head sentinel's links above the current level, so a
//! structural operation that may raise or lower the list takes it in addition
//! to the shard owning its key. Every acquisition path locks in ascending
//! shard order, which makes the discipline deadlock-free.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of key-range partitions, one per possible leading byte.
pub(crate) const SHARD_COUNT: usize = 256;

/// Maps a key to the shard owning its range.
///
/// Bucketing by the leading byte is order-preserving: every shard owns a
/// contiguous slice of the key space, so a single-key operation is serialized
/// against all other writers of that range by one lock. The empty key lands
/// on shard 0 together with the head sentinel.
pub(crate) fn range_index(key: &[u8]) -> usize {
    key.first().copied().unwrap_or(0) as usize
}

/// A fixed array of reader-writer locks, one per key-range partition.
pub(crate) struct ShardLockTable {
    locks: Vec<RwLock<()>>,
}

/// Write guards held for one structural operation: the shard owning the key,
/// plus shard 0 when the head's upper links are in play.
pub(crate) struct ShardWriteGuard<'a> {
    _head: Option<RwLockWriteGuard<'a, ()>>,
    _shard: RwLockWriteGuard<'a, ()>,
}

impl ShardLockTable {
    pub(crate) fn new() -> Self {
        Self {
            locks: (0..SHARD_COUNT).map(|_| RwLock::new(())).collect(),
        }
    }

    /// Shared lock on a single shard, for point reads and iterator hops.
    pub(crate) fn read(&self, shard: usize) -> RwLockReadGuard<'_, ()> {
        self.locks[shard].read()
    }

    /// Exclusive lock on `shard`, optionally preceded by shard 0 (the head's
    /// protection). Acquisition is ascending: shard 0 first, then the shard
    /// itself.
    pub(crate) fn write(&self, shard: usize, with_head: bool) -> ShardWriteGuard<'_> {
        let head = (with_head && shard != 0).then(|| self.locks[0].write());
        ShardWriteGuard {
            _head: head,
            _shard: self.locks[shard].write(),
        }
    }

    /// Exclusive locks on every shard, ascending. Used by `flush` to observe
    /// one consistent version of the whole chain.
    pub(crate) fn write_all(&self) -> Vec<RwLockWriteGuard<'_, ()>> {
        self.locks.iter().map(|lock| lock.write()).collect()
    }
}
