//! Defines the metric keys and labels used throughout shardlist.
//!
//! Using a central module for these constants helps prevent typos and ensures
//! consistency across the codebase.

// --- Metric Keys ---

/// Tracks the total number of engine operations.
///
/// Labels:
/// - `type`: "insert", "delete", "contain", "get", "flush"
pub const OPERATIONS_TOTAL: &str = "shardlist_operations_total";

/// A gauge representing the summed key and value byte length of all nodes
/// currently reachable on the bottom level.
pub const SIZE_BYTES: &str = "shardlist_size_bytes";

/// A gauge representing the number of nodes currently reachable on the
/// bottom level.
pub const NODE_COUNT: &str = "shardlist_node_count";

/// Tracks the total number of entries handed to the persistence layer by
/// `flush`.
pub const FLUSH_ENTRIES_TOTAL: &str = "shardlist_flush_entries_total";

// --- Label Keys ---

pub const LABEL_OPERATION_TYPE: &str = "type";
