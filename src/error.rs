//! Defines the error types used throughout shardlist.
use std::fmt;

/// The primary error enum for all fallible operations in shardlist.
///
/// Lookup misses are represented as `None` and deleting an absent key returns
/// `false`; neither is an error. Internal invariant violations are programming
/// errors and abort instead of surfacing here.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Represents an error in the skiplist configuration, e.g. a zero level
    /// ceiling or a probability factor outside `(0, 1)`.
    Configuration(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for Error {}
