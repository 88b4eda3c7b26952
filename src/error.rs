//! Error types for the RR-tree.

use thiserror::Error;

/// Errors surfaced by tree maintenance, queries and node containers.
///
/// Caller contract violations (updating a full buffer, grouping operations
/// against a childless node) are not represented here: they panic.
#[derive(Debug, Error)]
pub enum RRTreeError {
    /// Configuration rejected by [`crate::RRTreeConfig::validate`]
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed request, e.g. a query below or above the leaf level
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The container has no node stored under the identifier
    #[error("Node {0} not found in container")]
    NodeNotFound(u64),

    /// A node was handed to the container while still overflowing
    #[error("Refusing to store overflowing node with {entries} entries (max {max})")]
    NodeOverflow { entries: usize, max: usize },

    /// The on-container tree is structurally inconsistent
    #[error("Corrupt tree: {0}")]
    CorruptTree(String),

    /// Node (de)serialization failed
    #[error("Serialization error: {0}")]
    SerializationErrorWithContext(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for RR-tree operations.
pub type Result<T> = std::result::Result<T, RRTreeError>;
