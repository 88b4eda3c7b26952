//! Node containers for the RR-tree
//!
//! The tree never holds more than a handful of nodes in memory. Every node
//! lives in a [`NodeContainer`], an arena keyed by [`NodeId`], and is loaded
//! and written back explicitly. Containers count every call so the I/O cost
//! of buffer emptying, queries and garbage collection can be measured.

mod cache;
#[cfg(feature = "snapshot")]
mod serialized;

pub use cache::IndexNodeCache;
#[cfg(feature = "snapshot")]
pub use serialized::BincodeContainer;

use crate::disk::{Node, NodeId};
use crate::error::{RRTreeError, Result};
use crate::geometry::SpatialData;
use rustc_hash::FxHashMap;

/// Trait for node container implementations
///
/// Implementations decide how nodes are kept (plain memory, serialized
/// blocks, ...). Identifiers are assigned by the container and are never
/// reused while the node is alive.
pub trait NodeContainer<E: SpatialData> {
    /// Load a node
    fn get(&mut self, id: NodeId) -> Result<Node<E>>;

    /// Store a new node and return its identifier
    fn put(&mut self, node: Node<E>) -> Result<NodeId>;

    /// Overwrite an existing node
    fn update(&mut self, id: NodeId, node: Node<E>) -> Result<()>;

    /// Free a node
    fn remove(&mut self, id: NodeId) -> Result<()>;

    /// Drop every node
    fn clear(&mut self) -> Result<()>;

    /// Number of stored nodes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get container statistics
    fn stats(&self) -> ContainerStats;
}

/// Container call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// Number of stored nodes
    pub node_count: usize,
    pub gets: u64,
    pub puts: u64,
    pub updates: u64,
    pub removes: u64,
    /// Approximate stored size in bytes, when the container knows it
    pub size_bytes: usize,
}

impl ContainerStats {
    /// Total number of container calls.
    pub fn io(&self) -> u64 {
        self.gets + self.puts + self.updates + self.removes
    }

    /// Counter increments between `earlier` and `self`.
    pub fn since(&self, earlier: &ContainerStats) -> ContainerStats {
        ContainerStats {
            node_count: self.node_count,
            gets: self.gets - earlier.gets,
            puts: self.puts - earlier.puts,
            updates: self.updates - earlier.updates,
            removes: self.removes - earlier.removes,
            size_bytes: self.size_bytes,
        }
    }
}

/// In-memory node arena
pub struct MemoryContainer<E> {
    nodes: FxHashMap<NodeId, Node<E>>,
    next_id: NodeId,
    stats: ContainerStats,
}

impl<E> MemoryContainer<E> {
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            next_id: 0,
            stats: ContainerStats::default(),
        }
    }
}

impl<E> Default for MemoryContainer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SpatialData> NodeContainer<E> for MemoryContainer<E> {
    fn get(&mut self, id: NodeId) -> Result<Node<E>> {
        self.stats.gets += 1;
        self.nodes
            .get(&id)
            .cloned()
            .ok_or(RRTreeError::NodeNotFound(id))
    }

    fn put(&mut self, node: Node<E>) -> Result<NodeId> {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, node);
        self.stats.puts += 1;
        Ok(id)
    }

    fn update(&mut self, id: NodeId, node: Node<E>) -> Result<()> {
        self.stats.updates += 1;
        match self.nodes.get_mut(&id) {
            Some(slot) => {
                *slot = node;
                Ok(())
            }
            None => Err(RRTreeError::NodeNotFound(id)),
        }
    }

    fn remove(&mut self, id: NodeId) -> Result<()> {
        self.stats.removes += 1;
        self.nodes
            .remove(&id)
            .map(|_| ())
            .ok_or(RRTreeError::NodeNotFound(id))
    }

    fn clear(&mut self) -> Result<()> {
        self.nodes.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn stats(&self) -> ContainerStats {
        ContainerStats {
            node_count: self.nodes.len(),
            ..self.stats
        }
    }
}
