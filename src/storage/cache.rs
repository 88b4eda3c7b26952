//! Bounded LRU cache of index nodes used while garbage collecting.

use super::NodeContainer;
use crate::disk::{Node, NodeId};
use crate::error::Result;
use crate::geometry::SpatialData;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Keeps recently visited index nodes resident so that repeated descents
/// during a garbage collection pass do not reload them from the container.
/// Leaves are never cached.
pub struct IndexNodeCache<E> {
    cache: LruCache<NodeId, Node<E>>,
    hits: u64,
    misses: u64,
}

impl<E: SpatialData> IndexNodeCache<E> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the index node `id`, loading it through `container` on a miss.
    pub fn get_or_load<C>(&mut self, id: NodeId, container: &mut C) -> Result<Node<E>>
    where
        C: NodeContainer<E> + ?Sized,
    {
        if let Some(node) = self.cache.get(&id) {
            self.hits += 1;
            return Ok(node.clone());
        }
        self.misses += 1;
        let node = container.get(id)?;
        if !node.is_leaf() {
            self.cache.put(id, node.clone());
        }
        Ok(node)
    }

    pub fn invalidate(&mut self, id: NodeId) {
        self.cache.pop(&id);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
