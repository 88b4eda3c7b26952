//! Tree builder for flexible configuration
//!
//! This module provides a builder pattern for creating RR-trees with a
//! chosen node container and tracer.

use crate::config::RRTreeConfig;
use crate::error::Result;
use crate::geometry::SpatialData;
#[cfg(feature = "snapshot")]
use crate::storage::BincodeContainer;
use crate::storage::{MemoryContainer, NodeContainer};
use crate::trace::ObjectTracer;
use crate::tree::RRTree;

/// Builder for [`RRTree`] with a custom container, tracer and settings.
pub struct RRTreeBuilder<E: SpatialData, C: NodeContainer<E> = MemoryContainer<E>> {
    config: RRTreeConfig,
    container: C,
    tracer: Option<Box<dyn ObjectTracer<E>>>,
}

impl<E: SpatialData> RRTreeBuilder<E> {
    /// Create a new builder with default configuration and in-memory nodes.
    pub fn new() -> Self {
        Self {
            config: RRTreeConfig::default(),
            container: MemoryContainer::new(),
            tracer: None,
        }
    }
}

impl<E: SpatialData> Default for RRTreeBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SpatialData, C: NodeContainer<E>> RRTreeBuilder<E, C> {
    /// Set the tree configuration (capacities, strategies, piggybacking).
    pub fn config(mut self, config: RRTreeConfig) -> Self {
        self.config = config;
        self
    }

    /// Store nodes in `container`, which must be empty.
    pub fn container<D: NodeContainer<E>>(self, container: D) -> RRTreeBuilder<E, D> {
        RRTreeBuilder {
            config: self.config,
            container,
            tracer: self.tracer,
        }
    }

    /// Keep nodes bincode-encoded, as a block store would.
    #[cfg(feature = "snapshot")]
    pub fn serialized(self) -> RRTreeBuilder<E, BincodeContainer>
    where
        BincodeContainer: NodeContainer<E>,
    {
        self.container(BincodeContainer::new())
    }

    pub fn tracer(mut self, tracer: Box<dyn ObjectTracer<E>>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Build the tree. Fails on an invalid configuration.
    pub fn build(self) -> Result<RRTree<E, C>> {
        let mut tree = RRTree::with_container(self.config, self.container)?;
        if let Some(tracer) = self.tracer {
            tree.set_tracer(tracer);
        }
        Ok(tree)
    }
}
