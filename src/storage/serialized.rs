//! Node container keeping every node as a bincode-encoded block.

use super::{ContainerStats, NodeContainer};
use crate::disk::{Node, NodeId};
use crate::error::{RRTreeError, Result};
use crate::geometry::SpatialData;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Container that serializes nodes on `put`/`update` and decodes on `get`.
///
/// Behaves like a block store: nothing handed out by `get` aliases the
/// stored state, so every modification has to be written back.
pub struct BincodeContainer {
    blocks: FxHashMap<NodeId, Bytes>,
    next_id: NodeId,
    stats: ContainerStats,
}

impl BincodeContainer {
    pub fn new() -> Self {
        Self {
            blocks: FxHashMap::default(),
            next_id: 0,
            stats: ContainerStats::default(),
        }
    }

    fn encode<E: Serialize>(node: &Node<E>) -> Result<Bytes> {
        let encoded = bincode::serialize(node)
            .map_err(|e| RRTreeError::SerializationErrorWithContext(e.to_string()))?;
        Ok(Bytes::from(encoded))
    }
}

impl Default for BincodeContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> NodeContainer<E> for BincodeContainer
where
    E: SpatialData + Serialize + DeserializeOwned,
{
    fn get(&mut self, id: NodeId) -> Result<Node<E>> {
        self.stats.gets += 1;
        let block = self.blocks.get(&id).ok_or(RRTreeError::NodeNotFound(id))?;
        bincode::deserialize(block).map_err(|e| {
            RRTreeError::SerializationErrorWithContext(format!(
                "Failed to decode node {}: {}",
                id, e
            ))
        })
    }

    fn put(&mut self, node: Node<E>) -> Result<NodeId> {
        let block = Self::encode(&node)?;
        let id = self.next_id;
        self.next_id += 1;
        self.blocks.insert(id, block);
        self.stats.puts += 1;
        Ok(id)
    }

    fn update(&mut self, id: NodeId, node: Node<E>) -> Result<()> {
        self.stats.updates += 1;
        if !self.blocks.contains_key(&id) {
            return Err(RRTreeError::NodeNotFound(id));
        }
        let block = Self::encode(&node)?;
        self.blocks.insert(id, block);
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> Result<()> {
        self.stats.removes += 1;
        self.blocks
            .remove(&id)
            .map(|_| ())
            .ok_or(RRTreeError::NodeNotFound(id))
    }

    fn clear(&mut self) -> Result<()> {
        self.blocks.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn stats(&self) -> ContainerStats {
        ContainerStats {
            node_count: self.blocks.len(),
            size_bytes: self.blocks.values().map(Bytes::len).sum(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::ChildEntry;
    use crate::geometry::{BoundingBox, SpatialItem};
    use crate::operation::Operation;
    use geo::Point;

    #[test]
    fn test_nodes_survive_encoding() {
        let mut container = BincodeContainer::new();
        let leaf = Node::new_leaf(vec![
            Operation::insertion(SpatialItem::from_point(1, Point::new(1.0, 2.0))),
            Operation::deletion(SpatialItem::from_point(2, Point::new(-3.0, 0.5))),
        ]);
        let index: Node<SpatialItem> =
            Node::new_index(1, vec![ChildEntry::new(0, BoundingBox::new(-3.0, 0.5, 1.0, 2.0))]);

        let leaf_id = container.put(leaf.clone()).unwrap();
        let index_id = container.put(index.clone()).unwrap();

        let loaded: Node<SpatialItem> = container.get(leaf_id).unwrap();
        assert_eq!(loaded, leaf);
        let loaded: Node<SpatialItem> = container.get(index_id).unwrap();
        assert_eq!(loaded, index);

        let stats = NodeContainer::<SpatialItem>::stats(&container);
        assert_eq!(stats.node_count, 2);
        assert!(stats.size_bytes > 0);
    }

    #[test]
    fn test_update_missing_node_fails() {
        let mut container = BincodeContainer::new();
        let result = container.update(5, Node::<SpatialItem>::new_leaf(Vec::new()));
        assert!(matches!(result, Err(RRTreeError::NodeNotFound(5))));
    }
}
