//! Buffered R-tree (RR-tree) spatial index.
//!
//! Insertions and deletions are collected in a small in-memory buffer and
//! merged into a container-resident R-tree in spatially coherent batches.
//! Nearby buffered operations piggyback on node writes that happen anyway,
//! and two garbage collectors remove leftover tombstones.
//!
//! ```rust
//! use rrtree::{BoundingBox, RRTree, RRTreeConfig, SpatialItem};
//! use geo::Point;
//!
//! let config = RRTreeConfig::default().with_max_buffer_size(64);
//! let mut tree = RRTree::new(config)?;
//!
//! let item = SpatialItem::from_point(7, Point::new(-74.0060, 40.7128));
//! tree.insert(item)?;
//! let found = tree.range_query(&BoundingBox::new(-75.0, 40.0, -73.0, 41.0))?;
//! assert_eq!(found, vec![item]);
//!
//! tree.remove(item)?;
//! assert!(tree.range_query(&BoundingBox::new(-75.0, 40.0, -73.0, 41.0))?.is_empty());
//! # Ok::<(), rrtree::RRTreeError>(())
//! ```

pub mod buffer;
pub mod builder;
pub mod config;
pub mod disk;
pub mod error;
pub mod gc;
pub mod geometry;
pub mod group_map;
pub mod hilbert;
pub mod operation;
pub mod piggyback;
pub mod stats;
pub mod storage;
pub mod strategy;
pub mod trace;
pub mod tree;

mod invariants;

pub use builder::RRTreeBuilder;
pub use config::{GroupingConfig, PushDownConfig, RRTreeConfig};
pub use disk::DiskRepresentation;
pub use error::{RRTreeError, Result};
pub use gc::GcReport;
pub use geometry::{BoundingBox, SpatialData, SpatialItem};
pub use operation::{Operation, OperationKind};
pub use stats::RRTreeStats;
pub use storage::{ContainerStats, MemoryContainer, NodeContainer};
#[cfg(feature = "snapshot")]
pub use storage::BincodeContainer;
pub use trace::{LogTracer, NoopTracer, ObjectTracer, TraceEvent};
pub use tree::RRTree;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{RRTree, RRTreeBuilder, RRTreeError, Result};

    pub use crate::{BoundingBox, SpatialData, SpatialItem};

    pub use crate::{DiskRepresentation, GroupingConfig, PushDownConfig, RRTreeConfig};

    pub use crate::{GcReport, RRTreeStats};

    pub use geo::{Point, Rect};
}
