//! Observation hooks for the lifecycle of buffered operations.

use crate::geometry::SpatialData;
use std::fmt;

/// Points in an operation's life that a tracer can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    InsertToBuffer,
    RemoveFromBuffer,
    PutBackToBuffer,
    GroupUpdateStart,
    BeforeIndexPiggybacking,
    AfterIndexPiggybacking,
    UpdateLeafNode,
    CompleteOperation,
    IndexNodePiggybacking,
    LeafNodePiggybacking,
    QueryDiskResult,
    QueryBufferResult,
    GcRebuildLoad,
    GcRebuildWrite,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceEvent::InsertToBuffer => "insert_to_buffer",
            TraceEvent::RemoveFromBuffer => "remove_from_buffer",
            TraceEvent::PutBackToBuffer => "put_back_to_buffer",
            TraceEvent::GroupUpdateStart => "group_update_start",
            TraceEvent::BeforeIndexPiggybacking => "before_index_piggybacking",
            TraceEvent::AfterIndexPiggybacking => "after_index_piggybacking",
            TraceEvent::UpdateLeafNode => "update_leaf_node",
            TraceEvent::CompleteOperation => "complete_operation",
            TraceEvent::IndexNodePiggybacking => "index_node_piggybacking",
            TraceEvent::LeafNodePiggybacking => "leaf_node_piggybacking",
            TraceEvent::QueryDiskResult => "query_disk_result",
            TraceEvent::QueryBufferResult => "query_buffer_result",
            TraceEvent::GcRebuildLoad => "gc_rebuild_load",
            TraceEvent::GcRebuildWrite => "gc_rebuild_write",
        };
        f.write_str(name)
    }
}

/// Receives trace events. Tracers never influence the tree.
pub trait ObjectTracer<E: SpatialData> {
    fn trace(&mut self, event: TraceEvent, data: &E);

    /// Callers skip building per-operation events when this is false.
    fn is_enabled(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl<E: SpatialData> ObjectTracer<E> for NoopTracer {
    fn trace(&mut self, _event: TraceEvent, _data: &E) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Forwards every event to `log::trace!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl<E: SpatialData> ObjectTracer<E> for LogTracer {
    fn trace(&mut self, event: TraceEvent, data: &E) {
        log::trace!("{event}: {data:?}");
    }

    fn is_enabled(&self) -> bool {
        log::log_enabled!(log::Level::Trace)
    }
}

/// Records events in memory.
#[derive(Debug, Clone)]
pub struct RecordingTracer<E> {
    events: Vec<(TraceEvent, E)>,
}

impl<E> Default for RecordingTracer<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E: SpatialData> RecordingTracer<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[(TraceEvent, E)] {
        &self.events
    }

    pub fn count(&self, event: TraceEvent) -> usize {
        self.events.iter().filter(|(e, _)| *e == event).count()
    }
}

impl<E: SpatialData> ObjectTracer<E> for RecordingTracer<E> {
    fn trace(&mut self, event: TraceEvent, data: &E) {
        self.events.push((event, data.clone()));
    }
}
