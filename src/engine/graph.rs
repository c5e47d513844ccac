//! # Dependency Graph
//!
//! Per-resource hazard records: the most recent writer and the readers
//! issued since that write.
//!
//! ## Rules
//!
//! | New access | Waits on |
//! |-----------:|----------|
//! | write | previous writer **and** all outstanding readers (WAW, WAR) |
//! | read  | previous writer only (RAW); readers never block readers |
//!
//! Only the most recent writer is kept. Older writes are covered
//! transitively, because every writer already ordered itself after its
//! predecessor. A new write clears the readers of the resource.
//!
//! ## Pruning
//!
//! Readers that are known to be finished are dropped whenever the resource
//! is read again. [`DependencyGraph::prune`] drops finished tasks from the
//! outstanding list and removes every record whose writer finished
//! successfully and whose readers are all done. Memory therefore stays
//! bounded by the resources touched by unfinished or failed tasks.
//!
//! ## Concurrency
//!
//! The graph is a plain single-owner structure. The event system mutates it
//! only while holding its mutex, so collecting predecessors and recording
//! the new task happen atomically.

use std::collections::HashMap;

use crate::engine::task::{TaskHandle, TaskState};
use crate::engine::types::{AccessSets, ResourceID, TaskID};

/// Hazard state of one resource.
#[derive(Debug, Default)]
pub struct HazardRecord {
    writer: Option<TaskHandle>,
    readers: Vec<TaskHandle>,
}

impl HazardRecord {
    /// Current writer, if any.
    pub fn writer(&self) -> Option<&TaskHandle> {
        self.writer.as_ref()
    }

    /// Readers issued since the current writer.
    pub fn readers(&self) -> &[TaskHandle] {
        &self.readers
    }
    fn is_settled(&self) -> bool {
        let writer_finished = self.writer.as_ref().map_or(true, |w| w.state() == TaskState::Finished);
        writer_finished && self.readers.is_empty()
    }
}

/// Writer/readers hazard records for every tracked resource.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    records: HashMap<ResourceID, HazardRecord>,
    outstanding: Vec<TaskHandle>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the predecessors a task with `access` must order after.
    ///
    /// The result is sorted by task ID and free of duplicates.
    pub fn predecessors(&self, access: &AccessSets) -> Vec<TaskHandle> {
        let mut out: Vec<TaskHandle> = Vec::new();

        for resource in &access.write {
            if let Some(record) = self.records.get(resource) {
                out.extend(record.writer.iter().cloned());
                out.extend(record.readers.iter().cloned());
            }
        }
        for resource in &access.read {
            if let Some(writer) = self.records.get(resource).and_then(|r| r.writer.as_ref()) {
                out.push(writer.clone());
            }
        }

        out.sort_by_key(TaskHandle::id);
        out.dedup_by_key(|t| t.id());
        out
    }

    /// Records `task` as a reader of its read set and the writer of its
    /// write set, and tracks it as outstanding.
    pub fn record(&mut self, task: &TaskHandle) {
        for &resource in &task.access().read {
            let record = self.records.entry(resource).or_default();
            record.readers.retain(|r| !r.is_done());
            record.readers.push(task.clone());
        }
        for &resource in &task.access().write {
            let record = self.records.entry(resource).or_default();
            record.writer = Some(task.clone());
            record.readers.clear();
        }
        self.outstanding.push(task.clone());
    }

    /// Drops finished tasks from the outstanding list and finished readers
    /// from every record, then removes records with nothing left to order
    /// after. Returns the number of outstanding tasks left.
    ///
    /// A record whose writer failed is kept so later readers still observe
    /// the failure.
    pub fn prune(&mut self) -> usize {
        self.outstanding.retain(|t| !t.is_done());
        self.records.retain(|_, record| {
            record.readers.retain(|r| !r.is_done());
            !record.is_settled()
        });
        self.outstanding.len()
    }

    /// Removes and returns the outstanding list.
    pub fn take_outstanding(&mut self) -> Vec<TaskHandle> {
        std::mem::take(&mut self.outstanding)
    }

    /// Number of tasks not yet known to be finished.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Number of resources with a hazard record.
    pub fn tracked_resources(&self) -> usize {
        self.records.len()
    }

    /// Hazard record of `resource`, if any.
    pub fn record_of(&self, resource: ResourceID) -> Option<&HazardRecord> {
        self.records.get(&resource)
    }

    /// ID of the current writer of `resource`, if any.
    pub fn writer_of(&self, resource: ResourceID) -> Option<TaskID> {
        self.records.get(&resource).and_then(|r| r.writer.as_ref()).map(TaskHandle::id)
    }

    /// Drops the hazard record of `resource`, e.g. when the buffer it names
    /// has been released.
    pub fn forget(&mut self, resource: ResourceID) -> bool {
        self.records.remove(&resource).is_some()
    }
}
