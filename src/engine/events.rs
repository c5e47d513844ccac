//! # Event System
//!
//! Turns declared data hazards between asynchronous operations into an
//! explicit wait graph across execution queues.
//!
//! ## Issue path
//!
//! For every new operation, under one lock:
//!
//! 1. Each written resource contributes its writer and its outstanding
//!    readers as predecessors.
//! 2. Each read resource contributes its writer as a predecessor; the new
//!    task is recorded as a reader.
//! 3. A device-level wait is inserted for every predecessor that lives on a
//!    **different** queue. Same-queue predecessors are already ordered by
//!    the queue's FIFO execution and need no wait. Skipping those waits is
//!    what keeps the system from over-synchronizing.
//! 4. Each written resource gets the new task as its writer, and its
//!    readers are cleared.
//! 5. The task is submitted to its queue and the handle is returned
//!    without blocking.
//!
//! Submission happens while the lock is still held. That way the FIFO order
//! of a queue always matches the order in which the graph saw the tasks,
//! even when several host threads issue concurrently.
//!
//! ## Host synchronization
//!
//! * [`EventSystem::finish`] blocks until a task completes; it is idempotent
//!   and never mutates the graph.
//! * [`EventSystem::poll`] never blocks.
//! * [`EventSystem::finish_all`] waits for every outstanding task.
//!
//! ## Instrumentation
//!
//! With [`EventSystemConfig::record_waits`] enabled, every inserted wait is
//! appended to a [`WaitRecord`] trace, so tests and diagnostics can verify
//! that no false dependency was introduced.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::error::{
    contract_violation, ensure_same_system, CapacityError, ConfigError, DeviceError, EventResult,
};
use crate::engine::graph::DependencyGraph;
use crate::engine::policy::{PerKind, QueueAssignment};
use crate::engine::queue::{Device, Submission};
use crate::engine::task::{Operation, TaskHandle};
use crate::engine::types::{AccessSets, OperationKind, QueueID, ResourceID, SystemID, TaskID};

static NEXT_SYSTEM: AtomicU32 = AtomicU32::new(1);

/// Outstanding tasks are pruned at least this often (in issued tasks).
const PRUNE_INTERVAL: TaskID = 1024;

/// Tunables of the event system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSystemConfig {
    /// Maximum number of tasks that may be outstanding (issued and not
    /// known finished). Issue fails with a capacity error beyond it.
    pub max_outstanding_tasks: usize,
    /// Record every inserted cross-queue wait in the wait trace.
    pub record_waits: bool,
}

impl Default for EventSystemConfig {
    fn default() -> Self {
        Self { max_outstanding_tasks: 1 << 16, record_waits: false }
    }
}

impl EventSystemConfig {
    /// Checks the configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_outstanding_tasks == 0 {
            return Err(ConfigError::ZeroCount { what: "max_outstanding_tasks" });
        }
        Ok(())
    }
}

/// One device-level wait inserted by the event system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitRecord {
    /// Task that waits.
    pub task: TaskID,
    /// Queue of the waiting task.
    pub task_queue: QueueID,
    /// Task waited on.
    pub predecessor: TaskID,
    /// Queue of the task waited on.
    pub predecessor_queue: QueueID,
}

struct State {
    graph: DependencyGraph,
    next_task: TaskID,
    waits: Vec<WaitRecord>,
}

/// Dependency-tracking scheduler over the queues of one device.
pub struct EventSystem<P: QueueAssignment = PerKind> {
    id: SystemID,
    device: Arc<Device>,
    policy: P,
    config: EventSystemConfig,
    state: Mutex<State>,
}

impl EventSystem<PerKind> {
    /// Creates an event system with one dedicated queue per operation kind.
    pub fn new(device: Arc<Device>, config: EventSystemConfig) -> Self {
        let policy = PerKind::from_device(device.context());
        Self::with_policy(device, policy, config)
    }
}

impl<P: QueueAssignment> EventSystem<P> {
    /// Creates an event system using `policy` for queue assignment.
    pub fn with_policy(device: Arc<Device>, policy: P, config: EventSystemConfig) -> Self {
        let id = NEXT_SYSTEM.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            target: "pic_scheduler::events",
            system = id,
            queues = device.queues().len(),
            max_outstanding = config.max_outstanding_tasks,
            "event system created"
        );
        Self {
            id,
            device,
            policy,
            config,
            state: Mutex::new(State { graph: DependencyGraph::new(), next_task: 1, waits: Vec::new() }),
        }
    }

    /// Instance ID carried by every handle issued here.
    #[inline]
    pub fn id(&self) -> SystemID {
        self.id
    }

    /// The device whose queues this system schedules on.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Queue assignment policy.
    #[inline]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Configuration.
    #[inline]
    pub fn config(&self) -> &EventSystemConfig {
        &self.config
    }

    /// Queue the next operation of `kind` will be issued on. Does not
    /// advance the policy.
    #[inline]
    pub fn queue_for(&self, kind: OperationKind) -> QueueID {
        self.policy.peek(kind)
    }

    /// Issues `operation` on the queue chosen by the policy.
    pub fn issue(&self, operation: Operation, access: &AccessSets) -> EventResult<TaskHandle> {
        let queue = self.policy.assign(operation.kind);
        self.submit(operation, queue, access, &[])
    }

    /// Issues `operation` on an explicit queue.
    ///
    /// # Panics
    /// If `queue` does not exist on the device.
    #[track_caller]
    pub fn issue_on(&self, operation: Operation, queue: QueueID, access: &AccessSets) -> EventResult<TaskHandle> {
        self.submit(operation, queue, access, &[])
    }

    /// Issues `operation` with explicit predecessors in addition to the
    /// hazards derived from `access`.
    pub fn issue_after(
        &self,
        operation: Operation,
        access: &AccessSets,
        after: &[TaskHandle],
    ) -> EventResult<TaskHandle> {
        let queue = self.policy.assign(operation.kind);
        self.submit(operation, queue, access, after)
    }

    /// Returns a handle that completes once every handle in `handles` has
    /// completed. It fails if any of them failed.
    pub fn join(&self, handles: &[TaskHandle]) -> EventResult<TaskHandle> {
        let operation = Operation::barrier(OperationKind::Compute, "join");
        let queue = self.policy.assign(OperationKind::Compute);
        self.submit(operation, queue, &AccessSets::none(), handles)
    }

    /// Blocks until `handle` completes. Returns immediately if it already
    /// has. Never touches the dependency graph.
    ///
    /// # Panics
    /// If `handle` was issued by another event system.
    #[track_caller]
    pub fn finish(&self, handle: &TaskHandle) -> Result<(), DeviceError> {
        ensure_same_system(self.id, handle.system(), handle.id());
        handle.marker().wait()
    }

    /// Non-blocking completion check: `Ok(true)` once finished,
    /// `Ok(false)` while pending, `Err` if the task failed.
    ///
    /// # Panics
    /// If `handle` was issued by another event system.
    #[track_caller]
    pub fn poll(&self, handle: &TaskHandle) -> Result<bool, DeviceError> {
        ensure_same_system(self.id, handle.system(), handle.id());
        match handle.marker().try_outcome() {
            None => Ok(false),
            Some(Ok(())) => Ok(true),
            Some(Err(e)) => Err(e),
        }
    }

    /// Blocks until every outstanding task has completed, then prunes the
    /// graph. Returns the first failure encountered, by task ID.
    pub fn finish_all(&self) -> Result<(), DeviceError> {
        let outstanding = self.state.lock().graph.take_outstanding();
        let count = outstanding.len();

        let mut first_error: Option<DeviceError> = None;
        for task in &outstanding {
            if let Err(e) = task.marker().wait() {
                first_error.get_or_insert(e);
            }
        }

        self.state.lock().graph.prune();
        tracing::debug!(target: "pic_scheduler::events", system = self.id, tasks = count, "all tasks finished");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of tasks not yet known to be finished.
    pub fn outstanding(&self) -> usize {
        self.state.lock().graph.outstanding()
    }

    /// Number of resources with a hazard record.
    pub fn tracked_resources(&self) -> usize {
        self.state.lock().graph.tracked_resources()
    }

    /// ID of the current writer of `resource`, if any.
    pub fn writer_of(&self, resource: ResourceID) -> Option<TaskID> {
        self.state.lock().graph.writer_of(resource)
    }

    /// Drops the hazard record of a released resource.
    pub fn forget_resource(&self, resource: ResourceID) -> bool {
        self.state.lock().graph.forget(resource)
    }

    /// Snapshot of the inserted waits (empty unless `record_waits` is set).
    pub fn wait_trace(&self) -> Vec<WaitRecord> {
        self.state.lock().waits.clone()
    }

    /// Clears the wait trace.
    pub fn clear_wait_trace(&self) {
        self.state.lock().waits.clear();
    }

    #[track_caller]
    fn submit(
        &self,
        operation: Operation,
        queue: QueueID,
        access: &AccessSets,
        after: &[TaskHandle],
    ) -> EventResult<TaskHandle> {
        let Some(target) = self.device.queue(queue) else {
            contract_violation(format_args!(
                "queue {queue} does not exist (device has {} queues)",
                self.device.queues().len()
            ));
        };
        for handle in after {
            ensure_same_system(self.id, handle.system(), handle.id());
        }

        let Operation { kind, label, work } = operation;
        let mut state = self.state.lock();

        let limit = self.config.max_outstanding_tasks;
        if state.next_task % PRUNE_INTERVAL == 0 || state.graph.outstanding() >= limit {
            let outstanding = state.graph.prune();
            if outstanding >= limit {
                return Err(CapacityError { outstanding, limit }.into());
            }
        }

        let mut predecessors = state.graph.predecessors(access);
        predecessors.extend(after.iter().cloned());
        predecessors.sort_by_key(TaskHandle::id);
        predecessors.dedup_by_key(|t| t.id());

        let id = state.next_task;
        state.next_task += 1;

        let dependencies: Vec<TaskID> = predecessors.iter().map(TaskHandle::id).collect();
        let task = TaskHandle::new(id, self.id, queue, kind, label, access.clone(), dependencies);

        let (ordered, waits): (Vec<TaskHandle>, Vec<TaskHandle>) =
            predecessors.into_iter().partition(|p| p.queue() == queue);
        for predecessor in &waits {
            tracing::trace!(
                target: "pic_scheduler::events",
                task = id,
                queue,
                predecessor = predecessor.id(),
                predecessor_queue = predecessor.queue(),
                "wait inserted"
            );
        }
        if self.config.record_waits {
            state.waits.extend(waits.iter().map(|p| WaitRecord {
                task: id,
                task_queue: queue,
                predecessor: p.id(),
                predecessor_queue: p.queue(),
            }));
        }

        state.graph.record(&task);

        tracing::debug!(
            target: "pic_scheduler::events",
            task = id,
            queue,
            %kind,
            label = task.label(),
            dependencies = task.dependencies().len(),
            waits = waits.len(),
            "task issued"
        );

        target.submit(Submission { task: task.clone(), waits, ordered, work })?;
        drop(state);

        Ok(task)
    }
}

impl<P: QueueAssignment> std::fmt::Debug for EventSystem<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSystem")
            .field("id", &self.id)
            .field("queues", &self.device.queues().len())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}
