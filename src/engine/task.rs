//! # Task Handles and Completion Markers
//!
//! A [`TaskHandle`] represents the result of one asynchronous operation. It
//! carries the identity of the operation, the queue it was issued on, the
//! declared access sets, the predecessors recorded at issue time, and a
//! [`CompletionMarker`]: the device-level synchronization primitive that
//! queue workers signal and host threads block on.
//!
//! ## Lifecycle
//!
//! ```text
//! Queued ──▶ Running ──▶ Finished
//!    │          │
//!    └──────────┴──────▶ Failed(DeviceError)
//! ```
//!
//! Terminal states are immutable. A handle is never reused for a different
//! operation: IDs are allocated monotonically per event system.
//!
//! Handles are cheap to clone; all clones observe the same marker.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::engine::error::DeviceError;
use crate::engine::types::{AccessSets, OperationKind, QueueID, SystemID, TaskID};

/// Execution state of a task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted to a queue, not started yet.
    Queued,
    /// Executing on its queue.
    Running,
    /// Completed successfully.
    Finished,
    /// Completed with a failure, or skipped because a predecessor failed.
    Failed(DeviceError),
}

impl TaskState {
    /// Returns `true` for `Finished` and `Failed`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed(_))
    }
}

/// Device-level completion marker shared by a task and its waiters.
#[derive(Debug)]
pub struct CompletionMarker {
    state: Mutex<TaskState>,
    signal: Condvar,
}

impl CompletionMarker {
    fn new() -> Self {
        Self { state: Mutex::new(TaskState::Queued), signal: Condvar::new() }
    }

    /// Current state (snapshot).
    pub fn state(&self) -> TaskState {
        self.state.lock().clone()
    }

    /// Moves a queued task to `Running`. Terminal states are left untouched.
    pub(crate) fn start(&self) {
        let mut state = self.state.lock();
        if *state == TaskState::Queued {
            *state = TaskState::Running;
        }
    }

    /// Publishes the terminal state and wakes all waiters. The first
    /// terminal state wins.
    pub(crate) fn complete(&self, outcome: Result<(), DeviceError>) {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return;
        }
        *state = match outcome {
            Ok(()) => TaskState::Finished,
            Err(e) => TaskState::Failed(e),
        };
        self.signal.notify_all();
    }

    /// Blocks until the marker is terminal.
    pub fn wait(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        while !state.is_terminal() {
            self.signal.wait(&mut state);
        }
        outcome_of(&state)
    }

    /// Non-blocking completion check.
    pub fn try_outcome(&self) -> Option<Result<(), DeviceError>> {
        let state = self.state.lock();
        state.is_terminal().then(|| outcome_of(&state))
    }
}

fn outcome_of(state: &TaskState) -> Result<(), DeviceError> {
    match state {
        TaskState::Failed(e) => Err(e.clone()),
        _ => Ok(()),
    }
}

#[derive(Debug)]
struct TaskInner {
    id: TaskID,
    system: SystemID,
    queue: QueueID,
    kind: OperationKind,
    label: Cow<'static, str>,
    access: AccessSets,
    dependencies: Vec<TaskID>,
    marker: CompletionMarker,
}

/// Handle to one issued asynchronous operation.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

impl TaskHandle {
    pub(crate) fn new(
        id: TaskID,
        system: SystemID,
        queue: QueueID,
        kind: OperationKind,
        label: Cow<'static, str>,
        access: AccessSets,
        dependencies: Vec<TaskID>,
    ) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id,
                system,
                queue,
                kind,
                label,
                access,
                dependencies,
                marker: CompletionMarker::new(),
            }),
        }
    }

    /// Unique task ID.
    #[inline]
    pub fn id(&self) -> TaskID {
        self.inner.id
    }

    /// Queue the task was issued on.
    #[inline]
    pub fn queue(&self) -> QueueID {
        self.inner.queue
    }

    /// Operation kind.
    #[inline]
    pub fn kind(&self) -> OperationKind {
        self.inner.kind
    }

    /// Human-readable label of the operation.
    #[inline]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Declared access sets.
    #[inline]
    pub fn access(&self) -> &AccessSets {
        &self.inner.access
    }

    /// Predecessors recorded at issue time, ascending, same-queue ones
    /// included.
    #[inline]
    pub fn dependencies(&self) -> &[TaskID] {
        &self.inner.dependencies
    }

    /// Returns `true` if `other` was recorded as a predecessor.
    pub fn depends_on(&self, other: &TaskHandle) -> bool {
        self.inner.dependencies.binary_search(&other.id()).is_ok()
    }

    /// Current execution state (snapshot).
    pub fn state(&self) -> TaskState {
        self.inner.marker.state()
    }

    /// Returns `true` once the task reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    #[inline]
    pub(crate) fn system(&self) -> SystemID {
        self.inner.system
    }

    #[inline]
    pub(crate) fn marker(&self) -> &CompletionMarker {
        &self.inner.marker
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("queue", &self.inner.queue)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.system == other.inner.system && self.inner.id == other.inner.id
    }
}

impl Eq for TaskHandle {}

/// Work executed by a queue worker. The argument is the task's own ID, for
/// error reporting.
pub type Work = Box<dyn FnOnce(TaskID) -> Result<(), DeviceError> + Send + 'static>;

/// An asynchronous operation waiting to be issued.
pub struct Operation {
    pub(crate) kind: OperationKind,
    pub(crate) label: Cow<'static, str>,
    pub(crate) work: Work,
}

impl Operation {
    /// Creates an operation of `kind` running a fallible closure.
    pub fn new<F>(kind: OperationKind, label: impl Into<Cow<'static, str>>, work: F) -> Self
    where
        F: FnOnce(TaskID) -> Result<(), DeviceError> + Send + 'static,
    {
        Self { kind, label: label.into(), work: Box::new(work) }
    }

    /// A compute operation that cannot fail.
    pub fn compute<F>(label: impl Into<Cow<'static, str>>, work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(OperationKind::Compute, label, move |_| {
            work();
            Ok(())
        })
    }

    /// A transfer operation that cannot fail.
    pub fn transfer<F>(label: impl Into<Cow<'static, str>>, work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(OperationKind::Transfer, label, move |_| {
            work();
            Ok(())
        })
    }

    /// An operation with no work. Completes once its waits are satisfied.
    pub fn barrier(kind: OperationKind, label: impl Into<Cow<'static, str>>) -> Self {
        Self::new(kind, label, |_| Ok(()))
    }

    /// Operation kind.
    #[inline]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Operation label.
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").field("kind", &self.kind).field("label", &self.label).finish()
    }
}
