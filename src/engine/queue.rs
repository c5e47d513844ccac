//! # Execution Queues
//!
//! Host emulation of in-order device execution queues (streams).
//!
//! Each [`ExecutionQueue`] owns one named worker thread fed through an
//! unbounded `crossbeam_channel`. Submissions run strictly in issue order on
//! their queue. A submission may carry **cross-queue waits**: before running
//! its work, the worker blocks on the completion marker of every listed
//! predecessor. This is the host counterpart of a device-level
//! "wait for event" instruction inserted into a stream.
//!
//! ## Failure handling
//!
//! * If any predecessor failed, the task is marked `PredecessorFailed`
//!   without running. Same-queue predecessors are terminal by the time a
//!   task is dequeued, so checking them never blocks.
//! * An error returned by the work closure marks the task failed.
//! * A panic in the work closure is caught and reported as
//!   `KernelPanicked`; the worker keeps serving the queue.
//!
//! ## Shutdown
//!
//! Dropping the queue closes the channel; the worker drains what was already
//! submitted and exits, and the drop joins it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::engine::error::{DeviceError, EnvironmentError};
use crate::engine::task::{TaskHandle, Work};
use crate::engine::types::{OperationKind, QueueID};
use crate::profiling::Timeline;

/// A task handed to a queue worker.
pub(crate) struct Submission {
    pub(crate) task: TaskHandle,
    pub(crate) waits: Vec<TaskHandle>,
    pub(crate) ordered: Vec<TaskHandle>,
    pub(crate) work: Work,
}

/// One in-order execution queue.
pub struct ExecutionQueue {
    id: QueueID,
    kind: OperationKind,
    name: String,
    sender: Option<Sender<Submission>>,
    worker: Option<JoinHandle<()>>,
    submitted: AtomicU64,
}

impl ExecutionQueue {
    /// Spawns the worker thread of a new queue.
    pub fn spawn(id: QueueID, kind: OperationKind, timeline: Timeline) -> Result<Self, EnvironmentError> {
        let name = format!("queue-{id}-{kind}");
        let (sender, receiver) = unbounded::<Submission>();

        let worker_name = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(id, worker_name, receiver, timeline))
            .map_err(|source| EnvironmentError::QueueSpawn { queue: id, source })?;

        tracing::debug!(target: "pic_scheduler::queue", queue = id, %kind, "execution queue started");

        Ok(Self {
            id,
            kind,
            name,
            sender: Some(sender),
            worker: Some(worker),
            submitted: AtomicU64::new(0),
        })
    }

    /// Queue ID.
    #[inline]
    pub fn id(&self) -> QueueID {
        self.id
    }

    /// Kind of work this queue was created for.
    #[inline]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Worker thread name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of submissions accepted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Enqueues a submission. On a disconnected worker the task is failed
    /// immediately so nobody blocks on it forever.
    pub(crate) fn submit(&self, submission: Submission) -> Result<(), DeviceError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(self.fail_disconnected(&submission.task));
        };
        match sender.send(submission) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(returned) => Err(self.fail_disconnected(&returned.0.task)),
        }
    }

    fn fail_disconnected(&self, task: &TaskHandle) -> DeviceError {
        let error = DeviceError::QueueDisconnected { queue: self.id };
        task.marker().complete(Err(error.clone()));
        error
    }
}

impl Drop for ExecutionQueue {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(target: "pic_scheduler::queue", queue = self.id, "queue worker terminated abnormally");
            }
        }
    }
}

impl std::fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("submitted", &self.submitted())
            .finish()
    }
}

fn worker_loop(id: QueueID, name: String, receiver: Receiver<Submission>, timeline: Timeline) {
    timeline.lane_name(id, &name);
    for submission in receiver.iter() {
        execute(id, submission, &timeline);
    }
    tracing::debug!(target: "pic_scheduler::queue", queue = id, "execution queue drained");
}

fn execute(queue: QueueID, submission: Submission, timeline: &Timeline) {
    let Submission { task, waits, ordered, work } = submission;

    for predecessor in waits.iter().chain(&ordered) {
        if predecessor.marker().wait().is_err() {
            let error = DeviceError::PredecessorFailed { task: task.id(), predecessor: predecessor.id() };
            tracing::warn!(target: "pic_scheduler::queue", queue, task = task.id(), predecessor = predecessor.id(), "task skipped");
            task.marker().complete(Err(error));
            return;
        }
    }

    task.marker().start();
    let outcome = {
        let _span = timeline.task_span(queue, task.id(), task.label());
        let id = task.id();
        match panic::catch_unwind(AssertUnwindSafe(move || work(id))) {
            Ok(result) => result,
            Err(payload) => Err(DeviceError::KernelPanicked { task: id, message: panic_message(payload.as_ref()) }),
        }
    };

    if let Err(error) = &outcome {
        tracing::warn!(target: "pic_scheduler::queue", queue, task = task.id(), label = task.label(), %error, "task failed");
    } else {
        tracing::trace!(target: "pic_scheduler::queue", queue, task = task.id(), "task finished");
    }
    task.marker().complete(outcome);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Static description of the device, as exposed by the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceContext {
    /// Device name, used in diagnostics.
    pub name: String,
    /// Queues created for compute work.
    pub compute_queues: Vec<QueueID>,
    /// Queues created for transfer work.
    pub transfer_queues: Vec<QueueID>,
}

impl DeviceContext {
    /// Queues created for `kind`.
    pub fn queues_for(&self, kind: OperationKind) -> &[QueueID] {
        match kind {
            OperationKind::Compute => &self.compute_queues,
            OperationKind::Transfer => &self.transfer_queues,
        }
    }

    /// Total number of queues.
    pub fn queue_count(&self) -> usize {
        self.compute_queues.len() + self.transfer_queues.len()
    }
}

/// The emulated device: its context and the queues it owns.
#[derive(Debug)]
pub struct Device {
    context: DeviceContext,
    queues: Vec<ExecutionQueue>,
    timeline: Timeline,
}

impl Device {
    /// Creates `compute` compute queues followed by `transfer` transfer
    /// queues. Queue IDs are assigned in creation order starting at 0.
    pub fn new(name: impl Into<String>, compute: usize, transfer: usize) -> Result<Self, EnvironmentError> {
        let timeline = Timeline::new();
        let mut queues = Vec::with_capacity(compute + transfer);
        let mut context = DeviceContext { name: name.into(), compute_queues: Vec::new(), transfer_queues: Vec::new() };

        for (kind, count) in [(OperationKind::Compute, compute), (OperationKind::Transfer, transfer)] {
            for _ in 0..count {
                let id = queues.len() as QueueID;
                queues.push(ExecutionQueue::spawn(id, kind, timeline.clone())?);
                match kind {
                    OperationKind::Compute => context.compute_queues.push(id),
                    OperationKind::Transfer => context.transfer_queues.push(id),
                }
            }
        }

        Ok(Self { context, queues, timeline })
    }

    /// Static device description.
    #[inline]
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Queue with `id`, if it exists.
    #[inline]
    pub fn queue(&self, id: QueueID) -> Option<&ExecutionQueue> {
        self.queues.get(id as usize)
    }

    /// All queues, indexed by ID.
    #[inline]
    pub fn queues(&self) -> &[ExecutionQueue] {
        &self.queues
    }

    /// Task timeline shared by all queue workers.
    #[inline]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}
