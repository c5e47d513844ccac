//! Queue assignment policies.
//!
//! The event system asks its policy which queue a new operation goes to.
//! The policy is a generic parameter of the event system, so dispatch is
//! resolved at compile time on the hot issue path.
//!
//! * [`PerKind`] (default): one dedicated queue per operation kind. Compute
//!   and transfer overlap, and operations of one kind are ordered by issue
//!   order without explicit waits.
//! * [`SingleQueue`]: everything on one queue. Fully serialized; handy when
//!   hunting a suspected missing access declaration.
//! * [`RoundRobin`]: rotates over a pool of queues per kind.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::queue::DeviceContext;
use crate::engine::types::{OperationKind, QueueID};

/// Chooses the execution queue for an operation kind.
pub trait QueueAssignment: Send + Sync {
    /// Returns the queue the next operation of `kind` is issued on and
    /// advances any internal rotation.
    fn assign(&self, kind: OperationKind) -> QueueID;

    /// Returns the queue `assign` would pick next, without advancing.
    fn peek(&self, kind: OperationKind) -> QueueID;
}

/// One dedicated queue per operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerKind {
    /// Queue for compute operations.
    pub compute: QueueID,
    /// Queue for transfer operations.
    pub transfer: QueueID,
}

impl PerKind {
    /// Uses the first queue of each kind. Falls back to the compute queue
    /// for transfers when the device has no transfer queue.
    pub fn from_device(device: &DeviceContext) -> Self {
        let compute = device.compute_queues.first().copied().unwrap_or(0);
        let transfer = device.transfer_queues.first().copied().unwrap_or(compute);
        Self { compute, transfer }
    }
}

impl QueueAssignment for PerKind {
    #[inline]
    fn assign(&self, kind: OperationKind) -> QueueID {
        match kind {
            OperationKind::Compute => self.compute,
            OperationKind::Transfer => self.transfer,
        }
    }

    #[inline]
    fn peek(&self, kind: OperationKind) -> QueueID {
        self.assign(kind)
    }
}

/// Everything on a single queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SingleQueue(pub QueueID);

impl QueueAssignment for SingleQueue {
    #[inline]
    fn assign(&self, _kind: OperationKind) -> QueueID {
        self.0
    }

    #[inline]
    fn peek(&self, _kind: OperationKind) -> QueueID {
        self.0
    }
}

/// Rotates over a pool of queues per kind.
#[derive(Debug)]
pub struct RoundRobin {
    compute: Vec<QueueID>,
    transfer: Vec<QueueID>,
    next_compute: AtomicUsize,
    next_transfer: AtomicUsize,
}

impl RoundRobin {
    /// Rotates over every queue the device created for each kind. A kind
    /// without queues borrows the pool of the other kind.
    pub fn from_device(device: &DeviceContext) -> Self {
        let compute = if device.compute_queues.is_empty() {
            device.transfer_queues.clone()
        } else {
            device.compute_queues.clone()
        };
        let transfer = if device.transfer_queues.is_empty() {
            compute.clone()
        } else {
            device.transfer_queues.clone()
        };
        Self::new(compute, transfer)
    }

    /// Rotates over explicit pools. Empty pools map to queue 0.
    pub fn new(compute: Vec<QueueID>, transfer: Vec<QueueID>) -> Self {
        Self {
            compute,
            transfer,
            next_compute: AtomicUsize::new(0),
            next_transfer: AtomicUsize::new(0),
        }
    }
}

impl RoundRobin {
    fn pool(&self, kind: OperationKind) -> (&[QueueID], &AtomicUsize) {
        match kind {
            OperationKind::Compute => (self.compute.as_slice(), &self.next_compute),
            OperationKind::Transfer => (self.transfer.as_slice(), &self.next_transfer),
        }
    }
}

impl QueueAssignment for RoundRobin {
    fn assign(&self, kind: OperationKind) -> QueueID {
        let (pool, cursor) = self.pool(kind);
        if pool.is_empty() {
            return 0;
        }
        pool[cursor.fetch_add(1, Ordering::Relaxed) % pool.len()]
    }

    fn peek(&self, kind: OperationKind) -> QueueID {
        let (pool, cursor) = self.pool(kind);
        if pool.is_empty() {
            return 0;
        }
        pool[cursor.load(Ordering::Relaxed) % pool.len()]
    }
}
