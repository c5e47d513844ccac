//! Core Identifiers, Operation Kinds, and Access Sets
//!
//! This module defines the **small, copyable identifiers** and the
//! **access declaration** types shared by every scheduling subsystem:
//! the dependency graph, the execution queues, the queue-assignment policy,
//! and the environment.
//!
//! ## Identifiers
//!
//! - [`TaskID`] numbers every issued asynchronous operation. IDs are
//!   allocated monotonically by an event system and are never reused.
//! - [`QueueID`] indexes an execution queue owned by the device.
//! - [`ResourceID`] names a buffer (or any other hazard-tracked resource).
//!
//! ## Access declaration
//!
//! Every operation declares up front which resources it reads and which it
//! writes via [`AccessSets`]. The dependency graph derives the wait set of a
//! new operation purely from this declaration, so an omitted access is a
//! silent race rather than a runtime failure. Declaration is therefore
//! mandatory at issue time.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of one issued asynchronous operation.
pub type TaskID = u64;

/// Index of an execution queue on the device.
pub type QueueID = u16;

/// Identity of a hazard-tracked resource (typically a device buffer).
pub type ResourceID = u32;

/// Identity of an event-system instance. Handles carry it so foreign
/// handles can be rejected.
pub type SystemID = u32;

static NEXT_RESOURCE: AtomicU32 = AtomicU32::new(1);

/// Allocates a fresh, process-unique [`ResourceID`].
///
/// Buffers call this on construction; callers tracking non-buffer resources
/// (e.g. a host staging area or a communication channel) may call it too.
#[inline]
pub fn next_resource_id() -> ResourceID {
    NEXT_RESOURCE.fetch_add(1, Ordering::Relaxed)
}

/// Category of an operation, consulted by the queue-assignment policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    /// Compute-bound work: kernels, field updates, particle pushes.
    Compute,
    /// Data movement: copies, fills, halo exchange, host readback.
    Transfer,
}

impl OperationKind {
    /// All kinds, in queue-creation order.
    pub const ALL: [OperationKind; 2] = [OperationKind::Compute, OperationKind::Transfer];

    /// Short lowercase name used in thread names and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Compute => "compute",
            OperationKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access mode for a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Exclusive write access (also covers read-modify-write).
    Write,
}

/// Declares the resource access set of an operation.
///
/// Both sets are kept sorted and de-duplicated. A resource present in both
/// sets is a read-modify-write and is stored in `write` only, since a write
/// already orders after every prior reader and writer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessSets {
    /// Resources read by the operation.
    pub read: Vec<ResourceID>,
    /// Resources written by the operation.
    pub write: Vec<ResourceID>,
}

impl AccessSets {
    /// An operation touching no tracked resource.
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds normalized access sets from read and write lists.
    pub fn new(read: &[ResourceID], write: &[ResourceID]) -> Self {
        let mut sets = Self { read: read.to_vec(), write: write.to_vec() };
        sets.normalize();
        sets
    }

    /// Access sets reading `read` only.
    pub fn reading(read: &[ResourceID]) -> Self {
        Self::new(read, &[])
    }

    /// Access sets writing `write` only.
    pub fn writing(write: &[ResourceID]) -> Self {
        Self::new(&[], write)
    }

    /// Adds a read of `resource` (builder-style).
    pub fn read(mut self, resource: ResourceID) -> Self {
        self.read.push(resource);
        self.normalize();
        self
    }

    /// Adds a write of `resource` (builder-style).
    pub fn write(mut self, resource: ResourceID) -> Self {
        self.write.push(resource);
        self.normalize();
        self
    }

    /// Returns the access mode for `resource`, if declared.
    pub fn mode_of(&self, resource: ResourceID) -> Option<AccessMode> {
        if self.write.binary_search(&resource).is_ok() {
            Some(AccessMode::Write)
        } else if self.read.binary_search(&resource).is_ok() {
            Some(AccessMode::Read)
        } else {
            None
        }
    }

    /// Returns `true` if no resource is declared.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty()
    }

    /// Returns `true` if this access set conflicts with another.
    ///
    /// Conflicts if `(W ∩ W)` or `(W ∩ R)` or `(R ∩ W)` is non-empty.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        intersects(&self.write, &other.write)
            || intersects(&self.write, &other.read)
            || intersects(&self.read, &other.write)
    }

    fn normalize(&mut self) {
        self.write.sort_unstable();
        self.write.dedup();
        self.read.sort_unstable();
        self.read.dedup();
        let write = &self.write;
        self.read.retain(|r| write.binary_search(r).is_err());
    }
}

/// Merge-walk over two sorted slices.
fn intersects(a: &[ResourceID], b: &[ResourceID]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}
