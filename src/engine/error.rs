//! Error types for layout construction, area mapping, and asynchronous
//! task execution.
//!
//! The scheduling core distinguishes three classes of failure:
//!
//! * **Contract errors.** An invalid direction for the configured
//!   dimensionality, a handle from a foreign event system, or a queue that
//!   does not exist. These are programming errors. Continuing would risk
//!   silent data corruption, so the public entry points log them and panic.
//!   [`MappingError`] is still exposed for callers that want to validate a
//!   selector up front via `checked_map`.
//! * **Device/runtime failures.** A kernel reported an error or panicked, or
//!   a predecessor failed. These are carried by [`DeviceError`] and surfaced
//!   through `finish`/`poll`. The stepping loop decides whether to abort.
//! * **Resource exhaustion.** Too many outstanding tasks after pruning.
//!   Bounded pruning is implemented, so this is reported as a recoverable
//!   [`CapacityError`].
//!
//! Low-level errors convert into the aggregates [`EventError`] and
//! [`EnvironmentError`] through `From`, so callers can use `?` throughout.
//!
//! ## Display vs. Debug
//! * `Display` is short and suitable for operator logs.
//! * `Debug` (derived) keeps the full structure for diagnostics.

use thiserror::Error;

use crate::engine::types::{QueueID, SystemID, TaskID};

/// Result alias for event-system operations.
pub type EventResult<T> = Result<T, EventError>;

/// Returned when a [`GridLayout`](crate::engine::mapping::GridLayout) would
/// violate one of its construction invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// An axis has zero cells.
    #[error("axis {axis} has zero extent")]
    ZeroExtent {
        /// Offending axis.
        axis: usize,
    },

    /// Guards on both sides of an axis leave no room for a core.
    #[error("guard {lower}+{upper} exceeds extent {extent} on axis {axis}")]
    GuardTooWide {
        /// Offending axis.
        axis: usize,
        /// Guard width on the lower side.
        lower: usize,
        /// Guard width on the upper side.
        upper: usize,
        /// Total extent of the axis.
        extent: usize,
    },

    /// Borders on both sides plus the guards exceed the extent.
    #[error("border {border} per side does not fit into local extent {local} on axis {axis}")]
    BorderTooWide {
        /// Offending axis.
        axis: usize,
        /// Border thickness per side.
        border: usize,
        /// Local (guard-trimmed) extent of the axis.
        local: usize,
    },
}

/// Returned by `checked_map` when a selector is not valid for the layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The direction vector has no non-zero component.
    #[error("direction {direction} points nowhere")]
    ZeroDirection {
        /// Readable form of the direction.
        direction: String,
    },

    /// The direction is not part of the configured direction set.
    #[error("direction {direction} is not exchanged under {set} granularity")]
    NotInDirectionSet {
        /// Readable form of the direction.
        direction: String,
        /// Name of the configured direction set.
        set: &'static str,
    },
}

/// A failure reported by a device execution queue.
///
/// Stored in the completion marker of the failed task and handed out by
/// every subsequent `finish`/`poll`, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The operation returned an error.
    #[error("task {task} failed: {message}")]
    KernelFailed {
        /// Failed task.
        task: TaskID,
        /// Message reported by the operation.
        message: String,
    },

    /// The operation panicked while executing on its queue.
    #[error("task {task} panicked: {message}")]
    KernelPanicked {
        /// Failed task.
        task: TaskID,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// A predecessor failed, so the task was never started.
    #[error("task {task} skipped because predecessor {predecessor} failed")]
    PredecessorFailed {
        /// Skipped task.
        task: TaskID,
        /// First failed predecessor.
        predecessor: TaskID,
    },

    /// The queue worker is gone and cannot accept or complete work.
    #[error("execution queue {queue} is disconnected")]
    QueueDisconnected {
        /// Queue that refused the submission.
        queue: QueueID,
    },
}

impl DeviceError {
    /// Creates a [`DeviceError::KernelFailed`] for `task`.
    pub fn kernel(task: TaskID, message: impl Into<String>) -> Self {
        DeviceError::KernelFailed { task, message: message.into() }
    }
}

/// Returned when too many tasks are outstanding, even after pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too many outstanding tasks ({outstanding} outstanding; limit {limit})")]
pub struct CapacityError {
    /// Unfinished tasks currently tracked.
    pub outstanding: usize,
    /// Configured maximum.
    pub limit: usize,
}

/// Aggregate error of the event system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// A device-level failure.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The outstanding-task limit was reached.
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

/// Returned when configuration values are inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A count that must be positive was zero.
    #[error("{what} must be at least 1")]
    ZeroCount {
        /// Name of the offending setting.
        what: &'static str,
    },

    /// An environment variable could not be parsed.
    #[error("environment variable {var}={value:?} is not a valid {expected}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Expected type.
        expected: &'static str,
    },
}

/// Aggregate error of environment construction.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// Invalid grid layout.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A queue worker thread could not be spawned.
    #[error("failed to spawn worker for queue {queue}: {source}")]
    QueueSpawn {
        /// Queue whose worker failed to start.
        queue: QueueID,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Logs a contract violation and aborts the current operation.
///
/// Contract violations are programming errors; continuing would risk silent
/// data corruption.
#[cold]
#[track_caller]
pub(crate) fn contract_violation(message: std::fmt::Arguments<'_>) -> ! {
    tracing::error!(target: "pic_scheduler::contract", "{message}");
    panic!("contract violation: {message}");
}

/// Contract check for handles crossing event-system instances.
#[track_caller]
pub(crate) fn ensure_same_system(expected: SystemID, actual: SystemID, task: TaskID) {
    if expected != actual {
        contract_violation(format_args!(
            "task {task} belongs to event system {actual}, not {expected}"
        ));
    }
}
