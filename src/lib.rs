//! # PIC Scheduler
//!
//! Event/task dependency scheduling and area mapping for spatially
//! decomposed particle-in-cell simulations.
//!
//! ## Design Goals
//! - Overlap interior compute with boundary (halo) exchange
//! - Dependencies derived from declared resource access, never guessed
//! - Waits only across queues; in-order queues cover the rest
//! - Explicit context objects, no process-wide singletons
//!
//! This crate builds as both:
//! - `rlib` (for Rust usage & integration tests)
//! - `cdylib` (for FFI / DLL usage)

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;
pub mod logging;
pub mod profiling;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Area mapping

pub use engine::mapping::{
    map,
    checked_map,
    exchange_source,
    AreaSelector,
    Direction,
    DirectionKind,
    DirectionSet,
    GridLayout,
    IndexRange,
};

// Scheduling

pub use engine::task::{
    CompletionMarker,
    Operation,
    TaskHandle,
    TaskState,
};

pub use engine::events::{
    EventSystem,
    EventSystemConfig,
    WaitRecord,
};

pub use engine::policy::{
    QueueAssignment,
    PerKind,
    RoundRobin,
    SingleQueue,
};

pub use engine::queue::{
    Device,
    DeviceContext,
    ExecutionQueue,
};

pub use engine::buffer::GridBuffer;

pub use engine::environment::{
    Environment,
    EnvironmentConfig,
};

pub use engine::error::{
    EventResult,
    EventError,
    DeviceError,
    CapacityError,
    ConfigError,
    EnvironmentError,
    LayoutError,
    MappingError,
};

pub use engine::types::{
    AccessMode,
    AccessSets,
    OperationKind,
    QueueID,
    ResourceID,
    TaskID,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used scheduling types.
///
/// Import with:
/// ```rust
/// use pic_scheduler::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        map,
        AccessSets,
        AreaSelector,
        Direction,
        DirectionSet,
        Environment,
        EnvironmentConfig,
        GridBuffer,
        GridLayout,
        IndexRange,
        Operation,
        OperationKind,
        TaskHandle,
    };
}
