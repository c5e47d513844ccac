//! # Engine Module
//!
//! Scheduling core for spatially decomposed particle-in-cell simulations.
//!
//! This module contains:
//! - Area mapping of a local grid (core, borders, guards)
//! - Task handles and completion markers
//! - The per-resource dependency graph
//! - The event system that turns hazards into cross-queue waits
//! - Queue assignment policies and host-emulated execution queues
//! - Grid buffers and the environment context tying it all together
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod mapping;
pub mod task;
pub mod graph;
pub mod queue;
pub mod policy;
pub mod events;
pub mod buffer;
pub mod environment;
