//! Chrome Trace execution timeline of the queue workers.
//!
//! With the `profiling` feature enabled, every task run by a queue worker is
//! recorded as a complete (`"X"`) event on the lane of its queue, and the
//! timeline can be written out as **Chrome Trace Event JSON** for:
//!
//! - `chrome://tracing`
//! - <https://ui.perfetto.dev>
//!
//! ## Feature flag
//!
//! ```bash
//! cargo test --features profiling
//! ```
//!
//! Without the feature the [`Timeline`] is a zero-sized type and every call
//! compiles to a no-op.
//!
//! ## Usage
//!
//! ```no_run
//! use pic_scheduler::{Environment, EnvironmentConfig};
//!
//! let env = Environment::new(EnvironmentConfig::default()).unwrap();
//! // issue work ...
//! env.finish_all().unwrap();
//! env.timeline().write_chrome_trace("profile/trace.json").unwrap();
//! ```
//!
//! Lanes are keyed by queue ID, so overlap between the compute and transfer
//! queues is visible directly in the trace viewer.
pub mod timeline;

pub use timeline::{export, TaskSpan, Timeline};
