//! Task timeline recorder.
//!
//! Feature-gated with `--features profiling`; see the module docs of
//! [`crate::profiling`].

use std::io;
use std::path::Path;

use crate::engine::types::{QueueID, TaskID};

#[cfg(feature = "profiling")]
mod enabled {
    use std::fs::{self, File};
    use std::io::{self, BufWriter, Write};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Instant;

    use parking_lot::Mutex;
    use serde::Serialize;

    use super::{QueueID, TaskID};

    const PID: u32 = 1;

    /// One Chrome trace event: a complete span (`ph:"X"`) or lane metadata
    /// (`ph:"M"`).
    #[derive(Debug, Serialize)]
    struct TraceEvent {
        name: String,
        ph: &'static str,
        ts: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        dur: Option<u64>,
        pid: u32,
        tid: u64,
        args: serde_json::Value,
    }

    #[derive(Serialize)]
    struct TraceFile<'a> {
        #[serde(rename = "traceEvents")]
        trace_events: &'a [TraceEvent],
        #[serde(rename = "displayTimeUnit")]
        display_time_unit: &'static str,
    }

    #[derive(Debug)]
    struct Inner {
        origin: Instant,
        events: Mutex<Vec<TraceEvent>>,
    }

    /// Shared recorder; clones append to the same event list.
    #[derive(Clone, Debug)]
    pub struct Timeline {
        inner: Arc<Inner>,
    }

    impl Default for Timeline {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Timeline {
        /// Creates an empty timeline whose clock starts now.
        pub fn new() -> Self {
            Self { inner: Arc::new(Inner { origin: Instant::now(), events: Mutex::new(Vec::new()) }) }
        }

        fn now_us(&self) -> u64 {
            self.inner.origin.elapsed().as_micros() as u64
        }

        /// Names the lane of `queue`.
        pub fn lane_name(&self, queue: QueueID, name: &str) {
            let event = TraceEvent {
                name: "thread_name".to_string(),
                ph: "M",
                ts: 0,
                dur: None,
                pid: PID,
                tid: u64::from(queue),
                args: serde_json::json!({ "name": name }),
            };
            self.inner.events.lock().push(event);
        }

        /// Starts a span for `task` on `queue`; recorded when the guard drops.
        pub fn task_span(&self, queue: QueueID, task: TaskID, label: &str) -> TaskSpan {
            TaskSpan {
                timeline: self.clone(),
                queue,
                task,
                label: label.to_string(),
                start_us: self.now_us(),
            }
        }

        /// Number of recorded events, metadata included.
        pub fn event_count(&self) -> usize {
            self.inner.events.lock().len()
        }

        /// Writes the timeline as Chrome Trace JSON, creating parent
        /// directories as needed.
        pub fn write_chrome_trace(&self, path: impl AsRef<Path>) -> io::Result<()> {
            let path = path.as_ref();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let events = self.inner.events.lock();
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer(
                &mut writer,
                &TraceFile { trace_events: &events, display_time_unit: "ms" },
            )
            .map_err(io::Error::from)?;
            writer.flush()
        }
    }

    /// RAII span of one task execution.
    #[must_use = "the span is recorded when the guard drops"]
    pub struct TaskSpan {
        timeline: Timeline,
        queue: QueueID,
        task: TaskID,
        label: String,
        start_us: u64,
    }

    impl Drop for TaskSpan {
        fn drop(&mut self) {
            let end_us = self.timeline.now_us();
            let event = TraceEvent {
                name: std::mem::take(&mut self.label),
                ph: "X",
                ts: self.start_us,
                dur: Some(end_us.saturating_sub(self.start_us)),
                pid: PID,
                tid: u64::from(self.queue),
                args: serde_json::json!({ "task": self.task }),
            };
            self.timeline.inner.events.lock().push(event);
        }
    }
}

#[cfg(not(feature = "profiling"))]
mod disabled {
    use std::io;
    use std::path::Path;

    use super::{QueueID, TaskID};

    /// No-op timeline (the `profiling` feature is disabled).
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Timeline;

    impl Timeline {
        /// Creates a no-op timeline.
        #[inline(always)]
        pub fn new() -> Self {
            Timeline
        }

        /// No-op.
        #[inline(always)]
        pub fn lane_name(&self, _queue: QueueID, _name: &str) {}

        /// No-op span.
        #[inline(always)]
        pub fn task_span(&self, _queue: QueueID, _task: TaskID, _label: &str) -> TaskSpan {
            TaskSpan
        }

        /// Always zero.
        #[inline(always)]
        pub fn event_count(&self) -> usize {
            0
        }

        /// Writes nothing.
        #[inline(always)]
        pub fn write_chrome_trace(&self, _path: impl AsRef<Path>) -> io::Result<()> {
            Ok(())
        }
    }

    /// No-op span guard.
    #[must_use = "the span is recorded when the guard drops"]
    pub struct TaskSpan;
}

#[cfg(feature = "profiling")]
pub use enabled::{TaskSpan, Timeline};

#[cfg(not(feature = "profiling"))]
pub use disabled::{TaskSpan, Timeline};

/// Writes `timeline` to `path` and logs where it went.
pub fn export(timeline: &Timeline, path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    timeline.write_chrome_trace(path)?;
    tracing::info!(
        target: "pic_scheduler::profiling",
        path = %path.display(),
        events = timeline.event_count(),
        "timeline written"
    );
    Ok(())
}
