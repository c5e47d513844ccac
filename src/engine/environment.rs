//! # Environment
//!
//! Explicit context object owning the emulated device, its queues and the
//! event system. Every scheduling and mapping call goes through an
//! `Environment` value that the caller constructs and passes around. There
//! is no process-wide instance, so tests can run several environments side
//! by side.
//!
//! ## Operations
//!
//! The environment wraps the common device operations and derives their
//! access sets:
//!
//! | Operation | Kind | Reads | Writes |
//! |-----------|------|-------|--------|
//! | [`Environment::launch`] | caller-chosen | declared | declared |
//! | [`Environment::update`] | compute | declared | the buffer |
//! | [`Environment::fill`] | transfer | - | the buffer |
//! | [`Environment::copy`] | transfer | source | destination |
//! | [`Environment::readback`] | transfer | the buffer | - |
//! | [`Environment::exchange_periodic`] | transfer | - | the buffer |
//!
//! Everything except `readback` returns a [`TaskHandle`] without blocking.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::engine::buffer::GridBuffer;
use crate::engine::error::{contract_violation, ConfigError, DeviceError, EnvironmentError, EventResult};
use crate::engine::events::{EventSystem, EventSystemConfig};
use crate::engine::mapping::{exchange_source, map, AreaSelector, IndexRange};
use crate::engine::policy::{PerKind, QueueAssignment};
use crate::engine::queue::{Device, DeviceContext};
use crate::engine::task::{Operation, TaskHandle};
use crate::engine::types::{AccessSets, OperationKind, QueueID, ResourceID};
use crate::profiling::{self, Timeline};

/// Construction parameters of an [`Environment`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Device name used in diagnostics.
    pub name: String,
    /// Number of compute queues (at least one).
    pub compute_queues: usize,
    /// Number of transfer queues. Zero routes transfers to the compute
    /// queue under the default policy.
    pub transfer_queues: usize,
    /// Event system tunables.
    pub events: EventSystemConfig,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            name: "host".to_string(),
            compute_queues: 1,
            transfer_queues: 1,
            events: EventSystemConfig::default(),
        }
    }
}

impl EnvironmentConfig {
    /// Checks the configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compute_queues == 0 {
            return Err(ConfigError::ZeroCount { what: "compute_queues" });
        }
        self.events.validate()
    }

    /// Defaults overridden by environment variables:
    ///
    /// * `PIC_DEVICE_NAME`
    /// * `PIC_COMPUTE_QUEUES`
    /// * `PIC_TRANSFER_QUEUES`
    /// * `PIC_MAX_OUTSTANDING_TASKS`
    /// * `PIC_RECORD_WAITS` (`1`/`0`/`true`/`false`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`EnvironmentConfig::from_env`] with a custom variable
    /// source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(name) = lookup("PIC_DEVICE_NAME") {
            config.name = name;
        }
        if let Some(n) = parse_var(&lookup, "PIC_COMPUTE_QUEUES")? {
            config.compute_queues = n;
        }
        if let Some(n) = parse_var(&lookup, "PIC_TRANSFER_QUEUES")? {
            config.transfer_queues = n;
        }
        if let Some(n) = parse_var(&lookup, "PIC_MAX_OUTSTANDING_TASKS")? {
            config.events.max_outstanding_tasks = n;
        }
        if let Some(value) = lookup("PIC_RECORD_WAITS") {
            config.events.record_waits = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv { var: "PIC_RECORD_WAITS", value, expected: "boolean" })
                }
            };
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<F>(lookup: &F, var: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value, expected: "unsigned integer" }),
    }
}

/// Scheduling context: device, queues and event system.
pub struct Environment<P: QueueAssignment = PerKind> {
    config: EnvironmentConfig,
    device: Arc<Device>,
    events: EventSystem<P>,
}

impl Environment<PerKind> {
    /// Creates the device queues and an event system with the default
    /// per-kind queue assignment.
    pub fn new(config: EnvironmentConfig) -> Result<Self, EnvironmentError> {
        Self::with_policy(config, PerKind::from_device)
    }
}

impl<P: QueueAssignment> Environment<P> {
    /// Creates the device queues and an event system whose policy is built
    /// from the resulting device description.
    pub fn with_policy<F>(config: EnvironmentConfig, policy: F) -> Result<Self, EnvironmentError>
    where
        F: FnOnce(&DeviceContext) -> P,
    {
        config.validate()?;
        let device = Arc::new(Device::new(config.name.clone(), config.compute_queues, config.transfer_queues)?);
        let policy = policy(device.context());
        let events = EventSystem::with_policy(Arc::clone(&device), policy, config.events.clone());

        tracing::info!(
            target: "pic_scheduler::environment",
            device = %config.name,
            compute_queues = config.compute_queues,
            transfer_queues = config.transfer_queues,
            "environment ready"
        );

        Ok(Self { config, device, events })
    }

    /// Configuration the environment was built from.
    #[inline]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Static device description.
    #[inline]
    pub fn device(&self) -> &DeviceContext {
        self.device.context()
    }

    /// The event system.
    #[inline]
    pub fn events(&self) -> &EventSystem<P> {
        &self.events
    }

    /// Queue the next operation of `kind` goes to.
    #[inline]
    pub fn queue(&self, kind: OperationKind) -> QueueID {
        self.events.queue_for(kind)
    }

    /// Execution timeline of the queue workers.
    #[inline]
    pub fn timeline(&self) -> &Timeline {
        self.device.timeline()
    }

    /// Writes the execution timeline as Chrome Trace JSON. Writes nothing
    /// unless the `profiling` feature is enabled.
    pub fn write_timeline(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        profiling::export(self.device.timeline(), path)
    }

    /// Issues a prepared operation. See [`EventSystem::issue`].
    pub fn issue(&self, operation: Operation, access: &AccessSets) -> EventResult<TaskHandle> {
        self.events.issue(operation, access)
    }

    /// Launches `kernel` over every point of `range`, in parallel.
    pub fn launch<F, const D: usize>(
        &self,
        kind: OperationKind,
        label: impl Into<Cow<'static, str>>,
        range: IndexRange<D>,
        access: &AccessSets,
        kernel: F,
    ) -> EventResult<TaskHandle>
    where
        F: Fn([usize; D]) + Send + Sync + 'static,
    {
        let operation = Operation::new(kind, label, move |_| {
            range.par_for_each(kernel);
            Ok(())
        });
        self.events.issue(operation, access)
    }

    /// Applies `kernel` to the cells of `buffer` in `area`. The buffer is
    /// written; `reads` lists the other resources the kernel reads.
    pub fn update<T, F, const D: usize>(
        &self,
        label: impl Into<Cow<'static, str>>,
        buffer: &GridBuffer<T, D>,
        area: AreaSelector<D>,
        reads: &[ResourceID],
        kernel: F,
    ) -> EventResult<TaskHandle>
    where
        T: Pod + Send + Sync,
        F: Fn([usize; D], &mut T) + Send + Sync + 'static,
    {
        let range = map(buffer.layout(), area);
        let target = buffer.clone();
        let operation = Operation::compute(label, move || target.update_range(&range, kernel));
        self.events.issue(operation, &AccessSets::new(reads, &[buffer.id()]))
    }

    /// Sets every cell of `range` in `buffer` to `value`.
    ///
    /// # Panics
    /// If `range` leaves the buffer layout.
    #[track_caller]
    pub fn fill<T, const D: usize>(
        &self,
        buffer: &GridBuffer<T, D>,
        range: IndexRange<D>,
        value: T,
    ) -> EventResult<TaskHandle>
    where
        T: Pod + Send + Sync,
    {
        buffer.check_range(&range, "fill");
        let target = buffer.clone();
        let operation = Operation::transfer("fill", move || target.fill_range(&range, value));
        self.events.issue(operation, &AccessSets::writing(&[buffer.id()]))
    }

    /// Copies `src_range` of `src` into `dst_range` of `dst`.
    ///
    /// # Panics
    /// If the two ranges differ in shape or either one leaves its layout.
    #[track_caller]
    pub fn copy<T, const D: usize>(
        &self,
        src: &GridBuffer<T, D>,
        src_range: IndexRange<D>,
        dst: &GridBuffer<T, D>,
        dst_range: IndexRange<D>,
    ) -> EventResult<TaskHandle>
    where
        T: Pod + Send + Sync,
    {
        if src_range.size() != dst_range.size() {
            contract_violation(format_args!(
                "copy shape mismatch: source {:?} vs destination {:?}",
                src_range.size(),
                dst_range.size()
            ));
        }
        src.check_range(&src_range, "copy source");
        dst.check_range(&dst_range, "copy destination");
        let (source, target) = (src.clone(), dst.clone());
        let operation =
            Operation::transfer("copy", move || target.copy_from(&source, &src_range, &dst_range));
        self.events.issue(operation, &AccessSets::new(&[src.id()], &[dst.id()]))
    }

    /// Reads the whole buffer back to the host once every prior write has
    /// completed. Blocks.
    pub fn readback<T, const D: usize>(&self, buffer: &GridBuffer<T, D>) -> EventResult<Vec<T>>
    where
        T: Pod + Send + Sync,
    {
        let staging: Arc<Mutex<Option<Vec<T>>>> = Arc::new(Mutex::new(None));
        let (source, slot) = (buffer.clone(), Arc::clone(&staging));
        let operation = Operation::transfer("readback", move || {
            *slot.lock() = Some(source.to_vec());
        });

        let handle = self.events.issue(operation, &AccessSets::reading(&[buffer.id()]))?;
        self.events.finish(&handle)?;

        let data = staging.lock().take();
        data.ok_or_else(|| DeviceError::kernel(handle.id(), "readback produced no data").into())
    }

    /// Fills every guard of `buffer` from the opposite side of its own
    /// local area, as a sub-domain that is its own neighbor on every side.
    ///
    /// Directions are processed faces first, then edges, then corners, so
    /// corner guards end up with the diagonally opposite corner cells.
    /// Returns the handle of the last copy. Every copy writes the same
    /// buffer, so it completes after all the others.
    ///
    /// # Panics
    /// If a guard is wider than the local area on its axis.
    #[track_caller]
    pub fn exchange_periodic<T, const D: usize>(&self, buffer: &GridBuffer<T, D>) -> EventResult<TaskHandle>
    where
        T: Pod + Send + Sync,
    {
        let layout = *buffer.layout();
        let mut last = None;
        for direction in layout.directions().directions::<D>() {
            let guard = map(&layout, AreaSelector::Guard(direction));
            let source = exchange_source(&layout, direction.opposite());
            if guard.size() != source.size() {
                contract_violation(format_args!(
                    "guard {direction} of shape {:?} cannot be filled from local shape {:?}",
                    guard.size(),
                    source.size()
                ));
            }
            let target = buffer.clone();
            let label = format!("exchange {direction}");
            let operation = Operation::transfer(label, move || target.copy_from(&target, &source, &guard));
            last = Some(self.events.issue(operation, &AccessSets::writing(&[buffer.id()]))?);
        }
        tracing::debug!(target: "pic_scheduler::environment", buffer = buffer.id(), "periodic exchange issued");

        match last {
            Some(handle) => Ok(handle),
            None => self.events.join(&[]),
        }
    }

    /// Blocks until `handle` completes. See [`EventSystem::finish`].
    pub fn finish(&self, handle: &TaskHandle) -> Result<(), DeviceError> {
        self.events.finish(handle)
    }

    /// Non-blocking completion check. See [`EventSystem::poll`].
    pub fn poll(&self, handle: &TaskHandle) -> Result<bool, DeviceError> {
        self.events.poll(handle)
    }

    /// Blocks until every outstanding task has completed.
    pub fn finish_all(&self) -> Result<(), DeviceError> {
        self.events.finish_all()
    }
}

impl<P: QueueAssignment> std::fmt::Debug for Environment<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("device", self.device.context())
            .field("events", &self.events)
            .finish()
    }
}
