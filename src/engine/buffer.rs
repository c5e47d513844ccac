//! # Grid Buffers
//!
//! Per-cell device buffers over a [`GridLayout`]. Each buffer has a unique
//! [`ResourceID`]; operations that touch it declare that ID in their access
//! sets, and the event system derives the ordering from there.
//!
//! Storage is a flat `Vec<T>` in the layout's linear order (axis 0 fastest)
//! behind a `parking_lot::RwLock`. Element types are `bytemuck::Pod`, so a
//! buffer can always be viewed as raw bytes for readback.
//!
//! ## Synchronization
//!
//! The lock only protects memory safety. **Ordering** between device
//! operations comes from the declared access sets. Host code that touches a
//! buffer directly must first `finish` the last operation writing it.

use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;

use crate::engine::error::contract_violation;
use crate::engine::mapping::{GridLayout, IndexRange};
use crate::engine::types::{next_resource_id, ResourceID};

/// A typed buffer holding one `T` per cell of a grid layout.
///
/// Cloning yields another handle to the **same** storage and resource ID,
/// which is how kernels capture a buffer for execution on a queue.
pub struct GridBuffer<T, const D: usize> {
    id: ResourceID,
    layout: GridLayout<D>,
    data: Arc<RwLock<Vec<T>>>,
}

impl<T, const D: usize> Clone for GridBuffer<T, D> {
    fn clone(&self) -> Self {
        Self { id: self.id, layout: self.layout, data: Arc::clone(&self.data) }
    }
}

impl<T: Pod + Send + Sync, const D: usize> GridBuffer<T, D> {
    /// Creates a buffer with every cell set to `value`.
    pub fn new(layout: GridLayout<D>, value: T) -> Self {
        Self {
            id: next_resource_id(),
            layout,
            data: Arc::new(RwLock::new(vec![value; layout.cell_count()])),
        }
    }

    /// Creates a zero-initialized buffer.
    pub fn zeroed(layout: GridLayout<D>) -> Self {
        Self::new(layout, T::zeroed())
    }

    /// Resource identity used in access sets.
    #[inline]
    pub fn id(&self) -> ResourceID {
        self.id
    }

    /// Layout the buffer is shaped by.
    #[inline]
    pub fn layout(&self) -> &GridLayout<D> {
        &self.layout
    }

    /// Number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.layout.cell_count()
    }

    /// Returns `true` for a buffer without cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `point` (host access; see the module notes on ordering).
    ///
    /// # Panics
    /// If `point` lies outside the layout.
    #[track_caller]
    pub fn get(&self, point: [usize; D]) -> T {
        self.data.read()[self.layout.linear_index(point)]
    }

    /// Copy of the whole buffer (host access).
    pub fn to_vec(&self) -> Vec<T> {
        self.data.read().clone()
    }

    /// Copy of the whole buffer as raw bytes (host access).
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(self.data.read().as_slice()).to_vec()
    }

    /// Shared lock on the storage.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.data.read()
    }

    /// Exclusive lock on the storage.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.data.write()
    }

    /// Sets every cell of `range` to `value`.
    ///
    /// # Panics
    /// If `range` leaves the layout.
    #[track_caller]
    pub fn fill_range(&self, range: &IndexRange<D>, value: T) {
        self.update_range(range, |_, cell| *cell = value);
    }

    /// Applies `kernel` to every cell of `range`, rows in parallel.
    ///
    /// # Panics
    /// If `range` leaves the layout.
    #[track_caller]
    pub fn update_range<F>(&self, range: &IndexRange<D>, kernel: F)
    where
        F: Fn([usize; D], &mut T) + Send + Sync,
    {
        self.check_range(range, "update");
        if range.is_empty() {
            return;
        }
        let layout = self.layout;
        let row_len = layout.extent()[0];
        let mut data = self.data.write();

        data.par_chunks_mut(row_len).enumerate().for_each(|(row, cells)| {
            let mut point = layout.point_of(row * row_len);
            if !(1..D).all(|axis| range.start[axis] <= point[axis] && point[axis] < range.end[axis]) {
                return;
            }
            for x in range.start[0]..range.end[0] {
                point[0] = x;
                kernel(point, &mut cells[x]);
            }
        });
    }

    /// Copies `src_range` of `src` into `dst_range` of `self`, cell by
    /// cell in range order. Source and destination may be the same buffer.
    ///
    /// # Panics
    /// If the ranges differ in shape, or either one leaves the layout.
    #[track_caller]
    pub fn copy_from(&self, src: &GridBuffer<T, D>, src_range: &IndexRange<D>, dst_range: &IndexRange<D>) {
        if src_range.size() != dst_range.size() {
            contract_violation(format_args!(
                "copy shape mismatch: source {:?} vs destination {:?}",
                src_range.size(),
                dst_range.size()
            ));
        }
        src.check_range(src_range, "copy source");
        self.check_range(dst_range, "copy destination");

        let staged: Vec<T> = {
            let source = src.data.read();
            src_range.iter().map(|p| source[src.layout.linear_index(p)]).collect()
        };
        let mut target = self.data.write();
        for (i, value) in staged.into_iter().enumerate() {
            target[self.layout.linear_index(dst_range.point_at(i))] = value;
        }
    }

    /// Returns `true` if every cell of `range` lies inside the layout.
    /// Empty ranges are always covered.
    pub fn covers(&self, range: &IndexRange<D>) -> bool {
        range.is_empty() || range.intersect(&IndexRange::new([0; D], self.layout.extent())) == *range
    }

    #[track_caller]
    pub(crate) fn check_range(&self, range: &IndexRange<D>, what: &str) {
        if !self.covers(range) {
            contract_violation(format_args!(
                "{what} range {:?}..{:?} outside buffer extent {:?}",
                range.start,
                range.end,
                self.layout.extent()
            ));
        }
    }
}

impl<T, const D: usize> std::fmt::Debug for GridBuffer<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridBuffer")
            .field("id", &self.id)
            .field("extent", &self.layout.extent())
            .finish()
    }
}
