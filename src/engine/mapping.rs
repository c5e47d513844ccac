//! # Area Mapping
//!
//! Splits the local sub-domain of a simulation into logical areas so that
//! interior work can run while boundary data is being exchanged.
//!
//! ## Areas
//!
//! ```text
//! +---+-----------------------+---+
//! | G |        Guard          | G |   G: guard (halo) cells, exchanged
//! +---+---+---------------+---+---+      with neighboring sub-domains
//! |   | B |    Border     | B |   |   B: border slabs, updated early so
//! | G +---+---------------+---+ G |      outgoing halo data is ready
//! |   | B |     Core      | B |   |
//! |   +---+---------------+---+   |
//! |   | B |    Border     | B |   |
//! +---+---+---------------+---+---+
//! | G |        Guard          | G |
//! +---+-----------------------+---+
//! ```
//!
//! * `Total` is the full local extent including guards.
//! * `Local` is `Total` with the guards trimmed (core plus borders).
//! * `Core` is `Local` with the border thickness trimmed. With the default
//!   border of zero, `Core == Local`.
//! * `Border(d)` slabs tile `Local \ Core` disjointly.
//! * `Guard(d)` is the intersection of the per-axis guard slabs of `d`.
//!   Guards of different directions overlap at shared edge and corner cells.
//!   Halo exchange relies on this overlap so corner data is never missed.
//!
//! ## Purity
//!
//! Mapping is a deterministic function of `(GridLayout, AreaSelector)`. It
//! holds no state and performs no I/O, so it is safe to call from any
//! thread or queue worker.
//!
//! ## Errors
//!
//! Requesting a direction that is not valid for the configured direction
//! set is a programming error: [`map`] panics with a diagnostic, while
//! [`checked_map`] returns a [`MappingError`] for callers validating input.

use std::fmt;

use rayon::prelude::*;

use crate::engine::error::{contract_violation, LayoutError, MappingError};

const AXIS_NAMES: [char; 3] = ['x', 'y', 'z'];

/// Classification of a direction by the number of non-zero components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectionKind {
    /// One non-zero component.
    Face,
    /// Two non-zero components.
    Edge,
    /// Three non-zero components.
    Corner,
}

/// A boundary direction of a `D`-dimensional box.
///
/// Each component is `-1`, `0` or `+1`. Faces, edges and corners are all
/// directions; which of them are exchanged is decided by the layout's
/// [`DirectionSet`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Direction<const D: usize> {
    offsets: [i8; D],
}

impl<const D: usize> Direction<D> {
    /// Creates a direction from per-axis offsets. Components are clamped to
    /// their sign.
    pub fn new(offsets: [i8; D]) -> Self {
        Self { offsets: offsets.map(i8::signum) }
    }

    /// The face direction on `axis`, towards the upper side if `positive`.
    ///
    /// # Panics
    /// If `axis >= D`; a face outside the configured dimensionality is a
    /// contract violation.
    #[track_caller]
    pub fn face(axis: usize, positive: bool) -> Self {
        if axis >= D {
            contract_violation(format_args!(
                "face on axis {axis} requested for a {D}-dimensional layout"
            ));
        }
        let mut offsets = [0i8; D];
        offsets[axis] = if positive { 1 } else { -1 };
        Self { offsets }
    }

    /// Per-axis offsets.
    #[inline]
    pub fn offsets(&self) -> [i8; D] {
        self.offsets
    }

    /// Offset on `axis`.
    #[inline]
    pub fn offset(&self, axis: usize) -> i8 {
        self.offsets[axis]
    }

    /// Number of non-zero components.
    #[inline]
    pub fn weight(&self) -> usize {
        self.offsets.iter().filter(|&&o| o != 0).count()
    }

    /// Face, edge or corner. `None` for the zero vector.
    pub fn kind(&self) -> Option<DirectionKind> {
        match self.weight() {
            1 => Some(DirectionKind::Face),
            2 => Some(DirectionKind::Edge),
            3 => Some(DirectionKind::Corner),
            _ => None,
        }
    }

    /// The mirrored direction.
    pub fn opposite(&self) -> Self {
        Self { offsets: self.offsets.map(|o| -o) }
    }

    /// Readable name such as `+x` or `-x+y`.
    pub fn name(&self) -> String {
        let mut name = String::new();
        for (axis, &o) in self.offsets.iter().enumerate() {
            if o == 0 {
                continue;
            }
            name.push(if o > 0 { '+' } else { '-' });
            name.push(AXIS_NAMES.get(axis).copied().unwrap_or('?'));
        }
        if name.is_empty() {
            name.push('0');
        }
        name
    }

    /// The `2·D` face directions, ordered by axis, lower side first.
    pub fn faces() -> Vec<Self> {
        (0..D).flat_map(|axis| [Self::face(axis, false), Self::face(axis, true)]).collect()
    }

    /// All `3^D - 1` directions: faces, then edges, then corners.
    ///
    /// Within a kind the order is lexicographic on the offsets. Halo
    /// exchange relies on lower-weight directions coming first.
    pub fn all() -> Vec<Self> {
        let count = 3usize.pow(D as u32);
        let mut out: Vec<Self> = (0..count)
            .map(|mut code| {
                let mut offsets = [0i8; D];
                for o in offsets.iter_mut() {
                    *o = (code % 3) as i8 - 1;
                    code /= 3;
                }
                Self { offsets }
            })
            .filter(|d| d.weight() > 0)
            .collect();
        out.sort_by_key(|d| (d.weight(), d.offsets));
        out
    }
}

impl<const D: usize> fmt::Debug for Direction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Direction({})", self.name())
    }
}

impl<const D: usize> fmt::Display for Direction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Exchange granularity: which directions a layout exchanges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DirectionSet {
    /// Faces only (`2·D` directions).
    Faces,
    /// Faces, edges and corners (`3^D - 1` directions).
    #[default]
    All,
}

impl DirectionSet {
    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            DirectionSet::Faces => "face-only",
            DirectionSet::All => "face+edge+corner",
        }
    }

    /// Returns `true` if `direction` is exchanged under this granularity.
    pub fn contains<const D: usize>(self, direction: &Direction<D>) -> bool {
        match self {
            DirectionSet::Faces => direction.weight() == 1,
            DirectionSet::All => direction.weight() > 0,
        }
    }

    /// Directions of this set in exchange order.
    pub fn directions<const D: usize>(self) -> Vec<Direction<D>> {
        match self {
            DirectionSet::Faces => Direction::faces(),
            DirectionSet::All => Direction::all(),
        }
    }
}

/// Logical area of a local grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AreaSelector<const D: usize> {
    /// Interior cells, excluding guards and borders.
    Core,
    /// Border slab adjacent to the boundary in the given direction.
    Border(Direction<D>),
    /// Guard (halo) slab outside the local area in the given direction.
    Guard(Direction<D>),
    /// Core plus all borders.
    Local,
    /// The full local extent including guards.
    Total,
}

/// Immutable description of one sub-domain's local grid.
///
/// ## Invariants
/// * every extent is non-zero,
/// * `guard_lower + guard_upper <= extent` on every axis,
/// * `guard_lower + guard_upper + 2·border <= extent` on every axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridLayout<const D: usize> {
    extent: [usize; D],
    guard_lower: [usize; D],
    guard_upper: [usize; D],
    border: [usize; D],
    directions: DirectionSet,
}

impl<const D: usize> GridLayout<D> {
    /// Creates a layout with the same guard width on both sides of every
    /// axis, no border, and full face+edge+corner exchange.
    pub fn new(extent: [usize; D], guard: usize) -> Result<Self, LayoutError> {
        Self::with_guards(extent, [guard; D], [guard; D])
    }

    /// Creates a layout with per-side guard widths.
    pub fn with_guards(
        extent: [usize; D],
        guard_lower: [usize; D],
        guard_upper: [usize; D],
    ) -> Result<Self, LayoutError> {
        let layout = Self {
            extent,
            guard_lower,
            guard_upper,
            border: [0; D],
            directions: DirectionSet::default(),
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Sets the border thickness per axis.
    pub fn with_border(mut self, border: [usize; D]) -> Result<Self, LayoutError> {
        self.border = border;
        self.validate()?;
        Ok(self)
    }

    /// Sets the same border thickness on every axis.
    pub fn with_uniform_border(self, border: usize) -> Result<Self, LayoutError> {
        self.with_border([border; D])
    }

    /// Sets the exchange granularity.
    pub fn with_directions(mut self, directions: DirectionSet) -> Self {
        self.directions = directions;
        self
    }

    fn validate(&self) -> Result<(), LayoutError> {
        for axis in 0..D {
            let (extent, lower, upper) = (self.extent[axis], self.guard_lower[axis], self.guard_upper[axis]);
            if extent == 0 {
                return Err(LayoutError::ZeroExtent { axis });
            }
            if lower + upper > extent {
                return Err(LayoutError::GuardTooWide { axis, lower, upper, extent });
            }
            let local = extent - lower - upper;
            if 2 * self.border[axis] > local {
                return Err(LayoutError::BorderTooWide { axis, border: self.border[axis], local });
            }
        }
        Ok(())
    }

    /// Total extent including guards.
    #[inline]
    pub fn extent(&self) -> [usize; D] {
        self.extent
    }

    /// Guard width on the lower side of each axis.
    #[inline]
    pub fn guard_lower(&self) -> [usize; D] {
        self.guard_lower
    }

    /// Guard width on the upper side of each axis.
    #[inline]
    pub fn guard_upper(&self) -> [usize; D] {
        self.guard_upper
    }

    /// Border thickness per axis.
    #[inline]
    pub fn border(&self) -> [usize; D] {
        self.border
    }

    /// Exchange granularity.
    #[inline]
    pub fn directions(&self) -> DirectionSet {
        self.directions
    }

    /// Number of cells in `Total`.
    pub fn cell_count(&self) -> usize {
        self.extent.iter().product()
    }

    /// Row-major linear index of `point`, axis 0 fastest.
    ///
    /// # Panics
    /// If `point` lies outside the extent on any axis.
    #[inline]
    #[track_caller]
    pub fn linear_index(&self, point: [usize; D]) -> usize {
        let mut index = 0;
        for axis in (0..D).rev() {
            if point[axis] >= self.extent[axis] {
                contract_violation(format_args!(
                    "point {point:?} outside extent {:?} on axis {axis}",
                    self.extent
                ));
            }
            index = index * self.extent[axis] + point[axis];
        }
        index
    }

    /// Inverse of [`GridLayout::linear_index`].
    #[inline]
    pub fn point_of(&self, mut index: usize) -> [usize; D] {
        let mut point = [0; D];
        for axis in 0..D {
            point[axis] = index % self.extent[axis];
            index /= self.extent[axis];
        }
        point
    }

    #[inline]
    fn local_lo(&self, axis: usize) -> usize {
        self.guard_lower[axis]
    }

    #[inline]
    fn local_hi(&self, axis: usize) -> usize {
        self.extent[axis] - self.guard_upper[axis]
    }

    fn check_direction(&self, direction: &Direction<D>) -> Result<(), MappingError> {
        if direction.weight() == 0 {
            return Err(MappingError::ZeroDirection { direction: direction.name() });
        }
        if !self.directions.contains(direction) {
            return Err(MappingError::NotInDirectionSet {
                direction: direction.name(),
                set: self.directions.name(),
            });
        }
        Ok(())
    }
}

/// Per-dimension index range, inclusive start and exclusive end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexRange<const D: usize> {
    /// First index on each axis.
    pub start: [usize; D],
    /// One past the last index on each axis.
    pub end: [usize; D],
}

impl<const D: usize> IndexRange<D> {
    /// Creates a range. An axis with `end <= start` makes the range empty.
    pub fn new(start: [usize; D], end: [usize; D]) -> Self {
        Self { start, end }
    }

    /// Number of cells on each axis.
    pub fn size(&self) -> [usize; D] {
        std::array::from_fn(|axis| self.end[axis].saturating_sub(self.start[axis]))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.size().iter().product()
    }

    /// Returns `true` if the range holds no cell.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `point` lies inside the range.
    pub fn contains(&self, point: [usize; D]) -> bool {
        (0..D).all(|axis| self.start[axis] <= point[axis] && point[axis] < self.end[axis])
    }

    /// Intersection of two ranges. Empty ranges are normalized so that
    /// `start == end` on at least one axis.
    pub fn intersect(&self, other: &Self) -> Self {
        let start: [usize; D] = std::array::from_fn(|a| self.start[a].max(other.start[a]));
        let end: [usize; D] = std::array::from_fn(|a| self.end[a].min(other.end[a]).max(start[a]));
        Self { start, end }
    }

    /// Returns `true` if the ranges share at least one cell.
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.intersect(other).is_empty()
    }

    /// The `index`-th point of the range, axis 0 fastest.
    #[inline]
    pub fn point_at(&self, mut index: usize) -> [usize; D] {
        let size = self.size();
        let mut point = [0; D];
        for axis in 0..D {
            point[axis] = self.start[axis] + index % size[axis];
            index /= size[axis];
        }
        point
    }

    /// Iterates over all points, axis 0 fastest.
    pub fn iter(&self) -> impl Iterator<Item = [usize; D]> + '_ {
        (0..self.len()).map(move |i| self.point_at(i))
    }

    /// Runs `kernel` once per point, in parallel on the rayon pool.
    pub fn par_for_each<F>(&self, kernel: F)
    where
        F: Fn([usize; D]) + Send + Sync,
    {
        let range = *self;
        (0..range.len()).into_par_iter().for_each(|i| kernel(range.point_at(i)));
    }
}

/// Maps `selector` onto a concrete index range of `layout`.
///
/// # Panics
/// If the selector names a direction the layout does not exchange.
#[track_caller]
pub fn map<const D: usize>(layout: &GridLayout<D>, selector: AreaSelector<D>) -> IndexRange<D> {
    match checked_map(layout, selector) {
        Ok(range) => range,
        Err(e) => contract_violation(format_args!("{e}")),
    }
}

/// Fallible form of [`map`].
pub fn checked_map<const D: usize>(
    layout: &GridLayout<D>,
    selector: AreaSelector<D>,
) -> Result<IndexRange<D>, MappingError> {
    let mut start = [0; D];
    let mut end = [0; D];

    match selector {
        AreaSelector::Total => {
            end = layout.extent;
        }
        AreaSelector::Local => {
            for axis in 0..D {
                start[axis] = layout.local_lo(axis);
                end[axis] = layout.local_hi(axis);
            }
        }
        AreaSelector::Core => {
            for axis in 0..D {
                (start[axis], end[axis]) = interior_span(layout, axis);
            }
        }
        AreaSelector::Guard(direction) => {
            layout.check_direction(&direction)?;
            for axis in 0..D {
                (start[axis], end[axis]) = match direction.offset(axis) {
                    -1 => (0, layout.local_lo(axis)),
                    1 => (layout.local_hi(axis), layout.extent[axis]),
                    _ => (0, layout.extent[axis]),
                };
            }
        }
        AreaSelector::Border(direction) => {
            layout.check_direction(&direction)?;
            // Face-only granularity: the face of the lowest slab axis owns
            // ring cells that would otherwise belong to an edge or corner.
            let face_axis = match layout.directions {
                DirectionSet::Faces => (0..D).find(|&a| direction.offset(a) != 0),
                DirectionSet::All => None,
            };
            for axis in 0..D {
                let (lo, hi, b) = (layout.local_lo(axis), layout.local_hi(axis), layout.border[axis]);
                (start[axis], end[axis]) = match direction.offset(axis) {
                    -1 => (lo, lo + b),
                    1 => (hi - b, hi),
                    _ => match face_axis {
                        Some(f) if axis > f => (lo, hi),
                        _ => interior_span(layout, axis),
                    },
                };
            }
        }
    }

    Ok(IndexRange { start, end })
}

/// The slab inside `Local` that a neighbor in `direction` needs to fill its
/// guard.
///
/// The width on each non-zero axis equals the receiving guard width of the
/// neighbor, so `exchange_source(d.opposite())` always has the same shape
/// as `Guard(d)`. That identity drives periodic self-exchange.
#[track_caller]
pub fn exchange_source<const D: usize>(layout: &GridLayout<D>, direction: Direction<D>) -> IndexRange<D> {
    if let Err(e) = layout.check_direction(&direction) {
        contract_violation(format_args!("{e}"));
    }
    let mut start = [0; D];
    let mut end = [0; D];
    for axis in 0..D {
        let (lo, hi) = (layout.local_lo(axis), layout.local_hi(axis));
        (start[axis], end[axis]) = match direction.offset(axis) {
            1 => (hi - layout.guard_lower[axis].min(hi - lo), hi),
            -1 => (lo, lo + layout.guard_upper[axis].min(hi - lo)),
            _ => (0, layout.extent[axis]),
        };
    }
    IndexRange { start, end }
}

fn interior_span<const D: usize>(layout: &GridLayout<D>, axis: usize) -> (usize, usize) {
    let b = layout.border[axis];
    (layout.local_lo(axis) + b, layout.local_hi(axis) - b)
}
