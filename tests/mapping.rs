use std::collections::HashMap;

use pic_scheduler::engine::mapping::{
    checked_map, exchange_source, map, AreaSelector, Direction, DirectionKind, DirectionSet, GridLayout,
    IndexRange,
};
use pic_scheduler::engine::error::{LayoutError, MappingError};

fn layout_3d() -> GridLayout<3> {
    GridLayout::new([64, 64, 64], 2).unwrap()
}

/// Counts how many of `ranges` contain each point of `area`.
fn coverage<const D: usize>(area: &IndexRange<D>, ranges: &[IndexRange<D>]) -> HashMap<[usize; D], usize> {
    let mut hits: HashMap<[usize; D], usize> = area.iter().map(|p| (p, 0)).collect();
    for range in ranges {
        for p in range.iter() {
            *hits.entry(p).or_insert(0) += 1;
        }
    }
    hits
}

fn partition_of<const D: usize>(layout: &GridLayout<D>) -> Vec<IndexRange<D>> {
    let mut ranges = vec![map(layout, AreaSelector::Core)];
    for d in layout.directions().directions::<D>() {
        ranges.push(map(layout, AreaSelector::Border(d)));
    }
    ranges
}

#[test]
fn total_local_and_core_for_default_border() {
    let layout = layout_3d();

    assert_eq!(map(&layout, AreaSelector::Total), IndexRange::new([0; 3], [64; 3]));
    assert_eq!(map(&layout, AreaSelector::Local), IndexRange::new([2; 3], [62; 3]));
    assert_eq!(map(&layout, AreaSelector::Core), map(&layout, AreaSelector::Local));
    assert_eq!(map(&layout, AreaSelector::Core).len(), 60 * 60 * 60);
}

#[test]
fn face_guards_span_the_full_extent_on_other_axes() {
    let layout = layout_3d();

    let plus_x = map(&layout, AreaSelector::Guard(Direction::face(0, true)));
    assert_eq!(plus_x, IndexRange::new([62, 0, 0], [64, 64, 64]));

    let minus_z = map(&layout, AreaSelector::Guard(Direction::face(2, false)));
    assert_eq!(minus_z, IndexRange::new([0, 0, 0], [64, 64, 2]));
}

#[test]
fn guard_corner_is_intersection_of_face_guards() {
    let layout = GridLayout::new([10, 8], 2).unwrap();

    let gx = map(&layout, AreaSelector::Guard(Direction::face(0, true)));
    let gy = map(&layout, AreaSelector::Guard(Direction::face(1, true)));
    let corner = map(&layout, AreaSelector::Guard(Direction::new([1, 1])));

    assert_eq!(corner, IndexRange::new([8, 6], [10, 8]));
    assert_eq!(corner.len(), 2 * 2);
    assert_eq!(corner, gx.intersect(&gy));

    // Guards of neighboring directions share the corner cells.
    assert!(gx.overlaps(&gy));
    assert!(gx.overlaps(&corner));
}

#[test]
fn core_and_face_guards_cover_total() {
    let layout = layout_3d();
    let total = map(&layout, AreaSelector::Total);

    let mut ranges = vec![map(&layout, AreaSelector::Core)];
    ranges.extend(Direction::<3>::faces().into_iter().map(|d| map(&layout, AreaSelector::Guard(d))));

    // Spot-check a few planes instead of all 262k cells.
    for p in [[0, 0, 0], [63, 63, 63], [1, 30, 62], [31, 31, 31], [2, 2, 61], [62, 1, 40]] {
        assert!(ranges.iter().any(|r| r.contains(p)), "{p:?} not covered");
    }
    let guard_cells: usize = total.len() - map(&layout, AreaSelector::Local).len();
    assert!(guard_cells > 0);
}

#[test]
fn border_partition_is_exact_with_all_directions() {
    let layout = GridLayout::new([12, 10, 9], 1).unwrap().with_uniform_border(2).unwrap();
    let local = map(&layout, AreaSelector::Local);

    let ranges = partition_of(&layout);
    assert_eq!(ranges.len(), 27);

    let hits = coverage(&local, &ranges);
    assert!(hits.iter().all(|(_, &n)| n == 1));
    assert_eq!(hits.len(), local.len());
}

#[test]
fn border_partition_is_exact_with_faces_only() {
    let layout = GridLayout::new([12, 10, 9], 1)
        .unwrap()
        .with_uniform_border(2)
        .unwrap()
        .with_directions(DirectionSet::Faces);
    let local = map(&layout, AreaSelector::Local);

    let ranges = partition_of(&layout);
    assert_eq!(ranges.len(), 7);

    let hits = coverage(&local, &ranges);
    assert!(hits.values().all(|&n| n == 1));
    assert_eq!(hits.len(), local.len());
}

#[test]
fn core_excludes_border() {
    let layout = GridLayout::new([16, 16], 2).unwrap().with_uniform_border(3).unwrap();

    assert_eq!(map(&layout, AreaSelector::Core), IndexRange::new([5, 5], [11, 11]));
    assert_eq!(
        map(&layout, AreaSelector::Border(Direction::face(0, false))),
        IndexRange::new([2, 5], [5, 11])
    );
    assert_eq!(
        map(&layout, AreaSelector::Border(Direction::new([1, -1]))),
        IndexRange::new([11, 2], [14, 5])
    );
}

#[test]
fn direction_enumeration() {
    let all = Direction::<3>::all();
    assert_eq!(all.len(), 26);
    assert_eq!(Direction::<3>::faces().len(), 6);
    assert!(all.windows(2).all(|w| w[0].weight() <= w[1].weight()));

    assert_eq!(all[0].kind(), Some(DirectionKind::Face));
    assert_eq!(all[25].kind(), Some(DirectionKind::Corner));
    assert_eq!(all.iter().filter(|d| d.kind() == Some(DirectionKind::Edge)).count(), 12);

    assert_eq!(Direction::<2>::all().len(), 8);
}

#[test]
fn direction_names_and_opposites() {
    assert_eq!(Direction::<3>::face(0, true).name(), "+x");
    assert_eq!(Direction::new([-1, 1, 0]).name(), "-x+y");
    assert_eq!(Direction::new([5i8, 0]).offsets(), [1, 0]);

    let d = Direction::new([1, 0, -1]);
    assert_eq!(d.opposite().offsets(), [-1, 0, 1]);
    assert_eq!(d.opposite().opposite(), d);
}

#[test]
fn checked_map_reports_invalid_directions() {
    let layout = GridLayout::new([8, 8], 1).unwrap().with_directions(DirectionSet::Faces);

    let edge = AreaSelector::Guard(Direction::new([1, 1]));
    assert!(matches!(checked_map(&layout, edge), Err(MappingError::NotInDirectionSet { .. })));

    let zero = AreaSelector::Border(Direction::new([0, 0]));
    assert!(matches!(checked_map(&layout, zero), Err(MappingError::ZeroDirection { .. })));

    assert!(checked_map(&layout, AreaSelector::Guard(Direction::face(1, false))).is_ok());
}

#[test]
#[should_panic(expected = "contract violation")]
fn map_panics_on_edge_under_faces_only() {
    let layout = GridLayout::new([8, 8, 8], 1).unwrap().with_directions(DirectionSet::Faces);
    let _ = map(&layout, AreaSelector::Border(Direction::new([1, 0, 1])));
}

#[test]
#[should_panic(expected = "contract violation")]
fn map_panics_on_zero_direction() {
    let layout = layout_3d();
    let _ = map(&layout, AreaSelector::Guard(Direction::new([0, 0, 0])));
}

#[test]
#[should_panic(expected = "contract violation")]
fn face_outside_dimensionality_panics() {
    let _ = Direction::<2>::face(2, true);
}

#[test]
fn layout_construction_errors() {
    assert_eq!(GridLayout::new([4, 0], 0), Err(LayoutError::ZeroExtent { axis: 1 }));
    assert_eq!(
        GridLayout::new([4, 8], 3),
        Err(LayoutError::GuardTooWide { axis: 0, lower: 3, upper: 3, extent: 4 })
    );
    assert_eq!(
        GridLayout::new([10, 10], 1).unwrap().with_uniform_border(5),
        Err(LayoutError::BorderTooWide { axis: 0, border: 5, local: 8 })
    );
    assert!(GridLayout::with_guards([10, 10], [1, 0], [0, 3]).is_ok());
}

#[test]
fn exchange_source_matches_opposite_guard_shape() {
    let layout = layout_3d();

    let src = exchange_source(&layout, Direction::face(0, true));
    assert_eq!(src, IndexRange::new([60, 0, 0], [62, 64, 64]));

    for d in Direction::<3>::all() {
        let guard = map(&layout, AreaSelector::Guard(d));
        let source = exchange_source(&layout, d.opposite());
        assert_eq!(guard.size(), source.size(), "direction {d}");
        assert!(!source.overlaps(&guard));
    }
}

#[test]
fn asymmetric_guards() {
    let layout = GridLayout::with_guards([10], [1], [3]).unwrap();

    assert_eq!(map(&layout, AreaSelector::Local), IndexRange::new([1], [7]));
    assert_eq!(map(&layout, AreaSelector::Guard(Direction::face(0, true))), IndexRange::new([7], [10]));
    // The upper guard is filled from the lower side of the local area.
    assert_eq!(exchange_source(&layout, Direction::face(0, false)), IndexRange::new([1], [4]));
}

#[test]
fn index_range_basics() {
    let r = IndexRange::new([1, 2], [4, 4]);
    assert_eq!(r.size(), [3, 2]);
    assert_eq!(r.len(), 6);
    assert_eq!(r.iter().take(4).collect::<Vec<_>>(), vec![[1, 2], [2, 2], [3, 2], [1, 3]]);

    let empty = r.intersect(&IndexRange::new([5, 0], [9, 9]));
    assert!(empty.is_empty());
    assert!(!r.overlaps(&empty));

    assert!(IndexRange::new([3, 3], [2, 5]).is_empty());
}

#[test]
fn par_for_each_visits_every_point_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let layout = GridLayout::new([20, 12, 6], 1).unwrap();
    let core = map(&layout, AreaSelector::Core);
    let visits: Vec<AtomicUsize> = (0..layout.cell_count()).map(|_| AtomicUsize::new(0)).collect();

    core.par_for_each(|p| {
        visits[layout.linear_index(p)].fetch_add(1, Ordering::Relaxed);
    });

    for (i, v) in visits.iter().enumerate() {
        let expected = usize::from(core.contains(layout.point_of(i)));
        assert_eq!(v.load(Ordering::Relaxed), expected);
    }
}

#[test]
fn linear_index_is_axis_zero_fastest() {
    let layout = GridLayout::new([4, 3, 2], 0).unwrap();
    assert_eq!(layout.linear_index([1, 0, 0]), 1);
    assert_eq!(layout.linear_index([0, 1, 0]), 4);
    assert_eq!(layout.linear_index([0, 0, 1]), 12);
    assert_eq!(layout.point_of(23), [3, 2, 1]);
}

#[test]
#[should_panic(expected = "contract violation")]
fn linear_index_rejects_points_outside_the_extent() {
    let layout = GridLayout::new([4, 4], 0).unwrap();
    let _ = layout.linear_index([5, 0]);
}
