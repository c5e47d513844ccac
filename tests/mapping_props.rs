use proptest::prelude::*;

use pic_scheduler::engine::mapping::{map, AreaSelector, DirectionSet, GridLayout, IndexRange};

/// (local extent, lower guard, upper guard, border) per axis.
fn axis() -> impl Strategy<Value = (usize, usize, usize, usize)> {
    (1usize..7, 0usize..3, 0usize..3, 0usize..4)
        .prop_map(|(local, lo, hi, b)| (local, lo, hi, b % (local / 2 + 1)))
}

fn layout_3d(axes: [(usize, usize, usize, usize); 3], directions: DirectionSet) -> GridLayout<3> {
    let extent = axes.map(|(local, lo, hi, _)| local + lo + hi);
    GridLayout::with_guards(extent, axes.map(|a| a.1), axes.map(|a| a.2))
        .and_then(|l| l.with_border(axes.map(|a| a.3)))
        .unwrap()
        .with_directions(directions)
}

fn count_hits(point: [usize; 3], ranges: &[IndexRange<3>]) -> usize {
    ranges.iter().filter(|r| r.contains(point)).count()
}

fn directions() -> impl Strategy<Value = DirectionSet> {
    prop_oneof![Just(DirectionSet::Faces), Just(DirectionSet::All)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn core_and_borders_partition_local(
        axes in [axis(), axis(), axis()],
        set in directions(),
    ) {
        let layout = layout_3d(axes, set);
        let total = map(&layout, AreaSelector::Total);
        let local = map(&layout, AreaSelector::Local);

        let mut ranges = vec![map(&layout, AreaSelector::Core)];
        ranges.extend(set.directions::<3>().into_iter().map(|d| map(&layout, AreaSelector::Border(d))));

        for p in total.iter() {
            let expected = usize::from(local.contains(p));
            prop_assert_eq!(count_hits(p, &ranges), expected, "point {:?}", p);
        }
    }

    #[test]
    fn guards_cover_exactly_the_halo(
        axes in [axis(), axis(), axis()],
        set in directions(),
    ) {
        let layout = layout_3d(axes, set);
        let total = map(&layout, AreaSelector::Total);
        let local = map(&layout, AreaSelector::Local);

        let guards: Vec<IndexRange<3>> = set
            .directions::<3>()
            .into_iter()
            .map(|d| map(&layout, AreaSelector::Guard(d)))
            .collect();

        for g in &guards {
            prop_assert!(!g.overlaps(&local));
        }
        for p in total.iter() {
            let covered = count_hits(p, &guards) > 0;
            prop_assert_eq!(covered, !local.contains(p), "point {:?}", p);
        }
    }

    #[test]
    fn every_area_lies_inside_total(
        axes in [axis(), axis(), axis()],
        set in directions(),
    ) {
        let layout = layout_3d(axes, set);
        let total = map(&layout, AreaSelector::Total);

        let mut selectors = vec![AreaSelector::Core, AreaSelector::Local];
        for d in set.directions::<3>() {
            selectors.push(AreaSelector::Border(d));
            selectors.push(AreaSelector::Guard(d));
        }
        for s in selectors {
            let r = map(&layout, s);
            prop_assert!(r.is_empty() || r.intersect(&total) == r, "{:?} -> {:?}", s, r);
        }
    }
}
