use std::collections::HashMap;

use pic_scheduler::engine::buffer::GridBuffer;
use pic_scheduler::engine::environment::{Environment, EnvironmentConfig};
use pic_scheduler::engine::error::{ConfigError, EnvironmentError};
use pic_scheduler::engine::events::EventSystemConfig;
use pic_scheduler::engine::mapping::{map, AreaSelector, Direction, DirectionSet, GridLayout, IndexRange};
use pic_scheduler::engine::task::TaskState;
use pic_scheduler::engine::types::{AccessSets, OperationKind};

fn env() -> Environment {
    let config = EnvironmentConfig {
        events: EventSystemConfig { record_waits: true, ..EventSystemConfig::default() },
        ..EnvironmentConfig::default()
    };
    Environment::new(config).unwrap()
}

/// Sets every local cell to `1 + linear index`, guards to zero.
fn seeded<const D: usize>(env: &Environment, layout: GridLayout<D>) -> GridBuffer<u32, D> {
    let buffer = GridBuffer::<u32, D>::zeroed(layout);
    let task = env
        .update("seed", &buffer, AreaSelector::Local, &[], move |p, cell| {
            *cell = 1 + layout.linear_index(p) as u32;
        })
        .unwrap();
    env.finish(&task).unwrap();
    buffer
}

/// Periodic image of `p` inside the local area.
fn wrap<const D: usize>(layout: &GridLayout<D>, p: [usize; D]) -> [usize; D] {
    let local = map(layout, AreaSelector::Local);
    std::array::from_fn(|a| {
        let n = local.end[a] - local.start[a];
        if p[a] < local.start[a] {
            p[a] + n
        } else if p[a] >= local.end[a] {
            p[a] - n
        } else {
            p[a]
        }
    })
}

fn assert_periodic<const D: usize>(env: &Environment, layout: GridLayout<D>) {
    let buffer = seeded(env, layout);
    let before = buffer.to_vec();

    let last = env.exchange_periodic(&buffer).unwrap();
    env.finish(&last).unwrap();
    let after = env.readback(&buffer).unwrap();

    for (i, &value) in after.iter().enumerate() {
        let p = layout.point_of(i);
        let expected = before[layout.linear_index(wrap(&layout, p))];
        assert_eq!(value, expected, "cell {p:?}");
    }
}

#[test]
fn config_validation() {
    let config = EnvironmentConfig { compute_queues: 0, ..EnvironmentConfig::default() };
    assert_eq!(config.validate(), Err(ConfigError::ZeroCount { what: "compute_queues" }));
    assert!(matches!(Environment::new(config), Err(EnvironmentError::Config(_))));

    let config = EnvironmentConfig {
        events: EventSystemConfig { max_outstanding_tasks: 0, record_waits: false },
        ..EnvironmentConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn config_from_variables() {
    let vars: HashMap<&str, &str> = [
        ("PIC_DEVICE_NAME", "rank-3"),
        ("PIC_COMPUTE_QUEUES", "2"),
        ("PIC_TRANSFER_QUEUES", "0"),
        ("PIC_MAX_OUTSTANDING_TASKS", "128"),
        ("PIC_RECORD_WAITS", "true"),
    ]
    .into_iter()
    .collect();

    let config = EnvironmentConfig::from_lookup(|v| vars.get(v).map(|s| s.to_string())).unwrap();
    assert_eq!(config.name, "rank-3");
    assert_eq!(config.compute_queues, 2);
    assert_eq!(config.transfer_queues, 0);
    assert_eq!(config.events.max_outstanding_tasks, 128);
    assert!(config.events.record_waits);

    let defaults = EnvironmentConfig::from_lookup(|_| None).unwrap();
    assert_eq!(defaults, EnvironmentConfig::default());
}

#[test]
fn config_rejects_malformed_variables() {
    let err = EnvironmentConfig::from_lookup(|v| (v == "PIC_COMPUTE_QUEUES").then(|| "many".to_string()))
        .unwrap_err();
    assert_eq!(
        err,
        ConfigError::InvalidEnv { var: "PIC_COMPUTE_QUEUES", value: "many".to_string(), expected: "unsigned integer" }
    );

    let err = EnvironmentConfig::from_lookup(|v| (v == "PIC_RECORD_WAITS").then(|| "maybe".to_string()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnv { var: "PIC_RECORD_WAITS", .. }));
}

#[test]
fn transfers_share_the_compute_queue_without_transfer_queues() {
    let env = Environment::new(EnvironmentConfig { transfer_queues: 0, ..EnvironmentConfig::default() }).unwrap();
    assert_eq!(env.queue(OperationKind::Transfer), env.queue(OperationKind::Compute));
}

#[test]
fn fill_then_readback() {
    let env = env();
    let layout = GridLayout::new([6, 5], 1).unwrap();
    let buffer = GridBuffer::<f32, 2>::zeroed(layout);

    env.fill(&buffer, map(&layout, AreaSelector::Core), 2.5).unwrap();
    let data = env.readback(&buffer).unwrap();

    let core = map(&layout, AreaSelector::Core);
    for (i, &v) in data.iter().enumerate() {
        let expected = if core.contains(layout.point_of(i)) { 2.5 } else { 0.0 };
        assert_eq!(v, expected);
    }
    assert_eq!(buffer.to_bytes().len(), layout.cell_count() * 4);
}

#[test]
fn copy_between_buffers_orders_after_both_sides() {
    let env = env();
    let layout = GridLayout::new([8, 8], 0).unwrap();
    let src = GridBuffer::<u32, 2>::new(layout, 7);
    let dst = GridBuffer::<u32, 2>::zeroed(layout);

    let fill = env.fill(&src, IndexRange::new([0, 0], [4, 4]), 9).unwrap();
    let copy = env.copy(&src, IndexRange::new([0, 0], [4, 4]), &dst, IndexRange::new([4, 4], [8, 8])).unwrap();
    assert!(copy.depends_on(&fill));

    let data = env.readback(&dst).unwrap();
    assert_eq!(data[layout.linear_index([5, 5])], 9);
    assert_eq!(data[layout.linear_index([1, 1])], 0);
    assert_eq!(src.get([6, 6]), 7);
}

#[test]
#[should_panic(expected = "contract violation")]
fn copy_with_mismatched_shapes_panics() {
    let env = env();
    let layout = GridLayout::new([8, 8], 0).unwrap();
    let a = GridBuffer::<u32, 2>::zeroed(layout);
    let b = GridBuffer::<u32, 2>::zeroed(layout);
    let _ = env.copy(&a, IndexRange::new([0, 0], [2, 2]), &b, IndexRange::new([0, 0], [3, 2]));
}

#[test]
fn periodic_exchange_fills_every_guard_2d() {
    let env = env();
    assert_periodic(&env, GridLayout::new([9, 7], 2).unwrap());
}

#[test]
fn periodic_exchange_with_faces_only_still_fills_corners() {
    let env = env();
    assert_periodic(&env, GridLayout::new([9, 7, 6], 1).unwrap().with_directions(DirectionSet::Faces));
}

#[test]
fn periodic_exchange_with_asymmetric_guards() {
    let env = env();
    assert_periodic(&env, GridLayout::with_guards([10, 8], [1, 2], [2, 1]).unwrap());
}

#[test]
fn launch_runs_kernel_over_range() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let env = env();
    let layout = GridLayout::new([10, 10, 10], 1).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let h = Arc::clone(&hits);
    let task = env
        .launch(OperationKind::Compute, "count", map(&layout, AreaSelector::Core), &AccessSets::none(), move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

    env.finish(&task).unwrap();
    assert_eq!(hits.load(Ordering::Relaxed), 8 * 8 * 8);
    assert_eq!(task.state(), TaskState::Finished);
}

#[test]
fn border_update_overlaps_with_guard_exchange_of_another_field() {
    let env = env();
    let layout = GridLayout::new([12, 12], 2).unwrap().with_uniform_border(2).unwrap();
    let e_field = GridBuffer::<f32, 2>::zeroed(layout);
    let b_field = GridBuffer::<f32, 2>::zeroed(layout);

    let exchange = env.exchange_periodic(&b_field).unwrap();
    let core = env.update("push core", &e_field, AreaSelector::Core, &[], |_, c| *c = 1.0).unwrap();
    let border = env
        .update("push border", &e_field, AreaSelector::Border(Direction::face(0, true)), &[b_field.id()], |_, c| {
            *c = 2.0
        })
        .unwrap();

    assert!(core.dependencies().is_empty());
    assert!(border.depends_on(&exchange));
    assert!(border.depends_on(&core));

    env.finish_all().unwrap();
    assert_eq!(e_field.get([6, 6]), 1.0);
    assert_eq!(e_field.get([9, 6]), 2.0);
}

#[test]
fn end_to_end_64_cubed() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use pic_scheduler::engine::task::Operation;

    let env = env();
    let layout = GridLayout::new([64, 64, 64], 2).unwrap();
    let field = GridBuffer::<u32, 3>::zeroed(layout);
    let staging = GridBuffer::<u32, 3>::zeroed(layout);

    let total = map(&layout, AreaSelector::Total);
    let core = map(&layout, AreaSelector::Core);
    let guard_px = map(&layout, AreaSelector::Guard(Direction::face(0, true)));

    let a = env.update("A", &field, AreaSelector::Total, &[], |_, c| *c = 1).unwrap();

    let counted = Arc::new(AtomicUsize::new(0));
    let (source, out) = (field.clone(), Arc::clone(&counted));
    let b = env
        .events()
        .issue_on(
            Operation::transfer("B", move || {
                let data = source.read();
                let n = core.iter().filter(|&p| data[layout.linear_index(p)] == 1).count();
                out.store(n, Ordering::SeqCst);
            }),
            env.queue(OperationKind::Transfer),
            &AccessSets::reading(&[field.id()]),
        )
        .unwrap();

    let c = env.fill(&staging, guard_px, 5).unwrap();

    assert!(b.depends_on(&a));
    assert_ne!(a.queue(), b.queue());
    assert!(c.dependencies().is_empty());

    for t in [&a, &b, &c] {
        env.finish(t).unwrap();
    }
    assert_eq!(counted.load(Ordering::SeqCst), 60 * 60 * 60);

    let mut ranges = vec![core];
    ranges.extend(Direction::<3>::faces().into_iter().map(|d| map(&layout, AreaSelector::Guard(d))));
    let uncovered = total.iter().filter(|&p| !ranges.iter().any(|r| r.contains(p))).count();
    assert_eq!(uncovered, 0);

    assert_eq!(staging.get([63, 10, 10]), 5);
    assert_eq!(staging.get([61, 10, 10]), 0);
}

#[test]
#[should_panic(expected = "contract violation")]
fn get_outside_layout_panics() {
    let layout = GridLayout::new([4, 4], 0).unwrap();
    let buffer = GridBuffer::<u32, 2>::zeroed(layout);
    buffer.write()[layout.linear_index([1, 1])] = 7;
    let _ = buffer.get([5, 0]);
}

#[test]
#[should_panic(expected = "contract violation")]
fn fill_past_the_layout_panics_at_issue() {
    let env = env();
    let layout = GridLayout::new([8, 8], 1).unwrap();
    let buffer = GridBuffer::<u32, 2>::zeroed(layout);
    let _ = env.fill(&buffer, IndexRange::new([6, 0], [10, 8]), 1);
}

#[test]
#[should_panic(expected = "contract violation")]
fn update_range_past_the_layout_panics() {
    let layout = GridLayout::new([8, 8], 1).unwrap();
    let buffer = GridBuffer::<u32, 2>::zeroed(layout);
    buffer.update_range(&IndexRange::new([0, 0], [8, 9]), |_, c| *c = 1);
}

#[test]
#[should_panic(expected = "contract violation")]
fn copy_past_the_layout_panics_at_issue() {
    let env = env();
    let layout = GridLayout::new([8, 8], 0).unwrap();
    let a = GridBuffer::<u32, 2>::zeroed(layout);
    let b = GridBuffer::<u32, 2>::zeroed(layout);
    let _ = env.copy(&a, IndexRange::new([6, 6], [9, 9]), &b, IndexRange::new([0, 0], [3, 3]));
}

#[test]
fn empty_ranges_are_accepted() {
    let env = env();
    let layout = GridLayout::new([8, 8], 0).unwrap();
    let buffer = GridBuffer::<u32, 2>::new(layout, 3);

    let empty = IndexRange::new([20, 20], [20, 20]);
    assert!(buffer.covers(&empty));
    assert!(!buffer.covers(&IndexRange::new([0, 0], [9, 1])));
    env.fill(&buffer, empty, 9).unwrap();
    assert!(env.readback(&buffer).unwrap().iter().all(|&v| v == 3));
}
