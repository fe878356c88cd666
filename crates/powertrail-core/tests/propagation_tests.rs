use glam::Vec3;
use powertrail_core::{
    NodeFlags, NodeGraph, PowerEvent, PowerState, PropagationConfig, PropagationEngine, TrailInfo,
};

/// Linear chain of 5 nodes with unit edge lengths, total length 4.
fn unit_chain() -> (NodeGraph, TrailInfo) {
    let mut graph = NodeGraph::new(Vec3::ZERO);
    let mut parent = graph.root();
    for i in 1..=4 {
        parent = graph
            .add_child(parent, Vec3::new(i as f32, 0.0, 0.0), NodeFlags::default())
            .unwrap();
    }
    let trail = TrailInfo::build(&graph).unwrap();
    (graph, trail)
}

#[test]
fn chain_fills_one_unit_in_half_a_second_at_speed_two() {
    let (_, trail) = unit_chain();
    assert_eq!(trail.max_distance, 4.0);

    let mut engine = PropagationEngine::new(
        trail.max_distance,
        PropagationConfig {
            power_speed: 2.0,
            ..Default::default()
        },
    );
    engine.set_power(true);

    // Ten 50ms frames
    for _ in 0..10 {
        engine.update(0.05);
    }

    assert!((engine.distance() - 1.0).abs() < 1e-5);
    assert_eq!(engine.state(), PowerState::PartiallyPowered);

    // The first segment is exactly filled, the rest untouched
    assert!(engine.distance() >= trail.full[0].end_distance - 1e-5);
    assert!(engine.distance() <= trail.full[1].end_distance);
}

#[test]
fn chain_drains_fully_in_one_second_at_speed_four() {
    let (_, trail) = unit_chain();
    let mut engine = PropagationEngine::new(
        trail.max_distance,
        PropagationConfig {
            depower_speed: 4.0,
            power_speed: 100.0,
            target_fill_amount: 1.0,
        },
    );

    // Reach the fully-powered bound first
    engine.set_power(true);
    engine.update(1.0);
    assert_eq!(engine.distance(), 4.0);
    engine.poll_events();

    engine.set_power(false);
    let mut depower_finishes = 0;
    for _ in 0..20 {
        engine.update(0.05);
        depower_finishes += engine
            .poll_events()
            .iter()
            .filter(|&&e| e == PowerEvent::DepowerFinish)
            .count();
    }

    assert_eq!(engine.distance(), 0.0);
    assert_eq!(engine.state(), PowerState::Depowered);
    assert_eq!(depower_finishes, 1);

    // Holding at zero fires nothing further
    for _ in 0..20 {
        engine.update(0.05);
    }
    assert!(engine.poll_events().is_empty());
}

#[test]
fn full_power_cycle_notifies_in_order() {
    let (_, trail) = unit_chain();
    let mut engine =
        PropagationEngine::new(trail.max_distance, PropagationConfig::default());
    let rx = engine.subscribe();

    engine.set_power(true);
    for _ in 0..100 {
        engine.update(0.1);
    }
    engine.set_power(false);
    for _ in 0..100 {
        engine.update(0.1);
    }

    let seen: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            PowerEvent::PowerBegin,
            PowerEvent::PowerFinish,
            PowerEvent::DepowerBegin,
            PowerEvent::DepowerFinish,
        ]
    );
}

#[test]
fn rebuilding_the_trail_feeds_the_engine_a_new_cap() {
    let (mut graph, trail) = unit_chain();
    let mut engine =
        PropagationEngine::new(trail.max_distance, PropagationConfig::default());
    engine.set_power(true);
    engine.update(100.0);
    assert_eq!(engine.distance(), 4.0);

    // Authoring removes the far half of the chain
    let half = trail.full[2].child;
    graph.remove_subtree(half);
    assert!(trail.is_stale(&graph));

    let rebuilt = TrailInfo::build(&graph).unwrap();
    assert_eq!(rebuilt.max_distance, 2.0);
    engine.set_max_distance(rebuilt.max_distance);
    assert_eq!(engine.distance(), 2.0);

    engine.update(0.0);
    assert_eq!(engine.state(), PowerState::Powered);
}
