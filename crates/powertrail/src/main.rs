//! PowerTrail - offline trail simulation
//!
//! Builds a small authored trail and runs the per-frame core loop against
//! it: propagation update, GPU marshalling, audio allocation. Useful for
//! eyeballing propagation timing and emitter behavior without an engine
//! attached.

use anyhow::Result;
use glam::Vec3;
use tracing::info;
use tracing_subscriber::EnvFilter;

use powertrail_audio::{
    AudioConfig, EmitterCommand, EmitterId, EmitterPool, EmitterSink, SegmentAllocator,
};
use powertrail_core::{
    NodeFlags, NodeGraph, PropagationEngine, TrailInfo, TrailSettings,
};
use powertrail_render::TrailGpuData;

/// Sink that traces each audio command instead of driving voices
#[derive(Default)]
struct LoggingSink;

impl EmitterSink for LoggingSink {
    fn apply(&mut self, emitter: EmitterId, command: EmitterCommand) {
        match command {
            EmitterCommand::Play(job) => info!(
                emitter,
                x = job.position.x,
                z = job.position.z,
                volume = job.volume,
                pitch = job.pitch,
                "emitter"
            ),
            EmitterCommand::Stop => info!(emitter, "emitter stopped"),
        }
    }
}

/// Demo trail: one long arm, one staircase run merged for audio, and a
/// zero-distance hub fanning out at the end of the arm.
fn build_demo_graph() -> Result<NodeGraph> {
    let mut graph = NodeGraph::new(Vec3::ZERO);
    let staircase = NodeFlags {
        staircase_segment: true,
        ..Default::default()
    };

    let mut arm = graph.root();
    for i in 1..=4 {
        arm = graph.add_child(arm, Vec3::new(i as f32 * 2.0, 0.0, 0.0), NodeFlags::default())?;
    }
    let hub = graph.add_child(
        arm,
        Vec3::new(8.0, 0.5, 0.0),
        NodeFlags {
            zero_distance_to_children: true,
            ..Default::default()
        },
    )?;
    graph.add_child(hub, Vec3::new(8.0, 0.5, 2.0), NodeFlags::default())?;
    graph.add_child(hub, Vec3::new(8.0, 0.5, -2.0), NodeFlags::default())?;

    let mut step = graph.root();
    for i in 1..=3 {
        step = graph.add_child(step, Vec3::new(0.0, i as f32, i as f32), staircase)?;
    }

    graph.validate()?;
    Ok(graph)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = TrailSettings::default();
    let graph = build_demo_graph()?;
    let trail = TrailInfo::build(&graph)?;
    info!(
        nodes = graph.node_count(),
        segments = trail.full.len(),
        simplified = trail.simplified.len(),
        max_distance = trail.max_distance,
        "trail built"
    );

    let mut engine = PropagationEngine::new(trail.max_distance, settings.propagation);
    let events = engine.subscribe();

    let mut gpu = TrailGpuData::new();
    gpu.set_radius(settings.trail_radius);
    gpu.set_reverse_direction(settings.reverse_direction);
    gpu.set_hidden(settings.hidden);

    let allocator = SegmentAllocator::new(AudioConfig {
        max_audible_range: settings.max_audible_range,
        base_pitch: settings.base_pitch,
        pitch_range: settings.pitch_range,
    });
    let mut pool = EmitterPool::new(settings.emitter_count);
    let mut sink = LoggingSink;

    // 20 seconds at 60 Hz: power on, hold, power off
    let dt = 1.0 / 60.0;
    for frame in 0..1200 {
        let t = frame as f32 * dt;
        engine.set_power(t < 12.0);

        // Fixed per-frame order: propagation, GPU fill pass, audio pass
        let moved = engine.update(dt);
        gpu.rebuild_static(&graph, &trail);
        if moved {
            gpu.update_fill(engine.distance(), engine.max_distance());
        }

        let listener = Vec3::new(4.0 + (t * 0.4).sin() * 4.0, 1.0, (t * 0.25).cos() * 2.0);
        if frame % 30 == 0 {
            allocator.tick(
                listener,
                &graph,
                &trail,
                engine.distance(),
                &mut pool,
                &mut sink,
            );
        }

        for event in events.try_iter() {
            info!(?event, t, "transition");
        }
    }

    let saved = engine.save();
    info!(
        state = ?saved.state,
        distance = saved.distance,
        "simulation finished; persisted snapshot: {}",
        serde_json::to_string(&saved)?
    );
    Ok(())
}
