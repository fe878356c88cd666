//! Nearest-segment audio allocator
//!
//! Once per tick, ranks every simplified-path segment by its distance to
//! the listener, considering only the portion of each segment the fill has
//! reached, then distributes the emitter pool over the closest segments.
//! An emitter keeps its segment as long as that segment stays in the
//! audible top set; it is moved only when a strictly better free segment
//! exists. That stability rule is what keeps the audio from popping as the
//! listener walks along the trail.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use powertrail_core::{NodeGraph, TrailInfo, TrailSegment};

use crate::pool::{EmitterCommand, EmitterJob, EmitterPool, EmitterSink, SegmentKey};

/// Audio allocation tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Range beyond which a segment contributes no candidate
    pub max_audible_range: f32,
    /// Pitch at zero fill
    pub base_pitch: f32,
    /// Pitch added as the fill approaches the full trail length
    pub pitch_range: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_audible_range: 20.0,
            base_pitch: 1.0,
            pitch_range: 0.5,
        }
    }
}

/// A segment that survived the audibility cut this tick
#[derive(Debug, Clone, Copy)]
struct Candidate {
    key: SegmentKey,
    point: Vec3,
    listener_distance: f32,
}

/// The stability-preferring greedy allocator
#[derive(Debug, Clone, Default)]
pub struct SegmentAllocator {
    config: AudioConfig,
}

impl SegmentAllocator {
    /// Create an allocator with the given tunables
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// Current tunables
    pub fn config(&self) -> AudioConfig {
        self.config
    }

    /// Run one allocation tick.
    ///
    /// Emitters whose current segment stays within the audible top set keep
    /// their assignment and only get their position, volume and pitch
    /// refreshed. Everything else is freed, then greedily re-bound to the
    /// closest unclaimed candidates; emitters left over are stopped. Zero
    /// candidates (fully depowered trail, or nothing in range) silences the
    /// whole pool, which is a normal steady state.
    pub fn tick(
        &self,
        listener: Vec3,
        graph: &NodeGraph,
        trail: &TrailInfo,
        fill_distance: f32,
        pool: &mut EmitterPool,
        sink: &mut dyn EmitterSink,
    ) {
        let mut candidates: Vec<Candidate> = trail
            .simplified
            .iter()
            .filter_map(|seg| self.candidate_for(seg, graph, fill_distance, listener))
            .collect();
        candidates.sort_by(|a, b| a.listener_distance.total_cmp(&b.listener_distance));
        candidates.truncate(pool.len());

        let mut claimed = vec![false; candidates.len()];
        let mut displaced = Vec::new();

        // Stability pass: emitters whose segment survived keep it
        for (emitter, assignment) in pool.iter() {
            let Some(key) = assignment else {
                displaced.push(emitter);
                continue;
            };
            let slot = candidates
                .iter()
                .position(|c| c.key == key)
                .filter(|&i| !claimed[i]);
            match slot {
                Some(i) => {
                    claimed[i] = true;
                    sink.apply(
                        emitter,
                        EmitterCommand::Play(self.job(&candidates[i], fill_distance, trail)),
                    );
                }
                None => displaced.push(emitter),
            }
        }

        // Greedy pass: free the rest, re-bind to the closest unclaimed
        // candidates, silence whatever is left
        for emitter in displaced {
            pool.free(emitter);
            let next = (0..candidates.len()).find(|&i| !claimed[i]);
            match next {
                Some(i) => {
                    claimed[i] = true;
                    pool.assign(emitter, candidates[i].key);
                    trace!(emitter, segment = ?candidates[i].key, "emitter rebound");
                    sink.apply(
                        emitter,
                        EmitterCommand::Play(self.job(&candidates[i], fill_distance, trail)),
                    );
                }
                None => sink.apply(emitter, EmitterCommand::Stop),
            }
        }
    }

    /// Nearest audible point on the filled portion of one segment.
    ///
    /// A segment the fill has not reached contributes nothing; a segment
    /// the fill ends inside is only considered up to the fill front.
    fn candidate_for(
        &self,
        seg: &TrailSegment,
        graph: &NodeGraph,
        fill_distance: f32,
        listener: Vec3,
    ) -> Option<Candidate> {
        if fill_distance <= seg.start_distance {
            return None;
        }
        let a = graph.node(seg.parent)?.position;
        let b = graph.node(seg.child)?.position;

        let filled_fraction = if seg.length() > 0.0 {
            ((fill_distance - seg.start_distance) / seg.length()).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let front = a.lerp(b, filled_fraction);

        let point = closest_point_on_segment(a, front, listener);
        let listener_distance = point.distance(listener);
        (listener_distance <= self.config.max_audible_range).then_some(Candidate {
            key: (seg.parent, seg.child),
            point,
            listener_distance,
        })
    }

    /// Volume and pitch are derived, not independently tunable: both track
    /// how far the propagation has advanced, scaled by proximity.
    fn job(&self, candidate: &Candidate, fill_distance: f32, trail: &TrailInfo) -> EmitterJob {
        let fill_fraction = if trail.max_distance > 0.0 {
            (fill_distance / trail.max_distance).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let proximity = 1.0 - candidate.listener_distance / self.config.max_audible_range;
        EmitterJob {
            position: candidate.point,
            volume: (fill_fraction * proximity).clamp(0.0, 1.0),
            pitch: self.config.base_pitch + self.config.pitch_range * fill_fraction,
        }
    }
}

fn closest_point_on_segment(a: Vec3, b: Vec3, point: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}
