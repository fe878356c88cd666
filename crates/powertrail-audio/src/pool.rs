//! Emitter pool: fixed emitter handles and their segment assignments
//!
//! The pool is sized once at startup and owned by a single trail instance;
//! sharing one pool across instances needs an allocator above this layer.

use glam::Vec3;

use powertrail_core::NodeId;

/// Identifier for an emitter slot in the pool
pub type EmitterId = usize;

/// Identity of a simplified-path segment, stable across trail rebuilds
/// as long as its end nodes survive
pub type SegmentKey = (NodeId, NodeId);

/// Per-tick update for one emitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterJob {
    /// Target world position of the emitter
    pub position: Vec3,
    /// Volume scalar in `[0, 1]`
    pub volume: f32,
    /// Pitch scalar
    pub pitch: f32,
}

/// Command handed to the external audio engine, at most one per emitter
/// per tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmitterCommand {
    /// Position and modulate the emitter
    Play(EmitterJob),
    /// Silence the emitter entirely
    Stop,
}

/// Seam to the external audio engine.
///
/// The engine owns the actual voices; this core only decides where each
/// emitter sits and how loud it plays.
pub trait EmitterSink {
    /// Apply a command to one emitter
    fn apply(&mut self, emitter: EmitterId, command: EmitterCommand);
}

/// Fixed pool of emitter handles with their current segment assignments.
///
/// A segment hosts at most one emitter and an emitter hosts at most one
/// segment; assignments persist across ticks until the allocator
/// explicitly moves them.
#[derive(Debug, Clone, Default)]
pub struct EmitterPool {
    slots: Vec<Option<SegmentKey>>,
}

impl EmitterPool {
    /// Create a pool of `count` unassigned emitters
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![None; count],
        }
    }

    /// Number of emitters in the pool
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool holds no emitters at all
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Segment currently hosted by `emitter`
    pub fn assignment(&self, emitter: EmitterId) -> Option<SegmentKey> {
        self.slots.get(emitter).copied().flatten()
    }

    /// Iterate over all emitters and their assignments
    pub fn iter(&self) -> impl Iterator<Item = (EmitterId, Option<SegmentKey>)> + '_ {
        self.slots.iter().enumerate().map(|(i, s)| (i, *s))
    }

    /// Bind `emitter` to a segment
    pub fn assign(&mut self, emitter: EmitterId, segment: SegmentKey) {
        if let Some(slot) = self.slots.get_mut(emitter) {
            *slot = Some(segment);
        }
    }

    /// Release `emitter`'s assignment
    pub fn free(&mut self, emitter: EmitterId) {
        if let Some(slot) = self.slots.get_mut(emitter) {
            *slot = None;
        }
    }

    /// Count of emitters currently hosting a segment
    pub fn assigned_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
