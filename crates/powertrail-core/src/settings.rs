//! Authored trail settings
//!
//! Per-trail tunables persisted alongside the node graph. The owner loads
//! these at startup and feeds the relevant pieces to the propagation
//! engine, the GPU marshaller and the audio allocator.

use serde::{Deserialize, Serialize};

use crate::propagation::PropagationConfig;

/// Tunables for one authored trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailSettings {
    /// Propagation rates and fill cap
    #[serde(default)]
    pub propagation: PropagationConfig,

    /// Capsule radius of the rendered trail line
    pub trail_radius: f32,

    /// Render the fill front advancing from the leaves toward the root
    pub reverse_direction: bool,

    /// Skip rendering entirely while keeping propagation running
    pub hidden: bool,

    /// Range beyond which a segment contributes no audio
    pub max_audible_range: f32,

    /// Emitter pitch at zero fill
    pub base_pitch: f32,

    /// Pitch added as the fill approaches the full trail length
    pub pitch_range: f32,

    /// Size of the audio emitter pool reserved for this trail
    pub emitter_count: usize,
}

impl Default for TrailSettings {
    fn default() -> Self {
        Self {
            propagation: PropagationConfig::default(),
            trail_radius: 0.05,
            reverse_direction: false,
            hidden: false,
            max_audible_range: 20.0,
            base_pitch: 1.0,
            pitch_range: 0.5,
            emitter_count: 3,
        }
    }
}
