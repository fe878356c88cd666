//! Trail uniform block and the CPU-side marshaller that fills it
//!
//! Two write paths with different invalidation triggers: static topology
//! data is recomputed only when the node graph changes, dynamic fill data
//! is recomputed every tick the fill distance actually moves. The block is
//! fixed-capacity; authored graphs beyond the node budget truncate rather
//! than fail the frame.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use tracing::{debug, warn};

use powertrail_core::{NodeGraph, NodeId, TrailInfo};

/// Hard capacity of the node-position table
pub const MAX_TRAIL_NODES: usize = 96;

/// Hard capacity of the per-segment tables
pub const MAX_TRAIL_SEGMENTS: usize = MAX_TRAIL_NODES - 1;

/// Packed vec4 slots per scalar/index table (std140 array stride)
const SEGMENT_VEC4S: usize = MAX_TRAIL_NODES / 4;

/// Uniforms for trail-fill rendering (matches trail_fill.wgsl)
///
/// Scalar and index tables are packed four-wide because uniform-space
/// arrays have a 16-byte element stride.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq)]
pub struct TrailUniforms {
    view_proj: [[f32; 4]; 4],
    node_positions: [[f32; 4]; MAX_TRAIL_NODES],
    segment_start_index: [[u32; 4]; SEGMENT_VEC4S],
    segment_end_index: [[u32; 4]; SEGMENT_VEC4S],
    segment_interpolation: [[f32; 4]; SEGMENT_VEC4S],
    node_count: u32,
    segment_count: u32,
    radius: f32,
    reverse_direction: u32,
    hidden: u32,
    fill_active: u32,
    _padding: [u32; 2],
}

impl TrailUniforms {
    pub(crate) fn zeroed() -> Self {
        bytemuck::Zeroable::zeroed()
    }

    /// Number of segments written to the tables
    pub fn segment_count(&self) -> u32 {
        self.segment_count
    }

    /// Number of node positions written to the table
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Interpolation fraction for segment `i`
    pub fn segment_interpolation(&self, i: usize) -> f32 {
        self.segment_interpolation[i / 4][i % 4]
    }

    /// Start/end node slot for segment `i`
    pub fn segment_indices(&self, i: usize) -> (u32, u32) {
        (
            self.segment_start_index[i / 4][i % 4],
            self.segment_end_index[i / 4][i % 4],
        )
    }

    /// Node position in slot `i`
    pub fn node_position(&self, i: usize) -> [f32; 3] {
        let p = self.node_positions[i];
        [p[0], p[1], p[2]]
    }

    /// Whether the animated-fill shader path is enabled
    pub fn fill_active(&self) -> bool {
        self.fill_active != 0
    }

    /// Whether rendering is suppressed entirely
    pub fn hidden(&self) -> bool {
        self.hidden != 0
    }
}

/// CPU-side marshaller for [`TrailUniforms`].
///
/// Keeps enough derived state (node slot table, segment distance ranges)
/// to run the dynamic pass without touching the graph again.
pub struct TrailGpuData {
    uniforms: TrailUniforms,
    node_slots: HashMap<NodeId, u32>,
    segment_ranges: Vec<(f32, f32)>,
    static_key: Option<(usize, u64)>,
    last_fill: Option<(f32, f32)>,
}

impl Default for TrailGpuData {
    fn default() -> Self {
        Self::new()
    }
}

impl TrailGpuData {
    /// Create an empty marshaller
    pub fn new() -> Self {
        Self {
            uniforms: TrailUniforms::zeroed(),
            node_slots: HashMap::new(),
            segment_ranges: Vec::new(),
            static_key: None,
            last_fill: None,
        }
    }

    /// Current uniform block
    pub fn uniforms(&self) -> &TrailUniforms {
        &self.uniforms
    }

    /// Uniform block as raw bytes for buffer upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.uniforms)
    }

    /// GPU slot assigned to a node, if it survived truncation
    pub fn node_slot(&self, node: NodeId) -> Option<u32> {
        self.node_slots.get(&node).copied()
    }

    /// Set the camera matrix
    pub fn set_view_proj(&mut self, view_proj: Mat4) {
        self.uniforms.view_proj = view_proj.to_cols_array_2d();
    }

    /// Set the capsule radius of the rendered line
    pub fn set_radius(&mut self, radius: f32) {
        self.uniforms.radius = radius;
    }

    /// Render the fill front advancing from the leaves toward the root
    pub fn set_reverse_direction(&mut self, reverse: bool) {
        self.uniforms.reverse_direction = reverse as u32;
        // Effective distance changes meaning, so the next fill pass must run
        self.last_fill = None;
    }

    /// Skip rendering while keeping the data current
    pub fn set_hidden(&mut self, hidden: bool) {
        self.uniforms.hidden = hidden as u32;
    }

    /// Static topology pass.
    ///
    /// No-ops (returns `false`) while the graph is unchanged since the last
    /// rebuild. Nodes beyond [`MAX_TRAIL_NODES`] are silently dropped from
    /// the table; this is the documented bounded-resource contract, not an
    /// error.
    pub fn rebuild_static(&mut self, graph: &NodeGraph, trail: &TrailInfo) -> bool {
        let key = (graph.node_count(), graph.generation());
        if self.static_key == Some(key) {
            return false;
        }

        self.node_slots.clear();
        self.segment_ranges.clear();
        self.uniforms.node_positions = [[0.0; 4]; MAX_TRAIL_NODES];
        self.uniforms.segment_start_index = [[0; 4]; SEGMENT_VEC4S];
        self.uniforms.segment_end_index = [[0; 4]; SEGMENT_VEC4S];

        self.assign_slot(graph, graph.root());
        for seg in &trail.full {
            self.assign_slot(graph, seg.child);
        }
        let dropped = graph.node_count().saturating_sub(self.node_slots.len());
        if dropped > 0 {
            warn!(
                dropped,
                capacity = MAX_TRAIL_NODES,
                "trail exceeds GPU node budget, truncating"
            );
        }

        for seg in &trail.full {
            if self.segment_ranges.len() >= MAX_TRAIL_SEGMENTS {
                break;
            }
            let (Some(start), Some(end)) = (self.node_slot(seg.parent), self.node_slot(seg.child))
            else {
                continue;
            };
            let i = self.segment_ranges.len();
            self.uniforms.segment_start_index[i / 4][i % 4] = start;
            self.uniforms.segment_end_index[i / 4][i % 4] = end;
            self.segment_ranges
                .push((seg.start_distance, seg.end_distance));
        }

        self.uniforms.node_count = self.node_slots.len() as u32;
        self.uniforms.segment_count = self.segment_ranges.len() as u32;
        self.static_key = Some(key);
        // Interpolation targets a new segment table now
        self.last_fill = None;

        debug!(
            nodes = self.uniforms.node_count,
            segments = self.uniforms.segment_count,
            "rebuilt static trail GPU data"
        );
        true
    }

    fn assign_slot(&mut self, graph: &NodeGraph, node: NodeId) {
        if self.node_slots.len() >= MAX_TRAIL_NODES || self.node_slots.contains_key(&node) {
            return;
        }
        let Some(n) = graph.node(node) else {
            return;
        };
        let slot = self.node_slots.len() as u32;
        self.uniforms.node_positions[slot as usize] =
            [n.position.x, n.position.y, n.position.z, 1.0];
        self.node_slots.insert(node, slot);
    }

    /// Dynamic fill pass.
    ///
    /// Recomputes every per-segment interpolation fraction from the current
    /// fill distance. No-ops (returns `false`) while the distance is
    /// unchanged, so a stationary trail costs nothing per frame.
    pub fn update_fill(&mut self, distance: f32, max_distance: f32) -> bool {
        if self.last_fill == Some((distance, max_distance)) {
            return false;
        }
        self.last_fill = Some((distance, max_distance));

        let effective = if self.uniforms.reverse_direction != 0 {
            max_distance - distance
        } else {
            distance
        };

        for (i, &(start, end)) in self.segment_ranges.iter().enumerate() {
            let t = if end > start {
                ((effective - start) / (end - start)).clamp(0.0, 1.0)
            } else if effective >= end {
                1.0
            } else {
                0.0
            };
            self.uniforms.segment_interpolation[i / 4][i % 4] = t;
        }

        // Fully filled and fully empty trails drop to the cheap shader path
        self.uniforms.fill_active = (distance > 0.0 && distance < max_distance) as u32;
        true
    }
}
