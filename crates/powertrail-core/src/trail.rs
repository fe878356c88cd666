//! Trail Info Generator - derived path segments and distances
//!
//! A depth-first pass over the node graph that assigns every node a
//! cumulative distance from the root and produces the two per-frame path
//! representations: the full path (one segment per parent→child edge,
//! consumed by the GPU marshaller) and the simplified path (contiguous
//! staircase runs collapsed into single logical segments, consumed by the
//! audio allocator).
//!
//! Derived data is never patched incrementally. A single flag edit can move
//! an entire downstream run to a different ancestor, so any change to the
//! graph invalidates the whole trail and it is rebuilt from scratch.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::graph::{GraphError, NodeGraph, NodeId};

/// One segment of the trail, with cumulative path-length bounds.
///
/// Full-path segments correspond 1:1 to structural edges. Simplified-path
/// segments either equal a full-path segment or span an entire staircase
/// run, in which case `parent` is the node just above the run and `child`
/// is the node the run terminates at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailSegment {
    /// Node the segment starts at
    pub parent: NodeId,
    /// Node the segment ends at
    pub child: NodeId,
    /// Cumulative distance from the root at the segment start
    pub start_distance: f32,
    /// Cumulative distance from the root at the segment end
    pub end_distance: f32,
}

impl TrailSegment {
    /// Covered path length
    pub fn length(&self) -> f32 {
        self.end_distance - self.start_distance
    }
}

/// Derived path data for one node graph.
///
/// Snapshot of the graph at `generation`; stale snapshots must be rebuilt,
/// not patched.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailInfo {
    /// One segment per parent→child edge, in depth-first order
    pub full: Vec<TrailSegment>,
    /// Full path with staircase runs merged, zero-distance edges dropped
    pub simplified: Vec<TrailSegment>,
    /// Maximum cumulative distance over all leaves
    pub max_distance: f32,
    /// Graph generation this snapshot was built from
    pub generation: u64,
}

impl TrailInfo {
    /// Derive trail data from `graph`.
    ///
    /// Fails fast on a structurally invalid graph; see
    /// [`NodeGraph::validate`].
    pub fn build(graph: &NodeGraph) -> Result<Self, GraphError> {
        graph.validate()?;

        let mut builder = Builder {
            graph,
            full: Vec::with_capacity(graph.node_count().saturating_sub(1)),
            simplified: Vec::new(),
            distances: HashMap::with_capacity(graph.node_count()),
        };
        builder.distances.insert(graph.root(), 0.0);
        builder.walk(graph.root(), 0.0)?;

        let max_distance = builder
            .full
            .iter()
            .map(|s| s.end_distance)
            .fold(0.0, f32::max);

        debug!(
            segments = builder.full.len(),
            simplified = builder.simplified.len(),
            max_distance,
            "rebuilt trail info"
        );

        Ok(Self {
            full: builder.full,
            simplified: builder.simplified,
            max_distance,
            generation: graph.generation(),
        })
    }

    /// Whether `graph` has changed since this snapshot was built
    pub fn is_stale(&self, graph: &NodeGraph) -> bool {
        self.generation != graph.generation()
    }
}

struct Builder<'a> {
    graph: &'a NodeGraph,
    full: Vec<TrailSegment>,
    simplified: Vec<TrailSegment>,
    distances: HashMap<NodeId, f32>,
}

impl Builder<'_> {
    fn walk(&mut self, parent: NodeId, start: f32) -> Result<(), GraphError> {
        let p = self
            .graph
            .node(parent)
            .ok_or(GraphError::MissingNode(parent))?;
        let children = p.children.clone();
        let zero_distance = p.flags.zero_distance_to_children;

        for &child in &children {
            let c = self
                .graph
                .node(child)
                .ok_or(GraphError::MissingNode(child))?;
            let end = if zero_distance {
                start
            } else {
                start + p.position.distance(c.position)
            };

            self.full.push(TrailSegment {
                parent,
                child,
                start_distance: start,
                end_distance: end,
            });
            self.distances.insert(child, end);

            self.emit_simplified(parent, child, start, end, zero_distance);

            self.walk(child, end)?;
        }
        Ok(())
    }

    /// Simplified-path emission for the edge `parent`→`child`.
    ///
    /// An edge belongs to a staircase run when its child node carries the
    /// staircase flag; runs terminate at a leaf, at a branch point, or at
    /// the last flagged node before an unflagged edge. A run is emitted as
    /// one segment exactly once, at its termination point.
    ///
    /// A zero-distance edge never contributes a segment of its own, but a
    /// run passing over or ending at it must still be closed, so the run
    /// bookkeeping runs for every edge.
    fn emit_simplified(
        &mut self,
        parent: NodeId,
        child: NodeId,
        start: f32,
        end: f32,
        zero_edge: bool,
    ) {
        let Some(c) = self.graph.node(child) else {
            return;
        };

        if c.flags.staircase_segment {
            if c.children.is_empty() {
                // Run terminates at a leaf
                self.push_merged(child, end);
            } else if c.children.len() > 1 {
                // A staircase node is assumed to have exactly one child;
                // treat the violation as a branch point ending the run here
                warn!(
                    node = child,
                    children = c.children.len(),
                    "staircase node has multiple children, ending run at branch point"
                );
                self.push_merged(child, end);
            }
            // Single flagged child continues the run: captured when the run
            // terminates further down
            return;
        }

        if self.parent_in_run(parent) {
            // The run ended at `parent`
            if !zero_edge && c.children.is_empty() {
                // A trailing leaf edge is absorbed into the run
                self.push_merged(child, end);
                return;
            }
            let run_end = self.distances.get(&parent).copied().unwrap_or(start);
            self.push_merged(parent, run_end);
        }

        if zero_edge {
            return;
        }

        // The edge leaving a run is not itself merged
        self.simplified.push(TrailSegment {
            parent,
            child,
            start_distance: start,
            end_distance: end,
        });
    }

    /// Whether the edge into `node` is part of a still-open staircase run
    /// that must be closed when emission reaches this point.
    ///
    /// A node that branches closed its own run at the branch point, and a
    /// flagged root has no incoming edge at all, so neither reopens a run
    /// for edges leaving it.
    fn parent_in_run(&self, node: NodeId) -> bool {
        self.graph.node(node).is_some_and(|n| {
            n.flags.staircase_segment && n.parent.is_some() && n.children.len() == 1
        })
    }

    /// Emit the merged segment for the run terminating at `last`.
    fn push_merged(&mut self, last: NodeId, end: f32) {
        let first = self.run_start(last);
        let start = self.distances.get(&first).copied().unwrap_or(0.0);
        self.simplified.push(TrailSegment {
            parent: first,
            child: last,
            start_distance: start,
            end_distance: end,
        });
    }

    /// Walk backward through ancestors to the node just above the first
    /// edge of the run containing the edge into `node`.
    ///
    /// Runs never extend across a branch point or above the root.
    fn run_start(&self, node: NodeId) -> NodeId {
        let mut current = node;
        loop {
            let Some(n) = self.graph.node(current) else {
                return current;
            };
            let Some(parent) = n.parent else {
                return current;
            };
            let extends = self.graph.node(parent).is_some_and(|p| {
                p.flags.staircase_segment && p.parent.is_some() && p.children.len() == 1
            });
            if extends {
                current = parent;
            } else {
                return parent;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeFlags;
    use glam::Vec3;

    const STAIRCASE: NodeFlags = NodeFlags {
        zero_distance_to_children: false,
        staircase_segment: true,
    };

    const ZERO_DISTANCE: NodeFlags = NodeFlags {
        zero_distance_to_children: true,
        staircase_segment: false,
    };

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_full_path_one_segment_per_edge() {
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let a = graph
            .add_child(graph.root(), Vec3::X, NodeFlags::default())
            .unwrap();
        graph
            .add_child(a, Vec3::new(1.0, 1.0, 0.0), NodeFlags::default())
            .unwrap();
        graph
            .add_child(graph.root(), Vec3::NEG_X, NodeFlags::default())
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        assert_eq!(trail.full.len(), graph.node_count() - 1);
        assert_eq!(trail.simplified.len(), 3);
    }

    #[test]
    fn test_cumulative_distances() {
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let a = graph
            .add_child(graph.root(), Vec3::new(3.0, 0.0, 0.0), NodeFlags::default())
            .unwrap();
        graph
            .add_child(a, Vec3::new(3.0, 4.0, 0.0), NodeFlags::default())
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        assert!(approx(trail.full[0].start_distance, 0.0));
        assert!(approx(trail.full[0].end_distance, 3.0));
        assert!(approx(trail.full[1].start_distance, 3.0));
        assert!(approx(trail.full[1].end_distance, 7.0));
        assert!(approx(trail.max_distance, 7.0));
    }

    #[test]
    fn test_zero_distance_edges() {
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let hub = graph
            .add_child(graph.root(), Vec3::X, ZERO_DISTANCE)
            .unwrap();
        let far = graph
            .add_child(hub, Vec3::new(5.0, 0.0, 0.0), NodeFlags::default())
            .unwrap();
        graph
            .add_child(far, Vec3::new(5.0, 2.0, 0.0), NodeFlags::default())
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        // The hub's outgoing edge spans zero length but still appears in the
        // full path
        assert_eq!(trail.full.len(), 3);
        assert!(approx(trail.full[1].length(), 0.0));
        assert!(approx(trail.full[1].start_distance, 1.0));
        // ...and is dropped from the simplified path
        assert_eq!(trail.simplified.len(), 2);
        assert!(approx(trail.max_distance, 3.0));
    }

    #[test]
    fn test_staircase_run_to_leaf_merges() {
        // Root, then three staircase nodes ending at a leaf: the full path
        // keeps all three edges, the simplified path carries one merged
        // segment spanning the whole run
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let s1 = graph
            .add_child(graph.root(), Vec3::new(1.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let s2 = graph
            .add_child(s1, Vec3::new(2.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let s3 = graph
            .add_child(s2, Vec3::new(3.0, 0.0, 0.0), STAIRCASE)
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        assert_eq!(trail.full.len(), 3);
        assert_eq!(trail.simplified.len(), 1);

        let merged = trail.simplified[0];
        assert_eq!(merged.parent, graph.root());
        assert_eq!(merged.child, s3);
        assert!(approx(merged.start_distance, 0.0));
        assert!(approx(merged.end_distance, 3.0));
    }

    #[test]
    fn test_run_followed_by_plain_edge() {
        // The edge leaving a run is emitted unmerged, after the merged run
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let s1 = graph
            .add_child(graph.root(), Vec3::new(1.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let s2 = graph
            .add_child(s1, Vec3::new(2.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let plain = graph
            .add_child(s2, Vec3::new(3.0, 0.0, 0.0), NodeFlags::default())
            .unwrap();
        graph
            .add_child(plain, Vec3::new(4.0, 0.0, 0.0), NodeFlags::default())
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        assert_eq!(trail.full.len(), 4);
        assert_eq!(trail.simplified.len(), 3);

        let merged = trail.simplified[0];
        assert_eq!((merged.parent, merged.child), (graph.root(), s2));
        assert!(approx(merged.start_distance, 0.0));
        assert!(approx(merged.end_distance, 2.0));

        let leaving = trail.simplified[1];
        assert_eq!((leaving.parent, leaving.child), (s2, plain));
        assert!(approx(leaving.start_distance, 2.0));
        assert!(approx(leaving.end_distance, 3.0));
    }

    #[test]
    fn test_trailing_leaf_absorbed_into_run() {
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let s1 = graph
            .add_child(graph.root(), Vec3::new(1.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let leaf = graph
            .add_child(s1, Vec3::new(2.0, 0.0, 0.0), NodeFlags::default())
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        assert_eq!(trail.simplified.len(), 1);
        let merged = trail.simplified[0];
        assert_eq!((merged.parent, merged.child), (graph.root(), leaf));
        assert!(approx(merged.end_distance, 2.0));
    }

    #[test]
    fn test_multi_child_staircase_becomes_branch_point() {
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let s1 = graph
            .add_child(graph.root(), Vec3::new(1.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let a = graph
            .add_child(s1, Vec3::new(2.0, 1.0, 0.0), NodeFlags::default())
            .unwrap();
        let b = graph
            .add_child(s1, Vec3::new(2.0, -1.0, 0.0), NodeFlags::default())
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        assert_eq!(trail.full.len(), 3);
        // Run closed at the branch point, then two plain child edges
        assert_eq!(trail.simplified.len(), 3);
        let merged = trail.simplified[0];
        assert_eq!((merged.parent, merged.child), (graph.root(), s1));
        assert!(trail
            .simplified
            .iter()
            .any(|s| s.parent == s1 && s.child == a));
        assert!(trail
            .simplified
            .iter()
            .any(|s| s.parent == s1 && s.child == b));
    }

    #[test]
    fn test_runs_do_not_cross_branch_points() {
        // A flagged leaf below a multi-child staircase node starts its own
        // run at the branch point instead of merging through it
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let s1 = graph
            .add_child(graph.root(), Vec3::new(1.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let s2 = graph
            .add_child(s1, Vec3::new(2.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let leaf_a = graph
            .add_child(s2, Vec3::new(3.0, 1.0, 0.0), STAIRCASE)
            .unwrap();
        graph
            .add_child(s2, Vec3::new(3.0, -1.0, 0.0), NodeFlags::default())
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        // Upstream run closes at s2, then one run per branch and the plain
        // edge
        let upstream = trail
            .simplified
            .iter()
            .find(|s| s.child == s2)
            .expect("run closed at branch point");
        assert_eq!(upstream.parent, graph.root());

        let branch_run = trail
            .simplified
            .iter()
            .find(|s| s.child == leaf_a)
            .expect("flagged leaf run");
        assert_eq!(branch_run.parent, s2);
    }

    #[test]
    fn test_two_separate_runs() {
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let s1 = graph
            .add_child(graph.root(), Vec3::new(1.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let plain = graph
            .add_child(s1, Vec3::new(2.0, 0.0, 0.0), NodeFlags::default())
            .unwrap();
        let s2 = graph
            .add_child(plain, Vec3::new(3.0, 0.0, 0.0), STAIRCASE)
            .unwrap();
        let _s3 = graph
            .add_child(s2, Vec3::new(4.0, 0.0, 0.0), STAIRCASE)
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        assert_eq!(trail.full.len(), 4);
        // run(root..s1) + plain edge + run(plain..s3)
        assert_eq!(trail.simplified.len(), 3);
        assert!(approx(trail.simplified[0].end_distance, 1.0));
        assert_eq!(trail.simplified[2].parent, plain);
        assert!(approx(trail.simplified[2].start_distance, 2.0));
        assert!(approx(trail.simplified[2].end_distance, 4.0));
    }

    #[test]
    fn test_max_distance_is_max_leaf_distance() {
        let mut graph = NodeGraph::new(Vec3::ZERO);
        let a = graph
            .add_child(graph.root(), Vec3::new(2.0, 0.0, 0.0), NodeFlags::default())
            .unwrap();
        graph
            .add_child(a, Vec3::new(2.0, 5.0, 0.0), NodeFlags::default())
            .unwrap();
        graph
            .add_child(graph.root(), Vec3::new(0.0, 0.0, 3.0), NodeFlags::default())
            .unwrap();

        let trail = TrailInfo::build(&graph).unwrap();
        assert!(approx(trail.max_distance, 7.0));
    }

    #[test]
    fn test_root_only_graph() {
        let graph = NodeGraph::new(Vec3::ZERO);
        let trail = TrailInfo::build(&graph).unwrap();
        assert!(trail.full.is_empty());
        assert!(trail.simplified.is_empty());
        assert_eq!(trail.max_distance, 0.0);
    }

    #[test]
    fn test_staleness_tracking() {
        let mut graph = NodeGraph::new(Vec3::ZERO);
        graph
            .add_child(graph.root(), Vec3::X, NodeFlags::default())
            .unwrap();
        let trail = TrailInfo::build(&graph).unwrap();
        assert!(!trail.is_stale(&graph));

        graph
            .add_child(graph.root(), Vec3::Y, NodeFlags::default())
            .unwrap();
        assert!(trail.is_stale(&graph));
    }
}
