//! Node Graph - positioned propagation nodes
//!
//! An arena-backed tree of positioned nodes. Nodes are addressed by stable
//! integer ids; the parent link is a plain optional id and children are kept
//! as ordered id lists, which keeps the structure free of ownership cycles
//! and maps directly onto the flat serialized form.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Unique identifier for a node within a graph
pub type NodeId = u32;

/// Errors produced by graph construction and validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The flat form contained no records
    #[error("graph has no root node")]
    NoRoot,

    /// More than one record claimed to be the root
    #[error("graph has multiple root nodes")]
    MultipleRoots,

    /// An operation referenced a node that is not in the graph
    #[error("node {0} not found in graph")]
    MissingNode(NodeId),

    /// Traversal visited a node twice
    #[error("cycle detected at node {0}")]
    CycleDetected(NodeId),

    /// A live node is not reachable from the root
    #[error("node {0} is not reachable from the root")]
    DetachedNode(NodeId),

    /// A flat record's child range or parent index is out of bounds
    #[error("flat record {index} references index outside 0..{len}")]
    InvalidFlatIndex {
        /// Offending record index
        index: usize,
        /// Length of the flat array
        len: usize,
    },
}

/// Per-edge behavior flags, stored on the child node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFlags {
    /// Children of this node are treated as co-located with it: their
    /// incoming edges contribute no path length
    pub zero_distance_to_children: bool,
    /// This node's incoming edge belongs to a merged staircase run
    pub staircase_segment: bool,
}

/// A positioned node in the propagation graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Position in the owning object's local space
    pub position: Vec3,
    /// Edge behavior flags
    pub flags: NodeFlags,
    /// Parent node, `None` only for the root
    pub parent: Option<NodeId>,
    /// Child nodes in insertion order
    pub children: Vec<NodeId>,
}

/// One record of the linear-array serialized form.
///
/// Records are written depth-first, pre-order, with every node's children
/// occupying the contiguous index range
/// `first_child_index..first_child_index + child_count`. Reading the array
/// back is a pure index walk, never a search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatNode {
    /// Node position in local space
    pub position: [f32; 3],
    /// Index of the parent record, `-1` for the root
    pub parent_index: i32,
    /// Number of child records
    pub child_count: u32,
    /// Index of the first child record
    pub first_child_index: u32,
    /// Edge behavior flags
    pub flags: NodeFlags,
}

/// Arena-backed node tree with exactly one root.
///
/// Removal leaves tombstoned slots behind so surviving ids stay stable;
/// `node_count` reports live nodes only. Every structural edit bumps the
/// topology generation, which downstream consumers use to rebuild derived
/// trail data lazily.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGraph {
    slots: Vec<Option<Node>>,
    vacant: Vec<NodeId>,
    root: NodeId,
    live: usize,
    generation: u64,
}

impl NodeGraph {
    /// Create a graph containing only a root node at `position`
    pub fn new(position: Vec3) -> Self {
        Self {
            slots: vec![Some(Node {
                position,
                flags: NodeFlags::default(),
                parent: None,
                children: Vec::new(),
            })],
            vacant: Vec::new(),
            root: 0,
            live: 1,
            generation: 0,
        }
    }

    /// Id of the root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, including the root
    pub fn node_count(&self) -> usize {
        self.live
    }

    /// Topology generation, bumped on every structural or flag edit
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Look up a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id as usize).and_then(|s| s.as_mut())
    }

    /// Iterate over all live nodes
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|n| (i as NodeId, n)))
    }

    /// Append a child node under `parent`
    pub fn add_child(
        &mut self,
        parent: NodeId,
        position: Vec3,
        flags: NodeFlags,
    ) -> Result<NodeId, GraphError> {
        if self.node(parent).is_none() {
            return Err(GraphError::MissingNode(parent));
        }

        let node = Node {
            position,
            flags,
            parent: Some(parent),
            children: Vec::new(),
        };

        let id = match self.vacant.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                (self.slots.len() - 1) as NodeId
            }
        };

        if let Some(p) = self.node_mut(parent) {
            p.children.push(id);
        }
        self.live += 1;
        self.generation += 1;
        Ok(id)
    }

    /// Remove `node` and everything below it.
    ///
    /// Unknown or already-removed ids are a no-op so teardown can safely
    /// remove twice. The root cannot be removed.
    pub fn remove_subtree(&mut self, node: NodeId) {
        if self.node(node).is_none() {
            return;
        }
        if node == self.root {
            warn!(node, "ignoring request to remove the root subtree");
            return;
        }

        // Detach from the parent's child list first
        if let Some(parent) = self.node(node).and_then(|n| n.parent) {
            if let Some(p) = self.node_mut(parent) {
                p.children.retain(|&c| c != node);
            }
        }

        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.slots.get_mut(id as usize).and_then(Option::take) {
                stack.extend(n.children);
                self.vacant.push(id);
                self.live -= 1;
            }
        }
        self.generation += 1;
    }

    /// Update a node's local-space position.
    ///
    /// Positions feed the derived distance computation, so this bumps the
    /// topology generation like any other edit.
    pub fn set_position(&mut self, node: NodeId, position: Vec3) -> Result<(), GraphError> {
        let n = self.node_mut(node).ok_or(GraphError::MissingNode(node))?;
        n.position = position;
        self.generation += 1;
        Ok(())
    }

    /// Replace a node's edge flags
    pub fn set_flags(&mut self, node: NodeId, flags: NodeFlags) -> Result<(), GraphError> {
        let n = self.node_mut(node).ok_or(GraphError::MissingNode(node))?;
        n.flags = flags;
        self.generation += 1;
        Ok(())
    }

    /// Check structural invariants: a single root, no cycles, and every
    /// live node reachable from the root.
    ///
    /// Authoring errors fail here, at build time, rather than surfacing as
    /// corrupt derived data later.
    pub fn validate(&self) -> Result<(), GraphError> {
        let roots = self
            .iter()
            .filter(|(_, n)| n.parent.is_none())
            .count();
        if roots == 0 {
            return Err(GraphError::NoRoot);
        }
        if roots > 1 {
            return Err(GraphError::MultipleRoots);
        }

        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id).ok_or(GraphError::MissingNode(id))?;
            if visited[id as usize] {
                return Err(GraphError::CycleDetected(id));
            }
            visited[id as usize] = true;
            stack.extend(node.children.iter().copied());
        }

        for (id, _) in self.iter() {
            if !visited[id as usize] {
                return Err(GraphError::DetachedNode(id));
            }
        }
        Ok(())
    }

    /// Flatten the tree into the linear-array form.
    ///
    /// The write order is the one `deserialize` replays: root first, then
    /// recursively each node's children as one contiguous block.
    pub fn serialize(&self) -> Vec<FlatNode> {
        let mut flat = Vec::with_capacity(self.live);
        let mut ids = Vec::with_capacity(self.live);
        if let Some(root) = self.node(self.root) {
            flat.push(Self::flat_record(root, -1));
            ids.push(self.root);
            self.flatten_children(0, &mut flat, &mut ids);
        }
        flat
    }

    fn flat_record(node: &Node, parent_index: i32) -> FlatNode {
        FlatNode {
            position: node.position.to_array(),
            parent_index,
            child_count: 0,
            first_child_index: 0,
            flags: node.flags,
        }
    }

    fn flatten_children(&self, index: usize, flat: &mut Vec<FlatNode>, ids: &mut Vec<NodeId>) {
        let Some(node) = self.node(ids[index]) else {
            return;
        };
        let children = node.children.clone();
        let first = flat.len();
        flat[index].first_child_index = first as u32;
        flat[index].child_count = children.len() as u32;
        for &child in &children {
            if let Some(c) = self.node(child) {
                flat.push(Self::flat_record(c, index as i32));
                ids.push(child);
            }
        }
        for offset in 0..children.len() {
            self.flatten_children(first + offset, flat, ids);
        }
    }

    /// Rebuild a graph from the linear-array form.
    ///
    /// This is a pure index walk over the records; the shape comes entirely
    /// from the recorded child ranges, which must replay the write order of
    /// [`NodeGraph::serialize`] exactly.
    pub fn deserialize(flat: &[FlatNode]) -> Result<Self, GraphError> {
        if flat.is_empty() {
            return Err(GraphError::NoRoot);
        }
        if flat[0].parent_index != -1 {
            return Err(GraphError::NoRoot);
        }
        let len = flat.len();

        let mut slots: Vec<Option<Node>> = flat
            .iter()
            .map(|rec| {
                Some(Node {
                    position: Vec3::from_array(rec.position),
                    flags: rec.flags,
                    parent: None,
                    children: Vec::new(),
                })
            })
            .collect();

        for (index, rec) in flat.iter().enumerate() {
            if index > 0 && rec.parent_index == -1 {
                return Err(GraphError::MultipleRoots);
            }
            let first = rec.first_child_index as usize;
            let count = rec.child_count as usize;
            let end = first
                .checked_add(count)
                .ok_or(GraphError::InvalidFlatIndex { index, len })?;
            if count > 0 && (first == 0 || end > len) {
                return Err(GraphError::InvalidFlatIndex { index, len });
            }
            for child in first..end {
                if flat[child].parent_index != index as i32 {
                    return Err(GraphError::InvalidFlatIndex { index, len });
                }
                if let Some(c) = slots[child].as_mut() {
                    if c.parent.is_some() {
                        return Err(GraphError::CycleDetected(child as NodeId));
                    }
                    c.parent = Some(index as NodeId);
                }
                if let Some(n) = slots[index].as_mut() {
                    n.children.push(child as NodeId);
                }
            }
        }

        let graph = Self {
            slots,
            vacant: Vec::new(),
            root: 0,
            live: len,
            generation: 0,
        };
        graph.validate()?;
        Ok(graph)
    }
}
