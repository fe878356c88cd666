//! PowerTrail Core - Domain Model and Propagation State
//!
//! This crate contains the core domain model for PowerTrail, including:
//! - Node graph of positioned trail nodes
//! - Derived trail info (full and simplified path segments)
//! - Propagation engine and power state machine
//! - Authored per-trail settings

#![warn(missing_docs)]

pub use glam::Vec3;

pub mod graph;
pub mod propagation;
pub mod settings;
pub mod trail;

pub use graph::{FlatNode, GraphError, Node, NodeFlags, NodeGraph, NodeId};
pub use propagation::{
    PowerEvent, PowerState, PropagationConfig, PropagationEngine, SavedPropagation,
};
pub use settings::TrailSettings;
pub use trail::{TrailInfo, TrailSegment};
