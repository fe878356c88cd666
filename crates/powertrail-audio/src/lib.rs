//! PowerTrail Audio - Trail Segment Audio Allocation
//!
//! This crate places a small fixed pool of audio emitters along the
//! simplified trail path:
//! - Emitter pool with stable handles and per-emitter segment assignments
//! - Nearest-segment allocator with a stability rule that avoids
//!   reassignment churn
//! - The job contract handed to the external audio engine

pub mod allocator;
pub mod pool;

pub use allocator::{AudioConfig, SegmentAllocator};
pub use pool::{EmitterCommand, EmitterId, EmitterJob, EmitterPool, EmitterSink, SegmentKey};
