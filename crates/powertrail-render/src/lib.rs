//! PowerTrail Render - GPU Data Marshalling
//!
//! This crate maps the derived trail data onto the fixed-capacity uniform
//! block consumed by the trail-fill shader:
//! - Static topology pass (node positions, segment index tables)
//! - Dynamic fill pass (per-segment interpolation fractions)
//! - wgpu pipeline and buffer upload

use thiserror::Error;

pub mod renderer;
pub mod uniforms;

pub use renderer::TrailRenderer;
pub use uniforms::{TrailGpuData, TrailUniforms, MAX_TRAIL_NODES, MAX_TRAIL_SEGMENTS};

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device-level failure
    #[error("Device error: {0}")]
    DeviceError(String),

    /// Shader compilation failed
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),
}

/// Result type for render operations
pub type Result<T> = std::result::Result<T, RenderError>;
