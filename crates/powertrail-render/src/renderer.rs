//! Trail Renderer - draws the glowing fill line along the trail
//!
//! The whole trail lives in one fixed-size uniform block; vertices are
//! pulled from the node-position table by index, so no vertex buffers are
//! needed and a fill-distance change costs a single buffer write.

use bytemuck::bytes_of;
use tracing::info;
use wgpu::util::DeviceExt;

use crate::uniforms::{TrailGpuData, TrailUniforms};
use crate::Result;

/// Trail line renderer
pub struct TrailRenderer {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    last_uniforms: Option<TrailUniforms>,
    segment_count: u32,
    hidden: bool,
}

impl TrailRenderer {
    /// Create a new trail renderer targeting `target_format`
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat) -> Result<Self> {
        info!("Creating trail renderer");

        let shader_source = include_str!("../../../shaders/trail_fill.wgsl");
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Trail Fill Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Trail Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Trail Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Trail Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader_module,
                entry_point: Some("vs_main"),
                // Vertex pulling from the uniform block: no vertex buffers
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Trail Uniform Buffer"),
            contents: bytes_of(&TrailUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trail Uniform Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Ok(Self {
            pipeline,
            uniform_buffer,
            bind_group,
            last_uniforms: None,
            segment_count: 0,
            hidden: false,
        })
    }

    /// Upload the current uniform block if it changed since the last frame
    pub fn prepare(&mut self, queue: &wgpu::Queue, data: &TrailGpuData) {
        let uniforms = data.uniforms();
        self.segment_count = uniforms.segment_count();
        self.hidden = uniforms.hidden();
        if self.last_uniforms.as_ref() != Some(uniforms) {
            queue.write_buffer(&self.uniform_buffer, 0, data.as_bytes());
            self.last_uniforms = Some(*uniforms);
        }
    }

    /// Record the trail draw into `pass`
    pub fn draw<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        if self.hidden || self.segment_count == 0 {
            return;
        }
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..self.segment_count * 2, 0..1);
    }
}
