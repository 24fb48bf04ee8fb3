//! Shared plumbing for full-screen shader scenes.

use anyhow::Result;

use crate::gpu::context::{GpuContext, TARGET_FORMAT};
use crate::gpu::quad::{self, QuadVertex, QUAD_VERTEX_COUNT};

/// One full-screen pipeline with a uniform buffer and, optionally, a sampled
/// texture (group 1). Scenes write their uniforms each frame and draw into
/// the target the compositor provides.
pub struct FullscreenPass {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: Option<wgpu::BindGroupLayout>,
    texture_bind_group: Option<wgpu::BindGroup>,
    sampler: Option<wgpu::Sampler>,
    quad_vertex_buffer: wgpu::Buffer,
}

impl FullscreenPass {
    /// Build a pass with uniforms only.
    pub fn new(gpu: &GpuContext, label: &str, shader_source: &str, uniform_size: u64) -> Result<Self> {
        Self::build(gpu, label, shader_source, uniform_size, None)
    }

    /// Build a pass that additionally samples one texture at group 1.
    pub fn with_texture(
        gpu: &GpuContext,
        label: &str,
        shader_source: &str,
        uniform_size: u64,
        texture: &wgpu::TextureView,
    ) -> Result<Self> {
        Self::build(gpu, label, shader_source, uniform_size, Some(texture))
    }

    fn build(
        gpu: &GpuContext,
        label: &str,
        shader_source: &str,
        uniform_size: u64,
        texture: Option<&wgpu::TextureView>,
    ) -> Result<Self> {
        let device = &gpu.device;
        let limit = device.limits().max_uniform_buffer_binding_size as u64;
        if uniform_size == 0 || uniform_size > limit {
            anyhow::bail!("uniform buffer size {uniform_size} outside device limit {limit}");
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{label} Uniform Layout")),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = texture.map(|_| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{label} Texture Layout")),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            })
        });

        let mut group_layouts: Vec<&wgpu::BindGroupLayout> = vec![&uniform_layout];
        if let Some(layout) = texture_layout.as_ref() {
            group_layouts.push(layout);
        }

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{label} Pipeline Layout")),
            bind_group_layouts: &group_layouts,
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{label} Pipeline")),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} Uniforms")),
            size: uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label} Uniform Bind Group")),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = texture.map(|_| gpu.create_linear_sampler(&format!("{label} Sampler")));
        let texture_bind_group = match (&texture_layout, &sampler, texture) {
            (Some(layout), Some(sampler), Some(view)) => {
                Some(Self::make_texture_bind_group(device, layout, sampler, view))
            }
            _ => None,
        };

        Ok(Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            texture_bind_group,
            sampler,
            quad_vertex_buffer: quad::create_quad_buffer(device, &format!("{label} Quad")),
        })
    }

    fn make_texture_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fullscreen Texture Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Swap the sampled texture (cover-art replacement).
    pub fn set_texture(&mut self, gpu: &GpuContext, view: &wgpu::TextureView) {
        if let (Some(layout), Some(sampler)) = (&self.texture_layout, &self.sampler) {
            self.texture_bind_group =
                Some(Self::make_texture_bind_group(&gpu.device, layout, sampler, view));
        }
    }

    pub fn write_uniforms(&self, gpu: &GpuContext, bytes: &[u8]) {
        gpu.queue.write_buffer(&self.uniform_buffer, 0, bytes);
    }

    pub fn draw(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView, label: &str) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        if let Some(texture_group) = &self.texture_bind_group {
            render_pass.set_bind_group(1, texture_group, &[]);
        }
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }
}
