//! Multi-pass bloom.
//!
//! Threshold extracts bright pixels at half resolution, a separable blur
//! smears them horizontally then vertically, and a composite pass blends the
//! result back over the untouched input.

use bytemuck::{Pod, Zeroable};

use crate::gpu::context::GpuContext;
use crate::gpu::quad::{self, QuadVertex, QUAD_VERTEX_COUNT};

/// Maximum blur radius (caps GPU cost).
pub const MAX_BLOOM_RADIUS: f32 = 32.0;

/// Bloom is processed at 1/DOWNSAMPLE resolution.
const DOWNSAMPLE: u32 = 2;

/// Bloom parameters for one frame.
#[derive(Clone, Copy, Debug)]
pub struct BloomParams {
    pub threshold: f32,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            intensity: 1.2,
            radius: 4.0,
        }
    }
}

impl BloomParams {
    /// Clamp parameters to safe ranges.
    pub fn sanitize(&self) -> Self {
        Self {
            threshold: self.threshold.max(0.0),
            intensity: self.intensity.max(0.0),
            radius: self.radius.clamp(0.0, MAX_BLOOM_RADIUS),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ThresholdUniforms {
    threshold: f32,
    soft_knee: f32,
    _padding: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BlurUniforms {
    // xy = direction, z = radius, w unused.
    direction_and_radius: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CompositeUniforms {
    intensity: f32,
    _padding: [f32; 3],
}

pub struct BloomProcessor {
    bloom_texture_a: wgpu::Texture,
    bloom_texture_b: wgpu::Texture,
    bloom_view_a: wgpu::TextureView,
    bloom_view_b: wgpu::TextureView,

    threshold_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,

    single_texture_layout: wgpu::BindGroupLayout,
    composite_texture_layout: wgpu::BindGroupLayout,

    threshold_uniforms: wgpu::Buffer,
    threshold_bind_group: wgpu::BindGroup,
    blur_h_uniforms: wgpu::Buffer,
    blur_h_bind_group: wgpu::BindGroup,
    blur_v_uniforms: wgpu::Buffer,
    blur_v_bind_group: wgpu::BindGroup,
    composite_uniforms: wgpu::Buffer,
    composite_bind_group: wgpu::BindGroup,

    sampler: wgpu::Sampler,
    quad_vertex_buffer: wgpu::Buffer,
    format: wgpu::TextureFormat,
}

impl BloomProcessor {
    pub fn new(gpu: &GpuContext, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        let device = &gpu.device;

        let (tex_a, view_a) =
            Self::create_bloom_texture(device, format, width, height, "Bloom Texture A");
        let (tex_b, view_b) =
            Self::create_bloom_texture(device, format, width, height, "Bloom Texture B");

        let sampler = gpu.create_linear_sampler("Bloom Sampler");

        let single_texture_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Bloom Single Texture Layout"),
                entries: &[texture_entry(0), sampler_entry(1)],
            });

        let composite_texture_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Bloom Composite Texture Layout"),
                entries: &[texture_entry(0), texture_entry(1), sampler_entry(2)],
            });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Uniform Layout"),
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

        let threshold_pipeline = create_pass_pipeline(
            device,
            "Bloom Threshold",
            include_str!("shader_bloom_threshold.wgsl"),
            &[&single_texture_layout, &uniform_layout],
            format,
        );
        let blur_pipeline = create_pass_pipeline(
            device,
            "Bloom Blur",
            include_str!("shader_bloom_blur.wgsl"),
            &[&single_texture_layout, &uniform_layout],
            format,
        );
        let composite_pipeline = create_pass_pipeline(
            device,
            "Bloom Composite",
            include_str!("shader_bloom_composite.wgsl"),
            &[&composite_texture_layout, &uniform_layout],
            format,
        );

        let make_uniform_buffer = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let make_uniform_group = |label: &str, buffer: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        };

        let threshold_uniforms = make_uniform_buffer(
            "Bloom Threshold Uniforms",
            std::mem::size_of::<ThresholdUniforms>() as u64,
        );
        let threshold_bind_group =
            make_uniform_group("Bloom Threshold Uniform Group", &threshold_uniforms);
        let blur_h_uniforms =
            make_uniform_buffer("Bloom Blur H Uniforms", std::mem::size_of::<BlurUniforms>() as u64);
        let blur_h_bind_group = make_uniform_group("Bloom Blur H Uniform Group", &blur_h_uniforms);
        let blur_v_uniforms =
            make_uniform_buffer("Bloom Blur V Uniforms", std::mem::size_of::<BlurUniforms>() as u64);
        let blur_v_bind_group = make_uniform_group("Bloom Blur V Uniform Group", &blur_v_uniforms);
        let composite_uniforms = make_uniform_buffer(
            "Bloom Composite Uniforms",
            std::mem::size_of::<CompositeUniforms>() as u64,
        );
        let composite_bind_group =
            make_uniform_group("Bloom Composite Uniform Group", &composite_uniforms);

        Self {
            bloom_texture_a: tex_a,
            bloom_texture_b: tex_b,
            bloom_view_a: view_a,
            bloom_view_b: view_b,
            threshold_pipeline,
            blur_pipeline,
            composite_pipeline,
            single_texture_layout,
            composite_texture_layout,
            threshold_uniforms,
            threshold_bind_group,
            blur_h_uniforms,
            blur_h_bind_group,
            blur_v_uniforms,
            blur_v_bind_group,
            composite_uniforms,
            composite_bind_group,
            sampler,
            quad_vertex_buffer: quad::create_quad_buffer(device, "Bloom Quad"),
            format,
        }
    }

    fn create_bloom_texture(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        label: &str,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: (width / DOWNSAMPLE).max(1),
                height: (height / DOWNSAMPLE).max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    }

    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        let (tex_a, view_a) =
            Self::create_bloom_texture(&gpu.device, self.format, width, height, "Bloom Texture A");
        let (tex_b, view_b) =
            Self::create_bloom_texture(&gpu.device, self.format, width, height, "Bloom Texture B");
        self.bloom_texture_a = tex_a;
        self.bloom_texture_b = tex_b;
        self.bloom_view_a = view_a;
        self.bloom_view_b = view_b;
    }

    fn single_input_group(&self, device: &wgpu::Device, view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Input Bind Group"),
            layout: &self.single_texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn run_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::RenderPipeline,
        textures: &wgpu::BindGroup,
        uniforms: &wgpu::BindGroup,
        output: &wgpu::TextureView,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
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
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, textures, &[]);
        render_pass.set_bind_group(1, uniforms, &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }

    /// Run the full bloom chain from `input` into `output`.
    pub fn process(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        params: &BloomParams,
    ) {
        let params = params.sanitize();
        let device = &gpu.device;

        gpu.queue.write_buffer(
            &self.threshold_uniforms,
            0,
            bytemuck::bytes_of(&ThresholdUniforms {
                threshold: params.threshold,
                soft_knee: 0.5,
                _padding: [0.0; 2],
            }),
        );
        // Blur radius is halved to match the downsampled resolution.
        let radius = (params.radius / DOWNSAMPLE as f32).max(0.5);
        gpu.queue.write_buffer(
            &self.blur_h_uniforms,
            0,
            bytemuck::bytes_of(&BlurUniforms {
                direction_and_radius: [1.0, 0.0, radius, 0.0],
            }),
        );
        gpu.queue.write_buffer(
            &self.blur_v_uniforms,
            0,
            bytemuck::bytes_of(&BlurUniforms {
                direction_and_radius: [0.0, 1.0, radius, 0.0],
            }),
        );
        gpu.queue.write_buffer(
            &self.composite_uniforms,
            0,
            bytemuck::bytes_of(&CompositeUniforms {
                intensity: params.intensity,
                _padding: [0.0; 3],
            }),
        );

        // Threshold: input -> A (downsampled).
        let input_group = self.single_input_group(device, input);
        self.run_pass(
            encoder,
            "Bloom Threshold Pass",
            &self.threshold_pipeline,
            &input_group,
            &self.threshold_bind_group,
            &self.bloom_view_a,
        );

        // Separable blur: A -> B -> A.
        let group_a = self.single_input_group(device, &self.bloom_view_a);
        self.run_pass(
            encoder,
            "Bloom Blur H Pass",
            &self.blur_pipeline,
            &group_a,
            &self.blur_h_bind_group,
            &self.bloom_view_b,
        );
        let group_b = self.single_input_group(device, &self.bloom_view_b);
        self.run_pass(
            encoder,
            "Bloom Blur V Pass",
            &self.blur_pipeline,
            &group_b,
            &self.blur_v_bind_group,
            &self.bloom_view_a,
        );

        // Composite: original + blurred A -> output.
        let composite_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Composite Bind Group"),
            layout: &self.composite_texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.bloom_view_a),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.run_pass(
            encoder,
            "Bloom Composite Pass",
            &self.composite_pipeline,
            &composite_group,
            &self.composite_bind_group,
            output,
        );
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

pub(crate) fn create_pass_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader_source: &str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader_source.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{label} Layout")),
        bind_group_layouts,
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
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
                format,
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
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_ranges() {
        let params = BloomParams {
            threshold: -1.0,
            intensity: -0.5,
            radius: 100.0,
        }
        .sanitize();
        assert_eq!(params.threshold, 0.0);
        assert_eq!(params.intensity, 0.0);
        assert_eq!(params.radius, MAX_BLOOM_RADIUS);
    }
}
