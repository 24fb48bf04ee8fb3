//! GPU post-processing chain.
//!
//! A fixed ordered chain — bloom, vignette, grain, chromatic aberration and
//! an optional depth-of-field pass — applied as full-screen passes over the
//! combined layer image. The pass list is rebuilt through the debounced
//! request in [`crate::postfx::PostFxChain`], never once per parameter tweak;
//! numeric parameter values flow into uniforms every frame regardless.

use bytemuck::{Pod, Zeroable};

use crate::gpu::bloom_processor::{create_pass_pipeline, BloomParams, BloomProcessor};
use crate::gpu::context::GpuContext;
use crate::gpu::quad::{self, QUAD_VERTEX_COUNT};
use crate::postfx::PostFxParams;

/// Uniform block shared by every single-pass screen effect.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ScreenPassUniforms {
    value: f32,
    time: f32,
    resolution: [f32; 2],
}

/// Screen effects that run as one full-screen pass each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScreenPassKind {
    Vignette,
    Grain,
    ChromaticAberration,
    DepthOfField,
}

impl ScreenPassKind {
    fn label(self) -> &'static str {
        match self {
            ScreenPassKind::Vignette => "Vignette",
            ScreenPassKind::Grain => "Grain",
            ScreenPassKind::ChromaticAberration => "Chromatic Aberration",
            ScreenPassKind::DepthOfField => "Depth Of Field",
        }
    }

    fn shader_source(self) -> &'static str {
        match self {
            ScreenPassKind::Vignette => include_str!("shader_post_vignette.wgsl"),
            ScreenPassKind::Grain => include_str!("shader_post_grain.wgsl"),
            ScreenPassKind::ChromaticAberration => {
                include_str!("shader_post_chromatic_aberration.wgsl")
            }
            ScreenPassKind::DepthOfField => include_str!("shader_post_dof.wgsl"),
        }
    }

    fn value(self, params: &PostFxParams) -> f32 {
        match self {
            ScreenPassKind::Vignette => params.vignette,
            ScreenPassKind::Grain => params.grain,
            ScreenPassKind::ChromaticAberration => params.chromatic_aberration,
            ScreenPassKind::DepthOfField => params.depth_of_field,
        }
    }
}

enum PostPass {
    /// Routed through the multi-pass [`BloomProcessor`].
    Bloom,
    Screen {
        kind: ScreenPassKind,
        pipeline: wgpu::RenderPipeline,
        uniform_buffer: wgpu::Buffer,
        uniform_bind_group: wgpu::BindGroup,
    },
}

pub struct PostProcessor {
    /// Combine-pass output and chain input.
    scene_texture: wgpu::Texture,
    scene_view: wgpu::TextureView,
    /// Ping-pong targets between passes.
    intermediate_textures: [wgpu::Texture; 2],
    intermediate_views: [wgpu::TextureView; 2],

    passes: Vec<PostPass>,
    bloom: BloomProcessor,

    texture_layout: wgpu::BindGroupLayout,
    uniform_layout: wgpu::BindGroupLayout,
    blit_pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    quad_vertex_buffer: wgpu::Buffer,

    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl PostProcessor {
    pub fn new(
        gpu: &GpuContext,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        params: &PostFxParams,
    ) -> Self {
        let device = &gpu.device;
        let width = width.max(1);
        let height = height.max(1);

        let create_texture = |label: &str| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        };

        let (scene_texture, scene_view) = create_texture("Post Scene Texture");
        let (tex_a, view_a) = create_texture("Post Intermediate A");
        let (tex_b, view_b) = create_texture("Post Intermediate B");

        let sampler = gpu.create_linear_sampler("Post Sampler");

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post Texture Layout"),
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
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post Uniform Layout"),
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

        let blit_pipeline = create_pass_pipeline(
            device,
            "Post Blit",
            include_str!("shader_post_blit.wgsl"),
            &[&texture_layout],
            format,
        );

        let bloom = BloomProcessor::new(gpu, format, width, height);

        let mut processor = Self {
            scene_texture,
            scene_view,
            intermediate_textures: [tex_a, tex_b],
            intermediate_views: [view_a, view_b],
            passes: Vec::new(),
            bloom,
            texture_layout,
            uniform_layout,
            blit_pipeline,
            sampler,
            quad_vertex_buffer: quad::create_quad_buffer(device, "Post Quad"),
            width,
            height,
            format,
        };
        processor.rebuild(gpu, params);
        processor
    }

    /// Rebuild the pass chain from the current parameters. Comparatively
    /// expensive (pipeline construction), so callers debounce this behind
    /// [`crate::postfx::PostFxChain::take_rebuild`].
    pub fn rebuild(&mut self, gpu: &GpuContext, params: &PostFxParams) {
        let mut kinds = vec![
            ScreenPassKind::Vignette,
            ScreenPassKind::Grain,
            ScreenPassKind::ChromaticAberration,
        ];
        if params.depth_of_field > 0.0 {
            kinds.push(ScreenPassKind::DepthOfField);
        }

        let mut passes = vec![PostPass::Bloom];
        for kind in kinds {
            passes.push(self.build_screen_pass(gpu, kind));
        }
        log::debug!("post chain rebuilt with {} passes", passes.len());
        self.passes = passes;
    }

    fn build_screen_pass(&self, gpu: &GpuContext, kind: ScreenPassKind) -> PostPass {
        let device = &gpu.device;
        let pipeline = create_pass_pipeline(
            device,
            kind.label(),
            kind.shader_source(),
            &[&self.texture_layout, &self.uniform_layout],
            self.format,
        );
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} Uniforms", kind.label())),
            size: std::mem::size_of::<ScreenPassUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} Uniform Group", kind.label())),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        PostPass::Screen {
            kind,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
        }
    }

    /// The view the combine pass renders into.
    pub fn scene_view(&self) -> &wgpu::TextureView {
        &self.scene_view
    }

    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;

        let device = &gpu.device;
        let create_texture = |label: &str| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: self.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        };

        let (scene_texture, scene_view) = create_texture("Post Scene Texture");
        let (tex_a, view_a) = create_texture("Post Intermediate A");
        let (tex_b, view_b) = create_texture("Post Intermediate B");
        self.scene_texture = scene_texture;
        self.scene_view = scene_view;
        self.intermediate_textures = [tex_a, tex_b];
        self.intermediate_views = [view_a, view_b];

        self.bloom.resize(gpu, width, height);
    }

    fn input_bind_group(&self, device: &wgpu::Device, view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Post Input Bind Group"),
            layout: &self.texture_layout,
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

    /// Apply the chain from the scene texture into `output_view`.
    ///
    /// `effective_bloom` is the tuned bloom strength with the beat pulse
    /// already applied by the engine.
    pub fn process(
        &self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        output_view: &wgpu::TextureView,
        params: &PostFxParams,
        effective_bloom: f32,
        time: f32,
    ) {
        if self.passes.is_empty() {
            let bind_group = self.input_bind_group(&gpu.device, &self.scene_view);
            self.blit(encoder, output_view, &bind_group);
            return;
        }

        let mut current_input = &self.scene_view;
        let mut ping = 0;

        for (i, pass) in self.passes.iter().enumerate() {
            let is_last = i == self.passes.len() - 1;
            let output = if is_last {
                output_view
            } else {
                &self.intermediate_views[ping]
            };

            match pass {
                PostPass::Bloom => {
                    let bloom_params = BloomParams {
                        intensity: effective_bloom,
                        ..BloomParams::default()
                    };
                    self.bloom
                        .process(gpu, encoder, current_input, output, &bloom_params);
                }
                PostPass::Screen {
                    kind,
                    pipeline,
                    uniform_buffer,
                    uniform_bind_group,
                } => {
                    gpu.queue.write_buffer(
                        uniform_buffer,
                        0,
                        bytemuck::bytes_of(&ScreenPassUniforms {
                            value: kind.value(params),
                            time,
                            resolution: [self.width as f32, self.height as f32],
                        }),
                    );
                    let texture_bind_group = self.input_bind_group(&gpu.device, current_input);

                    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some(kind.label()),
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
                    render_pass.set_bind_group(0, &texture_bind_group, &[]);
                    render_pass.set_bind_group(1, uniform_bind_group, &[]);
                    render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
                    render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
                }
            }

            if !is_last {
                current_input = &self.intermediate_views[ping];
                ping = 1 - ping;
            }
        }
    }

    fn blit(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Post Blit Pass"),
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
        render_pass.set_pipeline(&self.blit_pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }
}
