//! Layered scene compositing.
//!
//! Every registered scene owns an offscreen target and is simulated and
//! rendered each frame whether or not it is part of the composite, so
//! switching a layer back in is seamless. The combine pass additively blends
//! up to [`MAX_COMPOSITE_LAYERS`] active layers; unused texture slots bind a
//! 1x1 transparent fallback so the shader never samples an unbound resource,
//! and zero active layers degrade to black rather than undefined output.

use std::str::FromStr;

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::director::Director;
use crate::gpu::bloom_processor::create_pass_pipeline;
use crate::gpu::context::{GpuContext, TARGET_FORMAT};
use crate::gpu::quad::{self, QUAD_VERTEX_COUNT};
use crate::scene::{FrameInputs, Scene};
use crate::scheduler::{Cue, CueKind};

/// Bound on simultaneously combined layers (texture slots in the combine
/// shader). Registration is unbounded; the composite never exceeds this.
pub const MAX_COMPOSITE_LAYERS: usize = 7;

/// Blend weight of the first composited layer.
const PRIMARY_WEIGHT: f32 = 1.0;

/// Blend weight of every further layer, slightly reduced to keep the
/// additive composite from clipping.
const SECONDARY_WEIGHT: f32 = 0.9;

/// Which layers are composited each frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeMode {
    /// The director's current pair.
    Director,
    /// Every registered scene (capped at the slot bound).
    All,
    /// A single chosen scene.
    Solo(String),
}

impl FromStr for CompositeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "director" => Ok(CompositeMode::Director),
            "all" => Ok(CompositeMode::All),
            _ => match s.strip_prefix("solo:") {
                Some(id) if !id.is_empty() => Ok(CompositeMode::Solo(id.to_string())),
                _ => anyhow::bail!("unknown composite mode '{s}' (expected director, all, or solo:<id>)"),
            },
        }
    }
}

impl std::fmt::Display for CompositeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompositeMode::Director => write!(f, "director"),
            CompositeMode::All => write!(f, "all"),
            CompositeMode::Solo(id) => write!(f, "solo:{id}"),
        }
    }
}

/// The active subset for a frame, given the mode and the director state.
/// Unregistered ids are dropped rather than composited as holes.
pub fn select_active(
    mode: &CompositeMode,
    registered: &[String],
    director: &Director,
) -> Vec<String> {
    match mode {
        CompositeMode::Director => director
            .active()
            .iter()
            .filter(|id| registered.contains(id))
            .cloned()
            .collect(),
        CompositeMode::All => registered.to_vec(),
        CompositeMode::Solo(id) => {
            if registered.contains(id) {
                vec![id.clone()]
            } else {
                Vec::new()
            }
        }
    }
}

/// Map active ids onto combine-shader slots. Every slot past the cap, and
/// every id without a registered layer, resolves to `None` (the fallback
/// texture).
pub(crate) fn assign_slots(
    active: &[String],
    registered: &[String],
) -> [Option<usize>; MAX_COMPOSITE_LAYERS] {
    let mut slots = [None; MAX_COMPOSITE_LAYERS];
    for (slot, id) in active.iter().take(MAX_COMPOSITE_LAYERS).enumerate() {
        slots[slot] = registered.iter().position(|layer_id| layer_id == id);
    }
    slots
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CombineUniforms {
    // One weight per slot in .x; vec4 stride for uniform array layout.
    weights: [[f32; 4]; MAX_COMPOSITE_LAYERS],
}

struct Layer {
    scene: Box<dyn Scene>,
    _target: wgpu::Texture,
    view: wgpu::TextureView,
    opacity: f32,
}

struct CombinePass {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    _fallback_texture: wgpu::Texture,
    fallback_view: wgpu::TextureView,
    quad_vertex_buffer: wgpu::Buffer,
}

impl CombinePass {
    fn new(gpu: &GpuContext) -> Self {
        let device = &gpu.device;

        let mut entries = Vec::with_capacity(MAX_COMPOSITE_LAYERS + 1);
        for binding in 0..MAX_COMPOSITE_LAYERS as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: MAX_COMPOSITE_LAYERS as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Combine Texture Layout"),
            entries: &entries,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Combine Uniform Layout"),
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

        let pipeline = create_pass_pipeline(
            device,
            "Combine",
            include_str!("gpu/shader_combine.wgsl"),
            &[&texture_layout, &uniform_layout],
            TARGET_FORMAT,
        );

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Combine Uniforms"),
            size: std::mem::size_of::<CombineUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Combine Uniform Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let (fallback_texture, fallback_view) =
            gpu.create_solid_texture("Combine Fallback", [0, 0, 0, 0]);

        Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            sampler: gpu.create_linear_sampler("Combine Sampler"),
            _fallback_texture: fallback_texture,
            fallback_view,
            quad_vertex_buffer: quad::create_quad_buffer(device, "Combine Quad"),
        }
    }
}

pub struct LayerCompositor {
    layers: Vec<Layer>,
    combine: CombinePass,
    width: u32,
    height: u32,
}

impl LayerCompositor {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        Self {
            layers: Vec::new(),
            combine: CombinePass::new(gpu),
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Register a scene built by `construct`. Construction failure excludes
    /// only that scene: the error is logged, the compositor proceeds with the
    /// remaining layers, and `false` is returned.
    pub fn register<F>(&mut self, gpu: &GpuContext, construct: F) -> bool
    where
        F: FnOnce(&GpuContext, u32, u32) -> Result<Box<dyn Scene>>,
    {
        match construct(gpu, self.width, self.height) {
            Ok(scene) => {
                let (target, view) = gpu.create_layer_target(
                    &format!("Layer Target: {}", scene.id()),
                    self.width,
                    self.height,
                );
                log::info!("registered scene '{}'", scene.id());
                self.layers.push(Layer {
                    scene,
                    _target: target,
                    view,
                    opacity: 1.0,
                });
                true
            }
            Err(err) => {
                log::error!("scene construction failed, excluding layer: {err:#}");
                false
            }
        }
    }

    /// Registered scene ids in canonical (registration) order.
    pub fn scene_ids(&self) -> Vec<String> {
        self.layers
            .iter()
            .map(|layer| layer.scene.id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Set the blend opacity of one layer.
    pub fn set_opacity(&mut self, id: &str, opacity: f32) {
        if let Some(layer) = self.layers.iter_mut().find(|l| l.scene.id() == id) {
            layer.opacity = opacity.clamp(0.0, 1.0);
        }
    }

    /// Apply a closure to every registered scene (palette/analysis feeds).
    pub fn for_each_scene(&mut self, mut f: impl FnMut(&mut dyn Scene)) {
        for layer in &mut self.layers {
            f(layer.scene.as_mut());
        }
    }

    /// Fan one cue out to every scene's matching handler.
    pub fn dispatch_cue(&mut self, cue: &Cue) {
        for layer in &mut self.layers {
            match cue.kind {
                CueKind::Section => layer.scene.on_section(cue),
                CueKind::Bar => layer.scene.on_bar(cue),
                CueKind::Beat => layer.scene.on_beat(cue),
                CueKind::Tatum => layer.scene.on_tatum(cue),
            }
        }
    }

    /// Recreate every layer target at the new output resolution.
    pub fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        for layer in &mut self.layers {
            let (target, view) = gpu.create_layer_target(
                &format!("Layer Target: {}", layer.scene.id()),
                self.width,
                self.height,
            );
            layer._target = target;
            layer.view = view;
            layer.scene.resize(gpu, self.width, self.height);
        }
    }

    /// Human-readable description of the active set, for UI display.
    pub fn describe(&self, mode: &CompositeMode, director: &Director) -> String {
        match mode {
            CompositeMode::Director => format!("Director: {}", director.active().join(" + ")),
            CompositeMode::All => "All Scenes".to_string(),
            CompositeMode::Solo(id) => format!("Solo: {id}"),
        }
    }

    /// Simulate and render every registered scene, then combine the active
    /// subset into `output`.
    pub fn render_frame(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        dt: f32,
        elapsed: f32,
        inputs: &FrameInputs,
        active: &[String],
        output: &wgpu::TextureView,
    ) {
        // Inactive scenes keep simulating and rendering so a later switch
        // resumes mid-motion instead of from a stale frame.
        for layer in &mut self.layers {
            layer.scene.update(dt, elapsed, inputs);
            layer.scene.render(gpu, encoder, &layer.view);
        }

        let registered = self.scene_ids();
        let slots = assign_slots(active, &registered);

        let mut uniforms = CombineUniforms {
            weights: [[0.0; 4]; MAX_COMPOSITE_LAYERS],
        };
        for (slot, assigned) in slots.iter().enumerate() {
            if let Some(layer_index) = assigned {
                let base = if slot == 0 { PRIMARY_WEIGHT } else { SECONDARY_WEIGHT };
                uniforms.weights[slot][0] = base * self.layers[*layer_index].opacity;
            }
        }
        gpu.queue
            .write_buffer(&self.combine.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut entries = Vec::with_capacity(MAX_COMPOSITE_LAYERS + 1);
        for (slot, assigned) in slots.iter().enumerate() {
            let view = match assigned {
                Some(layer_index) => &self.layers[*layer_index].view,
                None => &self.combine.fallback_view,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: MAX_COMPOSITE_LAYERS as u32,
            resource: wgpu::BindingResource::Sampler(&self.combine.sampler),
        });
        let texture_bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Combine Texture Bind Group"),
            layout: &self.combine.texture_layout,
            entries: &entries,
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Combine Pass"),
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
        render_pass.set_pipeline(&self.combine.pipeline);
        render_pass.set_bind_group(0, &texture_bind_group, &[]);
        render_pass.set_bind_group(1, &self.combine.uniform_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.combine.quad_vertex_buffer.slice(..));
        render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mode_parses_and_displays() {
        assert_eq!(CompositeMode::from_str("director").unwrap(), CompositeMode::Director);
        assert_eq!(CompositeMode::from_str("all").unwrap(), CompositeMode::All);
        assert_eq!(
            CompositeMode::from_str("solo:tunnel").unwrap(),
            CompositeMode::Solo("tunnel".to_string())
        );
        assert!(CompositeMode::from_str("solo:").is_err());
        assert!(CompositeMode::from_str("nope").is_err());

        assert_eq!(CompositeMode::Solo("aurora".to_string()).to_string(), "solo:aurora");
    }

    #[test]
    fn select_active_covers_all_modes() {
        let registered = ids(&["a", "b", "c"]);
        let mut director = Director::new(registered.clone());
        director.on_section();

        let active = select_active(&CompositeMode::Director, &registered, &director);
        assert_eq!(active, director.active());

        let active = select_active(&CompositeMode::All, &registered, &director);
        assert_eq!(active, registered);

        let active = select_active(
            &CompositeMode::Solo("b".to_string()),
            &registered,
            &director,
        );
        assert_eq!(active, ids(&["b"]));

        // Unknown solo id degrades to an empty (black) composite.
        let active = select_active(
            &CompositeMode::Solo("missing".to_string()),
            &registered,
            &director,
        );
        assert!(active.is_empty());
    }

    #[test]
    fn slot_assignment_never_exceeds_the_cap() {
        let registered: Vec<String> = (0..12).map(|i| format!("scene{i}")).collect();
        let slots = assign_slots(&registered, &registered);
        let bound = slots.iter().filter(|slot| slot.is_some()).count();
        assert_eq!(bound, MAX_COMPOSITE_LAYERS);
        for (slot, assigned) in slots.iter().enumerate() {
            assert_eq!(*assigned, Some(slot));
        }
    }

    #[test]
    fn unused_slots_resolve_to_fallback() {
        let registered = ids(&["a", "b", "c"]);
        let slots = assign_slots(&ids(&["c", "a"]), &registered);
        assert_eq!(slots[0], Some(2));
        assert_eq!(slots[1], Some(0));
        for slot in &slots[2..] {
            assert_eq!(*slot, None);
        }
    }

    #[test]
    fn unregistered_active_id_maps_to_fallback() {
        let registered = ids(&["a", "b"]);
        let slots = assign_slots(&ids(&["ghost", "b"]), &registered);
        assert_eq!(slots[0], None);
        assert_eq!(slots[1], Some(1));
    }
}
