//! Mirrored-wedge kaleidoscope over the cover art.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use super::{approach, fullscreen::FullscreenPass, hash01};
use crate::gpu::context::GpuContext;
use crate::scene::{FrameInputs, Scene, SceneInputs};
use crate::scheduler::Cue;

/// Wedge count clamp range.
const MIN_SEGMENTS: u32 = 3;
const MAX_SEGMENTS: u32 = 24;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct KaleidoscopeUniforms {
    time: f32,
    radius: f32,
    segments: f32,
    aspect: f32,
}

pub struct KaleidoscopeScene {
    pass: FullscreenPass,
    // Keeps the stand-in pixel alive until artwork replaces it.
    _fallback: (wgpu::Texture, wgpu::TextureView),
    segments: u32,
    radius: f32,
    time: f32,
    aspect: f32,
}

impl KaleidoscopeScene {
    pub const ID: &'static str = "kaleidoscope";

    pub fn new(gpu: &GpuContext, width: u32, height: u32, inputs: &SceneInputs) -> Result<Self> {
        // Solid accent pixel stands in until artwork arrives.
        let fallback = gpu.create_solid_texture("Kaleidoscope Fallback", [29, 185, 84, 255]);
        let initial = inputs.album_texture.unwrap_or(&fallback.1);
        let pass = FullscreenPass::with_texture(
            gpu,
            "Kaleidoscope",
            include_str!("kaleidoscope.wgsl"),
            std::mem::size_of::<KaleidoscopeUniforms>() as u64,
            initial,
        )?;
        Ok(Self {
            pass,
            _fallback: fallback,
            segments: 6,
            radius: 1.2,
            time: 0.0,
            aspect: width.max(1) as f32 / height.max(1) as f32,
        })
    }

    pub fn set_segments(&mut self, segments: u32) {
        self.segments = segments.clamp(MIN_SEGMENTS, MAX_SEGMENTS);
    }
}

impl Scene for KaleidoscopeScene {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn resize(&mut self, _gpu: &GpuContext, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    fn update(&mut self, dt: f32, elapsed: f32, _inputs: &FrameInputs) {
        self.time = elapsed;
        self.radius += (1.15 - self.radius) * approach(dt, 3.0);
    }

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        let uniforms = KaleidoscopeUniforms {
            time: self.time,
            radius: self.radius,
            segments: self.segments as f32,
            aspect: self.aspect,
        };
        self.pass.write_uniforms(gpu, bytemuck::bytes_of(&uniforms));
        self.pass.draw(encoder, target, "Kaleidoscope Pass");
    }

    fn set_album_texture(&mut self, gpu: &GpuContext, view: &wgpu::TextureView) {
        self.pass.set_texture(gpu, view);
    }

    fn on_beat(&mut self, cue: &Cue) {
        self.radius = 1.1 + hash01(cue.index as u32) * 0.2;
    }
}
