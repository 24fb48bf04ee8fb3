//! Cracked voronoi cells with beat-triggered ripples.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use super::{fullscreen::FullscreenPass, hash01};
use crate::gpu::context::GpuContext;
use crate::palette::Palette;
use crate::scene::{FrameInputs, Scene, SceneInputs};
use crate::scheduler::Cue;

/// Live ripple cap; the shader uniform array has this many slots.
pub const MAX_RIPPLES: usize = 32;

/// Ripples older than this are dropped.
const RIPPLE_LIFETIME: f32 = 6.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct VoronoiUniforms {
    color_a: [f32; 4],
    color_b: [f32; 4],
    time: f32,
    aspect: f32,
    ripple_count: f32,
    _pad: f32,
    // xy = center, z = birth time, w unused.
    ripples: [[f32; 4]; MAX_RIPPLES],
}

#[derive(Clone, Copy, Debug)]
struct Ripple {
    center: Vec2,
    born_at: f32,
}

pub struct VoronoiScene {
    pass: FullscreenPass,
    color_a: crate::palette::Color,
    color_b: crate::palette::Color,
    ripples: Vec<Ripple>,
    time: f32,
    aspect: f32,
}

impl VoronoiScene {
    pub const ID: &'static str = "voronoi";

    pub fn new(gpu: &GpuContext, width: u32, height: u32, inputs: &SceneInputs) -> Result<Self> {
        let pass = FullscreenPass::new(
            gpu,
            "Voronoi",
            include_str!("voronoi.wgsl"),
            std::mem::size_of::<VoronoiUniforms>() as u64,
        )?;
        let mut scene = Self {
            pass,
            color_a: crate::palette::Color::WHITE,
            color_b: crate::palette::Color::BLACK,
            ripples: Vec::new(),
            time: 0.0,
            aspect: width.max(1) as f32 / height.max(1) as f32,
        };
        scene.set_palette(inputs.palette);
        Ok(scene)
    }

    fn live_ripples(&self) -> impl Iterator<Item = &Ripple> {
        let now = self.time;
        self.ripples
            .iter()
            .filter(move |r| now - r.born_at < RIPPLE_LIFETIME)
    }
}

impl Scene for VoronoiScene {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn resize(&mut self, _gpu: &GpuContext, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    fn update(&mut self, _dt: f32, elapsed: f32, _inputs: &FrameInputs) {
        self.time = elapsed;
        let cutoff = elapsed - RIPPLE_LIFETIME;
        self.ripples.retain(|r| r.born_at > cutoff);
    }

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        let mut uniforms = VoronoiUniforms {
            color_a: self.color_a.to_vec4(1.0),
            color_b: self.color_b.to_vec4(1.0),
            time: self.time,
            aspect: self.aspect,
            ripple_count: 0.0,
            _pad: 0.0,
            ripples: [[0.0; 4]; MAX_RIPPLES],
        };
        let mut count = 0;
        for ripple in self.live_ripples().take(MAX_RIPPLES) {
            uniforms.ripples[count] = [ripple.center.x, ripple.center.y, ripple.born_at, 0.0];
            count += 1;
        }
        uniforms.ripple_count = count as f32;

        self.pass.write_uniforms(gpu, bytemuck::bytes_of(&uniforms));
        self.pass.draw(encoder, target, "Voronoi Pass");
    }

    fn set_palette(&mut self, palette: &Palette) {
        self.color_a = palette.swatch(0);
        self.color_b = palette.swatch(1);
    }

    fn on_beat(&mut self, cue: &Cue) {
        // Ripple position derives from the beat index so replays match.
        let x = (hash01(cue.index as u32) * 2.0 - 1.0) * 0.6;
        let y = (hash01(cue.index as u32 ^ 0x5bd1) * 2.0 - 1.0) * 0.6;
        self.ripples.push(Ripple {
            center: Vec2::new(x, y),
            born_at: self.time,
        });
        if self.ripples.len() > MAX_RIPPLES {
            self.ripples.remove(0);
        }
    }
}
