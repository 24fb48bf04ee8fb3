//! Accent-tinted fly-through tunnel with a bar-driven camera roll.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use super::fullscreen::FullscreenPass;
use crate::gpu::context::GpuContext;
use crate::palette::Palette;
use crate::scene::{FrameInputs, Scene, SceneInputs};
use crate::scheduler::Cue;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct TunnelUniforms {
    color: [f32; 4],
    time: f32,
    roll: f32,
    speed: f32,
    aspect: f32,
}

pub struct TunnelScene {
    pass: FullscreenPass,
    color: crate::palette::Color,
    // Cycles 0..4; bars step by one, sections by two.
    section_mod: u32,
    roll: f32,
    time: f32,
    aspect: f32,
}

impl TunnelScene {
    pub const ID: &'static str = "tunnel";

    pub fn new(gpu: &GpuContext, width: u32, height: u32, inputs: &SceneInputs) -> Result<Self> {
        let pass = FullscreenPass::new(
            gpu,
            "Tunnel",
            include_str!("tunnel.wgsl"),
            std::mem::size_of::<TunnelUniforms>() as u64,
        )?;
        let mut scene = Self {
            pass,
            color: crate::palette::Color::WHITE,
            section_mod: 0,
            roll: 0.0,
            time: 0.0,
            aspect: width.max(1) as f32 / height.max(1) as f32,
        };
        scene.set_palette(inputs.palette);
        Ok(scene)
    }
}

impl Scene for TunnelScene {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn resize(&mut self, _gpu: &GpuContext, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    fn update(&mut self, _dt: f32, elapsed: f32, _inputs: &FrameInputs) {
        self.time = elapsed;
        self.roll = (elapsed * 0.2 + self.section_mod as f32).sin() * 0.2;
    }

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        let uniforms = TunnelUniforms {
            color: self.color.to_vec4(1.0),
            time: self.time,
            roll: self.roll,
            speed: 3.0,
            aspect: self.aspect,
        };
        self.pass.write_uniforms(gpu, bytemuck::bytes_of(&uniforms));
        self.pass.draw(encoder, target, "Tunnel Pass");
    }

    fn set_palette(&mut self, palette: &Palette) {
        self.color = palette.accent;
    }

    fn on_bar(&mut self, _cue: &Cue) {
        self.section_mod = (self.section_mod + 1) % 4;
    }

    fn on_section(&mut self, _cue: &Cue) {
        self.section_mod = (self.section_mod + 2) % 4;
    }
}
