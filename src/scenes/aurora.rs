//! Drifting noise curtains tinted by the palette, pulsed by tatums.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use super::fullscreen::FullscreenPass;
use crate::gpu::context::GpuContext;
use crate::palette::Palette;
use crate::scene::{FrameInputs, Scene, SceneInputs};
use crate::scheduler::Cue;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct AuroraUniforms {
    color_a: [f32; 4],
    color_b: [f32; 4],
    color_c: [f32; 4],
    time: f32,
    pulse: f32,
    aspect: f32,
    intensity: f32,
}

pub struct AuroraScene {
    pass: FullscreenPass,
    colors: [crate::palette::Color; 3],
    pulse: f32,
    time: f32,
    aspect: f32,
    intensity: f32,
}

impl AuroraScene {
    pub const ID: &'static str = "aurora";

    pub fn new(gpu: &GpuContext, width: u32, height: u32, inputs: &SceneInputs) -> Result<Self> {
        let pass = FullscreenPass::new(
            gpu,
            "Aurora",
            include_str!("aurora.wgsl"),
            std::mem::size_of::<AuroraUniforms>() as u64,
        )?;
        let mut scene = Self {
            pass,
            colors: [crate::palette::Color::WHITE; 3],
            pulse: 0.0,
            time: 0.0,
            aspect: width.max(1) as f32 / height.max(1) as f32,
            intensity: 0.0,
        };
        scene.set_palette(inputs.palette);
        Ok(scene)
    }
}

impl Scene for AuroraScene {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn resize(&mut self, _gpu: &GpuContext, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    fn update(&mut self, dt: f32, elapsed: f32, inputs: &FrameInputs) {
        self.time = elapsed;
        self.intensity = inputs.intensity;
        self.pulse = (self.pulse - dt * 1.5).max(0.0);
    }

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        let uniforms = AuroraUniforms {
            color_a: self.colors[0].to_vec4(1.0),
            color_b: self.colors[1].to_vec4(1.0),
            color_c: self.colors[2].to_vec4(1.0),
            time: self.time,
            pulse: self.pulse,
            aspect: self.aspect,
            intensity: self.intensity,
        };
        self.pass.write_uniforms(gpu, bytemuck::bytes_of(&uniforms));
        self.pass.draw(encoder, target, "Aurora Pass");
    }

    fn set_palette(&mut self, palette: &Palette) {
        self.colors = [palette.swatch(0), palette.swatch(1), palette.swatch(2)];
    }

    fn on_tatum(&mut self, _cue: &Cue) {
        self.pulse = (self.pulse + 0.25).min(1.0);
    }
}
