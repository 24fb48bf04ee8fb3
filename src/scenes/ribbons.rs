//! Weaving ribbon bands, one per palette swatch, lifted by beats.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use super::{approach, fullscreen::FullscreenPass};
use crate::gpu::context::GpuContext;
use crate::palette::Palette;
use crate::scene::{FrameInputs, Scene, SceneInputs};
use crate::scheduler::Cue;

/// Number of ribbon bands.
const RIBBON_COUNT: usize = 5;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct RibbonsUniforms {
    colors: [[f32; 4]; RIBBON_COUNT],
    time: f32,
    glow: f32,
    aspect: f32,
    _pad: f32,
}

pub struct RibbonsScene {
    pass: FullscreenPass,
    colors: [crate::palette::Color; RIBBON_COUNT],
    glow: f32,
    time: f32,
    aspect: f32,
}

impl RibbonsScene {
    pub const ID: &'static str = "ribbons";

    pub fn new(gpu: &GpuContext, width: u32, height: u32, inputs: &SceneInputs) -> Result<Self> {
        let pass = FullscreenPass::new(
            gpu,
            "Ribbons",
            include_str!("ribbons.wgsl"),
            std::mem::size_of::<RibbonsUniforms>() as u64,
        )?;
        let mut scene = Self {
            pass,
            colors: [crate::palette::Color::WHITE; RIBBON_COUNT],
            glow: 0.7,
            time: 0.0,
            aspect: width.max(1) as f32 / height.max(1) as f32,
        };
        scene.set_palette(inputs.palette);
        Ok(scene)
    }
}

impl Scene for RibbonsScene {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn resize(&mut self, _gpu: &GpuContext, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    fn update(&mut self, dt: f32, elapsed: f32, _inputs: &FrameInputs) {
        self.time = elapsed;
        self.glow += (0.7 - self.glow) * approach(dt, 3.0);
    }

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        let mut colors = [[0.0; 4]; RIBBON_COUNT];
        for (slot, color) in colors.iter_mut().zip(self.colors.iter()) {
            *slot = color.to_vec4(1.0);
        }
        let uniforms = RibbonsUniforms {
            colors,
            time: self.time,
            glow: self.glow,
            aspect: self.aspect,
            _pad: 0.0,
        };
        self.pass.write_uniforms(gpu, bytemuck::bytes_of(&uniforms));
        self.pass.draw(encoder, target, "Ribbons Pass");
    }

    fn set_palette(&mut self, palette: &Palette) {
        for (i, color) in self.colors.iter_mut().enumerate() {
            *color = palette.swatch(i);
        }
    }

    fn on_beat(&mut self, _cue: &Cue) {
        self.glow = 1.0;
    }
}
