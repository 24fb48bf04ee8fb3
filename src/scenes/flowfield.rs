//! Advected flow-field streaks between two palette colors.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use super::{approach, fullscreen::FullscreenPass};
use crate::gpu::context::GpuContext;
use crate::palette::Palette;
use crate::scene::{FrameInputs, Scene, SceneInputs};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FlowfieldUniforms {
    color_a: [f32; 4],
    color_b: [f32; 4],
    time: f32,
    strength: f32,
    aspect: f32,
    _pad: f32,
}

pub struct FlowfieldScene {
    pass: FullscreenPass,
    color_a: crate::palette::Color,
    color_b: crate::palette::Color,
    strength: f32,
    time: f32,
    aspect: f32,
}

impl FlowfieldScene {
    pub const ID: &'static str = "flowfield";

    pub fn new(gpu: &GpuContext, width: u32, height: u32, inputs: &SceneInputs) -> Result<Self> {
        let pass = FullscreenPass::new(
            gpu,
            "Flowfield",
            include_str!("flowfield.wgsl"),
            std::mem::size_of::<FlowfieldUniforms>() as u64,
        )?;
        let mut scene = Self {
            pass,
            color_a: crate::palette::Color::WHITE,
            color_b: crate::palette::Color::BLACK,
            strength: 1.0,
            time: 0.0,
            aspect: width.max(1) as f32 / height.max(1) as f32,
        };
        scene.set_palette(inputs.palette);
        Ok(scene)
    }
}

impl Scene for FlowfieldScene {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn resize(&mut self, _gpu: &GpuContext, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    fn update(&mut self, dt: f32, elapsed: f32, inputs: &FrameInputs) {
        self.time = elapsed;
        // Streak brightness follows the track's energy estimate.
        let target = 0.6 + inputs.intensity * 0.8;
        self.strength += (target - self.strength) * approach(dt, 3.0);
    }

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        let uniforms = FlowfieldUniforms {
            color_a: self.color_a.to_vec4(1.0),
            color_b: self.color_b.to_vec4(1.0),
            time: self.time,
            strength: self.strength,
            aspect: self.aspect,
            _pad: 0.0,
        };
        self.pass.write_uniforms(gpu, bytemuck::bytes_of(&uniforms));
        self.pass.draw(encoder, target, "Flowfield Pass");
    }

    fn set_palette(&mut self, palette: &Palette) {
        self.color_a = palette.swatch(0);
        self.color_b = palette.swatch(2);
    }
}
