//! Drifting cover-art sprites that pop on beats.

use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use super::{fullscreen::FullscreenPass, hash01};
use crate::gpu::context::GpuContext;
use crate::scene::{FrameInputs, Scene, SceneInputs};
use crate::scheduler::Cue;

/// Number of drifting sprites.
const SPRITE_COUNT: usize = 12;

/// Sprite field half-extent in scene units.
const FIELD: Vec2 = Vec2::new(1.4, 0.9);

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CoversUniforms {
    time: f32,
    aspect: f32,
    opacity: f32,
    _pad: f32,
    // xy = center, z = half-size, w unused.
    sprites: [[f32; 4]; SPRITE_COUNT],
}

#[derive(Clone, Copy, Debug)]
struct Sprite {
    position: Vec2,
    velocity: Vec2,
    base_size: f32,
    size: f32,
}

pub struct CoversScene {
    pass: FullscreenPass,
    // Keeps the stand-in pixel alive until artwork replaces it.
    _fallback: (wgpu::Texture, wgpu::TextureView),
    sprites: [Sprite; SPRITE_COUNT],
    opacity: f32,
    time: f32,
    aspect: f32,
}

impl CoversScene {
    pub const ID: &'static str = "covers";

    pub fn new(gpu: &GpuContext, width: u32, height: u32, inputs: &SceneInputs) -> Result<Self> {
        let fallback = gpu.create_solid_texture("Covers Fallback", [29, 185, 84, 255]);
        let initial = inputs.album_texture.unwrap_or(&fallback.1);
        let pass = FullscreenPass::with_texture(
            gpu,
            "Covers",
            include_str!("covers.wgsl"),
            std::mem::size_of::<CoversUniforms>() as u64,
            initial,
        )?;

        let sprites = std::array::from_fn(|i| {
            let n = i as u32;
            let base_size = 0.08 + hash01(n ^ 0x51ed) * 0.14;
            Sprite {
                position: Vec2::new(
                    (hash01(n) * 2.0 - 1.0) * FIELD.x,
                    (hash01(n ^ 0x9e37) * 2.0 - 1.0) * FIELD.y,
                ),
                velocity: Vec2::new(
                    (hash01(n ^ 0x85eb) - 0.5) * 0.12,
                    (hash01(n ^ 0xc2b2) - 0.5) * 0.12,
                ),
                base_size,
                size: base_size,
            }
        });

        Ok(Self {
            pass,
            _fallback: fallback,
            sprites,
            opacity: 0.85,
            time: 0.0,
            aspect: width.max(1) as f32 / height.max(1) as f32,
        })
    }
}

impl Scene for CoversScene {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn resize(&mut self, _gpu: &GpuContext, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    fn update(&mut self, dt: f32, elapsed: f32, _inputs: &FrameInputs) {
        self.time = elapsed;
        let relax = super::approach(dt, 3.0);
        for sprite in &mut self.sprites {
            sprite.position += sprite.velocity * dt;
            if sprite.position.x.abs() > FIELD.x {
                sprite.velocity.x = -sprite.velocity.x;
                sprite.position.x = sprite.position.x.clamp(-FIELD.x, FIELD.x);
            }
            if sprite.position.y.abs() > FIELD.y {
                sprite.velocity.y = -sprite.velocity.y;
                sprite.position.y = sprite.position.y.clamp(-FIELD.y, FIELD.y);
            }
            sprite.size += (sprite.base_size - sprite.size) * relax;
        }
        self.opacity += (0.85 - self.opacity) * relax;
    }

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    ) {
        let mut uniforms = CoversUniforms {
            time: self.time,
            aspect: self.aspect,
            opacity: self.opacity,
            _pad: 0.0,
            sprites: [[0.0; 4]; SPRITE_COUNT],
        };
        for (slot, sprite) in uniforms.sprites.iter_mut().zip(self.sprites.iter()) {
            *slot = [sprite.position.x, sprite.position.y, sprite.size, 0.0];
        }
        self.pass.write_uniforms(gpu, bytemuck::bytes_of(&uniforms));
        self.pass.draw(encoder, target, "Covers Pass");
    }

    fn set_album_texture(&mut self, gpu: &GpuContext, view: &wgpu::TextureView) {
        self.pass.set_texture(gpu, view);
    }

    fn on_beat(&mut self, _cue: &Cue) {
        for sprite in &mut self.sprites {
            sprite.size *= 1.08;
        }
        self.opacity = 1.0;
    }
}
