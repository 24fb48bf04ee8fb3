//! The plugin contract every visual layer satisfies.
//!
//! A scene is a self-contained animated visual rendering into an offscreen
//! target owned by the compositor. Scenes never touch shared state (palette
//! and analysis are read-only snapshots handed to them) and never read
//! another scene's target. Cue handlers are fire-and-forget nudges with
//! default no-op bodies, dispatched virtually — there is no runtime probing
//! for optional methods.

use std::sync::Arc;

use crate::analysis::AnalysisTimeline;
use crate::gpu::context::GpuContext;
use crate::palette::Palette;
use crate::scheduler::Cue;

/// Inputs available to a scene at construction time.
pub struct SceneInputs<'a> {
    pub palette: &'a Palette,
    pub tempo: f32,
    pub album_texture: Option<&'a wgpu::TextureView>,
}

/// Per-frame inputs shared by every scene.
pub struct FrameInputs<'a> {
    /// Playback position sampled from the external transport.
    pub position_ms: u64,

    /// Loudness-derived energy estimate in `[0, 1]`.
    pub intensity: f32,

    pub palette: &'a Palette,
}

/// Contract for one composited layer.
///
/// `update` advances simulation state only; all GPU writes happen in
/// `render`, which draws into the target the compositor hands over. Inactive
/// scenes still receive both calls every frame so switching back in is
/// seamless. A scene whose external inputs are missing must substitute a
/// neutral default and keep rendering, never fail the frame.
pub trait Scene {
    fn id(&self) -> &'static str;

    fn resize(&mut self, gpu: &GpuContext, width: u32, height: u32);

    fn update(&mut self, dt: f32, elapsed: f32, inputs: &FrameInputs);

    fn render(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
    );

    fn set_palette(&mut self, _palette: &Palette) {}

    fn set_album_texture(&mut self, _gpu: &GpuContext, _view: &wgpu::TextureView) {}

    fn set_analysis(&mut self, _analysis: &Arc<AnalysisTimeline>) {}

    fn set_tempo(&mut self, _bpm: f32) {}

    // Cue handlers must return immediately; a typical body bumps a decaying
    // pulse value consumed by the next update.
    fn on_beat(&mut self, _cue: &Cue) {}
    fn on_bar(&mut self, _cue: &Cue) {}
    fn on_tatum(&mut self, _cue: &Cue) {}
    fn on_section(&mut self, _cue: &Cue) {}
}
