//! Engine wiring: one explicit instance owning the whole pipeline.
//!
//! Per frame, in strict order: scheduler advance, cue dispatch (director and
//! scenes), per-scene simulation and render, combine pass, post-processing.
//! Cues collected for a frame are fully applied before that frame's scene
//! updates, so a beat's visual reaction lands in the same frame the beat is
//! detected. Nothing in the frame path blocks on I/O; analysis and artwork
//! arrive out-of-band through the `deliver_*` methods, which drop results
//! for tracks that are no longer current.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisTimeline;
use crate::compositor::{select_active, CompositeMode, LayerCompositor};
use crate::director::Director;
use crate::gpu::context::{GpuContext, TARGET_FORMAT};
use crate::gpu::post_processor::PostProcessor;
use crate::palette::Palette;
use crate::postfx::{PostFxChain, PostFxParams, PostFxUpdate};
use crate::scene::{FrameInputs, SceneInputs};
use crate::scenes;
use crate::scheduler::{CueCollector, CueKind, CueScheduler};

/// Output resolution scale clamp range.
const MIN_SCALE: f32 = 0.5;
const MAX_SCALE: f32 = 1.0;

/// Engine construction parameters.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub mode: CompositeMode,
    pub dwell_gating: bool,
    pub postfx: PostFxParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            scale: 1.0,
            mode: CompositeMode::Director,
            dwell_gating: false,
            postfx: PostFxParams::default(),
        }
    }
}

/// Serializable snapshot of the tunable state, persisted by a collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub mode: CompositeMode,
    pub active_scenes: Vec<String>,
    pub postfx: PostFxParams,
    pub scale: f32,
}

/// A late async result is stale when its track is no longer the current one.
fn is_stale(current: Option<&str>, delivered: &str) -> bool {
    current != Some(delivered)
}

pub struct Engine {
    gpu: GpuContext,
    compositor: LayerCompositor,
    post: PostProcessor,
    chain: PostFxChain,
    scheduler: CueScheduler,
    director: Director,
    mode: CompositeMode,

    palette: Arc<Palette>,
    analysis: Arc<AnalysisTimeline>,
    track_id: Option<String>,
    // Kept alive while scenes reference its view.
    album_texture: Option<(wgpu::Texture, wgpu::TextureView)>,

    base_width: u32,
    base_height: u32,
    scale: f32,

    elapsed: f32,
    bloom_pulse: f32,
}

impl Engine {
    /// Build the engine around an injected GPU context and register the
    /// reference scenes. A scene that fails to construct is excluded and the
    /// rest of the pipeline proceeds.
    pub fn new(gpu: GpuContext, config: EngineConfig) -> Self {
        let scale = config.scale.clamp(MIN_SCALE, MAX_SCALE);
        let width = scaled_dimension(config.width, scale);
        let height = scaled_dimension(config.height, scale);

        let palette = Arc::new(Palette::default());
        let mut compositor = LayerCompositor::new(&gpu, width, height);
        register_reference_scenes(&mut compositor, &gpu, palette.as_ref());

        let mut director = Director::new(compositor.scene_ids());
        director.set_dwell_gating(config.dwell_gating);

        let post = PostProcessor::new(&gpu, TARGET_FORMAT, width, height, &config.postfx);

        Self {
            compositor,
            post,
            chain: PostFxChain::new(config.postfx),
            scheduler: CueScheduler::new(Arc::new(AnalysisTimeline::default())),
            director,
            mode: config.mode,
            palette,
            analysis: Arc::new(AnalysisTimeline::default()),
            track_id: None,
            album_texture: None,
            base_width: config.width,
            base_height: config.height,
            scale,
            elapsed: 0.0,
            bloom_pulse: 0.0,
            gpu,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Current output dimensions after the resolution scale.
    pub fn output_size(&self) -> (u32, u32) {
        (
            scaled_dimension(self.base_width, self.scale),
            scaled_dimension(self.base_height, self.scale),
        )
    }

    /// Mark a new current track. In-flight fetches for earlier tracks become
    /// stale and will be discarded on delivery.
    pub fn begin_track(&mut self, track_id: &str) {
        log::info!("track changed: {track_id}");
        self.track_id = Some(track_id.to_string());
    }

    /// Deliver a fetched analysis. Swaps the timeline, resets the scheduler
    /// cursors and retunes the director atomically; returns whether the
    /// result was admitted.
    pub fn deliver_analysis(&mut self, track_id: &str, timeline: AnalysisTimeline) -> bool {
        if is_stale(self.track_id.as_deref(), track_id) {
            log::debug!("discarding stale analysis for {track_id}");
            return false;
        }
        let tempo = timeline.tempo();
        let timeline = Arc::new(timeline);

        self.analysis = Arc::clone(&timeline);
        self.scheduler.reset(Arc::clone(&timeline));
        self.director.retune(tempo);
        self.compositor.for_each_scene(|scene| {
            scene.set_analysis(&timeline);
            scene.set_tempo(tempo);
        });
        log::info!(
            "analysis ready: tempo {tempo:.1} bpm, dwell {} bars",
            self.director.min_dwell_bars()
        );
        true
    }

    /// Deliver decoded cover art and its extracted palette together.
    /// Returns whether the result was admitted.
    pub fn deliver_artwork(
        &mut self,
        track_id: &str,
        image: &image::RgbaImage,
        palette: Palette,
    ) -> bool {
        if is_stale(self.track_id.as_deref(), track_id) {
            log::debug!("discarding stale artwork for {track_id}");
            return false;
        }
        let (texture, view) = self.gpu.create_image_texture("Album Art", image);
        let palette = Arc::new(palette);
        let gpu = &self.gpu;
        self.compositor.for_each_scene(|scene| {
            scene.set_album_texture(gpu, &view);
            scene.set_palette(&palette);
        });
        self.album_texture = Some((texture, view));
        self.palette = palette;
        true
    }

    pub fn set_mode(&mut self, mode: CompositeMode) {
        log::info!("composite mode: {mode}");
        self.mode = mode;
    }

    pub fn mode(&self) -> &CompositeMode {
        &self.mode
    }

    /// Merge a partial post-processing update; the chain rebuild (if the
    /// parameters settle on one) happens at a later frame boundary.
    pub fn tune_postfx(&mut self, update: &PostFxUpdate) {
        self.chain.tune(update, self.elapsed_ms());
    }

    /// Reposition the cue cursors for an externally detected seek.
    pub fn seek(&mut self, position_ms: u64) {
        self.scheduler.seek(position_ms);
    }

    /// Clamp and apply an output resolution scale, resizing every target.
    pub fn set_render_scale(&mut self, scale: f32) {
        let scale = scale.clamp(MIN_SCALE, MAX_SCALE);
        if (scale - self.scale).abs() < f32::EPSILON {
            return;
        }
        self.scale = scale;
        let (width, height) = self.output_size();
        self.compositor.resize(&self.gpu, width, height);
        self.post.resize(&self.gpu, width, height);
        log::info!("render scale {scale:.2} -> {width}x{height}");
    }

    pub fn render_scale(&self) -> f32 {
        self.scale
    }

    /// Human-readable description of the active layer set.
    pub fn describe_stack(&self) -> String {
        self.compositor.describe(&self.mode, &self.director)
    }

    /// Snapshot the tunable state for persistence.
    pub fn preset(&self) -> Preset {
        Preset {
            mode: self.mode.clone(),
            active_scenes: select_active(&self.mode, &self.compositor.scene_ids(), &self.director),
            postfx: *self.chain.params(),
            scale: self.scale,
        }
    }

    /// Restore a persisted preset.
    pub fn apply_preset(&mut self, preset: &Preset) {
        self.set_mode(preset.mode.clone());
        self.tune_postfx(&PostFxUpdate {
            bloom: Some(preset.postfx.bloom),
            vignette: Some(preset.postfx.vignette),
            grain: Some(preset.postfx.grain),
            chromatic_aberration: Some(preset.postfx.chromatic_aberration),
            depth_of_field: Some(preset.postfx.depth_of_field),
        });
        self.set_render_scale(preset.scale);
    }

    fn elapsed_ms(&self) -> u64 {
        (self.elapsed as f64 * 1000.0) as u64
    }

    /// Render one frame for the given playback position into `output`.
    pub fn render_frame(&mut self, position_ms: u64, dt: f32, output: &wgpu::TextureView) {
        self.elapsed += dt;
        self.bloom_pulse = (self.bloom_pulse - dt * 1.5).max(0.0);

        // (a) Scheduler advance: collect this frame's due cues.
        let previous_ms = self.scheduler.last_position_ms();
        let mut collector = CueCollector::new();
        self.scheduler.advance(previous_ms, position_ms, &mut collector);

        // (b) Cue dispatch, before any scene updates.
        for cue in &collector.cues {
            match cue.kind {
                CueKind::Section => {
                    if matches!(self.mode, CompositeMode::Director) && self.director.on_section() {
                        log::debug!("{}", self.describe_stack());
                    }
                }
                CueKind::Bar => self.director.on_bar(),
                CueKind::Beat => {
                    // Composite-level pulse: bloom leans toward 1.2x its base.
                    self.bloom_pulse = (self.bloom_pulse + 0.3).min(1.0);
                }
                CueKind::Tatum => {}
            }
            self.compositor.dispatch_cue(cue);
        }

        // Debounced post-chain rebuild, outside the per-pass hot path.
        if self.chain.take_rebuild(self.elapsed_ms()) {
            self.post.rebuild(&self.gpu, self.chain.params());
        }

        // (c)-(e) Scene simulation + render, combine, post-processing.
        let inputs = FrameInputs {
            position_ms,
            intensity: self.analysis.intensity_at(position_ms),
            palette: self.palette.as_ref(),
        };
        let active = select_active(&self.mode, &self.compositor.scene_ids(), &self.director);

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.compositor.render_frame(
            &self.gpu,
            &mut encoder,
            dt,
            self.elapsed,
            &inputs,
            &active,
            self.post.scene_view(),
        );

        let params = *self.chain.params();
        let effective_bloom = params.bloom * (1.0 + 0.2 * self.bloom_pulse);
        self.post
            .process(&self.gpu, &mut encoder, output, &params, effective_bloom, self.elapsed);

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn scaled_dimension(base: u32, scale: f32) -> u32 {
    ((base as f32 * scale).floor() as u32).max(1)
}

fn register_reference_scenes(
    compositor: &mut LayerCompositor,
    gpu: &GpuContext,
    palette: &Palette,
) {
    let inputs = SceneInputs {
        palette,
        tempo: crate::analysis::DEFAULT_TEMPO,
        album_texture: None,
    };

    compositor.register(gpu, |gpu, w, h| {
        Ok(Box::new(scenes::AuroraScene::new(gpu, w, h, &inputs)?))
    });
    compositor.register(gpu, |gpu, w, h| {
        Ok(Box::new(scenes::FlowfieldScene::new(gpu, w, h, &inputs)?))
    });
    compositor.register(gpu, |gpu, w, h| {
        Ok(Box::new(scenes::KaleidoscopeScene::new(gpu, w, h, &inputs)?))
    });
    compositor.register(gpu, |gpu, w, h| {
        Ok(Box::new(scenes::TunnelScene::new(gpu, w, h, &inputs)?))
    });
    compositor.register(gpu, |gpu, w, h| {
        Ok(Box::new(scenes::RibbonsScene::new(gpu, w, h, &inputs)?))
    });
    compositor.register(gpu, |gpu, w, h| {
        Ok(Box::new(scenes::VoronoiScene::new(gpu, w, h, &inputs)?))
    });
    compositor.register(gpu, |gpu, w, h| {
        Ok(Box::new(scenes::CoversScene::new(gpu, w, h, &inputs)?))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_results_are_rejected() {
        assert!(is_stale(None, "track-a"));
        assert!(is_stale(Some("track-b"), "track-a"));
        assert!(!is_stale(Some("track-a"), "track-a"));
    }

    #[test]
    fn preset_roundtrips_through_json() {
        let preset = Preset {
            mode: CompositeMode::Solo("tunnel".to_string()),
            active_scenes: vec!["tunnel".to_string()],
            postfx: PostFxParams::default(),
            scale: 0.75,
        };
        let json = serde_json::to_string(&preset).unwrap();
        let back: Preset = serde_json::from_str(&json).unwrap();
        assert_eq!(preset, back);
    }

    #[test]
    fn scaled_dimension_clamps_to_one() {
        assert_eq!(scaled_dimension(1280, 0.5), 640);
        assert_eq!(scaled_dimension(1, 0.5), 1);
        assert_eq!(scaled_dimension(1279, 0.5), 639);
    }
}
