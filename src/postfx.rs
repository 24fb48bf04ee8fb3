//! CPU-side post-processing model: tunable parameters and the debounced
//! chain-rebuild request.
//!
//! Rebuilding the GPU pass chain is comparatively expensive, so parameter
//! mutations never rebuild directly. [`PostFxChain::tune`] merges a partial
//! update and marks the chain dirty; [`PostFxChain::take_rebuild`] reports
//! `true` once a quiet interval has passed, coalescing a burst of UI tweaks
//! into a single rebuild at a frame boundary.

use serde::{Deserialize, Serialize};

/// Quiet interval before a pending rebuild is executed.
pub const REBUILD_DEBOUNCE_MS: u64 = 150;

/// Tunable post-processing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostFxParams {
    pub bloom: f32,
    pub vignette: f32,
    pub grain: f32,
    pub chromatic_aberration: f32,
    /// Zero disables the optional depth-of-field pass entirely.
    pub depth_of_field: f32,
}

impl Default for PostFxParams {
    fn default() -> Self {
        Self {
            bloom: 1.2,
            vignette: 0.35,
            grain: 0.05,
            chromatic_aberration: 0.003,
            depth_of_field: 0.0,
        }
    }
}

/// A partial parameter update: present fields overwrite, absent fields are
/// left untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostFxUpdate {
    pub bloom: Option<f32>,
    pub vignette: Option<f32>,
    pub grain: Option<f32>,
    pub chromatic_aberration: Option<f32>,
    pub depth_of_field: Option<f32>,
}

impl PostFxParams {
    /// Merge a partial update, returning whether anything changed.
    pub fn apply(&mut self, update: &PostFxUpdate) -> bool {
        let before = *self;
        if let Some(bloom) = update.bloom {
            self.bloom = bloom;
        }
        if let Some(vignette) = update.vignette {
            self.vignette = vignette;
        }
        if let Some(grain) = update.grain {
            self.grain = grain;
        }
        if let Some(chroma) = update.chromatic_aberration {
            self.chromatic_aberration = chroma;
        }
        if let Some(dof) = update.depth_of_field {
            self.depth_of_field = dof;
        }
        *self != before
    }
}

/// Parameter store plus the coalesced rebuild request.
///
/// Time is injected by the caller (the engine's elapsed clock) so the model
/// stays deterministic and testable.
pub struct PostFxChain {
    params: PostFxParams,
    dirty: bool,
    last_tune_ms: u64,
    rebuild_count: u64,
}

impl PostFxChain {
    pub fn new(params: PostFxParams) -> Self {
        Self {
            params,
            dirty: false,
            last_tune_ms: 0,
            rebuild_count: 0,
        }
    }

    pub fn params(&self) -> &PostFxParams {
        &self.params
    }

    /// Merge a partial parameter update. No-op updates do not mark the chain
    /// dirty, so redundant tune calls never schedule a rebuild.
    pub fn tune(&mut self, update: &PostFxUpdate, now_ms: u64) {
        if self.params.apply(update) {
            self.dirty = true;
            self.last_tune_ms = now_ms;
        }
    }

    /// Whether the GPU chain must be rebuilt this frame. Returns `true` at
    /// most once per quiet interval; rapid tune bursts keep pushing the
    /// rebuild back until the parameters settle.
    pub fn take_rebuild(&mut self, now_ms: u64) -> bool {
        if self.dirty && now_ms.saturating_sub(self.last_tune_ms) >= REBUILD_DEBOUNCE_MS {
            self.dirty = false;
            self.rebuild_count += 1;
            return true;
        }
        false
    }

    /// Number of rebuilds performed so far (diagnostics).
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_touches_only_present_fields() {
        let mut params = PostFxParams::default();
        let changed = params.apply(&PostFxUpdate {
            grain: Some(0.2),
            ..Default::default()
        });
        assert!(changed);
        assert!((params.grain - 0.2).abs() < 1e-6);
        assert!((params.bloom - 1.2).abs() < 1e-6);
        assert!((params.vignette - 0.35).abs() < 1e-6);
        assert!((params.chromatic_aberration - 0.003).abs() < 1e-6);
    }

    #[test]
    fn noop_update_reports_unchanged() {
        let mut params = PostFxParams::default();
        assert!(!params.apply(&PostFxUpdate::default()));
        assert!(!params.apply(&PostFxUpdate {
            bloom: Some(params.bloom),
            ..Default::default()
        }));
    }

    #[test]
    fn rebuild_waits_for_the_quiet_interval() {
        let mut chain = PostFxChain::new(PostFxParams::default());
        chain.tune(
            &PostFxUpdate {
                bloom: Some(2.0),
                ..Default::default()
            },
            1000,
        );

        assert!(!chain.take_rebuild(1000));
        assert!(!chain.take_rebuild(1000 + REBUILD_DEBOUNCE_MS - 1));
        assert!(chain.take_rebuild(1000 + REBUILD_DEBOUNCE_MS));
        // Consumed: no further rebuild until the next tune.
        assert!(!chain.take_rebuild(10_000));
        assert_eq!(chain.rebuild_count(), 1);
    }

    #[test]
    fn rapid_tunes_coalesce_into_one_rebuild() {
        let mut chain = PostFxChain::new(PostFxParams::default());
        for i in 0..10 {
            chain.tune(
                &PostFxUpdate {
                    grain: Some(0.01 * i as f32 + 0.1),
                    ..Default::default()
                },
                1000 + i * 20,
            );
            assert!(!chain.take_rebuild(1000 + i * 20 + 10));
        }
        let settled = 1000 + 9 * 20 + REBUILD_DEBOUNCE_MS;
        assert!(chain.take_rebuild(settled));
        assert_eq!(chain.rebuild_count(), 1);
        assert!((chain.params().grain - 0.19).abs() < 1e-6);
    }

    #[test]
    fn redundant_tune_does_not_schedule_a_rebuild() {
        let mut chain = PostFxChain::new(PostFxParams::default());
        chain.tune(&PostFxUpdate::default(), 500);
        assert!(!chain.take_rebuild(500 + REBUILD_DEBOUNCE_MS));
    }

    #[test]
    fn params_serialize_roundtrip() {
        let params = PostFxParams {
            bloom: 1.5,
            vignette: 0.2,
            grain: 0.1,
            chromatic_aberration: 0.01,
            depth_of_field: 0.4,
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: PostFxParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }

    #[test]
    fn update_deserializes_partial_json() {
        let update: PostFxUpdate = serde_json::from_str(r#"{ "vignette": 0.5 }"#).unwrap();
        assert_eq!(update.vignette, Some(0.5));
        assert_eq!(update.bloom, None);
    }
}
