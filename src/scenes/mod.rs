//! Reference scene implementations.
//!
//! Each scene is a full-screen shader pass with a small amount of CPU-side
//! simulation state (pulse decays, ripple lists, sprite positions). They all
//! render through [`fullscreen::FullscreenPass`] and react to cues by nudging
//! decaying values, never by blocking work.

pub mod fullscreen;

pub mod aurora;
pub mod covers;
pub mod flowfield;
pub mod kaleidoscope;
pub mod ribbons;
pub mod tunnel;
pub mod voronoi;

pub use aurora::AuroraScene;
pub use covers::CoversScene;
pub use flowfield::FlowfieldScene;
pub use kaleidoscope::KaleidoscopeScene;
pub use ribbons::RibbonsScene;
pub use tunnel::TunnelScene;
pub use voronoi::VoronoiScene;

/// Deterministic hash of an integer onto `[0, 1)`. Cue-driven randomness
/// (ripple positions, beat pops) derives from marker indices through this so
/// a frame stays a pure function of the resource snapshot and elapsed time.
pub(crate) fn hash01(n: u32) -> f32 {
    let mut x = n.wrapping_mul(0x9E37_79B9).wrapping_add(0x85EB_CA6B);
    x ^= x >> 16;
    x = x.wrapping_mul(0x7FEB_352D);
    x ^= x >> 15;
    (x >> 8) as f32 / (1u32 << 24) as f32
}

/// Frame-rate independent approach factor for exponential smoothing.
pub(crate) fn approach(dt: f32, rate: f32) -> f32 {
    1.0 - (-dt * rate).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash01_stays_in_range_and_varies() {
        let values: Vec<f32> = (0..64).map(hash01).collect();
        for v in &values {
            assert!((0.0..1.0).contains(v));
        }
        let distinct: std::collections::HashSet<u32> =
            values.iter().map(|v| (v * 1e6) as u32).collect();
        assert!(distinct.len() > 60);
    }

    #[test]
    fn approach_is_monotonic_in_dt() {
        assert!(approach(0.0, 3.0) < approach(0.016, 3.0));
        assert!(approach(0.016, 3.0) < approach(0.5, 3.0));
        assert!(approach(10.0, 3.0) <= 1.0);
    }
}
