//! Playback transport boundary.
//!
//! The real transport (player SDK, IPC, whatever hosts the engine) lives
//! outside this crate; the engine only consumes one position sample per
//! frame. [`SimulatedTransport`] is the deterministic source the offline
//! renderer drives frames with.

/// One sample of the external playback transport.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackFrame {
    /// Currently playing track, if any.
    pub track_id: Option<String>,

    /// Playback position in milliseconds. May repeat (paused) or jump
    /// (seek / track change).
    pub position_ms: u64,

    pub paused: bool,
}

/// Per-frame position provider injected into the render loop.
pub trait PositionSource {
    fn sample(&mut self) -> PlaybackFrame;
}

/// Fixed-rate playback simulation for offline rendering. Positions are
/// derived from a frame counter so long renders accumulate no drift.
pub struct SimulatedTransport {
    track_id: String,
    start_ms: u64,
    step_ms: f64,
    frame: u64,
    paused: bool,
}

impl SimulatedTransport {
    pub fn new(track_id: impl Into<String>, start_ms: u64, fps: f32) -> Self {
        Self {
            track_id: track_id.into(),
            start_ms,
            step_ms: 1000.0 / fps.max(1.0) as f64,
            frame: 0,
            paused: false,
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}

impl PositionSource for SimulatedTransport {
    fn sample(&mut self) -> PlaybackFrame {
        let position_ms = self.start_ms + (self.frame as f64 * self.step_ms) as u64;
        if !self.paused {
            self.frame += 1;
        }
        PlaybackFrame {
            track_id: Some(self.track_id.clone()),
            position_ms,
            paused: self.paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_at_the_frame_rate() {
        let mut transport = SimulatedTransport::new("track-1", 500, 50.0);
        assert_eq!(transport.sample().position_ms, 500);
        assert_eq!(transport.sample().position_ms, 520);
        assert_eq!(transport.sample().position_ms, 540);
    }

    #[test]
    fn no_drift_over_many_frames() {
        let mut transport = SimulatedTransport::new("track-1", 0, 60.0);
        let mut last = 0;
        for _ in 0..=600 {
            last = transport.sample().position_ms;
        }
        // 600 frames at 60 fps is exactly ten seconds.
        assert_eq!(last, 10_000);
    }

    #[test]
    fn paused_transport_repeats_the_position() {
        let mut transport = SimulatedTransport::new("track-1", 100, 50.0);
        transport.sample();
        transport.set_paused(true);
        assert_eq!(transport.sample().position_ms, 120);
        assert_eq!(transport.sample().position_ms, 120);
        assert!(transport.sample().paused);
    }
}
