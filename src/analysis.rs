//! Music analysis timeline for a single track.
//!
//! An [`AnalysisTimeline`] holds the pre-computed structure markers for one
//! track: sections, bars, beats and tatums, plus the fine-grained loudness
//! segments used for intensity estimation. It is built once when a track's
//! analysis arrives, replaced wholesale on track change, and read-only
//! afterwards (shared as `Arc<AnalysisTimeline>`).

use serde::Deserialize;

/// Nominal loudness floor in dB. Segment `loudness_max` values are mapped
/// from `[LOUDNESS_FLOOR_DB, 0]` onto `[0, 1]`.
const LOUDNESS_FLOOR_DB: f32 = -60.0;

/// Intensity reported when no segments cover the queried position.
const FALLBACK_INTENSITY: f32 = 0.3;

/// Tempo assumed until a track's analysis arrives.
pub const DEFAULT_TEMPO: f32 = 120.0;

fn default_tempo() -> f32 {
    DEFAULT_TEMPO
}

fn default_loudness() -> f32 {
    -20.0
}

/// One time marker in an analysis sequence (section, bar, beat, or tatum).
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct TimeInterval {
    /// Start in seconds from track start.
    pub start: f32,

    /// Duration in seconds.
    #[serde(default)]
    pub duration: f32,
}

impl TimeInterval {
    pub fn new(start: f32, duration: f32) -> Self {
        Self { start, duration }
    }

    /// Start time in milliseconds, as an f64 so exact-boundary comparisons
    /// against integer playback positions are lossless.
    pub fn start_ms(&self) -> f64 {
        self.start as f64 * 1000.0
    }
}

/// A fine-grained loudness segment.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Segment {
    /// Start in seconds from track start.
    pub start: f32,

    /// Duration in seconds.
    #[serde(default)]
    pub duration: f32,

    /// Peak loudness within the segment, in dB (typically -60..0).
    #[serde(default = "default_loudness")]
    pub loudness_max: f32,
}

/// Track-level analysis fields.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct TrackInfo {
    /// Overall tempo in beats per minute.
    #[serde(default = "default_tempo")]
    pub tempo: f32,

    /// Track duration in seconds.
    #[serde(default)]
    pub duration: f32,
}

impl Default for TrackInfo {
    fn default() -> Self {
        Self {
            tempo: default_tempo(),
            duration: 0.0,
        }
    }
}

/// The immutable analysis structure for one track.
///
/// Invariant: every sequence is sorted ascending by start time. The four
/// marker sequences are independent of each other (beats are not an index
/// into bars).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AnalysisTimeline {
    #[serde(default)]
    pub sections: Vec<TimeInterval>,

    #[serde(default)]
    pub bars: Vec<TimeInterval>,

    #[serde(default)]
    pub beats: Vec<TimeInterval>,

    #[serde(default)]
    pub tatums: Vec<TimeInterval>,

    #[serde(default)]
    pub segments: Vec<Segment>,

    #[serde(default)]
    pub track: TrackInfo,
}

impl AnalysisTimeline {
    /// Parse a timeline from the analysis endpoint's JSON wire shape
    /// (top-level `sections`/`bars`/`beats`/`tatums`/`segments` arrays and a
    /// `track.tempo` field). Sequences are re-sorted defensively so the
    /// ascending-start invariant holds even for malformed input.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut timeline: Self = serde_json::from_str(json)?;
        timeline.normalize();
        Ok(timeline)
    }

    fn normalize(&mut self) {
        let by_start = |a: &TimeInterval, b: &TimeInterval| {
            a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal)
        };
        self.sections.sort_by(by_start);
        self.bars.sort_by(by_start);
        self.beats.sort_by(by_start);
        self.tatums.sort_by(by_start);
        self.segments.sort_by(|a, b| {
            a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Overall tempo in BPM.
    pub fn tempo(&self) -> f32 {
        self.track.tempo
    }

    /// Track duration in milliseconds, derived from the track field or, when
    /// absent, from the last marker in any sequence.
    pub fn duration_ms(&self) -> u64 {
        if self.track.duration > 0.0 {
            return (self.track.duration as f64 * 1000.0) as u64;
        }
        let last = |seq: &[TimeInterval]| {
            seq.last()
                .map(|ev| ev.start + ev.duration)
                .unwrap_or(0.0)
        };
        let end = last(&self.sections)
            .max(last(&self.bars))
            .max(last(&self.beats))
            .max(last(&self.tatums));
        (end as f64 * 1000.0) as u64
    }

    /// Whether the timeline carries any markers at all.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
            && self.bars.is_empty()
            && self.beats.is_empty()
            && self.tatums.is_empty()
    }

    /// Approximate playback energy at a position, in `[0, 1]`.
    ///
    /// Looks up the loudness segment covering the position (binary search on
    /// start times) and maps its `loudness_max` from the nominal dB range
    /// onto `[0, 1]`. Positions past the last segment use the last segment;
    /// an empty segment list yields a neutral fallback.
    pub fn intensity_at(&self, position_ms: u64) -> f32 {
        if self.segments.is_empty() {
            return FALLBACK_INTENSITY;
        }
        let t = position_ms as f64 / 1000.0;
        let idx = self.segments.partition_point(|seg| (seg.start as f64) <= t);
        let seg = if idx == 0 {
            &self.segments[0]
        } else {
            &self.segments[idx - 1]
        };
        ((seg.loudness_max - LOUDNESS_FLOOR_DB) / -LOUDNESS_FLOOR_DB).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_json() -> &'static str {
        r#"{
            "sections": [
                { "start": 0.0, "duration": 12.5, "confidence": 1.0 },
                { "start": 12.5, "duration": 20.0 }
            ],
            "bars": [
                { "start": 0.5, "duration": 2.0 },
                { "start": 2.5, "duration": 2.0 }
            ],
            "beats": [
                { "start": 0.5, "duration": 0.5 },
                { "start": 1.0, "duration": 0.5 }
            ],
            "tatums": [
                { "start": 0.5, "duration": 0.25 }
            ],
            "segments": [
                { "start": 0.0, "duration": 1.0, "loudness_max": -30.0 },
                { "start": 1.0, "duration": 1.0, "loudness_max": 0.0 }
            ],
            "track": { "tempo": 128.0, "duration": 32.5 }
        }"#
    }

    #[test]
    fn deserializes_wire_shape() {
        let timeline = AnalysisTimeline::from_json(wire_json()).unwrap();
        assert_eq!(timeline.sections.len(), 2);
        assert_eq!(timeline.bars.len(), 2);
        assert_eq!(timeline.beats.len(), 2);
        assert_eq!(timeline.tatums.len(), 1);
        assert!((timeline.tempo() - 128.0).abs() < 0.001);
        assert_eq!(timeline.duration_ms(), 32_500);
    }

    #[test]
    fn missing_fields_default() {
        let timeline = AnalysisTimeline::from_json(r#"{ "beats": [{ "start": 1.0 }] }"#).unwrap();
        assert_eq!(timeline.beats.len(), 1);
        assert!((timeline.tempo() - 120.0).abs() < 0.001);
        assert!(timeline.sections.is_empty());
    }

    #[test]
    fn normalizes_out_of_order_markers() {
        let json = r#"{ "beats": [
            { "start": 2.0, "duration": 0.5 },
            { "start": 0.5, "duration": 0.5 },
            { "start": 1.0, "duration": 0.5 }
        ] }"#;
        let timeline = AnalysisTimeline::from_json(json).unwrap();
        let starts: Vec<f32> = timeline.beats.iter().map(|b| b.start).collect();
        assert_eq!(starts, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn intensity_maps_loudness_range() {
        let timeline = AnalysisTimeline::from_json(wire_json()).unwrap();
        // -30 dB is halfway up the [-60, 0] range.
        assert!((timeline.intensity_at(500) - 0.5).abs() < 0.001);
        // 0 dB clamps to full intensity.
        assert!((timeline.intensity_at(1500) - 1.0).abs() < 0.001);
        // Past the end: last segment applies.
        assert!((timeline.intensity_at(10_000) - 1.0).abs() < 0.001);
    }

    #[test]
    fn intensity_falls_back_without_segments() {
        let timeline = AnalysisTimeline::default();
        assert!((timeline.intensity_at(0) - FALLBACK_INTENSITY).abs() < 0.001);
    }

    #[test]
    fn duration_falls_back_to_last_marker() {
        let json = r#"{ "beats": [{ "start": 10.0, "duration": 0.5 }] }"#;
        let timeline = AnalysisTimeline::from_json(json).unwrap();
        assert_eq!(timeline.duration_ms(), 10_500);
    }
}
