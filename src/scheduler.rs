//! Maps an externally-driven playback position onto discrete analysis cues.
//!
//! The playback transport is only sampled, never controlled: positions may
//! repeat while paused, jump forward on skips, and jump backward on seeks.
//! [`CueScheduler`] turns that stream of positions into exactly-once cue
//! callbacks for each marker in the track's [`AnalysisTimeline`].
//!
//! Cursors are monotonic: [`CueScheduler::advance`] only ever moves them
//! forward. A backward position without an intervening [`CueScheduler::seek`]
//! or [`CueScheduler::reset`] fires nothing and is logged for diagnostics.

use std::sync::Arc;

use crate::analysis::{AnalysisTimeline, TimeInterval};

/// The four cue lanes, coarse to fine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CueKind {
    Section,
    Bar,
    Beat,
    Tatum,
}

/// Lane processing order within one `advance` call. Coarse cues are
/// delivered first so a section switch lands before that frame's pulses.
pub const CUE_LANES: [CueKind; 4] = [CueKind::Section, CueKind::Bar, CueKind::Beat, CueKind::Tatum];

impl CueKind {
    pub fn name(self) -> &'static str {
        match self {
            CueKind::Section => "section",
            CueKind::Bar => "bar",
            CueKind::Beat => "beat",
            CueKind::Tatum => "tatum",
        }
    }

    fn lane(self) -> usize {
        match self {
            CueKind::Section => 0,
            CueKind::Bar => 1,
            CueKind::Beat => 2,
            CueKind::Tatum => 3,
        }
    }
}

/// One fired cue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cue {
    pub kind: CueKind,

    /// Index of the marker within its lane.
    pub index: usize,

    /// Marker start in seconds.
    pub start: f32,

    /// Marker duration in seconds.
    pub duration: f32,
}

/// Receiver for fired cues. Handlers default to no-ops so implementors only
/// declare the lanes they react to; dispatch is always virtual, never a
/// runtime capability probe.
pub trait CueSink {
    fn on_section(&mut self, _cue: &Cue) {}
    fn on_bar(&mut self, _cue: &Cue) {}
    fn on_beat(&mut self, _cue: &Cue) {}
    fn on_tatum(&mut self, _cue: &Cue) {}
}

/// A sink that records fired cues in delivery order, for dispatching after
/// the scheduler pass completes (the engine fans the collected cues out to
/// the director and scenes before the frame's update/render).
#[derive(Debug, Default)]
pub struct CueCollector {
    pub cues: Vec<Cue>,
}

impl CueCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CueSink for CueCollector {
    fn on_section(&mut self, cue: &Cue) {
        self.cues.push(*cue);
    }

    fn on_bar(&mut self, cue: &Cue) {
        self.cues.push(*cue);
    }

    fn on_beat(&mut self, cue: &Cue) {
        self.cues.push(*cue);
    }

    fn on_tatum(&mut self, cue: &Cue) {
        self.cues.push(*cue);
    }
}

/// Per-track cue cursors over an immutable timeline.
///
/// Each cursor counts the markers of its lane already considered fired;
/// `0 <= cursor <= lane length` always holds. Cursors move backward only
/// through [`CueScheduler::reset`] (track change) or an explicit
/// [`CueScheduler::seek`].
pub struct CueScheduler {
    timeline: Arc<AnalysisTimeline>,
    cursors: [usize; 4],
    last_position_ms: u64,
}

impl CueScheduler {
    pub fn new(timeline: Arc<AnalysisTimeline>) -> Self {
        Self {
            timeline,
            cursors: [0; 4],
            last_position_ms: 0,
        }
    }

    /// Replace the timeline and rewind every cursor — the new-track path.
    pub fn reset(&mut self, timeline: Arc<AnalysisTimeline>) {
        self.timeline = timeline;
        self.cursors = [0; 4];
        self.last_position_ms = 0;
    }

    /// The position the scheduler last advanced to.
    pub fn last_position_ms(&self) -> u64 {
        self.last_position_ms
    }

    fn lane_markers(&self, kind: CueKind) -> &[TimeInterval] {
        match kind {
            CueKind::Section => &self.timeline.sections,
            CueKind::Bar => &self.timeline.bars,
            CueKind::Beat => &self.timeline.beats,
            CueKind::Tatum => &self.timeline.tatums,
        }
    }

    /// Reposition every cursor to the given playback position.
    ///
    /// Markers with `start <= position` are considered already passed, so a
    /// subsequent `advance` fires exactly the markers in `(position, new]`.
    /// This is the supported way to handle a backward jump within a track.
    pub fn seek(&mut self, position_ms: u64) {
        let pos = position_ms as f64;
        for kind in CUE_LANES {
            let markers = self.lane_markers(kind);
            self.cursors[kind.lane()] = markers.partition_point(|ev| ev.start_ms() <= pos);
        }
        self.last_position_ms = position_ms;
    }

    /// Deliver every cue in `(previous_ms, current_ms]` exactly once.
    ///
    /// Scans each lane forward from its cursor while markers start at or
    /// before `current_ms`; markers starting after `previous_ms` fire, and
    /// the cursor passes every scanned marker either way, so already-passed
    /// markers are never re-examined. Large forward jumps legitimately fire
    /// a burst of cues in one call. Returns the number of cues fired.
    ///
    /// A regressed position (`current_ms < previous_ms`) fires nothing and
    /// leaves the cursors untouched; callers that mean to go backward must
    /// use [`CueScheduler::seek`].
    pub fn advance(&mut self, previous_ms: u64, current_ms: u64, sink: &mut dyn CueSink) -> usize {
        if current_ms < previous_ms {
            log::warn!(
                "playback position regressed {previous_ms}ms -> {current_ms}ms without a seek; no cues fired"
            );
            return 0;
        }

        let prev = previous_ms as f64;
        let cur = current_ms as f64;
        let mut fired = 0;

        let timeline = Arc::clone(&self.timeline);
        for kind in CUE_LANES {
            let markers: &[TimeInterval] = match kind {
                CueKind::Section => &timeline.sections,
                CueKind::Bar => &timeline.bars,
                CueKind::Beat => &timeline.beats,
                CueKind::Tatum => &timeline.tatums,
            };
            let cursor = &mut self.cursors[kind.lane()];
            while *cursor < markers.len() {
                let marker = markers[*cursor];
                let start_ms = marker.start_ms();
                if start_ms > cur {
                    break;
                }
                if start_ms > prev {
                    let cue = Cue {
                        kind,
                        index: *cursor,
                        start: marker.start,
                        duration: marker.duration,
                    };
                    match kind {
                        CueKind::Section => sink.on_section(&cue),
                        CueKind::Bar => sink.on_bar(&cue),
                        CueKind::Beat => sink.on_beat(&cue),
                        CueKind::Tatum => sink.on_tatum(&cue),
                    }
                    fired += 1;
                }
                *cursor += 1;
            }
        }

        self.last_position_ms = current_ms;
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beats_timeline(starts_ms: &[u64]) -> Arc<AnalysisTimeline> {
        let mut timeline = AnalysisTimeline::default();
        timeline.beats = starts_ms
            .iter()
            .map(|&ms| TimeInterval::new(ms as f32 / 1000.0, 0.4))
            .collect();
        Arc::new(timeline)
    }

    fn full_timeline() -> Arc<AnalysisTimeline> {
        let mut timeline = AnalysisTimeline::default();
        timeline.sections = vec![TimeInterval::new(0.0, 10.0), TimeInterval::new(10.0, 10.0)];
        timeline.bars = (0..10).map(|i| TimeInterval::new(i as f32 * 2.0, 2.0)).collect();
        timeline.beats = (0..40).map(|i| TimeInterval::new(i as f32 * 0.5, 0.5)).collect();
        timeline.tatums = (0..80).map(|i| TimeInterval::new(i as f32 * 0.25, 0.25)).collect();
        Arc::new(timeline)
    }

    #[test]
    fn burst_on_skip_fires_every_beat_in_order() {
        let timeline = beats_timeline(&[500, 1500, 2500, 3500, 4500, 5500, 6500, 7500, 8500, 9500]);
        let mut scheduler = CueScheduler::new(timeline);
        let mut sink = CueCollector::new();

        let fired = scheduler.advance(0, 10_000, &mut sink);

        assert_eq!(fired, 10);
        assert_eq!(sink.cues.len(), 10);
        for (i, cue) in sink.cues.iter().enumerate() {
            assert_eq!(cue.kind, CueKind::Beat);
            assert_eq!(cue.index, i);
        }
        let starts: Vec<f32> = sink.cues.iter().map(|c| c.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(starts, sorted);
    }

    #[test]
    fn at_most_once_regardless_of_sampling_granularity() {
        let timeline = full_timeline();
        let mut scheduler = CueScheduler::new(Arc::clone(&timeline));
        let mut sink = CueCollector::new();

        // Awkward 37 ms steps, with a duplicate read at every step (paused).
        let mut prev = 0u64;
        let mut pos = 0u64;
        while pos < 20_500 {
            scheduler.advance(prev, pos, &mut sink);
            scheduler.advance(pos, pos, &mut sink);
            prev = pos;
            pos += 37;
        }

        let total = timeline.sections.len()
            + timeline.bars.len()
            + timeline.beats.len()
            + timeline.tatums.len();
        // Markers at exactly 0 ms never straddle a (prev, cur] window that
        // starts at zero, so they are consumed without firing.
        let at_zero = 1 + 1 + 1 + 1;
        assert_eq!(sink.cues.len(), total - at_zero);

        // Exactly once per marker.
        let mut seen = std::collections::HashSet::new();
        for cue in &sink.cues {
            assert!(seen.insert((cue.kind, cue.index)), "duplicate cue {cue:?}");
        }
    }

    #[test]
    fn order_preserved_within_each_lane() {
        let timeline = full_timeline();
        let mut scheduler = CueScheduler::new(timeline);
        let mut sink = CueCollector::new();
        let mut prev = 0u64;
        for pos in (0..=20_000).step_by(250) {
            scheduler.advance(prev, pos, &mut sink);
            prev = pos;
        }
        for kind in CUE_LANES {
            let lane: Vec<&Cue> = sink.cues.iter().filter(|c| c.kind == kind).collect();
            for pair in lane.windows(2) {
                assert!(pair[0].start <= pair[1].start);
                assert_eq!(pair[0].index + 1, pair[1].index);
            }
        }
    }

    #[test]
    fn equal_positions_fire_nothing() {
        let timeline = beats_timeline(&[500, 1500]);
        let mut scheduler = CueScheduler::new(timeline);
        let mut sink = CueCollector::new();
        scheduler.advance(0, 1000, &mut sink);
        assert_eq!(sink.cues.len(), 1);

        let fired = scheduler.advance(1000, 1000, &mut sink);
        assert_eq!(fired, 0);
        assert_eq!(sink.cues.len(), 1);
    }

    #[test]
    fn backward_position_without_seek_is_a_no_op() {
        let timeline = beats_timeline(&[500, 1500, 2500]);
        let mut scheduler = CueScheduler::new(timeline);
        let mut sink = CueCollector::new();
        scheduler.advance(0, 2000, &mut sink);
        assert_eq!(sink.cues.len(), 2);

        let fired = scheduler.advance(2000, 100, &mut sink);
        assert_eq!(fired, 0);
        assert_eq!(scheduler.last_position_ms(), 2000);

        // Forward progress afterwards still works from where we were.
        scheduler.advance(2000, 3000, &mut sink);
        assert_eq!(sink.cues.len(), 3);
    }

    #[test]
    fn reset_makes_the_scheduler_track_scoped() {
        let timeline = beats_timeline(&[500, 1500, 2500]);
        let mut scheduler = CueScheduler::new(Arc::clone(&timeline));
        let mut sink = CueCollector::new();
        scheduler.advance(0, 3000, &mut sink);
        assert_eq!(sink.cues.len(), 3);

        scheduler.reset(timeline);
        assert_eq!(scheduler.last_position_ms(), 0);

        let mut replay = CueCollector::new();
        scheduler.advance(0, 3000, &mut replay);
        assert_eq!(replay.cues.len(), 3);
    }

    #[test]
    fn seek_repositions_cursors_exactly() {
        let timeline = beats_timeline(&[500, 1500, 2500, 3500]);
        let mut scheduler = CueScheduler::new(timeline);
        let mut sink = CueCollector::new();
        scheduler.advance(0, 4000, &mut sink);
        assert_eq!(sink.cues.len(), 4);

        // Backward seek re-arms the passed markers after the seek point.
        scheduler.seek(1000);
        assert_eq!(scheduler.last_position_ms(), 1000);
        let mut after = CueCollector::new();
        scheduler.advance(1000, 4000, &mut after);
        let indices: Vec<usize> = after.cues.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);

        // A marker exactly at the seek position counts as already passed.
        scheduler.seek(1500);
        let mut boundary = CueCollector::new();
        scheduler.advance(1500, 4000, &mut boundary);
        let indices: Vec<usize> = boundary.cues.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![2, 3]);

        // Forward seek skips silently without firing.
        scheduler.seek(3600);
        let mut tail = CueCollector::new();
        assert_eq!(scheduler.advance(3600, 10_000, &mut tail), 0);
    }

    #[test]
    fn lanes_advance_independently() {
        let timeline = full_timeline();
        let mut scheduler = CueScheduler::new(timeline);
        let mut sink = CueCollector::new();
        scheduler.advance(0, 2000, &mut sink);

        let count = |kind: CueKind| sink.cues.iter().filter(|c| c.kind == kind).count();
        // Markers at 0 are consumed silently; the rest in (0, 2000] fire.
        assert_eq!(count(CueKind::Section), 0);
        assert_eq!(count(CueKind::Bar), 1);
        assert_eq!(count(CueKind::Beat), 4);
        assert_eq!(count(CueKind::Tatum), 8);
    }
}
