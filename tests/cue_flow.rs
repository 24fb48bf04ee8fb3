//! End-to-end cue flow without a GPU: analysis JSON in the wire shape drives
//! the scheduler, the scheduler drives the director, and seeks / track
//! changes behave like the live player path.

use std::sync::Arc;

use pulsestage::analysis::AnalysisTimeline;
use pulsestage::director::Director;
use pulsestage::scheduler::{Cue, CueCollector, CueKind, CueScheduler, CueSink};
use pulsestage::transport::{PositionSource, SimulatedTransport};

/// 24 seconds of regular structure: sections every 8s, bars every 2s, beats
/// every 500ms, tatums every 250ms.
fn analysis_json() -> String {
    let mut sections = Vec::new();
    for i in 0..3 {
        sections.push(format!(
            r#"{{ "start": {}.0, "duration": 8.0 }}"#,
            i * 8
        ));
    }
    let markers = |count: usize, step_ms: usize| {
        (0..count)
            .map(|i| {
                format!(
                    r#"{{ "start": {:.3}, "duration": {:.3} }}"#,
                    (i * step_ms) as f64 / 1000.0,
                    step_ms as f64 / 1000.0
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        r#"{{
            "sections": [{}],
            "bars": [{}],
            "beats": [{}],
            "tatums": [{}],
            "segments": [{{ "start": 0.0, "duration": 24.0, "loudness_max": -12.0 }}],
            "track": {{ "tempo": 120.0, "duration": 24.0 }}
        }}"#,
        sections.join(","),
        markers(12, 2000),
        markers(48, 500),
        markers(96, 250)
    )
}

/// Sink that mirrors the engine's cue fan-out to the director.
struct DirectorSink<'a> {
    director: &'a mut Director,
    switches: usize,
    beats: usize,
}

impl CueSink for DirectorSink<'_> {
    fn on_section(&mut self, _cue: &Cue) {
        if self.director.on_section() {
            self.switches += 1;
        }
    }

    fn on_bar(&mut self, _cue: &Cue) {
        self.director.on_bar();
    }

    fn on_beat(&mut self, _cue: &Cue) {
        self.beats += 1;
    }
}

#[test]
fn playback_sweep_drives_scheduler_and_director() {
    let timeline = AnalysisTimeline::from_json(&analysis_json()).unwrap();
    assert_eq!(timeline.duration_ms(), 24_000);

    let mut scheduler = CueScheduler::new(Arc::new(timeline));
    let mut director = Director::new(
        ["a", "b", "c", "d", "e", "f", "g"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    director.retune(120.0);
    let starting_pair = director.active().to_vec();

    let mut sink = DirectorSink {
        director: &mut director,
        switches: 0,
        beats: 0,
    };

    // 20 seconds of 60 fps playback.
    let mut transport = SimulatedTransport::new("track-1", 0, 60.0);
    for _ in 0..(20 * 60) {
        let frame = transport.sample();
        let prev = scheduler.last_position_ms();
        scheduler.advance(prev, frame.position_ms, &mut sink);
    }

    // Sections at 8s and 16s passed; the one at 0 is consumed silently.
    assert_eq!(sink.switches, 2);
    // Beats in (0, ~19983]: 39 of the 48 total (those at 0 and past the end
    // of the sweep don't fire).
    assert_eq!(sink.beats, 39);
    assert_ne!(director.active(), starting_pair.as_slice());
}

#[test]
fn backward_seek_re_arms_passed_cues() {
    let timeline = Arc::new(AnalysisTimeline::from_json(&analysis_json()).unwrap());
    let mut scheduler = CueScheduler::new(timeline);

    let mut first = CueCollector::new();
    scheduler.advance(0, 10_000, &mut first);
    let beats_first: Vec<usize> = first
        .cues
        .iter()
        .filter(|c| c.kind == CueKind::Beat)
        .map(|c| c.index)
        .collect();

    // Without a seek, going backward is a logged no-op.
    let mut silent = CueCollector::new();
    assert_eq!(scheduler.advance(10_000, 4_000, &mut silent), 0);
    assert!(silent.cues.is_empty());

    // With a seek, the same window replays the same beats.
    scheduler.seek(4_000);
    let mut replay = CueCollector::new();
    scheduler.advance(4_000, 10_000, &mut replay);
    let beats_replay: Vec<usize> = replay
        .cues
        .iter()
        .filter(|c| c.kind == CueKind::Beat)
        .map(|c| c.index)
        .collect();

    let expected: Vec<usize> = beats_first.iter().copied().filter(|&i| i > 8).collect();
    assert_eq!(beats_replay, expected);
}

#[test]
fn track_change_resets_scheduler_and_director_together() {
    let timeline = Arc::new(AnalysisTimeline::from_json(&analysis_json()).unwrap());
    let mut scheduler = CueScheduler::new(Arc::clone(&timeline));
    let mut director = Director::new(vec!["x".to_string(), "y".to_string(), "z".to_string()]);

    let mut sink = CueCollector::new();
    scheduler.advance(0, 24_000, &mut sink);
    let first_run = sink.cues.len();
    assert!(first_run > 0);
    director.on_section();

    // New track: swap the timeline, rewind cursors, retune the director.
    scheduler.reset(Arc::clone(&timeline));
    director.retune(160.0);
    assert_eq!(scheduler.last_position_ms(), 0);
    assert_eq!(director.cursor(), 0);
    assert_eq!(director.min_dwell_bars(), 4);
    assert_eq!(director.active(), ["x".to_string(), "y".to_string()]);

    let mut replay = CueCollector::new();
    scheduler.advance(0, 24_000, &mut replay);
    assert_eq!(replay.cues.len(), first_run);
}

#[test]
fn intensity_tracks_segment_loudness() {
    let timeline = AnalysisTimeline::from_json(&analysis_json()).unwrap();
    // -12 dB on the [-60, 0] range.
    let expected = (-12.0f32 + 60.0) / 60.0;
    assert!((timeline.intensity_at(5_000) - expected).abs() < 0.001);
}
