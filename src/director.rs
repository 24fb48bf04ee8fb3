//! Automatic layer selection driven by section boundaries.
//!
//! The director walks a ring over the canonical scene ordering: every section
//! cue advances a cursor and activates the pair `(cursor, cursor + 3)`, which
//! keeps the composite varied without repeating the same pair twice in a row
//! for more than three scenes. A tempo-derived dwell time can optionally gate
//! switches that arrive too soon after the previous one.

/// Number of scenes active at boot; the same leading pair is restored on
/// every track change.
const STARTING_PAIR: usize = 2;

/// Ring offset between the two active layers.
const PARTNER_OFFSET: usize = 3;

pub struct Director {
    order: Vec<String>,
    cursor: usize,
    active: Vec<String>,
    min_dwell_bars: u32,
    bars_since_switch: u32,
    dwell_gating: bool,
}

impl Director {
    /// Build a director over the canonical scene ordering (registration
    /// order). The starting pair is the first two entries.
    pub fn new(order: Vec<String>) -> Self {
        let mut director = Self {
            order,
            cursor: 0,
            active: Vec::new(),
            min_dwell_bars: 4,
            bars_since_switch: 0,
            dwell_gating: false,
        };
        director.restore_starting_pair();
        director
    }

    fn restore_starting_pair(&mut self) {
        self.active = self.order.iter().take(STARTING_PAIR).cloned().collect();
    }

    /// Recompute the dwell time from the new track's tempo and restore the
    /// starting pair. Called atomically with the analysis swap.
    pub fn retune(&mut self, tempo_bpm: f32) {
        self.min_dwell_bars = ((tempo_bpm / 40.0).round() as u32).max(3);
        self.cursor = 0;
        self.bars_since_switch = 0;
        self.restore_starting_pair();
    }

    /// Enable or disable dwell gating. Off by default: the reference policy
    /// switches on every section boundary and treats the dwell time as
    /// advisory.
    pub fn set_dwell_gating(&mut self, enabled: bool) {
        self.dwell_gating = enabled;
    }

    /// Count a bar boundary toward the dwell window.
    pub fn on_bar(&mut self) {
        self.bars_since_switch = self.bars_since_switch.saturating_add(1);
    }

    /// React to a section boundary: advance the ring and pick the next pair.
    /// Returns whether the active set changed.
    pub fn on_section(&mut self) -> bool {
        let n = self.order.len();
        if n == 0 {
            return false;
        }
        if self.dwell_gating && self.bars_since_switch < self.min_dwell_bars {
            log::debug!(
                "director switch suppressed: {} of {} dwell bars elapsed",
                self.bars_since_switch,
                self.min_dwell_bars
            );
            return false;
        }

        self.cursor = (self.cursor + 1) % n;
        let partner = (self.cursor + PARTNER_OFFSET) % n;
        self.active = if partner == self.cursor {
            vec![self.order[self.cursor].clone()]
        } else {
            vec![self.order[self.cursor].clone(), self.order[partner].clone()]
        };
        self.bars_since_switch = 0;
        true
    }

    /// The currently active scene ids, in composite order.
    pub fn active(&self) -> &[String] {
        &self.active
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn min_dwell_bars(&self) -> u32 {
        self.min_dwell_bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seven_scene_director() -> Director {
        Director::new(
            ["a", "b", "c", "d", "e", "f", "g"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    #[test]
    fn starts_with_the_first_pair() {
        let director = seven_scene_director();
        assert_eq!(director.active(), ["a".to_string(), "b".to_string()]);
        assert_eq!(director.cursor(), 0);
    }

    #[test]
    fn seven_sections_visit_every_cursor_with_distinct_pairs() {
        let mut director = seven_scene_director();
        let mut pairs = Vec::new();
        for expected_cursor in 1..=7 {
            assert!(director.on_section());
            assert_eq!(director.cursor(), expected_cursor % 7);
            pairs.push(director.active().to_vec());
        }

        let cursors: std::collections::HashSet<usize> = (1..=7).map(|c| c % 7).collect();
        assert_eq!(cursors.len(), 7);

        // Seven distinct pairs, never the same pair twice in a row.
        let unique: std::collections::HashSet<Vec<String>> = pairs.iter().cloned().collect();
        assert_eq!(unique.len(), 7);
        for pair in pairs.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn pair_is_cursor_plus_three() {
        let mut director = seven_scene_director();
        director.on_section();
        assert_eq!(director.active(), ["b".to_string(), "e".to_string()]);
        director.on_section();
        assert_eq!(director.active(), ["c".to_string(), "f".to_string()]);
    }

    #[test]
    fn small_rings_collapse_to_a_single_layer() {
        let mut director = Director::new(vec!["solo".to_string()]);
        assert!(director.on_section());
        assert_eq!(director.active(), ["solo".to_string()]);
    }

    #[test]
    fn retune_derives_dwell_from_tempo() {
        let mut director = seven_scene_director();
        director.retune(200.0);
        assert_eq!(director.min_dwell_bars(), 5);
        director.retune(40.0);
        assert_eq!(director.min_dwell_bars(), 3);
        // Slow tempos still clamp up to the floor.
        director.retune(80.0);
        assert_eq!(director.min_dwell_bars(), 3);
    }

    #[test]
    fn retune_restores_the_starting_pair() {
        let mut director = seven_scene_director();
        director.on_section();
        director.on_section();
        director.retune(120.0);
        assert_eq!(director.cursor(), 0);
        assert_eq!(director.active(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn dwell_gating_suppresses_early_switches() {
        let mut director = seven_scene_director();
        director.retune(120.0); // min dwell 3 bars
        director.set_dwell_gating(true);

        assert!(!director.on_section());
        assert_eq!(director.cursor(), 0);

        director.on_bar();
        director.on_bar();
        assert!(!director.on_section());

        director.on_bar();
        assert!(director.on_section());
        assert_eq!(director.cursor(), 1);

        // The dwell window restarts after a switch.
        assert!(!director.on_section());
    }

    #[test]
    fn ungated_director_switches_on_every_section() {
        let mut director = seven_scene_director();
        for _ in 0..3 {
            assert!(director.on_section());
        }
    }
}
