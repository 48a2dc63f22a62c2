//! Asymmetric debounce filter.
//!
//! Turns a noisy boolean into a stable one: the output rises only after `up`
//! consecutive true feeds and falls only after `down` consecutive false feeds.
//! The same filter runs at the encoder rate (edges), the control rate (faults)
//! and the door rate (steady-move guard); delays are counted in caller ticks.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hysteresis {
    up: u32,
    down: u32,
    count: u32,
    out: bool,
}

impl Hysteresis {
    /// Zero delays are treated as one tick.
    pub const fn new(up: u32, down: u32) -> Self {
        Self {
            up: if up == 0 { 1 } else { up },
            down: if down == 0 { 1 } else { down },
            count: 0,
            out: false,
        }
    }

    /// Change both delays; a running count is clamped to the new bound.
    pub fn set_max(&mut self, up: u32, down: u32) {
        self.up = up.max(1);
        self.down = down.max(1);
        if self.out {
            self.count = self.count.min(self.down);
        } else {
            self.count = self.count.min(self.up);
        }
    }

    /// Advance the filter by one tick and return the filtered output.
    pub fn feed(&mut self, raw: bool) -> bool {
        if self.out {
            if raw {
                self.count = self.down;
            } else {
                self.count = self.count.saturating_sub(1);
                if self.count == 0 {
                    self.out = false;
                }
            }
        } else if raw {
            self.count = (self.count + 1).min(self.up);
            if self.count >= self.up {
                self.out = true;
                self.count = self.down;
            }
        } else {
            self.count = 0;
        }
        self.out
    }

    /// Like [`feed`](Self::feed) but returns true only on the tick the output rises.
    pub fn feed_edge(&mut self, raw: bool) -> bool {
        let was = self.out;
        self.feed(raw) && !was
    }

    #[inline]
    pub const fn output(&self) -> bool {
        self.out
    }

    /// Raw counter: progress towards `up` while low, remaining hold while high.
    #[inline]
    pub const fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub const fn limits(&self) -> (u32, u32) {
        (self.up, self.down)
    }

    /// Force the resting (false) state.
    pub fn reset(&mut self) {
        self.count = 0;
        self.out = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1)]
    #[case(3, 2)]
    #[case(30, 50)]
    fn rises_after_exactly_up_trues(#[case] up: u32, #[case] down: u32) {
        let mut h = Hysteresis::new(up, down);
        for _ in 1..up {
            assert!(!h.feed(true));
        }
        assert!(h.feed(true));
    }

    #[rstest]
    #[case(2, 1)]
    #[case(2, 5)]
    #[case(5, 20)]
    fn falls_after_exactly_down_falses(#[case] up: u32, #[case] down: u32) {
        let mut h = Hysteresis::new(up, down);
        for _ in 0..up {
            h.feed(true);
        }
        for _ in 1..down {
            assert!(h.feed(false), "fell early");
        }
        assert!(!h.feed(false));
    }

    #[test]
    fn false_feed_restarts_rise() {
        let mut h = Hysteresis::new(3, 3);
        h.feed(true);
        h.feed(true);
        h.feed(false);
        assert_eq!(h.count(), 0);
        assert!(!h.feed(true));
        assert!(!h.feed(true));
        assert!(h.feed(true));
    }

    #[test]
    fn true_feed_refreshes_hold() {
        let mut h = Hysteresis::new(1, 3);
        h.feed(true);
        h.feed(false);
        h.feed(false);
        assert_eq!(h.count(), 1);
        h.feed(true);
        assert_eq!(h.count(), 3);
        assert!(h.output());
    }

    #[test]
    fn feed_edge_fires_once() {
        let mut h = Hysteresis::new(2, 2);
        assert!(!h.feed_edge(true));
        assert!(h.feed_edge(true));
        assert!(!h.feed_edge(true));
    }

    #[test]
    fn reset_and_zero_delays() {
        let mut h = Hysteresis::new(0, 0);
        assert_eq!(h.limits(), (1, 1));
        assert!(h.feed(true));
        h.reset();
        assert!(!h.output());
        assert_eq!(h.count(), 0);
    }

    #[test]
    fn set_max_clamps_running_count() {
        let mut h = Hysteresis::new(10, 10);
        for _ in 0..6 {
            h.feed(true);
        }
        h.set_max(4, 2);
        assert_eq!(h.count(), 4);
        assert!(h.feed(true));
        assert_eq!(h.count(), 2);
    }

    proptest! {
        #[test]
        fn output_tracks_runs(up in 1u32..20, down in 1u32..20, feeds in proptest::collection::vec(any::<bool>(), 0..200)) {
            let mut h = Hysteresis::new(up, down);
            let mut run_true = 0u32;
            let mut run_false = 0u32;
            let mut expected = false;
            for raw in feeds {
                if raw { run_true += 1; run_false = 0; } else { run_false += 1; run_true = 0; }
                if !expected && run_true >= up { expected = true; }
                else if expected && run_false >= down { expected = false; }
                prop_assert_eq!(h.feed(raw), expected);
            }
        }
    }
}
