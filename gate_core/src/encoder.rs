//! Quadrature position sensor.
//!
//! [`Encoder`] lives on the fast sampling thread: it debounces the A/B levels,
//! decodes confirmed edges into ±1 counts, feeds the two end-stop candidate
//! filters and keeps a smoothed speed estimate. Everything other threads need
//! is published through the lock-free [`EncoderHandle`].
//!
//! End-stop inference: when the door is pushed against a mechanical stop the
//! shaft rocks across a single edge. A rocking A channel while B is low looks
//! like the open stop; a rocking B channel while A is low looks like the
//! closed stop. Enough such edges in a row raise the candidate.

use crate::config::EncoderCfg;
use crate::hysteresis::Hysteresis;
use gate_traits::QuadratureInput;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

#[derive(Debug, Default)]
struct Shared {
    position: AtomicI32,
    last_pos: AtomicI32,
    speed: AtomicI32,
    elapsed_ms: AtomicU32,
    steady_ms: u32,
    upper: AtomicBool,
    lower: AtomicBool,
    reset_upper: AtomicBool,
    reset_lower: AtomicBool,
}

/// Cloneable read/command view of the encoder for the other loops.
#[derive(Debug, Clone)]
pub struct EncoderHandle {
    shared: Arc<Shared>,
}

impl EncoderHandle {
    #[inline]
    pub fn position(&self) -> i32 {
        self.shared.position.load(Ordering::Acquire)
    }

    #[inline]
    pub fn speed(&self) -> i32 {
        self.shared.speed.load(Ordering::Acquire)
    }

    /// No movement beyond the motion threshold for longer than the steady time.
    #[inline]
    pub fn is_steady(&self) -> bool {
        self.shared.elapsed_ms.load(Ordering::Acquire) > self.shared.steady_ms
    }

    /// Redefine the current position (used to zero the closed origin).
    pub fn set_position(&self, pos: i32) {
        self.shared.last_pos.store(pos, Ordering::Release);
        self.shared.position.store(pos, Ordering::Release);
    }

    #[inline]
    pub fn upper_candidate(&self) -> bool {
        self.shared.upper.load(Ordering::Acquire)
    }

    #[inline]
    pub fn lower_candidate(&self) -> bool {
        self.shared.lower.load(Ordering::Acquire)
    }

    pub fn reset_upper_candidate(&self) {
        self.shared.upper.store(false, Ordering::Release);
        self.shared.reset_upper.store(true, Ordering::Release);
    }

    pub fn reset_lower_candidate(&self) {
        self.shared.lower.store(false, Ordering::Release);
        self.shared.reset_lower.store(true, Ordering::Release);
    }

    /// Start a fresh stall window so a move commanded from rest is not
    /// reported as stalled before it had a chance to start.
    pub fn restart_motion_window(&self) {
        self.shared.elapsed_ms.store(0, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct Encoder {
    cfg: EncoderCfg,
    period_ms: u32,
    raw: (bool, bool),
    stable: u32,
    primed: bool,
    a: bool,
    b: bool,
    lim_max: Hysteresis,
    lim_min: Hysteresis,
    shared: Arc<Shared>,
}

impl Encoder {
    pub fn new(cfg: EncoderCfg) -> Self {
        let shared = Arc::new(Shared {
            steady_ms: cfg.steady_ms,
            // Start steady: the door is assumed at rest at boot.
            elapsed_ms: AtomicU32::new(cfg.steady_ms.saturating_add(1)),
            ..Shared::default()
        });
        Self {
            period_ms: u32::try_from(cfg.period_ms.max(1)).unwrap_or(u32::MAX),
            lim_max: Hysteresis::new(cfg.limit_up, cfg.limit_down),
            lim_min: Hysteresis::new(cfg.limit_up, cfg.limit_down),
            cfg,
            raw: (false, false),
            stable: 0,
            primed: false,
            a: false,
            b: false,
            shared,
        }
    }

    pub fn handle(&self) -> EncoderHandle {
        EncoderHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Process one raw sample of both channels.
    pub fn sample(&mut self, a: bool, b: bool) {
        self.apply_reset_requests();

        if (a, b) == self.raw {
            if self.stable < self.cfg.debounce_samples {
                self.stable += 1;
                if self.stable == self.cfg.debounce_samples {
                    self.accept(a, b);
                }
            }
        } else {
            self.raw = (a, b);
            self.stable = 1;
            if self.cfg.debounce_samples <= 1 {
                self.accept(a, b);
            }
        }

        self.update_speed();
    }

    fn apply_reset_requests(&mut self) {
        if self.shared.reset_upper.swap(false, Ordering::AcqRel) {
            self.lim_max.reset();
        }
        if self.shared.reset_lower.swap(false, Ordering::AcqRel) {
            self.lim_min.reset();
        }
    }

    fn accept(&mut self, a: bool, b: bool) {
        if !self.primed {
            self.primed = true;
            self.a = a;
            self.b = b;
            return;
        }
        if a != self.a {
            self.a = a;
            let step = if a == self.b { -1 } else { 1 };
            self.shared.position.fetch_add(step, Ordering::AcqRel);
            let up = self.lim_max.feed(!self.b);
            self.shared.upper.store(up, Ordering::Release);
        }
        if b != self.b {
            self.b = b;
            let step = if self.a == b { 1 } else { -1 };
            self.shared.position.fetch_add(step, Ordering::AcqRel);
            let low = self.lim_min.feed(!self.a);
            self.shared.lower.store(low, Ordering::Release);
        }
    }

    fn update_speed(&mut self) {
        let s = &self.shared;
        let pos = s.position.load(Ordering::Acquire);
        let last = s.last_pos.load(Ordering::Acquire);
        let delta = pos.wrapping_sub(last);
        let moved = delta.abs() > self.cfg.motion_threshold;
        // Saturate just past the threshold so the counter cannot wrap.
        let cap = s.steady_ms.saturating_add(self.period_ms);

        // Single read-modify-write: a concurrent restart_motion_window() is
        // either seen here or applied after, never overwritten.
        let (Ok(prev) | Err(prev)) = s.elapsed_ms.fetch_update(Ordering::AcqRel, Ordering::Acquire, |e| {
            Some(if moved {
                0
            } else {
                e.saturating_add(self.period_ms).min(cap)
            })
        });
        let elapsed = prev.saturating_add(self.period_ms);

        if moved {
            let inst = i64::from(delta) * i64::from(self.cfg.speed_scale) / i64::from(elapsed.max(1));
            let blended = (i64::from(s.speed.load(Ordering::Acquire)) + inst) / 2;
            s.speed.store(crate::fixed_point::saturate_i32(blended), Ordering::Release);
            s.last_pos.store(pos, Ordering::Release);
        } else if elapsed > s.steady_ms {
            s.speed.store(0, Ordering::Release);
        }
    }
}

/// An [`Encoder`] bound to its input device, stepped by the sampling loop.
pub struct EncoderTask<Q: QuadratureInput> {
    input: Q,
    encoder: Encoder,
    read_errors: u64,
}

impl<Q: QuadratureInput> EncoderTask<Q> {
    pub fn new(mut input: Q, encoder: Encoder) -> Self {
        if let Err(e) = input.set_sensor_power(true) {
            tracing::warn!(error = %e, "encoder sensor power-on failed");
        }
        Self {
            input,
            encoder,
            read_errors: 0,
        }
    }

    pub fn handle(&self) -> EncoderHandle {
        self.encoder.handle()
    }

    /// One sampling period. A failed read skips the sample.
    pub fn step(&mut self) {
        match self.input.read_channels() {
            Ok((a, b)) => self.encoder.sample(a, b),
            Err(e) => {
                self.read_errors += 1;
                if self.read_errors.is_power_of_two() {
                    let err = crate::hw_error::map_hw_error(e.as_ref());
                    tracing::warn!(error = %err, count = self.read_errors, "encoder read failed");
                }
            }
        }
    }

    pub const fn read_errors(&self) -> u64 {
        self.read_errors
    }
}

impl<Q: QuadratureInput> Drop for EncoderTask<Q> {
    fn drop(&mut self) {
        if let Err(e) = self.input.set_sensor_power(false) {
            tracing::debug!(error = %e, "encoder sensor power-off failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hold(enc: &mut Encoder, a: bool, b: bool, n: usize) {
        for _ in 0..n {
            enc.sample(a, b);
        }
    }

    fn fresh() -> Encoder {
        let mut enc = Encoder::new(EncoderCfg::default());
        hold(&mut enc, false, false, 5);
        enc
    }

    #[test]
    fn a_rising_with_b_low_counts_up() {
        let mut enc = fresh();
        hold(&mut enc, true, false, 5);
        assert_eq!(enc.handle().position(), 1);
    }

    #[test]
    fn a_rising_with_b_high_counts_down() {
        let mut enc = Encoder::new(EncoderCfg::default());
        hold(&mut enc, false, true, 5);
        hold(&mut enc, true, true, 5);
        assert_eq!(enc.handle().position(), -1);
    }

    #[test]
    fn glitch_shorter_than_debounce_is_ignored() {
        let mut enc = fresh();
        hold(&mut enc, true, false, 4);
        hold(&mut enc, false, false, 10);
        assert_eq!(enc.handle().position(), 0);
    }

    #[test]
    fn full_cycle_each_direction() {
        let mut enc = fresh();
        for &(a, b) in &[(true, false), (true, true), (false, true), (false, false)] {
            hold(&mut enc, a, b, 5);
        }
        assert_eq!(enc.handle().position(), 4);
        for &(a, b) in &[(false, true), (true, true), (true, false), (false, false)] {
            hold(&mut enc, a, b, 5);
        }
        assert_eq!(enc.handle().position(), 0);
    }

    #[test]
    fn rocking_a_edge_with_b_low_raises_upper_candidate() {
        let cfg = EncoderCfg {
            limit_up: 4,
            ..EncoderCfg::default()
        };
        let mut enc = Encoder::new(cfg);
        hold(&mut enc, false, false, 5);
        let h = enc.handle();
        for i in 0..4 {
            assert!(!h.upper_candidate(), "raised early at edge {i}");
            let a = i % 2 == 0;
            hold(&mut enc, a, false, 5);
        }
        assert!(h.upper_candidate());
        assert!(!h.lower_candidate());
        h.reset_upper_candidate();
        assert!(!h.upper_candidate());
        hold(&mut enc, true, false, 5);
        assert!(!h.upper_candidate());
    }

    #[test]
    fn speed_and_steady_tracking() {
        let mut enc = fresh();
        let h = enc.handle();
        assert!(h.is_steady());
        h.restart_motion_window();
        assert!(!h.is_steady());
        for &(a, b) in &[(true, false), (true, true), (false, true)] {
            hold(&mut enc, a, b, 5);
        }
        assert!(h.speed() > 0);
        assert!(!h.is_steady());
        // 2 s of no edges at 2 ms per sample
        hold(&mut enc, false, true, 1001);
        assert!(h.is_steady());
        assert_eq!(h.speed(), 0);
    }

    #[test]
    fn restart_window_lasts_the_full_steady_time() {
        let mut enc = fresh();
        let h = enc.handle();
        hold(&mut enc, false, false, 1001);
        assert!(h.is_steady());
        h.restart_motion_window();
        hold(&mut enc, false, false, 1000);
        assert!(!h.is_steady());
        hold(&mut enc, false, false, 1);
        assert!(h.is_steady());
    }

    #[test]
    fn restart_racing_the_sampler_is_not_lost() {
        let mut enc = fresh();
        let h = enc.handle();
        for _ in 0..200 {
            hold(&mut enc, false, false, 1001);
            assert!(h.is_steady());
            std::thread::scope(|s| {
                let enc = &mut enc;
                s.spawn(move || hold(enc, false, false, 500));
                h.restart_motion_window();
            });
            // At most 500 samples * 2 ms landed after the restart.
            assert!(!h.is_steady());
        }
    }

    #[test]
    fn set_position_does_not_register_as_motion() {
        let mut enc = fresh();
        let h = enc.handle();
        h.set_position(100);
        hold(&mut enc, false, false, 1);
        assert_eq!(h.position(), 100);
        assert_eq!(h.speed(), 0);
    }
}
