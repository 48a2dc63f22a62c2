//! Fixed-point PI controller with anti-windup and a feed-forward dead-band.
//!
//! Gains are scaled by [`SCALE`]: an output of `(p * err + i * Σerr) / 1000`.
//! When the output is clamped, the integral sum is back-calculated so that a
//! repeated `evaluate` with the same error lands on the same clamped value.
//! Motor stiction is handled by the dead-band: a non-zero error never produces
//! an output strictly between `ff_min` and `ff_max`.

use crate::fixed_point::{div_ceil, div_floor, saturate_i32};

/// Fixed-point scale of the gains.
pub const SCALE: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Upper,
    Lower,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pid {
    p: i64,
    i: i64,
    sum: i64,
    min: i32,
    max: i32,
    ff_min: i32,
    ff_max: i32,
}

impl Default for Pid {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl Pid {
    /// New controller with an unbounded-by-default `[-100, 100]` range and no dead-band.
    pub const fn new(p: u16, i: u16) -> Self {
        Self {
            p: p as i64,
            i: i as i64,
            sum: 0,
            min: -100,
            max: 100,
            ff_min: 0,
            ff_max: 0,
        }
    }

    pub fn set_params(&mut self, p: u16, i: u16) {
        self.p = i64::from(p);
        self.i = i64::from(i);
    }

    /// Output range and dead-band. Inverted bounds are swapped and the dead-band
    /// is clamped inside `[min, max]`.
    pub fn set_output_range(&mut self, min: i32, max: i32, ff_min: i32, ff_max: i32) {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.min = min;
        self.max = max;
        self.ff_min = ff_min.clamp(min, max);
        self.ff_max = ff_max.clamp(min, max);
    }

    pub const fn output_range(&self) -> (i32, i32, i32, i32) {
        (self.min, self.max, self.ff_min, self.ff_max)
    }

    #[inline]
    pub const fn integral(&self) -> i64 {
        self.sum
    }

    /// One controller step.
    pub fn evaluate(&mut self, error: i32) -> i32 {
        let err = i64::from(error);
        self.sum = self.sum.saturating_add(err);
        let raw = self
            .p
            .saturating_mul(err)
            .saturating_add(self.i.saturating_mul(self.sum))
            / SCALE;

        let mut out = if raw < i64::from(self.min) {
            self.back_calculate(self.min, err, Bound::Lower);
            self.min
        } else if raw > i64::from(self.max) {
            self.back_calculate(self.max, err, Bound::Upper);
            self.max
        } else {
            saturate_i32(raw)
        };

        if out > self.ff_min && out < self.ff_max {
            if error > 0 {
                out = self.ff_max;
                self.back_calculate(out, err, Bound::Upper);
            } else if error < 0 {
                out = self.ff_min;
                self.back_calculate(out, err, Bound::Lower);
            }
        }
        out
    }

    /// Overwrite the integral so the controller continues from an externally
    /// forced `output` for the given `error`. Returns `output`.
    pub fn set_output(&mut self, output: i32, error: i32) -> i32 {
        let bound = if output >= 0 { Bound::Upper } else { Bound::Lower };
        self.back_calculate(output, i64::from(error), bound);
        output
    }

    /// Choose the sum so the next `evaluate(err)` computes a raw value on the
    /// `bound` side of `out`. No-op without integral gain.
    fn back_calculate(&mut self, out: i32, err: i64, bound: Bound) {
        if self.i <= 0 {
            return;
        }
        let num = i64::from(out) * SCALE - self.p.saturating_mul(err);
        let next_sum = match bound {
            Bound::Upper => div_ceil(num, self.i),
            Bound::Lower => div_floor(num, self.i),
        };
        self.sum = next_sum - err;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn speed_pid() -> Pid {
        let mut pid = Pid::new(50, 25);
        pid.set_output_range(-100, 100, -45, 50);
        pid
    }

    #[test]
    fn small_positive_error_jumps_to_ff_max_and_stays() {
        let mut pid = speed_pid();
        let first = pid.evaluate(1);
        assert_eq!(first, 50);
        for _ in 0..500 {
            let out = pid.evaluate(1);
            assert!(out >= 50, "fell below dead-band: {out}");
            assert!(out <= 100);
        }
    }

    #[test]
    fn small_negative_error_jumps_to_ff_min() {
        let mut pid = speed_pid();
        assert_eq!(pid.evaluate(-1), -45);
        assert!(pid.evaluate(-1) <= -45);
    }

    #[test]
    fn zero_error_inside_band_is_not_forced() {
        let mut pid = speed_pid();
        assert_eq!(pid.evaluate(0), 0);
    }

    #[rstest]
    #[case(10_000)]
    #[case(-10_000)]
    fn saturated_output_is_idempotent(#[case] err: i32) {
        let mut pid = speed_pid();
        let a = pid.evaluate(err);
        let b = pid.evaluate(err);
        assert_eq!(a, b);
        assert_eq!(a.abs(), 100);
    }

    #[test]
    fn ff_bounds_are_clamped_into_range() {
        let mut pid = Pid::new(1, 1);
        pid.set_output_range(-30, 30, -45, 50);
        assert_eq!(pid.output_range(), (-30, 30, -30, 30));
    }

    #[test]
    fn set_output_zero_clears_integral_effect() {
        let mut pid = speed_pid();
        for _ in 0..50 {
            pid.evaluate(40);
        }
        pid.set_output(0, 0);
        assert_eq!(pid.integral(), 0);
        assert_eq!(pid.evaluate(0), 0);
    }

    #[test]
    fn proportional_only_has_no_back_calculation() {
        let mut pid = Pid::new(1500, 0);
        pid.set_output_range(-70, 70, -20, 20);
        assert_eq!(pid.evaluate(1000), 70);
        assert_eq!(pid.evaluate(2), 20);
        assert_eq!(pid.evaluate(-2), -20);
        assert_eq!(pid.evaluate(30), 45);
    }

    proptest! {
        #[test]
        fn output_always_in_range(p in 0u16..2000, i in 0u16..500, errs in proptest::collection::vec(-5000i32..5000, 1..100)) {
            let mut pid = Pid::new(p, i);
            pid.set_output_range(-100, 100, -45, 50);
            for e in errs {
                let out = pid.evaluate(e);
                prop_assert!((-100..=100).contains(&out));
            }
        }

        #[test]
        fn clamped_output_repeats(p in 0u16..2000, i in 1u16..1000, warm in -5000i32..5000, err in -5000i32..5000) {
            let mut pid = Pid::new(p, i);
            pid.set_output_range(-100, 100, -45, 50);
            pid.evaluate(warm);
            let first = pid.evaluate(err);
            if (first == 100 && err >= 0) || (first == -100 && err <= 0) {
                prop_assert_eq!(pid.evaluate(err), first);
            }
        }
    }
}
