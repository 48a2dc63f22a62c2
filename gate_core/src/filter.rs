//! Integer exponential smoothing for noisy analog inputs.

/// First-order low-pass: each input moves the output by `1/weight` of the
/// difference. The accumulator keeps `weight` times the output so small
/// differences are not lost to truncation.
#[derive(Debug, Clone)]
pub struct ExpFilter {
    weight: i64,
    acc: i64,
}

impl ExpFilter {
    /// `weight` of 1 passes the input through unchanged.
    pub fn new(weight: u16) -> Self {
        Self {
            weight: i64::from(weight.max(1)),
            acc: 0,
        }
    }

    /// Feed one sample and return the smoothed value.
    pub fn input(&mut self, x: i32) -> i32 {
        self.acc += i64::from(x) - self.acc / self.weight;
        self.output()
    }

    pub fn output(&self) -> i32 {
        crate::fixed_point::saturate_i32(self.acc / self.weight)
    }

    pub fn reset(&mut self) {
        self.acc = 0;
    }
}
