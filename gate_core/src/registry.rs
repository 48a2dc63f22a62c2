//! Named, bounded integer parameters shared between the loops.
//!
//! Tuning values are read by the control loop every tick, so a change made by
//! another thread takes effect on the next period. Telemetry is written back
//! into the same registry. Persistence is someone else's job.

use crate::config::Tuning;
use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Debug)]
pub struct Param {
    name: &'static str,
    value: AtomicI32,
    min: i32,
    max: i32,
}

impl Param {
    pub const fn new(name: &'static str, value: i32, min: i32, max: i32) -> Self {
        Self {
            name,
            value: AtomicI32::new(value),
            min,
            max,
        }
    }

    #[inline]
    pub fn get(&self) -> i32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Store `v` if it lies within bounds; returns whether it was accepted.
    pub fn set(&self, v: i32) -> bool {
        if (self.min..=self.max).contains(&v) {
            self.value.store(v, Ordering::Relaxed);
            true
        } else {
            tracing::warn!(param = self.name, value = v, min = self.min, max = self.max, "rejected out-of-range parameter");
            false
        }
    }

    /// Store `v` clamped into bounds and return the stored value.
    pub fn set_clamped(&self, v: i32) -> i32 {
        let v = v.clamp(self.min, self.max);
        self.value.store(v, Ordering::Relaxed);
        v
    }

    /// Current value as a `u16` gain (negative reads as 0).
    pub fn get_u16(&self) -> u16 {
        u16::try_from(self.get().max(0)).unwrap_or(u16::MAX)
    }
}

#[derive(Debug)]
pub struct Registry {
    // telemetry
    pub actual_position: Param,
    pub actual_speed: Param,
    pub current_ma: Param,
    pub pwm: Param,
    pub demanded_position: Param,
    pub demanded_speed: Param,
    pub open_pulses: Param,
    pub open_percent: Param,
    pub error_code: Param,
    // tuning
    pub speed_p: Param,
    pub speed_i: Param,
    pub position_p: Param,
    pub max_speed: Param,
    pub min_speed: Param,
    pub current_limit_open: Param,
    pub current_limit_close: Param,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(&Tuning::default())
    }
}

impl Registry {
    pub fn new(t: &Tuning) -> Self {
        let r = Self {
            actual_position: Param::new("actual_position", 0, i32::MIN, i32::MAX),
            actual_speed: Param::new("actual_speed", 0, i32::MIN, i32::MAX),
            current_ma: Param::new("current_ma", 0, 0, 2000),
            pwm: Param::new("pwm", 0, -100, 100),
            demanded_position: Param::new("demanded_position", 0, -1000, 1000),
            demanded_speed: Param::new("demanded_speed", 0, -1000, 1000),
            open_pulses: Param::new("open_pulses", 0, 0, 300),
            open_percent: Param::new("open_percent", 0, 0, 100),
            error_code: Param::new("error_code", 0, 0, 255),
            speed_p: Param::new("speed_p", 50, 0, 10_000),
            speed_i: Param::new("speed_i", 25, 0, 10_000),
            position_p: Param::new("position_p", 1500, 0, 50_000),
            max_speed: Param::new("max_speed", 70, 30, 300),
            min_speed: Param::new("min_speed", 20, 0, 50),
            current_limit_open: Param::new("current_limit_open", 250, 10, 1000),
            current_limit_close: Param::new("current_limit_close", 120, 5, 1000),
        };
        r.apply_tuning(t);
        r
    }

    /// Load tuning values, clamping each into its parameter bounds.
    pub fn apply_tuning(&self, t: &Tuning) {
        self.speed_p.set_clamped(t.speed_p);
        self.speed_i.set_clamped(t.speed_i);
        self.position_p.set_clamped(t.position_p);
        self.max_speed.set_clamped(t.max_speed);
        self.min_speed.set_clamped(t.min_speed);
        self.current_limit_open.set_clamped(t.current_limit_open_ma);
        self.current_limit_close.set_clamped(t.current_limit_close_ma);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuning() {
        let r = Registry::default();
        assert_eq!(r.speed_p.get(), 50);
        assert_eq!(r.speed_i.get(), 25);
        assert_eq!(r.position_p.get(), 1500);
        assert_eq!(r.max_speed.get(), 70);
        assert_eq!(r.min_speed.get(), 20);
        assert_eq!(r.current_limit_open.get(), 250);
        assert_eq!(r.current_limit_close.get(), 120);
    }

    #[test]
    fn set_rejects_out_of_range() {
        let r = Registry::default();
        assert!(!r.max_speed.set(10));
        assert_eq!(r.max_speed.get(), 70);
        assert!(r.max_speed.set(100));
        assert_eq!(r.demanded_position.set_clamped(5000), 1000);
    }
}
