//! Simulated gate plant.
//!
//! One shared [`SimPlant`] models the leaf, its two mechanical stops, the
//! motor driver and the shunt. The three device views it hands out implement
//! the core's hardware traits, so the control loops run against it unchanged.
//! Physics advance lazily on every device access using the plant's clock.

use crate::error::HwError;
use gate_traits::{Clock, CurrentSense, HwResult, Motor, QuadratureInput};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Quadrature levels `(a, b)` by `count mod 4`; increasing counts open the door.
const PHASES: [(bool, bool); 4] = [(false, false), (true, false), (true, true), (false, true)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimParams {
    /// Mechanical stops in encoder counts. Their phases make the rocking
    /// edge look like an end-stop to the decoder (A with B low at the top,
    /// B with A low at the bottom).
    pub lower_stop: i32,
    pub upper_stop: i32,
    /// Leaf position at power-up.
    pub start: i32,
    pub mcounts_per_sec_per_pct: i32,
    pub stiction_pct: i32,
    pub chatter_ms: u32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            lower_stop: -1,
            upper_stop: 161,
            start: 80,
            mcounts_per_sec_per_pct: 300,
            stiction_pct: 30,
            chatter_ms: 20,
        }
    }
}

#[derive(Debug)]
struct Plant {
    p: SimParams,
    pos_mc: i64,
    duty: i16,
    powered: bool,
    sensor_powered: bool,
    pushing: bool,
    moving: bool,
    chatter_us: u64,
    chatter_in: bool,
    last: Instant,
}

impl Plant {
    fn lower_mc(&self) -> i64 {
        i64::from(self.p.lower_stop) * 1000
    }

    fn upper_mc(&self) -> i64 {
        i64::from(self.p.upper_stop) * 1000
    }

    fn effective_duty(&self) -> i64 {
        if self.powered { i64::from(self.duty) } else { 0 }
    }

    fn advance(&mut self, now: Instant) {
        let dt_us = u64::try_from(now.saturating_duration_since(self.last).as_micros()).unwrap_or(u64::MAX);
        self.last = now;
        if dt_us == 0 {
            return;
        }

        let duty = self.effective_duty();
        let breaks_free = duty.abs() >= i64::from(self.p.stiction_pct);
        let v = if breaks_free {
            duty * i64::from(self.p.mcounts_per_sec_per_pct)
        } else {
            0
        };
        let step = v.saturating_mul(i64::try_from(dt_us).unwrap_or(i64::MAX)) / 1_000_000;
        let (lo, hi) = (self.lower_mc(), self.upper_mc());
        let next = self.pos_mc.saturating_add(step).clamp(lo, hi);
        self.pushing = breaks_free && ((duty > 0 && next == hi) || (duty < 0 && next == lo));
        self.moving = next != self.pos_mc || (v != 0 && !self.pushing);
        self.pos_mc = next;

        if self.pushing {
            self.chatter_us += dt_us;
            let period = u64::from(self.p.chatter_ms.max(1)) * 1000;
            let flips = self.chatter_us / period;
            self.chatter_us %= period;
            if flips % 2 == 1 {
                self.chatter_in = !self.chatter_in;
            }
        } else {
            self.chatter_us = 0;
            self.chatter_in = false;
        }
    }

    fn count(&self) -> i32 {
        let base = i32::try_from(self.pos_mc.div_euclid(1000)).unwrap_or(0);
        if self.pushing && self.chatter_in {
            if self.duty > 0 { base - 1 } else { base + 1 }
        } else {
            base
        }
    }

    fn current_ma(&self) -> i32 {
        let duty = i32::try_from(self.effective_duty().abs()).unwrap_or(0);
        if duty == 0 {
            0
        } else if self.moving {
            duty
        } else {
            8 * duty
        }
    }
}

/// Shared plant; clone freely.
#[derive(Clone)]
pub struct SimPlant {
    inner: Arc<Mutex<Plant>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SimPlant {
    pub fn new(params: SimParams, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let start = params.start.clamp(params.lower_stop, params.upper_stop);
        let plant = Plant {
            pos_mc: i64::from(start) * 1000 + 500,
            duty: 0,
            powered: false,
            sensor_powered: false,
            pushing: false,
            moving: false,
            chatter_us: 0,
            chatter_in: false,
            last: clock.now(),
            p: params,
        };
        Self {
            inner: Arc::new(Mutex::new(plant)),
            clock,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Plant) -> R) -> R {
        let mut p = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        p.advance(self.clock.now());
        f(&mut p)
    }

    pub fn quadrature(&self) -> SimQuadrature {
        SimQuadrature(self.clone())
    }

    pub fn motor(&self) -> SimMotor {
        SimMotor(self.clone())
    }

    pub fn current_sense(&self) -> SimCurrent {
        SimCurrent(self.clone())
    }

    /// Leaf position in encoder counts, as the sensor sees it.
    pub fn position(&self) -> i32 {
        self.with(|p| p.count())
    }

    pub fn duty(&self) -> i16 {
        self.with(|p| p.duty)
    }

    pub fn is_powered(&self) -> bool {
        self.with(|p| p.powered)
    }

    pub fn is_pushing(&self) -> bool {
        self.with(|p| p.pushing)
    }

    /// Move the leaf by hand.
    pub fn displace(&self, counts: i32) {
        self.with(|p| {
            let (lo, hi) = (p.lower_mc(), p.upper_mc());
            p.pos_mc = (p.pos_mc + i64::from(counts) * 1000).clamp(lo, hi);
        });
    }
}

pub struct SimQuadrature(SimPlant);

impl QuadratureInput for SimQuadrature {
    fn read_channels(&mut self) -> HwResult<(bool, bool)> {
        let (powered, count) = self.0.with(|p| (p.sensor_powered, p.count()));
        if !powered {
            return Err(Box::new(HwError::SensorUnpowered));
        }
        let idx = usize::try_from(count.rem_euclid(4)).unwrap_or(0);
        Ok(PHASES[idx])
    }

    fn set_sensor_power(&mut self, on: bool) -> HwResult<()> {
        self.0.with(|p| p.sensor_powered = on);
        Ok(())
    }
}

pub struct SimMotor(SimPlant);

impl Motor for SimMotor {
    fn run(&mut self, duty_pct: i16) -> HwResult<()> {
        let duty = duty_pct.clamp(-100, 100);
        let prev = self.0.with(|p| std::mem::replace(&mut p.duty, duty));
        if prev.signum() != duty.signum() {
            tracing::trace!(duty, "sim motor direction change");
        }
        Ok(())
    }

    fn set_power(&mut self, enable: bool) -> HwResult<()> {
        self.0.with(|p| p.powered = enable);
        tracing::debug!(enable, "sim motor power");
        Ok(())
    }
}

pub struct SimCurrent(SimPlant);

impl CurrentSense for SimCurrent {
    fn read_ma(&mut self) -> HwResult<i32> {
        Ok(self.0.with(|p| p.current_ma()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_traits::ManualClock;
    use std::time::Duration;

    fn plant() -> (SimPlant, ManualClock) {
        let clock = ManualClock::new();
        (SimPlant::new(SimParams::default(), Arc::new(clock.clone())), clock)
    }

    #[test]
    fn phases_step_by_one_count() {
        for w in PHASES.windows(2) {
            let changed = usize::from(w[0].0 != w[1].0) + usize::from(w[0].1 != w[1].1);
            assert_eq!(changed, 1);
        }
    }

    #[test]
    fn unpowered_driver_does_not_move() {
        let (p, clock) = plant();
        let mut m = p.motor();
        m.run(100).unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(p.position(), 80);
        assert_eq!(p.current_sense().read_ma().unwrap(), 0);
    }

    #[test]
    fn stiction_holds_low_duty() {
        let (p, clock) = plant();
        let mut m = p.motor();
        m.set_power(true).unwrap();
        m.run(20).unwrap();
        clock.advance(Duration::from_secs(1));
        assert_eq!(p.position(), 80);
        assert_eq!(p.current_sense().read_ma().unwrap(), 160);
    }
}
