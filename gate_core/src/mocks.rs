//! Test and helper mocks for gate_core

use gate_traits::{CurrentSense, HwResult, Motor, QuadratureInput};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A quadrature input that always errors on read; useful when the encoder is
/// driven with externally supplied samples.
pub struct NoopQuadrature;

impl QuadratureInput for NoopQuadrature {
    fn read_channels(&mut self) -> HwResult<(bool, bool)> {
        Err(Box::new(std::io::Error::other("noop quadrature")))
    }
}

/// Quadrature input whose levels are set from the test.
#[derive(Clone, Default)]
pub struct SharedQuadrature {
    levels: Arc<Mutex<(bool, bool)>>,
    pub powered: Arc<AtomicBool>,
}

impl SharedQuadrature {
    pub fn set(&self, a: bool, b: bool) {
        *self.levels.lock().unwrap_or_else(PoisonError::into_inner) = (a, b);
    }
}

impl QuadratureInput for SharedQuadrature {
    fn read_channels(&mut self) -> HwResult<(bool, bool)> {
        Ok(*self.levels.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn set_sensor_power(&mut self, on: bool) -> HwResult<()> {
        self.powered.store(on, Ordering::Relaxed);
        Ok(())
    }
}

/// Motor that records the last duty cycle and power state.
#[derive(Clone, Default)]
pub struct RecordingMotor {
    pub duty: Arc<AtomicI32>,
    pub powered: Arc<AtomicBool>,
    pub runs: Arc<AtomicU32>,
}

impl Motor for RecordingMotor {
    fn run(&mut self, duty_pct: i16) -> HwResult<()> {
        self.duty.store(i32::from(duty_pct), Ordering::Relaxed);
        self.runs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_power(&mut self, enable: bool) -> HwResult<()> {
        self.powered.store(enable, Ordering::Relaxed);
        Ok(())
    }
}

/// Motor whose driver always fails.
pub struct FailingMotor;

impl Motor for FailingMotor {
    fn run(&mut self, _duty_pct: i16) -> HwResult<()> {
        Err(Box::new(std::io::Error::other("driver fault")))
    }

    fn set_power(&mut self, _enable: bool) -> HwResult<()> {
        Err(Box::new(std::io::Error::other("relay fault")))
    }
}

/// Current sense returning a value set from the test.
#[derive(Clone, Default)]
pub struct FixedCurrent(pub Arc<AtomicI32>);

impl FixedCurrent {
    pub fn set(&self, ma: i32) {
        self.0.store(ma, Ordering::Relaxed);
    }
}

impl CurrentSense for FixedCurrent {
    fn read_ma(&mut self) -> HwResult<i32> {
        Ok(self.0.load(Ordering::Relaxed))
    }
}
