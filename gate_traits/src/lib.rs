//! Hardware seams for the gate motion core.
//!
//! The core never talks to GPIO, PWM or ADC peripherals directly; it goes through
//! these traits so the same control code runs against the simulator, test mocks
//! and the Raspberry Pi drivers.
pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Two-channel quadrature input (A/B), sampled by the encoder loop.
pub trait QuadratureInput {
    /// Current raw levels of channel A and channel B.
    fn read_channels(&mut self) -> HwResult<(bool, bool)>;

    /// Switch the sensor supply. Inputs without a switchable supply ignore this.
    fn set_sensor_power(&mut self, _on: bool) -> HwResult<()> {
        Ok(())
    }
}

/// H-bridge driven DC motor.
pub trait Motor {
    /// Signed duty cycle in percent, `-100..=100`. Positive drives towards open.
    fn run(&mut self, duty_pct: i16) -> HwResult<()>;
    /// Main power switch of the driver, independent of the duty cycle.
    fn set_power(&mut self, enable: bool) -> HwResult<()>;
}

/// Motor current measurement.
pub trait CurrentSense {
    /// Instantaneous motor current in milliamps.
    fn read_ma(&mut self) -> HwResult<i32>;
}

impl<T: QuadratureInput + ?Sized> QuadratureInput for Box<T> {
    fn read_channels(&mut self) -> HwResult<(bool, bool)> {
        (**self).read_channels()
    }

    fn set_sensor_power(&mut self, on: bool) -> HwResult<()> {
        (**self).set_sensor_power(on)
    }
}

impl<T: Motor + ?Sized> Motor for Box<T> {
    fn run(&mut self, duty_pct: i16) -> HwResult<()> {
        (**self).run(duty_pct)
    }

    fn set_power(&mut self, enable: bool) -> HwResult<()> {
        (**self).set_power(enable)
    }
}

impl<T: CurrentSense + ?Sized> CurrentSense for Box<T> {
    fn read_ma(&mut self) -> HwResult<i32> {
        (**self).read_ma()
    }
}
