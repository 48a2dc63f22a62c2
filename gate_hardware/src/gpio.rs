//! Raspberry Pi drivers: quadrature input on two GPIO lines, an H-bridge
//! (software PWM plus direction and enable lines) and an MCP3008 ADC reading
//! the motor shunt.

use crate::error::{HwError, Result};
use gate_traits::{CurrentSense, HwResult, Motor, QuadratureInput};
use rppal::gpio::{Gpio, InputPin, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use tracing::trace;

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

fn output(gpio: &Gpio, pin: u8) -> Result<OutputPin> {
    Ok(gpio.get(pin).map_err(gpio_err)?.into_output_low())
}

/// Open the GPIO peripheral (`/dev/gpiomem`).
pub fn open_gpio() -> Result<Gpio> {
    Gpio::new().map_err(gpio_err)
}

pub struct GpioQuadrature {
    a: InputPin,
    b: InputPin,
    power: Option<OutputPin>,
}

impl GpioQuadrature {
    pub fn new(gpio: &Gpio, a: u8, b: u8, power: Option<u8>) -> Result<Self> {
        Ok(Self {
            a: gpio.get(a).map_err(gpio_err)?.into_input_pullup(),
            b: gpio.get(b).map_err(gpio_err)?.into_input_pullup(),
            power: power.map(|p| output(gpio, p)).transpose()?,
        })
    }
}

impl QuadratureInput for GpioQuadrature {
    fn read_channels(&mut self) -> HwResult<(bool, bool)> {
        Ok((self.a.is_high(), self.b.is_high()))
    }

    fn set_sensor_power(&mut self, on: bool) -> HwResult<()> {
        if let Some(p) = self.power.as_mut() {
            if on { p.set_high() } else { p.set_low() }
        }
        Ok(())
    }
}

pub struct HBridgeMotor {
    pwm: OutputPin,
    dir: OutputPin,
    enable: Option<OutputPin>,
    pwm_hz: f64,
    last_duty: i16,
}

impl HBridgeMotor {
    pub fn new(gpio: &Gpio, pwm: u8, dir: u8, enable: Option<u8>, pwm_hz: u32) -> Result<Self> {
        Ok(Self {
            pwm: output(gpio, pwm)?,
            dir: output(gpio, dir)?,
            enable: enable.map(|p| output(gpio, p)).transpose()?,
            pwm_hz: f64::from(pwm_hz),
            last_duty: 0,
        })
    }
}

impl Motor for HBridgeMotor {
    fn run(&mut self, duty_pct: i16) -> HwResult<()> {
        let duty = duty_pct.clamp(-100, 100);
        if duty == self.last_duty {
            return Ok(());
        }
        self.last_duty = duty;
        if duty == 0 {
            self.pwm.clear_pwm().map_err(gpio_err)?;
            self.pwm.set_low();
            return Ok(());
        }
        if duty > 0 { self.dir.set_high() } else { self.dir.set_low() }
        self.pwm
            .set_pwm_frequency(self.pwm_hz, f64::from(duty.unsigned_abs()) / 100.0)
            .map_err(gpio_err)?;
        trace!(duty, "h-bridge duty");
        Ok(())
    }

    fn set_power(&mut self, enable: bool) -> HwResult<()> {
        match self.enable.as_mut() {
            Some(p) if enable => p.set_high(),
            Some(p) => p.set_low(),
            None => {}
        }
        Ok(())
    }
}

impl Drop for HBridgeMotor {
    fn drop(&mut self) {
        let _ = self.pwm.clear_pwm();
        self.pwm.set_low();
        if let Some(p) = self.enable.as_mut() {
            p.set_low();
        }
    }
}

/// Motor current from one MCP3008 channel on SPI0/CE0.
pub struct Mcp3008Current {
    spi: Spi,
    channel: u8,
    ma_per_count: i32,
}

impl Mcp3008Current {
    pub fn new(channel: u8, ma_per_count: u32) -> Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_000_000, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self {
            spi,
            channel: channel & 0x07,
            ma_per_count: i32::try_from(ma_per_count).unwrap_or(i32::MAX),
        })
    }

    fn read_raw(&mut self) -> Result<u16> {
        let tx = [0x01, (0x08 | self.channel) << 4, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok((u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]))
    }
}

impl CurrentSense for Mcp3008Current {
    fn read_ma(&mut self) -> HwResult<i32> {
        let raw = self.read_raw()?;
        Ok(i32::from(raw).saturating_mul(self.ma_per_count))
    }
}
