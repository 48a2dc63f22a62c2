//! Device backends for the gate controller.
//!
//! - `sim`: a shared simulated plant (always available)
//! - `gpio`: Raspberry Pi GPIO/SPI drivers (`hardware` feature)
//! - `rt`: real-time process setup (`rt` feature, Linux)
pub mod error;
pub mod sim;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

#[cfg(all(feature = "rt", target_os = "linux"))]
pub mod rt;

pub use error::HwError;
pub use sim::{SimCurrent, SimMotor, SimParams, SimPlant, SimQuadrature};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::{GpioQuadrature, HBridgeMotor, Mcp3008Current, open_gpio};
