use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("encoder sensor is unpowered")]
    SensorUnpowered,
    #[error("real-time setup: {0}")]
    Rt(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
