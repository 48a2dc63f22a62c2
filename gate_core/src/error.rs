use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum GateError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("failed to spawn {0} loop thread")]
    Thread(&'static str),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing quadrature input")]
    MissingEncoder,
    #[error("missing motor")]
    MissingMotor,
    #[error("missing current sense")]
    MissingCurrentSense,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
