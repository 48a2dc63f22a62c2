#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Motion core of a gate/door controller (hardware-agnostic).
//!
//! All hardware interactions go through the `gate_traits::QuadratureInput`,
//! `gate_traits::Motor` and `gate_traits::CurrentSense` traits.
//!
//! ## Architecture
//!
//! Three periodic loops share state through atomics only:
//!
//! - **Encoder** (`encoder`, 2 ms): debounced quadrature decoding, speed
//!   estimate and end-stop candidates
//! - **Servo** (`servo`, 10 ms): cascaded position/speed PI control, current
//!   supervision and output gating through the fault table (`fault`)
//! - **Door** (`door`, 100 ms): the fifteen-state machine driven by the
//!   coalescing event set (`events`)
//!
//! [`Gate::builder`] wires them together; [`Gate::start`] runs one thread per
//! loop and [`GateHandle`] is the producer/reader entry point.
//!
//! ## Fixed-Point Arithmetic
//!
//! The controllers work in integers with gains scaled by 1000 (`pid::SCALE`);
//! divisions round explicitly via `fixed_point::div_floor`/`div_ceil`.

pub mod builder;
pub mod config;
pub mod conversions;
pub mod door;
pub mod encoder;
pub mod error;
pub mod events;
pub mod fault;
pub mod filter;
pub mod fixed_point;
pub mod hw_error;
pub mod hysteresis;
pub mod mocks;
pub mod pid;
pub mod registry;
pub mod runner;
pub mod servo;
pub mod state;
pub mod util;

pub use builder::{GateBuilder, Missing, Set};
pub use config::{DoorCfg, EncoderCfg, FaultCfg, GateCfg, ServoCfg, Tuning};
pub use door::{Action, DoorController, action_for};
pub use encoder::{Encoder, EncoderHandle, EncoderTask};
pub use error::{BuildError, GateError, Report, Result};
pub use events::{CommandSource, DoorEvent, PendingEvents};
pub use fault::{ActionMask, FAULT_TABLE, FaultKind, FaultSupervisor, Severity};
pub use filter::ExpFilter;
pub use hysteresis::Hysteresis;
pub use pid::Pid;
pub use registry::{Param, Registry};
pub use runner::{Gate, GateHandle, GateStatus, LoopStats, RunningGate};
pub use servo::{ServoHandle, ServoLoop};
pub use state::{CalibrationConfidence, DoorShared, DoorState, StatusBits};
