//! Door state, calibration confidence and the outbound status word.

use bitflags::bitflags;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

/// The fifteen door states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DoorState {
    #[default]
    UnknownPosition = 0,
    Opening = 1,
    OpeningToMaxStop = 2,
    Open = 3,
    OpeningPaused = 4,
    ReleasingAtOpenLimit = 5,
    Closing = 6,
    ClosingToMinStop = 7,
    Closed = 8,
    ClosingPaused = 9,
    ReleasingAtCloseLimit = 10,
    Intermediate = 11,
    StoppedWhileClosing = 12,
    StoppedWhileOpening = 13,
    DoorFault = 14,
}

impl DoorState {
    pub const ALL: [Self; 15] = [
        Self::UnknownPosition,
        Self::Opening,
        Self::OpeningToMaxStop,
        Self::Open,
        Self::OpeningPaused,
        Self::ReleasingAtOpenLimit,
        Self::Closing,
        Self::ClosingToMinStop,
        Self::Closed,
        Self::ClosingPaused,
        Self::ReleasingAtCloseLimit,
        Self::Intermediate,
        Self::StoppedWhileClosing,
        Self::StoppedWhileOpening,
        Self::DoorFault,
    ];

    /// States in which no commanded motion is expected.
    pub const fn is_settled(self) -> bool {
        matches!(
            self,
            Self::UnknownPosition | Self::Open | Self::Closed | Self::Intermediate
        )
    }

    pub const fn from_u8(v: u8) -> Option<Self> {
        if (v as usize) < Self::ALL.len() {
            Some(Self::ALL[v as usize])
        } else {
            None
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::UnknownPosition => "UnknownPosition",
            Self::Opening => "Opening",
            Self::OpeningToMaxStop => "OpeningToMaxStop",
            Self::Open => "Open",
            Self::OpeningPaused => "OpeningPaused",
            Self::ReleasingAtOpenLimit => "ReleasingAtOpenLimit",
            Self::Closing => "Closing",
            Self::ClosingToMinStop => "ClosingToMinStop",
            Self::Closed => "Closed",
            Self::ClosingPaused => "ClosingPaused",
            Self::ReleasingAtCloseLimit => "ReleasingAtCloseLimit",
            Self::Intermediate => "Intermediate",
            Self::StoppedWhileClosing => "StoppedWhileClosing",
            Self::StoppedWhileOpening => "StoppedWhileOpening",
            Self::DoorFault => "DoorFault",
        }
    }

    /// Status bits reported while in this state.
    pub const fn status_bits(self) -> StatusBits {
        match self {
            Self::Opening => StatusBits::OPENING,
            Self::OpeningToMaxStop | Self::ReleasingAtOpenLimit => StatusBits::OPENING_TO_STOP,
            Self::Closing => StatusBits::CLOSING,
            Self::ClosingToMinStop | Self::ReleasingAtCloseLimit => StatusBits::CLOSING_TO_STOP,
            Self::Open => StatusBits::OPEN,
            Self::Closed => StatusBits::CLOSED,
            Self::DoorFault => StatusBits::FAULT,
            _ => StatusBits::empty(),
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Compact status word for external readers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusBits: u16 {
        const OPENING = 0x0001;
        const CLOSING = 0x0002;
        const OPENING_TO_STOP = 0x0004;
        const CLOSING_TO_STOP = 0x0008;
        const OPEN = 0x0010;
        const CLOSED = 0x0020;
        const FAULT = 0x8000;
    }
}

/// How far the controller trusts an end-stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum CalibrationConfidence {
    #[default]
    NotDetected = 0,
    Detected = 1,
    Confirmed = 2,
}

impl CalibrationConfidence {
    /// One step up the ladder, saturating at `Confirmed`.
    pub const fn next(self) -> Self {
        match self {
            Self::NotDetected => Self::Detected,
            Self::Detected | Self::Confirmed => Self::Confirmed,
        }
    }

    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NotDetected,
            1 => Self::Detected,
            _ => Self::Confirmed,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::NotDetected => "not_detected",
            Self::Detected => "detected",
            Self::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for CalibrationConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values written only by the door loop and read by everyone else.
#[derive(Debug, Default)]
pub struct DoorShared {
    state: AtomicU8,
    upper: AtomicU8,
    lower: AtomicU8,
    timer: AtomicI32,
}

impl DoorShared {
    pub fn state(&self) -> DoorState {
        DoorState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub(crate) fn set_state(&self, s: DoorState) {
        self.state.store(s as u8, Ordering::Release);
    }

    pub fn upper(&self) -> CalibrationConfidence {
        CalibrationConfidence::from_u8(self.upper.load(Ordering::Acquire))
    }

    pub fn lower(&self) -> CalibrationConfidence {
        CalibrationConfidence::from_u8(self.lower.load(Ordering::Acquire))
    }

    pub(crate) fn set_upper(&self, c: CalibrationConfidence) {
        self.upper.store(c as u8, Ordering::Release);
    }

    pub(crate) fn set_lower(&self, c: CalibrationConfidence) {
        self.lower.store(c as u8, Ordering::Release);
    }

    /// Remaining door-loop ticks on the retry/resume timer (0 = idle).
    pub fn timer_ticks(&self) -> i32 {
        self.timer.load(Ordering::Acquire)
    }

    pub(crate) fn set_timer(&self, ticks: i32) {
        self.timer.store(ticks, Ordering::Release);
    }
}
