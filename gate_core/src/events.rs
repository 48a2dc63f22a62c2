//! Pending door events.
//!
//! Producers on any thread OR a bit into a single atomic word; the door loop
//! drains the bits in index order and clears each one after running its action.
//! Posting an event that is already pending is a no-op: repeated identical
//! events between two drains coalesce into one occurrence.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// The ten door events, in drain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DoorEvent {
    Stop = 0,
    OpenCmd = 1,
    CloseCmd = 2,
    TargetReached = 3,
    LowerLimitHit = 4,
    UpperLimitHit = 5,
    OverloadOpening = 6,
    OverloadClosing = 7,
    NoMovementDetected = 8,
    TimerExpired = 9,
}

impl DoorEvent {
    pub const ALL: [Self; 10] = [
        Self::Stop,
        Self::OpenCmd,
        Self::CloseCmd,
        Self::TargetReached,
        Self::LowerLimitHit,
        Self::UpperLimitHit,
        Self::OverloadOpening,
        Self::OverloadClosing,
        Self::NoMovementDetected,
        Self::TimerExpired,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::OpenCmd => "open",
            Self::CloseCmd => "close",
            Self::TargetReached => "target",
            Self::LowerLimitHit => "low_limit",
            Self::UpperLimitHit => "high_limit",
            Self::OverloadOpening => "overload_open",
            Self::OverloadClosing => "overload_close",
            Self::NoMovementDetected => "no_move",
            Self::TimerExpired => "timer",
        }
    }
}

impl fmt::Display for DoorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who asked for the most recent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CommandSource {
    #[default]
    None = 0,
    Button = 1,
    LightAutomation = 2,
    Schedule = 3,
    RemoteRegister = 4,
    Web = 5,
    Unknown = 6,
}

impl CommandSource {
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Button,
            2 => Self::LightAutomation,
            3 => Self::Schedule,
            4 => Self::RemoteRegister,
            5 => Self::Web,
            _ => Self::Unknown,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Button => "button",
            Self::LightAutomation => "light",
            Self::Schedule => "schedule",
            Self::RemoteRegister => "remote",
            Self::Web => "web",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CommandSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Atomic event bitmask shared by every producer and the door loop.
#[derive(Debug, Default)]
pub struct PendingEvents {
    bits: AtomicU32,
    source: AtomicU8,
}

impl PendingEvents {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            source: AtomicU8::new(CommandSource::None as u8),
        }
    }

    /// Mark `ev` pending. Returns false if it was already pending (coalesced).
    pub fn post(&self, ev: DoorEvent) -> bool {
        let prev = self.bits.fetch_or(ev.bit(), Ordering::AcqRel);
        prev & ev.bit() == 0
    }

    /// Mark `ev` pending and record who asked for it.
    pub fn post_from(&self, ev: DoorEvent, source: CommandSource) -> bool {
        self.source.store(source as u8, Ordering::Release);
        tracing::info!(event = %ev, %source, "command received");
        self.post(ev)
    }

    #[inline]
    pub fn snapshot(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pending(&self, ev: DoorEvent) -> bool {
        self.snapshot() & ev.bit() != 0
    }

    /// Clear a single bit after its action ran.
    pub fn clear(&self, ev: DoorEvent) {
        self.bits.fetch_and(!ev.bit(), Ordering::AcqRel);
    }

    /// Events pending in `snapshot`, in drain order.
    pub fn iter_pending(snapshot: u32) -> impl Iterator<Item = DoorEvent> {
        DoorEvent::ALL
            .into_iter()
            .filter(move |e| snapshot & e.bit() != 0)
    }

    pub fn last_source(&self) -> CommandSource {
        CommandSource::from_u8(self.source.load(Ordering::Acquire))
    }
}
