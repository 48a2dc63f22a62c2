//! Declarative fault supervision.
//!
//! Every fault is a row in [`FAULT_TABLE`]: how long the raw condition must
//! persist, which motions it blocks while latched, which commands clear it,
//! how loudly it is logged and which door event it raises. The supervisor owns
//! one debounce filter and one latch per row.
//!
//! Writers: the control loop feeds the sensing rows, the door loop feeds the
//! two end-stop failure rows and clears latches through motion commands.

use crate::events::{DoorEvent, PendingEvents};
use crate::hysteresis::Hysteresis;
use bitflags::bitflags;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of activations kept in the history ring.
pub const HISTORY_LEN: usize = 16;

bitflags! {
    /// Motions a fault blocks, or commands that clear it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActionMask: u8 {
        const MOVE_UP = 0x01;
        const MOVE_DOWN = 0x02;
        /// Blocks the motor output in both directions without stopping the loops.
        const MOVE_CTRL_BLOCK = 0x04;
        /// Drops the latch as soon as the debounced condition falls.
        const SELF_CLEAR = 0x08;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Empty,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaultKind {
    UpperLimit = 0,
    LowerLimit = 1,
    OverloadOpenSlow = 2,
    OverloadCloseSlow = 3,
    OverloadOpenFast = 4,
    OverloadCloseFast = 5,
    NoMovement = 6,
    TargetReached = 7,
    CloseFailure = 8,
    OpenFailure = 9,
}

impl FaultKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::UpperLimit => "upper_limit",
            Self::LowerLimit => "lower_limit",
            Self::OverloadOpenSlow => "overload_open",
            Self::OverloadCloseSlow => "overload_close",
            Self::OverloadOpenFast => "overload_open_fast",
            Self::OverloadCloseFast => "overload_close_fast",
            Self::NoMovement => "no_movement",
            Self::TargetReached => "target_reached",
            Self::CloseFailure => "close_failure",
            Self::OpenFailure => "open_failure",
        }
    }

    #[inline]
    pub fn definition(self) -> &'static FaultDefinition {
        &FAULT_TABLE[self as usize]
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct FaultDefinition {
    pub kind: FaultKind,
    pub debounce_up: u32,
    pub debounce_down: u32,
    pub blocks: ActionMask,
    pub cleared_by: ActionMask,
    pub message: &'static str,
    pub code: u8,
    pub severity: Severity,
    pub raises: Option<DoorEvent>,
}

const UP: ActionMask = ActionMask::MOVE_UP;
const DOWN: ActionMask = ActionMask::MOVE_DOWN;
const CTRL: ActionMask = ActionMask::MOVE_CTRL_BLOCK;
const SELF_CLR: ActionMask = ActionMask::SELF_CLEAR;
const BOTH: ActionMask = UP.union(DOWN);

#[allow(clippy::too_many_arguments)]
const fn row(
    kind: FaultKind,
    debounce_up: u32,
    debounce_down: u32,
    blocks: ActionMask,
    cleared_by: ActionMask,
    message: &'static str,
    code: u8,
    severity: Severity,
    raises: Option<DoorEvent>,
) -> FaultDefinition {
    FaultDefinition {
        kind,
        debounce_up,
        debounce_down,
        blocks,
        cleared_by,
        message,
        code,
        severity,
        raises,
    }
}

/// Indexed by `FaultKind as usize`.
pub static FAULT_TABLE: [FaultDefinition; 10] = [
    row(FaultKind::UpperLimit, 100, 100, UP, DOWN.union(SELF_CLR), "open end-stop reached", 4, Severity::Info, Some(DoorEvent::UpperLimitHit)),
    row(FaultKind::LowerLimit, 100, 100, DOWN, UP.union(SELF_CLR), "closed end-stop reached", 8, Severity::Info, Some(DoorEvent::LowerLimitHit)),
    row(FaultKind::OverloadOpenSlow, 2, 10, UP.union(CTRL), BOTH, "overcurrent while opening", 1, Severity::Warning, Some(DoorEvent::OverloadOpening)),
    row(FaultKind::OverloadCloseSlow, 2, 10, DOWN.union(CTRL), BOTH, "overcurrent while closing", 5, Severity::Warning, Some(DoorEvent::OverloadClosing)),
    row(FaultKind::OverloadOpenFast, 34, 30, UP.union(CTRL), BOTH, "high current while opening", 2, Severity::Error, Some(DoorEvent::OverloadOpening)),
    row(FaultKind::OverloadCloseFast, 34, 30, DOWN.union(CTRL), BOTH, "high current while closing", 6, Severity::Error, Some(DoorEvent::OverloadClosing)),
    row(FaultKind::NoMovement, 1, 100, BOTH, BOTH, "no position change detected", 7, Severity::Error, Some(DoorEvent::NoMovementDetected)),
    row(FaultKind::TargetReached, 10, 20, ActionMask::empty(), BOTH, "", 0, Severity::Empty, Some(DoorEvent::TargetReached)),
    row(FaultKind::CloseFailure, 25, 100, CTRL, BOTH, "unable to close", 9, Severity::Error, None),
    row(FaultKind::OpenFailure, 25, 100, CTRL, BOTH, "unable to open", 10, Severity::Error, None),
];

/// One entry of the activation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRecord {
    pub seq: u32,
    pub kind: FaultKind,
    pub code: u8,
}

#[derive(Debug)]
struct FaultState {
    def: &'static FaultDefinition,
    filter: Mutex<Hysteresis>,
    active: AtomicBool,
    activated_seq: AtomicU32,
}

impl FaultState {
    fn filter(&self) -> MutexGuard<'_, Hysteresis> {
        self.filter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct FaultSupervisor {
    states: Vec<FaultState>,
    events: Arc<PendingEvents>,
    seq: AtomicU32,
    history: Mutex<VecDeque<FaultRecord>>,
}

impl FaultSupervisor {
    pub fn new(events: Arc<PendingEvents>) -> Self {
        let states = FAULT_TABLE
            .iter()
            .map(|def| FaultState {
                def,
                filter: Mutex::new(Hysteresis::new(def.debounce_up, def.debounce_down)),
                active: AtomicBool::new(false),
                activated_seq: AtomicU32::new(0),
            })
            .collect();
        Self {
            states,
            events,
            seq: AtomicU32::new(0),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }

    fn state(&self, kind: FaultKind) -> &FaultState {
        &self.states[kind as usize]
    }

    /// Override the debounce counts of a row (startup configuration).
    pub fn set_debounce(&mut self, kind: FaultKind, up: u32, down: u32) {
        self.states[kind as usize]
            .filter
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .set_max(up, down);
    }

    pub fn debounce(&self, kind: FaultKind) -> (u32, u32) {
        self.state(kind).filter().limits()
    }

    /// Feed the raw condition of `kind` and return whether the fault is latched.
    pub fn check(&self, kind: FaultKind, raw: bool) -> bool {
        let st = self.state(kind);
        let (rose, filtered) = {
            let mut f = st.filter();
            let rose = f.feed_edge(raw);
            (rose, f.output())
        };
        if rose {
            self.activate(st);
        } else if !filtered && st.def.cleared_by.contains(ActionMask::SELF_CLEAR) {
            st.active.store(false, Ordering::Release);
        }
        st.active.load(Ordering::Acquire)
    }

    fn activate(&self, st: &FaultState) {
        let def = st.def;
        let seq = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        st.activated_seq.store(seq, Ordering::Release);
        st.active.store(true, Ordering::Release);

        match def.severity {
            Severity::Error => tracing::error!(fault = %def.kind, code = def.code, "{}", def.message),
            Severity::Warning => tracing::warn!(fault = %def.kind, code = def.code, "{}", def.message),
            Severity::Info => tracing::info!(fault = %def.kind, code = def.code, "{}", def.message),
            Severity::Empty => tracing::debug!(fault = %def.kind, "fault latched"),
        }

        if def.code != 0 {
            let mut h = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if h.len() == HISTORY_LEN {
                h.pop_front();
            }
            h.push_back(FaultRecord {
                seq,
                kind: def.kind,
                code: def.code,
            });
        }

        if let Some(ev) = def.raises {
            self.events.post(ev);
        }
    }

    pub fn is_active(&self, kind: FaultKind) -> bool {
        self.state(kind).active.load(Ordering::Acquire)
    }

    /// True if any latched fault blocks any motion in `mask`.
    pub fn is_blocked(&self, mask: ActionMask) -> bool {
        self.states
            .iter()
            .any(|s| s.active.load(Ordering::Acquire) && s.def.blocks.intersects(mask))
    }

    /// Drop the latch of every fault cleared by any action in `mask`.
    ///
    /// Filters are left alone, so a condition that is still present does not
    /// re-latch until it falls and rises again. The end-stop failure rows rely
    /// on this: their count keeps growing across retries.
    pub fn clear_action_all(&self, mask: ActionMask) {
        for s in &self.states {
            if s.def.cleared_by.intersects(mask) && s.active.swap(false, Ordering::AcqRel) {
                tracing::trace!(fault = %s.def.kind, "fault cleared by command");
            }
        }
    }

    /// Drop the latch and reset the filter of one row.
    pub fn clear(&self, kind: FaultKind) {
        let st = self.state(kind);
        st.filter().reset();
        st.active.store(false, Ordering::Release);
    }

    /// Reset the filter of one row but keep its latch, so the next confirmed
    /// occurrence raises again.
    pub fn rearm(&self, kind: FaultKind) {
        self.state(kind).filter().reset();
    }

    /// Current debounce progress of a row (retry count for the failure rows).
    pub fn count(&self, kind: FaultKind) -> u32 {
        self.state(kind).filter().count()
    }

    pub fn active(&self) -> Vec<FaultKind> {
        self.states
            .iter()
            .filter(|s| s.active.load(Ordering::Acquire))
            .map(|s| s.def.kind)
            .collect()
    }

    /// Code of the most recently latched fault that is still active, 0 if none.
    pub fn error_code(&self) -> u8 {
        self.states
            .iter()
            .filter(|s| s.active.load(Ordering::Acquire) && s.def.code != 0)
            .max_by_key(|s| s.activated_seq.load(Ordering::Acquire))
            .map_or(0, |s| s.def.code)
    }

    /// Most recent activations, oldest first.
    pub fn history(&self) -> Vec<FaultRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sup() -> (FaultSupervisor, Arc<PendingEvents>) {
        let ev = Arc::new(PendingEvents::new());
        (FaultSupervisor::new(Arc::clone(&ev)), ev)
    }

    fn feed(s: &FaultSupervisor, kind: FaultKind, raw: bool, n: u32) -> bool {
        let mut last = false;
        for _ in 0..n {
            last = s.check(kind, raw);
        }
        last
    }

    #[test]
    fn table_is_indexed_by_kind() {
        for (i, def) in FAULT_TABLE.iter().enumerate() {
            assert_eq!(def.kind as usize, i);
        }
    }

    #[test]
    fn overload_latches_after_debounce_and_posts_event() {
        let (s, ev) = sup();
        assert!(!s.check(FaultKind::OverloadCloseSlow, true));
        assert!(s.check(FaultKind::OverloadCloseSlow, true));
        assert!(ev.is_pending(DoorEvent::OverloadClosing));
        assert_eq!(s.error_code(), 5);
        assert_eq!(s.history().len(), 1);
    }

    #[rstest]
    #[case(FaultKind::OverloadOpenSlow, ActionMask::MOVE_UP, true)]
    #[case(FaultKind::OverloadOpenSlow, ActionMask::MOVE_DOWN, false)]
    #[case(FaultKind::OverloadOpenSlow, ActionMask::MOVE_CTRL_BLOCK, true)]
    #[case(FaultKind::NoMovement, ActionMask::MOVE_DOWN, true)]
    #[case(FaultKind::TargetReached, ActionMask::all(), false)]
    #[case(FaultKind::CloseFailure, ActionMask::MOVE_UP, false)]
    fn blocking_masks(#[case] kind: FaultKind, #[case] mask: ActionMask, #[case] blocked: bool) {
        let (s, _ev) = sup();
        let (up, _) = s.debounce(kind);
        assert!(feed(&s, kind, true, up));
        assert_eq!(s.is_blocked(mask), blocked);
    }

    #[test]
    fn opposing_command_clears_latch() {
        let (s, _ev) = sup();
        feed(&s, FaultKind::OverloadOpenSlow, true, 2);
        assert!(s.is_blocked(ActionMask::MOVE_UP));
        s.clear_action_all(ActionMask::MOVE_DOWN);
        assert!(!s.is_blocked(ActionMask::MOVE_UP));
        // Still-present condition does not re-latch without a new edge.
        assert!(!s.check(FaultKind::OverloadOpenSlow, true));
    }

    #[test]
    fn limit_self_clears_when_condition_falls() {
        let (s, ev) = sup();
        assert!(feed(&s, FaultKind::UpperLimit, true, 100));
        assert!(ev.is_pending(DoorEvent::UpperLimitHit));
        assert!(s.check(FaultKind::UpperLimit, false));
        assert!(!feed(&s, FaultKind::UpperLimit, false, 99));
    }

    #[test]
    fn limit_is_not_cleared_by_same_direction() {
        let (s, _ev) = sup();
        feed(&s, FaultKind::UpperLimit, true, 100);
        s.clear_action_all(ActionMask::MOVE_UP);
        assert!(s.is_active(FaultKind::UpperLimit));
        s.clear_action_all(ActionMask::MOVE_DOWN);
        assert!(!s.is_active(FaultKind::UpperLimit));
    }

    #[test]
    fn failure_budget_accumulates_across_clears() {
        let (mut s, _ev) = sup();
        s.set_debounce(FaultKind::CloseFailure, 3, 100);
        assert!(!s.check(FaultKind::CloseFailure, true));
        s.clear_action_all(ActionMask::all());
        assert!(!s.check(FaultKind::CloseFailure, true));
        s.clear_action_all(ActionMask::all());
        assert!(s.check(FaultKind::CloseFailure, true));
        assert_eq!(s.error_code(), 9);
    }

    #[test]
    fn rearm_keeps_latch_and_restarts_budget() {
        let (mut s, _ev) = sup();
        s.set_debounce(FaultKind::OpenFailure, 2, 100);
        feed(&s, FaultKind::OpenFailure, true, 2);
        s.rearm(FaultKind::OpenFailure);
        assert!(s.is_active(FaultKind::OpenFailure));
        assert_eq!(s.count(FaultKind::OpenFailure), 0);
        s.clear(FaultKind::OpenFailure);
        assert!(!s.is_active(FaultKind::OpenFailure));
    }

    #[test]
    fn history_is_bounded() {
        let (s, _ev) = sup();
        for _ in 0..20 {
            feed(&s, FaultKind::NoMovement, true, 1);
            s.clear(FaultKind::NoMovement);
        }
        let h = s.history();
        assert_eq!(h.len(), HISTORY_LEN);
        assert!(h.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn target_reached_is_silent_in_history() {
        let (s, ev) = sup();
        feed(&s, FaultKind::TargetReached, true, 10);
        assert!(ev.is_pending(DoorEvent::TargetReached));
        assert!(s.history().is_empty());
        assert_eq!(s.error_code(), 0);
    }
}
