//! Door state machine.
//!
//! Fifteen states, ten events. Every `(state, event)` cell maps to exactly one
//! [`Action`] (see [`action_for`]); an action commands the motion controller,
//! moves the end-stop calibration ladder, arms the retry timer or switches
//! motor power, and returns the next state or `None` for no transition.
//!
//! The door loop is the only writer of the state and both calibration
//! confidences. Other threads post events and read snapshots.

use crate::config::DoorCfg;
use crate::encoder::EncoderHandle;
use crate::events::{DoorEvent, PendingEvents};
use crate::fault::{FaultKind, FaultSupervisor};
use crate::hysteresis::Hysteresis;
use crate::registry::Registry;
use crate::servo::ServoHandle;
use crate::state::{CalibrationConfidence as Conf, DoorShared, DoorState};
use crate::util::{pos_in_range, ticks_for_secs};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    None,
    BeginCalOpen,
    BeginCalClose,
    StopAndEval,
    PauseOpen,
    PauseClose,
    FinalizeOpen,
    OpenFail,
    CloseFail,
    DetectUpper,
    DetectLower,
    RetryOpen,
    RetryClose,
    CmdOpen,
    CmdClose,
    ContinueToLower,
    RetryToLower,
    PowerOnAndEval,
    PowerOff,
}

impl Action {
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "·",
            Self::BeginCalOpen => "BeginCalOpen",
            Self::BeginCalClose => "BeginCalClose",
            Self::StopAndEval => "Stop&Eval",
            Self::PauseOpen => "PauseOpen",
            Self::PauseClose => "PauseClose",
            Self::FinalizeOpen => "FinalizeOpen",
            Self::OpenFail => "OpenFail",
            Self::CloseFail => "CloseFail",
            Self::DetectUpper => "DetectUpper",
            Self::DetectLower => "DetectLower",
            Self::RetryOpen => "RetryOpen",
            Self::RetryClose => "RetryClose",
            Self::CmdOpen => "CmdOpen",
            Self::CmdClose => "CmdClose",
            Self::ContinueToLower => "ContinueToLower",
            Self::RetryToLower => "RetryToLower",
            Self::PowerOnAndEval => "PowerOn&Eval",
            Self::PowerOff => "PowerOff",
        }
    }
}

/// The transition table.
pub const fn action_for(state: DoorState, event: DoorEvent) -> Action {
    use Action as A;
    use DoorEvent as E;
    use DoorState as S;
    match (state, event) {
        (S::UnknownPosition, E::OpenCmd) => A::BeginCalOpen,
        (S::UnknownPosition, E::CloseCmd) => A::BeginCalClose,

        (S::Opening, E::Stop | E::NoMovementDetected) => A::StopAndEval,
        (S::Opening, E::CloseCmd) => A::PauseOpen,
        (S::Opening, E::TargetReached) => A::FinalizeOpen,
        (S::Opening, E::UpperLimitHit | E::OverloadOpening) => A::OpenFail,

        (S::OpeningToMaxStop, E::Stop | E::TargetReached | E::NoMovementDetected) => A::StopAndEval,
        (S::OpeningToMaxStop, E::CloseCmd) => A::PauseOpen,
        (S::OpeningToMaxStop, E::UpperLimitHit | E::OverloadOpening) => A::DetectUpper,

        (S::Open, E::CloseCmd) => A::CmdClose,

        (S::OpeningPaused, E::Stop) => A::StopAndEval,
        (S::OpeningPaused, E::CloseCmd) => A::PauseOpen,
        (S::OpeningPaused, E::TimerExpired) => A::CmdOpen,

        (S::ReleasingAtOpenLimit, E::Stop | E::NoMovementDetected) => A::StopAndEval,
        (S::ReleasingAtOpenLimit, E::CloseCmd) => A::PauseOpen,
        (S::ReleasingAtOpenLimit, E::TargetReached | E::LowerLimitHit | E::OverloadClosing) => {
            A::RetryOpen
        }

        (S::Closing, E::Stop | E::NoMovementDetected) => A::StopAndEval,
        (S::Closing, E::OpenCmd) => A::PauseClose,
        (S::Closing, E::TargetReached) => A::ContinueToLower,
        (S::Closing, E::LowerLimitHit) => A::RetryToLower,
        (S::Closing, E::OverloadClosing) => A::CloseFail,

        (S::ClosingToMinStop, E::Stop | E::TargetReached | E::NoMovementDetected) => A::StopAndEval,
        (S::ClosingToMinStop, E::OpenCmd) => A::PauseClose,
        (S::ClosingToMinStop, E::LowerLimitHit | E::OverloadClosing) => A::DetectLower,

        (S::Closed, E::OpenCmd) => A::CmdOpen,

        (S::ClosingPaused, E::Stop) => A::StopAndEval,
        (S::ClosingPaused, E::OpenCmd) => A::PauseClose,
        (S::ClosingPaused, E::TimerExpired) => A::CmdClose,

        (S::ReleasingAtCloseLimit, E::Stop | E::NoMovementDetected) => A::StopAndEval,
        (S::ReleasingAtCloseLimit, E::OpenCmd) => A::PauseClose,
        (S::ReleasingAtCloseLimit, E::TargetReached | E::UpperLimitHit | E::OverloadOpening) => {
            A::RetryClose
        }

        (S::Intermediate, E::OpenCmd) => A::CmdOpen,
        (S::Intermediate, E::CloseCmd) => A::CmdClose,

        (S::StoppedWhileClosing, E::CloseCmd) => A::CmdClose,
        (S::StoppedWhileClosing, E::TimerExpired) => A::CmdOpen,

        (S::StoppedWhileOpening, E::OpenCmd) => A::CmdOpen,
        (S::StoppedWhileOpening, E::TimerExpired) => A::CmdClose,

        (S::DoorFault, E::Stop | E::OpenCmd | E::CloseCmd) => A::PowerOnAndEval,
        (S::DoorFault, E::TimerExpired) => A::PowerOff,

        _ => A::None,
    }
}

pub struct DoorController {
    cfg: DoorCfg,
    servo: ServoHandle,
    encoder: EncoderHandle,
    faults: Arc<FaultSupervisor>,
    events: Arc<PendingEvents>,
    registry: Arc<Registry>,
    shared: Arc<DoorShared>,
    steady_move: Hysteresis,
    timer: u32,
}

impl DoorController {
    pub fn new(
        cfg: DoorCfg,
        servo: ServoHandle,
        faults: Arc<FaultSupervisor>,
        events: Arc<PendingEvents>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            steady_move: Hysteresis::new(cfg.steady_move_up, cfg.steady_move_down),
            encoder: servo.encoder().clone(),
            cfg,
            servo,
            faults,
            events,
            registry,
            shared: Arc::new(DoorShared::default()),
            timer: 0,
        }
    }

    pub fn shared(&self) -> Arc<DoorShared> {
        Arc::clone(&self.shared)
    }

    pub fn state(&self) -> DoorState {
        self.shared.state()
    }

    /// One door period: percent-open, retry timer, steady-move guard, then
    /// drain pending events in index order.
    pub fn tick(&mut self) {
        self.update_percent();

        if self.timer > 0 {
            self.timer -= 1;
            if self.timer == 0 {
                self.events.post(DoorEvent::TimerExpired);
            }
            self.shared.set_timer(i32::try_from(self.timer).unwrap_or(i32::MAX));
        }

        self.steady_move_guard();

        // Events posted while draining wait for the next tick.
        for ev in PendingEvents::iter_pending(self.events.snapshot()) {
            let from = self.state();
            let action = action_for(from, ev);
            if let Some(to) = self.run(action) {
                if to != from {
                    tracing::info!(from = %from, to = %to, event = %ev, action = action.name(), "door transition");
                }
                self.shared.set_state(to);
            }
            self.events.clear(ev);
        }
    }

    fn update_percent(&self) {
        let r = &self.registry;
        let open = r.open_pulses.get();
        if self.shared.upper() == Conf::Confirmed && self.shared.lower() == Conf::Confirmed && open > 0 {
            let pct = i64::from(self.encoder.position()) * 100 / i64::from(open);
            r.open_percent
                .set_clamped(i32::try_from(pct.clamp(0, 100)).unwrap_or(0));
        } else {
            match self.state() {
                DoorState::Closed => {
                    r.open_percent.set_clamped(0);
                }
                DoorState::Open => {
                    r.open_percent.set_clamped(100);
                }
                _ => {}
            }
        }
    }

    fn steady_move_guard(&mut self) {
        let state = self.state();
        if !state.is_settled() {
            self.steady_move.reset();
            return;
        }
        let deviation = self
            .encoder
            .position()
            .saturating_sub(self.registry.demanded_position.get())
            .abs();
        if self.steady_move.feed_edge(deviation > self.cfg.steady_move_tolerance) {
            let upper = self.shared.upper();
            let lower = self.shared.lower();
            if upper != Conf::NotDetected || lower != Conf::NotDetected || state != DoorState::UnknownPosition {
                tracing::warn!(deviation, state = %state, "unexpected door movement, position unknown");
            }
            self.set_confidence(Conf::NotDetected, Conf::NotDetected);
            self.shared.set_state(DoorState::UnknownPosition);
        }
    }

    fn run(&mut self, action: Action) -> Option<DoorState> {
        match action {
            Action::None => None,
            Action::BeginCalOpen => Some(self.begin_cal_open()),
            Action::BeginCalClose => Some(self.begin_cal_close()),
            Action::StopAndEval => Some(self.stop_and_eval()),
            Action::PauseOpen => Some(self.pause(DoorState::StoppedWhileOpening)),
            Action::PauseClose => Some(self.pause(DoorState::StoppedWhileClosing)),
            Action::FinalizeOpen => Some(self.opened()),
            Action::OpenFail => Some(self.open_fail()),
            Action::CloseFail => Some(self.close_fail()),
            Action::DetectUpper => Some(self.detect_upper()),
            Action::DetectLower => Some(self.detect_lower()),
            Action::RetryOpen => {
                tracing::info!("retrying open end-stop");
                self.servo.change_position(self.cfg.travel_pulses);
                Some(DoorState::OpeningToMaxStop)
            }
            Action::RetryClose => {
                tracing::info!("retrying closed end-stop");
                self.servo.change_position(-self.cfg.travel_pulses);
                Some(DoorState::ClosingToMinStop)
            }
            Action::CmdOpen => Some(self.cmd_open()),
            Action::CmdClose => Some(self.cmd_close()),
            Action::ContinueToLower => self.continue_to_lower(),
            Action::RetryToLower => Some(self.retry_to_lower()),
            Action::PowerOnAndEval => {
                self.servo.motor_power(true);
                Some(self.stop_and_eval())
            }
            Action::PowerOff => {
                self.servo.motor_power(false);
                Some(DoorState::DoorFault)
            }
        }
    }

    fn in_range(&self, min: i32, max: i32) -> bool {
        pos_in_range(self.encoder.position(), min, max)
    }

    fn open_pulses(&self) -> i32 {
        self.registry.open_pulses.get()
    }

    fn set_confidence(&self, upper: Conf, lower: Conf) {
        self.shared.set_upper(upper);
        self.shared.set_lower(lower);
    }

    fn arm_timer(&mut self, secs: u32) {
        self.timer = ticks_for_secs(secs, self.cfg.period_ms);
        self.shared.set_timer(i32::try_from(self.timer).unwrap_or(i32::MAX));
    }

    fn begin_cal_open(&self) -> DoorState {
        tracing::info!(source = %self.events.last_source(), "opening to end-stop");
        self.servo.change_position(self.cfg.travel_pulses);
        DoorState::OpeningToMaxStop
    }

    fn begin_cal_close(&self) -> DoorState {
        tracing::info!(source = %self.events.last_source(), "closing to end-stop");
        self.servo.change_position(-self.cfg.travel_pulses);
        DoorState::ClosingToMinStop
    }

    fn closed(&self) -> DoorState {
        tracing::info!("closed");
        self.servo.stop();
        self.faults.clear(FaultKind::CloseFailure);
        DoorState::Closed
    }

    fn opened(&self) -> DoorState {
        tracing::info!("open");
        self.servo.stop();
        self.faults.clear(FaultKind::OpenFailure);
        DoorState::Open
    }

    fn stop_and_eval(&self) -> DoorState {
        tracing::info!("stop");
        self.servo.stop();
        let (ct, ot) = (self.cfg.close_tolerance, self.cfg.open_tolerance);
        if self.shared.lower() == Conf::Confirmed {
            if self.in_range(-ct, ct) {
                return self.closed();
            }
            if self.shared.upper() == Conf::Confirmed {
                let open = self.open_pulses();
                if self.in_range(open - 2 * ot, open + ot) {
                    return self.opened();
                }
                return DoorState::Intermediate;
            }
        }
        DoorState::UnknownPosition
    }

    fn pause(&mut self, next: DoorState) -> DoorState {
        self.servo.stop();
        self.arm_timer(self.cfg.pause_secs);
        next
    }

    fn detect_upper(&self) -> DoorState {
        let next = self.shared.upper().next();
        self.registry.open_pulses.set_clamped(self.encoder.position());
        self.servo.stop();
        if next < Conf::Confirmed {
            tracing::info!(confidence = %next, "releasing from open end-stop");
            self.shared.set_upper(next);
            self.servo.change_position(-self.cfg.release_pulses);
            DoorState::ReleasingAtOpenLimit
        } else {
            self.shared.set_upper(Conf::Confirmed);
            self.opened()
        }
    }

    fn detect_lower(&self) -> DoorState {
        let next = self.shared.lower().next();
        self.servo.stop();
        if next < Conf::Confirmed {
            tracing::info!(confidence = %next, "releasing from closed end-stop");
            self.shared.set_lower(next);
            self.servo.change_position(self.cfg.release_pulses);
            DoorState::ReleasingAtCloseLimit
        } else {
            self.shared.set_lower(Conf::Confirmed);
            if self.shared.upper() == Conf::Confirmed {
                let learned = self.open_pulses() - self.encoder.position();
                self.registry.open_pulses.set_clamped(learned);
                if pos_in_range(learned, self.cfg.min_open_pulses, self.cfg.max_open_pulses) {
                    tracing::info!(open_pulses = learned, "open travel learned");
                } else {
                    tracing::warn!(
                        open_pulses = learned,
                        min = self.cfg.min_open_pulses,
                        max = self.cfg.max_open_pulses,
                        "learned open travel outside the expected window"
                    );
                }
            }
            self.encoder.set_position(0);
            self.closed()
        }
    }

    fn open_fail(&mut self) -> DoorState {
        self.servo.stop();
        let (open, ot) = (self.open_pulses(), self.cfg.open_tolerance);
        if self.in_range(open - 2 * ot, open + 2 * ot) {
            return self.opened();
        }
        if self.faults.check(FaultKind::OpenFailure, true) {
            return self.enter_fault(self.cfg.open_fault_secs, Some(FaultKind::OpenFailure));
        }
        tracing::warn!(attempt = self.faults.count(FaultKind::OpenFailure), "open interrupted, retrying");
        self.arm_timer(self.cfg.pause_secs);
        DoorState::OpeningPaused
    }

    fn close_fail(&mut self) -> DoorState {
        self.servo.stop();
        if self.faults.check(FaultKind::CloseFailure, true) {
            return self.enter_fault(self.cfg.close_fault_secs, Some(FaultKind::CloseFailure));
        }
        tracing::warn!(attempt = self.faults.count(FaultKind::CloseFailure), "close interrupted, retrying");
        self.arm_timer(self.cfg.pause_secs);
        DoorState::ClosingPaused
    }

    /// Forget calibration and wait in the fault state. `rearm` restarts the
    /// retry budget of the failure row that brought us here.
    fn enter_fault(&mut self, secs: u32, rearm: Option<FaultKind>) -> DoorState {
        self.set_confidence(Conf::NotDetected, Conf::NotDetected);
        if let Some(kind) = rearm {
            self.faults.rearm(kind);
        }
        self.arm_timer(secs);
        DoorState::DoorFault
    }

    fn cmd_open(&self) -> DoorState {
        if self.shared.upper() != Conf::Confirmed {
            return self.begin_cal_open();
        }
        tracing::info!(source = %self.events.last_source(), "opening");
        self.servo.set_position(self.open_pulses() + self.cfg.open_tolerance);
        DoorState::Opening
    }

    fn cmd_close(&self) -> DoorState {
        if self.shared.lower() != Conf::Confirmed {
            return self.begin_cal_close();
        }
        tracing::info!(source = %self.events.last_source(), "closing");
        self.servo.set_position(-self.cfg.close_tolerance);
        DoorState::Closing
    }

    /// Reached the closing target without meeting the stop: keep going a
    /// little further, or give up once past the full travel.
    fn continue_to_lower(&mut self) -> Option<DoorState> {
        if self.encoder.position() < -self.cfg.travel_pulses {
            tracing::error!(position = self.encoder.position(), "closed end-stop not found");
            self.servo.stop();
            return Some(self.enter_fault(self.cfg.close_fault_secs, None));
        }
        self.set_confidence(Conf::NotDetected, Conf::NotDetected);
        self.servo.change_position(-self.cfg.release_pulses);
        None
    }

    /// Met the closed stop before the target: re-zero on it.
    fn retry_to_lower(&self) -> DoorState {
        self.servo.stop();
        let ct = self.cfg.close_tolerance;
        if self.in_range(-ct, ct) {
            return self.closed();
        }
        self.encoder.set_position(0);
        self.servo.stop();
        self.set_confidence(Conf::NotDetected, Conf::Confirmed);
        tracing::info!("closed origin re-zeroed");
        DoorState::Closed
    }
}
