//! Motion controller.
//!
//! [`ServoLoop`] runs on the control thread and owns the motor, the current
//! sensor and two cascaded PI stages: position error → demanded speed →
//! PWM duty. Around the cascade it evaluates the sensing faults (target,
//! stall, end-stops, overcurrent) and gates the output by whatever the
//! supervisor currently blocks.
//!
//! [`ServoHandle`] is the command side used by the door loop. It only writes
//! the shared demand and flags; the loop picks them up on its next tick.

use crate::config::ServoCfg;
use crate::encoder::EncoderHandle;
use crate::fault::{ActionMask, FaultKind, FaultSupervisor};
use crate::filter::ExpFilter;
use crate::pid::Pid;
use crate::registry::Registry;
use gate_traits::{Clock, CurrentSense, Motor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

const POWER_NONE: u8 = 0;
const POWER_ON: u8 = 1;
const POWER_OFF: u8 = 2;

/// Smoothing weight of the motor current reading.
const CURRENT_FILTER_WEIGHT: u16 = 16;

#[derive(Debug)]
struct ServoShared {
    stopped: AtomicBool,
    pid_reset: AtomicBool,
    power_request: AtomicU8,
    powered: AtomicBool,
}

/// Command side of the motion controller, cloneable across threads.
#[derive(Clone)]
pub struct ServoHandle {
    shared: Arc<ServoShared>,
    registry: Arc<Registry>,
    encoder: EncoderHandle,
    faults: Arc<FaultSupervisor>,
    clock: Arc<dyn Clock + Send + Sync>,
    settle: Duration,
}

impl ServoHandle {
    /// Halt at the current position.
    ///
    /// Blocks the caller for the settle delay, then re-latches the demand at
    /// wherever the door came to rest.
    pub fn stop(&self) {
        let r = &self.registry;
        r.demanded_position.set_clamped(self.encoder.position());
        r.demanded_speed.set_clamped(0);
        self.shared.pid_reset.store(true, Ordering::Release);
        self.shared.stopped.store(true, Ordering::Release);
        self.clock.sleep(self.settle);
        r.demanded_position.set_clamped(self.encoder.position());
    }

    /// Command an absolute target (clamped to the demand bounds).
    ///
    /// A real move clears every latched fault that the new direction clears,
    /// so stale state from the previous move does not block it.
    pub fn set_position(&self, target: i32) {
        let target = self.registry.demanded_position.set_clamped(target);
        let actual = self.encoder.position();
        if target != actual {
            self.shared.stopped.store(false, Ordering::Release);
            let dir = if target > actual {
                ActionMask::MOVE_UP
            } else {
                ActionMask::MOVE_DOWN
            };
            self.faults.clear_action_all(dir);
            self.encoder.restart_motion_window();
        }
        tracing::debug!(target, actual, "servo target");
    }

    /// Command a move relative to the current position.
    pub fn change_position(&self, delta: i32) {
        self.set_position(self.encoder.position().saturating_add(delta));
    }

    /// Request the motor power switch state; applied on the next control tick.
    pub fn motor_power(&self, enable: bool) {
        let req = if enable { POWER_ON } else { POWER_OFF };
        self.shared.power_request.store(req, Ordering::Release);
        tracing::info!(enable, "motor power requested");
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Last power state actually applied to the driver.
    pub fn is_powered(&self) -> bool {
        self.shared.powered.load(Ordering::Acquire)
    }

    pub fn position(&self) -> i32 {
        self.encoder.position()
    }

    pub fn demanded_position(&self) -> i32 {
        self.registry.demanded_position.get()
    }

    pub fn encoder(&self) -> &EncoderHandle {
        &self.encoder
    }
}

/// Control-thread side of the motion controller.
pub struct ServoLoop<M: Motor, I: CurrentSense> {
    cfg: ServoCfg,
    motor: M,
    sense: I,
    position_pid: Pid,
    speed_pid: Pid,
    pwm: i32,
    current: ExpFilter,
    current_ma: i32,
    hw_errors: u64,
    shared: Arc<ServoShared>,
    registry: Arc<Registry>,
    encoder: EncoderHandle,
    faults: Arc<FaultSupervisor>,
}

impl<M: Motor, I: CurrentSense> ServoLoop<M, I> {
    pub fn new(
        cfg: ServoCfg,
        motor: M,
        sense: I,
        registry: Arc<Registry>,
        encoder: EncoderHandle,
        faults: Arc<FaultSupervisor>,
    ) -> Self {
        let mut speed_pid = Pid::new(registry.speed_p.get_u16(), registry.speed_i.get_u16());
        speed_pid.set_output_range(-cfg.pwm_limit, cfg.pwm_limit, cfg.pwm_ff_min, cfg.pwm_ff_max);
        let shared = Arc::new(ServoShared {
            stopped: AtomicBool::new(true),
            pid_reset: AtomicBool::new(false),
            // Driver powered up at start.
            power_request: AtomicU8::new(POWER_ON),
            powered: AtomicBool::new(false),
        });
        Self {
            position_pid: Pid::new(registry.position_p.get_u16(), 0),
            speed_pid,
            cfg,
            motor,
            sense,
            pwm: 0,
            current: ExpFilter::new(CURRENT_FILTER_WEIGHT),
            current_ma: 0,
            hw_errors: 0,
            shared,
            registry,
            encoder,
            faults,
        }
    }

    pub fn handle(&self, clock: Arc<dyn Clock + Send + Sync>) -> ServoHandle {
        ServoHandle {
            shared: Arc::clone(&self.shared),
            registry: Arc::clone(&self.registry),
            encoder: self.encoder.clone(),
            faults: Arc::clone(&self.faults),
            clock,
            settle: Duration::from_millis(self.cfg.settle_ms),
        }
    }

    /// Last duty cycle sent to the driver.
    pub const fn pwm(&self) -> i32 {
        self.pwm
    }

    pub const fn hw_errors(&self) -> u64 {
        self.hw_errors
    }

    /// One control period.
    pub fn tick(&mut self) {
        self.load_tuning();
        if self.shared.pid_reset.swap(false, Ordering::AcqRel) {
            self.speed_pid.set_output(0, 0);
            self.position_pid.set_output(0, 0);
        }
        self.read_current();

        let demanded_speed = self.position_ctrl();
        let pwm = self.speed_ctrl(demanded_speed);
        let pwm = self.supervise(demanded_speed, pwm);

        self.pwm = pwm;
        self.registry.pwm.set_clamped(pwm);
        self.drive(pwm);
        self.apply_power_request();
    }

    fn load_tuning(&mut self) {
        let r = &self.registry;
        self.position_pid.set_params(r.position_p.get_u16(), 0);
        self.speed_pid.set_params(r.speed_p.get_u16(), r.speed_i.get_u16());
        let max = r.max_speed.get();
        let min = r.min_speed.get();
        self.position_pid.set_output_range(-max, max, -min, min);
    }

    fn read_current(&mut self) {
        match self.sense.read_ma() {
            Ok(ma) => self.current_ma = self.current.input(ma),
            Err(e) => self.hw_error("current sense read failed", e.as_ref()),
        }
        self.registry.current_ma.set_clamped(self.current_ma);
    }

    /// Any latched fault that blocks motion in either direction halts the
    /// cascade, so neither PI integrates against a gated output.
    fn motion_blocked(&self) -> bool {
        self.faults.is_blocked(ActionMask::MOVE_UP | ActionMask::MOVE_DOWN)
    }

    fn position_ctrl(&mut self) -> i32 {
        let actual = self.encoder.position();
        self.registry.actual_position.set(actual);
        let err = self.registry.demanded_position.get().saturating_sub(actual);
        let stopped = self.shared.stopped.load(Ordering::Acquire);
        self.faults
            .check(FaultKind::TargetReached, err.abs() < self.cfg.target_tolerance && !stopped);

        let demanded = if self.motion_blocked() {
            self.speed_pid.set_output(0, 0);
            self.position_pid.set_output(0, 0);
            0
        } else {
            self.position_pid.evaluate(err)
        };
        let demanded = self.registry.demanded_speed.set_clamped(demanded);

        self.faults
            .check(FaultKind::NoMovement, self.encoder.is_steady() && demanded != 0);
        demanded
    }

    fn speed_ctrl(&mut self, demanded: i32) -> i32 {
        let speed = self.encoder.speed();
        self.registry.actual_speed.set(speed);
        if self.motion_blocked() {
            self.speed_pid.set_output(0, 0)
        } else {
            self.speed_pid.evaluate(demanded.saturating_sub(speed))
        }
    }

    /// Direction-specific fault evaluation and output gating.
    fn supervise(&self, demanded: i32, pwm: i32) -> i32 {
        let f = &self.faults;
        match demanded.signum() {
            1 => {
                f.check(FaultKind::UpperLimit, self.encoder.upper_candidate());
                f.check(FaultKind::LowerLimit, false);
                self.encoder.reset_lower_candidate();
                self.check_overcurrent(true);
                f.check(FaultKind::OverloadCloseSlow, false);
                f.check(FaultKind::OverloadCloseFast, false);
                if f.is_blocked(ActionMask::MOVE_UP | ActionMask::MOVE_CTRL_BLOCK) {
                    return 0;
                }
                pwm
            }
            -1 => {
                f.check(FaultKind::LowerLimit, self.encoder.lower_candidate());
                f.check(FaultKind::UpperLimit, false);
                self.encoder.reset_upper_candidate();
                self.check_overcurrent(false);
                f.check(FaultKind::OverloadOpenSlow, false);
                f.check(FaultKind::OverloadOpenFast, false);
                if f.is_blocked(ActionMask::MOVE_DOWN | ActionMask::MOVE_CTRL_BLOCK) {
                    return 0;
                }
                pwm
            }
            _ => {
                f.check(FaultKind::OverloadOpenSlow, false);
                f.check(FaultKind::OverloadOpenFast, false);
                f.check(FaultKind::OverloadCloseSlow, false);
                f.check(FaultKind::OverloadCloseFast, false);
                0
            }
        }
    }

    /// Thresholds scale with the previous duty cycle, floored at
    /// `min_current_pwm` so low-duty moves are not judged too strictly.
    fn check_overcurrent(&self, opening: bool) {
        let duty = self.pwm.abs().max(self.cfg.min_current_pwm);
        let (limit_ma, slow, fast) = if opening {
            (
                self.registry.current_limit_open.get(),
                FaultKind::OverloadOpenSlow,
                FaultKind::OverloadOpenFast,
            )
        } else {
            (
                self.registry.current_limit_close.get(),
                FaultKind::OverloadCloseSlow,
                FaultKind::OverloadCloseFast,
            )
        };
        let limit = i64::from(limit_ma) * i64::from(duty) / 100;
        let fast_limit = limit * i64::from(self.cfg.fast_overload_pct) / 100;
        let current = i64::from(self.current_ma);
        self.faults.check(slow, current > limit);
        self.faults.check(fast, current > fast_limit);
    }

    fn drive(&mut self, pwm: i32) {
        let duty = i16::try_from(pwm.clamp(-100, 100)).unwrap_or(0);
        if let Err(e) = self.motor.run(duty) {
            self.hw_error("motor drive failed", e.as_ref());
        }
    }

    fn apply_power_request(&mut self) {
        let req = self.shared.power_request.swap(POWER_NONE, Ordering::AcqRel);
        if req == POWER_NONE {
            return;
        }
        let enable = req == POWER_ON;
        match self.motor.set_power(enable) {
            Ok(()) => self.shared.powered.store(enable, Ordering::Release),
            Err(e) => self.hw_error("motor power switch failed", e.as_ref()),
        }
    }

    /// Log the first error and then every power-of-two repeat.
    fn hw_error(&mut self, what: &'static str, e: &(dyn std::error::Error + 'static)) {
        self.hw_errors += 1;
        if self.hw_errors.is_power_of_two() {
            let err = crate::hw_error::map_hw_error(e);
            tracing::warn!(error = %err, count = self.hw_errors, "{what}");
        }
    }
}

impl<M: Motor, I: CurrentSense> Drop for ServoLoop<M, I> {
    fn drop(&mut self) {
        if let Err(e) = self.motor.run(0) {
            tracing::warn!(error = %e, "motor stop on shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderCfg;
    use crate::encoder::Encoder;
    use crate::events::{DoorEvent, PendingEvents};
    use crate::mocks::{FailingMotor, FixedCurrent, RecordingMotor};
    use gate_traits::ManualClock;

    struct Rig {
        servo: ServoLoop<RecordingMotor, FixedCurrent>,
        handle: ServoHandle,
        motor: RecordingMotor,
        current: FixedCurrent,
        faults: Arc<FaultSupervisor>,
        events: Arc<PendingEvents>,
        encoder: Encoder,
        registry: Arc<Registry>,
    }

    fn rig() -> Rig {
        let events = Arc::new(PendingEvents::new());
        let faults = Arc::new(FaultSupervisor::new(Arc::clone(&events)));
        let registry = Arc::new(Registry::default());
        let encoder = Encoder::new(EncoderCfg::default());
        let motor = RecordingMotor::default();
        let current = FixedCurrent::default();
        let servo = ServoLoop::new(
            ServoCfg::default(),
            motor.clone(),
            current.clone(),
            Arc::clone(&registry),
            encoder.handle(),
            Arc::clone(&faults),
        );
        let handle = servo.handle(Arc::new(ManualClock::new()));
        Rig {
            servo,
            handle,
            motor,
            current,
            faults,
            events,
            encoder,
            registry,
        }
    }

    #[test]
    fn first_tick_powers_the_driver() {
        let mut r = rig();
        r.servo.tick();
        assert!(r.motor.powered.load(Ordering::Relaxed));
        assert!(r.handle.is_powered());
        r.handle.motor_power(false);
        r.servo.tick();
        assert!(!r.handle.is_powered());
    }

    #[test]
    fn idle_at_target_outputs_zero() {
        let mut r = rig();
        r.servo.tick();
        assert_eq!(r.servo.pwm(), 0);
        assert_eq!(r.registry.demanded_speed.get(), 0);
    }

    #[test]
    fn opening_command_drives_positive_pwm() {
        let mut r = rig();
        r.handle.change_position(180);
        assert!(!r.handle.is_stopped());
        r.servo.tick();
        assert_eq!(r.registry.demanded_speed.get(), 70);
        assert!(r.servo.pwm() >= 50);
        assert_eq!(r.motor.duty.load(Ordering::Relaxed), r.servo.pwm());
    }

    #[test]
    fn closing_command_drives_negative_pwm() {
        let mut r = rig();
        r.handle.set_position(-40);
        r.servo.tick();
        assert_eq!(r.registry.demanded_speed.get(), -60);
        assert!(r.servo.pwm() <= -45);
    }

    #[test]
    fn stop_twice_latches_same_demand() {
        let r = rig();
        r.handle.set_position(100);
        r.handle.stop();
        let first = r.handle.demanded_position();
        r.handle.stop();
        assert_eq!(first, r.handle.demanded_position());
        assert_eq!(first, 0);
        assert!(r.handle.is_stopped());
    }

    #[test]
    fn target_reached_raises_event_when_not_stopped() {
        let mut r = rig();
        r.encoder.handle().set_position(10);
        r.handle.set_position(11);
        for _ in 0..10 {
            r.servo.tick();
        }
        assert!(r.events.is_pending(DoorEvent::TargetReached));
    }

    #[test]
    fn target_not_reported_while_stopped() {
        let mut r = rig();
        for _ in 0..20 {
            r.servo.tick();
        }
        assert!(!r.events.is_pending(DoorEvent::TargetReached));
    }

    #[test]
    fn overcurrent_while_closing_blocks_and_posts() {
        let mut r = rig();
        r.handle.set_position(-100);
        // 120 mA * 40% floor = 48 mA slow threshold; the reading is smoothed.
        r.current.set(500);
        for _ in 0..8 {
            r.servo.tick();
        }
        assert!(r.faults.is_active(FaultKind::OverloadCloseSlow));
        assert!(r.events.is_pending(DoorEvent::OverloadClosing));
        r.servo.tick();
        assert_eq!(r.servo.pwm(), 0);
        // Opening clears it.
        r.current.set(0);
        r.handle.set_position(100);
        assert!(!r.faults.is_blocked(ActionMask::MOVE_DOWN));
    }

    #[test]
    fn one_direction_block_does_not_wind_up_the_speed_loop() {
        let mut r = rig();
        r.handle.set_position(-100);
        r.current.set(500);
        for _ in 0..50 {
            r.servo.tick();
        }
        assert!(r.faults.is_blocked(ActionMask::MOVE_DOWN));
        assert!(!r.faults.is_blocked(ActionMask::MOVE_UP));
        assert_eq!(r.registry.demanded_speed.get(), 0);
        assert_eq!(r.servo.pwm(), 0);
        assert_eq!(r.servo.speed_pid.integral(), 0);

        // Reverse: the opening move must drive open from the first tick.
        r.current.set(0);
        r.handle.set_position(100);
        r.servo.tick();
        assert_eq!(r.registry.demanded_speed.get(), 70);
        assert!(r.servo.pwm() >= 50, "pwm {}", r.servo.pwm());
        assert_eq!(r.motor.duty.load(Ordering::Relaxed), r.servo.pwm());
    }

    #[test]
    fn isolated_current_spike_does_not_latch() {
        let mut r = rig();
        r.handle.set_position(-100);
        r.servo.tick();
        r.current.set(500);
        r.servo.tick();
        r.current.set(0);
        for _ in 0..10 {
            r.servo.tick();
        }
        assert!(!r.faults.is_active(FaultKind::OverloadCloseSlow));
        assert!(!r.events.is_pending(DoorEvent::OverloadClosing));
        assert!(r.servo.pwm() < 0);
        assert!(r.registry.current_ma.get() < 48);
    }

    #[test]
    fn stall_from_rest_needs_steady_window() {
        let mut r = rig();
        r.handle.change_position(50);
        for _ in 0..50 {
            r.servo.tick();
        }
        assert!(!r.faults.is_active(FaultKind::NoMovement));
        // Encoder saw no edges for > 2 s.
        for _ in 0..1001 {
            r.encoder.sample(false, false);
        }
        r.servo.tick();
        assert!(r.faults.is_active(FaultKind::NoMovement));
        assert!(r.events.is_pending(DoorEvent::NoMovementDetected));
        r.servo.tick();
        assert_eq!(r.registry.demanded_speed.get(), 0);
        assert_eq!(r.servo.pwm(), 0);
    }

    #[test]
    fn failing_motor_is_counted_not_fatal() {
        let events = Arc::new(PendingEvents::new());
        let faults = Arc::new(FaultSupervisor::new(events));
        let encoder = Encoder::new(EncoderCfg::default());
        let mut servo = ServoLoop::new(
            ServoCfg::default(),
            FailingMotor,
            FixedCurrent::default(),
            Arc::new(Registry::default()),
            encoder.handle(),
            faults,
        );
        servo.tick();
        servo.tick();
        // run + set_power on the first tick, run on the second
        assert_eq!(servo.hw_errors(), 3);
    }
}
