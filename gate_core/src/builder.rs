//! Type-state builder for [`Gate`].
//!
//! The builder enforces at compile time that the quadrature input, the motor
//! and the current sense are provided before `build()` is available.
//! `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use gate_traits::clock::{Clock, MonotonicClock};
use gate_traits::{CurrentSense, Motor, QuadratureInput};

use crate::config::GateCfg;
use crate::door::DoorController;
use crate::encoder::{Encoder, EncoderTask};
use crate::error::{BuildError, Result};
use crate::events::PendingEvents;
use crate::fault::{FaultKind, FaultSupervisor};
use crate::registry::Registry;
use crate::runner::{BoxedInput, BoxedMotor, BoxedSense, Gate};
use crate::servo::ServoLoop;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for [`Gate`]. The configuration is validated on `build()`.
pub struct GateBuilder<E, M, I> {
    input: Option<BoxedInput>,
    motor: Option<BoxedMotor>,
    sense: Option<BoxedSense>,
    cfg: Option<GateCfg>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _e: PhantomData<E>,
    _m: PhantomData<M>,
    _i: PhantomData<I>,
}

impl Default for GateBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            input: None,
            motor: None,
            sense: None,
            cfg: None,
            clock: None,
            _e: PhantomData,
            _m: PhantomData,
            _i: PhantomData,
        }
    }
}

impl Gate {
    /// Start building a gate.
    pub fn builder() -> GateBuilder<Missing, Missing, Missing> {
        GateBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

/// Reject configurations the loops cannot run with.
pub fn validate(cfg: &GateCfg) -> Result<()> {
    let e = &cfg.encoder;
    if e.period_ms == 0 || cfg.servo.period_ms == 0 || cfg.door.period_ms == 0 {
        return Err(invalid("loop periods must be >= 1 ms"));
    }
    if e.debounce_samples == 0 {
        return Err(invalid("encoder debounce_samples must be >= 1"));
    }
    if e.limit_up == 0 || e.limit_down == 0 {
        return Err(invalid("encoder limit filter delays must be >= 1"));
    }
    if e.speed_scale <= 0 {
        return Err(invalid("encoder speed_scale must be > 0"));
    }
    if e.motion_threshold < 0 {
        return Err(invalid("encoder motion_threshold must be >= 0"));
    }

    let s = &cfg.servo;
    if s.target_tolerance <= 0 {
        return Err(invalid("servo target_tolerance must be > 0"));
    }
    if !(1..=100).contains(&s.pwm_limit) {
        return Err(invalid("servo pwm_limit must be within 1..=100"));
    }
    if s.pwm_ff_min > 0 || s.pwm_ff_max < 0 {
        return Err(invalid("servo feed-forward band must contain 0"));
    }
    if s.pwm_ff_min < -s.pwm_limit || s.pwm_ff_max > s.pwm_limit {
        return Err(invalid("servo feed-forward band exceeds pwm_limit"));
    }
    if s.min_current_pwm < 0 || s.fast_overload_pct < 100 {
        return Err(invalid("servo overcurrent scaling out of range"));
    }

    let t = &cfg.tuning;
    if t.max_speed < t.min_speed {
        return Err(invalid("max_speed must be >= min_speed"));
    }
    if t.current_limit_open_ma <= 0 || t.current_limit_close_ma <= 0 {
        return Err(invalid("current limits must be > 0"));
    }

    let d = &cfg.door;
    if d.travel_pulses <= 0 {
        return Err(invalid("door travel_pulses must be > 0"));
    }
    if d.min_open_pulses <= 0 || d.min_open_pulses > d.max_open_pulses {
        return Err(invalid("door open window must satisfy 0 < min <= max"));
    }
    if d.close_tolerance < 0 || d.open_tolerance < 0 || d.steady_move_tolerance < 0 {
        return Err(invalid("door tolerances must be >= 0"));
    }
    if d.release_pulses < 0 {
        return Err(invalid("door release_pulses must be >= 0"));
    }

    if cfg.faults.open_retries == 0 || cfg.faults.close_retries == 0 {
        return Err(invalid("fault retry budgets must be >= 1"));
    }
    Ok(())
}

fn validate_and_build(
    input: BoxedInput,
    motor: BoxedMotor,
    sense: BoxedSense,
    cfg: GateCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<Gate> {
    validate(&cfg)?;

    // Registry tuning must be inside the parameter bounds.
    let registry = Registry::new(&cfg.tuning);
    if registry.speed_p.get() != cfg.tuning.speed_p
        || registry.speed_i.get() != cfg.tuning.speed_i
        || registry.position_p.get() != cfg.tuning.position_p
        || registry.max_speed.get() != cfg.tuning.max_speed
        || registry.min_speed.get() != cfg.tuning.min_speed
        || registry.current_limit_open.get() != cfg.tuning.current_limit_open_ma
        || registry.current_limit_close.get() != cfg.tuning.current_limit_close_ma
    {
        return Err(invalid("tuning value outside its register bounds"));
    }
    let registry = Arc::new(registry);

    let events = Arc::new(PendingEvents::new());
    let mut faults = FaultSupervisor::new(Arc::clone(&events));
    let (_, open_down) = faults.debounce(FaultKind::OpenFailure);
    faults.set_debounce(FaultKind::OpenFailure, cfg.faults.open_retries, open_down);
    let (_, close_down) = faults.debounce(FaultKind::CloseFailure);
    faults.set_debounce(FaultKind::CloseFailure, cfg.faults.close_retries, close_down);
    let faults = Arc::new(faults);

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => Arc::from(c),
        None => Arc::new(MonotonicClock::new()),
    };

    let encoder = EncoderTask::new(input, Encoder::new(cfg.encoder.clone()));
    let encoder_handle = encoder.handle();
    let servo = ServoLoop::new(
        cfg.servo.clone(),
        motor,
        sense,
        Arc::clone(&registry),
        encoder_handle.clone(),
        Arc::clone(&faults),
    );
    let servo_handle = servo.handle(clock);
    let door = DoorController::new(
        cfg.door.clone(),
        servo_handle.clone(),
        Arc::clone(&faults),
        Arc::clone(&events),
        Arc::clone(&registry),
    );
    let handle = Gate::handle_parts(events, faults, registry, door.shared(), encoder_handle);

    tracing::debug!(
        travel = cfg.door.travel_pulses,
        open_window = ?(cfg.door.min_open_pulses, cfg.door.max_open_pulses),
        retries = ?(cfg.faults.open_retries, cfg.faults.close_retries),
        "gate built"
    );
    Ok(Gate::from_parts(cfg, encoder, servo, servo_handle, door, handle))
}

impl<E, M, I> GateBuilder<E, M, I> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Gate> {
        let input = self
            .input
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEncoder))?;
        let motor = self
            .motor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;
        let sense = self
            .sense
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCurrentSense))?;
        validate_and_build(input, motor, sense, self.cfg.unwrap_or_default(), self.clock)
    }

    /// Chainable setters that do not affect type-state.
    pub fn with_config(mut self, cfg: GateCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<M, I> GateBuilder<Missing, M, I> {
    pub fn with_encoder_input(
        self,
        input: impl QuadratureInput + Send + 'static,
    ) -> GateBuilder<Set, M, I> {
        GateBuilder {
            input: Some(Box::new(input)),
            motor: self.motor,
            sense: self.sense,
            cfg: self.cfg,
            clock: self.clock,
            _e: PhantomData,
            _m: PhantomData,
            _i: PhantomData,
        }
    }
}

impl<E, I> GateBuilder<E, Missing, I> {
    pub fn with_motor(self, motor: impl Motor + Send + 'static) -> GateBuilder<E, Set, I> {
        GateBuilder {
            input: self.input,
            motor: Some(Box::new(motor)),
            sense: self.sense,
            cfg: self.cfg,
            clock: self.clock,
            _e: PhantomData,
            _m: PhantomData,
            _i: PhantomData,
        }
    }
}

impl<E, M> GateBuilder<E, M, Missing> {
    pub fn with_current_sense(
        self,
        sense: impl CurrentSense + Send + 'static,
    ) -> GateBuilder<E, M, Set> {
        GateBuilder {
            input: self.input,
            motor: self.motor,
            sense: Some(Box::new(sense)),
            cfg: self.cfg,
            clock: self.clock,
            _e: PhantomData,
            _m: PhantomData,
            _i: PhantomData,
        }
    }
}

impl GateBuilder<Set, Set, Set> {
    /// Validate and build. Only available when all three devices are set.
    pub fn build(self) -> Result<Gate> {
        self.try_build()
    }
}
