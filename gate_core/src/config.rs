//! Runtime configuration for the motion core.
//!
//! These are the structs the loops consume. They are separate from the
//! TOML-deserialized config in `gate_config`; see `conversions`.

/// Quadrature sampling and speed estimation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCfg {
    /// Sampling period of the encoder loop.
    pub period_ms: u64,
    /// Identical raw samples required before a channel level is accepted.
    pub debounce_samples: u32,
    /// Edges with the end-stop signature needed to raise a limit candidate.
    pub limit_up: u32,
    /// Edges without it needed to drop the candidate again.
    pub limit_down: u32,
    /// Speed units per (count per millisecond).
    pub speed_scale: i32,
    /// No movement for longer than this reads as steady (speed 0).
    pub steady_ms: u32,
    /// Minimum position change, in counts, before the speed estimate updates.
    pub motion_threshold: i32,
}

impl Default for EncoderCfg {
    fn default() -> Self {
        Self {
            period_ms: 2,
            debounce_samples: 5,
            limit_up: 30,
            limit_down: 50,
            speed_scale: 4000,
            steady_ms: 2000,
            motion_threshold: 2,
        }
    }
}

/// Motion controller loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServoCfg {
    pub period_ms: u64,
    /// Settle delay inside `stop()` before the demand is re-latched.
    pub settle_ms: u64,
    /// `|error| < target_tolerance` counts as on target.
    pub target_tolerance: i32,
    /// PWM magnitude assumed when scaling current limits at low duty.
    pub min_current_pwm: i32,
    /// Fast overcurrent threshold as a percentage of the slow one.
    pub fast_overload_pct: i32,
    /// Speed loop output range and stiction dead-band.
    pub pwm_limit: i32,
    pub pwm_ff_min: i32,
    pub pwm_ff_max: i32,
}

impl Default for ServoCfg {
    fn default() -> Self {
        Self {
            period_ms: 10,
            settle_ms: 500,
            target_tolerance: 3,
            min_current_pwm: 40,
            fast_overload_pct: 170,
            pwm_limit: 100,
            pwm_ff_min: -45,
            pwm_ff_max: 50,
        }
    }
}

/// Registry defaults for the control gains and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    pub speed_p: i32,
    pub speed_i: i32,
    pub position_p: i32,
    pub max_speed: i32,
    pub min_speed: i32,
    pub current_limit_open_ma: i32,
    pub current_limit_close_ma: i32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            speed_p: 50,
            speed_i: 25,
            position_p: 1500,
            max_speed: 70,
            min_speed: 20,
            current_limit_open_ma: 250,
            current_limit_close_ma: 120,
        }
    }
}

/// Door state machine geometry and timers. Positions are in encoder pulses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorCfg {
    pub period_ms: u64,
    /// Relative move used when searching for an end-stop.
    pub travel_pulses: i32,
    /// Plausible open-stop window measured from the closed origin.
    pub min_open_pulses: i32,
    pub max_open_pulses: i32,
    pub close_tolerance: i32,
    pub open_tolerance: i32,
    /// Reverse move after touching an end-stop.
    pub release_pulses: i32,
    /// Guard against the door being moved by hand while settled.
    pub steady_move_tolerance: i32,
    pub steady_move_up: u32,
    pub steady_move_down: u32,
    /// Pause before an interrupted move resumes.
    pub pause_secs: u32,
    /// Grace period in the fault state before motor power is cut.
    pub open_fault_secs: u32,
    pub close_fault_secs: u32,
}

impl Default for DoorCfg {
    fn default() -> Self {
        Self {
            period_ms: 100,
            travel_pulses: 180,
            min_open_pulses: 125,
            max_open_pulses: 180,
            close_tolerance: 5,
            open_tolerance: 5,
            release_pulses: 20,
            steady_move_tolerance: 5,
            steady_move_up: 5,
            steady_move_down: 20,
            pause_secs: 3,
            open_fault_secs: 2,
            close_fault_secs: 1,
        }
    }
}

/// Retry budgets for the two end-stop failure faults, as debounce counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultCfg {
    pub open_retries: u32,
    pub close_retries: u32,
}

impl Default for FaultCfg {
    fn default() -> Self {
        Self {
            open_retries: 25,
            close_retries: 25,
        }
    }
}

/// Everything the builder needs besides the devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateCfg {
    pub encoder: EncoderCfg,
    pub servo: ServoCfg,
    pub tuning: Tuning,
    pub door: DoorCfg,
    pub faults: FaultCfg,
}
