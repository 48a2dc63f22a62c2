#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the gate controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every section except `[pins]` has defaults matching the factory
//!   tuning, so a minimal file only names the GPIO lines.
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Pins {
    pub encoder_a: u8,
    pub encoder_b: u8,
    /// Optional supply switch for the encoder sensor.
    pub encoder_power: Option<u8>,
    /// H-bridge inputs: PWM on `motor_pwm`, direction on `motor_dir`.
    pub motor_pwm: u8,
    pub motor_dir: u8,
    /// Driver enable / main relay.
    pub motor_en: Option<u8>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EncoderCfg {
    pub period_ms: u64,
    /// Identical samples required before a channel level is accepted.
    pub debounce_samples: u32,
    /// End-stop candidate filter: rocking edges to raise, plain edges to drop.
    pub limit_up: u32,
    pub limit_down: u32,
    pub speed_scale: i32,
    pub steady_ms: u32,
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

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServoCfg {
    pub period_ms: u64,
    pub settle_ms: u64,
    pub target_tolerance: i32,
    pub min_current_pwm: i32,
    pub fast_overload_pct: i32,
    pub pwm_limit: i32,
    /// Stiction dead-band of the speed loop, in percent duty.
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

/// Start-up values of the tunable registers.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
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

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DoorCfg {
    pub period_ms: u64,
    pub travel_pulses: i32,
    pub min_open_pulses: i32,
    pub max_open_pulses: i32,
    pub close_tolerance: i32,
    pub open_tolerance: i32,
    pub release_pulses: i32,
    pub steady_move_tolerance: i32,
    pub steady_move_up: u32,
    pub steady_move_down: u32,
    pub pause_secs: u32,
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

/// Retry budgets of the end-stop failure faults.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
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

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Hardware {
    /// Software PWM carrier frequency for the H-bridge.
    pub pwm_hz: u32,
    /// MCP3008 channel wired to the current shunt amplifier.
    pub current_adc_channel: u8,
    /// Milliamps per ADC count.
    pub current_ma_per_count: u32,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            pwm_hz: 1000,
            current_adc_channel: 0,
            current_ma_per_count: 3,
        }
    }
}

/// Simulated plant used when no hardware backend is compiled in.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SimCfg {
    /// Mechanical stops in encoder counts.
    pub lower_stop: i32,
    pub upper_stop: i32,
    /// Free-running speed in milli-counts per second per percent duty.
    pub mcounts_per_sec_per_pct: i32,
    /// Duty below which the door does not move.
    pub stiction_pct: i32,
    /// Period of the rocking edge while pushed against a stop.
    pub chatter_ms: u32,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            lower_stop: -1,
            upper_stop: 161,
            mcounts_per_sec_per_pct: 300,
            stiction_pct: 30,
            chatter_ms: 20,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemLock {
    None,
    #[default]
    Current,
    All,
}

/// Real-time scheduling defaults for `run --rt`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Runtime {
    pub rt: bool,
    /// SCHED_FIFO priority; maximum when unset.
    pub priority: Option<i32>,
    pub lock: MemLock,
    pub cpu: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub encoder: EncoderCfg,
    #[serde(default)]
    pub servo: ServoCfg,
    #[serde(default)]
    pub tuning: Tuning,
    #[serde(default)]
    pub door: DoorCfg,
    #[serde(default)]
    pub faults: FaultCfg,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub sim: SimCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub runtime: Runtime,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let p = &self.pins;
        let mut used = vec![p.encoder_a, p.encoder_b, p.motor_pwm, p.motor_dir];
        used.extend(p.encoder_power);
        used.extend(p.motor_en);
        for (i, pin) in used.iter().enumerate() {
            if *pin > 27 {
                eyre::bail!("pins: BCM {pin} is not a header GPIO (0..=27)");
            }
            if used[..i].contains(pin) {
                eyre::bail!("pins: BCM {pin} assigned twice");
            }
        }

        // Encoder
        let e = &self.encoder;
        if e.period_ms == 0 {
            eyre::bail!("encoder.period_ms must be >= 1");
        }
        if e.debounce_samples == 0 {
            eyre::bail!("encoder.debounce_samples must be >= 1");
        }
        if e.limit_up == 0 || e.limit_down == 0 {
            eyre::bail!("encoder.limit_up and encoder.limit_down must be >= 1");
        }
        if e.speed_scale <= 0 {
            eyre::bail!("encoder.speed_scale must be > 0");
        }
        if e.motion_threshold < 0 {
            eyre::bail!("encoder.motion_threshold must be >= 0");
        }
        if u64::from(e.steady_ms) < e.period_ms {
            eyre::bail!("encoder.steady_ms must be >= encoder.period_ms");
        }

        // Servo
        let s = &self.servo;
        if s.period_ms == 0 {
            eyre::bail!("servo.period_ms must be >= 1");
        }
        if s.period_ms < e.period_ms {
            eyre::bail!("servo.period_ms must be >= encoder.period_ms");
        }
        if s.settle_ms > 10_000 {
            eyre::bail!("servo.settle_ms is unreasonably large (>10s)");
        }
        if s.target_tolerance <= 0 {
            eyre::bail!("servo.target_tolerance must be > 0");
        }
        if !(1..=100).contains(&s.pwm_limit) {
            eyre::bail!("servo.pwm_limit must be in [1, 100]");
        }
        if s.pwm_ff_min > 0 || s.pwm_ff_max < 0 {
            eyre::bail!("servo.pwm_ff_min must be <= 0 <= servo.pwm_ff_max");
        }
        if s.pwm_ff_min < -s.pwm_limit || s.pwm_ff_max > s.pwm_limit {
            eyre::bail!("servo dead-band must lie within servo.pwm_limit");
        }
        if !(0..=100).contains(&s.min_current_pwm) {
            eyre::bail!("servo.min_current_pwm must be in [0, 100]");
        }
        if s.fast_overload_pct < 100 {
            eyre::bail!("servo.fast_overload_pct must be >= 100");
        }

        // Tuning
        let t = &self.tuning;
        if !(0..=10_000).contains(&t.speed_p) || !(0..=10_000).contains(&t.speed_i) {
            eyre::bail!("tuning.speed_p and tuning.speed_i must be in [0, 10000]");
        }
        if !(0..=50_000).contains(&t.position_p) {
            eyre::bail!("tuning.position_p must be in [0, 50000]");
        }
        if !(30..=300).contains(&t.max_speed) {
            eyre::bail!("tuning.max_speed must be in [30, 300]");
        }
        if !(0..=50).contains(&t.min_speed) {
            eyre::bail!("tuning.min_speed must be in [0, 50]");
        }
        if !(10..=1000).contains(&t.current_limit_open_ma) {
            eyre::bail!("tuning.current_limit_open_ma must be in [10, 1000]");
        }
        if !(5..=1000).contains(&t.current_limit_close_ma) {
            eyre::bail!("tuning.current_limit_close_ma must be in [5, 1000]");
        }

        // Door
        let d = &self.door;
        if d.period_ms == 0 {
            eyre::bail!("door.period_ms must be >= 1");
        }
        if d.travel_pulses <= 0 {
            eyre::bail!("door.travel_pulses must be > 0");
        }
        if d.min_open_pulses <= 0 || d.min_open_pulses > d.max_open_pulses {
            eyre::bail!("door open window must satisfy 0 < min_open_pulses <= max_open_pulses");
        }
        if d.max_open_pulses > 300 {
            eyre::bail!("door.max_open_pulses must be <= 300");
        }
        if d.close_tolerance < 0 || d.open_tolerance < 0 || d.steady_move_tolerance < 0 {
            eyre::bail!("door tolerances must be >= 0");
        }
        if d.release_pulses < 0 || d.release_pulses >= d.travel_pulses {
            eyre::bail!("door.release_pulses must be in [0, door.travel_pulses)");
        }
        if d.steady_move_up == 0 || d.steady_move_down == 0 {
            eyre::bail!("door.steady_move_up and door.steady_move_down must be >= 1");
        }

        // Faults
        if self.faults.open_retries == 0 || self.faults.close_retries == 0 {
            eyre::bail!("faults.open_retries and faults.close_retries must be >= 1");
        }

        // Hardware
        if self.hardware.pwm_hz == 0 {
            eyre::bail!("hardware.pwm_hz must be > 0");
        }
        if self.hardware.current_adc_channel > 7 {
            eyre::bail!("hardware.current_adc_channel must be in [0, 7]");
        }

        // Simulator
        if self.sim.lower_stop >= self.sim.upper_stop {
            eyre::bail!("sim.lower_stop must be < sim.upper_stop");
        }
        if self.sim.mcounts_per_sec_per_pct <= 0 {
            eyre::bail!("sim.mcounts_per_sec_per_pct must be > 0");
        }
        if self.sim.chatter_ms == 0 {
            eyre::bail!("sim.chatter_ms must be >= 1");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {r:?}");
        }

        Ok(())
    }
}
