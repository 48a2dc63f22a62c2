//! `From` implementations bridging `gate_config` types to `gate_core` types.

use crate::config::{DoorCfg, EncoderCfg, FaultCfg, GateCfg, ServoCfg, Tuning};

impl From<&gate_config::EncoderCfg> for EncoderCfg {
    fn from(c: &gate_config::EncoderCfg) -> Self {
        Self {
            period_ms: c.period_ms,
            debounce_samples: c.debounce_samples,
            limit_up: c.limit_up,
            limit_down: c.limit_down,
            speed_scale: c.speed_scale,
            steady_ms: c.steady_ms,
            motion_threshold: c.motion_threshold,
        }
    }
}

impl From<&gate_config::ServoCfg> for ServoCfg {
    fn from(c: &gate_config::ServoCfg) -> Self {
        Self {
            period_ms: c.period_ms,
            settle_ms: c.settle_ms,
            target_tolerance: c.target_tolerance,
            min_current_pwm: c.min_current_pwm,
            fast_overload_pct: c.fast_overload_pct,
            pwm_limit: c.pwm_limit,
            pwm_ff_min: c.pwm_ff_min,
            pwm_ff_max: c.pwm_ff_max,
        }
    }
}

impl From<&gate_config::Tuning> for Tuning {
    fn from(c: &gate_config::Tuning) -> Self {
        Self {
            speed_p: c.speed_p,
            speed_i: c.speed_i,
            position_p: c.position_p,
            max_speed: c.max_speed,
            min_speed: c.min_speed,
            current_limit_open_ma: c.current_limit_open_ma,
            current_limit_close_ma: c.current_limit_close_ma,
        }
    }
}

impl From<&gate_config::DoorCfg> for DoorCfg {
    fn from(c: &gate_config::DoorCfg) -> Self {
        Self {
            period_ms: c.period_ms,
            travel_pulses: c.travel_pulses,
            min_open_pulses: c.min_open_pulses,
            max_open_pulses: c.max_open_pulses,
            close_tolerance: c.close_tolerance,
            open_tolerance: c.open_tolerance,
            release_pulses: c.release_pulses,
            steady_move_tolerance: c.steady_move_tolerance,
            steady_move_up: c.steady_move_up,
            steady_move_down: c.steady_move_down,
            pause_secs: c.pause_secs,
            open_fault_secs: c.open_fault_secs,
            close_fault_secs: c.close_fault_secs,
        }
    }
}

impl From<&gate_config::FaultCfg> for FaultCfg {
    fn from(c: &gate_config::FaultCfg) -> Self {
        Self {
            open_retries: c.open_retries,
            close_retries: c.close_retries,
        }
    }
}

impl From<&gate_config::Config> for GateCfg {
    fn from(c: &gate_config::Config) -> Self {
        Self {
            encoder: (&c.encoder).into(),
            servo: (&c.servo).into(),
            tuning: (&c.tuning).into(),
            door: (&c.door).into(),
            faults: (&c.faults).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_runtime_defaults() {
        let toml = "[pins]\nencoder_a = 17\nencoder_b = 27\nmotor_pwm = 18\nmotor_dir = 23\n";
        let cfg = gate_config::load_toml(toml).unwrap();
        assert_eq!(GateCfg::from(&cfg), GateCfg::default());
    }
}
