//! Command bodies: device assembly, the run loop and the read-only reports.

use crate::cli::RtLock;
use crate::rt::{RtRequest, setup_rt_once};
use gate_core::error::{GateError, Result};
use gate_core::{
    CommandSource, DoorEvent, DoorState, Gate, GateCfg, GateStatus, LoopStats, RunningGate,
    action_for,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RunOpts {
    pub initial: Option<DoorEvent>,
    pub seconds: Option<u64>,
    pub status_ms: u64,
    pub rt: Option<RtRequest>,
    pub json: bool,
}

/// Resolve the real-time request from CLI flags, falling back to `[runtime]`.
pub fn rt_request(
    cfg: &gate_config::Config,
    rt: bool,
    prio: Option<i32>,
    lock: Option<RtLock>,
    cpu: Option<usize>,
) -> Option<RtRequest> {
    let r = &cfg.runtime;
    (rt || r.rt).then(|| RtRequest {
        prio: prio.or(r.priority),
        lock: lock.unwrap_or_else(|| r.lock.into()),
        cpu: cpu.or(r.cpu).unwrap_or(0),
    })
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn start_gate(cfg: &gate_config::Config) -> Result<RunningGate> {
    use gate_core::hw_error::map_hw_error;
    use gate_hardware::{GpioQuadrature, HBridgeMotor, Mcp3008Current, open_gpio};

    let hw = |e: gate_hardware::HwError| eyre::Report::new(map_hw_error(&e));
    let p = &cfg.pins;
    let gpio = open_gpio().map_err(hw)?;
    let input = GpioQuadrature::new(&gpio, p.encoder_a, p.encoder_b, p.encoder_power).map_err(hw)?;
    let motor = HBridgeMotor::new(&gpio, p.motor_pwm, p.motor_dir, p.motor_en, cfg.hardware.pwm_hz)
        .map_err(hw)?;
    let sense = Mcp3008Current::new(cfg.hardware.current_adc_channel, cfg.hardware.current_ma_per_count)
        .map_err(hw)?;
    tracing::info!(backend = "gpio", "devices opened");
    Gate::builder()
        .with_encoder_input(input)
        .with_motor(motor)
        .with_current_sense(sense)
        .with_config(GateCfg::from(cfg))
        .build()?
        .start()
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn start_gate(cfg: &gate_config::Config) -> Result<RunningGate> {
    use gate_hardware::{SimParams, SimPlant};
    use gate_traits::MonotonicClock;

    let s = &cfg.sim;
    let params = SimParams {
        lower_stop: s.lower_stop,
        upper_stop: s.upper_stop,
        start: (s.lower_stop + s.upper_stop) / 2,
        mcounts_per_sec_per_pct: s.mcounts_per_sec_per_pct,
        stiction_pct: s.stiction_pct,
        chatter_ms: s.chatter_ms,
    };
    let plant = SimPlant::new(params, Arc::new(MonotonicClock::new()));
    tracing::info!(backend = "sim", "devices opened");
    Gate::builder()
        .with_encoder_input(plant.quadrature())
        .with_motor(plant.motor())
        .with_current_sense(plant.current_sense())
        .with_config(GateCfg::from(cfg))
        .build()?
        .start()
}

pub fn status_json(st: &GateStatus) -> serde_json::Value {
    json!({
        "state": st.state.to_string(),
        "status": st.status.bits(),
        "open_percent": st.open_percent,
        "open_pulses": st.open_pulses,
        "upper": st.upper.to_string(),
        "lower": st.lower.to_string(),
        "position": st.position,
        "speed": st.speed,
        "current_ma": st.current_ma,
        "pwm": st.pwm,
        "demanded_position": st.demanded_position,
        "demanded_speed": st.demanded_speed,
        "error_code": st.error_code,
        "faults": st.active_faults.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "source": st.last_source.to_string(),
    })
}

fn print_status(st: &GateStatus, json: bool) {
    if json {
        println!("{}", status_json(st));
    } else {
        println!(
            "{:<22} pos={:>4} pct={:>3}% pwm={:>4} I={:>4}mA upper={} lower={} code={}",
            st.state.to_string(),
            st.position,
            st.open_percent,
            st.pwm,
            st.current_ma,
            st.upper,
            st.lower,
            st.error_code,
        );
    }
}

/// Run until the deadline or `shutdown`, printing status every `status_ms`.
/// A run that ends in the fault state is reported as an error.
pub fn run_gate(cfg: &gate_config::Config, opts: &RunOpts, shutdown: &Arc<AtomicBool>) -> Result<GateStatus> {
    if let Some(req) = opts.rt {
        setup_rt_once(req);
    }
    let running = start_gate(cfg)?;
    let handle = running.handle();
    if let Some(ev) = opts.initial {
        handle.post_event_from(ev, CommandSource::Button);
        tracing::info!(event = %ev, "initial command posted");
    }

    let started = Instant::now();
    let deadline = opts.seconds.map(|s| started + Duration::from_secs(s));
    let every = Duration::from_millis(opts.status_ms.max(10));
    let mut next_print = started;
    loop {
        let now = Instant::now();
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break;
        }
        if deadline.is_some_and(|d| now >= d) {
            break;
        }
        if now >= next_print {
            print_status(&handle.status(), opts.json);
            next_print += every;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let status = handle.status();
    print_status(&status, opts.json);
    for s in running.loop_stats() {
        tracing::debug!(loop_name = s.name, ticks = s.ticks, overruns = s.overruns, max_step_us = s.max_step_us, "loop stats");
    }
    running.shutdown();

    if status.state == DoorState::DoorFault {
        return Err(eyre::Report::new(GateError::State(format!(
            "door fault (code {})",
            status.error_code
        ))));
    }
    Ok(status)
}

/// Start the loops, let them run briefly and report their timing.
pub fn self_check(cfg: &gate_config::Config, json: bool) -> Result<[LoopStats; 3]> {
    let running = start_gate(cfg)?;
    let settle = Duration::from_millis(cfg.door.period_ms.saturating_mul(3).max(300));
    std::thread::sleep(settle);
    let status = running.handle().status();
    let stats = running.loop_stats();
    running.shutdown();

    if let Some(idle) = stats.iter().find(|s| s.ticks == 0) {
        return Err(eyre::Report::new(GateError::Thread(idle.name)).wrap_err("loop never ticked"));
    }
    if json {
        let loops: Vec<_> = stats
            .iter()
            .map(|s| json!({ "loop": s.name, "ticks": s.ticks, "overruns": s.overruns, "max_step_us": s.max_step_us }))
            .collect();
        println!("{}", json!({ "ok": true, "loops": loops, "status": status_json(&status) }));
    } else {
        for s in &stats {
            println!(
                "{:<8} ticks={:>5} overruns={:>3} max_step={}us",
                s.name, s.ticks, s.overruns, s.max_step_us
            );
        }
        println!("state={} position={}", status.state, status.position);
        println!("self-check ok");
    }
    Ok(stats)
}

/// Print the effective configuration.
pub fn check_config(cfg: &gate_config::Config, json: bool) -> Result<()> {
    let text = if json {
        serde_json::to_string_pretty(cfg).map_err(|e| eyre::eyre!("serialize config: {e}"))?
    } else {
        toml::to_string_pretty(cfg).map_err(|e| eyre::eyre!("serialize config: {e}"))?
    };
    println!("{text}");
    if !json {
        println!("# config ok");
    }
    Ok(())
}

/// Print the transition table, one row per state.
pub fn print_table(json: bool) {
    if json {
        let rows: Vec<_> = DoorState::ALL
            .iter()
            .map(|&s| {
                let cells: serde_json::Map<_, _> = DoorEvent::ALL
                    .iter()
                    .map(|&e| (e.to_string(), json!(action_for(s, e).name())))
                    .collect();
                json!({ "state": s.to_string(), "actions": cells })
            })
            .collect();
        println!("{}", serde_json::Value::Array(rows));
        return;
    }
    print!("{:<22}", "state \\ event");
    for e in DoorEvent::ALL {
        print!(" {:<16}", e.to_string());
    }
    println!();
    for s in DoorState::ALL {
        print!("{:<22}", s.to_string());
        for e in DoorEvent::ALL {
            print!(" {:<16}", action_for(s, e).name());
        }
        println!();
    }
}
