//! Periodic loop threads and the wired-up gate.
//!
//! [`Gate`] owns the three periodic tasks (encoder sampling, motion control,
//! door state machine) and can either be stepped by hand or started on one OS
//! thread per task. Producers interact only through the cloneable
//! [`GateHandle`]: post events, read status snapshots.
//!
//! Safety: each [`LoopThread`] is shut down and joined when dropped, and the
//! motion loop stops the motor on its way out.

use crate::config::GateCfg;
use crate::door::DoorController;
use crate::encoder::{EncoderHandle, EncoderTask};
use crate::error::{GateError, Result};
use crate::events::{CommandSource, DoorEvent, PendingEvents};
use crate::fault::{FaultKind, FaultSupervisor};
use crate::registry::Registry;
use crate::servo::{ServoHandle, ServoLoop};
use crate::state::{CalibrationConfidence, DoorShared, DoorState, StatusBits};
use crossbeam_channel as xch;
use gate_traits::{CurrentSense, Motor, QuadratureInput};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub type BoxedInput = Box<dyn QuadratureInput + Send>;
pub type BoxedMotor = Box<dyn Motor + Send>;
pub type BoxedSense = Box<dyn CurrentSense + Send>;

#[derive(Debug, Default)]
struct LoopCounters {
    ticks: AtomicU64,
    overruns: AtomicU64,
    max_step_us: AtomicU64,
}

/// Counters of one periodic loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub name: &'static str,
    pub ticks: u64,
    /// Steps that took longer than the period.
    pub overruns: u64,
    pub max_step_us: u64,
}

/// A named thread calling `step` once per period until dropped.
pub struct LoopThread {
    name: &'static str,
    shutdown: Arc<AtomicBool>,
    counters: Arc<LoopCounters>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl LoopThread {
    pub fn spawn<F>(name: &'static str, period: Duration, mut step: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let counters = Arc::new(LoopCounters::default());
        let counters_clone = Arc::clone(&counters);
        let period = period.max(Duration::from_millis(1));

        let join_handle = std::thread::Builder::new()
            .name(format!("gate-{name}"))
            .spawn(move || {
                let ticker = xch::tick(period);
                loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        tracing::debug!(loop_name = name, "loop thread received shutdown signal");
                        break;
                    }
                    let started = Instant::now();
                    step();
                    let took = started.elapsed();
                    let c = &counters_clone;
                    c.ticks.fetch_add(1, Ordering::Relaxed);
                    let us = u64::try_from(took.as_micros()).unwrap_or(u64::MAX);
                    c.max_step_us.fetch_max(us, Ordering::Relaxed);
                    if took > period {
                        c.overruns.fetch_add(1, Ordering::Relaxed);
                    }

                    if shutdown_clone.load(Ordering::Relaxed) {
                        break;
                    }
                    if ticker.recv().is_err() {
                        break;
                    }
                }
                tracing::trace!(loop_name = name, "loop thread exiting cleanly");
            })
            .map_err(|e| eyre::Report::new(GateError::Thread(name)).wrap_err(e.to_string()))?;

        Ok(Self {
            name,
            shutdown,
            counters,
            join_handle: Some(join_handle),
        })
    }

    pub fn stats(&self) -> LoopStats {
        LoopStats {
            name: self.name,
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
            max_step_us: self.counters.max_step_us.load(Ordering::Relaxed),
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Exits within one period, or after the current step (a door step may
        // sit in the stop settle delay).
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!(loop_name = self.name, "loop thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(loop_name = self.name, ?e, "loop thread panicked during shutdown");
                }
            }
        }
    }
}

/// Point-in-time view of the gate for external readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateStatus {
    pub state: DoorState,
    pub status: StatusBits,
    pub open_percent: i32,
    pub open_pulses: i32,
    pub upper: CalibrationConfidence,
    pub lower: CalibrationConfidence,
    pub position: i32,
    pub speed: i32,
    pub current_ma: i32,
    pub pwm: i32,
    pub demanded_position: i32,
    pub demanded_speed: i32,
    pub error_code: u8,
    pub active_faults: Vec<FaultKind>,
    pub last_source: CommandSource,
    pub timer_ticks: i32,
}

/// Thread-safe entry point for producers and readers.
#[derive(Clone)]
pub struct GateHandle {
    events: Arc<PendingEvents>,
    faults: Arc<FaultSupervisor>,
    registry: Arc<Registry>,
    door: Arc<DoorShared>,
    encoder: EncoderHandle,
}

impl GateHandle {
    pub fn post_event(&self, ev: DoorEvent) -> bool {
        self.events.post(ev)
    }

    pub fn post_event_from(&self, ev: DoorEvent, source: CommandSource) -> bool {
        self.events.post_from(ev, source)
    }

    pub fn state(&self) -> DoorState {
        self.door.state()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn faults(&self) -> &FaultSupervisor {
        &self.faults
    }

    pub fn status(&self) -> GateStatus {
        let r = &self.registry;
        let state = self.door.state();
        let error_code = self.faults.error_code();
        r.error_code.set_clamped(i32::from(error_code));
        GateStatus {
            state,
            status: state.status_bits(),
            open_percent: r.open_percent.get(),
            open_pulses: r.open_pulses.get(),
            upper: self.door.upper(),
            lower: self.door.lower(),
            position: self.encoder.position(),
            speed: self.encoder.speed(),
            current_ma: r.current_ma.get(),
            pwm: r.pwm.get(),
            demanded_position: r.demanded_position.get(),
            demanded_speed: r.demanded_speed.get(),
            error_code,
            active_faults: self.faults.active(),
            last_source: self.events.last_source(),
            timer_ticks: self.door.timer_ticks(),
        }
    }
}

/// The three periodic tasks, wired together but not yet running.
pub struct Gate {
    cfg: GateCfg,
    encoder: EncoderTask<BoxedInput>,
    servo: ServoLoop<BoxedMotor, BoxedSense>,
    servo_handle: ServoHandle,
    door: DoorController,
    handle: GateHandle,
}

impl Gate {
    pub(crate) fn from_parts(
        cfg: GateCfg,
        encoder: EncoderTask<BoxedInput>,
        servo: ServoLoop<BoxedMotor, BoxedSense>,
        servo_handle: ServoHandle,
        door: DoorController,
        handle: GateHandle,
    ) -> Self {
        Self {
            cfg,
            encoder,
            servo,
            servo_handle,
            door,
            handle,
        }
    }

    pub(crate) fn handle_parts(
        events: Arc<PendingEvents>,
        faults: Arc<FaultSupervisor>,
        registry: Arc<Registry>,
        door: Arc<DoorShared>,
        encoder: EncoderHandle,
    ) -> GateHandle {
        GateHandle {
            events,
            faults,
            registry,
            door,
            encoder,
        }
    }

    pub fn handle(&self) -> GateHandle {
        self.handle.clone()
    }

    pub fn servo(&self) -> &ServoHandle {
        &self.servo_handle
    }

    pub const fn config(&self) -> &GateCfg {
        &self.cfg
    }

    /// One encoder sampling period, on the caller's thread.
    pub fn step_encoder(&mut self) {
        self.encoder.step();
    }

    /// One control period, on the caller's thread.
    pub fn step_servo(&mut self) {
        self.servo.tick();
    }

    /// One door period, on the caller's thread.
    pub fn step_door(&mut self) {
        self.door.tick();
    }

    /// Spawn one thread per loop.
    pub fn start(self) -> Result<RunningGate> {
        let Self {
            cfg,
            mut encoder,
            mut servo,
            servo_handle,
            mut door,
            handle,
        } = self;

        let encoder_loop = LoopThread::spawn(
            "encoder",
            Duration::from_millis(cfg.encoder.period_ms),
            move || encoder.step(),
        )?;
        let servo_loop = LoopThread::spawn(
            "servo",
            Duration::from_millis(cfg.servo.period_ms),
            move || servo.tick(),
        )?;
        let door_loop = LoopThread::spawn(
            "door",
            Duration::from_millis(cfg.door.period_ms),
            move || door.tick(),
        )?;
        tracing::info!(
            encoder_ms = cfg.encoder.period_ms,
            servo_ms = cfg.servo.period_ms,
            door_ms = cfg.door.period_ms,
            "gate loops started"
        );

        Ok(RunningGate {
            door: door_loop,
            servo: servo_loop,
            encoder: encoder_loop,
            servo_handle,
            handle,
        })
    }
}

/// A started gate. Dropping it stops the door loop first, then the motion
/// loop (which stops the motor), then the encoder.
pub struct RunningGate {
    door: LoopThread,
    servo: LoopThread,
    encoder: LoopThread,
    servo_handle: ServoHandle,
    handle: GateHandle,
}

impl RunningGate {
    pub fn handle(&self) -> GateHandle {
        self.handle.clone()
    }

    pub fn servo(&self) -> &ServoHandle {
        &self.servo_handle
    }

    pub fn loop_stats(&self) -> [LoopStats; 3] {
        [self.encoder.stats(), self.servo.stats(), self.door.stats()]
    }

    /// Explicit shutdown; equivalent to dropping.
    pub fn shutdown(self) {
        drop(self);
    }
}
