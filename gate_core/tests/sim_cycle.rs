//! Full calibration cycle against the simulated plant, stepped by hand.
//!
//! The gate and the plant run on separate manual clocks: the plant clock is
//! advanced one encoder period per step, the gate clock only absorbs the stop
//! settle delay.

use gate_core::{CalibrationConfidence, DoorEvent, DoorState, Gate, GateHandle};
use gate_hardware::{SimParams, SimPlant};
use gate_traits::ManualClock;
use std::sync::Arc;
use std::time::Duration;

const ENCODER_MS: u64 = 2;
const SERVO_EVERY: u64 = 5;
const DOOR_EVERY: u64 = 50;

struct Rig {
    gate: Gate,
    handle: GateHandle,
    plant: SimPlant,
    clock: ManualClock,
    step: u64,
}

fn rig() -> Rig {
    let clock = ManualClock::new();
    let plant = SimPlant::new(SimParams::default(), Arc::new(clock.clone()));
    let gate = Gate::builder()
        .with_encoder_input(plant.quadrature())
        .with_motor(plant.motor())
        .with_current_sense(plant.current_sense())
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .expect("default config builds");
    let handle = gate.handle();
    Rig {
        gate,
        handle,
        plant,
        clock,
        step: 0,
    }
}

impl Rig {
    fn advance(&mut self) {
        self.clock.advance(Duration::from_millis(ENCODER_MS));
        self.step += 1;
        self.gate.step_encoder();
        if self.step % SERVO_EVERY == 0 {
            self.gate.step_servo();
        }
        if self.step % DOOR_EVERY == 0 {
            self.gate.step_door();
        }
    }

    fn run_for(&mut self, ms: u64) {
        for _ in 0..ms / ENCODER_MS {
            self.advance();
        }
    }

    /// Step until `done` holds, for at most `secs` of plant time.
    fn run_until(&mut self, secs: u64, mut done: impl FnMut(&GateHandle) -> bool) -> bool {
        for _ in 0..secs * 1000 / ENCODER_MS {
            self.advance();
            if done(&self.handle) {
                return true;
            }
        }
        false
    }
}

#[test]
fn cold_boot_calibrates_both_stops_and_learns_the_travel() {
    let mut r = rig();
    r.run_for(100);
    assert_eq!(r.handle.state(), DoorState::UnknownPosition);
    assert!(r.plant.is_powered());

    r.handle.post_event(DoorEvent::OpenCmd);
    let opened = r.run_until(30, |h| h.state() == DoorState::Open);
    let st = r.handle.status();
    assert!(opened, "never reached Open: {st:?}");
    assert_eq!(st.upper, CalibrationConfidence::Confirmed);
    assert!(r.plant.position() >= 155, "plant at {}", r.plant.position());

    r.handle.post_event(DoorEvent::CloseCmd);
    let closed = r.run_until(30, |h| h.state() == DoorState::Closed);
    let st = r.handle.status();
    assert!(closed, "never reached Closed: {st:?}");
    assert_eq!(st.lower, CalibrationConfidence::Confirmed);
    assert_eq!(st.upper, CalibrationConfidence::Confirmed);
    assert!((155..=170).contains(&st.open_pulses), "learned {}", st.open_pulses);
    assert!(st.position.abs() <= 2, "origin at {}", st.position);
    assert!(r.plant.position() <= 5, "plant at {}", r.plant.position());

    // Calibrated: a plain move that can be stopped part way.
    r.handle.post_event(DoorEvent::OpenCmd);
    assert!(r.run_until(2, |h| h.state() == DoorState::Opening));
    r.run_for(2000);
    r.handle.post_event(DoorEvent::Stop);
    assert!(r.run_until(1, |h| h.state() != DoorState::Opening));
    let st = r.handle.status();
    assert_eq!(st.state, DoorState::Intermediate, "{st:?}");
    assert!((10..=140).contains(&st.position), "stopped at {}", st.position);

    r.handle.post_event(DoorEvent::OpenCmd);
    let opened = r.run_until(30, |h| h.state() == DoorState::Open);
    let st = r.handle.status();
    assert!(opened, "never reached Open again: {st:?}");
    r.run_for(200);
    assert!(r.handle.status().open_percent >= 95);
}
