//! Loop threads start, react to events and shut down cleanly.

use gate_core::mocks::{FixedCurrent, RecordingMotor, SharedQuadrature};
use gate_core::{CommandSource, DoorEvent, DoorState, Gate};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn started_gate_drives_and_stops_motor_on_drop() {
    let input = SharedQuadrature::default();
    let motor = RecordingMotor::default();
    let gate = Gate::builder()
        .with_encoder_input(input.clone())
        .with_motor(motor.clone())
        .with_current_sense(FixedCurrent::default())
        .build()
        .expect("build");
    assert!(input.powered.load(Ordering::Relaxed), "sensor powered at build");

    let running = gate.start().expect("start");
    let handle = running.handle();
    assert!(wait_for(Duration::from_secs(2), || motor.powered.load(Ordering::Relaxed)));

    handle.post_event_from(DoorEvent::OpenCmd, CommandSource::Button);
    assert!(wait_for(Duration::from_secs(2), || handle.state() == DoorState::OpeningToMaxStop));
    assert!(wait_for(Duration::from_secs(1), || motor.duty.load(Ordering::Relaxed) > 0));
    assert_eq!(handle.status().last_source, CommandSource::Button);

    let stats = running.loop_stats();
    assert_eq!(stats.map(|s| s.name), ["encoder", "servo", "door"]);
    assert!(stats.iter().all(|s| s.ticks > 0));

    running.shutdown();
    assert_eq!(motor.duty.load(Ordering::Relaxed), 0);
    assert!(!input.powered.load(Ordering::Relaxed), "sensor powered off on shutdown");
}

#[test]
fn repeated_start_and_drop_does_not_hang() {
    for _ in 0..5 {
        let gate = Gate::builder()
            .with_encoder_input(SharedQuadrature::default())
            .with_motor(RecordingMotor::default())
            .with_current_sense(FixedCurrent::default())
            .build()
            .expect("build");
        let running = gate.start().expect("start");
        std::thread::sleep(Duration::from_millis(20));
        drop(running);
    }
}
