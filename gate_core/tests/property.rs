use gate_core::mocks::{FixedCurrent, RecordingMotor, SharedQuadrature};
use gate_core::{DoorEvent, Gate};
use gate_traits::ManualClock;
use proptest::prelude::*;

fn gate() -> Gate {
    Gate::builder()
        .with_encoder_input(SharedQuadrature::default())
        .with_motor(RecordingMotor::default())
        .with_current_sense(FixedCurrent::default())
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .expect("build")
}

proptest! {
    // Whatever arrives, a settled door never leaves the motor commanded.
    #[test]
    fn settled_states_are_stopped(batches in proptest::collection::vec(0u16..(1 << 10), 1..60)) {
        let mut g = gate();
        let h = g.handle();
        for bits in batches {
            for (i, ev) in DoorEvent::ALL.iter().enumerate() {
                if bits & (1 << i) != 0 {
                    h.post_event(*ev);
                }
            }
            g.step_door();
            let state = h.state();
            if state.is_settled() {
                prop_assert!(g.servo().is_stopped(), "{state} with a live demand");
            }
        }
    }
}
