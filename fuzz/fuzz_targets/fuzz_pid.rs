#![no_main]
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    p: u16,
    i: u16,
    min: i8,
    max: i8,
    ff_min: i8,
    ff_max: i8,
    errors: Vec<i32>,
}

fuzz_target!(|input: Input| {
    let mut pid = gate_core::Pid::new(input.p, input.i);
    pid.set_output_range(
        i32::from(input.min),
        i32::from(input.max),
        i32::from(input.ff_min),
        i32::from(input.ff_max),
    );
    let (lo, hi, _, _) = pid.output_range();
    for e in input.errors {
        let out = pid.evaluate(e);
        assert!((lo..=hi).contains(&out), "output {out} outside [{lo}, {hi}]");
    }
});
