use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use gate_core::mocks::{FixedCurrent, RecordingMotor, SharedQuadrature};
use gate_core::{DoorEvent, Encoder, EncoderCfg, Gate, Pid};
use gate_traits::ManualClock;

// Error trace of a move: a ramp towards the target with a small ripple.
fn error_trace(n: usize) -> Vec<i32> {
    (0..n)
        .map(|i| {
            let i = i32::try_from(i).unwrap_or(i32::MAX);
            (180 - i / 4).max(0) + (i % 7) - 3
        })
        .collect()
}

fn group_sizes(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p gate_core --bench control
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

pub fn bench_pid(c: &mut Criterion) {
    let mut g = c.benchmark_group("pid");
    group_sizes(&mut g);
    let trace = error_trace(1000);
    g.bench_function("speed_loop_1000_steps", |b| {
        b.iter_batched(
            || {
                let mut pid = Pid::new(50, 25);
                pid.set_output_range(-100, 100, -45, 50);
                pid
            },
            |mut pid| {
                for &e in &trace {
                    black_box(pid.evaluate(black_box(e)));
                }
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

pub fn bench_encoder(c: &mut Criterion) {
    let mut g = c.benchmark_group("encoder");
    group_sizes(&mut g);
    const PHASES: [(bool, bool); 4] = [(false, false), (true, false), (true, true), (false, true)];
    g.bench_function("decode_1000_counts", |b| {
        b.iter_batched(
            || Encoder::new(EncoderCfg::default()),
            |mut enc| {
                for n in 0..1000usize {
                    let (a, bb) = PHASES[n % 4];
                    for _ in 0..5 {
                        enc.sample(a, bb);
                    }
                }
                black_box(enc.handle().position());
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

pub fn bench_door_tick(c: &mut Criterion) {
    let mut g = c.benchmark_group("door");
    group_sizes(&mut g);
    g.bench_function("tick_with_command", |b| {
        b.iter_batched(
            || {
                Gate::builder()
                    .with_encoder_input(SharedQuadrature::default())
                    .with_motor(RecordingMotor::default())
                    .with_current_sense(FixedCurrent::default())
                    .with_clock(Box::new(ManualClock::new()))
                    .build()
                    .expect("build")
            },
            |mut gate| {
                let h = gate.handle();
                h.post_event(DoorEvent::OpenCmd);
                gate.step_door();
                h.post_event(DoorEvent::Stop);
                gate.step_door();
                black_box(h.state());
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(control, bench_pid, bench_encoder, bench_door_tick);
criterion_main!(control);
