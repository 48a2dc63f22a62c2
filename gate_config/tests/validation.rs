use gate_config::{MemLock, load_file, load_toml};
use rstest::rstest;
use std::io::Write;

const PINS: &str = r#"
[pins]
encoder_a = 17
encoder_b = 27
motor_pwm = 18
motor_dir = 23
motor_en = 24
"#;

fn with(extra: &str) -> String {
    format!("{PINS}\n{extra}")
}

#[test]
fn minimal_file_takes_defaults() {
    let cfg = load_toml(PINS).expect("parse TOML");
    cfg.validate().expect("defaults must validate");
    assert_eq!(cfg.encoder.period_ms, 2);
    assert_eq!(cfg.servo.period_ms, 10);
    assert_eq!(cfg.door.period_ms, 100);
    assert_eq!(cfg.tuning.speed_p, 50);
    assert_eq!(cfg.tuning.current_limit_close_ma, 120);
    assert_eq!(cfg.faults.open_retries, 25);
    assert_eq!(cfg.runtime.lock, MemLock::Current);
    assert!(!cfg.runtime.rt);
}

#[test]
fn missing_pins_is_a_parse_error() {
    let err = load_toml("[door]\ntravel_pulses = 100\n").expect_err("pins are required");
    assert!(err.to_string().contains("pins"), "{err}");
}

#[test]
fn partial_sections_keep_other_defaults() {
    let cfg = load_toml(&with("[door]\ntravel_pulses = 200\n[faults]\nopen_retries = 3\n"))
        .expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.door.travel_pulses, 200);
    assert_eq!(cfg.door.release_pulses, 20);
    assert_eq!(cfg.faults.open_retries, 3);
    assert_eq!(cfg.faults.close_retries, 25);
}

#[rstest]
#[case("[encoder]\nperiod_ms = 0\n", "encoder.period_ms must be >= 1")]
#[case("[encoder]\ndebounce_samples = 0\n", "encoder.debounce_samples")]
#[case("[servo]\nperiod_ms = 1\n", "servo.period_ms must be >= encoder.period_ms")]
#[case("[servo]\npwm_ff_min = 5\n", "servo.pwm_ff_min")]
#[case("[servo]\npwm_limit = 40\n", "dead-band")]
#[case("[tuning]\nmax_speed = 10\n", "tuning.max_speed")]
#[case("[tuning]\nspeed_i = 20000\n", "tuning.speed_p and tuning.speed_i")]
#[case("[door]\nmin_open_pulses = 200\n", "open window")]
#[case("[door]\nrelease_pulses = 500\n", "door.release_pulses")]
#[case("[faults]\nclose_retries = 0\n", "faults.open_retries")]
#[case("[sim]\nlower_stop = 200\n", "sim.lower_stop")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
fn rejects_out_of_range(#[case] section: &str, #[case] needle: &str) {
    let cfg = load_toml(&with(section)).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains(needle), "{err}");
}

#[test]
fn rejects_duplicate_pin() {
    let toml = r#"
[pins]
encoder_a = 17
encoder_b = 17
motor_pwm = 18
motor_dir = 23
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("duplicate pin");
    assert!(format!("{err}").contains("assigned twice"));
}

#[test]
fn runtime_section_parses_lock_mode() {
    let cfg = load_toml(&with("[runtime]\nrt = true\npriority = 60\nlock = \"all\"\ncpu = 1\n"))
        .expect("parse TOML");
    assert!(cfg.runtime.rt);
    assert_eq!(cfg.runtime.priority, Some(60));
    assert_eq!(cfg.runtime.lock, MemLock::All);
    assert_eq!(cfg.runtime.cpu, Some(1));
}

#[test]
fn load_file_reads_and_validates() {
    let mut f = tempfile::NamedTempFile::new().expect("tmp");
    f.write_all(PINS.as_bytes()).expect("write");
    let cfg = load_file(f.path()).expect("load");
    assert_eq!(cfg.pins.encoder_a, 17);

    let mut bad = tempfile::NamedTempFile::new().expect("tmp");
    bad.write_all(with("[door]\nperiod_ms = 0\n").as_bytes()).expect("write");
    let err = load_file(bad.path()).expect_err("invalid");
    assert!(format!("{err}").contains("door.period_ms"));
}

#[test]
fn load_file_reports_missing_path() {
    let err = load_file(std::path::Path::new("/definitely/not/here.toml")).expect_err("missing");
    assert!(format!("{err}").contains("read config"));
}
