//! Human-readable error descriptions, exit codes and structured JSON errors.

use gate_core::error::{BuildError, GateError};
use gate_hardware::HwError;

/// Stable process exit codes. 2 is left to clap for usage errors.
pub mod code {
    pub const GENERIC: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const HARDWARE: i32 = 4;
    pub const DOOR_FAULT: i32 = 5;
}

fn cause_of(err: &eyre::Report) -> String {
    err.chain()
        .nth(1)
        .map(|c| c.to_string())
        .unwrap_or_default()
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingEncoder => {
                "What happened: No quadrature input was provided to the controller.\nLikely causes: Encoder GPIO lines failed to open.\nHow to fix: Check [pins].encoder_a / encoder_b and GPIO permissions.".to_string()
            }
            BuildError::MissingMotor => {
                "What happened: No motor driver was provided to the controller.\nLikely causes: H-bridge GPIO lines failed to open.\nHow to fix: Check [pins].motor_pwm / motor_dir / motor_en and GPIO permissions.".to_string()
            }
            BuildError::MissingCurrentSense => {
                "What happened: No current sense was provided to the controller.\nLikely causes: SPI is disabled or the ADC is not wired.\nHow to fix: Enable SPI (raspi-config) and check [hardware].current_adc_channel.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `gate check-config`."
            ),
        };
    }

    if let Some(ge) = err.downcast_ref::<GateError>() {
        return match ge {
            GateError::Config(what) => {
                let cause = cause_of(err);
                if cause.contains("missing field `pins`") {
                    format!(
                        "What happened: The config {what} has no [pins] section.\nLikely causes: An incomplete config file.\nHow to fix: Add [pins] with encoder_a, encoder_b, motor_pwm and motor_dir."
                    )
                } else if cause.starts_with("read config") {
                    format!(
                        "What happened: Could not read the config {what}.\nLikely causes: Wrong path or missing permissions. Cause: {cause}\nHow to fix: Pass --config <FILE> pointing at a readable TOML file."
                    )
                } else {
                    format!(
                        "What happened: Configuration error in {what}.\nLikely causes: {cause}\nHow to fix: Edit the config file, then rerun `gate check-config`."
                    )
                }
            }
            GateError::State(msg) => format!(
                "What happened: The gate ended in the fault state ({msg}).\nLikely causes: An obstruction, a missing end-stop or current limits set too low.\nHow to fix: Clear the obstruction and send a new command; raise [tuning].current_limit_* only if the door runs freely."
            ),
            GateError::Thread(name) => format!(
                "What happened: The {name} loop could not run.\nLikely causes: Thread limits or a stalled device.\nHow to fix: Re-run with --log-level=debug for details."
            ),
            GateError::Hardware(msg) | GateError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Wiring, power or GPIO permissions.\nHow to fix: Check the [pins] values and that the process may access /dev/gpiomem and /dev/spidev0.0."
            ),
        };
    }

    if let Some(he) = err.downcast_ref::<HwError>() {
        return match he {
            HwError::SensorUnpowered => "What happened: The encoder sensor reported no supply.\nLikely causes: [pins].encoder_power not wired or switched off.\nHow to fix: Check the sensor supply line.".to_string(),
            HwError::Rt(msg) => format!(
                "What happened: Real-time setup failed ({msg}).\nHow to fix: Run without --rt, or grant CAP_SYS_NICE / CAP_IPC_LOCK."
            ),
            other => format!(
                "What happened: Hardware error ({other}).\nHow to fix: Check wiring and GPIO/SPI permissions."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let cause = cause_of(err);
    let cause = if cause.is_empty() {
        String::new()
    } else {
        format!(" Cause: {cause}")
    };
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit code for an error.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(_) => code::CONFIG,
            _ => code::HARDWARE,
        };
    }
    if let Some(ge) = err.downcast_ref::<GateError>() {
        return match ge {
            GateError::Config(_) => code::CONFIG,
            GateError::Hardware(_) | GateError::HardwareFault(_) => code::HARDWARE,
            GateError::State(_) => code::DOOR_FAULT,
            GateError::Thread(_) => code::GENERIC,
        };
    }
    if err.downcast_ref::<HwError>().is_some() {
        return code::HARDWARE;
    }
    code::GENERIC
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match exit_code_for_error(err) {
        code::CONFIG => "Config",
        code::HARDWARE => "Hardware",
        code::DOOR_FAULT => "DoorFault",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
