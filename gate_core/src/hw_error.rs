//! Maps `Box<dyn Error>` from trait boundaries to typed `GateError`.
//!
//! The traits in `gate_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `gate_hardware::HwError` downcasting.

use crate::error::GateError;

/// Map a trait-boundary error to a typed `GateError`.
///
/// Known hardware error types are downcast first; anything else is reported
/// as a generic hardware error carrying its message.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> GateError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<gate_hardware::error::HwError>() {
            return match hw {
                gate_hardware::error::HwError::Io(io) => GateError::Hardware(io.to_string()),
                other => GateError::HardwareFault(other.to_string()),
            };
        }
    }

    GateError::Hardware(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_keep_their_message() {
        let e = std::io::Error::other("bus stuck");
        match map_hw_error(&e) {
            GateError::Hardware(msg) => assert!(msg.contains("bus stuck")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hardware_errors_map_to_faults() {
        let e = gate_hardware::error::HwError::Gpio("line 17 busy".into());
        assert!(matches!(map_hw_error(&e), GateError::HardwareFault(_)));
    }
}
