//! Maps `Box<dyn Error>` from trait boundaries to typed `GuardError`.
//!
//! `DigitalInput` and `Transport` return boxed errors so any backend can plug
//! in; with the `hardware-errors` feature the known `HwError` variants are
//! recovered precisely instead of by message text.

use crate::error::GuardError;

/// Map a pin or transport error to a typed `GuardError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> GuardError {
    #[cfg(feature = "hardware-errors")]
    {
        use flowguard_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::NotConnected | HwError::Send(_) => GuardError::Transport(hw.to_string()),
                other => GuardError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("connect") || lower.contains("send") || lower.contains("socket") {
        GuardError::Transport(s)
    } else {
        GuardError::Hardware(s)
    }
}
