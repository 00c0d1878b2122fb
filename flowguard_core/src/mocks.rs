//! Test and helper mocks for flowguard_core

use flowguard_traits::{DigitalInput, Transport};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A pin that always errors on read.
pub struct FailingInput;

impl DigitalInput for FailingInput {
    fn is_high(&mut self) -> Result<bool, BoxError> {
        Err(Box::new(std::io::Error::other("pin unavailable")))
    }
}

/// A transport that claims to be up but fails every send.
pub struct FailingTransport;

impl Transport for FailingTransport {
    fn is_connected(&self) -> bool {
        true
    }

    fn send_text(&mut self, _frame: &str) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("socket send failed")))
    }
}

/// A transport that never connects; useful for offline checks.
pub struct NullTransport;

impl Transport for NullTransport {
    fn is_connected(&self) -> bool {
        false
    }

    fn send_text(&mut self, _frame: &str) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("not connected")))
    }
}
