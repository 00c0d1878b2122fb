pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use flowguard_traits::{DigitalInput, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Simulated digital input. Clones share the same level, so a test or
/// script driver keeps one handle and hands the other to the guard.
#[derive(Debug, Clone)]
pub struct SimulatedInput {
    level: Arc<AtomicBool>,
    fault: Arc<AtomicBool>,
}

impl SimulatedInput {
    pub fn new(initial_high: bool) -> Self {
        Self {
            level: Arc::new(AtomicBool::new(initial_high)),
            fault: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_high(&self, high: bool) {
        self.level.store(high, Ordering::Relaxed);
    }

    pub fn toggle(&self) {
        self.level.fetch_xor(true, Ordering::Relaxed);
    }

    /// While set, every read fails with a GPIO error.
    pub fn set_fault(&self, failing: bool) {
        self.fault.store(failing, Ordering::Relaxed);
    }
}

impl DigitalInput for SimulatedInput {
    fn is_high(&mut self) -> Result<bool, BoxError> {
        if self.fault.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::Gpio("simulated read fault".into())));
        }
        Ok(self.level.load(Ordering::Relaxed))
    }
}

/// Simulated transport that records every frame it is asked to send.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    connected: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_connected(&self, up: bool) {
        self.connected.store(up, Ordering::Relaxed);
    }

    /// Frames sent so far, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Drain and return the recorded frames.
    pub fn take_sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default()
    }
}

impl Transport for SimulatedTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn send_text(&mut self, frame: &str) -> Result<(), BoxError> {
        if !self.is_connected() {
            return Err(Box::new(HwError::NotConnected));
        }
        tracing::trace!(frame, "simulated send");
        self.sent
            .lock()
            .map_err(|e| HwError::Send(e.to_string()))?
            .push(frame.to_owned());
        Ok(())
    }
}
