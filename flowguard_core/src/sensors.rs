//! Polled filament sensors.

use flowguard_traits::{DigitalInput, Millis};

use crate::error::GuardError;
use crate::hw_error::map_hw_error;
use crate::util::elapsed_ms;

fn read_level<P: DigitalInput + ?Sized>(pin: &mut P) -> Result<bool, GuardError> {
    pin.is_high().map_err(|e| map_hw_error(&*e))
}

/// Runout switch: logic low means no filament.
#[derive(Debug, Clone, Default)]
pub struct RunoutMonitor {
    runout: bool,
    seen: bool,
}

impl RunoutMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the switch. Returns `true` when the runout state changed.
    pub fn poll<P: DigitalInput + ?Sized>(&mut self, pin: &mut P) -> Result<bool, GuardError> {
        let runout = !read_level(pin)?;
        let flipped = self.seen && runout != self.runout;
        if runout && (flipped || !self.seen) {
            tracing::warn!("filament runout detected");
        } else if flipped {
            tracing::info!("filament present");
        }
        self.seen = true;
        self.runout = runout;
        Ok(flipped)
    }

    pub fn is_runout(&self) -> bool {
        self.runout
    }
}

/// Motion pulse input: every level change is one pulse.
#[derive(Debug, Clone, Default)]
pub struct PulseEdgeDetector {
    last_level: Option<bool>,
    last_edge_ms: Millis,
}

impl PulseEdgeDetector {
    pub fn new(now: Millis) -> Self {
        Self {
            last_level: None,
            last_edge_ms: now,
        }
    }

    /// Sample the pin. The first read only sets the baseline.
    pub fn poll<P: DigitalInput + ?Sized>(
        &mut self,
        pin: &mut P,
        now: Millis,
    ) -> Result<bool, GuardError> {
        let level = read_level(pin)?;
        let edge = self.last_level.is_some_and(|prev| prev != level);
        self.last_level = Some(level);
        if edge {
            self.last_edge_ms = now;
            tracing::trace!(level, "motion pulse");
        }
        Ok(edge)
    }

    /// Restart the movement timer without dropping the level baseline.
    pub fn restart(&mut self, now: Millis) {
        self.last_edge_ms = now;
    }

    pub fn ms_since_edge(&self, now: Millis) -> Millis {
        elapsed_ms(now, self.last_edge_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowguard_hardware::SimulatedInput;

    #[test]
    fn runout_follows_low_level() {
        let pin = SimulatedInput::new(true);
        let mut reader = pin.clone();
        let mut m = RunoutMonitor::new();
        assert!(!m.poll(&mut reader).unwrap());
        assert!(!m.is_runout());
        pin.set_high(false);
        assert!(m.poll(&mut reader).unwrap());
        assert!(m.is_runout());
        assert!(!m.poll(&mut reader).unwrap());
    }

    #[test]
    fn runout_present_at_boot_is_reported_without_a_flip() {
        let mut reader = SimulatedInput::new(false);
        let mut m = RunoutMonitor::new();
        assert!(!m.poll(&mut reader).unwrap());
        assert!(m.is_runout());
    }

    #[test]
    fn first_read_is_baseline() {
        let pin = SimulatedInput::new(true);
        let mut reader = pin.clone();
        let mut d = PulseEdgeDetector::new(0);
        assert!(!d.poll(&mut reader, 10).unwrap());
        assert!(!d.poll(&mut reader, 20).unwrap());
        pin.toggle();
        assert!(d.poll(&mut reader, 30).unwrap());
        assert_eq!(d.ms_since_edge(130), 100);
        pin.toggle();
        assert!(d.poll(&mut reader, 40).unwrap());
    }

    #[test]
    fn faulty_pin_surfaces_error_and_keeps_baseline() {
        let pin = SimulatedInput::new(false);
        let mut reader = pin.clone();
        let mut d = PulseEdgeDetector::new(0);
        d.poll(&mut reader, 0).unwrap();
        pin.set_fault(true);
        assert!(d.poll(&mut reader, 10).is_err());
        pin.set_fault(false);
        assert!(!d.poll(&mut reader, 20).unwrap());
    }

    #[test]
    fn restart_resets_movement_timer() {
        let mut d = PulseEdgeDetector::new(0);
        assert_eq!(d.ms_since_edge(5000), 5000);
        d.restart(4000);
        assert_eq!(d.ms_since_edge(5000), 1000);
    }
}
