use flowguard_traits::DigitalInput;
use rppal::gpio::{Gpio, InputPin};

use crate::error::{HwError, Result};

/// Physical input pin with the internal pull-up enabled.
///
/// The runout switch reads high while filament is present; the motion sensor
/// toggles once per pulse.
pub struct GpioInput {
    pin: InputPin,
}

impl GpioInput {
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let pin = gpio
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pullup();
        tracing::debug!(pin = bcm_pin, "gpio input configured");
        Ok(Self { pin })
    }
}

impl DigitalInput for GpioInput {
    fn is_high(&mut self) -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.pin.is_high())
    }
}
