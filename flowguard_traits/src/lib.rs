pub mod clock;

pub use clock::{Clock, ManualClock, Millis, MonotonicClock};

/// A polled digital input (runout switch, motion pulse pin).
pub trait DigitalInput {
    /// Current logic level; `true` is high.
    fn is_high(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Text-frame connection to the printer's remote controller.
///
/// Connection management (handshake, reconnect, address changes) belongs to
/// the implementation; the engine only asks whether the link is up and hands
/// over serialized frames.
pub trait Transport {
    fn is_connected(&self) -> bool;
    fn send_text(&mut self, frame: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: DigitalInput + ?Sized> DigitalInput for Box<T> {
    fn is_high(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).is_high()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn send_text(&mut self, frame: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send_text(frame)
    }
}
