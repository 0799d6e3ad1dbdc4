use crate::gpio::GPIO;
use sump_core::PinReader;

/// Reads the configured contiguous GPIO window from a single port and
/// shifts it down to bit 0, per `sump_core::PinReader`'s contract.
pub struct SamplePins<'a> {
    gpio: &'a GPIO,
    start_pin: u8,
}

impl<'a> SamplePins<'a> {
    pub fn new(gpio: &'a GPIO, start_pin: u8) -> Self {
        SamplePins { gpio, start_pin }
    }
}

impl<'a> PinReader for SamplePins<'a> {
    fn read_all(&self) -> u32 {
        self.gpio.get_idr() >> self.start_pin
    }
}
