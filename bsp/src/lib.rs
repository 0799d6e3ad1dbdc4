//! STM32F7 reference binding for `sump-core`'s external collaborator
//! traits: GPIO sample reading, a SysTick time source, clock bring-up,
//! and the DMA-fed hardware capture path.
#![no_std]

pub mod delay;
pub mod gpio;
pub mod otg_fs;
pub mod pattern_capture;
pub mod pin_reader;
pub mod rcc;

pub use delay::Delay;
pub use gpio::GPIO;
pub use pattern_capture::PatternCapture;
pub use pin_reader::SamplePins;
