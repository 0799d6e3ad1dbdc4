//! Wires `sump_core::Analyzer` to this board's pins, USB transport and
//! SysTick time source, and exposes the one `poll()` the main loop calls.

use rtt_target::rprintln;

use sump_bsp::delay::Delay;
use sump_bsp::gpio::Pin;
use sump_bsp::pin_reader::SamplePins;
use sump_core::{Analyzer, Event, Observer, SoftwareCaptureEngine, Status, WordWidth};

use crate::usb::SerialTransport;

/// Ring buffer capacity, in 32-bit sample words. 8192 words costs 32KiB of
/// the F7's SRAM, leaving headroom for the USB/RTT stacks alongside it.
pub const CAPTURE_WORDS: usize = 8192;

/// Upper bound the capture engine will attempt to honor at all (spec §4.4
/// "Rate selection"); above this the analyzer refuses and emits the
/// sentinel. A busy-wait sampling loop on this core cannot usefully exceed
/// a few tens of MHz, so this is set well under the core clock.
const MAX_SUPPORTED_HZ: u32 = 24_000_000;

/// At or above this rate the inter-sample `delay_micros` call is skipped
/// entirely and the loop runs flat out (spec §4.4's "free-running" case).
const MAX_SPEED_THRESHOLD_HZ: u32 = 10_000_000;

type Engine<'a> = SoftwareCaptureEngine<'a>;

/// Forwards protocol events to RTT so a serial console shows live capture
/// state, the same role the teacher's `rprintln!` calls play for DAP
/// command tracing.
pub struct RttObserver;

impl Observer for RttObserver {
    fn on_event(&mut self, event: Event) {
        rprintln!("event: {:?}", event);
    }
}

pub struct App<'a> {
    analyzer:
        Analyzer<'a, CAPTURE_WORDS, SamplePins<'a>, SerialTransport, &'a Delay, Engine<'a>, RttObserver>,
    led: Pin<'a>,
}

impl<'a> App<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pins: SamplePins<'a>,
        transport: SerialTransport,
        time: &'a Delay,
        capture: Engine<'a>,
        led: Pin<'a>,
        description: &'a [u8],
        firmware_version: &'a [u8],
    ) -> Self {
        let mut analyzer = Analyzer::begin(
            0,
            8,
            WordWidth::W8,
            CAPTURE_WORDS as u32,
            MAX_SUPPORTED_HZ,
            MAX_SPEED_THRESHOLD_HZ,
            pins,
            transport,
            time,
            capture,
            RttObserver,
            description,
            firmware_version,
        );
        analyzer.set_max_sample_rate_hz(MAX_SUPPORTED_HZ);

        App { analyzer, led }
    }

    /// Dispatch one pending command, if any, then reflect capture status
    /// on the status LED: lit while armed or triggered, dark while stopped.
    pub fn poll(&mut self) {
        self.analyzer.process_command();
        match self.analyzer.status() {
            Status::Stopped => self.led.set_high(),
            Status::Armed | Status::Triggered => self.led.set_low(),
        };
    }
}
