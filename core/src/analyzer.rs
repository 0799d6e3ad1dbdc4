//! C6 — the analyzer facade. Owns everything a capture needs and drives
//! the protocol dispatch loop; this is the one type the platform binding
//! actually constructs and calls into (spec §4.6).

use core::convert::TryFrom;

use crate::capture::{CaptureEngine, CaptureResources};
use crate::event::{Event, Observer};
use crate::params::{Parameters, Status, WordWidth};
use crate::pin_reader::PinReader;
use crate::protocol::{self, Command};
use crate::ring_buffer::RingBuffer;
use crate::time::TimeSource;
use crate::transport::Transport;

/// RESET is debounced because SUMP hosts send it five times in a row on
/// connect (spec §4.5).
const RESET_DEBOUNCE_US: u32 = 500_000;

pub struct Analyzer<'a, const N: usize, PR, TR, TS, CE, OB> {
    params: Parameters,
    buffer: RingBuffer<N>,
    pins: PR,
    transport: TR,
    time: TS,
    capture: CE,
    observer: OB,
    description: &'a [u8],
    firmware_version: &'a [u8],
    max_sample_rate_hz: Option<u32>,
    last_reset_us: Option<u32>,
}

impl<'a, const N: usize, PR, TR, TS, CE, OB> Analyzer<'a, N, PR, TR, TS, CE, OB>
where
    PR: PinReader,
    TR: Transport,
    TS: TimeSource,
    CE: CaptureEngine<N, PR, TR, TS, OB>,
    OB: Observer,
{
    #[allow(clippy::too_many_arguments)]
    pub fn begin(
        start_pin: u8,
        pin_count: u8,
        word_bits: WordWidth,
        max_capture_size: u32,
        max_supported_hz: u32,
        max_speed_threshold: u32,
        pins: PR,
        transport: TR,
        time: TS,
        capture: CE,
        observer: OB,
        description: &'a [u8],
        firmware_version: &'a [u8],
    ) -> Self {
        Analyzer {
            params: Parameters::new(
                start_pin,
                pin_count,
                word_bits,
                max_capture_size,
                max_supported_hz,
                max_speed_threshold,
            ),
            buffer: RingBuffer::new(),
            pins,
            transport,
            time,
            capture,
            observer,
            description,
            firmware_version,
            max_sample_rate_hz: None,
            last_reset_us: None,
        }
    }

    /// Opt into advertising the calibrated max sample rate (metadata tag
    /// `0x23`), omitted by default per SPEC_FULL.md §10.
    pub fn set_max_sample_rate_hz(&mut self, hz: u32) {
        self.max_sample_rate_hz = Some(hz);
    }

    pub fn set_description(&mut self, description: &'a [u8]) {
        self.description = description;
    }

    pub fn status(&self) -> Status {
        self.params.status
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Consume and dispatch exactly one command if the transport has
    /// bytes waiting; otherwise return immediately (spec §4.5 "Dispatch
    /// state" — stateless, one command per call, host drives the loop).
    pub fn process_command(&mut self) {
        if self.transport.bytes_available() == 0 {
            return;
        }
        let Some(opcode) = self.transport.read_byte() else {
            return;
        };
        let Ok(command) = Command::try_from(opcode) else {
            log::warn!("unrecognized SUMP opcode 0x{:02X}, ignoring", opcode);
            return;
        };

        let mut arg = [0u8; 4];
        if command.is_long() && self.transport.read_exact(&mut arg).is_none() {
            log::warn!("short read of 4-byte argument for {:?}, abandoning command", command);
            return;
        }

        match command {
            Command::Reset => self.handle_reset(),
            Command::Arm => self.handle_arm(),
            Command::Id => {
                self.transport.write_bytes(&protocol::DEVICE_ID);
                self.transport.flush();
            }
            Command::GetMetadata => protocol::write_metadata(
                &mut self.transport,
                self.description,
                self.firmware_version,
                self.params.pin_count,
                self.params.max_capture_size,
                self.max_sample_rate_hz,
            ),
            Command::Xon | Command::Xoff => {}
            Command::SetDivider => {
                let freq = protocol::decode_divider(arg);
                self.params.set_frequency_hz(freq);
                self.observer.on_event(Event::CaptureFrequency(freq));
            }
            Command::SetReadDelayCount => {
                let (read_count, delay_count) = protocol::decode_read_delay_count(arg);
                self.params.set_read_delay_count(read_count, delay_count);
                self.observer.on_event(Event::ReadDelayCount {
                    read_count: self.params.read_count,
                    delay_count: self.params.delay_count,
                });
            }
            Command::SetFlags => {
                let continuous = protocol::decode_flags_continuous(arg);
                self.params.continuous = continuous;
                self.observer.on_event(Event::Flags { continuous });
            }
            Command::TriggerMask => {
                let mask = protocol::decode_trigger_bits(arg, self.params.word_bits);
                self.params.trigger_mask = mask;
                self.observer.on_event(Event::TriggerMask(mask));
            }
            Command::TriggerValues => {
                let values = protocol::decode_trigger_bits(arg, self.params.word_bits);
                self.params.trigger_values = values;
                self.observer.on_event(Event::TriggerValues(values));
            }
            Command::TriggerConfig => {
                // Read and ignore — no multi-stage trigger support (spec
                // Non-goals), the argument bytes are already consumed above.
            }
        }
    }

    fn handle_reset(&mut self) {
        let now = self.time.now_micros();
        if let Some(last) = self.last_reset_us {
            if now.wrapping_sub(last) < RESET_DEBOUNCE_US {
                return;
            }
        }
        self.last_reset_us = Some(now);

        if self.params.status != Status::Stopped {
            self.capture.cancel();
        }
        self.buffer.clear();
        self.params.status = Status::Stopped;
        self.observer.on_event(Event::Reset);
        self.observer.on_event(Event::Status(Status::Stopped));
    }

    fn handle_arm(&mut self) {
        self.buffer.clear();
        self.params.status = Status::Armed;
        self.observer.on_event(Event::Status(Status::Armed));

        let mut res = CaptureResources {
            params: &mut self.params,
            buffer: &mut self.buffer,
            pins: &self.pins,
            transport: &mut self.transport,
            time: &self.time,
            observer: &mut self.observer,
        };
        self.capture.capture(&mut res);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoOpObserver;
    use core::sync::atomic::AtomicBool;

    struct FixedPins(u32);
    impl PinReader for FixedPins {
        fn read_all(&self) -> u32 {
            self.0
        }
    }

    struct FakeTime;
    impl TimeSource for FakeTime {
        fn now_micros(&self) -> u32 {
            0
        }
        fn delay_micros(&self, _us: u32) {}
    }

    #[derive(Default)]
    struct QueueTransport {
        inbound: std::collections::VecDeque<u8>,
        out: std::vec::Vec<u8>,
    }
    impl Transport for QueueTransport {
        fn read_byte(&mut self) -> Option<u8> {
            self.inbound.pop_front()
        }
        fn bytes_available(&self) -> usize {
            self.inbound.len()
        }
        fn write_bytes(&mut self, buf: &[u8]) {
            self.out.extend_from_slice(buf);
        }
        fn flush(&mut self) {}
        fn set_timeout_ms(&mut self, _timeout_ms: u32) {}
    }

    use crate::capture::SoftwareCaptureEngine;

    fn analyzer<'a>(
        abort: &'a AtomicBool,
        transport: QueueTransport,
    ) -> Analyzer<'a, 64, FixedPins, QueueTransport, FakeTime, SoftwareCaptureEngine<'a>, NoOpObserver> {
        Analyzer::begin(
            0,
            8,
            WordWidth::W8,
            64,
            10_000_000,
            8_000_000,
            FixedPins(0xAB),
            transport,
            FakeTime,
            SoftwareCaptureEngine::new(abort),
            NoOpObserver,
            b"sump-core",
            b"0.1.0",
        )
    }

    #[test]
    fn s1_id_command_replies_1als() {
        let abort = AtomicBool::new(false);
        let mut transport = QueueTransport::default();
        transport.inbound.push_back(0x02);
        let mut a = analyzer(&abort, transport);
        a.process_command();
        assert_eq!(a.transport.out, [0x31, 0x41, 0x4C, 0x53]);
    }

    #[test]
    fn no_bytes_available_is_a_no_op() {
        let abort = AtomicBool::new(false);
        let mut a = analyzer(&abort, QueueTransport::default());
        a.process_command();
        assert!(a.transport.out.is_empty());
    }

    #[test]
    fn set_divider_updates_frequency_and_delay() {
        let abort = AtomicBool::new(false);
        let mut transport = QueueTransport::default();
        transport.inbound.extend([0x80, 0x00, 0x00, 0x00, 0x63]);
        let mut a = analyzer(&abort, transport);
        a.process_command();
        assert_eq!(a.params.frequency_hz, 1_000_000);
        assert_eq!(a.params.delay_time_us, 1);
    }

    #[test]
    fn reset_is_debounced_within_500ms() {
        let abort = AtomicBool::new(false);
        let mut transport = QueueTransport::default();
        transport.inbound.extend([0x00, 0x00]);
        let mut a = analyzer(&abort, transport);
        a.process_command();
        let first_stamp = a.last_reset_us;
        a.process_command();
        assert_eq!(a.last_reset_us, first_stamp);
    }

    #[test]
    fn unknown_opcode_is_logged_and_ignored_without_desync() {
        let abort = AtomicBool::new(false);
        let mut transport = QueueTransport::default();
        transport.inbound.extend([0x55, 0x02]);
        let mut a = analyzer(&abort, transport);
        a.process_command(); // unknown opcode, consumes just the one byte
        a.process_command(); // next call sees the resynchronized ID command
        assert_eq!(a.transport.out, [0x31, 0x41, 0x4C, 0x53]);
    }
}
