//! The portable, busy-wait-timed sampling loop (spec §4.4's "software
//! sampling loop").

use core::sync::atomic::{AtomicBool, Ordering};

use super::{apply_window, dump, emit_sentinel, CaptureEngine, CaptureResources};
use crate::event::{Event, Observer};
use crate::params::Status;
use crate::pin_reader::PinReader;
use crate::time::TimeSource;
use crate::transport::Transport;

/// Busy-wait timed capture.
///
/// `cancel()` is meant to be callable from an interrupt context while
/// `capture()` spins in the caller's main context, so the abort flag is a
/// *borrowed* atomic rather than one owned by the engine — the platform
/// integrator places a `static ABORT: AtomicBool` and hands a reference to
/// both this engine and its interrupt handler, the same sharing pattern
/// the teacher uses for `Delay`'s `AtomicU32` base clock.
pub struct SoftwareCaptureEngine<'a> {
    aborted: &'a AtomicBool,
}

impl<'a> SoftwareCaptureEngine<'a> {
    pub const fn new(aborted: &'a AtomicBool) -> Self {
        SoftwareCaptureEngine { aborted }
    }

    fn take_sample<PR: PinReader>(pins: &PR, mask: u32) -> u32 {
        pins.read_all() & mask
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn finalize_aborted<const N: usize, PR: PinReader, TR: Transport, TS: TimeSource, OB: Observer>(
        &self,
        res: &mut CaptureResources<N, PR, TR, TS, OB>,
    ) {
        emit_sentinel(res.transport);
        res.params.status = Status::Stopped;
        res.observer.on_event(Event::Status(Status::Stopped));
    }
}

impl<'a, const N: usize, PR: PinReader, TR: Transport, TS: TimeSource, OB: Observer>
    CaptureEngine<N, PR, TR, TS, OB> for SoftwareCaptureEngine<'a>
{
    fn capture(&mut self, res: &mut CaptureResources<N, PR, TR, TS, OB>) {
        self.aborted.store(false, Ordering::SeqCst);

        let freq = res.params.frequency_hz as u64;
        if freq > (res.params.max_supported_hz as u64 * 3) / 2 {
            log::warn!("capture frequency {} unsupported, refusing", freq);
            res.params.status = Status::Stopped;
            res.observer.on_event(Event::Status(Status::Stopped));
            emit_sentinel(res.transport);
            return;
        }
        let max_speed = res.params.frequency_hz >= res.params.max_speed_threshold;
        let mask = res.params.window_mask();

        // The sample that satisfies the trigger is the *first post-trigger*
        // sample (spec §4.4 "Trigger detection"), not pre-trigger history,
        // so it is held here rather than written to the buffer/transport
        // inside the wait loop, and injected after windowing below.
        let mut trigger_sample = 0u32;
        if res.params.trigger_mask == 0 {
            res.params.status = Status::Triggered;
        } else {
            loop {
                if self.is_aborted() {
                    self.finalize_aborted(res);
                    return;
                }
                let sample = Self::take_sample(res.pins, mask);
                let hit = (res.params.trigger_values ^ sample) & res.params.trigger_mask == 0;
                if hit {
                    trigger_sample = sample;
                    res.params.status = Status::Triggered;
                    break;
                }
                if res.params.continuous {
                    res.transport
                        .write_bytes(&crate::endian::to_wire_u32(sample));
                } else {
                    res.buffer.write(sample);
                }
                if !max_speed {
                    res.time.delay_micros(res.params.delay_time_us);
                }
            }
        }
        res.observer.on_event(Event::Status(Status::Triggered));

        if res.params.continuous {
            if res.params.trigger_mask != 0 {
                res.transport
                    .write_bytes(&crate::endian::to_wire_u32(trigger_sample));
                if !max_speed {
                    res.time.delay_micros(res.params.delay_time_us);
                }
            }
            while res.params.status == Status::Triggered && !self.is_aborted() {
                let sample = Self::take_sample(res.pins, mask);
                res.transport
                    .write_bytes(&crate::endian::to_wire_u32(sample));
                if !max_speed {
                    res.time.delay_micros(res.params.delay_time_us);
                }
            }
            if self.is_aborted() {
                self.finalize_aborted(res);
            }
            return;
        }

        apply_window(res.params.read_count, res.params.delay_count, res.buffer);
        if res.params.trigger_mask != 0 && (res.buffer.available() as u32) < res.params.read_count {
            res.buffer.write(trigger_sample);
        }

        while res.params.status == Status::Triggered
            && (res.buffer.available() as u32) < res.params.read_count
            && !self.is_aborted()
        {
            let sample = Self::take_sample(res.pins, mask);
            res.buffer.write(sample);
            if !max_speed {
                res.time.delay_micros(res.params.delay_time_us);
            }
        }

        if self.is_aborted() {
            self.finalize_aborted(res);
            return;
        }

        dump(res.buffer, res.transport);
        res.params.status = Status::Stopped;
        res.observer.on_event(Event::Status(Status::Stopped));
    }

    fn cancel(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn capture_all(&mut self, res: &mut CaptureResources<N, PR, TR, TS, OB>) {
        self.aborted.store(false, Ordering::SeqCst);
        let max_speed = res.params.frequency_hz >= res.params.max_speed_threshold;
        let mask = res.params.window_mask();
        while res.params.status == Status::Triggered
            && (res.buffer.available() as u32) < res.params.read_count
            && !self.is_aborted()
        {
            let sample = Self::take_sample(res.pins, mask);
            res.buffer.write(sample);
            if !max_speed {
                res.time.delay_micros(res.params.delay_time_us);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoOpObserver;
    use crate::params::{Parameters, WordWidth};
    use crate::ring_buffer::RingBuffer;

    struct CyclingPins {
        modulus: u32,
        next: core::cell::Cell<u32>,
    }

    impl PinReader for CyclingPins {
        fn read_all(&self) -> u32 {
            let v = self.next.get();
            self.next.set((v + 1) % self.modulus);
            v
        }
    }

    /// Pins that abort the capture after a fixed number of samples, the
    /// test-harness stand-in for an ISR calling `cancel()` mid-capture.
    struct SelfCancelingPins<'a> {
        remaining: core::cell::Cell<u32>,
        abort: &'a AtomicBool,
    }

    impl<'a> PinReader for SelfCancelingPins<'a> {
        fn read_all(&self) -> u32 {
            let left = self.remaining.get();
            if left == 0 {
                self.abort.store(true, Ordering::SeqCst);
                0
            } else {
                self.remaining.set(left - 1);
                left
            }
        }
    }

    struct NullTime;
    impl TimeSource for NullTime {
        fn now_micros(&self) -> u32 {
            0
        }
        fn delay_micros(&self, _us: u32) {}
    }

    #[derive(Default)]
    struct VecTransport {
        out: std::vec::Vec<u8>,
    }
    impl Transport for VecTransport {
        fn read_byte(&mut self) -> Option<u8> {
            None
        }
        fn bytes_available(&self) -> usize {
            0
        }
        fn write_bytes(&mut self, buf: &[u8]) {
            self.out.extend_from_slice(buf);
        }
        fn flush(&mut self) {}
        fn set_timeout_ms(&mut self, _timeout_ms: u32) {}
    }

    #[test]
    fn s3_divider_dump_matches_cycling_samples() {
        let pins = CyclingPins {
            modulus: 256,
            next: core::cell::Cell::new(0),
        };
        let time = NullTime;
        let mut transport = VecTransport::default();
        let mut observer = NoOpObserver;
        let mut params = Parameters::new(0, 8, WordWidth::W8, 1024, 10_000_000, 8_000_000);
        params.set_frequency_hz(1_000_000);
        params.set_read_delay_count(1024, 0);
        let abort = AtomicBool::new(false);
        let mut buffer: RingBuffer<1024> = RingBuffer::new();
        let mut engine = SoftwareCaptureEngine::new(&abort);

        let mut res = CaptureResources {
            params: &mut params,
            buffer: &mut buffer,
            pins: &pins,
            transport: &mut transport,
            time: &time,
            observer: &mut observer,
        };
        engine.capture(&mut res);

        assert_eq!(transport.out.len(), 1024 * 4);
        for (i, chunk) in transport.out.chunks(4).enumerate() {
            let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            assert_eq!(word & 0xFF, (i as u32) % 256);
        }
    }

    #[test]
    fn s4_trigger_sample_matches_mask_and_values() {
        let pins = CyclingPins {
            modulus: 16,
            next: core::cell::Cell::new(0),
        };
        let time = NullTime;
        let mut transport = VecTransport::default();
        let mut observer = NoOpObserver;
        let mut params = Parameters::new(0, 4, WordWidth::W8, 64, 10_000_000, 8_000_000);
        params.set_frequency_hz(10_000_000); // max speed: no inter-sample delay
        params.set_read_delay_count(16, 8);
        params.trigger_mask = 0x0F;
        params.trigger_values = 0x0A;
        let abort = AtomicBool::new(false);
        let mut buffer: RingBuffer<64> = RingBuffer::new();
        let mut engine = SoftwareCaptureEngine::new(&abort);

        let mut res = CaptureResources {
            params: &mut params,
            buffer: &mut buffer,
            pins: &pins,
            transport: &mut transport,
            time: &time,
            observer: &mut observer,
        };
        engine.capture(&mut res);

        assert_eq!(transport.out.len(), 16 * 4);
        let ninth = u32::from_be_bytes(transport.out[8 * 4..9 * 4].try_into().unwrap());
        assert_eq!(ninth, 0x0A);
    }

    #[test]
    fn s7_unsupported_rate_emits_sentinel_and_stops() {
        let pins = CyclingPins {
            modulus: 2,
            next: core::cell::Cell::new(0),
        };
        let time = NullTime;
        let mut transport = VecTransport::default();
        let mut observer = NoOpObserver;
        let mut params = Parameters::new(0, 1, WordWidth::W8, 16, 1_000_000, 800_000);
        params.set_frequency_hz(2_000_000);
        let abort = AtomicBool::new(false);
        let mut buffer: RingBuffer<16> = RingBuffer::new();
        let mut engine = SoftwareCaptureEngine::new(&abort);

        let mut res = CaptureResources {
            params: &mut params,
            buffer: &mut buffer,
            pins: &pins,
            transport: &mut transport,
            time: &time,
            observer: &mut observer,
        };
        engine.capture(&mut res);

        assert_eq!(transport.out, [0, 0, 0, 0]);
        assert_eq!(params.status, Status::Stopped);
    }

    #[test]
    fn continuous_mode_never_writes_the_ring_buffer() {
        let abort = AtomicBool::new(false);
        let pins = SelfCancelingPins {
            remaining: core::cell::Cell::new(5),
            abort: &abort,
        };
        let time = NullTime;
        let mut transport = VecTransport::default();
        let mut observer = NoOpObserver;
        let mut params = Parameters::new(0, 2, WordWidth::W8, 16, 10_000_000, 8_000_000);
        params.set_frequency_hz(10_000_000);
        params.continuous = true;
        let mut buffer: RingBuffer<16> = RingBuffer::new();
        let mut engine = SoftwareCaptureEngine::new(&abort);

        let mut res = CaptureResources {
            params: &mut params,
            buffer: &mut buffer,
            pins: &pins,
            transport: &mut transport,
            time: &time,
            observer: &mut observer,
        };
        engine.capture(&mut res);

        // 5 samples streamed straight to the transport, then the 6th
        // read_all() call flips the abort flag and a sentinel follows.
        assert_eq!(buffer.available(), 0);
        assert_eq!(transport.out.len(), 6 * 4);
        assert_eq!(&transport.out[20..24], &[0, 0, 0, 0]);
    }
}
