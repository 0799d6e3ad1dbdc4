//! The DMA-fed hardware-timed sampling variant (spec §4.4's "hardware
//! sampling loop"). Grounded on the Pico PIO capture path, which free-runs a
//! DMA channel off a pattern-matched GPIO snapshot and never inspects the
//! trigger mask while armed — trigger detection on this path is a known gap,
//! not an oversight (see SPEC_FULL.md §10).

use core::sync::atomic::{AtomicBool, Ordering};

use super::{dump, emit_sentinel, CaptureEngine, CaptureResources};
use crate::event::{Event, Observer};
use crate::params::Status;
use crate::pin_reader::PinReader;
use crate::time::TimeSource;
use crate::transport::Transport;

/// The platform-specific half of the hardware path: arm a free-running
/// sample clock (timer or PIO program) driving a DMA channel that snapshots
/// the pin register straight into `dst`, then report completion.
pub trait HardwareCapture {
    /// Program the sample-clock divider and DMA destination, and start.
    /// `dst` holds exactly `n_words` u32 slots.
    fn arm(&mut self, divider: f32, pin_base: u8, pin_count: u8, dst: &mut [u32], n_words: usize);

    /// Non-blocking completion check; `true` once the DMA transfer-complete
    /// flag is set.
    fn poll_complete(&mut self) -> bool;

    /// Disable the sample clock and DMA channel immediately.
    fn abort(&mut self);

    /// The fastest rate this hardware path can sustain; the ceiling used
    /// for the 1.5x "unsupportable" gate.
    fn max_frequency(&self) -> u32;
}

pub struct DmaCaptureEngine<'a, HW> {
    hw: HW,
    aborted: &'a AtomicBool,
}

impl<'a, HW: HardwareCapture> DmaCaptureEngine<'a, HW> {
    pub const fn new(hw: HW, aborted: &'a AtomicBool) -> Self {
        DmaCaptureEngine { hw, aborted }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn divider_for(&self, frequency_hz: u32) -> f32 {
        let ratio = self.hw.max_frequency() as f32 / frequency_hz.max(1) as f32;
        if ratio < 1.0 {
            1.0
        } else {
            ratio
        }
    }
}

impl<'a, const N: usize, HW: HardwareCapture, PR: PinReader, TR: Transport, TS: TimeSource, OB: Observer>
    CaptureEngine<N, PR, TR, TS, OB> for DmaCaptureEngine<'a, HW>
{
    fn capture(&mut self, res: &mut CaptureResources<N, PR, TR, TS, OB>) {
        self.aborted.store(false, Ordering::SeqCst);

        let ceiling = (self.hw.max_frequency() as u64 * 3) / 2;
        if res.params.frequency_hz as u64 > ceiling {
            log::warn!(
                "capture frequency {} exceeds hardware ceiling, refusing",
                res.params.frequency_hz
            );
            res.params.status = Status::Stopped;
            res.observer.on_event(Event::Status(Status::Stopped));
            emit_sentinel(res.transport);
            return;
        }

        let divider = self.divider_for(res.params.frequency_hz);
        let n_words = res.params.read_count as usize;
        let words = n_words.min(N);
        let start = res.time.now_micros();

        let data = res.buffer.data_mut();
        self.hw.arm(
            divider,
            res.params.start_pin,
            res.params.pin_count,
            &mut data[..words],
            words,
        );

        loop {
            if self.hw.poll_complete() {
                break;
            }
            if self.is_aborted() {
                self.hw.abort();
                emit_sentinel(res.transport);
                res.params.status = Status::Stopped;
                res.observer.on_event(Event::Status(Status::Stopped));
                return;
            }
        }

        let elapsed = res.time.now_micros().wrapping_sub(start).max(1);
        let achieved_hz = (n_words as u64 * 1_000_000 / elapsed as u64) as u32;
        log::debug!("hardware capture achieved ~{} Hz", achieved_hz);

        res.buffer.set_available(words);
        res.params.status = Status::Triggered;
        res.observer.on_event(Event::Status(Status::Triggered));

        dump(res.buffer, res.transport);
        res.params.status = Status::Stopped;
        res.observer.on_event(Event::Status(Status::Stopped));
    }

    fn cancel(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn capture_all(&mut self, res: &mut CaptureResources<N, PR, TR, TS, OB>) {
        // Speed-measurement mode: identical to `capture()` but skips the
        // dump, matching the original's `testCapture()` use of the same
        // arm/wait cycle purely to time it.
        self.aborted.store(false, Ordering::SeqCst);
        let divider = self.divider_for(res.params.frequency_hz);
        let n_words = res.params.read_count as usize;
        let words = n_words.min(N);
        let data = res.buffer.data_mut();
        self.hw.arm(
            divider,
            res.params.start_pin,
            res.params.pin_count,
            &mut data[..words],
            words,
        );
        while !self.hw.poll_complete() {
            if self.is_aborted() {
                self.hw.abort();
                return;
            }
        }
        res.buffer.set_available(words);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoOpObserver;
    use crate::params::{Parameters, WordWidth};
    use crate::ring_buffer::RingBuffer;

    struct FakeHw {
        max_hz: u32,
        ticks_to_complete: u32,
        aborted: bool,
        armed_words: usize,
    }

    impl HardwareCapture for FakeHw {
        fn arm(&mut self, _divider: f32, _pin_base: u8, _pin_count: u8, dst: &mut [u32], n_words: usize) {
            self.armed_words = n_words;
            for (i, slot) in dst.iter_mut().enumerate() {
                *slot = i as u32;
            }
        }
        fn poll_complete(&mut self) -> bool {
            if self.ticks_to_complete == 0 {
                true
            } else {
                self.ticks_to_complete -= 1;
                false
            }
        }
        fn abort(&mut self) {
            self.aborted = true;
        }
        fn max_frequency(&self) -> u32 {
            self.max_hz
        }
    }

    struct NullPins;
    impl PinReader for NullPins {
        fn read_all(&self) -> u32 {
            0
        }
    }

    struct TickTime {
        tick: core::cell::Cell<u32>,
    }
    impl TimeSource for TickTime {
        fn now_micros(&self) -> u32 {
            let t = self.tick.get();
            self.tick.set(t + 1);
            t
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
    fn completed_transfer_dumps_armed_words() {
        let hw = FakeHw {
            max_hz: 100_000_000,
            ticks_to_complete: 3,
            aborted: false,
            armed_words: 0,
        };
        let abort = AtomicBool::new(false);
        let mut engine = DmaCaptureEngine::new(hw, &abort);

        let mut params = Parameters::new(0, 8, WordWidth::W8, 16, 100_000_000, 100_000_000);
        params.set_read_delay_count(8, 0);
        let mut buffer: RingBuffer<16> = RingBuffer::new();
        let pins = NullPins;
        let time = TickTime {
            tick: core::cell::Cell::new(0),
        };
        let mut transport = VecTransport::default();
        let mut observer = NoOpObserver;

        let mut res = CaptureResources {
            params: &mut params,
            buffer: &mut buffer,
            pins: &pins,
            transport: &mut transport,
            time: &time,
            observer: &mut observer,
        };
        engine.capture(&mut res);

        assert_eq!(transport.out.len(), 8 * 4);
        assert_eq!(params.status, Status::Stopped);
    }

    #[test]
    fn over_ceiling_frequency_emits_sentinel_without_arming() {
        let hw = FakeHw {
            max_hz: 1_000_000,
            ticks_to_complete: 0,
            aborted: false,
            armed_words: 0,
        };
        let abort = AtomicBool::new(false);
        let mut engine = DmaCaptureEngine::new(hw, &abort);

        let mut params = Parameters::new(0, 8, WordWidth::W8, 16, 1_000_000, 1_000_000);
        params.set_frequency_hz(5_000_000);
        let mut buffer: RingBuffer<16> = RingBuffer::new();
        let pins = NullPins;
        let time = TickTime {
            tick: core::cell::Cell::new(0),
        };
        let mut transport = VecTransport::default();
        let mut observer = NoOpObserver;

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
        assert_eq!(engine.hw.armed_words, 0);
    }
}
