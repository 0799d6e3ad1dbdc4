//! C4 — the capture engine. Two variants (software-timed, DMA-backed)
//! share the same contract (spec §4.4, §9 "polymorphic capture" redesign):
//! a capability trait selected once at construction, rather than a base
//! class with virtual methods.

mod dma;
mod software;

pub use dma::{DmaCaptureEngine, HardwareCapture};
pub use software::SoftwareCaptureEngine;

use crate::event::Observer;
use crate::params::Parameters;
use crate::pin_reader::PinReader;
use crate::ring_buffer::RingBuffer;
use crate::transport::Transport;
use crate::time::TimeSource;

/// Everything a capture engine needs for one `capture()`/`capture_all()`
/// call, borrowed from the analyzer facade for the duration of the call.
pub struct CaptureResources<'a, const N: usize, PR, TR, TS, OB> {
    pub params: &'a mut Parameters,
    pub buffer: &'a mut RingBuffer<N>,
    pub pins: &'a PR,
    pub transport: &'a mut TR,
    pub time: &'a TS,
    pub observer: &'a mut OB,
}

pub trait CaptureEngine<const N: usize, PR: PinReader, TR: Transport, TS: TimeSource, OB: Observer> {
    /// Blocks until a complete windowed capture has been produced and
    /// dumped, or the configured frequency is unsupportable (in which case
    /// a single zero sentinel word unblocks the host and status returns to
    /// STOPPED).
    fn capture(&mut self, res: &mut CaptureResources<N, PR, TR, TS, OB>);

    /// Asynchronous abort; any in-flight acquisition finalizes shortly
    /// after by emitting the sentinel.
    fn cancel(&mut self);

    /// Test-mode: sample into the buffer without dumping, used for speed
    /// measurement.
    fn capture_all(&mut self, res: &mut CaptureResources<N, PR, TR, TS, OB>);
}

/// Emit the single zero sentinel word used to unblock the host on refusal
/// or abort (spec §7, §8 invariant 10).
pub(crate) fn emit_sentinel<TR: Transport>(transport: &mut TR) {
    transport.write_bytes(&crate::endian::to_wire_u32(0));
    transport.flush();
}

/// Drain the ring buffer to the transport as 32-bit big-endian words, in
/// batches, finishing with a flush (spec §4.4 "Dump").
pub(crate) fn dump<const N: usize, TR: Transport>(buffer: &mut RingBuffer<N>, transport: &mut TR) {
    const BATCH: usize = 256; // 1KiB of u32 words per write, per spec §4.4.
    let mut batch = [0u32; BATCH];
    let mut wire = [0u8; BATCH * 4];
    while buffer.available() > 0 {
        let n = buffer.read_bulk(&mut batch);
        for i in 0..n {
            wire[i * 4..i * 4 + 4].copy_from_slice(&crate::endian::to_wire_u32(batch[i]));
        }
        transport.write_bytes(&wire[..n * 4]);
    }
    transport.flush();
}

/// Apply the pre/post-trigger windowing policy once the trigger fires
/// (spec §4.4 "Windowing policy").
pub(crate) fn apply_window<const N: usize>(read_count: u32, delay_count: u32, buffer: &mut RingBuffer<N>) {
    let keep = read_count as i64 - delay_count as i64;
    if keep > 0 {
        let keep = keep as usize;
        if buffer.available() > keep {
            buffer.clear_n(buffer.available() - keep);
        }
    } else if keep < 0 {
        let drop = (-keep) as usize;
        buffer.clear_n(buffer.available() + drop);
    } else {
        buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::RingBuffer;

    #[test]
    fn window_policy_keeps_positive_tail() {
        let mut b: RingBuffer<16> = RingBuffer::new();
        for v in 0..10 {
            b.write(v);
        }
        // read_count=16, delay_count=8 => keep = 8 pre-trigger samples.
        apply_window(16, 8, &mut b);
        assert_eq!(b.available(), 8);
        assert_eq!(b.read(), 2); // oldest 2 of the original 10 were dropped
    }

    #[test]
    fn window_policy_zero_keep_clears() {
        let mut b: RingBuffer<16> = RingBuffer::new();
        for v in 0..10 {
            b.write(v);
        }
        apply_window(8, 8, &mut b);
        assert_eq!(b.available(), 0);
    }

    #[test]
    fn window_policy_negative_keep_sets_ignore() {
        let mut b: RingBuffer<16> = RingBuffer::new();
        for v in 0..4 {
            b.write(v);
        }
        // read_count=8, delay_count=16 => keep = -8: ignore the next 8 writes
        // (4 already available plus 8 more dropped == 12 total per spec's
        // clear(available + |keep|) formulation).
        apply_window(8, 16, &mut b);
        assert_eq!(b.available(), 0);
        assert_eq!(b.ignore_count(), 8);
    }
}
