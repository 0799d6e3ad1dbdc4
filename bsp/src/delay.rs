use crate::rcc::Clocks;
use core::sync::atomic::{AtomicU32, Ordering};
use stm32ral::syst;
use stm32ral::{modify_reg, read_reg, write_reg};

use sump_core::TimeSource;

const SYST_CSR_ENABLE: u32 = 1 << 0;
const SYST_CSR_TICKINT: u32 = 1 << 1;
const SYST_CSR_CLKSOURCE: u32 = 1 << 2;

/// SysTick-derived delay and monotonic microsecond clock.
///
/// `base_clock` is an `AtomicU32` rather than a plain field because
/// `set_sysclk` runs once during clock bring-up while `delay_us`/
/// `now_micros` are called from both the main poll loop and (for
/// `now_micros`) the capture engine's frequency-measurement path.
pub struct Delay {
    systick: syst::Instance,
    base_clock: AtomicU32,
    /// Incremented by `on_systick_overflow`, called from the SysTick
    /// exception handler, so `now_micros` stays monotonic past a single
    /// 24-bit reload period.
    overflows: AtomicU32,
}

impl Delay {
    pub fn new(systick: syst::Instance) -> Self {
        modify_reg!(syst, systick, CSR, |r| (r | SYST_CSR_CLKSOURCE));
        write_reg!(syst, systick, RVR, 0xffffff);
        write_reg!(syst, systick, CVR, 0);
        modify_reg!(syst, systick, CSR, |r| (r
            | SYST_CSR_ENABLE
            | SYST_CSR_TICKINT));

        Delay {
            systick,
            base_clock: AtomicU32::new(0),
            overflows: AtomicU32::new(0),
        }
    }

    pub fn set_sysclk(&self, clocks: &Clocks) {
        self.base_clock.store(clocks.hclk(), Ordering::SeqCst);
    }

    /// Call from the `SysTick` exception handler.
    pub fn on_systick_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::SeqCst);
    }

    pub fn delay_us(&self, us: u32) {
        let base_clock = self.base_clock.load(Ordering::SeqCst);
        debug_assert!(base_clock > 0);

        let ticks = (us as u64) * (base_clock as u64) / 1_000_000;
        self.delay_ticks(ticks as u32);
    }

    pub fn calc_period_ticks(&self, frequency: u32) -> u32 {
        let base_clock = self.base_clock.load(Ordering::SeqCst);
        debug_assert!(base_clock > 0);

        base_clock / frequency
    }

    pub fn delay_ticks(&self, mut ticks: u32) {
        let mut last = self.get_current();
        loop {
            let now = self.get_current();
            let delta = last.wrapping_sub(now) & 0xffffff;

            if delta >= ticks {
                break;
            } else {
                ticks -= delta;
                last = now;
            }
        }
    }

    pub fn delay_ticks_from_last(&self, mut ticks: u32, mut last: u32) -> u32 {
        loop {
            let now = self.get_current();
            let delta = last.wrapping_sub(now) & 0xffffff;

            if delta >= ticks {
                break now;
            } else {
                ticks -= delta;
                last = now;
            }
        }
    }

    #[inline(always)]
    pub fn get_current(&self) -> u32 {
        read_reg!(syst, self.systick, CVR)
    }

    /// Microseconds elapsed since `base_clock` was set, free-running and
    /// wrapping in `u32`. Combines the overflow count with the current
    /// down-counter value, the same two-field approach as
    /// `delay_ticks_from_last`'s wraparound handling.
    pub fn micros(&self) -> u32 {
        let base_clock = self.base_clock.load(Ordering::SeqCst).max(1);
        let overflows = self.overflows.load(Ordering::SeqCst) as u64;
        let counted_down = 0xffffffu64 - self.get_current() as u64;
        let ticks = overflows * 0x1000000 + counted_down;
        (ticks * 1_000_000 / base_clock as u64) as u32
    }
}

impl TimeSource for Delay {
    fn now_micros(&self) -> u32 {
        self.micros()
    }

    fn delay_micros(&self, us: u32) {
        self.delay_us(us);
    }
}
