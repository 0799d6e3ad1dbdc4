//! The DMA-fed hardware sampling path (spec §4.4 "hardware-timed
//! variant"): a free-running timer update event triggers a DMA transfer
//! that snapshots a GPIO port's `IDR` register straight into the ring
//! buffer's backing storage. This is the peripheral-to-memory DMA wiring
//! pattern from `dma.rs`'s SPI/UART streams, redirected from a data
//! register to a GPIO input register and clocked by a timer instead of
//! the peripheral itself.

use core::sync::atomic::{AtomicBool, Ordering};
use stm32ral::{dma, tim2};
use stm32ral::{modify_reg, read_reg, write_reg};

use sump_core::HardwareCapture;

/// TIM2 is on APB1; at the 216MHz core frequency this bus runs at 54MHz
/// with the x2 multiplier applied, per the reference clock tree in
/// `rcc.rs`.
const TIM2_CLOCK_HZ: u32 = 108_000_000;

pub struct PatternCapture {
    tim2: tim2::Instance,
    dma2: dma::Instance,
    gpio_idr_addr: u32,
    max_hz: u32,
    aborted: AtomicBool,
}

impl PatternCapture {
    pub fn new(tim2: tim2::Instance, dma2: dma::Instance, gpio_idr_addr: u32, max_hz: u32) -> Self {
        PatternCapture {
            tim2,
            dma2,
            gpio_idr_addr,
            max_hz,
            aborted: AtomicBool::new(false),
        }
    }
}

impl HardwareCapture for PatternCapture {
    fn arm(&mut self, divider: f32, _pin_base: u8, _pin_count: u8, dst: &mut [u32], n_words: usize) {
        self.aborted.store(false, Ordering::SeqCst);

        // DMA2 stream 1, channel 6 (TIM2_UP), peripheral-to-memory, word
        // sized to match the `u32` sample word the core always stores.
        write_reg!(
            dma,
            self.dma2,
            CR1,
            CHSEL: 6,
            PL: High,
            MSIZE: Bits32,
            PSIZE: Bits32,
            MINC: Incremented,
            PINC: Fixed,
            CIRC: Disabled,
            DIR: PeripheralToMemory,
            EN: Disabled
        );
        write_reg!(dma, self.dma2, PAR1, self.gpio_idr_addr);
        write_reg!(dma, self.dma2, M0AR1, dst.as_mut_ptr() as u32);
        write_reg!(dma, self.dma2, NDTR1, n_words as u32);
        cortex_m::asm::dsb();
        modify_reg!(dma, self.dma2, CR1, EN: Enabled);

        let period_ticks = (TIM2_CLOCK_HZ as f32 * divider / self.max_hz as f32).max(1.0) as u32;
        write_reg!(tim2, self.tim2, ARR, period_ticks.saturating_sub(1));
        write_reg!(tim2, self.tim2, CNT, 0);
        modify_reg!(tim2, self.tim2, DIER, UDE: Enabled);
        modify_reg!(tim2, self.tim2, CR1, CEN: Enabled);
    }

    fn poll_complete(&mut self) -> bool {
        read_reg!(dma, self.dma2, LISR, TCIF1 == Complete)
    }

    fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
        modify_reg!(tim2, self.tim2, CR1, CEN: Disabled);
        modify_reg!(dma, self.dma2, CR1, EN: Disabled);
        write_reg!(dma, self.dma2, LIFCR, CTCIF1: Clear, CHTIF1: Clear, CTEIF1: Clear, CDMEIF1: Clear, CFEIF1: Clear);
    }

    fn max_frequency(&self) -> u32 {
        self.max_hz
    }
}
