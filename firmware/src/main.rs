#![no_std]
#![no_main]

mod app;
mod usb;

use core::sync::atomic::AtomicBool;

use cortex_m_rt::{entry, exception};
use panic_rtt_target as _;
use rtt_target::{rprintln, rtt_init_print};

use sump_bsp::delay::Delay;
use sump_bsp::gpio::GPIO;
use sump_bsp::otg_fs::USB;
use sump_bsp::pin_reader::SamplePins;
use sump_bsp::rcc::{CoreFrequency, RCC};
use sump_core::SoftwareCaptureEngine;

use crate::app::App;
use crate::usb::SerialTransport;

const GIT_VERSION: &str = git_version::git_version!(fallback = "unknown");
const DESCRIPTION: &[u8] = b"sump-firmware";

/// Shared between the capture engine and (were one ever wired up) an
/// interrupt-context abort source — the same borrowed-atomic pattern
/// `SoftwareCaptureEngine` itself documents for its cancellation flag.
static CAPTURE_ABORT: AtomicBool = AtomicBool::new(false);

/// Backs the `&'static Delay` handed to both the analyzer and the
/// `SysTick` exception handler below — the usual `static mut` lazy-init
/// idiom this codebase also uses for the USB bus allocator.
static mut DELAY: Option<Delay> = None;

#[exception]
fn SysTick() {
    if let Some(delay) = unsafe { DELAY.as_ref() } {
        delay.on_systick_overflow();
    }
}

#[entry]
fn main() -> ! {
    rtt_init_print!();
    rprintln!("sump-firmware {}", GIT_VERSION);

    let rcc = RCC::new(stm32ral::rcc::RCC::take().unwrap());
    #[cfg(not(feature = "turbo"))]
    let clocks = unsafe { rcc.setup(CoreFrequency::F72MHz) };
    #[cfg(feature = "turbo")]
    let clocks = unsafe { rcc.setup(CoreFrequency::F216MHz) };

    unsafe {
        DELAY = Some(Delay::new(stm32ral::syst::SYST::take().unwrap()));
    }
    let delay: &'static Delay = unsafe { DELAY.as_ref().unwrap() };
    delay.set_sysclk(&clocks);

    let gpioa = GPIO::new(stm32ral::gpio::GPIOA::take().unwrap());
    let gpiob = GPIO::new(stm32ral::gpio::GPIOB::take().unwrap());
    let gpioc = GPIO::new(stm32ral::gpio::GPIOC::take().unwrap());

    let pins = sump_bsp::gpio::Pins {
        led: gpioc.pin(10),
        usb_dm: gpioa.pin(11),
        usb_dp: gpioa.pin(12),
    };
    pins.setup();
    let led = pins.led;

    // The 8-pin sample window lives on GPIOB, pins 0 through 7, left in
    // their power-on floating-input state (see `Pins::setup`'s doc comment).
    let sample_pins = SamplePins::new(&gpiob, 0);

    let usb = USB::setup(&gpioa, &clocks);
    let transport = unsafe { SerialTransport::new(usb, "sump-000001") };

    let capture = SoftwareCaptureEngine::new(&CAPTURE_ABORT);

    let mut app = App::new(
        sample_pins,
        transport,
        delay,
        capture,
        led,
        DESCRIPTION,
        GIT_VERSION.as_bytes(),
    );

    loop {
        app.poll();
    }
}
