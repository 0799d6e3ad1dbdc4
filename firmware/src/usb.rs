//! USB CDC-ACM control transport — the sole USB function this firmware
//! exposes, wired directly into `sump_core::Transport` (SPEC_FULL.md §6).
//! Built from `usb-device` + `usbd-serial`, the same stack the teacher
//! uses for its VCP passthrough, now serving as the only interface since
//! SUMP needs just one serial endpoint (no DAP HID/bulk, no WinUSB).

use core::cell::RefCell;

use sump_bsp::otg_fs::{UsbBus, UsbBusType, USB};
use sump_core::Transport;
use usb_device::bus::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

/// Bytes buffered from the host between `process_command()` calls. SUMP
/// commands are at most 5 bytes, so this only needs headroom for a couple
/// of commands queued ahead of the dispatch loop.
const RX_QUEUE_LEN: usize = 256;

static mut EP_MEMORY: [u32; 256] = [0; 256];
static mut USB_BUS: Option<UsbBusAllocator<UsbBusType>> = None;

struct RxQueue {
    buf: [u8; RX_QUEUE_LEN],
    head: usize,
    len: usize,
}

impl RxQueue {
    const fn new() -> Self {
        RxQueue {
            buf: [0; RX_QUEUE_LEN],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        if self.len == RX_QUEUE_LEN {
            // Drop the oldest byte rather than block; SUMP commands are
            // short and the host waits for replies, so this should never
            // actually trigger in practice.
            self.head = (self.head + 1) % RX_QUEUE_LEN;
            self.len -= 1;
        }
        let tail = (self.head + self.len) % RX_QUEUE_LEN;
        self.buf[tail] = byte;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let v = self.buf[self.head];
        self.head = (self.head + 1) % RX_QUEUE_LEN;
        self.len -= 1;
        Some(v)
    }
}

struct Inner {
    device: UsbDevice<'static, UsbBusType>,
    serial: SerialPort<'static, UsbBusType>,
    rx: RxQueue,
}

impl Inner {
    /// Drain whatever the USB peripheral currently has queued into `rx`.
    fn pump(&mut self) {
        let Inner { device, serial, rx } = self;
        if device.poll(&mut [serial]) {
            let mut chunk = [0u8; 64];
            loop {
                match serial.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        for &b in &chunk[..n] {
                            rx.push(b);
                        }
                    }
                    Err(_) => break, // WouldBlock, or host gone away
                }
            }
        }
    }

    /// Write the whole buffer, polling the USB device to drain the
    /// endpoint whenever it reports full (spec §4.4 "Dump": batched
    /// writes, never byte-at-a-time).
    fn write_all(&mut self, buf: &[u8]) {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let Inner { device, serial, .. } = self;
            match serial.write(remaining) {
                Ok(n) if n > 0 => remaining = &remaining[n..],
                _ => {
                    device.poll(&mut [serial]);
                }
            }
        }
    }
}

/// The control transport handed to `sump_core::Analyzer`. `bytes_available`
/// and `read_byte` are declared `&self`/`&mut self` respectively by
/// `sump_core::Transport`, but both need to pump the USB stack, so the
/// actual device/serial/queue state lives behind a `RefCell` — this is a
/// single-threaded cooperative target (spec §5), so the runtime borrow
/// check never contends.
pub struct SerialTransport {
    inner: RefCell<Inner>,
}

impl SerialTransport {
    /// Build the USB device and claim the one CDC-ACM interface.
    ///
    /// Unsafety: must be called once from the main context, before
    /// interrupts that touch the USB peripheral are unmasked.
    pub unsafe fn new(usb: USB, serial_number: &'static str) -> Self {
        let usb_bus = UsbBus::new(usb, &mut EP_MEMORY);
        USB_BUS = Some(usb_bus);
        let usb_bus = USB_BUS.as_ref().unwrap();

        let serial = SerialPort::new(usb_bus);
        let device = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x1209, 0x7301))
            .manufacturer("sump-firmware")
            .product("SUMP logic analyzer")
            .serial_number(serial_number)
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        SerialTransport {
            inner: RefCell::new(Inner {
                device,
                serial,
                rx: RxQueue::new(),
            }),
        }
    }
}

impl Transport for SerialTransport {
    fn read_byte(&mut self) -> Option<u8> {
        let mut inner = self.inner.borrow_mut();
        inner.pump();
        inner.rx.pop()
    }

    fn bytes_available(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        inner.pump();
        inner.rx.len
    }

    fn write_bytes(&mut self, buf: &[u8]) {
        self.inner.borrow_mut().write_all(buf);
    }

    fn flush(&mut self) {
        // usbd-serial has no explicit flush — a write already hands its
        // bytes to the endpoint, so this just pumps the device once to
        // push any buffered IN packet out promptly.
        let mut inner = self.inner.borrow_mut();
        let Inner { device, serial, .. } = &mut *inner;
        device.poll(&mut [serial]);
    }

    fn set_timeout_ms(&mut self, _timeout_ms: u32) {
        // usbd-serial has no byte-level read timeout; the firmware relies
        // on the host staying connected for the duration of a dump (spec
        // §6's "generous ~10s read timeout" has no effect here beyond
        // that assumption).
    }
}
