//! Portable core of a SUMP-compatible logic analyzer: the wire protocol,
//! the capture engine (software-timed and DMA-backed variants), and the
//! pre-trigger ring buffer. Generic over platform-supplied `PinReader`,
//! `Transport`, `TimeSource` and (for the hardware path) `HardwareCapture`
//! implementations — this crate never touches a register.
//!
//! `no_std` outside of `cfg(test)`, the same escape hatch used elsewhere in
//! this codebase to keep portable logic host-testable without dragging an
//! allocator or OS into the firmware build.
#![cfg_attr(not(test), no_std)]

pub mod analyzer;
pub mod capture;
pub mod endian;
pub mod event;
pub mod params;
pub mod pin_reader;
pub mod protocol;
pub mod ring_buffer;
pub mod time;
pub mod transport;

pub use analyzer::Analyzer;
pub use capture::{CaptureEngine, CaptureResources, DmaCaptureEngine, HardwareCapture, SoftwareCaptureEngine};
pub use event::{Event, NoOpObserver, Observer};
pub use params::{Parameters, Status, WordWidth};
pub use pin_reader::PinReader;
pub use ring_buffer::RingBuffer;
pub use time::TimeSource;
pub use transport::Transport;
