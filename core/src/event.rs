//! Advisory observer notifications (spec §4.5 "Events"). The protocol
//! never depends on these being handled; a `NoOpObserver` is the default.

use crate::params::Status;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Reset,
    Status(Status),
    CaptureFrequency(u32),
    TriggerValues(u32),
    TriggerMask(u32),
    ReadDelayCount { read_count: u32, delay_count: u32 },
    Flags { continuous: bool },
}

pub trait Observer {
    fn on_event(&mut self, event: Event);
}

/// Default observer: drops every event on the floor.
#[derive(Default)]
pub struct NoOpObserver;

impl Observer for NoOpObserver {
    fn on_event(&mut self, _event: Event) {}
}
