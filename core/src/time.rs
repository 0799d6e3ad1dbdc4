//! A monotonic microsecond time source (spec §1's "external collaborator").
//! Used both to pace the software sampling loop and to debounce RESET and
//! measure achieved frequency on the hardware path.

pub trait TimeSource {
    /// Free-running microsecond counter. Wraps; callers only ever compare
    /// differences, never absolute values.
    fn now_micros(&self) -> u32;

    /// Busy-wait for approximately `us` microseconds.
    fn delay_micros(&self, us: u32);
}

/// Lets a platform integrator share one clock peripheral — e.g. a `'static`
/// `Delay` also read from an interrupt handler — between the analyzer and
/// whoever else needs it, instead of the analyzer owning it outright.
impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now_micros(&self) -> u32 {
        (**self).now_micros()
    }

    fn delay_micros(&self, us: u32) {
        (**self).delay_micros(us);
    }
}
