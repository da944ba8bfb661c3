//! Co-processor wake-up timer

/// The register that sets how often the co-processor program runs
pub trait WakeTimer {
    /// Reprogram the period between co-processor runs
    ///
    /// `ticks` are slow-clock timer ticks (microseconds at nominal rate).
    /// Takes effect from the next period.
    fn set_wakeup_period(&mut self, ticks: u32);
}

impl<T: WakeTimer + ?Sized> WakeTimer for &mut T {
    fn set_wakeup_period(&mut self, ticks: u32) {
        T::set_wakeup_period(self, ticks)
    }
}
