//! Busy-wait sources used between register polls.

/// Stall the calling context for roughly `us` microseconds.
pub trait Delay {
    fn stall_us(&self, us: u64);
}

impl<T: Delay + ?Sized> Delay for &T {
    fn stall_us(&self, us: u64) {
        (**self).stall_us(us)
    }
}

/// Calibrated spin loop, for contexts that cannot sleep.
pub struct SpinDelay {
    loops_per_us: u64,
}

impl SpinDelay {
    pub const fn new(loops_per_us: u64) -> SpinDelay {
        SpinDelay { loops_per_us }
    }
}

impl Delay for SpinDelay {
    fn stall_us(&self, us: u64) {
        for _ in 0..us.saturating_mul(self.loops_per_us) {
            core::hint::spin_loop();
        }
    }
}

#[cfg(feature = "std")]
pub struct StdDelay;

#[cfg(feature = "std")]
impl Delay for StdDelay {
    fn stall_us(&self, us: u64) {
        std::thread::sleep(std::time::Duration::from_micros(us));
    }
}
