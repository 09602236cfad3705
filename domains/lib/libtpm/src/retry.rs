use log::trace;
use tpm_device::Delay;

use crate::error::{ErrorKind, Result};

/// Run `f` up to `attempts` times.
///
/// Only `Timeout` is retried; any other error is returned at once. Before
/// each new attempt `before_retry` is told which attempt failed and how. The
/// error of the last attempt is returned when all attempts fail.
pub fn retry<T, F, R>(attempts: u32, mut before_retry: R, mut f: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
    R: FnMut(u32, ErrorKind),
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(ErrorKind::Timeout) if attempt < attempts => {
                before_retry(attempt, ErrorKind::Timeout);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bounded busy-wait on device registers.
pub struct Poller<'a> {
    delay: &'a dyn Delay,
    quantum: u64,
}

impl<'a> Poller<'a> {
    pub fn new(delay: &'a dyn Delay, quantum: u64) -> Poller<'a> {
        Poller {
            delay,
            quantum: quantum.max(1),
        }
    }

    /// Call `probe` every quantum until it yields a value or `timeout`
    /// microseconds have been spent waiting.
    pub fn until<T, F>(&self, timeout: u64, mut probe: F) -> Result<T>
    where
        F: FnMut() -> Result<Option<T>>,
    {
        let mut waited = 0;
        while waited < timeout {
            if let Some(v) = probe()? {
                return Ok(v);
            }
            self.delay.stall_us(self.quantum);
            waited += self.quantum;
        }
        Err(ErrorKind::Timeout)
    }

    /// Wait for every bit of `set` to read 1 and every bit of `clear` to
    /// read 0.
    pub fn wait_bits<F>(&self, mut read: F, set: u32, clear: u32, timeout: u64) -> Result<()>
    where
        F: FnMut() -> Result<u32>,
    {
        self.until(timeout, || {
            let reg = read()?;
            trace!("poll reg {:#x} set {:#x} clear {:#x}", reg, set, clear);
            Ok(if reg & set == set && reg & clear == 0 {
                Some(())
            } else {
                None
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct CountingDelay(Cell<u64>);

    impl Delay for CountingDelay {
        fn stall_us(&self, us: u64) {
            self.0.set(self.0.get() + us);
        }
    }

    #[test]
    fn retry_gives_up_after_cap() {
        let mut calls = 0;
        let mut retries = vec![];
        let r: Result<()> = retry(
            3,
            |attempt, _| retries.push(attempt),
            |_| {
                calls += 1;
                Err(ErrorKind::Timeout)
            },
        );

        assert_eq!(r, Err(ErrorKind::Timeout));
        assert_eq!(calls, 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[test]
    fn retry_stops_on_success() {
        let r = retry(3, |_, _| {}, |attempt| {
            if attempt == 2 {
                Ok(attempt)
            } else {
                Err(ErrorKind::Timeout)
            }
        });
        assert_eq!(r, Ok(2));
    }

    #[test]
    fn retry_does_not_retry_hard_errors() {
        let mut calls = 0;
        let r: Result<()> = retry(3, |_, _| panic!("no retry expected"), |_| {
            calls += 1;
            Err(ErrorKind::IoError)
        });
        assert_eq!(r, Err(ErrorKind::IoError));
        assert_eq!(calls, 1);
    }

    #[test]
    fn poller_respects_budget() {
        let delay = CountingDelay(Cell::new(0));
        let poller = Poller::new(&delay, 30);
        let mut reads = 0;

        let r = poller.wait_bits(
            || {
                reads += 1;
                Ok(0)
            },
            1,
            0,
            300,
        );

        assert_eq!(r, Err(ErrorKind::Timeout));
        assert_eq!(reads, 10);
        assert_eq!(delay.0.get(), 300);
    }

    #[test]
    fn poller_returns_as_soon_as_bits_match() {
        let delay = CountingDelay(Cell::new(0));
        let poller = Poller::new(&delay, 30);
        let mut reg = 0x3;

        let r = poller.wait_bits(
            || {
                reg &= !0x2;
                Ok(reg)
            },
            0x1,
            0x2,
            300,
        );

        assert_eq!(r, Ok(()));
        assert_eq!(delay.0.get(), 0);
    }
}
