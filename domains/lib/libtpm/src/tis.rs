//! TIS / PTP FIFO transport.
//!
//! Commands are pushed through the data FIFO one byte at a time, paced by
//! the burst count the device advertises. The response comes back through
//! the same FIFO.

use alloc::vec::Vec;
use bitfield::BitRange;
use log::{debug, error, trace, warn};
use tpm_device::{Delay, RegisterPort};

use crate::config::Timeouts;
use crate::datastructure::TPM_HEADER_SIZE;
use crate::error::{ErrorKind, Result};
use crate::regs::*;
use crate::retry::Poller;
use crate::transport::{check_response_header, Transport};

pub struct TisTransport<P: RegisterPort, D: Delay> {
    port: P,
    delay: D,
    base: u64,
    timeouts: Timeouts,
}

/// Returns the device to the ready state when dropped.
struct TisSession<'a, P: RegisterPort> {
    port: &'a P,
    base: u64,
}

impl<'a, P: RegisterPort> Drop for TisSession<'a, P> {
    fn drop(&mut self) {
        if self.port.write_u8(TisRegs::TPM_STS.addr(self.base), ready_bits()).is_err() {
            warn!("failed to return TIS to ready");
        }
    }
}

fn ready_bits() -> u8 {
    let mut sts = TpmStatus(0);
    sts.set_command_ready(true);
    sts.bit_range(7, 0)
}

fn go_bits() -> u8 {
    let mut sts = TpmStatus(0);
    sts.set_tpm_go(true);
    sts.bit_range(7, 0)
}

fn valid_data_bits() -> u8 {
    let mut sts = TpmStatus(0);
    sts.set_sts_valid(true);
    sts.set_data_avail(true);
    sts.bit_range(7, 0)
}

const STS_VALID: u8 = 0x80;
const STS_EXPECT: u8 = 0x08;

/// Reads the FIFO while keeping track of the burst budget left over between
/// calls.
struct FifoReader<'t, P: RegisterPort, D: Delay> {
    tis: &'t TisTransport<P, D>,
    burst: u16,
}

impl<'t, P: RegisterPort, D: Delay> FifoReader<'t, P, D> {
    fn read_into(&mut self, buf: &mut Vec<u8>, upto: usize) -> Result<()> {
        let fifo = TisRegs::TPM_DATA_FIFO.addr(self.tis.base);
        while buf.len() < upto {
            if self.burst == 0 {
                self.burst = self.tis.burst_count()?;
            }
            while self.burst > 0 && buf.len() < upto {
                buf.push(self.tis.port.read_u8(fifo)?);
                self.burst -= 1;
            }
        }
        Ok(())
    }
}

impl<P: RegisterPort, D: Delay> TisTransport<P, D> {
    pub fn new(port: P, delay: D, base: u64, timeouts: Timeouts) -> Self {
        TisTransport {
            port,
            delay,
            base,
            timeouts,
        }
    }

    fn poller(&self) -> Poller<'_> {
        Poller::new(&self.delay, self.timeouts.poll_quantum)
    }

    fn write_sts(&self, bits: u8) -> Result<()> {
        Ok(self.port.write_u8(TisRegs::TPM_STS.addr(self.base), bits)?)
    }

    fn wait_sts(&self, set: u8, clear: u8, timeout: u64) -> Result<()> {
        let addr = TisRegs::TPM_STS.addr(self.base);
        self.poller().wait_bits(
            || Ok(self.port.read_u8(addr)? as u32),
            set as u32,
            clear as u32,
            timeout,
        )
    }

    /// Poll the burst count until the device can move at least one byte.
    ///
    /// The count is 16 bits wide but not 2-byte aligned, so it is read as two
    /// separate bytes.
    fn burst_count(&self) -> Result<u16> {
        let lo = TisRegs::TPM_BURST_COUNT.addr(self.base);
        let res = self.poller().until(self.timeouts.d, || {
            let count = self.port.read_u8(lo)? as u16 | (self.port.read_u8(lo + 1)? as u16) << 8;
            trace!("burst count {}", count);
            Ok(if count != 0 { Some(count) } else { None })
        });

        match res {
            Err(ErrorKind::Timeout) => {
                error!("TIS burst count stayed at zero");
                Err(ErrorKind::DeviceBusy)
            }
            other => other,
        }
    }

    fn prepare(&self) -> Result<()> {
        self.write_sts(ready_bits())?;
        match self.wait_sts(ready_bits(), 0, self.timeouts.b) {
            Err(ErrorKind::Timeout) => {
                error!("TIS is not ready for a command");
                Err(ErrorKind::DeviceBusy)
            }
            other => other,
        }
    }

    fn send(&self, cmd: &[u8]) -> Result<()> {
        let fifo = TisRegs::TPM_DATA_FIFO.addr(self.base);
        let mut bytes = cmd.iter();
        let mut sent = 0;

        while sent < cmd.len() {
            let burst = self.burst_count()?;
            for byte in bytes.by_ref().take(burst as usize) {
                self.port.write_u8(fifo, *byte)?;
                sent += 1;
            }
        }

        match self.wait_sts(STS_VALID, STS_EXPECT, self.timeouts.c) {
            Err(ErrorKind::Timeout) => {
                error!("TIS expects more than the {} command bytes sent", cmd.len());
                Err(ErrorKind::BufferTooSmall)
            }
            other => other,
        }
    }

    fn go(&self) -> Result<()> {
        self.write_sts(go_bits())?;
        match self.wait_sts(valid_data_bits(), 0, self.timeouts.max) {
            Err(ErrorKind::Timeout) => {}
            other => return other,
        }

        warn!("TIS command timed out, cancelling");
        // Writing zero to cancel is a no-op, so it is not cleared afterwards.
        self.port
            .write_u32(TisRegs::TPM_STS.addr(self.base), TPM_STS_COMMAND_CANCEL)?;
        match self.wait_sts(valid_data_bits(), 0, self.timeouts.b) {
            Err(ErrorKind::Timeout) => {
                error!("TIS ignored cancel, device needs to be reset");
                Err(ErrorKind::DeviceBusy)
            }
            other => other,
        }
    }

    fn receive(&self, max_response: usize) -> Result<Vec<u8>> {
        let mut reader = FifoReader { tis: self, burst: 0 };
        let mut rsp = Vec::with_capacity(TPM_HEADER_SIZE);
        reader.read_into(&mut rsp, TPM_HEADER_SIZE)?;

        let size = check_response_header(&rsp, max_response)?;
        if size < TPM_HEADER_SIZE {
            rsp.truncate(size);
            return Ok(rsp);
        }

        rsp.reserve(size - TPM_HEADER_SIZE);
        reader.read_into(&mut rsp, size)?;
        Ok(rsp)
    }
}

impl<P: RegisterPort, D: Delay> Transport for TisTransport<P, D> {
    fn execute(&self, cmd: &[u8], max_response: usize) -> Result<Vec<u8>> {
        let _session = TisSession {
            port: &self.port,
            base: self.base,
        };

        self.prepare()?;
        debug!("TIS ready, sending {} bytes", cmd.len());
        self.send(cmd)?;
        self.go()?;
        self.receive(max_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::*;

    fn response(tag: u16, extra: &[u8]) -> Vec<u8> {
        let mut rsp = Vec::new();
        rsp.extend_from_slice(&tag.to_be_bytes());
        rsp.extend_from_slice(&((10 + extra.len()) as u32).to_be_bytes());
        rsp.extend_from_slice(&0u32.to_be_bytes());
        rsp.extend_from_slice(extra);
        rsp
    }

    fn transport(sim: &SimTis) -> TisTransport<&SimTis, NoDelay> {
        init_logging();
        TisTransport::new(sim, NoDelay, BASE, quick_timeouts())
    }

    const CMD: [u8; 12] = [0x80, 0x01, 0, 0, 0, 0x0C, 0, 0, 0x01, 0x7B, 0, 0x08];

    #[test]
    fn status_bit_helpers() {
        assert_eq!(ready_bits(), 0x40);
        assert_eq!(go_bits(), 0x20);
        assert_eq!(valid_data_bits(), 0x90);
    }

    #[test]
    fn responsive_device_completes() {
        let rsp = response(0x8001, &[9; 8]);
        let sim = SimTis::new(rsp.clone(), 64);

        assert_eq!(transport(&sim).execute(&CMD, 0xF80), Ok(rsp));
        assert_eq!(*sim.last_command.borrow(), CMD.to_vec());
        assert_eq!(sim.fifo_writes.get(), 12);
        assert_eq!(sim.fifo_reads.get(), 18);
        assert_eq!(sim.cancel_writes.get(), 0);
        // prepare and exit
        assert_eq!(sim.ready_writes.get(), 2);
    }

    #[test]
    fn small_bursts_carry_over() {
        // Header and body straddle burst boundaries in both directions.
        let rsp = response(0x8001, &[1, 2, 3, 4, 5, 6, 7]);
        let sim = SimTis::new(rsp.clone(), 3);

        assert_eq!(transport(&sim).execute(&CMD, 0xF80), Ok(rsp));
        assert_eq!(*sim.last_command.borrow(), CMD.to_vec());
        assert_eq!(sim.fifo_reads.get(), 17);
    }

    #[test]
    fn zero_burst_never_writes() {
        let sim = SimTis::new(response(0x8001, &[]), 0);

        assert_eq!(transport(&sim).execute(&CMD, 0xF80), Err(ErrorKind::DeviceBusy));
        assert_eq!(sim.fifo_writes.get(), 0);
        assert_eq!(sim.ready_writes.get(), 2);
    }

    #[test]
    fn not_ready_is_device_busy() {
        let sim = SimTis::new(response(0x8001, &[]), 64);
        sim.ready_stuck.set(true);

        assert_eq!(transport(&sim).execute(&CMD, 0xF80), Err(ErrorKind::DeviceBusy));
        assert_eq!(sim.fifo_writes.get(), 0);
    }

    #[test]
    fn short_command_is_buffer_too_small() {
        let sim = SimTis::new(response(0x8001, &[]), 64);
        sim.expect_stuck.set(true);

        assert_eq!(transport(&sim).execute(&CMD, 0xF80), Err(ErrorKind::BufferTooSmall));
        assert_eq!(sim.fifo_writes.get(), 12);
        assert_eq!(sim.fifo_reads.get(), 0);
    }

    #[test]
    fn stuck_command_is_cancelled() {
        let rsp = response(0x8001, &[]);
        let sim = SimTis::new(rsp.clone(), 64);
        sim.go_stuck.set(true);
        sim.cancel_works.set(true);

        assert_eq!(transport(&sim).execute(&CMD, 0xF80), Ok(rsp));
        assert_eq!(sim.cancel_writes.get(), 1);
    }

    #[test]
    fn ignored_cancel_is_device_busy() {
        let sim = SimTis::new(response(0x8001, &[]), 64);
        sim.go_stuck.set(true);

        assert_eq!(transport(&sim).execute(&CMD, 0xF80), Err(ErrorKind::DeviceBusy));
        assert_eq!(sim.cancel_writes.get(), 1);
        assert_eq!(sim.fifo_reads.get(), 0);
        assert_eq!(sim.ready_writes.get(), 2);
    }

    #[test]
    fn legacy_tag_stops_after_header() {
        let sim = SimTis::new(response(0x00C4, &[0; 20]), 64);

        assert_eq!(transport(&sim).execute(&CMD, 0xF80), Err(ErrorKind::NotSupported));
        assert_eq!(sim.fifo_reads.get(), 10);
    }

    #[test]
    fn response_larger_than_capacity() {
        let sim = SimTis::new(response(0x8001, &[0; 40]), 64);

        assert_eq!(transport(&sim).execute(&CMD, 20), Err(ErrorKind::BufferTooSmall));
        assert_eq!(sim.fifo_reads.get(), 10);
    }
}
