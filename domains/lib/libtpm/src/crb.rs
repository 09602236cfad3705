//! Command/Response Buffer transport.
//!
//! Sequence for one command:
//!
//! ```text
//!  idle --CMD_READY--> ready --START--> executing --(START clears)--> complete
//!    ^                                                                   |
//!    +--------------------------- GO_IDLE ------------------------------+
//! ```
//!
//! The ready handshake is retried a bounded number of times, sending the
//! device to idle before each attempt. GO_IDLE is written on every exit.

use alloc::vec::Vec;
use log::{debug, error, trace, warn};
use tpm_device::{Delay, RegisterPort};

use crate::config::Timeouts;
use crate::datastructure::TPM_HEADER_SIZE;
use crate::error::{ErrorKind, Result};
use crate::ptp::{IdleBypass, PtpInterface};
use crate::regs::*;
use crate::retry::{retry, Poller};
use crate::transport::{check_response_header, Transport};

pub struct CrbTransport<P: RegisterPort, D: Delay> {
    port: P,
    delay: D,
    base: u64,
    idle_bypass: IdleBypass,
    timeouts: Timeouts,
}

/// Sends the device back to idle when dropped.
struct CrbSession<'a, P: RegisterPort> {
    port: &'a P,
    base: u64,
}

impl<'a, P: RegisterPort> Drop for CrbSession<'a, P> {
    fn drop(&mut self) {
        let addr = CrbRegs::TPM_CRB_CTRL_REQ.addr(self.base);
        if self.port.write_u32(addr, CrbCtrlRequest::GO_IDLE.bits()).is_err() {
            warn!("failed to send CRB to idle");
        }
    }
}

impl<P: RegisterPort, D: Delay> CrbTransport<P, D> {
    pub fn new(port: P, delay: D, base: u64, iface: PtpInterface, timeouts: Timeouts) -> Self {
        CrbTransport {
            port,
            delay,
            base,
            idle_bypass: iface.idle_bypass,
            timeouts,
        }
    }

    #[inline(always)]
    fn read_reg(&self, reg: CrbRegs) -> Result<u32> {
        Ok(self.port.read_u32(reg.addr(self.base))?)
    }

    #[inline(always)]
    fn write_reg(&self, reg: CrbRegs, val: u32) -> Result<()> {
        Ok(self.port.write_u32(reg.addr(self.base), val)?)
    }

    fn poller(&self) -> Poller<'_> {
        Poller::new(&self.delay, self.timeouts.poll_quantum)
    }

    fn wait_reg(&self, reg: CrbRegs, set: u32, clear: u32, timeout: u64) -> Result<()> {
        self.poller()
            .wait_bits(|| self.read_reg(reg), set, clear, timeout)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.idle_bypass == IdleBypass::Supported {
            return Ok(());
        }

        let sts = CrbCtrlStatus::from_bits_truncate(self.read_reg(CrbRegs::TPM_CRB_CTRL_STS)?);
        if sts.contains(CrbCtrlStatus::TPM_IDLE) {
            return Ok(());
        }

        trace!("waiting for CRB idle, sts {:?}", sts);
        self.wait_reg(
            CrbRegs::TPM_CRB_CTRL_STS,
            CrbCtrlStatus::TPM_IDLE.bits(),
            0,
            self.timeouts.c,
        )
    }

    fn request_ready(&self) -> Result<()> {
        self.write_reg(CrbRegs::TPM_CRB_CTRL_REQ, CrbCtrlRequest::CMD_READY.bits())?;
        self.wait_reg(
            CrbRegs::TPM_CRB_CTRL_REQ,
            0,
            CrbCtrlRequest::CMD_READY.bits(),
            self.timeouts.c,
        )
    }

    fn wait_leave_idle(&self) -> Result<()> {
        self.wait_reg(
            CrbRegs::TPM_CRB_CTRL_STS,
            0,
            CrbCtrlStatus::TPM_IDLE.bits(),
            self.timeouts.c,
        )
    }

    /// Bring the device from idle to command ready.
    fn make_ready(&self) -> Result<()> {
        let res = retry(
            self.timeouts.retry_max,
            |attempt, _| {
                warn!("CRB not ready (attempt {}), sending it to idle", attempt);
                // Best effort; the next attempt observes the outcome.
                let _ = self.write_reg(CrbRegs::TPM_CRB_CTRL_REQ, CrbCtrlRequest::GO_IDLE.bits());
            },
            |_| {
                self.ensure_idle()?;
                self.request_ready()?;
                self.wait_leave_idle()
            },
        );

        match res {
            Err(ErrorKind::Timeout) => {
                error!("CRB did not become ready after {} attempts", self.timeouts.retry_max);
                Err(ErrorKind::DeviceBusy)
            }
            other => other,
        }
    }

    fn write_command(&self, cmd: &[u8]) -> Result<()> {
        let data = CrbRegs::TPM_CRB_DATA_BUFFER.addr(self.base);
        for (i, byte) in cmd.iter().enumerate() {
            self.port.write_u8(data + i as u64, *byte)?;
        }

        // The one buffer serves both directions.
        let size = CRB_DATA_BUFFER_SIZE as u32;
        self.write_reg(CrbRegs::TPM_CRB_CTRL_CMD_HADDR, (data >> 32) as u32)?;
        self.write_reg(CrbRegs::TPM_CRB_CTRL_CMD_LADDR, data as u32)?;
        self.write_reg(CrbRegs::TPM_CRB_CTRL_CMD_SIZE, size)?;
        self.port
            .write_u64(CrbRegs::TPM_CRB_CTRL_RSP_ADDR.addr(self.base), data)?;
        self.write_reg(CrbRegs::TPM_CRB_CTRL_RSP_SIZE, size)
    }

    fn start(&self) -> Result<()> {
        self.write_reg(CrbRegs::TPM_CRB_CTRL_START, CRB_CTRL_START)?;

        match self.wait_reg(CrbRegs::TPM_CRB_CTRL_START, 0, CRB_CTRL_START, self.timeouts.max) {
            Err(ErrorKind::Timeout) => {}
            other => return other,
        }

        warn!("CRB command did not complete, cancelling");
        self.write_reg(CrbRegs::TPM_CRB_CTRL_CANCEL, CRB_CTRL_CANCEL)?;
        let acked = self.wait_reg(CrbRegs::TPM_CRB_CTRL_START, 0, CRB_CTRL_START, self.timeouts.b);
        self.write_reg(CrbRegs::TPM_CRB_CTRL_CANCEL, 0)?;

        match acked {
            Err(ErrorKind::Timeout) => {
                error!("CRB ignored cancel, device needs to be reset");
                Err(ErrorKind::DeviceBusy)
            }
            other => other,
        }
    }

    fn read_response(&self, max_response: usize) -> Result<Vec<u8>> {
        let data = CrbRegs::TPM_CRB_DATA_BUFFER.addr(self.base);
        let read = |range: core::ops::Range<usize>, buf: &mut Vec<u8>| -> Result<()> {
            for i in range {
                buf.push(self.port.read_u8(data + i as u64)?);
            }
            Ok(())
        };

        let mut rsp = Vec::with_capacity(TPM_HEADER_SIZE);
        read(0..TPM_HEADER_SIZE, &mut rsp)?;

        let size = check_response_header(&rsp, max_response)?;
        if size < TPM_HEADER_SIZE {
            rsp.truncate(size);
            return Ok(rsp);
        }

        rsp.reserve(size - TPM_HEADER_SIZE);
        read(TPM_HEADER_SIZE..size, &mut rsp)?;
        Ok(rsp)
    }
}

impl<P: RegisterPort, D: Delay> Transport for CrbTransport<P, D> {
    fn execute(&self, cmd: &[u8], max_response: usize) -> Result<Vec<u8>> {
        if cmd.len() > CRB_DATA_BUFFER_SIZE {
            error!("command of {} bytes does not fit the CRB data buffer", cmd.len());
            return Err(ErrorKind::InvalidParameter);
        }
        let max_response = max_response.min(CRB_DATA_BUFFER_SIZE);

        let _session = CrbSession {
            port: &self.port,
            base: self.base,
        };

        self.make_ready()?;
        debug!("CRB ready, sending {} bytes", cmd.len());
        self.write_command(cmd)?;
        self.start()?;
        self.read_response(max_response)
    }
}
