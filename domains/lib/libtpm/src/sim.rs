//! Register level models of CRB and FIFO TPMs, used by the unit tests.
//!
//! The models are deliberately simple: they react to control writes at once
//! and can be told to get stuck in any of the states the transports have to
//! recover from.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use core::cell::{Cell, RefCell};
use tpm_device::{AccessWidth, Delay, PortError, RegisterPort};

use crate::config::Timeouts;
use crate::regs::*;

pub const BASE: u64 = 0xFED4_0000;

const WINDOW: usize = 0x1000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct NoDelay;

impl Delay for NoDelay {
    fn stall_us(&self, _us: u64) {}
}

/// Budgets of ten polls each, and twenty for execution.
pub fn quick_timeouts() -> Timeouts {
    Timeouts {
        b: 300,
        c: 300,
        d: 300,
        max: 600,
        poll_quantum: 30,
        retry_max: 3,
    }
}

/// A plain 4K register page with no side effects.
pub struct RegFile {
    base: u64,
    mem: RefCell<Vec<u8>>,
}

impl RegFile {
    pub fn new(base: u64) -> RegFile {
        RegFile {
            base,
            mem: RefCell::new(vec![0; WINDOW]),
        }
    }

    pub fn set_u8(&self, offset: u64, val: u8) {
        self.mem.borrow_mut()[offset as usize] = val;
    }

    pub fn get_u8(&self, offset: u64) -> u8 {
        self.mem.borrow()[offset as usize]
    }

    pub fn set_u32(&self, offset: u64, val: u32) {
        let off = offset as usize;
        LittleEndian::write_u32(&mut self.mem.borrow_mut()[off..off + 4], val);
    }

    pub fn get_u32(&self, offset: u64) -> u32 {
        let off = offset as usize;
        LittleEndian::read_u32(&self.mem.borrow()[off..off + 4])
    }

    pub fn set_bytes(&self, offset: u64, bytes: &[u8]) {
        let off = offset as usize;
        self.mem.borrow_mut()[off..off + bytes.len()].copy_from_slice(bytes);
    }

    pub fn get_bytes(&self, offset: u64, len: usize) -> Vec<u8> {
        let off = offset as usize;
        self.mem.borrow()[off..off + len].to_vec()
    }

    fn offset(&self, addr: u64, width: AccessWidth) -> tpm_device::Result<u64> {
        match addr.checked_sub(self.base) {
            Some(off) if off as usize + width.bytes() <= WINDOW => Ok(off),
            _ => Err(PortError::OutOfRange { addr }),
        }
    }
}

impl RegisterPort for RegFile {
    fn read(&self, addr: u64, width: AccessWidth) -> tpm_device::Result<u64> {
        let off = self.offset(addr, width)? as usize;
        Ok(width.decode(&self.mem.borrow()[off..off + width.bytes()]))
    }

    fn write(&self, addr: u64, width: AccessWidth, value: u64) -> tpm_device::Result<()> {
        let off = self.offset(addr, width)? as usize;
        width.encode(value, &mut self.mem.borrow_mut()[off..off + width.bytes()]);
        Ok(())
    }
}

fn bump<T: Copy + core::ops::Add<Output = T> + From<u8>>(c: &Cell<T>) {
    c.set(c.get() + T::from(1));
}

/// Declared size of a (possibly partial) command or response.
fn declared_size(buf: &[u8]) -> Option<usize> {
    if buf.len() < 6 {
        None
    } else {
        Some(BigEndian::read_u32(&buf[2..6]) as usize)
    }
}

pub struct SimCrb {
    pub regs: RegFile,
    pub response: RefCell<Vec<u8>>,
    pub last_command: RefCell<Vec<u8>>,
    pub idle_stuck: Cell<bool>,
    pub ready_stuck: Cell<bool>,
    pub start_stuck: Cell<bool>,
    pub cancel_works: Cell<bool>,
    pub cmd_ready_writes: Cell<u32>,
    pub go_idle_writes: Cell<u32>,
    pub cancel_writes: Cell<u32>,
    pub data_reads: Cell<usize>,
    pub data_writes: Cell<usize>,
}

impl SimCrb {
    /// An idle CRB without idle bypass that answers every command with
    /// `response`.
    pub fn new(response: Vec<u8>) -> SimCrb {
        let regs = RegFile::new(BASE);
        regs.set_u8(TisRegs::TPM_ACCESS as u64, 0xA1);
        regs.set_u32(CrbRegs::TPM_CRB_INTF_ID as u64, 0x0000_4011);
        regs.set_u32(CrbRegs::TPM_CRB_VID_DID as u64, 0x001B_1014);
        regs.set_u32(CrbRegs::TPM_CRB_CTRL_STS as u64, CrbCtrlStatus::TPM_IDLE.bits());

        SimCrb {
            regs,
            response: RefCell::new(response),
            last_command: RefCell::new(Vec::new()),
            idle_stuck: Cell::new(false),
            ready_stuck: Cell::new(false),
            start_stuck: Cell::new(false),
            cancel_works: Cell::new(false),
            cmd_ready_writes: Cell::new(0),
            go_idle_writes: Cell::new(0),
            cancel_writes: Cell::new(0),
            data_reads: Cell::new(0),
            data_writes: Cell::new(0),
        }
    }

    /// The device never reaches idle, whatever it is told.
    pub fn never_idle(&self) {
        self.idle_stuck.set(true);
        self.regs.set_u32(CrbRegs::TPM_CRB_CTRL_STS as u64, 0);
    }

    fn set_idle(&self, idle: bool) {
        let sts = if idle { CrbCtrlStatus::TPM_IDLE } else { CrbCtrlStatus::empty() };
        self.regs.set_u32(CrbRegs::TPM_CRB_CTRL_STS as u64, sts.bits());
    }

    fn run(&self) {
        let data = CrbRegs::TPM_CRB_DATA_BUFFER as u64;
        let hdr = self.regs.get_bytes(data, 6);
        let len = declared_size(&hdr).unwrap_or(0).min(CRB_DATA_BUFFER_SIZE);
        *self.last_command.borrow_mut() = self.regs.get_bytes(data, len);

        let rsp = self.response.borrow();
        self.regs.set_bytes(data, &rsp[..rsp.len().min(CRB_DATA_BUFFER_SIZE)]);
    }

    fn is_data_buffer(off: u64) -> bool {
        let start = CrbRegs::TPM_CRB_DATA_BUFFER as u64;
        off >= start && off < start + CRB_DATA_BUFFER_SIZE as u64
    }
}

impl RegisterPort for SimCrb {
    fn read(&self, addr: u64, width: AccessWidth) -> tpm_device::Result<u64> {
        let v = self.regs.read(addr, width)?;
        if SimCrb::is_data_buffer(addr - BASE) {
            bump(&self.data_reads);
        }
        Ok(v)
    }

    fn write(&self, addr: u64, width: AccessWidth, value: u64) -> tpm_device::Result<()> {
        self.regs.write(addr, width, value)?;

        let off = addr - BASE;
        let value = value as u32;
        if SimCrb::is_data_buffer(off) {
            bump(&self.data_writes);
        } else if off == CrbRegs::TPM_CRB_CTRL_REQ as u64 {
            let mut req = CrbCtrlRequest::from_bits_truncate(value);
            if req.contains(CrbCtrlRequest::CMD_READY) {
                bump(&self.cmd_ready_writes);
                if !self.ready_stuck.get() {
                    req.remove(CrbCtrlRequest::CMD_READY);
                    self.set_idle(false);
                }
            }
            if req.contains(CrbCtrlRequest::GO_IDLE) {
                bump(&self.go_idle_writes);
                req.remove(CrbCtrlRequest::GO_IDLE);
                self.set_idle(!self.idle_stuck.get());
            }
            self.regs.set_u32(off, req.bits());
        } else if off == CrbRegs::TPM_CRB_CTRL_START as u64 {
            if value & CRB_CTRL_START != 0 && !self.start_stuck.get() {
                self.run();
                self.regs.set_u32(off, 0);
            }
        } else if off == CrbRegs::TPM_CRB_CTRL_CANCEL as u64 {
            if value & CRB_CTRL_CANCEL != 0 {
                bump(&self.cancel_writes);
                if self.cancel_works.get() {
                    self.run();
                    self.regs.set_u32(CrbRegs::TPM_CRB_CTRL_START as u64, 0);
                }
            }
        }
        Ok(())
    }
}

const STS_VALID: u8 = 0x80;
const STS_READY: u8 = 0x40;
const STS_GO: u8 = 0x20;
const STS_DATA: u8 = 0x10;
const STS_EXPECT: u8 = 0x08;

pub struct SimTis {
    pub regs: RegFile,
    pub response: RefCell<Vec<u8>>,
    pub last_command: RefCell<Vec<u8>>,
    received: RefCell<Vec<u8>>,
    pending: RefCell<VecDeque<u8>>,
    ready: Cell<bool>,
    pub burst: Cell<u16>,
    pub ready_stuck: Cell<bool>,
    pub expect_stuck: Cell<bool>,
    pub go_stuck: Cell<bool>,
    pub cancel_works: Cell<bool>,
    pub ready_writes: Cell<u32>,
    pub cancel_writes: Cell<u32>,
    pub fifo_writes: Cell<usize>,
    pub fifo_reads: Cell<usize>,
}

impl SimTis {
    /// A TIS 1.2 part with a burst count of `burst` that answers every
    /// command with `response`.
    pub fn new(response: Vec<u8>, burst: u16) -> SimTis {
        let regs = RegFile::new(BASE);
        regs.set_u8(TisRegs::TPM_ACCESS as u64, 0xA1);
        regs.set_u32(TisRegs::TPM_INTERFACE_ID as u64, 0xFFFF_FFFF);
        regs.set_u32(TisRegs::TPM_DID_VID as u64, 0x001A_15D1);

        SimTis {
            regs,
            response: RefCell::new(response),
            last_command: RefCell::new(Vec::new()),
            received: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            ready: Cell::new(false),
            burst: Cell::new(burst),
            ready_stuck: Cell::new(false),
            expect_stuck: Cell::new(false),
            go_stuck: Cell::new(false),
            cancel_works: Cell::new(false),
            ready_writes: Cell::new(0),
            cancel_writes: Cell::new(0),
            fifo_writes: Cell::new(0),
            fifo_reads: Cell::new(0),
        }
    }

    fn expect(&self) -> bool {
        let rx = self.received.borrow();
        if rx.is_empty() {
            return false;
        }
        self.expect_stuck.get() || declared_size(&rx).map_or(true, |len| rx.len() < len)
    }

    fn status(&self) -> [u8; 4] {
        let pending = self.pending.borrow().len();
        let mut sts = STS_VALID;
        if self.ready.get() {
            sts |= STS_READY;
        }
        if pending > 0 {
            sts |= STS_DATA;
        }
        if self.expect() {
            sts |= STS_EXPECT;
        }

        let burst = if pending > 0 {
            self.burst.get().min(pending as u16)
        } else {
            self.burst.get()
        };
        [sts, burst as u8, (burst >> 8) as u8, 0]
    }

    fn respond(&self) {
        *self.last_command.borrow_mut() = self.received.borrow().clone();
        *self.pending.borrow_mut() = self.response.borrow().iter().cloned().collect();
    }
}

impl RegisterPort for SimTis {
    fn read(&self, addr: u64, width: AccessWidth) -> tpm_device::Result<u64> {
        let off = self.regs.offset(addr, width)?;
        let sts = TisRegs::TPM_STS as u64;

        if off >= sts && off + width.bytes() as u64 <= sts + 4 {
            let start = (off - sts) as usize;
            return Ok(width.decode(&self.status()[start..]));
        }
        if off == TisRegs::TPM_DATA_FIFO as u64 {
            bump(&self.fifo_reads);
            return Ok(self.pending.borrow_mut().pop_front().unwrap_or(0xFF) as u64);
        }
        self.regs.read(addr, width)
    }

    fn write(&self, addr: u64, width: AccessWidth, value: u64) -> tpm_device::Result<()> {
        let off = self.regs.offset(addr, width)?;

        if off == TisRegs::TPM_DATA_FIFO as u64 {
            bump(&self.fifo_writes);
            self.received.borrow_mut().push(value as u8);
            return Ok(());
        }
        if off != TisRegs::TPM_STS as u64 {
            return self.regs.write(addr, width, value);
        }

        if width == AccessWidth::Dword && value as u32 & TPM_STS_COMMAND_CANCEL != 0 {
            bump(&self.cancel_writes);
            if self.cancel_works.get() {
                self.respond();
            }
            return Ok(());
        }

        let bits = value as u8;
        if bits & STS_READY != 0 {
            bump(&self.ready_writes);
            if !self.ready_stuck.get() {
                self.ready.set(true);
                self.received.borrow_mut().clear();
                self.pending.borrow_mut().clear();
            }
        }
        if bits & STS_GO != 0 && !self.go_stuck.get() {
            self.ready.set(false);
            self.respond();
        }
        Ok(())
    }
}
