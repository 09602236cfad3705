//! Raw access to a TPM register window.
//!
//! This crate is the bottom of the TPM stack: it knows how to perform a sized
//! bus access at a physical address and how to find out where the TPM lives.
//! It knows nothing about CRB or TIS; that is `libtpm`'s business.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod acpi;
pub mod delay;
pub mod locator;
pub mod port;

use core::ptr;
use log::trace;

pub use delay::*;
pub use locator::*;
pub use port::*;

/// Physical base of the TPM register window on PC platforms.
pub const TPM_BASE_ADDR: u64 = 0xFED4_0000;
/// Five localities of 4K each.
pub const TPM_REGION_SIZE: usize = 5 * 4096;

/// A register port over an MMIO window that has already been mapped into our
/// address space.
///
/// Accesses at a naturally aligned offset are performed as a single volatile
/// load or store of the requested width. Unaligned accesses are split into
/// byte accesses, which is what the hardware expects for fields such as the
/// TIS burst count.
pub struct MmioPort {
    phys_base: u64,
    virt_base: *mut u8,
    len: usize,
}

impl MmioPort {
    /// # Safety
    ///
    /// `virt_base` must point to a mapping of `len` bytes of device memory
    /// starting at `phys_base`, mapped uncached, and must stay valid for the
    /// lifetime of the port.
    pub unsafe fn new(phys_base: u64, virt_base: *mut u8, len: usize) -> MmioPort {
        MmioPort {
            phys_base,
            virt_base,
            len,
        }
    }

    pub fn phys_base(&self) -> u64 {
        self.phys_base
    }

    fn translate(&self, addr: u64, width: AccessWidth) -> Result<*mut u8> {
        let offset = addr
            .checked_sub(self.phys_base)
            .ok_or(PortError::OutOfRange { addr })? as usize;

        match offset.checked_add(width.bytes()) {
            Some(end) if end <= self.len => {}
            _ => return Err(PortError::OutOfRange { addr }),
        }
        // Offset is within the mapping checked above.
        Ok(unsafe { self.virt_base.add(offset) })
    }

    fn read_bytes(&self, ptr: *mut u8, width: AccessWidth) -> u64 {
        let mut buf = [0u8; 8];
        for (i, byte) in buf.iter_mut().take(width.bytes()).enumerate() {
            *byte = unsafe { ptr::read_volatile(ptr.add(i)) };
        }
        width.decode(&buf)
    }

    fn write_bytes(&self, ptr: *mut u8, width: AccessWidth, value: u64) {
        let mut buf = [0u8; 8];
        width.encode(value, &mut buf);
        for (i, byte) in buf.iter().take(width.bytes()).enumerate() {
            unsafe { ptr::write_volatile(ptr.add(i), *byte) };
        }
    }
}

impl RegisterPort for MmioPort {
    fn read(&self, addr: u64, width: AccessWidth) -> Result<u64> {
        let p = self.translate(addr, width)?;

        let val = if !width.is_aligned(addr) {
            self.read_bytes(p, width)
        } else {
            unsafe {
                match width {
                    AccessWidth::Byte => ptr::read_volatile(p as *const u8) as u64,
                    AccessWidth::Word => ptr::read_volatile(p as *const u16) as u64,
                    AccessWidth::Dword => ptr::read_volatile(p as *const u32) as u64,
                    // Two dword reads, low half first
                    AccessWidth::Qword => {
                        let lo = ptr::read_volatile(p as *const u32) as u64;
                        let hi = ptr::read_volatile(p.add(4) as *const u32) as u64;
                        (hi << 32) | lo
                    }
                }
            }
        };

        trace!("mmio read  {:#x} ({}) = {:#x}", addr, width.bytes(), val);
        Ok(val)
    }

    fn write(&self, addr: u64, width: AccessWidth, value: u64) -> Result<()> {
        let p = self.translate(addr, width)?;

        trace!("mmio write {:#x} ({}) <- {:#x}", addr, width.bytes(), value);

        if !width.is_aligned(addr) {
            self.write_bytes(p, width, value);
            return Ok(());
        }

        unsafe {
            match width {
                AccessWidth::Byte => ptr::write_volatile(p, value as u8),
                AccessWidth::Word => ptr::write_volatile(p as *mut u16, value as u16),
                AccessWidth::Dword => ptr::write_volatile(p as *mut u32, value as u32),
                AccessWidth::Qword => {
                    ptr::write_volatile(p as *mut u32, value as u32);
                    ptr::write_volatile(p.add(4) as *mut u32, (value >> 32) as u32);
                }
            }
        }
        Ok(())
    }
}
