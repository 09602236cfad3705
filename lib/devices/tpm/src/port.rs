use byteorder::{ByteOrder, LittleEndian};
use core::fmt;

pub type Result<T> = core::result::Result<T, PortError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortError {
    /// The physical address could not be mapped.
    Unmapped { addr: u64 },
    /// Access width other than 1, 2, 4 or 8 bytes.
    BadWidth(usize),
    /// The access falls outside the register window.
    OutOfRange { addr: u64 },
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PortError::Unmapped { addr } => write!(f, "cannot map physical address {:#x}", addr),
            PortError::BadWidth(w) => write!(f, "unsupported access width {}", w),
            PortError::OutOfRange { addr } => {
                write!(f, "address {:#x} is outside the register window", addr)
            }
        }
    }
}

/// Size of a single bus access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AccessWidth {
    Byte = 1,
    Word = 2,
    Dword = 4,
    Qword = 8,
}

impl AccessWidth {
    pub fn from_bytes(len: usize) -> Result<AccessWidth> {
        match len {
            1 => Ok(AccessWidth::Byte),
            2 => Ok(AccessWidth::Word),
            4 => Ok(AccessWidth::Dword),
            8 => Ok(AccessWidth::Qword),
            _ => Err(PortError::BadWidth(len)),
        }
    }

    #[inline(always)]
    pub fn bytes(self) -> usize {
        self as usize
    }

    pub fn mask(self) -> u64 {
        match self {
            AccessWidth::Qword => u64::MAX,
            w => (1u64 << (w.bytes() * 8)) - 1,
        }
    }

    pub fn is_aligned(self, addr: u64) -> bool {
        addr % self.bytes() as u64 == 0
    }

    /// Lay `value` out the way the bus sees it (little endian), truncated to
    /// the access width. `out` must hold at least `self.bytes()` bytes.
    pub fn encode(self, value: u64, out: &mut [u8]) {
        let n = self.bytes();
        LittleEndian::write_uint(&mut out[..n], value & self.mask(), n);
    }

    /// Inverse of [`AccessWidth::encode`].
    pub fn decode(self, bytes: &[u8]) -> u64 {
        let n = self.bytes();
        LittleEndian::read_uint(&bytes[..n], n)
    }
}

/// Sized register access at a physical address.
///
/// Register ports are shared by reference: a read may have side effects on
/// the device (e.g. the data FIFO), but never on the port itself.
pub trait RegisterPort {
    fn read(&self, addr: u64, width: AccessWidth) -> Result<u64>;
    fn write(&self, addr: u64, width: AccessWidth, value: u64) -> Result<()>;

    #[inline(always)]
    fn read_u8(&self, addr: u64) -> Result<u8> {
        self.read(addr, AccessWidth::Byte).map(|v| v as u8)
    }

    #[inline(always)]
    fn write_u8(&self, addr: u64, val: u8) -> Result<()> {
        self.write(addr, AccessWidth::Byte, val as u64)
    }

    #[inline(always)]
    fn read_u32(&self, addr: u64) -> Result<u32> {
        self.read(addr, AccessWidth::Dword).map(|v| v as u32)
    }

    #[inline(always)]
    fn write_u32(&self, addr: u64, val: u32) -> Result<()> {
        self.write(addr, AccessWidth::Dword, val as u64)
    }

    #[inline(always)]
    fn write_u64(&self, addr: u64, val: u64) -> Result<()> {
        self.write(addr, AccessWidth::Qword, val)
    }
}

impl<T: RegisterPort + ?Sized> RegisterPort for &T {
    fn read(&self, addr: u64, width: AccessWidth) -> Result<u64> {
        (**self).read(addr, width)
    }

    fn write(&self, addr: u64, width: AccessWidth, value: u64) -> Result<()> {
        (**self).write(addr, width, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_values_round_trip_for_every_width() {
        let values = [0u64, 1, 0x7f, 0xff, 0x1234, 0xffff, 0x8001_0000, 0xffff_ffff, u64::MAX];

        for &len in &[1usize, 2, 4, 8] {
            let width = AccessWidth::from_bytes(len).unwrap();
            for &v in values.iter() {
                let mut buf = [0u8; 8];
                width.encode(v, &mut buf);
                assert_eq!(width.decode(&buf), v & width.mask(), "width {} value {:#x}", len, v);
                // Nothing past the access width is touched.
                assert!(buf[len..].iter().all(|&b| b == 0));
            }
        }
    }

    #[test]
    fn odd_widths_are_rejected() {
        for &len in &[0usize, 3, 5, 6, 7, 16] {
            assert_eq!(AccessWidth::from_bytes(len), Err(PortError::BadWidth(len)));
        }
    }

    #[test]
    fn alignment() {
        assert!(AccessWidth::Byte.is_aligned(0x19));
        assert!(!AccessWidth::Word.is_aligned(0x19));
        assert!(AccessWidth::Dword.is_aligned(0x18));
        assert!(!AccessWidth::Qword.is_aligned(0x6c));
    }
}
