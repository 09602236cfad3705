use alloc::vec::Vec;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, error};

use crate::datastructure::{Tpm2Structures, TPM_HEADER_SIZE};
use crate::error::{ErrorKind, Result};

/// Moves one command to the TPM and its response back.
///
/// `cmd` is a complete TPM2 command, header included. The returned buffer is
/// the complete response and is never longer than `max_response`.
pub trait Transport {
    fn execute(&self, cmd: &[u8], max_response: usize) -> Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, cmd: &[u8], max_response: usize) -> Result<Vec<u8>> {
        (**self).execute(cmd, max_response)
    }
}

/// Validate a response header read from the device and return the number of
/// bytes the whole response occupies.
///
/// A declared size below the header length is passed through unchanged; the
/// codec reports it.
pub fn check_response_header(hdr: &[u8], capacity: usize) -> Result<usize> {
    if hdr.len() < TPM_HEADER_SIZE {
        return Err(ErrorKind::BufferTooSmall);
    }

    let tag = BigEndian::read_u16(&hdr[0..2]);
    if tag == Tpm2Structures::TPM2_ST_RSP_COMMAND as u16 {
        error!("response carries the TPM 1.2 tag {:#x}", tag);
        return Err(ErrorKind::NotSupported);
    }

    let size = BigEndian::read_u32(&hdr[2..6]) as usize;
    if size > capacity {
        error!("response of {} bytes exceeds the {} byte buffer", size, capacity);
        return Err(ErrorKind::BufferTooSmall);
    }

    debug!("response tag {:#x} size {}", tag, size);
    Ok(size)
}
