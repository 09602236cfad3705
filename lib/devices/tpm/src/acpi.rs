// ACPI TPM2 table, as laid out in the TCG ACPI Specification, Table 7.
//
//   0   SDT header (signature "TPM2", length, ...)   36 bytes
//  36   platform class                               u16
//  38   reserved                                     u16
//  40   control area / FIFO base address             u64
//  48   start method                                 u32
//  52   start method parameters ...
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::locator::LocateError;

pub const TPM2_SIGNATURE: &[u8; 4] = b"TPM2";
const SDT_HEADER_LEN: usize = 36;
const TPM2_MIN_LEN: usize = 52;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartMethod {
    AcpiStart,
    /// TIS/FIFO over memory mapped registers.
    Mmio,
    CommandResponseBuffer,
    CommandResponseBufferWithAcpiStart,
    CommandResponseBufferWithSmc,
}

impl StartMethod {
    pub fn from_u32(val: u32) -> Option<StartMethod> {
        match val {
            2 => Some(StartMethod::AcpiStart),
            6 => Some(StartMethod::Mmio),
            7 => Some(StartMethod::CommandResponseBuffer),
            8 => Some(StartMethod::CommandResponseBufferWithAcpiStart),
            11 => Some(StartMethod::CommandResponseBufferWithSmc),
            _ => None,
        }
    }

    pub fn is_crb(self) -> bool {
        match self {
            StartMethod::AcpiStart | StartMethod::Mmio => false,
            _ => true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Tpm2Table {
    pub platform_class: u16,
    pub control_area: u64,
    pub start_method: u32,
}

impl Tpm2Table {
    pub fn parse(raw: &[u8]) -> Result<Tpm2Table, LocateError> {
        if raw.len() < SDT_HEADER_LEN || &raw[0..4] != TPM2_SIGNATURE {
            return Err(LocateError::NotFound);
        }

        let length = LittleEndian::read_u32(&raw[4..8]) as usize;
        if length < TPM2_MIN_LEN || length > raw.len() {
            return Err(LocateError::BadTable);
        }

        let table = Tpm2Table {
            platform_class: LittleEndian::read_u16(&raw[36..38]),
            control_area: LittleEndian::read_u64(&raw[40..48]),
            start_method: LittleEndian::read_u32(&raw[48..52]),
        };
        debug!(
            "TPM2 table: control area {:#x} start method {}",
            table.control_area, table.start_method
        );
        Ok(table)
    }

    pub fn start_method(&self) -> Option<StartMethod> {
        StartMethod::from_u32(self.start_method)
    }
}
