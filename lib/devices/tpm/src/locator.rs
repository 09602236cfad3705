use core::fmt;

use crate::acpi::{StartMethod, Tpm2Table};
use crate::TPM_BASE_ADDR;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LocateError {
    /// Firmware does not describe a TPM.
    NotFound,
    /// A firmware table was present but malformed.
    BadTable,
}

impl fmt::Display for LocateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateError::NotFound => f.write_str("no TPM described by firmware"),
            LocateError::BadTable => f.write_str("malformed TPM2 firmware table"),
        }
    }
}

/// Resolves where the TPM registers live.
pub trait DeviceLocator {
    fn locate_tpm_base(&self) -> core::result::Result<u64, LocateError>;

    /// The interface firmware claims the TPM speaks, if it says.
    fn declared_interface(&self) -> Option<StartMethod> {
        None
    }
}

/// Always answers with a fixed base address.
pub struct FixedLocator(pub u64);

impl Default for FixedLocator {
    fn default() -> Self {
        FixedLocator(TPM_BASE_ADDR)
    }
}

impl DeviceLocator for FixedLocator {
    fn locate_tpm_base(&self) -> core::result::Result<u64, LocateError> {
        Ok(self.0)
    }
}

/// Locator backed by the ACPI `TPM2` table.
pub struct AcpiLocator {
    table: Tpm2Table,
}

impl AcpiLocator {
    pub fn new(table: Tpm2Table) -> AcpiLocator {
        AcpiLocator { table }
    }

    pub fn from_bytes(raw: &[u8]) -> core::result::Result<AcpiLocator, LocateError> {
        Tpm2Table::parse(raw).map(AcpiLocator::new)
    }
}

impl DeviceLocator for AcpiLocator {
    fn locate_tpm_base(&self) -> core::result::Result<u64, LocateError> {
        match self.table.control_area {
            0 => Err(LocateError::NotFound),
            addr => Ok(addr),
        }
    }

    fn declared_interface(&self) -> Option<StartMethod> {
        self.table.start_method()
    }
}
