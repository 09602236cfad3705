//! Platform TPM Profile interface detection.
//!
//! A PTP compliant TPM exposes either a CRB or a FIFO register layout at the
//! same base address. Both layouts place an interface identifier at offset
//! 0x30, which is what we use to tell them apart. Older TIS 1.2 parts report
//! the TIS type there.

use log::{debug, error, info};
use tpm_device::RegisterPort;

use crate::error::{ErrorKind, Result};
use crate::regs::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InterfaceKind {
    Crb,
    Tis,
    Fifo,
    Unsupported,
}

/// Whether the CRB may be handed a command without being sent to idle first.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdleBypass {
    Supported,
    NotSupported,
    Unknown,
}

impl IdleBypass {
    /// Map the raw capability state. All ones means firmware left the field
    /// undefined.
    pub fn from_state(state: u8) -> IdleBypass {
        match state {
            0 => IdleBypass::NotSupported,
            1 => IdleBypass::Supported,
            _ => IdleBypass::Unknown,
        }
    }
}

/// Result of interface detection, fixed for the lifetime of a client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PtpInterface {
    pub kind: InterfaceKind,
    /// Only meaningful when `kind` is `Crb`.
    pub idle_bypass: IdleBypass,
}

impl PtpInterface {
    pub const fn unsupported() -> PtpInterface {
        PtpInterface {
            kind: InterfaceKind::Unsupported,
            idle_bypass: IdleBypass::Unknown,
        }
    }
}

pub struct InterfaceSelector<P: RegisterPort> {
    port: P,
    base: u64,
}

impl<P: RegisterPort> InterfaceSelector<P> {
    pub fn new(port: P, base: u64) -> InterfaceSelector<P> {
        InterfaceSelector { port, base }
    }

    /// Is anything decoding the register window at all?
    pub fn is_present(&self) -> Result<bool> {
        let access = self.port.read_u8(TisRegs::TPM_ACCESS.addr(self.base))?;
        debug!("presence probe {:x?}", TpmAccess(access));
        Ok(access != TPM_NO_DEVICE)
    }

    /// Classify the register layout without judging it.
    ///
    /// Returns `Unsupported` when no TPM is present or no signature matches.
    pub fn probe(&self) -> Result<PtpInterface> {
        if !self.is_present()? {
            return Ok(PtpInterface::unsupported());
        }
        self.classify()
    }

    /// Match the interface signatures of a present TPM.
    fn classify(&self) -> Result<PtpInterface> {
        let id = TpmInterfaceId(self.port.read_u32(CrbRegs::TPM_CRB_INTF_ID.addr(self.base))?);
        let cap = TpmIntfCap(self.port.read_u32(TisRegs::TPM_INTF_CAPABILITY.addr(self.base))?);
        debug!("{:x?} {:x?}", id, cap);

        let iface = if id.interface_type() == INTERFACE_TYPE_CRB
            && id.interface_version() == INTERFACE_VERSION_CRB
            && id.cap_crb()
        {
            PtpInterface {
                kind: InterfaceKind::Crb,
                idle_bypass: IdleBypass::from_state(id.cap_crb_idle_bypass() as u8),
            }
        } else if id.interface_type() == INTERFACE_TYPE_FIFO
            && id.interface_version() == INTERFACE_VERSION_FIFO
            && id.cap_fifo()
            && cap.iface_ver() == INTF_CAP_IFACE_VER_PTP
        {
            PtpInterface {
                kind: InterfaceKind::Fifo,
                idle_bypass: IdleBypass::Unknown,
            }
        } else if id.interface_type() == INTERFACE_TYPE_TIS {
            PtpInterface {
                kind: InterfaceKind::Tis,
                idle_bypass: IdleBypass::Unknown,
            }
        } else {
            PtpInterface::unsupported()
        };

        Ok(iface)
    }

    /// Pick the interface every later command goes through.
    pub fn select(&self) -> Result<PtpInterface> {
        if !self.is_present()? {
            error!("no TPM at {:#x}", self.base);
            return Err(ErrorKind::NotConnected);
        }

        let iface = self.classify()?;
        match iface.kind {
            InterfaceKind::Unsupported => {
                error!("no known TPM interface signature at {:#x}", self.base);
                return Err(ErrorKind::NotSupported);
            }
            InterfaceKind::Crb if iface.idle_bypass == IdleBypass::Unknown => {
                error!("CRB idle bypass state undefined, check PTP support in firmware");
                return Err(ErrorKind::NotSupported);
            }
            _ => {}
        }

        self.log_identity(iface.kind)?;
        Ok(iface)
    }

    fn log_identity(&self, kind: InterfaceKind) -> Result<()> {
        let vid_did = match kind {
            InterfaceKind::Crb => self.port.read_u32(CrbRegs::TPM_CRB_VID_DID.addr(self.base))?,
            _ => self.port.read_u32(TisRegs::TPM_DID_VID.addr(self.base))?,
        };
        info!(
            "TPM {:?} interface, VID {:#06x} DID {:#06x}",
            kind,
            vid_did & 0xFFFF,
            vid_did >> 16
        );
        Ok(())
    }
}
