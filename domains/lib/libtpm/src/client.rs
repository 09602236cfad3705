use alloc::vec::Vec;
use log::{error, info, warn};
use tpm_device::{Delay, DeviceLocator, RegisterPort};

use crate::codec::{decode_read_public_response, encode_read_public};
use crate::config::TpmConfig;
use crate::crb::CrbTransport;
use crate::datastructure::ReadPublicResponse;
use crate::error::{ErrorKind, Result};
use crate::ptp::{InterfaceKind, InterfaceSelector, PtpInterface};
use crate::tis::TisTransport;
use crate::transport::Transport;

enum Link<P: RegisterPort, D: Delay> {
    Crb(CrbTransport<P, D>),
    Tis(TisTransport<P, D>),
}

/// The transport picked for a register window at start of day, together
/// with the interface it was picked for.
pub struct PtpTransport<P: RegisterPort, D: Delay> {
    iface: PtpInterface,
    link: Link<P, D>,
}

impl<P: RegisterPort, D: Delay> PtpTransport<P, D> {
    /// Build the transport that speaks `iface` at `base`.
    pub fn new(port: P, delay: D, base: u64, iface: PtpInterface, config: &TpmConfig) -> Result<Self> {
        let link = match iface.kind {
            InterfaceKind::Crb => Link::Crb(CrbTransport::new(port, delay, base, iface, config.crb)),
            // A PTP FIFO speaks the TIS protocol.
            InterfaceKind::Tis | InterfaceKind::Fifo => {
                Link::Tis(TisTransport::new(port, delay, base, config.tis))
            }
            InterfaceKind::Unsupported => return Err(ErrorKind::NotConnected),
        };
        Ok(PtpTransport { iface, link })
    }

    pub fn interface(&self) -> PtpInterface {
        self.iface
    }
}

impl<P: RegisterPort, D: Delay> Transport for PtpTransport<P, D> {
    fn execute(&self, cmd: &[u8], max_response: usize) -> Result<Vec<u8>> {
        match &self.link {
            Link::Crb(crb) => crb.execute(cmd, max_response),
            Link::Tis(tis) => tis.execute(cmd, max_response),
        }
    }
}

/// Issues TPM2 commands over a transport, one at a time.
///
/// The TPM executes a single command at once and nothing here serializes
/// callers, so a client must not be shared between threads without a lock
/// around it.
pub struct TpmClient<T: Transport> {
    transport: T,
    max_response: usize,
}

impl<T: Transport> TpmClient<T> {
    pub fn new(transport: T, max_response: usize) -> Self {
        TpmClient {
            transport,
            max_response,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a fully formed command and return the raw response.
    pub fn submit_command(&self, cmd: &[u8]) -> Result<Vec<u8>> {
        self.transport.execute(cmd, self.max_response)
    }

    /// Table 3:19 - TPM2_ReadPublic
    ///
    /// Read the public area and names of a loaded object.
    pub fn read_public(&self, object_handle: u32) -> Result<ReadPublicResponse> {
        let cmd = encode_read_public(object_handle);
        let rsp = self.submit_command(&cmd)?;
        decode_read_public_response(&rsp)
    }
}

impl<P: RegisterPort, D: Delay> TpmClient<PtpTransport<P, D>> {
    /// Find the TPM, detect its interface and build the matching transport.
    pub fn open<L: DeviceLocator>(port: P, delay: D, locator: &L, config: &TpmConfig) -> Result<Self> {
        let base = locator.locate_tpm_base().map_err(|e| {
            error!("cannot locate TPM: {}", e);
            ErrorKind::NotConnected
        })?;

        let iface = InterfaceSelector::new(&port, base).select()?;

        if let Some(method) = locator.declared_interface() {
            if method.is_crb() != (iface.kind == InterfaceKind::Crb) {
                warn!("firmware declares {:?} but the TPM reports {:?}", method, iface.kind);
            }
        }

        let transport = PtpTransport::new(port, delay, base, iface, config)?;

        info!("TPM at {:#x} using {:?}", base, iface.kind);
        Ok(TpmClient::new(transport, config.max_response))
    }

    /// The interface selected when the client was opened.
    pub fn interface(&self) -> InterfaceKind {
        self.transport.interface().kind
    }
}
