use core::fmt;
use tpm_device::PortError;

/// Result type used throughout the TPM library.
pub type Result<T> = core::result::Result<T, ErrorKind>;

/// Categories of failure when talking to the TPM.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// A polled register condition never became true.
    ///
    /// Transports either retry locally or escalate this to `DeviceBusy`, so
    /// callers of `execute` never see it.
    Timeout,
    /// The device stopped responding or was left mid-command after a failed
    /// cancel. The transport must be re-initialized before reuse.
    DeviceBusy,
    /// Unexpected protocol tag or unrecognized algorithm.
    NotSupported,
    /// The response does not fit the caller's buffer, or the device wanted
    /// more command bytes than were supplied.
    BufferTooSmall,
    /// Malformed call arguments, e.g. a handle to an incompatible object.
    InvalidParameter,
    /// The register port could not perform an access.
    IoError,
    /// No TPM answered at the probed address.
    NotConnected,
}

impl ErrorKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match *self {
            ErrorKind::Timeout => "timed out waiting for the TPM",
            ErrorKind::DeviceBusy => "TPM is busy or unresponsive",
            ErrorKind::NotSupported => "operation or algorithm not supported",
            ErrorKind::BufferTooSmall => "buffer too small",
            ErrorKind::InvalidParameter => "invalid parameter",
            ErrorKind::IoError => "register access failed",
            ErrorKind::NotConnected => "no TPM present",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PortError> for ErrorKind {
    fn from(err: PortError) -> Self {
        log::error!("register port: {}", err);
        ErrorKind::IoError
    }
}
