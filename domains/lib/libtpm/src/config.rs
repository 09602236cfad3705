//! Timing budgets for the register protocols.
//!
//! All values are in microseconds. The defaults are the ones given by the TCG
//! PC Client Platform TPM Profile (CRB) and the TIS 1.3 specification.

/// Named timeout budgets of a transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Cancel acknowledge and ready preparation.
    pub b: u64,
    /// Register state transitions.
    pub c: u64,
    /// Burst count availability.
    pub d: u64,
    /// Command execution. Key generation can legitimately take this long.
    pub max: u64,
    /// Stall between two reads of a polled register.
    pub poll_quantum: u64,
    /// Total attempts of the CRB ready sequence, first one included.
    pub retry_max: u32,
}

pub const POLL_QUANTUM_US: u64 = 30;
pub const RETRY_CNT_MAX: u32 = 3;

impl Timeouts {
    pub const fn crb() -> Timeouts {
        Timeouts {
            b: 2000 * 1000,
            c: 200 * 1000,
            d: 30 * 1000,
            max: 90000 * 1000,
            poll_quantum: POLL_QUANTUM_US,
            retry_max: RETRY_CNT_MAX,
        }
    }

    pub const fn tis() -> Timeouts {
        Timeouts {
            b: 2000 * 1000,
            c: 750 * 1000,
            d: 750 * 1000,
            max: 90000 * 1000,
            poll_quantum: POLL_QUANTUM_US,
            retry_max: RETRY_CNT_MAX,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts::crb()
    }
}

/// Everything `TpmClient` needs besides the device itself.
#[derive(Clone, Copy, Debug)]
pub struct TpmConfig {
    pub crb: Timeouts,
    pub tis: Timeouts,
    /// Capacity offered to the transport for each response.
    pub max_response: usize,
}

impl Default for TpmConfig {
    fn default() -> Self {
        TpmConfig {
            crb: Timeouts::crb(),
            tis: Timeouts::tis(),
            max_response: crate::regs::CRB_DATA_BUFFER_SIZE,
        }
    }
}
