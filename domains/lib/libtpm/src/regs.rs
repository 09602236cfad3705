// Register definitions of the TPM register window
// Derived from
//   https://trustedcomputinggroup.org/wp-content/uploads/TCG_PCClientTPMInterfaceSpecification_TIS__1-3_27_03212013.pdf
//   https://trustedcomputinggroup.org/resource/pc-client-platform-tpm-profile-ptp-specification/
//
// Offsets are relative to the locality 0 base found by the device locator.

/// TIS / PTP FIFO register offsets
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug)]
pub enum TisRegs {
    TPM_ACCESS = 0x0000,
    TPM_INT_ENABLE = 0x0008,
    TPM_INT_VECTOR = 0x000C,
    TPM_INT_STATS = 0x0010,
    TPM_INTF_CAPABILITY = 0x0014,
    TPM_STS = 0x0018,
    // 16 bit, not 2-byte aligned
    TPM_BURST_COUNT = 0x0019,
    TPM_DATA_FIFO = 0x0024,
    TPM_INTERFACE_ID = 0x0030,
    TPM_DID_VID = 0x0F00,
    TPM_RID = 0x0F04,
}

/// PTP CRB register offsets
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug)]
pub enum CrbRegs {
    TPM_LOC_STATE = 0x0000,
    TPM_LOC_CTRL = 0x0008,
    TPM_LOC_STS = 0x000C,
    TPM_CRB_INTF_ID = 0x0030,
    TPM_CRB_VID_DID = 0x0034,
    TPM_CRB_CTRL_EXT = 0x0038,
    TPM_CRB_CTRL_REQ = 0x0040,
    TPM_CRB_CTRL_STS = 0x0044,
    TPM_CRB_CTRL_CANCEL = 0x0048,
    TPM_CRB_CTRL_START = 0x004C,
    TPM_CRB_INT_ENABLE = 0x0050,
    TPM_CRB_INT_STS = 0x0054,
    TPM_CRB_CTRL_CMD_SIZE = 0x0058,
    TPM_CRB_CTRL_CMD_LADDR = 0x005C,
    TPM_CRB_CTRL_CMD_HADDR = 0x0060,
    TPM_CRB_CTRL_RSP_SIZE = 0x0064,
    // 64 bit
    TPM_CRB_CTRL_RSP_ADDR = 0x0068,
    TPM_CRB_DATA_BUFFER = 0x0080,
}

impl TisRegs {
    #[inline(always)]
    pub fn addr(self, base: u64) -> u64 {
        base + self as u64
    }
}

impl CrbRegs {
    #[inline(always)]
    pub fn addr(self, base: u64) -> u64 {
        base + self as u64
    }
}

/// The CRB data buffer runs from 0x80 to the end of the 4K locality page.
pub const CRB_DATA_BUFFER_SIZE: usize = 0x1000 - CrbRegs::TPM_CRB_DATA_BUFFER as usize;

/// Every register reads all ones when nothing decodes the address.
pub const TPM_NO_DEVICE: u8 = 0xFF;

bitfield! {
    pub struct TpmAccess(u8);
    impl Debug;
    pub tpm_reg_validsts, _: 7;
    pub active_locality, set_active_locality: 5;
    pub been_seized, set_been_seized: 4;
    pub seize, set_seize: 3;
    pub pending_request, _: 2;
    pub request_use, set_request_use: 1;
    pub tpm_establishment, _: 0;
}

bitfield! {
    pub struct TpmStatus(u8);
    impl Debug;
    u8;
    pub sts_valid, set_sts_valid: 7;
    pub command_ready, set_command_ready: 6;
    pub tpm_go, set_tpm_go: 5;
    pub data_avail, set_data_avail: 4;
    pub expect, _: 3;
    pub selftest_done, _: 2;
    pub response_retry, set_response_retry: 1;
}

// Bits of the 32 bit view of TPM_STS
pub const TPM_STS_COMMAND_CANCEL: u32 = 1 << 24;

bitfield! {
    /// FIFO interface capability register
    pub struct TpmIntfCap(u32);
    impl Debug;
    u32;
    pub iface_ver, _: 30, 28;
    pub data_xfer_size, _: 10, 9;
    pub burst_count_static, _: 8;
    pub cmd_ready_int, _: 7;
    pub locality_change_int, _: 2;
    pub sts_valid_int, _: 1;
    pub data_avail_int, _: 0;
}

pub const INTF_CAP_IFACE_VER_TIS_12: u32 = 0;
pub const INTF_CAP_IFACE_VER_TIS_13: u32 = 2;
pub const INTF_CAP_IFACE_VER_PTP: u32 = 3;

bitfield! {
    /// Interface identifier register, shared by the CRB and FIFO layouts.
    pub struct TpmInterfaceId(u32);
    impl Debug;
    u32;
    pub interface_type, _: 3, 0;
    pub interface_version, _: 7, 4;
    pub cap_locality, _: 8;
    pub cap_crb_idle_bypass, _: 9;
    pub cap_data_xfer_size, _: 12, 11;
    pub cap_fifo, _: 13;
    pub cap_crb, _: 14;
    pub interface_selector, _: 18, 17;
    pub intf_sel_lock, _: 19;
    pub rid, _: 31, 24;
}

pub const INTERFACE_TYPE_FIFO: u32 = 0x0;
pub const INTERFACE_TYPE_CRB: u32 = 0x1;
pub const INTERFACE_TYPE_TIS: u32 = 0xF;
pub const INTERFACE_VERSION_FIFO: u32 = 0x0;
pub const INTERFACE_VERSION_CRB: u32 = 0x1;

bitflags! {
    /// TPM_CRB_CTRL_REQ
    pub struct CrbCtrlRequest: u32 {
        const CMD_READY = 1 << 0;
        const GO_IDLE = 1 << 1;
    }
}

bitflags! {
    /// TPM_CRB_CTRL_STS
    pub struct CrbCtrlStatus: u32 {
        const TPM_STS_ERROR = 1 << 0;
        const TPM_IDLE = 1 << 1;
    }
}

pub const CRB_CTRL_CANCEL: u32 = 1 << 0;
pub const CRB_CTRL_START: u32 = 1 << 0;
