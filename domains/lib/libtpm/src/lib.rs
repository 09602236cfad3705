/*
This library drives a TPM 2.0 directly through its memory mapped registers.
It detects whether the chip exposes the Command/Response Buffer (CRB) or the
FIFO (TIS) interface, moves commands and responses through the matching
register protocol, and encodes/decodes the TPM2 wire format.
Please refer to the following specifications for more detail:
https://trustedcomputinggroup.org/resource/pc-client-platform-tpm-profile-ptp-specification/
https://trustedcomputinggroup.org/wp-content/uploads/TCG_TPM2_r1p59_Part2_Structures_pub.pdf
https://trustedcomputinggroup.org/wp-content/uploads/TCG_TPM2_r1p59_Part3_Commands_pub.pdf
*/

#![cfg_attr(not(test), no_std)]

extern crate alloc;
extern crate byteorder;

#[macro_use]
extern crate bitfield;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate num_derive;

mod client;
mod codec;
mod config;
mod crb;
mod datastructure;
mod error;
mod ptp;
mod regs;
mod retry;
#[cfg(test)]
mod sim;
mod tis;
mod transport;

pub use client::*;
pub use codec::*;
pub use config::*;
pub use crb::*;
pub use datastructure::*;
pub use error::*;
pub use ptp::*;
pub use regs::*;
pub use retry::*;
pub use tis::*;
pub use transport::*;
