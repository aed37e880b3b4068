//! ARM Debug Interface plumbing: DP/AP register definitions and the SWD
//! memory-access layer built on top of a CMSIS-DAP probe.

pub mod ap;
pub mod dp;
mod interface;

pub use interface::ArmInterface;

/// Whether a transfer addresses the debug port or the selected access port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// Debug port (DP) register space.
    DebugPort = 0,
    /// Access port (AP) register space, selected through `SELECT.APSEL`.
    AccessPort = 1,
}

/// A typed DP or AP register: a 32-bit value with a fixed word address.
///
/// For AP registers the address is the in-bank offset; the bank is carried
/// separately (see [`ap::ApRegister`]).
pub trait Register: From<u32> + Into<u32> + Sized {
    /// Word address inside the register file (bits \[3:2\] go into the
    /// transfer request as A2/A3).
    const ADDRESS: u8;
    /// Register name for diagnostics.
    const NAME: &'static str;
}

/// Errors of the DP/AP transfer layer.
#[derive(Debug, thiserror::Error)]
pub enum DapError {
    /// The target did not drive an acknowledge phase at all.
    #[error("no acknowledge from target; SWD line dead or target unpowered")]
    NoAck,
    /// The target answered FAULT; sticky error flags are set.
    #[error("target signalled FAULT on a DP/AP transfer")]
    Fault,
    /// The probe flagged a protocol error (parity or framing) on the wire.
    #[error("SWD protocol error between probe and target")]
    ProtocolError,
    /// The target answered WAIT for every one of the configured retries.
    #[error("target stayed busy: WAIT persisted through all transfer retries")]
    WaitExceeded,
}
