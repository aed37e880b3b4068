//! PSoC6 target control: acquire, SROM system calls, and the programming
//! session.

mod session;
mod srom;

pub use session::{AcquireState, Session};
pub use srom::SromError;

/// How the target is brought into a programmable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Hold nRESET, release it, and race the CPU into test mode. The only
    /// mode PSoC6 programming uses.
    Reset,
    /// Power-cycle acquire. Recognised for protocol completeness; no
    /// implementation path exists.
    Power,
}

/// Which AHB access port the session talks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPort {
    /// AP 0, in front of the Cortex-M0+.
    CortexM0 = 0,
    /// AP 1, in front of the Cortex-M4.
    CortexM4 = 1,
}

impl AccessPort {
    pub(crate) fn index(self) -> u8 {
        self as u8
    }
}

/// Errors of the acquire state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// The acquire deadline expired before the target was ready.
    #[error("acquire timed out")]
    Timeout,
    /// The target never answered on the SWD lines, or the access port did
    /// not identify as the expected AHB-AP.
    #[error("no usable SWD response from target")]
    NoSwdResponse,
    /// The test-mode bit did not read back set.
    #[error("target did not enter test mode")]
    TestModeNotEntered,
    /// The requested acquire mode has no implementation.
    #[error("acquire mode is not supported")]
    UnsupportedMode,
    /// An operation that needs an acquired target ran before `acquire`.
    #[error("session has not acquired the target")]
    NotAcquired,
}
