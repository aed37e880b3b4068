//! Host-side flash programming for Infineon/Cypress PSoC6 microcontrollers
//! through CMSIS-DAP (v1, USB-HID) debug probes.
//!
//! The crate is layered the way the hardware is:
//!
//! * [`image`] parses Intel-HEX and ELF32 firmware files into address-space
//!   [`image::Segment`]s and sorts them into a [`image::FirmwareRecord`].
//! * [`probe`] enumerates and opens CMSIS-DAP probes and speaks the v1 HID
//!   report protocol.
//! * [`arm`] drives the SWD debug port and the AHB memory access port on top
//!   of a probe.
//! * [`psoc6`] implements the PSoC6 acquire sequence and the SROM system-call
//!   convention used for erase, program and verify.
//!
//! A typical programming run:
//!
//! ```no_run
//! use cyprog::{probe, psoc6, CancelToken, ProgressSink};
//! use cyprog::image::FirmwareRecord;
//! use cyprog::psoc6::{AccessPort, AcquireMode};
//!
//! # fn main() -> Result<(), cyprog::Error> {
//! let info = probe::scan()?.into_iter().next().expect("no probe attached");
//! let sink = ProgressSink::new(|event| println!("{event:?}"));
//! let cancel = CancelToken::new();
//!
//! let mut session = psoc6::Session::open(&info, sink)?;
//! session.acquire(AcquireMode::Reset, AccessPort::CortexM0, &cancel)?;
//!
//! let record = FirmwareRecord::from_hex_file("firmware.hex")?;
//! for segment in record.application_flash() {
//!     session.program(segment.bytes(), segment.first(), &cancel)?;
//!     session.verify(segment.bytes(), segment.first(), &cancel)?;
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod arm;
pub mod image;
pub mod probe;
pub mod progress;
pub mod psoc6;
pub mod target;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use crate::arm::DapError;
pub use crate::image::ParseError;
pub use crate::probe::HidError;
pub use crate::progress::{ProgressEvent, ProgressSink};
pub use crate::psoc6::{AcquireError, SromError};

/// The top-level error type of this crate.
///
/// Every fallible public operation funnels into this enum; the variants map
/// one to one onto the layers of the stack.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A firmware file could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The USB HID transport failed.
    #[error(transparent)]
    Hid(#[from] HidError),
    /// A DP/AP transfer failed beyond recovery.
    #[error(transparent)]
    Dap(#[from] DapError),
    /// The target could not be acquired.
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    /// An SROM system call reported a failure code.
    #[error(transparent)]
    Srom(#[from] SromError),
    /// Readback verification found a byte that differs from the image.
    #[error("verify mismatch at {address:#010x}: expected {expected:#04x}, read {actual:#04x}")]
    VerifyMismatch {
        /// Address of the first differing byte.
        address: u32,
        /// Byte the firmware image contains.
        expected: u8,
        /// Byte read back from the target.
        actual: u8,
    },
    /// The operation was stopped through a [`CancelToken`].
    #[error("operation cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag shared between a UI thread and a running
/// programming operation.
///
/// Cloning is cheap; all clones observe the same flag. The long-running
/// session operations poll the token between rows and between SROM calls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
