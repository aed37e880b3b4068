//! CMSIS-DAP v1 command encoding and the report-level request/response
//! exchange.
//!
//! Every command is a [`Request`] that serializes itself into a 64-byte HID
//! report and parses its own response. The command-id byte layout follows
//! the CMSIS-DAP specification; all multi-byte fields are little-endian.

pub mod general;
pub mod jtag;
pub mod swd;
pub mod swj;
pub mod transfer;

use std::time::Duration;

use crate::probe::{HidError, ProbeIo};

/// Fixed HID report payload size of a CMSIS-DAP v1 probe.
pub const REPORT_SIZE: usize = 64;

/// How long [`CmsisDapDevice::read`] waits for the probe by default.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Command ids of the CMSIS-DAP v1 set this crate speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    Info = 0x00,
    HostStatus = 0x01,
    Connect = 0x02,
    Disconnect = 0x03,
    TransferConfigure = 0x04,
    Transfer = 0x05,
    TransferBlock = 0x06,
    TransferAbort = 0x07,
    WriteAbort = 0x08,
    Delay = 0x09,
    ResetTarget = 0x0A,
    SwjPins = 0x10,
    SwjClock = 0x11,
    SwjSequence = 0x12,
    SwdConfigure = 0x13,
    JtagSequence = 0x14,
    JtagConfigure = 0x15,
    JtagIdcode = 0x16,
}

/// The single-byte OK/error status most responses start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    DapOk = 0x00,
    DapError = 0xFF,
}

impl Status {
    pub fn from_byte(value: u8) -> Result<Self, HidError> {
        match value {
            0x00 => Ok(Status::DapOk),
            0xFF => Ok(Status::DapError),
            _ => Err(HidError::MalformedResponse("status byte is neither 0x00 nor 0xFF")),
        }
    }
}

/// A CMSIS-DAP command: request payload plus response parser.
pub trait Request {
    const COMMAND_ID: CommandId;

    type Response;

    /// Write the request payload (without the command-id byte) into
    /// `buffer`; returns the number of bytes written.
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError>;

    /// Parse the response payload (without the echoed command-id byte).
    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError>;
}

/// The probe, viewed as a 64-byte-report pipe.
pub struct CmsisDapDevice {
    io: Box<dyn ProbeIo>,
    read_timeout: Duration,
}

impl std::fmt::Debug for CmsisDapDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmsisDapDevice")
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl CmsisDapDevice {
    pub fn new(io: Box<dyn ProbeIo>) -> Self {
        Self {
            io,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Replace the blocking-read timeout (default 1 s).
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, HidError> {
        self.io.write_report(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HidError> {
        match self.io.read_report(buf, self.read_timeout)? {
            // hidapi signals a timeout by returning zero bytes.
            0 => Err(HidError::Timeout),
            n => Ok(n),
        }
    }

    /// Discard any stale reports so requests and responses stay paired.
    /// Expected to "fail" (time out) immediately on a quiet probe.
    pub fn drain(&mut self) {
        tracing::debug!("Draining stale reports from probe");
        let mut discard = [0u8; REPORT_SIZE];
        loop {
            match self.io.read_report(&mut discard, Duration::from_millis(1)) {
                Ok(n) if n != 0 => continue,
                _ => break,
            }
        }
    }
}

/// Send `request` and parse its response.
///
/// The outgoing report is `[report-id, command-id, payload...]` padded to the
/// full report size; the response must echo the command id in its first
/// byte.
pub fn send_command<R: Request>(
    device: &mut CmsisDapDevice,
    request: &R,
) -> Result<R::Response, HidError> {
    // One extra byte up front for the HID report id.
    let mut buffer = [0u8; REPORT_SIZE + 1];
    buffer[1] = R::COMMAND_ID as u8;
    request.to_bytes(&mut buffer[2..])?;

    device.write(&buffer)?;
    trace_report("transmit", &buffer);

    let mut response = [0u8; REPORT_SIZE];
    let n = device.read(&mut response)?;
    trace_report("receive", &response[..n]);

    if response[0] != R::COMMAND_ID as u8 {
        return Err(HidError::MalformedResponse("response echoes a different command"));
    }
    request.parse_response(&response[1..n])
}

/// Send a command that has no response at all (`DAP_TransferAbort`).
pub fn send_command_no_response<R: Request>(
    device: &mut CmsisDapDevice,
    request: &R,
) -> Result<(), HidError> {
    let mut buffer = [0u8; REPORT_SIZE + 1];
    buffer[1] = R::COMMAND_ID as u8;
    request.to_bytes(&mut buffer[2..])?;
    device.write(&buffer)?;
    trace_report("transmit", &buffer);
    Ok(())
}

/// Trace a report, cut after the last non-zero byte to keep the output
/// readable.
fn trace_report(direction: &str, buf: &[u8]) {
    if tracing::enabled!(tracing::Level::TRACE) {
        let len = buf.len();
        let cut = len - buf.iter().rev().position(|&b| b != 0).unwrap_or(len);
        tracing::trace!("{} report: {:02X?}...", direction, &buf[..cut.max(1)]);
    }
}
