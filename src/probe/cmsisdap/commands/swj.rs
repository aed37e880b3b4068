//! SWJ commands: pin control, clock, and raw bit sequences.

use scroll::{Pwrite, LE};

use crate::probe::HidError;

use super::{CommandId, Request, Status};

/// Pin bit positions in `DAP_SWJ_Pins`.
pub const PIN_SWCLK: u8 = 1 << 0;
pub const PIN_SWDIO: u8 = 1 << 1;
pub const PIN_TDI: u8 = 1 << 2;
pub const PIN_TDO: u8 = 1 << 3;
pub const PIN_NTRST: u8 = 1 << 5;
pub const PIN_NRESET: u8 = 1 << 7;

/// `DAP_SWJ_Pins`: drive and read the probe's pins.
///
/// Only pins raised in `select` are driven to the level in `output`; the
/// probe samples all pins after `wait_us` microseconds.
#[derive(Clone, Copy, Debug)]
pub struct SwjPinsRequest {
    pub output: u8,
    pub select: u8,
    pub wait_us: u32,
}

impl SwjPinsRequest {
    /// Drive only the nRESET pin to `level`.
    pub fn nreset(level: bool) -> Self {
        Self {
            output: if level { PIN_NRESET } else { 0 },
            select: PIN_NRESET,
            wait_us: 0,
        }
    }
}

impl Request for SwjPinsRequest {
    const COMMAND_ID: CommandId = CommandId::SwjPins;

    type Response = u8;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.output;
        buffer[1] = self.select;
        buffer
            .pwrite_with(self.wait_us, 2, LE)
            .expect("buffer is sized for the report. This is a bug, please report it.");
        Ok(6)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Ok(buffer[0])
    }
}

/// `DAP_SWJ_Clock`: set the maximum SWD/JTAG clock in Hz.
#[derive(Clone, Copy, Debug)]
pub struct SwjClockRequest {
    pub clock_hz: u32,
}

impl Request for SwjClockRequest {
    const COMMAND_ID: CommandId = CommandId::SwjClock;

    type Response = Status;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer
            .pwrite_with(self.clock_hz, 0, LE)
            .expect("buffer is sized for the report. This is a bug, please report it.");
        Ok(4)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Status::from_byte(buffer[0])
    }
}

/// `DAP_SWJ_Sequence`: clock up to 256 bits out of SWDIO/TMS.
#[derive(Clone, Copy, Debug)]
pub struct SwjSequenceRequest {
    bit_count: u8,
    data: [u8; 32],
}

impl SwjSequenceRequest {
    /// `bit_count` of 256 is encoded as 0 on the wire.
    pub fn new(data: &[u8], bit_count: usize) -> Result<Self, HidError> {
        if bit_count > 256 || bit_count.div_ceil(8) > data.len() {
            return Err(HidError::InvalidRequest(
                "SWJ sequence exceeds the 256-bit command limit",
            ));
        }
        let mut owned = [0u8; 32];
        owned[..data.len()].copy_from_slice(data);
        Ok(Self {
            bit_count: bit_count as u8,
            data: owned,
        })
    }
}

impl Request for SwjSequenceRequest {
    const COMMAND_ID: CommandId = CommandId::SwjSequence;

    type Response = Status;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.bit_count;
        // A bit count of zero transmits 256 bits.
        let byte_count = if self.bit_count == 0 {
            32
        } else {
            (self.bit_count as usize).div_ceil(8)
        };
        buffer[1..1 + byte_count].copy_from_slice(&self.data[..byte_count]);
        Ok(1 + byte_count)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Status::from_byte(buffer[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pins_request_encoding() {
        let request = SwjPinsRequest {
            output: PIN_NRESET,
            select: PIN_NRESET | PIN_SWCLK,
            wait_us: 0x0001_0203,
        };
        let mut buffer = [0u8; 8];
        let n = request.to_bytes(&mut buffer).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buffer[..6], &[0x80, 0x81, 0x03, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn sequence_bit_count_256_encodes_as_zero() {
        let request = SwjSequenceRequest::new(&[0xFF; 32], 256).unwrap();
        let mut buffer = [0u8; 64];
        let n = request.to_bytes(&mut buffer).unwrap();
        assert_eq!(n, 33);
        assert_eq!(buffer[0], 0);
        assert!(buffer[1..33].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn sequence_pads_partial_bytes() {
        let request = SwjSequenceRequest::new(&[0xFF, 0x01], 12).unwrap();
        let mut buffer = [0u8; 8];
        let n = request.to_bytes(&mut buffer).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buffer[..3], &[12, 0xFF, 0x01]);
    }

    #[test]
    fn oversized_sequence_is_rejected() {
        assert!(SwjSequenceRequest::new(&[0u8; 33], 264).is_err());
        assert!(SwjSequenceRequest::new(&[0u8; 1], 16).is_err());
    }
}
