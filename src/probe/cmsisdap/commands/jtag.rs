//! JTAG commands.
//!
//! Present for command-set completeness; the programmer itself only ever
//! drives SWD. The encoders follow the published byte layout so a JTAG
//! probe session could be added without touching the transport.

use scroll::{Pread, LE};

use crate::probe::HidError;

use super::{CommandId, Request, Status};

/// One TDI sequence of `DAP_JTAG_Sequence`.
#[derive(Clone, Debug)]
pub struct JtagSequence {
    /// Number of TCK cycles, 1..=64.
    cycle_count: u8,
    /// Capture TDO during this sequence.
    capture_tdo: bool,
    /// TMS level held for the whole sequence.
    tms: bool,
    /// TDI bits, least significant first.
    tdi: [u8; 8],
}

impl JtagSequence {
    pub fn new(cycle_count: u8, capture_tdo: bool, tms: bool, tdi: [u8; 8]) -> Result<Self, HidError> {
        if cycle_count > 64 || cycle_count == 0 {
            return Err(HidError::InvalidRequest("JTAG sequence must clock 1..=64 cycles"));
        }
        Ok(Self {
            cycle_count,
            capture_tdo,
            tms,
            tdi,
        })
    }

    fn info_byte(&self) -> u8 {
        // 64 cycles are encoded as 0.
        let count = if self.cycle_count == 64 { 0 } else { self.cycle_count };
        count | (u8::from(self.tms) << 6) | (u8::from(self.capture_tdo) << 7)
    }

    fn tdi_byte_count(&self) -> usize {
        (self.cycle_count as usize).div_ceil(8)
    }
}

/// `DAP_JTAG_Sequence`: generate TCK cycles with fixed TMS and shifting TDI.
#[derive(Clone, Debug)]
pub struct JtagSequenceRequest {
    sequences: Vec<JtagSequence>,
}

impl JtagSequenceRequest {
    pub fn new(sequences: Vec<JtagSequence>) -> Result<Self, HidError> {
        if sequences.is_empty() || sequences.len() > 255 {
            return Err(HidError::InvalidRequest("JTAG sequence count must be 1..=255"));
        }
        Ok(Self { sequences })
    }
}

impl Request for JtagSequenceRequest {
    const COMMAND_ID: CommandId = CommandId::JtagSequence;

    type Response = (Status, Vec<u8>);

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.sequences.len() as u8;
        let mut offset = 1;
        for sequence in &self.sequences {
            buffer[offset] = sequence.info_byte();
            offset += 1;
            let bytes = sequence.tdi_byte_count();
            buffer[offset..offset + bytes].copy_from_slice(&sequence.tdi[..bytes]);
            offset += bytes;
        }
        Ok(offset)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        let status = Status::from_byte(buffer[0])?;
        let captured: usize = self
            .sequences
            .iter()
            .filter(|s| s.capture_tdo)
            .map(JtagSequence::tdi_byte_count)
            .sum();
        let tdo = buffer
            .get(1..1 + captured)
            .ok_or(HidError::MalformedResponse("short JTAG sequence response"))?
            .to_vec();
        Ok((status, tdo))
    }
}

/// `DAP_JTAG_Configure`: announce the IR length of every device in the chain.
#[derive(Clone, Debug)]
pub struct JtagConfigureRequest {
    ir_lengths: Vec<u8>,
}

impl JtagConfigureRequest {
    pub fn new(ir_lengths: Vec<u8>) -> Result<Self, HidError> {
        if ir_lengths.is_empty() || ir_lengths.len() > 255 {
            return Err(HidError::InvalidRequest("JTAG chain must hold 1..=255 devices"));
        }
        Ok(Self { ir_lengths })
    }
}

impl Request for JtagConfigureRequest {
    const COMMAND_ID: CommandId = CommandId::JtagConfigure;

    type Response = Status;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.ir_lengths.len() as u8;
        buffer[1..1 + self.ir_lengths.len()].copy_from_slice(&self.ir_lengths);
        Ok(1 + self.ir_lengths.len())
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Status::from_byte(buffer[0])
    }
}

/// `DAP_JTAG_IDCODE`: read the IDCODE of one device in the chain.
#[derive(Clone, Copy, Debug)]
pub struct JtagIdcodeRequest {
    pub index: u8,
}

impl Request for JtagIdcodeRequest {
    const COMMAND_ID: CommandId = CommandId::JtagIdcode;

    type Response = (Status, u32);

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.index;
        Ok(1)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        let status = Status::from_byte(buffer[0])?;
        let idcode = buffer
            .pread_with(1, LE)
            .map_err(|_| HidError::MalformedResponse("short IDCODE response"))?;
        Ok((status, idcode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_info_byte_packs_count_tms_and_capture() {
        let sequence = JtagSequence::new(6, true, true, [0u8; 8]).unwrap();
        assert_eq!(sequence.info_byte(), 6 | (1 << 6) | (1 << 7));

        let full = JtagSequence::new(64, false, false, [0u8; 8]).unwrap();
        assert_eq!(full.info_byte(), 0);
    }

    #[test]
    fn sequence_request_layout() {
        let sequence = JtagSequence::new(12, false, false, [0xAB, 0x03, 0, 0, 0, 0, 0, 0]).unwrap();
        let request = JtagSequenceRequest::new(vec![sequence]).unwrap();
        let mut buffer = [0u8; 16];
        let n = request.to_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], &[1, 12, 0xAB, 0x03]);
    }

    #[test]
    fn idcode_request_layout() {
        let request = JtagIdcodeRequest { index: 3 };
        let mut buffer = [0u8; 4];
        let n = request.to_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], &[3]);

        let response = [0x00, 0x77, 0x24, 0xA0, 0x6B];
        let (status, idcode) = request.parse_response(&response).unwrap();
        assert_eq!(status, Status::DapOk);
        assert_eq!(idcode, 0x6BA0_2477);
    }
}
