//! The SROM system-call convention.
//!
//! The host assembles a parameter block in SRAM (opcode in the high byte of
//! word 0, arguments in the following words), then writes the block address
//! into the IPC trigger register. The SROM handler overwrites word 0 with a
//! status word: high nibble 0xA on success, 0xF with a 28-bit error id on
//! failure.

use std::time::{Duration, Instant};

use crate::arm::ArmInterface;
use crate::target::DeviceFamily;
use crate::{CancelToken, Error};

/// SROM API opcodes.
pub(crate) const OPCODE_SILICON_ID: u8 = 0x00;
pub(crate) const OPCODE_PROGRAM_ROW: u8 = 0x06;
pub(crate) const OPCODE_ERASE_ALL: u8 = 0x0A;
pub(crate) const OPCODE_CHECKSUM: u8 = 0x0B;
pub(crate) const OPCODE_ERASE_SECTOR: u8 = 0x14;

const STATUS_MASK: u32 = 0xF000_0000;
const STATUS_SUCCESS: u32 = 0xA000_0000;
const STATUS_FAILED: u32 = 0xF000_0000;
const ERROR_ID_MASK: u32 = 0x0FFF_FFFF;

/// A call must complete within this window.
const CALL_TIMEOUT: Duration = Duration::from_millis(2000);
/// Delay between status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// An SROM call went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SromError {
    /// The SROM handler reported a failure; carries the 28-bit error id.
    #[error("SROM call failed with error id {0:#09x}")]
    Code(u32),
    /// The status word never left the running state.
    #[error("SROM call did not complete within 2 s")]
    Timeout,
}

/// Builds parameter blocks and runs calls against one device family.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SromApi {
    family: &'static DeviceFamily,
    ap: u8,
}

impl SromApi {
    pub(crate) fn new(family: &'static DeviceFamily, ap: u8) -> Self {
        Self { family, ap }
    }

    /// Run one call: write the parameter block, raise the trigger, poll the
    /// status word. Returns the full status word on success.
    pub(crate) fn call(
        &self,
        interface: &mut ArmInterface,
        params: &[u32],
        cancel: &CancelToken,
    ) -> Result<u32, Error> {
        tracing::debug!(
            "SROM call {:#04x}, {} parameter words",
            params[0] >> 24,
            params.len()
        );
        interface.write_32(self.ap, self.family.srom_params_addr, params)?;
        interface.write_word_32(
            self.ap,
            self.family.srom_trigger_reg,
            self.family.srom_params_addr,
        )?;

        let deadline = Instant::now() + CALL_TIMEOUT;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let status = interface.read_word_32(self.ap, self.family.srom_params_addr)?;
            match status & STATUS_MASK {
                STATUS_SUCCESS => {
                    tracing::trace!("SROM status {:#010x}", status);
                    return Ok(status);
                }
                STATUS_FAILED => return Err(SromError::Code(status & ERROR_ID_MASK).into()),
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(SromError::Timeout.into());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Read `count` result words following the status word.
    pub(crate) fn read_results(
        &self,
        interface: &mut ArmInterface,
        count: usize,
    ) -> Result<Vec<u32>, Error> {
        let mut words = vec![0u32; count];
        interface.read_32(self.ap, self.family.srom_params_addr + 4, &mut words)?;
        Ok(words)
    }

    /// `SiliconId`: identify the silicon. Results land in the two words
    /// after the status word.
    pub(crate) fn silicon_id(
        &self,
        interface: &mut ArmInterface,
        cancel: &CancelToken,
    ) -> Result<(u32, u32), Error> {
        self.call(interface, &[opcode_word(OPCODE_SILICON_ID, 0)], cancel)?;
        let words = self.read_results(interface, 2)?;
        Ok((words[0], words[1]))
    }

    /// `ProgramRow`: program one row from the SRAM scratch buffer.
    pub(crate) fn program_row(
        &self,
        interface: &mut ArmInterface,
        row_addr: u32,
        byte_count: u32,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        let params = [
            opcode_word(OPCODE_PROGRAM_ROW, 0),
            row_addr,
            byte_count,
            self.family.srom_data_addr,
        ];
        self.call(interface, &params, cancel)?;
        Ok(())
    }

    /// `EraseSector`: erase the sector containing `sector_addr`.
    pub(crate) fn erase_sector(
        &self,
        interface: &mut ArmInterface,
        sector_addr: u32,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        let params = [opcode_word(OPCODE_ERASE_SECTOR, 0), sector_addr];
        self.call(interface, &params, cancel)?;
        Ok(())
    }

    /// `EraseAll`: erase the whole application flash.
    pub(crate) fn erase_all(
        &self,
        interface: &mut ArmInterface,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        self.call(interface, &[opcode_word(OPCODE_ERASE_ALL, 0)], cancel)?;
        Ok(())
    }

    /// `ChecksumRow`: 28-bit byte sum of one row, computed by the SROM.
    pub(crate) fn checksum_row(
        &self,
        interface: &mut ArmInterface,
        row_addr: u32,
        cancel: &CancelToken,
    ) -> Result<u32, Error> {
        let params = [opcode_word(OPCODE_CHECKSUM, 1), row_addr];
        let status = self.call(interface, &params, cancel)?;
        Ok(status & ERROR_ID_MASK)
    }
}

/// Word 0 layout: opcode in the high byte, call-specific bits below.
fn opcode_word(opcode: u8, arg: u32) -> u32 {
    (u32::from(opcode) << 24) | (arg & 0x00FF_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_sits_in_the_high_byte() {
        assert_eq!(opcode_word(OPCODE_PROGRAM_ROW, 0), 0x0600_0000);
        assert_eq!(opcode_word(OPCODE_CHECKSUM, 1), 0x0B00_0001);
        assert_eq!(opcode_word(0xFF, 0x0123_4567), 0xFF23_4567);
    }
}
