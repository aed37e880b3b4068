//! SWD debug-port bring-up and MEM-AP memory access on top of a CMSIS-DAP
//! probe.

use crate::probe::cmsisdap::commands::transfer::{TransferBlockRequest, TransferRequest};
use crate::probe::CmsisDap;
use crate::Error;

use super::ap::{
    ApRegister, Csw, Drw, Idr, Tar, ADDR_INC_OFF, ADDR_INC_SINGLE, AUTO_INCREMENT_BOUNDARY,
};
use super::dp::{Abort, Ctrl, Select, DPIDR};
use super::{PortType, Register};

/// How many CTRL/STAT reads to attempt while waiting for the power-up
/// acknowledge bits.
const POWER_UP_RETRIES: usize = 100;

/// The SWD interface to one target: debug port state plus the cached
/// `SELECT`/`CSW`/`TAR` values that let repeated memory accesses skip
/// redundant register writes.
#[derive(Debug)]
pub struct ArmInterface {
    probe: CmsisDap,
    select: Option<Select>,
    csw: Option<u32>,
    tar: Option<u32>,
}

impl ArmInterface {
    pub fn new(probe: CmsisDap) -> Self {
        Self {
            probe,
            select: None,
            csw: None,
            tar: None,
        }
    }

    /// Direct access to the probe, for pin control and raw sequences.
    pub fn probe_mut(&mut self) -> &mut CmsisDap {
        &mut self.probe
    }

    /// Forget all cached register state, e.g. after a target reset.
    pub fn invalidate_caches(&mut self) {
        self.select = None;
        self.csw = None;
        self.tar = None;
    }

    /// Send the JTAG-to-SWD switch: at least 50 clocks with SWDIO high on
    /// either side of the 0xE79E selection sequence, then idle clocks to
    /// complete the line reset.
    pub fn swj_switch_to_swd(&mut self) -> Result<(), Error> {
        self.probe.swj_sequence(&[0xFF; 7], 56)?;
        self.probe.swj_sequence(&0xE79E_u16.to_le_bytes(), 16)?;
        self.probe.swj_sequence(&[0xFF; 7], 56)?;
        self.probe.swj_sequence(&[0x00], 8)?;
        self.invalidate_caches();
        Ok(())
    }

    /// Read the debug port identification register.
    pub fn read_dpidr(&mut self) -> Result<DPIDR, Error> {
        self.read_dp_register::<DPIDR>()
    }

    /// Read a DP register.
    pub fn read_dp_register<R: Register>(&mut self) -> Result<R, Error> {
        let request = TransferRequest::single_read(PortType::DebugPort, R::ADDRESS);
        let values = self.probe.transfer(&request)?;
        tracing::trace!("Read {} = {:#010x}", R::NAME, values[0]);
        Ok(R::from(values[0]))
    }

    /// Write a DP register.
    pub fn write_dp_register<R: Register>(&mut self, register: R) -> Result<(), Error> {
        let value: u32 = register.into();
        tracing::trace!("Write {} = {:#010x}", R::NAME, value);
        let request = TransferRequest::single_write(PortType::DebugPort, R::ADDRESS, value);
        self.probe.transfer(&request)?;
        Ok(())
    }

    /// Clear all sticky error flags through the ABORT register.
    pub fn clear_sticky_errors(&mut self) -> Result<(), Error> {
        self.write_dp_register(Abort::clear_all_sticky())
    }

    /// Request debug and system power-up and poll for the acknowledge bits.
    ///
    /// Returns `false` when the acknowledges did not appear within the retry
    /// budget; the caller owns the surrounding deadline policy.
    pub fn power_up_debug(&mut self) -> Result<bool, Error> {
        self.clear_sticky_errors()?;
        self.write_select(Select::default())?;

        let mut ctrl = Ctrl::default();
        ctrl.set_csyspwrupreq(true);
        ctrl.set_cdbgpwrupreq(true);
        self.write_dp_register(ctrl)?;

        for _ in 0..POWER_UP_RETRIES {
            let ctrl = self.read_dp_register::<Ctrl>()?;
            if ctrl.csyspwrupack() && ctrl.cdbgpwrupack() {
                tracing::debug!("Debug and system domains powered up");
                return Ok(true);
            }
        }
        tracing::warn!("Power-up acknowledge bits never rose");
        Ok(false)
    }

    /// Read an AP register of access port `ap`.
    pub fn read_ap_register<R: ApRegister>(&mut self, ap: u8) -> Result<R, Error> {
        self.select_ap_bank(ap, R::BANK)?;
        let request = TransferRequest::single_read(PortType::AccessPort, R::ADDRESS);
        let values = self.probe.transfer(&request)?;
        tracing::trace!("Read AP{} {} = {:#010x}", ap, R::NAME, values[0]);
        Ok(R::from(values[0]))
    }

    /// Write an AP register of access port `ap`.
    pub fn write_ap_register<R: ApRegister>(&mut self, ap: u8, register: R) -> Result<(), Error> {
        let value: u32 = register.into();
        self.select_ap_bank(ap, R::BANK)?;
        tracing::trace!("Write AP{} {} = {:#010x}", ap, R::NAME, value);
        let request = TransferRequest::single_write(PortType::AccessPort, R::ADDRESS, value);
        self.probe.transfer(&request)?;
        Ok(())
    }

    /// Identification register of access port `ap`.
    pub fn ap_idr(&mut self, ap: u8) -> Result<Idr, Error> {
        self.read_ap_register::<Idr>(ap)
    }

    /// Read one 32-bit word from target memory through `ap`.
    pub fn read_word_32(&mut self, ap: u8, address: u32) -> Result<u32, Error> {
        self.prepare_memory_access(ap, address, ADDR_INC_OFF)?;
        let request = TransferRequest::single_read(PortType::AccessPort, Drw::ADDRESS);
        let values = self.probe.transfer(&request)?;
        Ok(values[0])
    }

    /// Write one 32-bit word to target memory through `ap`.
    pub fn write_word_32(&mut self, ap: u8, address: u32, value: u32) -> Result<(), Error> {
        self.prepare_memory_access(ap, address, ADDR_INC_OFF)?;
        let request = TransferRequest::single_write(PortType::AccessPort, Drw::ADDRESS, value);
        self.probe.transfer(&request)?;
        Ok(())
    }

    /// Read `data.len()` words of target memory, chunked to the report size
    /// and the MEM-AP auto-increment window.
    pub fn read_32(&mut self, ap: u8, address: u32, data: &mut [u32]) -> Result<(), Error> {
        let max_words = self.probe.max_block_words();
        let mut address = address;
        let mut data = data;

        while !data.is_empty() {
            let take = block_chunk_len(address, data.len(), max_words);
            self.prepare_memory_access(ap, address, ADDR_INC_SINGLE)?;
            let request =
                TransferBlockRequest::read(PortType::AccessPort, Drw::ADDRESS, take as u16);
            let values = self.probe.transfer_block(&request)?;
            if values.len() != take {
                return Err(crate::probe::HidError::MalformedResponse(
                    "block read returned fewer words than requested",
                )
                .into());
            }

            let (chunk, rest) = std::mem::take(&mut data).split_at_mut(take);
            chunk.copy_from_slice(&values);
            data = rest;
            address = self.advance_tar(address, take);
        }
        Ok(())
    }

    /// Write words to target memory, chunked like [`read_32`].
    ///
    /// [`read_32`]: Self::read_32
    pub fn write_32(&mut self, ap: u8, address: u32, data: &[u32]) -> Result<(), Error> {
        let max_words = self.probe.max_block_words();
        let mut address = address;
        let mut data = data;

        while !data.is_empty() {
            let take = block_chunk_len(address, data.len(), max_words);
            self.prepare_memory_access(ap, address, ADDR_INC_SINGLE)?;
            let request = TransferBlockRequest::write(
                PortType::AccessPort,
                Drw::ADDRESS,
                data[..take].to_vec(),
            );
            self.probe.transfer_block(&request)?;
            data = &data[take..];
            address = self.advance_tar(address, take);
        }
        Ok(())
    }

    /// Byte-level read; `address` and `data.len()` must be word-aligned.
    pub fn read_bytes(&mut self, ap: u8, address: u32, data: &mut [u8]) -> Result<(), Error> {
        debug_assert!(address % 4 == 0 && data.len() % 4 == 0);
        let mut words = vec![0u32; data.len() / 4];
        self.read_32(ap, address, &mut words)?;
        for (chunk, word) in data.chunks_exact_mut(4).zip(&words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Ok(())
    }

    /// Byte-level write; `address` and `data.len()` must be word-aligned.
    pub fn write_bytes(&mut self, ap: u8, address: u32, data: &[u8]) -> Result<(), Error> {
        debug_assert!(address % 4 == 0 && data.len() % 4 == 0);
        let words: Vec<u32> = data
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes(chunk.try_into().expect("chunks of four")))
            .collect();
        self.write_32(ap, address, &words)
    }

    fn select_ap_bank(&mut self, ap: u8, bank: u8) -> Result<(), Error> {
        let mut select = Select::default();
        select.set_ap_sel(ap);
        select.set_ap_bank_sel(bank);
        if self.select != Some(select) {
            self.write_select(select)?;
        }
        Ok(())
    }

    fn write_select(&mut self, select: Select) -> Result<(), Error> {
        // A different AP may hold different CSW/TAR values.
        if self.select.map(|s| s.ap_sel()) != Some(select.ap_sel()) {
            self.csw = None;
            self.tar = None;
        }
        self.write_dp_register(select)?;
        self.select = Some(select);
        Ok(())
    }

    /// Point CSW/TAR at `address` for the next DRW access, skipping the
    /// register writes when the cached values already match.
    fn prepare_memory_access(&mut self, ap: u8, address: u32, addr_inc: u8) -> Result<(), Error> {
        self.select_ap_bank(ap, Csw::BANK)?;

        let csw: u32 = Csw::memory_access(addr_inc).into();
        if self.csw != Some(csw) {
            self.write_ap_register(ap, Csw::from(csw))?;
            self.csw = Some(csw);
        }

        if self.tar != Some(address) {
            self.write_ap_register(ap, Tar::from(address))?;
        }
        self.tar = Some(address);
        Ok(())
    }

    /// Account for TAR auto-increment after `words` DRW accesses. At the
    /// 1 KiB window boundary the hardware behaviour is implementation
    /// defined, so the cache is dropped there.
    fn advance_tar(&mut self, address: u32, words: usize) -> u32 {
        let next = address + (words as u32) * 4;
        if next % AUTO_INCREMENT_BOUNDARY != 0 {
            self.tar = Some(next);
        } else {
            self.tar = None;
        }
        next
    }
}

/// Length of the next block chunk: capped by the report capacity and the
/// distance to the auto-increment window boundary.
fn block_chunk_len(address: u32, remaining_words: usize, max_words: usize) -> usize {
    let to_boundary = (AUTO_INCREMENT_BOUNDARY - (address % AUTO_INCREMENT_BOUNDARY)) / 4;
    remaining_words.min(max_words).min(to_boundary as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::DapError;
    use crate::probe::cmsisdap::mock::{MockDap, MockState};
    use crate::Error;
    use std::sync::{Arc, Mutex};

    fn interface() -> (ArmInterface, Arc<Mutex<MockState>>) {
        let (io, state) = MockDap::new();
        let mut probe = CmsisDap::new(io).unwrap();
        probe.connect_swd().unwrap();
        (ArmInterface::new(probe), state)
    }

    #[test]
    fn chunks_stop_at_the_auto_increment_boundary() {
        // 0x3F8: two words to the 1 KiB boundary.
        assert_eq!(block_chunk_len(0x0800_03F8, 10, 14), 2);
        // Aligned start: limited by the report capacity.
        assert_eq!(block_chunk_len(0x0800_0400, 1000, 14), 14);
        // Short tail.
        assert_eq!(block_chunk_len(0x0800_0400, 3, 14), 3);
    }

    #[test]
    fn word_write_read_round_trip() {
        let (mut interface, _) = interface();
        interface.write_word_32(0, 0x0800_0000, 0xCAFE_F00D).unwrap();
        assert_eq!(interface.read_word_32(0, 0x0800_0000).unwrap(), 0xCAFE_F00D);
    }

    #[test]
    fn wait_answers_are_retried_transparently() {
        let (mut interface, state) = interface();
        interface.write_word_32(0, 0x0800_0000, 0x1234_5678).unwrap();

        // Two WAITs, then normal operation: the read must still return the
        // same value a clean read would.
        state.lock().unwrap().wait_answers = 2;
        assert_eq!(interface.read_word_32(0, 0x0800_0000).unwrap(), 0x1234_5678);
    }

    #[test]
    fn persistent_wait_exhausts_the_retry_budget() {
        let (mut interface, state) = interface();
        state.lock().unwrap().wait_answers = usize::MAX / 2;
        let result = interface.read_word_32(0, 0x0800_0000);
        assert!(matches!(result, Err(Error::Dap(DapError::WaitExceeded))));
    }

    #[test]
    fn block_transfers_cross_the_auto_increment_window() {
        let (mut interface, _) = interface();
        let words: Vec<u32> = (0..64u32).map(|i| 0x1000_0000 | i).collect();
        // Start just below a 1 KiB boundary so the transfer is split there.
        interface.write_32(0, 0x0800_03F0, &words).unwrap();

        let mut readback = vec![0u32; words.len()];
        interface.read_32(0, 0x0800_03F0, &mut readback).unwrap();
        assert_eq!(readback, words);
    }

    #[test]
    fn byte_round_trip_through_word_memory() {
        let (mut interface, _) = interface();
        let bytes: Vec<u8> = (0u16..256).map(|v| v as u8).collect();
        interface.write_bytes(0, 0x0800_1000, &bytes).unwrap();

        let mut readback = vec![0u8; bytes.len()];
        interface.read_bytes(0, 0x0800_1000, &mut readback).unwrap();
        assert_eq!(readback, bytes);
    }

    #[test]
    fn dpidr_is_read_through_the_debug_port() {
        let (mut interface, _) = interface();
        interface.swj_switch_to_swd().unwrap();
        let dpidr = interface.read_dpidr().unwrap();
        assert_eq!(u32::from(dpidr), 0x6BA0_2477);
    }

    #[test]
    fn power_up_acknowledges_on_the_mock() {
        let (mut interface, _) = interface();
        assert!(interface.power_up_debug().unwrap());
    }
}
