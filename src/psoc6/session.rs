//! The programming session: acquire, identify, erase, program, verify.

use std::time::{Duration, Instant};

use crate::arm::dp::Abort;
use crate::arm::ArmInterface;
use crate::probe::{self, CmsisDap, ProbeInfo};
use crate::progress::ProgressSink;
use crate::target::{DeviceFamily, DeviceInfo, ProtectionState};
use crate::{CancelToken, Error};

use super::srom::SromApi;
use super::{AccessPort, AcquireError, AcquireMode};

/// Acquire must finish within this window.
const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(1500);
/// How long nRESET is held low at the start of an acquire.
const RESET_HOLD: Duration = Duration::from_millis(1);
/// Pause between polls of the test-mode register and between SWD bring-up
/// attempts.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// SWD clock used for programming.
const SWJ_CLOCK_HZ: u32 = 1_000_000;
/// Value written to the test-mode register; bit 31 latches test mode.
const TEST_MODE_BIT: u32 = 0x8000_0000;

/// Where the session stands in the acquire sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireState {
    /// No target control; the session starts here and failures return here.
    Idle,
    /// nRESET is held low.
    ResetHeld,
    /// Reset released; racing the CPU for an SWD response.
    WaitTestMode,
    /// The AHB-AP answered with the expected identification.
    ApOpened,
    /// Test mode is latched; SROM calls may be issued.
    Ready,
}

/// An open probe plus the state needed to program one PSoC6 target.
///
/// All operations are blocking and run on the calling thread; a UI is
/// expected to call them from a worker and to feed a [`CancelToken`] it can
/// trip from the outside.
#[derive(Debug)]
pub struct Session {
    interface: ArmInterface,
    family: &'static DeviceFamily,
    ap: u8,
    state: AcquireState,
    sink: ProgressSink,
}

impl Session {
    /// Open the probe described by `info` and prepare it for SWD.
    pub fn open(info: &ProbeInfo, sink: ProgressSink) -> Result<Self, Error> {
        Self::from_probe(probe::open(info)?, sink)
    }

    /// Build a session on an already opened probe. This is also the hook for
    /// alternative transports and for tests.
    pub fn from_probe(mut probe: CmsisDap, sink: ProgressSink) -> Result<Self, Error> {
        probe.connect_swd()?;
        probe.set_swj_clock(SWJ_CLOCK_HZ)?;
        Ok(Self {
            interface: ArmInterface::new(probe),
            family: DeviceFamily::default_family(),
            ap: 0,
            state: AcquireState::Idle,
            sink,
        })
    }

    /// Current acquire state.
    pub fn state(&self) -> AcquireState {
        self.state
    }

    /// The device family the session currently assumes.
    pub fn family(&self) -> &'static DeviceFamily {
        self.family
    }

    /// Run the acquire sequence: reset the target, race it for an SWD
    /// response, power the debug domains, open the access port and latch
    /// test mode.
    pub fn acquire(
        &mut self,
        mode: AcquireMode,
        port: AccessPort,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        if mode != AcquireMode::Reset {
            return Err(AcquireError::UnsupportedMode.into());
        }
        self.ap = port.index();

        match self.acquire_inner(cancel) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.state = AcquireState::Idle;
                let _ = self.interface.probe_mut().set_nreset(true);
                Err(error)
            }
        }
    }

    fn acquire_inner(&mut self, cancel: &CancelToken) -> Result<(), Error> {
        self.sink.log("Acquiring target");
        self.state = AcquireState::Idle;

        self.interface.probe_mut().set_nreset(false)?;
        self.state = AcquireState::ResetHeld;
        std::thread::sleep(RESET_HOLD);

        let deadline = Instant::now() + ACQUIRE_TIMEOUT;
        self.interface.probe_mut().set_nreset(true)?;
        self.interface.invalidate_caches();
        self.state = AcquireState::WaitTestMode;

        // The CPU boots towards user code; keep re-trying the SWD switch
        // until the port answers or the window closes.
        let dpidr = loop {
            self.check_cancel(cancel)?;
            let attempt = self
                .interface
                .swj_switch_to_swd()
                .and_then(|()| self.interface.read_dpidr());
            match attempt {
                Ok(dpidr) => break dpidr,
                Err(Error::Hid(error)) => return Err(error.into()),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(ACQUIRE_POLL_INTERVAL);
                }
                Err(_) => return Err(AcquireError::NoSwdResponse.into()),
            }
        };
        tracing::info!("Debug port answered, DPIDR {:#010x}", u32::from(dpidr));

        if !self.interface.power_up_debug()? {
            return Err(AcquireError::Timeout.into());
        }

        let idr = self.interface.ap_idr(self.ap)?;
        if !idr.is_ahb_mem_ap() {
            tracing::warn!("AP{} IDR {:#010x} is not an AHB-AP", self.ap, u32::from(idr));
            return Err(AcquireError::NoSwdResponse.into());
        }
        self.state = AcquireState::ApOpened;

        self.interface
            .write_word_32(self.ap, self.family.test_mode_reg, TEST_MODE_BIT)?;
        loop {
            self.check_cancel(cancel)?;
            let value = self
                .interface
                .read_word_32(self.ap, self.family.test_mode_reg)?;
            if value & TEST_MODE_BIT != 0 {
                break;
            }
            if Instant::now() >= deadline {
                return Err(AcquireError::TestModeNotEntered.into());
            }
            std::thread::sleep(ACQUIRE_POLL_INTERVAL);
        }

        self.state = AcquireState::Ready;
        self.sink.log("Target acquired");
        Ok(())
    }

    /// Identify the silicon through the SiliconId SROM call.
    ///
    /// A `Secure` or `Dead` protection state is reported, not enforced; the
    /// caller decides whether to continue.
    pub fn get_info(&mut self) -> Result<DeviceInfo, Error> {
        self.ensure_ready()?;
        let cancel = CancelToken::new();
        let srom = self.srom();
        let (id_word, rev_word) = srom.silicon_id(&mut self.interface, &cancel)?;

        let info = DeviceInfo {
            family_id: (id_word >> 16) as u16,
            silicon_id: id_word as u16,
            revision_id: (rev_word >> 8) as u8,
            protection: ProtectionState::from(rev_word as u8),
        };

        if let Some(family) = DeviceFamily::from_family_id(info.family_id) {
            self.family = family;
            self.sink.log(format!("Detected {}", family.name));
        } else {
            tracing::warn!("Unknown family id {:#06x}", info.family_id);
        }
        if matches!(info.protection, ProtectionState::Secure | ProtectionState::Dead) {
            self.sink
                .log(format!("Warning: device protection state is {:?}", info.protection));
        }
        Ok(info)
    }

    /// Erase all sectors overlapping `start..=end`.
    pub fn erase(&mut self, start: u32, end: u32, cancel: &CancelToken) -> Result<(), Error> {
        self.ensure_ready()?;
        self.erase_inner(start, end, cancel)
            .map_err(|e| self.recover_transport(e))
    }

    fn erase_inner(&mut self, start: u32, end: u32, cancel: &CancelToken) -> Result<(), Error> {
        let sector = self.family.sector_size;
        let first = start & !(sector - 1);
        let end_exclusive = (u64::from(end) | u64::from(sector - 1)) + 1;
        let total = end_exclusive - u64::from(first);

        self.sink
            .log(format!("Erasing {:#010x}..{:#010x}", first, end_exclusive));
        let srom = self.srom();
        let mut address = u64::from(first);
        let mut done = 0u64;
        while address < end_exclusive {
            self.check_cancel(cancel)?;
            srom.erase_sector(&mut self.interface, address as u32, cancel)?;
            address += u64::from(sector);
            done += u64::from(sector);
            self.sink.progress(done, total);
        }
        Ok(())
    }

    /// Erase the whole application flash in one SROM call.
    pub fn erase_all(&mut self, cancel: &CancelToken) -> Result<(), Error> {
        self.ensure_ready()?;
        self.sink.log("Erasing all application flash");
        let srom = self.srom();
        srom.erase_all(&mut self.interface, cancel)
            .map_err(|e| self.recover_transport(e))
    }

    /// Program `bytes` at `start`, row by row. Partial first and last rows
    /// are padded with `0xFF`; progress counts image bytes only.
    pub fn program(&mut self, bytes: &[u8], start: u32, cancel: &CancelToken) -> Result<(), Error> {
        self.ensure_ready()?;
        self.program_inner(bytes, start, cancel, 0, bytes.len() as u64)
            .map_err(|e| self.recover_transport(e))
    }

    /// Program every application-flash segment of `record`, with one
    /// progress scale across the whole image.
    pub fn program_record(
        &mut self,
        record: &crate::image::FirmwareRecord,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        let total = record.program_byte_count();
        let mut done = 0u64;
        for segment in record.application_flash() {
            self.program_inner(segment.bytes(), segment.first(), cancel, done, total)
                .map_err(|e| self.recover_transport(e))?;
            done += segment.len() as u64;
        }
        Ok(())
    }

    fn program_inner(
        &mut self,
        bytes: &[u8],
        start: u32,
        cancel: &CancelToken,
        done_base: u64,
        total: u64,
    ) -> Result<(), Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        let row = self.family.row_size as usize;
        let lead = (start as usize) % row;
        let first_row = start - lead as u32;

        let mut padded = vec![0xFF_u8; lead];
        padded.extend_from_slice(bytes);
        let tail = (row - padded.len() % row) % row;
        padded.resize(padded.len() + tail, 0xFF);

        self.sink.log(format!(
            "Programming {} bytes at {:#010x} ({} rows)",
            bytes.len(),
            start,
            padded.len() / row
        ));

        let srom = self.srom();
        let image = lead..lead + bytes.len();
        let mut done = done_base;
        for (i, chunk) in padded.chunks(row).enumerate() {
            self.check_cancel(cancel)?;
            let row_addr = first_row + (i * row) as u32;

            self.interface
                .write_bytes(self.ap, self.family.srom_data_addr, chunk)?;
            srom.program_row(&mut self.interface, row_addr, row as u32, cancel)?;

            let span = i * row..(i + 1) * row;
            done += overlap(&span, &image) as u64;
            self.sink.progress(done, total);
        }
        Ok(())
    }

    /// Read back `bytes.len()` bytes from `start` and compare; returns
    /// [`Error::VerifyMismatch`] for the first differing byte.
    pub fn verify(&mut self, bytes: &[u8], start: u32, cancel: &CancelToken) -> Result<(), Error> {
        self.ensure_ready()?;
        self.verify_inner(bytes, start, cancel)
            .map_err(|e| self.recover_transport(e))
    }

    fn verify_inner(&mut self, bytes: &[u8], start: u32, cancel: &CancelToken) -> Result<(), Error> {
        let row = self.family.row_size as usize;
        let total = bytes.len() as u64;
        self.sink
            .log(format!("Verifying {} bytes at {:#010x}", bytes.len(), start));

        let mut offset = 0usize;
        while offset < bytes.len() {
            self.check_cancel(cancel)?;
            let len = row.min(bytes.len() - offset);
            let address = start + offset as u32;
            let actual = self.read_back(address, len)?;

            for (j, (&expected, &actual)) in bytes[offset..offset + len].iter().zip(&actual).enumerate() {
                if expected != actual {
                    return Err(Error::VerifyMismatch {
                        address: address + j as u32,
                        expected,
                        actual,
                    });
                }
            }
            offset += len;
            self.sink.progress(offset as u64, total);
        }
        Ok(())
    }

    /// Verify through the ChecksumRow SROM call instead of reading every
    /// byte back; rows that fail the checksum are re-read to locate the
    /// differing byte. Assumes partial rows were programmed with `0xFF`
    /// padding, as [`program`](Self::program) writes them.
    pub fn verify_checksum(
        &mut self,
        bytes: &[u8],
        start: u32,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        self.verify_checksum_inner(bytes, start, cancel)
            .map_err(|e| self.recover_transport(e))
    }

    fn verify_checksum_inner(
        &mut self,
        bytes: &[u8],
        start: u32,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        let row = self.family.row_size as usize;
        let lead = (start as usize) % row;
        let first_row = start - lead as u32;

        let mut padded = vec![0xFF_u8; lead];
        padded.extend_from_slice(bytes);
        let tail = (row - padded.len() % row) % row;
        padded.resize(padded.len() + tail, 0xFF);

        let srom = self.srom();
        let total = (padded.len() / row) as u64;
        for (i, chunk) in padded.chunks(row).enumerate() {
            self.check_cancel(cancel)?;
            let row_addr = first_row + (i * row) as u32;
            let expected: u32 = chunk
                .iter()
                .fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
                & 0x0FFF_FFFF;
            let actual = srom.checksum_row(&mut self.interface, row_addr, cancel)?;

            if expected != actual {
                tracing::debug!(
                    "Row {:#010x} checksum mismatch ({:#x} != {:#x}), re-reading",
                    row_addr,
                    expected,
                    actual
                );
                let readback = self.read_back(row_addr, row)?;
                for (j, (&expected, &actual)) in chunk.iter().zip(&readback).enumerate() {
                    if expected != actual {
                        return Err(Error::VerifyMismatch {
                            address: row_addr + j as u32,
                            expected,
                            actual,
                        });
                    }
                }
            }
            self.sink.progress(i as u64 + 1, total);
        }
        Ok(())
    }

    /// Release the target and the probe.
    pub fn close(mut self) -> Result<(), Error> {
        self.sink.log("Releasing target");
        self.state = AcquireState::Idle;
        let _ = self.interface.probe_mut().set_nreset(true);
        self.interface.probe_mut().disconnect()
    }

    fn srom(&self) -> SromApi {
        SromApi::new(self.family, self.ap)
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        if self.state == AcquireState::Ready {
            Ok(())
        } else {
            Err(AcquireError::NotAcquired.into())
        }
    }

    /// Poll the cancel flag; on cancellation abort the pending transfer,
    /// clear DP sticky state, release the target and drop to `Idle`.
    fn check_cancel(&mut self, cancel: &CancelToken) -> Result<(), Error> {
        if !cancel.is_cancelled() {
            return Ok(());
        }
        tracing::info!("Cancellation requested");
        let mut abort = Abort::default();
        abort.set_dapabort(true);
        let _ = self.interface.probe_mut().write_abort(abort);
        let _ = self.interface.clear_sticky_errors();
        let _ = self.interface.probe_mut().set_nreset(true);
        self.state = AcquireState::Idle;
        self.sink.log("Operation cancelled");
        Err(Error::Cancelled)
    }

    /// After a transport failure mid-operation, try to leave the DP in a
    /// clean state before surfacing the original error.
    fn recover_transport(&mut self, error: Error) -> Error {
        if matches!(error, Error::Hid(_) | Error::Dap(_)) {
            tracing::warn!("Transport error during operation: {error}");
            let mut abort = Abort::default();
            abort.set_dapabort(true);
            let _ = self.interface.probe_mut().write_abort(abort);
            let _ = self.interface.clear_sticky_errors();
        }
        error
    }

    fn read_back(&mut self, address: u32, len: usize) -> Result<Vec<u8>, Error> {
        let aligned_start = address & !3;
        let aligned_end = (address + len as u32 + 3) & !3;
        let mut buffer = vec![0u8; (aligned_end - aligned_start) as usize];
        self.interface
            .read_bytes(self.ap, aligned_start, &mut buffer)?;
        let lead = (address - aligned_start) as usize;
        Ok(buffer[lead..lead + len].to_vec())
    }
}

/// Bytes shared by two half-open ranges.
fn overlap(a: &std::ops::Range<usize>, b: &std::ops::Range<usize>) -> usize {
    a.end.min(b.end).saturating_sub(a.start.max(b.start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::cmsisdap::mock::{MockDap, MockState};
    use crate::progress::ProgressEvent;
    use crate::psoc6::SromError;
    use crate::target::ProtectionState;
    use std::sync::{Arc, Mutex};

    const FLASH: u32 = 0x1000_0000;

    type Events = Arc<Mutex<Vec<ProgressEvent>>>;

    fn make_session() -> (Session, Arc<Mutex<MockState>>, Events) {
        let (io, state) = MockDap::new();
        let probe = CmsisDap::new(io).unwrap();
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let sink = ProgressSink::new(move |event| captured.lock().unwrap().push(event));
        let session = Session::from_probe(probe, sink).unwrap();
        (session, state, events)
    }

    fn acquired_session() -> (Session, Arc<Mutex<MockState>>, Events) {
        let (mut session, state, events) = make_session();
        session
            .acquire(AcquireMode::Reset, AccessPort::CortexM0, &CancelToken::new())
            .unwrap();
        (session, state, events)
    }

    fn progress_events(events: &Events) -> Vec<(u32, u32)> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress { done, total } => Some((*done, *total)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn acquire_reaches_ready_within_the_deadline() {
        let (mut session, state, _) = make_session();
        // Test mode reads back set only on the third poll.
        state.lock().unwrap().test_mode_reads_until_set = 2;
        session
            .acquire(AcquireMode::Reset, AccessPort::CortexM0, &CancelToken::new())
            .unwrap();
        assert_eq!(session.state(), AcquireState::Ready);
    }

    #[test]
    fn power_acquire_mode_is_rejected() {
        let (mut session, _, _) = make_session();
        let result = session.acquire(
            AcquireMode::Power,
            AccessPort::CortexM0,
            &CancelToken::new(),
        );
        assert!(matches!(
            result,
            Err(Error::Acquire(AcquireError::UnsupportedMode))
        ));
        assert_eq!(session.state(), AcquireState::Idle);
    }

    #[test]
    fn operations_require_an_acquired_target() {
        let (mut session, _, _) = make_session();
        let result = session.erase(FLASH, FLASH + 1, &CancelToken::new());
        assert!(matches!(
            result,
            Err(Error::Acquire(AcquireError::NotAcquired))
        ));
    }

    #[test]
    fn silicon_info_is_decoded_and_updates_the_family() {
        let (mut session, _, _) = acquired_session();
        let info = session.get_info().unwrap();
        assert_eq!(info.family_id, 0x102);
        assert_eq!(info.silicon_id, 0x2100);
        assert_eq!(info.revision_id, 0x12);
        assert_eq!(info.protection, ProtectionState::Normal);
        assert_eq!(info.family_name(), Some("PSoC6A-2M"));
    }

    #[test]
    fn secure_devices_are_reported_not_blocked() {
        let (mut session, state, _) = acquired_session();
        state.lock().unwrap().silicon.3 = 0x03;
        let info = session.get_info().unwrap();
        assert_eq!(info.protection, ProtectionState::Secure);
    }

    #[test]
    fn program_one_row_issues_one_srom_call_and_reports_progress() {
        let (mut session, state, events) = acquired_session();
        let image = vec![0xAA_u8; 512];
        session.program(&image, FLASH, &CancelToken::new()).unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.programmed_rows, vec![FLASH]);
        for i in 0..512 {
            assert_eq!(state.read_byte(FLASH + i), 0xAA, "flash byte {i}");
        }
        drop(state);

        assert_eq!(progress_events(&events), vec![(512, 512)]);
    }

    #[test]
    fn program_pads_partial_rows_with_ff() {
        let (mut session, state, events) = acquired_session();
        let image: Vec<u8> = (0..100).collect();
        session.program(&image, FLASH, &CancelToken::new()).unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.programmed_rows, vec![FLASH]);
        for (i, &expected) in image.iter().enumerate() {
            assert_eq!(state.read_byte(FLASH + i as u32), expected);
        }
        for i in 100..512 {
            assert_eq!(state.read_byte(FLASH + i), 0xFF, "pad byte {i}");
        }
        drop(state);

        assert_eq!(progress_events(&events), vec![(100, 100)]);
    }

    #[test]
    fn program_spanning_rows_accumulates_progress() {
        let (mut session, state, events) = acquired_session();
        let image = vec![0x5A_u8; 1024 + 16];
        session.program(&image, FLASH, &CancelToken::new()).unwrap();

        assert_eq!(
            state.lock().unwrap().programmed_rows,
            vec![FLASH, FLASH + 512, FLASH + 1024]
        );
        assert_eq!(
            progress_events(&events),
            vec![(512, 1040), (1024, 1040), (1040, 1040)]
        );
    }

    #[test]
    fn verify_passes_after_programming() {
        let (mut session, _, _) = acquired_session();
        let image: Vec<u8> = (0u16..=255).cycle().take(1024).map(|v| v as u8).collect();
        session.program(&image, FLASH, &CancelToken::new()).unwrap();
        session.verify(&image, FLASH, &CancelToken::new()).unwrap();
    }

    #[test]
    fn verify_reports_the_first_mismatching_byte() {
        let (mut session, state, _) = acquired_session();
        let image = vec![0xAA_u8; 512];
        session.program(&image, FLASH, &CancelToken::new()).unwrap();
        state.lock().unwrap().write_byte(FLASH + 100, 0x55);

        let result = session.verify(&image, FLASH, &CancelToken::new());
        match result {
            Err(Error::VerifyMismatch {
                address,
                expected,
                actual,
            }) => {
                assert_eq!(address, 0x1000_0064);
                assert_eq!(expected, 0xAA);
                assert_eq!(actual, 0x55);
            }
            other => panic!("expected a verify mismatch, got {other:?}"),
        }
    }

    #[test]
    fn checksum_verify_accepts_good_rows_and_pinpoints_bad_bytes() {
        let (mut session, state, _) = acquired_session();
        let image = vec![0x33_u8; 600];
        session.program(&image, FLASH, &CancelToken::new()).unwrap();
        session
            .verify_checksum(&image, FLASH, &CancelToken::new())
            .unwrap();

        state.lock().unwrap().write_byte(FLASH + 700, 0x01);
        let result = session.verify_checksum(&image, FLASH, &CancelToken::new());
        match result {
            Err(Error::VerifyMismatch { address, .. }) => assert_eq!(address, FLASH + 700),
            other => panic!("expected a verify mismatch, got {other:?}"),
        }
    }

    #[test]
    fn erase_aligns_the_range_outward_to_sectors() {
        let (mut session, state, _) = acquired_session();
        state.lock().unwrap().write_word(FLASH + 0x100, 0xDEAD_BEEF);

        session
            .erase(FLASH + 0x100, FLASH + 0x0004_0100, &CancelToken::new())
            .unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.erased_sectors, vec![FLASH, FLASH + 0x0004_0000]);
        assert_eq!(state.read_word(FLASH + 0x100), 0);
    }

    #[test]
    fn erase_all_uses_the_bulk_srom_call() {
        let (mut session, state, _) = acquired_session();
        state.lock().unwrap().write_word(FLASH + 0x8000, 0x1234_5678);

        session.erase_all(&CancelToken::new()).unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.erase_all_calls, 1);
        assert_eq!(state.read_word(FLASH + 0x8000), 0);
    }

    #[test]
    fn srom_failure_codes_surface_with_their_error_id() {
        let (mut session, state, _) = acquired_session();
        state.lock().unwrap().srom_error = Some(0x42);
        let result = session.erase(FLASH, FLASH + 1, &CancelToken::new());
        assert!(matches!(
            result,
            Err(Error::Srom(SromError::Code(0x42)))
        ));
    }

    #[test]
    fn cancellation_aborts_cleans_up_and_drops_to_idle() {
        let (mut session, state, _) = acquired_session();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = session.program(&[0xAA; 512], FLASH, &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(session.state(), AcquireState::Idle);

        let state = state.lock().unwrap();
        assert!(state.write_aborts > 0, "cancel must issue a WriteAbort");
        assert!(state.nreset, "cancel must release the reset line");
        assert!(state.programmed_rows.is_empty());
    }

    #[test]
    fn dead_swd_line_reports_no_response() {
        let (mut session, state, _) = make_session();
        state.lock().unwrap().no_ack = true;
        let result = session.acquire(
            AcquireMode::Reset,
            AccessPort::CortexM0,
            &CancelToken::new(),
        );
        assert!(matches!(
            result,
            Err(Error::Acquire(AcquireError::NoSwdResponse))
        ));
        assert_eq!(session.state(), AcquireState::Idle);
    }

    #[test]
    fn missing_test_mode_latch_reports_not_entered() {
        let (mut session, state, _) = make_session();
        state.lock().unwrap().test_mode_reads_until_set = usize::MAX;
        let result = session.acquire(
            AcquireMode::Reset,
            AccessPort::CortexM0,
            &CancelToken::new(),
        );
        assert!(matches!(
            result,
            Err(Error::Acquire(AcquireError::TestModeNotEntered))
        ));
    }

    #[test]
    fn program_record_walks_all_flash_segments() {
        use crate::image::{FirmwareRecord, Segment};

        let (mut session, state, events) = acquired_session();
        let record = FirmwareRecord::from_segments(
            vec![
                Segment::new(FLASH, vec![0x11; 512]),
                Segment::new(FLASH + 0x4000, vec![0x22; 512]),
            ],
            512,
        );
        session.program_record(&record, &CancelToken::new()).unwrap();

        assert_eq!(
            state.lock().unwrap().programmed_rows,
            vec![FLASH, FLASH + 0x4000]
        );
        assert_eq!(progress_events(&events), vec![(512, 1024), (1024, 1024)]);
    }
}
