//! CMSIS-DAP probe driver.
//!
//! Wraps a [`CmsisDapDevice`] with the command sequencing the programmer
//! needs: SWD connect, clock and pin control, SWJ bit sequences, and the
//! transfer layer with its WAIT-retry policy.

pub mod commands;
#[cfg(test)]
pub(crate) mod mock;

use crate::arm::dp::Abort;
use crate::arm::DapError;
use crate::probe::{HidError, ProbeIo};
use crate::Error;

use commands::general::{
    Capabilities, CapabilitiesCommand, ConnectRequest, ConnectResponse, DisconnectRequest,
    FirmwareVersionCommand, HostStatusRequest,
};
use commands::swd::SwdConfigureRequest;
use commands::swj::{SwjClockRequest, SwjPinsRequest, SwjSequenceRequest};
use commands::transfer::{
    Ack, TransferAbortRequest, TransferBlockRequest, TransferConfigureRequest, TransferRequest,
    WriteAbortRequest,
};
use commands::{send_command, send_command_no_response, CmsisDapDevice, Status, REPORT_SIZE};

/// How often a transfer answering WAIT is re-issued before giving up.
pub const WAIT_RETRIES: usize = 100;

/// A CMSIS-DAP v1 probe, connected and configured for SWD.
#[derive(Debug)]
pub struct CmsisDap {
    device: CmsisDapDevice,
    capabilities: Capabilities,
    connected: bool,
}

impl CmsisDap {
    /// Take ownership of a freshly opened device: drain stale reports and
    /// read the probe identification.
    pub fn new(io: Box<dyn ProbeIo>) -> Result<Self, Error> {
        let mut device = CmsisDapDevice::new(io);
        device.drain();

        let capabilities = send_command(&mut device, &CapabilitiesCommand)?;
        tracing::debug!("Probe capabilities: {:?}", capabilities);
        if let Some(version) = send_command(&mut device, &FirmwareVersionCommand)? {
            tracing::info!("CMSIS-DAP firmware version {}", version);
        }

        Ok(Self {
            device,
            capabilities,
            connected: false,
        })
    }

    /// Probe capability bits.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Put the probe into SWD mode and configure the transfer engine.
    /// Retries on WAIT happen host-side, so probe-side retry is disabled.
    pub fn connect_swd(&mut self) -> Result<(), Error> {
        if self.connected {
            return Ok(());
        }

        match send_command(&mut self.device, &ConnectRequest::Swd)? {
            ConnectResponse::SwdInitialized => {}
            _ => {
                return Err(
                    HidError::MalformedResponse("probe refused to initialize SWD mode").into(),
                )
            }
        }

        let status = send_command(
            &mut self.device,
            &TransferConfigureRequest {
                idle_cycles: 0,
                wait_retry: 0,
                match_retry: 0,
            },
        )?;
        expect_ok(status, "TransferConfigure")?;
        let status = send_command(&mut self.device, &SwdConfigureRequest)?;
        expect_ok(status, "SWD_Configure")?;

        // Best effort: probes without a status LED answer with an error.
        let _ = send_command(&mut self.device, &HostStatusRequest::connected(true));

        self.connected = true;
        Ok(())
    }

    /// Leave SWD mode and turn the connect LED off.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        if !self.connected {
            return Ok(());
        }
        let _ = send_command(&mut self.device, &HostStatusRequest::connected(false));
        let status = send_command(&mut self.device, &DisconnectRequest)?;
        expect_ok(status, "Disconnect")?;
        self.connected = false;
        Ok(())
    }

    /// Set the maximum SWD clock in Hz.
    pub fn set_swj_clock(&mut self, clock_hz: u32) -> Result<(), Error> {
        let status = send_command(&mut self.device, &SwjClockRequest { clock_hz })?;
        expect_ok(status, "SWJ_Clock")
    }

    /// Drive the pins raised in `select` to `output` and wait `wait_us`.
    /// Returns the pin state sampled afterwards.
    pub fn swj_pins(&mut self, output: u8, select: u8, wait_us: u32) -> Result<u8, Error> {
        Ok(send_command(
            &mut self.device,
            &SwjPinsRequest {
                output,
                select,
                wait_us,
            },
        )?)
    }

    /// Assert (pull low) or release the target's nRESET pin.
    pub fn set_nreset(&mut self, level: bool) -> Result<(), Error> {
        let _ = send_command(&mut self.device, &SwjPinsRequest::nreset(level))?;
        Ok(())
    }

    /// Clock out a raw bit sequence on SWDIO.
    pub fn swj_sequence(&mut self, data: &[u8], bit_count: usize) -> Result<(), Error> {
        let request = SwjSequenceRequest::new(data, bit_count)?;
        let status = send_command(&mut self.device, &request)?;
        expect_ok(status, "SWJ_Sequence")
    }

    /// Execute a register transfer, retrying the whole request while the
    /// target answers WAIT.
    ///
    /// Returns the read data words on success. FAULT answers clear the
    /// sticky flags through `DAP_WriteABORT` before surfacing; NO_ACK and
    /// protocol errors surface immediately.
    pub fn transfer(&mut self, request: &TransferRequest) -> Result<Vec<u32>, Error> {
        for _ in 0..WAIT_RETRIES {
            let response = send_command(&mut self.device, request)?;

            if response.protocol_error {
                return Err(DapError::ProtocolError.into());
            }

            match response.last_ack {
                Ack::Ok => {
                    if response.count as usize != request.transfers.len() {
                        tracing::warn!(
                            "Probe executed {}/{} transfers without reporting an error",
                            response.count,
                            request.transfers.len()
                        );
                        return Err(DapError::ProtocolError.into());
                    }
                    return Ok(response.read_values);
                }
                Ack::Wait => continue,
                Ack::Fault => {
                    tracing::debug!("FAULT on transfer, clearing sticky flags");
                    self.write_abort(Abort::clear_all_sticky())?;
                    return Err(DapError::Fault.into());
                }
                Ack::NoAck => return Err(DapError::NoAck.into()),
            }
        }
        Err(DapError::WaitExceeded.into())
    }

    /// Execute a block transfer with the same retry policy as [`transfer`].
    ///
    /// [`transfer`]: Self::transfer
    pub fn transfer_block(&mut self, request: &TransferBlockRequest) -> Result<Vec<u32>, Error> {
        for _ in 0..WAIT_RETRIES {
            let response = send_command(&mut self.device, request)?;

            if response.protocol_error {
                return Err(DapError::ProtocolError.into());
            }

            match response.last_ack {
                Ack::Ok => return Ok(response.read_values),
                Ack::Wait => continue,
                Ack::Fault => {
                    tracing::debug!("FAULT on block transfer, clearing sticky flags");
                    self.write_abort(Abort::clear_all_sticky())?;
                    return Err(DapError::Fault.into());
                }
                Ack::NoAck => return Err(DapError::NoAck.into()),
            }
        }
        Err(DapError::WaitExceeded.into())
    }

    /// Write the DP ABORT register through `DAP_WriteABORT`.
    pub fn write_abort(&mut self, abort: Abort) -> Result<(), Error> {
        let status = send_command(
            &mut self.device,
            &WriteAbortRequest {
                dap_index: 0,
                abort: abort.into(),
            },
        )?;
        expect_ok(status, "WriteAbort")
    }

    /// Fire-and-forget `DAP_TransferAbort`.
    pub fn transfer_abort(&mut self) -> Result<(), Error> {
        Ok(send_command_no_response(&mut self.device, &TransferAbortRequest)?)
    }

    /// Words that fit into one block-transfer report next to its header.
    pub fn max_block_words(&self) -> usize {
        (REPORT_SIZE - 5) / 4
    }

}

fn expect_ok(status: Status, command: &'static str) -> Result<(), Error> {
    match status {
        Status::DapOk => Ok(()),
        Status::DapError => {
            tracing::warn!("Probe answered {command} with an error");
            Err(HidError::MalformedResponse("probe rejected the command").into())
        }
    }
}

impl Drop for CmsisDap {
    fn drop(&mut self) {
        // Leave the probe LED in a sane state; errors are moot here.
        let _ = self.disconnect();
    }
}
