//! Register transfer commands: `DAP_TransferConfigure`, `DAP_Transfer`,
//! `DAP_TransferBlock`, `DAP_TransferAbort` and `DAP_WriteABORT`.

use scroll::{Pread, Pwrite, LE};

use crate::arm::PortType;
use crate::probe::HidError;

use super::{CommandId, Request, Status};

/// Acknowledge value of the last executed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok = 1,
    Wait = 2,
    Fault = 4,
    NoAck = 7,
}

impl Ack {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            1 => Ack::Ok,
            2 => Ack::Wait,
            4 => Ack::Fault,
            _ => Ack::NoAck,
        }
    }
}

/// Read or write direction of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RW {
    W = 0,
    R = 1,
}

/// One register operation inside a `DAP_Transfer`.
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub port: PortType,
    pub direction: RW,
    /// Register address; bits \[3:2\] are encoded as A2/A3.
    pub address: u8,
    /// Read with value match instead of a plain read.
    pub value_match: bool,
    /// Write the match mask instead of the register.
    pub match_mask: bool,
    /// Data word for writes, match-mask writes and value-match reads.
    pub data: Option<u32>,
}

impl TransferItem {
    pub fn read(port: PortType, address: u8) -> Self {
        Self {
            port,
            direction: RW::R,
            address,
            value_match: false,
            match_mask: false,
            data: None,
        }
    }

    pub fn write(port: PortType, address: u8, value: u32) -> Self {
        Self {
            port,
            direction: RW::W,
            address,
            value_match: false,
            match_mask: false,
            data: Some(value),
        }
    }

    fn request_byte(&self) -> u8 {
        (self.port as u8)
            | (self.direction as u8) << 1
            | u8::from(self.address & 0x04 != 0) << 2
            | u8::from(self.address & 0x08 != 0) << 3
            | u8::from(self.value_match) << 4
            | u8::from(self.match_mask) << 5
    }

    fn carries_data(&self) -> bool {
        self.data.is_some()
    }

    fn is_read(&self) -> bool {
        self.direction == RW::R && !self.value_match
    }
}

/// `DAP_Transfer`: up to 255 individual register reads/writes.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub dap_index: u8,
    pub transfers: Vec<TransferItem>,
}

impl TransferRequest {
    pub fn new(transfers: Vec<TransferItem>) -> Self {
        Self {
            dap_index: 0,
            transfers,
        }
    }

    pub fn single_read(port: PortType, address: u8) -> Self {
        Self::new(vec![TransferItem::read(port, address)])
    }

    pub fn single_write(port: PortType, address: u8, value: u32) -> Self {
        Self::new(vec![TransferItem::write(port, address, value)])
    }
}

/// Parsed `DAP_Transfer` response.
#[derive(Debug, Clone)]
pub struct TransferResponse {
    /// Number of transfers the probe executed.
    pub count: u8,
    /// Acknowledge of the last executed transfer.
    pub last_ack: Ack,
    /// The probe detected an SWD protocol error.
    pub protocol_error: bool,
    /// One word per executed read request, in request order.
    pub read_values: Vec<u32>,
}

impl Request for TransferRequest {
    const COMMAND_ID: CommandId = CommandId::Transfer;

    type Response = TransferResponse;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        if self.transfers.is_empty() || self.transfers.len() > 255 {
            return Err(HidError::InvalidRequest("transfer count must be 1..=255"));
        }
        buffer[0] = self.dap_index;
        buffer[1] = self.transfers.len() as u8;
        let mut offset = 2;
        for item in &self.transfers {
            buffer[offset] = item.request_byte();
            offset += 1;
            if item.carries_data() {
                let data = item.data.unwrap_or_default();
                buffer
                    .pwrite_with(data, offset, LE)
                    .map_err(|_| HidError::InvalidRequest("transfer exceeds the report size"))?;
                offset += 4;
            }
        }
        Ok(offset)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        if buffer.len() < 2 {
            return Err(HidError::MalformedResponse("transfer response too short"));
        }
        let count = buffer[0];
        if count as usize > self.transfers.len() {
            return Err(HidError::MalformedResponse(
                "probe executed more transfers than requested",
            ));
        }
        let last_ack = Ack::from_bits(buffer[1]);
        let protocol_error = buffer[1] & 0x08 != 0;

        // Each *successfully executed* read request carries a data word. If
        // the final transfer failed, it produced no data.
        let executed_reads = self
            .transfers
            .iter()
            .take(count as usize)
            .enumerate()
            .filter(|(i, item)| {
                item.is_read() && (*i + 1 < count as usize || last_ack == Ack::Ok)
            })
            .count();

        let mut read_values = Vec::with_capacity(executed_reads);
        let mut offset = 2;
        for _ in 0..executed_reads {
            let value = buffer
                .pread_with(offset, LE)
                .map_err(|_| HidError::MalformedResponse("transfer response misses read data"))?;
            read_values.push(value);
            offset += 4;
        }

        Ok(TransferResponse {
            count,
            last_ack,
            protocol_error,
            read_values,
        })
    }
}

/// `DAP_TransferBlock`: one register accessed `count` times, for bulk
/// memory moves through DRW.
#[derive(Debug, Clone)]
pub struct TransferBlockRequest {
    pub dap_index: u8,
    port: PortType,
    direction: RW,
    address: u8,
    count: u16,
    data: Vec<u32>,
}

impl TransferBlockRequest {
    pub fn write(port: PortType, address: u8, data: Vec<u32>) -> Self {
        Self {
            dap_index: 0,
            port,
            direction: RW::W,
            address,
            count: data.len() as u16,
            data,
        }
    }

    pub fn read(port: PortType, address: u8, count: u16) -> Self {
        Self {
            dap_index: 0,
            port,
            direction: RW::R,
            address,
            count,
            data: Vec::new(),
        }
    }
}

/// Parsed `DAP_TransferBlock` response.
#[derive(Debug, Clone)]
pub struct TransferBlockResponse {
    pub count: u16,
    pub last_ack: Ack,
    pub protocol_error: bool,
    /// Transferred words for block reads; empty for writes.
    pub read_values: Vec<u32>,
}

impl Request for TransferBlockRequest {
    const COMMAND_ID: CommandId = CommandId::TransferBlock;

    type Response = TransferBlockResponse;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.dap_index;
        buffer
            .pwrite_with(self.count, 1, LE)
            .expect("buffer is sized for the report. This is a bug, please report it.");
        buffer[3] = (self.port as u8)
            | (self.direction as u8) << 1
            | u8::from(self.address & 0x04 != 0) << 2
            | u8::from(self.address & 0x08 != 0) << 3;
        let mut offset = 4;
        for word in &self.data {
            buffer
                .pwrite_with(*word, offset, LE)
                .map_err(|_| HidError::InvalidRequest("block write exceeds the report size"))?;
            offset += 4;
        }
        Ok(offset)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        let count: u16 = buffer
            .pread_with(0, LE)
            .map_err(|_| HidError::MalformedResponse("block response too short"))?;
        let ack_byte = *buffer
            .get(2)
            .ok_or(HidError::MalformedResponse("block response too short"))?;

        let mut read_values = Vec::new();
        if self.direction == RW::R {
            let mut offset = 3;
            for _ in 0..count {
                let value = buffer
                    .pread_with(offset, LE)
                    .map_err(|_| HidError::MalformedResponse("block response misses read data"))?;
                read_values.push(value);
                offset += 4;
            }
        }

        Ok(TransferBlockResponse {
            count,
            last_ack: Ack::from_bits(ack_byte),
            protocol_error: ack_byte & 0x08 != 0,
            read_values,
        })
    }
}

/// `DAP_TransferAbort`: ask the probe to abort the running transfer.
/// This command has no response.
#[derive(Debug, Clone, Copy)]
pub struct TransferAbortRequest;

impl Request for TransferAbortRequest {
    const COMMAND_ID: CommandId = CommandId::TransferAbort;

    type Response = ();

    fn to_bytes(&self, _buffer: &mut [u8]) -> Result<usize, HidError> {
        Ok(0)
    }

    fn parse_response(&self, _buffer: &[u8]) -> Result<Self::Response, HidError> {
        Ok(())
    }
}

/// `DAP_WriteABORT`: write the DP ABORT register directly.
#[derive(Debug, Clone, Copy)]
pub struct WriteAbortRequest {
    pub dap_index: u8,
    pub abort: u32,
}

impl Request for WriteAbortRequest {
    const COMMAND_ID: CommandId = CommandId::WriteAbort;

    type Response = Status;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.dap_index;
        buffer
            .pwrite_with(self.abort, 1, LE)
            .expect("buffer is sized for the report. This is a bug, please report it.");
        Ok(5)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Status::from_byte(buffer[0])
    }
}

/// `DAP_TransferConfigure`: idle cycles and probe-side retry counts.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfigureRequest {
    pub idle_cycles: u8,
    pub wait_retry: u16,
    pub match_retry: u16,
}

impl Request for TransferConfigureRequest {
    const COMMAND_ID: CommandId = CommandId::TransferConfigure;

    type Response = Status;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.idle_cycles;
        buffer
            .pwrite_with(self.wait_retry, 1, LE)
            .expect("buffer is sized for the report. This is a bug, please report it.");
        buffer
            .pwrite_with(self.match_retry, 3, LE)
            .expect("buffer is sized for the report. This is a bug, please report it.");
        Ok(5)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Status::from_byte(buffer[0])
    }
}
