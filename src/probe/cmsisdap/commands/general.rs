//! General commands: `DAP_Info`, `DAP_HostStatus`, `DAP_Connect`,
//! `DAP_Disconnect`, `DAP_Delay` and `DAP_ResetTarget`.

use scroll::{Pread, LE};

use crate::probe::HidError;

use super::{CommandId, Request, Status};

macro_rules! info_command {
    ($(#[$doc:meta])* $id:literal, $name:ident, $response_type:ty) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $name;

        impl Request for $name {
            const COMMAND_ID: CommandId = CommandId::Info;

            type Response = $response_type;

            fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
                buffer[0] = $id;
                Ok(1)
            }

            fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
                ParseFromResponse::from_response(buffer)
            }
        }
    };
}

info_command!(
    /// Probe vendor string.
    0x01, VendorCommand, Option<String>
);
info_command!(
    /// Probe product string.
    0x02, ProductCommand, Option<String>
);
info_command!(
    /// Probe serial number string.
    0x03, SerialNumberCommand, Option<String>
);
info_command!(
    /// CMSIS-DAP firmware version string.
    0x04, FirmwareVersionCommand, Option<String>
);
info_command!(
    /// Probe capability bits.
    0xF0, CapabilitiesCommand, Capabilities
);
info_command!(
    /// Maximum number of in-flight packets.
    0xFE, PacketCountCommand, u8
);
info_command!(
    /// Maximum packet size in bytes.
    0xFF, PacketSizeCommand, u16
);

trait ParseFromResponse: Sized {
    fn from_response(buffer: &[u8]) -> Result<Self, HidError>;
}

impl ParseFromResponse for Option<String> {
    fn from_response(buffer: &[u8]) -> Result<Self, HidError> {
        // First byte is the string length including its NUL terminator.
        match buffer[0] as usize {
            0 => Ok(None),
            n => {
                let raw = buffer
                    .get(1..n)
                    .ok_or(HidError::MalformedResponse("info string exceeds report"))?;
                let text = std::str::from_utf8(raw)
                    .map_err(|_| HidError::MalformedResponse("info string is not UTF-8"))?;
                Ok(Some(text.trim_end_matches('\0').to_owned()))
            }
        }
    }
}

impl ParseFromResponse for u8 {
    fn from_response(buffer: &[u8]) -> Result<Self, HidError> {
        match buffer[0] {
            1 => Ok(buffer[1]),
            _ => Err(HidError::MalformedResponse("expected a one-byte info value")),
        }
    }
}

impl ParseFromResponse for u16 {
    fn from_response(buffer: &[u8]) -> Result<Self, HidError> {
        match buffer[0] {
            2 => buffer
                .pread_with(1, LE)
                .map_err(|_| HidError::MalformedResponse("short info value")),
            _ => Err(HidError::MalformedResponse("expected a two-byte info value")),
        }
    }
}

/// Capability bits reported by `DAP_Info 0xF0`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Capabilities {
    pub swd_implemented: bool,
    pub jtag_implemented: bool,
    pub swo_uart_implemented: bool,
    pub swo_manchester_implemented: bool,
    pub atomic_commands_implemented: bool,
}

impl ParseFromResponse for Capabilities {
    fn from_response(buffer: &[u8]) -> Result<Self, HidError> {
        if buffer[0] == 0 {
            return Err(HidError::MalformedResponse("empty capabilities response"));
        }
        Ok(Capabilities {
            swd_implemented: buffer[1] & 0x01 != 0,
            jtag_implemented: buffer[1] & 0x02 != 0,
            swo_uart_implemented: buffer[1] & 0x04 != 0,
            swo_manchester_implemented: buffer[1] & 0x08 != 0,
            atomic_commands_implemented: buffer[1] & 0x10 != 0,
        })
    }
}

/// `DAP_HostStatus`: drive the probe's connect/running LEDs.
#[derive(Clone, Copy, Debug)]
pub struct HostStatusRequest {
    status_type: u8,
    status: u8,
}

impl HostStatusRequest {
    pub fn connected(connected: bool) -> Self {
        Self {
            status_type: 0,
            status: connected as u8,
        }
    }

    pub fn running(running: bool) -> Self {
        Self {
            status_type: 1,
            status: running as u8,
        }
    }
}

impl Request for HostStatusRequest {
    const COMMAND_ID: CommandId = CommandId::HostStatus;

    type Response = ();

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = self.status_type;
        buffer[1] = self.status;
        Ok(2)
    }

    fn parse_response(&self, _buffer: &[u8]) -> Result<Self::Response, HidError> {
        Ok(())
    }
}

/// `DAP_Connect` port selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectRequest {
    DefaultPort = 0x00,
    Swd = 0x01,
    Jtag = 0x02,
}

/// Port the probe actually initialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectResponse {
    InitFailed,
    SwdInitialized,
    JtagInitialized,
}

impl Request for ConnectRequest {
    const COMMAND_ID: CommandId = CommandId::Connect;

    type Response = ConnectResponse;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = *self as u8;
        Ok(1)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        match buffer[0] {
            0 => Ok(ConnectResponse::InitFailed),
            1 => Ok(ConnectResponse::SwdInitialized),
            2 => Ok(ConnectResponse::JtagInitialized),
            _ => Err(HidError::MalformedResponse("unknown connect response")),
        }
    }
}

/// `DAP_Disconnect`.
#[derive(Clone, Copy, Debug)]
pub struct DisconnectRequest;

impl Request for DisconnectRequest {
    const COMMAND_ID: CommandId = CommandId::Disconnect;

    type Response = Status;

    fn to_bytes(&self, _buffer: &mut [u8]) -> Result<usize, HidError> {
        Ok(0)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Status::from_byte(buffer[0])
    }
}

/// `DAP_Delay`: stall the probe for a number of microseconds.
#[derive(Clone, Copy, Debug)]
pub struct DelayRequest {
    pub delay_us: u16,
}

impl Request for DelayRequest {
    const COMMAND_ID: CommandId = CommandId::Delay;

    type Response = Status;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        use scroll::Pwrite;
        buffer
            .pwrite_with(self.delay_us, 0, LE)
            .expect("buffer is sized for the report. This is a bug, please report it.");
        Ok(2)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Status::from_byte(buffer[0])
    }
}

/// `DAP_ResetTarget`: run the probe's device-specific reset sequence.
#[derive(Clone, Copy, Debug)]
pub struct ResetTargetRequest;

/// Whether the probe implements a device-specific reset sequence.
#[derive(Clone, Copy, Debug)]
pub struct ResetTargetResponse {
    pub status: Status,
    pub sequence_implemented: bool,
}

impl Request for ResetTargetRequest {
    const COMMAND_ID: CommandId = CommandId::ResetTarget;

    type Response = ResetTargetResponse;

    fn to_bytes(&self, _buffer: &mut [u8]) -> Result<usize, HidError> {
        Ok(0)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Ok(ResetTargetResponse {
            status: Status::from_byte(buffer[0])?,
            sequence_implemented: buffer[1] == 1,
        })
    }
}
