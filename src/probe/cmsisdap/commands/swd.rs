//! SWD configuration command.

use crate::probe::HidError;

use super::{CommandId, Request, Status};

/// `DAP_SWD_Configure`: turnaround and data-phase settings.
///
/// The default configuration byte of zero selects a one-cycle turnaround
/// with no forced data phase, which every known CMSIS-DAP probe supports.
#[derive(Clone, Copy, Debug, Default)]
pub struct SwdConfigureRequest;

impl Request for SwdConfigureRequest {
    const COMMAND_ID: CommandId = CommandId::SwdConfigure;

    type Response = Status;

    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize, HidError> {
        buffer[0] = 0;
        Ok(1)
    }

    fn parse_response(&self, buffer: &[u8]) -> Result<Self::Response, HidError> {
        Status::from_byte(buffer[0])
    }
}
