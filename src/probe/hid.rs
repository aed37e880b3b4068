//! hidapi-backed implementation of [`ProbeIo`].

use std::time::Duration;

use super::{HidError, ProbeIo};

pub(crate) struct HidProbeIo {
    device: hidapi::HidDevice,
}

impl HidProbeIo {
    pub(crate) fn new(device: hidapi::HidDevice) -> Self {
        Self { device }
    }
}

impl ProbeIo for HidProbeIo {
    fn write_report(&mut self, buf: &[u8]) -> Result<usize, HidError> {
        Ok(self.device.write(buf)?)
    }

    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError> {
        // hidapi reports a timeout by returning zero bytes, not an error;
        // the caller decides whether that is fatal.
        Ok(self.device.read_timeout(buf, timeout.as_millis() as i32)?)
    }
}
