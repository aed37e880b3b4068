//! Probe discovery and the USB-HID transport.

pub mod cmsisdap;
mod hid;

use std::ffi::CString;
use std::time::Duration;

use crate::Error;

pub use cmsisdap::CmsisDap;

/// Errors of the USB-HID transport layer.
#[derive(Debug, thiserror::Error)]
pub enum HidError {
    /// No probe matched, or the selected probe has disappeared.
    #[error("no matching CMSIS-DAP probe found")]
    NotFound,
    /// The underlying HID read/write failed.
    #[error("USB HID access failed")]
    Io(#[from] hidapi::HidError),
    /// The probe did not answer within the read timeout.
    #[error("timed out waiting for a report from the probe")]
    Timeout,
    /// The probe answered with something the protocol does not allow.
    #[error("malformed response from probe: {0}")]
    MalformedResponse(&'static str),
    /// A request cannot be encoded into a report.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
}

/// The probe as a raw 64-byte-report pipe.
///
/// Production code uses the hidapi-backed implementation created by
/// [`open`]; tests substitute an in-memory simulator.
pub trait ProbeIo: Send {
    /// Write one report. `buf[0]` is the HID report id (always zero here).
    fn write_report(&mut self, buf: &[u8]) -> Result<usize, HidError>;

    /// Blocking read of one report; returns 0 on timeout.
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, HidError>;
}

/// Identification of one attached CMSIS-DAP probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// Product string, e.g. "KitProg3 CMSIS-DAP".
    pub product: String,
    /// Serial number, when the probe reports one.
    pub serial_number: Option<String>,
    /// Platform path used to open the device.
    path: CString,
}

impl std::fmt::Display for ProbeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (VID {:04x}, PID {:04x}{})",
            self.product,
            self.vendor_id,
            self.product_id,
            match &self.serial_number {
                Some(serial) => format!(", S/N {serial}"),
                None => String::new(),
            }
        )
    }
}

/// List all attached CMSIS-DAP HID probes.
///
/// A device qualifies when its product string or its path mentions
/// "CMSIS-DAP", the same heuristic every other CMSIS-DAP host tool uses.
pub fn scan() -> Result<Vec<ProbeInfo>, Error> {
    let api = hidapi::HidApi::new().map_err(HidError::from)?;
    let mut probes = Vec::new();

    for device in api.device_list() {
        let product = device.product_string().unwrap_or("");
        let path = device.path().to_str().unwrap_or("");
        if !is_cmsis_dap(product) && !is_cmsis_dap(path) {
            continue;
        }
        tracing::trace!(
            "Found CMSIS-DAP probe: {} at {:?}",
            product,
            device.path()
        );
        probes.push(ProbeInfo {
            vendor_id: device.vendor_id(),
            product_id: device.product_id(),
            product: product.to_owned(),
            serial_number: device.serial_number().map(ToOwned::to_owned),
            path: device.path().to_owned(),
        });
    }

    tracing::debug!("Found {} CMSIS-DAP probes", probes.len());
    Ok(probes)
}

/// Open `info` and wrap it in a [`CmsisDap`] driver.
pub fn open(info: &ProbeInfo) -> Result<CmsisDap, Error> {
    let api = hidapi::HidApi::new().map_err(HidError::from)?;
    let device = api.open_path(&info.path).map_err(|e| {
        tracing::warn!("Opening {} failed: {e}", info);
        HidError::NotFound
    })?;
    CmsisDap::new(Box::new(hid::HidProbeIo::new(device)))
}

fn is_cmsis_dap(text: &str) -> bool {
    text.contains("CMSIS-DAP")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_string_heuristic() {
        assert!(is_cmsis_dap("KitProg3 CMSIS-DAP"));
        assert!(is_cmsis_dap("MiniProg4 CMSIS-DAP BULK"));
        assert!(!is_cmsis_dap("J-Link"));
    }
}
