//! HID transport implementation for cards attached over USB
//!
//! Requests go out as output reports and replies come back as input reports,
//! so a single interrupt endpoint pair carries the whole exchange.

use std::ffi::CString;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::{DEFAULT_REPORT_ID, REPORT_SIZE};
use crate::types::{TransportDeviceInfo, TransportType};
use crate::{BoxedTransport, DeviceBinder, Transport};

/// HID transport for a single card interface
pub struct HidRawTransport {
    /// Interface carrying register traffic; `None` once closed
    device: Mutex<Option<HidDevice>>,
    /// Report ID of input reports (0 for unnumbered reports)
    report_id: u8,
    /// Device information
    info: TransportDeviceInfo,
}

impl HidRawTransport {
    /// Create a new transport from an opened HID device
    pub fn new(device: HidDevice, report_id: u8, info: TransportDeviceInfo) -> Self {
        Self {
            device: Mutex::new(Some(device)),
            report_id,
            info,
        }
    }
}

/// Turn a raw input report into a payload
///
/// hidapi strips the report ID only for unnumbered reports; numbered reports
/// arrive with the ID still in front.
fn strip_report_id(mut buf: Vec<u8>, len: usize, report_id: u8) -> Vec<u8> {
    buf.truncate(len);
    if report_id != DEFAULT_REPORT_ID && buf.first() == Some(&report_id) {
        buf.remove(0);
    }
    buf
}

impl Transport for HidRawTransport {
    fn send_report(&self, report: &[u8]) -> Result<(), TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::Disconnected)?;
        let sent = device.write(report)?;
        if sent < report.len() {
            return Err(TransportError::ShortWrite {
                sent,
                expected: report.len(),
            });
        }
        Ok(())
    }

    fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::Disconnected)?;
        let mut buf = vec![0u8; REPORT_SIZE];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = device.read_timeout(&mut buf, timeout_ms)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(strip_report_id(buf, n, self.report_id)))
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        self.device
            .lock()
            .as_ref()
            .is_some_and(|device| device.get_product_string().is_ok())
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.device.lock().take().is_some() {
            debug!("Closed HID device {}", self.info.device_path);
        }
        Ok(())
    }
}

impl Drop for HidRawTransport {
    fn drop(&mut self) {
        debug!("HidRawTransport for {} dropped", self.info.device_path);
    }
}

/// Binds HID devices by hidapi path (e.g. `/dev/hidraw3` on Linux)
#[derive(Debug, Default)]
pub struct HidBinder {
    report_id: u8,
}

impl HidBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect numbered input reports carrying this ID
    pub fn with_report_id(mut self, report_id: u8) -> Self {
        self.report_id = report_id;
        self
    }
}

impl DeviceBinder for HidBinder {
    fn bind(&self, device_name: &str) -> Result<BoxedTransport, TransportError> {
        let api = HidApi::new()?;
        let path = CString::new(device_name)
            .map_err(|_| TransportError::DeviceNotFound(device_name.to_string()))?;

        let device_info = api
            .device_list()
            .find(|d| d.path() == path.as_c_str())
            .ok_or_else(|| TransportError::DeviceNotFound(device_name.to_string()))?;

        let info = TransportDeviceInfo {
            vid: device_info.vendor_id(),
            pid: device_info.product_id(),
            transport_type: TransportType::HidRaw,
            device_path: device_name.to_string(),
            serial: device_info.serial_number().map(|s| s.to_string()),
            product_name: device_info.product_string().map(|s| s.to_string()),
        };

        debug!(
            "Binding device: VID={:04X} PID={:04X} path={} report_id={}",
            info.vid, info.pid, info.device_path, self.report_id
        );

        let device = device_info.open_device(&api)?;
        device.set_blocking_mode(true)?;
        Ok(std::sync::Arc::new(HidRawTransport::new(
            device,
            self.report_id,
            info,
        )))
    }
}
