//! Common types for transport layer

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// USB HID via hidapi
    HidRaw,
    /// In-process simulated card
    Simulated,
}

/// Device identification information
#[derive(Debug, Clone)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID (0 when not applicable)
    pub vid: u16,
    /// USB Product ID (0 when not applicable)
    pub pid: u16,
    /// Transport type
    pub transport_type: TransportType,
    /// Name the device was bound by (hidapi path for HID devices)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
}

impl TransportDeviceInfo {
    /// Info for a device that has no USB identity
    pub fn simulated(device_path: &str) -> Self {
        Self {
            vid: 0,
            pid: 0,
            transport_type: TransportType::Simulated,
            device_path: device_path.to_string(),
            serial: None,
            product_name: Some("Simulated DCI card".into()),
        }
    }
}
