//! Register access error types and status codes

use dcihid_transport::TransportError;
use thiserror::Error;

/// Status codes returned across the C boundary
pub mod status {
    pub const SUCCESS: i32 = 0;
    /// Device could not be bound (not found, busy, bad card, table full)
    pub const DEVICE_NOT_FOUND: i32 = -1;
    /// Handle does not resolve to a live session
    pub const INVALID_HANDLE: i32 = -2;
    /// Send or receive failed in the transport
    pub const TRANSPORT_FAILURE: i32 = -3;
    /// No matching response within the configured bound
    pub const TIMEOUT: i32 = -4;
    /// Card answered with an error status
    pub const DEVICE_ERROR: i32 = -5;
    /// Null or non-UTF-8 pointer argument
    pub const INVALID_ARGUMENT: i32 = -6;
}

/// Errors from session and register operations
#[derive(Error, Debug)]
pub enum DciError {
    /// Named device could not be bound
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Card id or instance number does not fit the wire format
    #[error("Invalid card selector: id={id} num={num}")]
    InvalidCard { id: u32, num: u32 },

    /// The same card on the same device is already held by a live session
    #[error("Card already open: {0}")]
    DeviceBusy(String),

    /// No free handle slots left
    #[error("Session table full")]
    TableFull,

    /// Handle was never issued or has been closed
    #[error("Invalid handle: 0x{0:08X}")]
    InvalidHandle(u32),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Operation timed out
    #[error("No response within {0} ms")]
    Timeout(u64),

    /// Card rejected the request
    #[error("Device reported error 0x{code:02X} ({name})")]
    DeviceReported { code: u8, name: &'static str },
}

impl DciError {
    /// Map to the signed status code used at the C boundary
    pub fn status_code(&self) -> i32 {
        match self {
            DciError::DeviceNotFound(_)
            | DciError::InvalidCard { .. }
            | DciError::DeviceBusy(_)
            | DciError::TableFull => status::DEVICE_NOT_FOUND,
            DciError::InvalidHandle(_) => status::INVALID_HANDLE,
            DciError::Transport(TransportError::DeviceNotFound(_)) => status::DEVICE_NOT_FOUND,
            DciError::Transport(_) => status::TRANSPORT_FAILURE,
            DciError::Timeout(_) => status::TIMEOUT,
            DciError::DeviceReported { .. } => status::DEVICE_ERROR,
        }
    }
}

/// Collapse a unit result into a status code
pub fn to_status(result: Result<(), DciError>) -> i32 {
    match result {
        Ok(()) => status::SUCCESS,
        Err(e) => e.status_code(),
    }
}
