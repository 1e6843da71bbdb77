//! Protocol constants and utilities for DCI register access
//!
//! Every exchange is a single 64-byte HID report in each direction. On the
//! host side hidapi prefixes the payload with a report ID byte, so buffers
//! handed to the device are [`REPORT_SIZE`] bytes long.
//!
//! Request payload (host → card):
//!
//! ```text
//! [0]      opcode        0x01 WRITE, 0x02 READ
//! [1]      sequence tag  echoed back by the card
//! [2]      card id       card class (USB_16PIO = 0x01, ...)
//! [3]      card num      instance number of that class
//! [4..8]   address       little-endian u32
//! [8..12]  data          little-endian u32, zero for READ
//! [12]     checksum      255 - (sum of bytes 0..12 & 0xFF)
//! ```
//!
//! Response payload (card → host):
//!
//! ```text
//! [0]      opcode echo
//! [1]      sequence echo
//! [2]      status        0x00 OK, anything else is a device error code
//! [3]      data          register value for READ replies
//! [4..8]   address echo  little-endian u32
//! [8]      checksum      255 - (sum of bytes 0..8 & 0xFF)
//! ```
//!
//! Bytes past the checksum are zero.

/// Register opcodes
pub mod opcode {
    pub const WRITE: u8 = 0x01;
    pub const READ: u8 = 0x02;

    /// Get human-readable name for opcode byte
    pub fn name(op: u8) -> &'static str {
        match op {
            WRITE => "WRITE",
            READ => "READ",
            _ => "UNKNOWN",
        }
    }
}

/// Status codes reported by the card firmware
pub mod status {
    pub const OK: u8 = 0x00;
    /// Card did not recognise the opcode
    pub const UNKNOWN_OPCODE: u8 = 0x01;
    /// Card computed a different request checksum
    pub const BAD_CHECKSUM: u8 = 0x02;
    /// Address not backed by a register on this card
    pub const ADDRESS_REJECTED: u8 = 0x03;
    /// Card is busy with a previous operation
    pub const CARD_BUSY: u8 = 0x04;

    /// Get human-readable name for status byte
    pub fn name(code: u8) -> &'static str {
        match code {
            OK => "OK",
            UNKNOWN_OPCODE => "UNKNOWN_OPCODE",
            BAD_CHECKSUM => "BAD_CHECKSUM",
            ADDRESS_REJECTED => "ADDRESS_REJECTED",
            CARD_BUSY => "CARD_BUSY",
            _ => "UNKNOWN",
        }
    }
}

/// HID report sizes
pub const REPORT_SIZE: usize = 65;
pub const PAYLOAD_SIZE: usize = 64;

/// Default report ID (cards use unnumbered reports)
pub const DEFAULT_REPORT_ID: u8 = 0;

/// Offset of the request checksum within the payload
pub const REQUEST_CHECKSUM_OFFSET: usize = 12;
/// Offset of the response checksum within the payload
pub const RESPONSE_CHECKSUM_OFFSET: usize = 8;

/// HID communication timing constants
pub mod timing {
    /// Default bound on waiting for a response (ms)
    pub const RESPONSE_TIMEOUT_MS: u64 = 500;
    /// Upper bound on a single blocking read slice (ms)
    ///
    /// Reads are sliced so the engine can re-check its deadline after
    /// discarding an unrelated report.
    pub const READ_SLICE_MS: u64 = 50;
}

/// Calculate the checksum over the first `len` payload bytes
pub fn calculate_checksum(payload: &[u8], len: usize) -> u8 {
    let sum: u32 = payload.iter().take(len).map(|&b| b as u32).sum();
    (255 - (sum & 0xFF)) as u8
}

/// Prefix a payload with a report ID, padding to [`REPORT_SIZE`]
pub fn build_report(report_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; REPORT_SIZE];
    buf[0] = report_id;
    let len = std::cmp::min(payload.len(), PAYLOAD_SIZE);
    buf[1..1 + len].copy_from_slice(&payload[..len]);
    buf
}
