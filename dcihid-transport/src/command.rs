//! Type-safe register frames
//!
//! Builds request payloads and parses response payloads, keeping the byte
//! layout documented in [`crate::protocol`] in one place. Both directions are
//! implemented so the simulated card can speak the same wire format as the
//! host side.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::protocol::{
    self, calculate_checksum, opcode, status, PAYLOAD_SIZE, REQUEST_CHECKSUM_OFFSET,
    RESPONSE_CHECKSUM_OFFSET,
};

// =============================================================================
// Core Types
// =============================================================================

/// Register operation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Write,
    Read,
}

impl Opcode {
    /// Wire value
    pub fn to_byte(self) -> u8 {
        match self {
            Opcode::Write => opcode::WRITE,
            Opcode::Read => opcode::READ,
        }
    }

    /// Convert from wire value
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            opcode::WRITE => Some(Opcode::Write),
            opcode::READ => Some(Opcode::Read),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(opcode::name(self.to_byte()))
    }
}

/// Card addressed by a request: class id plus instance number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CardSelector {
    pub id: u8,
    pub num: u8,
}

impl CardSelector {
    pub fn new(id: u8, num: u8) -> Self {
        Self { id, num }
    }
}

impl fmt::Display for CardSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card 0x{:02X}#{}", self.id, self.num)
    }
}

/// Status carried in a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Ok,
    /// Firmware rejected the request with this code (see [`protocol::status`])
    Error(u8),
}

impl DeviceStatus {
    pub fn from_byte(b: u8) -> Self {
        if b == status::OK {
            DeviceStatus::Ok
        } else {
            DeviceStatus::Error(b)
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            DeviceStatus::Ok => status::OK,
            DeviceStatus::Error(code) => code,
        }
    }
}

/// Parse error for frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TooShort { expected: usize, got: usize },
    ChecksumMismatch { expected: u8, got: u8 },
    InvalidOpcode(u8),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { expected, got } => {
                write!(f, "Frame too short: expected {} bytes, got {}", expected, got)
            }
            Self::ChecksumMismatch { expected, got } => {
                write!(
                    f,
                    "Checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
                    expected, got
                )
            }
            Self::InvalidOpcode(op) => write!(f, "Invalid opcode: 0x{:02X}", op),
        }
    }
}

impl std::error::Error for ParseError {}

// =============================================================================
// Wire Structs (zerocopy)
// =============================================================================

/// Request header, 13 bytes. `checksum` is filled in by [`RegisterRequest::encode`].
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RequestFrame {
    opcode: u8,
    seq: u8,
    card_id: u8,
    card_num: u8,
    address: [u8; 4],
    data: [u8; 4],
    checksum: u8,
}

/// Response header, 9 bytes.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct ResponseFrame {
    opcode: u8,
    seq: u8,
    status: u8,
    data: u8,
    address: [u8; 4],
    checksum: u8,
}

const REQUEST_FRAME_LEN: usize = REQUEST_CHECKSUM_OFFSET + 1;
const RESPONSE_FRAME_LEN: usize = RESPONSE_CHECKSUM_OFFSET + 1;

fn check_frame(payload: &[u8], min_len: usize, checksum_at: usize) -> Result<(), ParseError> {
    if payload.len() < min_len {
        return Err(ParseError::TooShort {
            expected: min_len,
            got: payload.len(),
        });
    }
    let expected = calculate_checksum(payload, checksum_at);
    let got = payload[checksum_at];
    if expected != got {
        return Err(ParseError::ChecksumMismatch { expected, got });
    }
    Ok(())
}

// =============================================================================
// Register Request
// =============================================================================

/// One register operation addressed to a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRequest {
    pub opcode: Opcode,
    pub card: CardSelector,
    pub seq: u8,
    pub address: u32,
    /// Only meaningful for writes; always zero on the wire for reads
    pub data: u32,
}

impl RegisterRequest {
    pub fn write(card: CardSelector, address: u32, data: u32) -> Self {
        Self {
            opcode: Opcode::Write,
            card,
            seq: 0,
            address,
            data,
        }
    }

    pub fn read(card: CardSelector, address: u32) -> Self {
        Self {
            opcode: Opcode::Read,
            card,
            seq: 0,
            address,
            data: 0,
        }
    }

    /// Set the sequence tag used to correlate the response
    pub fn with_seq(mut self, seq: u8) -> Self {
        self.seq = seq;
        self
    }

    /// Serialize to a full 64-byte payload (without report ID)
    pub fn encode(&self) -> [u8; PAYLOAD_SIZE] {
        let data = match self.opcode {
            Opcode::Write => self.data,
            Opcode::Read => 0,
        };
        let frame = RequestFrame {
            opcode: self.opcode.to_byte(),
            seq: self.seq,
            card_id: self.card.id,
            card_num: self.card.num,
            address: self.address.to_le_bytes(),
            data: data.to_le_bytes(),
            checksum: 0,
        };
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[..REQUEST_FRAME_LEN].copy_from_slice(frame.as_bytes());
        payload[REQUEST_CHECKSUM_OFFSET] = calculate_checksum(&payload, REQUEST_CHECKSUM_OFFSET);
        payload
    }

    /// Build the complete HID buffer (report ID + payload)
    pub fn build(&self, report_id: u8) -> Vec<u8> {
        protocol::build_report(report_id, &self.encode())
    }

    /// Parse a request payload (card side)
    pub fn decode(payload: &[u8]) -> Result<Self, ParseError> {
        check_frame(payload, REQUEST_FRAME_LEN, REQUEST_CHECKSUM_OFFSET)?;
        let (frame, _) = RequestFrame::read_from_prefix(payload).map_err(|_| {
            ParseError::TooShort {
                expected: REQUEST_FRAME_LEN,
                got: payload.len(),
            }
        })?;
        let opcode =
            Opcode::from_byte(frame.opcode).ok_or(ParseError::InvalidOpcode(frame.opcode))?;
        Ok(Self {
            opcode,
            card: CardSelector::new(frame.card_id, frame.card_num),
            seq: frame.seq,
            address: u32::from_le_bytes(frame.address),
            data: u32::from_le_bytes(frame.data),
        })
    }
}

// =============================================================================
// Register Response
// =============================================================================

/// Decoded reply to a [`RegisterRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterResponse {
    pub opcode: Opcode,
    pub seq: u8,
    pub status: DeviceStatus,
    /// Register value for read replies, zero otherwise
    pub data: u8,
    pub address: u32,
}

impl RegisterResponse {
    /// Successful reply to `req`
    pub fn ok(req: &RegisterRequest, data: u8) -> Self {
        Self {
            opcode: req.opcode,
            seq: req.seq,
            status: DeviceStatus::Ok,
            data,
            address: req.address,
        }
    }

    /// Error reply to `req`
    pub fn error(req: &RegisterRequest, code: u8) -> Self {
        Self {
            opcode: req.opcode,
            seq: req.seq,
            status: DeviceStatus::Error(code),
            data: 0,
            address: req.address,
        }
    }

    /// Whether this reply answers `req` (opcode, sequence and address echo)
    pub fn answers(&self, req: &RegisterRequest) -> bool {
        self.opcode == req.opcode && self.seq == req.seq && self.address == req.address
    }

    /// Serialize to a full 64-byte payload (card side)
    pub fn encode(&self) -> [u8; PAYLOAD_SIZE] {
        let frame = ResponseFrame {
            opcode: self.opcode.to_byte(),
            seq: self.seq,
            status: self.status.to_byte(),
            data: self.data,
            address: self.address.to_le_bytes(),
            checksum: 0,
        };
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[..RESPONSE_FRAME_LEN].copy_from_slice(frame.as_bytes());
        payload[RESPONSE_CHECKSUM_OFFSET] =
            calculate_checksum(&payload, RESPONSE_CHECKSUM_OFFSET);
        payload
    }

    /// Parse a response payload (without report ID)
    pub fn decode(payload: &[u8]) -> Result<Self, ParseError> {
        check_frame(payload, RESPONSE_FRAME_LEN, RESPONSE_CHECKSUM_OFFSET)?;
        let (frame, _) = ResponseFrame::read_from_prefix(payload).map_err(|_| {
            ParseError::TooShort {
                expected: RESPONSE_FRAME_LEN,
                got: payload.len(),
            }
        })?;
        let opcode =
            Opcode::from_byte(frame.opcode).ok_or(ParseError::InvalidOpcode(frame.opcode))?;
        Ok(Self {
            opcode,
            seq: frame.seq,
            status: DeviceStatus::from_byte(frame.status),
            data: frame.data,
            address: u32::from_le_bytes(frame.address),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::REPORT_SIZE;

    const CARD: CardSelector = CardSelector { id: 0x01, num: 0 };

    #[test]
    fn test_frame_sizes() {
        assert_eq!(std::mem::size_of::<RequestFrame>(), 13);
        assert_eq!(std::mem::size_of::<ResponseFrame>(), 9);
    }

    #[test]
    fn test_write_request_layout() {
        let req = RegisterRequest::write(CARD, 0x1000, 0xDEADBEEF).with_seq(7);
        let p = req.encode();
        assert_eq!(p[0], opcode::WRITE);
        assert_eq!(p[1], 7); // seq
        assert_eq!(p[2], 0x01); // card id
        assert_eq!(p[3], 0); // card num
        assert_eq!(&p[4..8], &[0x00, 0x10, 0x00, 0x00]); // address LE
        assert_eq!(&p[8..12], &[0xEF, 0xBE, 0xAD, 0xDE]); // data LE
        assert_eq!(p[12], calculate_checksum(&p, 12));
        assert!(p[13..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_request_zero_fills_data() {
        let mut req = RegisterRequest::read(CARD, 0x20);
        req.data = 0xFFFF_FFFF; // ignored for reads
        let p = req.encode();
        assert_eq!(p[0], opcode::READ);
        assert_eq!(&p[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_build_has_report_id() {
        let buf = RegisterRequest::read(CARD, 0).build(0);
        assert_eq!(buf.len(), REPORT_SIZE);
        assert_eq!(buf[0], 0);
        assert_eq!(buf[1], opcode::READ);
    }

    #[test]
    fn test_request_decode_matches_card_side() {
        let req = RegisterRequest::write(CardSelector::new(0x0B, 3), 0xCAFE_0004, 0x1234_5678)
            .with_seq(0x42);
        let decoded = RegisterRequest::decode(&req.encode()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_request_decode_rejects_bad_checksum() {
        let mut p = RegisterRequest::read(CARD, 0x10).encode();
        p[4] ^= 0xFF;
        assert!(matches!(
            RegisterRequest::decode(&p),
            Err(ParseError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_request_decode_rejects_unknown_opcode() {
        let mut p = [0u8; PAYLOAD_SIZE];
        p[0] = 0x09;
        p[12] = calculate_checksum(&p, 12);
        assert_eq!(
            RegisterRequest::decode(&p),
            Err(ParseError::InvalidOpcode(0x09))
        );
    }

    #[test]
    fn test_response_layout() {
        let req = RegisterRequest::read(CARD, 0x1000).with_seq(3);
        let p = RegisterResponse::ok(&req, 0xEF).encode();
        assert_eq!(p[0], opcode::READ);
        assert_eq!(p[1], 3);
        assert_eq!(p[2], status::OK);
        assert_eq!(p[3], 0xEF);
        assert_eq!(&p[4..8], &[0x00, 0x10, 0x00, 0x00]);
        assert_eq!(p[8], calculate_checksum(&p, 8));
    }

    #[test]
    fn test_response_decode_error_status() {
        let req = RegisterRequest::write(CARD, 0x44, 1).with_seq(9);
        let p = RegisterResponse::error(&req, status::ADDRESS_REJECTED).encode();
        let resp = RegisterResponse::decode(&p).unwrap();
        assert_eq!(resp.status, DeviceStatus::Error(status::ADDRESS_REJECTED));
        assert!(resp.answers(&req));
    }

    #[test]
    fn test_response_decode_too_short() {
        assert_eq!(
            RegisterResponse::decode(&[0x02, 0x00, 0x00]),
            Err(ParseError::TooShort {
                expected: 9,
                got: 3
            })
        );
    }

    #[test]
    fn test_answers_requires_matching_seq() {
        let req = RegisterRequest::read(CARD, 0x10).with_seq(1);
        let stale = RegisterResponse::ok(&req.with_seq(0), 0x55);
        assert!(!stale.answers(&req));
    }
}
