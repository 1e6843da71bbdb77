//! Request/response engine
//!
//! Drives one register request at a time per device link:
//!
//! ```text
//!  Idle --send--> Sent --reply--> Received --> Idle
//!                   \---deadline--> TimedOut --> Idle
//! ```
//!
//! A second call on the same handle, or on another handle bound to the same
//! device, blocks on the link's exchange lock until the first cycle is back
//! to Idle. Replies that do not echo the outstanding request (late replies
//! to an earlier timed-out request, malformed frames) are dropped and the
//! wait continues until the deadline. Nothing is retried.

use std::time::{Duration, Instant};

use dcihid_transport::protocol::{status, timing};
use dcihid_transport::{DeviceStatus, RegisterRequest, RegisterResponse};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::DciConfig;
use crate::error::DciError;
use crate::session::{SessionBinding, SessionHandle, SessionTable};

/// Where a session's current request is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Sent,
    Received,
    TimedOut,
}

/// Per-device exchange state, guarded by the link's exchange lock
#[derive(Debug, Default)]
pub(crate) struct LinkState {
    next_seq: u8,
}

impl LinkState {
    fn take_seq(&mut self) -> u8 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }
}

/// One request cycle; returns the session to Idle when dropped
struct Cycle<'a> {
    state: &'a Mutex<RequestState>,
}

impl<'a> Cycle<'a> {
    fn begin(state: &'a Mutex<RequestState>) -> Self {
        Self { state }
    }

    fn advance(&self, next: RequestState) {
        let mut state = self.state.lock();
        debug!("Request state {:?} -> {:?}", *state, next);
        *state = next;
    }
}

impl Drop for Cycle<'_> {
    fn drop(&mut self) {
        *self.state.lock() = RequestState::Idle;
    }
}

impl SessionBinding {
    /// Run one request/response cycle
    ///
    /// Returns `None` when no reply was awaited.
    fn exchange(
        &self,
        req: RegisterRequest,
        await_reply: bool,
        config: &DciConfig,
    ) -> Result<Option<RegisterResponse>, DciError> {
        let mut link = self.link.exchange.lock();
        let cycle = Cycle::begin(&self.state);
        let transport = &self.link.transport;

        let req = req.with_seq(link.take_seq());
        debug!(
            "{} {} addr=0x{:08X} data=0x{:08X} seq={}",
            req.card, req.opcode, req.address, req.data, req.seq
        );
        transport.send_report(&req.build(config.report_id))?;
        cycle.advance(RequestState::Sent);

        if !await_reply {
            return Ok(None);
        }

        let timeout = config.response_timeout();
        let deadline = Instant::now() + timeout;
        let slice = Duration::from_millis(timing::READ_SLICE_MS);
        loop {
            let now = Instant::now();
            if now >= deadline {
                cycle.advance(RequestState::TimedOut);
                warn!(
                    "{} {} addr=0x{:08X}: no response within {:?}",
                    req.card, req.opcode, req.address, timeout
                );
                return Err(DciError::Timeout(config.response_timeout_ms));
            }

            let Some(payload) = transport.read_report(slice.min(deadline - now))? else {
                continue;
            };

            let resp = match RegisterResponse::decode(&payload) {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("Discarding malformed report: {}", e);
                    continue;
                }
            };
            if !resp.answers(&req) {
                debug!(
                    "Discarding stale reply: {} seq={} addr=0x{:08X}",
                    resp.opcode, resp.seq, resp.address
                );
                continue;
            }

            cycle.advance(RequestState::Received);
            return match resp.status {
                DeviceStatus::Ok => Ok(Some(resp)),
                DeviceStatus::Error(code) => {
                    warn!(
                        "{} {} addr=0x{:08X} rejected: {} (0x{:02X})",
                        req.card,
                        req.opcode,
                        req.address,
                        status::name(code),
                        code
                    );
                    Err(DciError::DeviceReported {
                        code,
                        name: status::name(code),
                    })
                }
            };
        }
    }
}

impl SessionTable {
    /// Write a full 32-bit value to a register
    ///
    /// With write acknowledgement enabled (the default) this waits for the
    /// card's reply and surfaces its status.
    pub fn write(&self, handle: SessionHandle, address: u32, data: u32) -> Result<(), DciError> {
        let binding = self.resolve(handle)?;
        let req = RegisterRequest::write(binding.card, address, data);
        binding.exchange(req, self.config().write_ack, self.config())?;
        Ok(())
    }

    /// Read the 8-bit value of a register
    ///
    /// Wider values take one read per byte; address striding is up to the
    /// caller.
    pub fn read(&self, handle: SessionHandle, address: u32) -> Result<u8, DciError> {
        let binding = self.resolve(handle)?;
        let req = RegisterRequest::read(binding.card, address);
        match binding.exchange(req, true, self.config())? {
            Some(resp) => Ok(resp.data),
            None => Err(DciError::Timeout(self.config().response_timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcihid_transport::protocol::opcode;
    use dcihid_transport::{CardSelector, SimulatedBinder, SimulatedCard, TransportError};
    use std::sync::Arc;

    const CARD: CardSelector = CardSelector { id: 1, num: 0 };

    fn setup(config: DciConfig) -> (SessionTable, Arc<SimulatedCard>, SessionHandle) {
        let binder = SimulatedBinder::new().with_device("dci0", SimulatedCard::new("dci0"));
        let card = binder.device("dci0").unwrap();
        let table = SessionTable::new(binder, config);
        let handle = table.open("dci0", 1, 0).unwrap();
        (table, card, handle)
    }

    fn fast() -> DciConfig {
        DciConfig::default().with_response_timeout(Duration::from_millis(60))
    }

    #[test]
    fn test_write_then_read_low_byte() {
        let (table, card, h) = setup(DciConfig::default());
        table.write(h, 0x1000, 0xDEAD_BEEF).unwrap();
        assert_eq!(card.register(CARD, 0x1000), Some(0xDEAD_BEEF));
        assert_eq!(table.read(h, 0x1000).unwrap(), 0xEF);
    }

    #[test]
    fn test_requests_carry_card_and_sequence() {
        let (table, card, h) = setup(DciConfig::default());
        table.write(h, 4, 1).unwrap();
        table.read(h, 4).unwrap();
        let sent = card.sent_reports();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0][1], opcode::WRITE);
        assert_eq!(sent[1][1], opcode::READ);
        assert_eq!(sent[0][2], 0); // first seq
        assert_eq!(sent[1][2], 1);
        assert_eq!(sent[1][3], CARD.id);
    }

    #[test]
    fn test_silent_device_times_out() {
        let (table, card, h) = setup(fast());
        card.set_silent(true);
        let started = Instant::now();
        let err = table.read(h, 0x10).unwrap_err();
        assert!(matches!(err, DciError::Timeout(60)));
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(table.request_state(h).unwrap(), RequestState::Idle);
    }

    #[test]
    fn test_write_ack_timeout() {
        let (table, card, h) = setup(fast());
        card.set_silent(true);
        assert!(matches!(
            table.write(h, 0x10, 1),
            Err(DciError::Timeout(_))
        ));
    }

    #[test]
    fn test_unacknowledged_writes_do_not_wait() {
        let (table, card, h) = setup(fast().with_write_ack(false));
        card.set_silent(true);
        table.write(h, 0x10, 0x55).unwrap();
        assert_eq!(card.register(CARD, 0x10), Some(0x55));
    }

    #[test]
    fn test_device_error_status() {
        let (table, card, h) = setup(DciConfig::default());
        card.reject_address(0xBAD, status::ADDRESS_REJECTED);
        match table.read(h, 0xBAD) {
            Err(DciError::DeviceReported { code, name }) => {
                assert_eq!(code, status::ADDRESS_REJECTED);
                assert_eq!(name, "ADDRESS_REJECTED");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(table.request_state(h).unwrap(), RequestState::Idle);
    }

    #[test]
    fn test_send_failure_is_transport_error() {
        let (table, card, h) = setup(DciConfig::default());
        card.set_fail_sends(true);
        assert!(matches!(
            table.write(h, 0, 0),
            Err(DciError::Transport(TransportError::Disconnected))
        ));
    }

    #[test]
    fn test_stale_and_malformed_replies_are_skipped() {
        let (table, card, h) = setup(DciConfig::default());
        card.set_register(CARD, 0x20, 0x7A);

        // Late reply to a request that is no longer outstanding
        let stale = RegisterRequest::read(CARD, 0x20).with_seq(0xF0);
        card.inject_report(RegisterResponse::ok(&stale, 0x11).encode().to_vec());
        // Garbage
        card.inject_report(vec![0xFF; 16]);

        assert_eq!(table.read(h, 0x20).unwrap(), 0x7A);
    }

    #[test]
    fn test_invalid_handle_sends_nothing() {
        let (table, card, h) = setup(DciConfig::default());
        table.close(h).unwrap();
        assert!(matches!(table.read(h, 0), Err(DciError::InvalidHandle(_))));
        assert!(matches!(
            table.write(h, 0, 0),
            Err(DciError::InvalidHandle(_))
        ));
        assert!(matches!(
            table.read(SessionHandle::from_raw(0x00AB_0003), 0),
            Err(DciError::InvalidHandle(_))
        ));
        assert_eq!(card.sent_count(), 0);
    }

    #[test]
    fn test_concurrent_calls_are_serialized() {
        let (table, card, h) = setup(DciConfig::default());
        let table = Arc::new(table);
        let workers: Vec<_> = (0..4u32)
            .map(|i| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for n in 0..25u32 {
                        let addr = i * 0x100 + n;
                        table.write(h, addr, addr).unwrap();
                        assert_eq!(table.read(h, addr).unwrap(), (addr & 0xFF) as u8);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(card.sent_count(), 200);
    }

    #[test]
    fn test_calls_across_cards_on_one_device_are_serialized() {
        let binder = SimulatedBinder::new().with_device("dci0", SimulatedCard::new("dci0"));
        let card = binder.device("dci0").unwrap();
        let table = Arc::new(SessionTable::new(binder, DciConfig::default()));
        let handles: Vec<_> = (0..4u32)
            .map(|num| table.open("dci0", 1, num).unwrap())
            .collect();

        let workers: Vec<_> = (0u32..)
            .zip(handles.iter().copied())
            .map(|(i, h)| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for addr in 0..25u32 {
                        let value = i * 0x40 + addr;
                        table.write(h, addr, value).unwrap();
                        assert_eq!(table.read(h, addr).unwrap(), value as u8);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(card.sent_count(), 200);
        for num in 0..4u8 {
            let value = card.register(CardSelector::new(1, num), 24);
            assert_eq!(value, Some(u32::from(num) * 0x40 + 24));
        }
    }

    #[test]
    fn test_card_without_write_acks_times_out() {
        let (table, card, h) = setup(fast());
        card.set_ack_writes(false);
        assert!(matches!(
            table.write(h, 0x10, 0x55),
            Err(DciError::Timeout(60))
        ));
        // The write itself still landed
        assert_eq!(card.register(CARD, 0x10), Some(0x55));
        assert_eq!(table.read(h, 0x10).unwrap(), 0x55);
    }

    #[test]
    fn test_link_sequence_wraps() {
        let mut link = LinkState { next_seq: 0xFF };
        assert_eq!(link.take_seq(), 0xFF);
        assert_eq!(link.take_seq(), 0x00);
    }
}
