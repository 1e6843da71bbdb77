//! In-process simulated card
//!
//! Speaks the register protocol from the card side: decodes each request
//! report, updates a register file and queues the reply as an input report.
//! Knobs allow a test to make the card go silent, reject addresses, fail
//! sends or slip in unrelated reports.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::command::{CardSelector, Opcode, RegisterRequest, RegisterResponse};
use crate::error::TransportError;
use crate::types::TransportDeviceInfo;
use crate::{BoxedTransport, DeviceBinder, Transport};

#[derive(Default)]
struct SimState {
    /// Full 32-bit register values keyed by card and address
    registers: HashMap<(CardSelector, u32), u32>,
    /// Input reports waiting to be read
    pending: VecDeque<Vec<u8>>,
    /// Every report handed to `send_report`, report ID included
    sent: Vec<Vec<u8>>,
    /// Cards present on this device; empty means every card answers
    cards: HashSet<CardSelector>,
    /// Addresses the card refuses, with the status code to reply
    rejected: HashMap<u32, u8>,
    silent: bool,
    fail_sends: bool,
    ack_writes: bool,
    closed: bool,
}

/// A card that echoes register writes back on reads
pub struct SimulatedCard {
    state: Mutex<SimState>,
    readable: Condvar,
    info: TransportDeviceInfo,
}

impl SimulatedCard {
    pub fn new(device_path: &str) -> Self {
        Self {
            state: Mutex::new(SimState {
                ack_writes: true,
                ..SimState::default()
            }),
            readable: Condvar::new(),
            info: TransportDeviceInfo::simulated(device_path),
        }
    }

    /// Restrict which cards answer; requests for other cards get no reply
    pub fn with_cards(self, cards: &[CardSelector]) -> Self {
        self.state.lock().cards = cards.iter().copied().collect();
        self
    }

    /// Accept requests but never reply
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Make every `send_report` fail as if the device was unplugged
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Whether writes are acknowledged (default on)
    pub fn set_ack_writes(&self, ack: bool) {
        self.state.lock().ack_writes = ack;
    }

    /// Reply to any request at `address` with `code` instead of OK
    pub fn reject_address(&self, address: u32, code: u8) {
        self.state.lock().rejected.insert(address, code);
    }

    /// Queue a raw input report payload ahead of any reply
    pub fn inject_report(&self, payload: Vec<u8>) {
        self.state.lock().pending.push_back(payload);
        self.readable.notify_all();
    }

    /// Current value of a register
    pub fn register(&self, card: CardSelector, address: u32) -> Option<u32> {
        self.state.lock().registers.get(&(card, address)).copied()
    }

    /// Preload a register value
    pub fn set_register(&self, card: CardSelector, address: u32, value: u32) {
        self.state.lock().registers.insert((card, address), value);
    }

    /// Number of reports sent to the card so far
    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    /// Copy of every report sent to the card so far
    pub fn sent_reports(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn reopen(&self) {
        let mut state = self.state.lock();
        state.closed = false;
        state.pending.clear();
    }

    /// Card-side handling of one request payload
    fn handle_request(state: &mut SimState, payload: &[u8]) -> Option<RegisterResponse> {
        let req = match RegisterRequest::decode(payload) {
            Ok(req) => req,
            Err(e) => {
                debug!("Simulated card dropped malformed request: {}", e);
                return None;
            }
        };

        if state.silent || (!state.cards.is_empty() && !state.cards.contains(&req.card)) {
            return None;
        }

        if let Some(&code) = state.rejected.get(&req.address) {
            return Some(RegisterResponse::error(&req, code));
        }

        match req.opcode {
            Opcode::Write => {
                state.registers.insert((req.card, req.address), req.data);
                state.ack_writes.then(|| RegisterResponse::ok(&req, 0))
            }
            Opcode::Read => {
                let value = state
                    .registers
                    .get(&(req.card, req.address))
                    .copied()
                    .unwrap_or(0);
                Some(RegisterResponse::ok(&req, (value & 0xFF) as u8))
            }
        }
    }
}

impl Transport for SimulatedCard {
    fn send_report(&self, report: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed || state.fail_sends {
            return Err(TransportError::Disconnected);
        }
        state.sent.push(report.to_vec());

        // Skip the report ID
        let payload = report.get(1..).unwrap_or_default();
        if let Some(resp) = Self::handle_request(&mut state, payload) {
            state.pending.push_back(resp.encode().to_vec());
            self.readable.notify_all();
        }
        Ok(())
    }

    fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Disconnected);
        }
        if state.pending.is_empty() {
            self.readable.wait_for(&mut state, timeout);
        }
        Ok(state.pending.pop_front())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        !self.state.lock().closed
    }

    fn close(&self) -> Result<(), TransportError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Binds simulated cards by name
#[derive(Default)]
pub struct SimulatedBinder {
    devices: HashMap<String, Arc<SimulatedCard>>,
}

impl SimulatedBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a card under `name`
    pub fn with_device(mut self, name: &str, card: SimulatedCard) -> Self {
        self.devices.insert(name.to_string(), Arc::new(card));
        self
    }

    /// Look up a registered card (for inspection in tests)
    pub fn device(&self, name: &str) -> Option<Arc<SimulatedCard>> {
        self.devices.get(name).cloned()
    }
}

impl DeviceBinder for SimulatedBinder {
    fn bind(&self, device_name: &str) -> Result<BoxedTransport, TransportError> {
        let card = self
            .devices
            .get(device_name)
            .ok_or_else(|| TransportError::DeviceNotFound(device_name.to_string()))?;
        card.reopen();
        let transport: BoxedTransport = card.clone();
        Ok(transport)
    }
}
