//! Per-address message hub
//!
//! Radios do not talk to each other directly; every packet goes through a
//! hub mailbox keyed by the 64-bit address word a radio listens on
//! (`channel << 56 | 5 address bytes`). Delivery is lossless and ordered.
//! ACKs travel back through the same hub, addressed to the sender.

use std::collections::HashMap;
use std::collections::VecDeque;

/// Maximum radio payload
pub const PAYLOAD_MAX: usize = 32;

/// One queued packet and the address its ACK should go back to
#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub src: u64,
    pub len: u8,
    pub payload: [u8; PAYLOAD_MAX],
}

impl Message {
    pub fn bytes(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }
}

/// In-process packet switch shared by every radio in a system
#[derive(Debug, Default)]
pub struct NetworkHub {
    boxes: HashMap<u64, VecDeque<Message>>,
}

impl NetworkHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet for whoever listens on `addr`
    ///
    /// Payloads beyond [`PAYLOAD_MAX`] are truncated; the radio protocol
    /// cannot produce one.
    pub fn tx(&mut self, addr: u64, src: u64, payload: &[u8]) {
        let len = payload.len().min(PAYLOAD_MAX);
        let mut message = Message {
            src,
            len: len as u8,
            payload: [0; PAYLOAD_MAX],
        };
        message.payload[..len].copy_from_slice(&payload[..len]);
        self.boxes.entry(addr).or_default().push_back(message);
    }

    /// Take the oldest packet waiting on `addr`
    pub fn rx(&mut self, addr: u64) -> Option<Message> {
        self.boxes.get_mut(&addr)?.pop_front()
    }

    /// Packets currently queued on `addr`
    pub fn pending(&self, addr: u64) -> usize {
        self.boxes.get(&addr).map_or(0, VecDeque::len)
    }
}
