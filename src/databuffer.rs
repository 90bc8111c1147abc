//! # DataBuffer
//!
//! The unit of data moved between memories, processing elements, and buses.
//! Unlike a [`crate::message::Message`], a `DataBuffer` is long-lived: it is
//! registered with the [`crate::buffer_pool::BufferPool`], owned by exactly
//! one resource at a time, and carried through a state machine by the pool
//! rather than by whichever component currently holds it.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::TriggerAction;

/// Buffers larger than this are padded with zero bytes rather than having
/// random content generated for every byte, matching the memory-safety cap
/// the original simulator used for its synthetic payloads.
const CONTENT_GENERATION_CAP: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferState {
    Allocated,
    Transit,
    Arrived,
    Responded,
    Inuse,
    Deallocated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferRole {
    Source,
    Destination,
}

/// A rule fired by [`crate::buffer_pool::BufferPool::set_state`] when a
/// buffer transitions into `on`. May be registered on the pool (global) or
/// attached directly to a buffer; both lists are consulted on every
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub on: BufferState,
    pub action: TriggerAction,
    pub station: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBuffer {
    pub id: String,
    pub size: u64,
    pub content: Vec<u8>,
    pub state: BufferState,
    pub owner_memory: Option<String>,
    pub role: BufferRole,
    pub destination_pe: Option<String>,
    pub destination_queue: Option<String>,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub triggers: Vec<Trigger>,
}

impl DataBuffer {
    /// Create a new buffer, owned by no one, in the `allocated` state.
    /// Panics if `size == 0`, since a zero-size buffer is a construction bug.
    pub fn new(size: u64, content: Option<Vec<u8>>) -> Self {
        assert!(size > 0, "DataBuffer::size must be > 0");
        let content = content.unwrap_or_else(|| Self::random_content(size));
        Self {
            id: format!("buf-{}", short_id()),
            size,
            content,
            state: BufferState::Allocated,
            owner_memory: None,
            role: BufferRole::Source,
            destination_pe: None,
            destination_queue: None,
            bytes_received: 0,
            bytes_sent: 0,
            triggers: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: BufferRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner_memory = owner;
        self
    }

    pub fn with_destination(mut self, pe: Option<String>, queue: Option<String>) -> Self {
        self.destination_pe = pe;
        self.destination_queue = queue;
        self
    }

    fn random_content(size: u64) -> Vec<u8> {
        let cap = size.min(CONTENT_GENERATION_CAP as u64) as usize;
        let mut bytes = vec![0u8; cap];
        rand::thread_rng().fill_bytes(&mut bytes);
        if (cap as u64) < size {
            bytes.resize(size as usize, 0);
        }
        bytes
    }

    /// Bytes currently buffered in flight: received but not yet forwarded.
    pub fn buffering_size(&self) -> u64 {
        self.bytes_received.saturating_sub(self.bytes_sent)
    }

    pub fn add_received(&mut self, amount: u64) {
        self.bytes_received = (self.bytes_received + amount).min(self.size);
    }

    pub fn add_sent(&mut self, amount: u64) {
        self.bytes_sent = (self.bytes_sent + amount).min(self.size);
    }

    /// Serialize to a JSON value for transport inside a message payload or
    /// for round-trip tests that check a buffer survives a full transfer.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("DataBuffer always serializes")
    }

    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_all_fields() {
        let mut buf = DataBuffer::new(128, Some(vec![7; 128]))
            .with_role(BufferRole::Destination)
            .with_owner(Some("mem0".to_string()))
            .with_destination(Some("pe0".to_string()), Some("in0".to_string()));
        buf.add_received(64);
        buf.add_sent(32);
        buf.triggers.push(Trigger {
            on: BufferState::Deallocated,
            action: TriggerAction::Signal,
            station: "sem".to_string(),
            index: 1,
        });

        let round_tripped = DataBuffer::from_value(buf.to_value()).unwrap();
        assert_eq!(buf, round_tripped);
    }

    #[test]
    fn buffering_size_is_received_minus_sent() {
        let mut buf = DataBuffer::new(100, Some(vec![0; 100]));
        buf.add_received(40);
        buf.add_sent(10);
        assert_eq!(buf.buffering_size(), 30);
        buf.add_sent(1000);
        assert_eq!(buf.bytes_sent, buf.size);
        assert_eq!(buf.buffering_size(), 0);
    }

    #[test]
    fn add_received_clamps_to_size() {
        let mut buf = DataBuffer::new(10, Some(vec![0; 10]));
        buf.add_received(1000);
        assert_eq!(buf.bytes_received, 10);
    }
}
