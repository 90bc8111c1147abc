//! # Message
//!
//! The wire format carried over [`crate::link::Link`]s and resource queues.
//! A `Message` is immutable once sent: every field is set at construction and
//! nothing downstream mutates it in place.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::databuffer::{BufferState, DataBuffer};

/// Stable wire-kind tag. Serializes to lowercase strings (`read`, `write`,
/// ...) so traces and JSON summaries stay stable even though the in-memory
/// representation is a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Read,
    Write,
    Resp,
    Data,
    BufferTransfer,
    BufferConsume,
    BufferAck,
    BufferFreed,
    SemSignal,
    SemWait,
    SemGranted,
    SemAck,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Read => "read",
            MessageKind::Write => "write",
            MessageKind::Resp => "resp",
            MessageKind::Data => "data",
            MessageKind::BufferTransfer => "buffer_transfer",
            MessageKind::BufferConsume => "buffer_consume",
            MessageKind::BufferAck => "buffer_ack",
            MessageKind::BufferFreed => "buffer_freed",
            MessageKind::SemSignal => "sem_signal",
            MessageKind::SemWait => "sem_wait",
            MessageKind::SemGranted => "sem_granted",
            MessageKind::SemAck => "sem_ack",
        }
    }
}

/// Action recorded on a `sem_ack` reply, mirroring which branch of
/// [`crate::semaphore::SemaphoreStation`] handled the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemAckAction {
    Signal,
    WaitImmediate,
    WaitEnqueued,
}

/// A trigger action, attached to a buffer or registered on the pool, fired
/// when the buffer enters a given [`BufferState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    Signal,
    Wait,
}

/// A closed union of the per-kind payload shapes. Every [`MessageKind`] maps
/// to exactly one variant (or `None` for plain memory requests, which carry
/// no payload beyond `size`/`kind`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    None,
    Resp {
        reply_to: Uuid,
        request_kind: MessageKind,
    },
    BufferTransfer {
        buffer: DataBuffer,
    },
    BufferConsume {
        buffer_id: String,
    },
    BufferAck {
        buffer_id: String,
    },
    BufferFreed {
        buffer_id: Option<String>,
    },
    SemOp {
        index: usize,
        buffer_id: Option<String>,
        state: Option<BufferState>,
    },
    SemGranted {
        index: usize,
        reply_to: Uuid,
    },
    SemAck {
        index: usize,
        action: SemAckAction,
        value: i64,
        reply_to: Uuid,
    },
    Command {
        rate: Option<u64>,
    },
}

/// A tagged transport unit moving between named resources.
///
/// `size` is always > 0 (enforced at construction); `created_at` records the
/// tick on which the message was built, for tracing and latency accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub src: String,
    pub dst: String,
    pub size: u64,
    pub kind: MessageKind,
    pub payload: MessagePayload,
    pub created_at: u64,
}

impl Message {
    /// Construct a message. Panics if `size == 0`, since a zero-size message
    /// is a construction-time bug, not something the simulator can route around.
    pub fn new(
        src: impl Into<String>,
        dst: impl Into<String>,
        size: u64,
        kind: MessageKind,
        payload: MessagePayload,
        created_at: u64,
    ) -> Self {
        assert!(size > 0, "Message::size must be > 0");
        Self {
            id: Uuid::new_v4(),
            src: src.into(),
            dst: dst.into(),
            size,
            kind,
            payload,
            created_at,
        }
    }
}
