//! # Queues
//!
//! Every [`crate::resource::Resource`] port is a plain FIFO of
//! [`crate::message::Message`]s, addressed by `(parent, direction, function)`
//! and given a unique id so the topology can look it up by coordinate (used
//! by tracing and display, not by the hot path).
//!
//! Separately, [`TransferQueue`] implements the chunked buffer-transfer
//! queue from the design notes: a resource that wants to stream a
//! [`crate::databuffer::DataBuffer`] out byte-by-byte against a channel's
//! current bandwidth, rather than handing the whole buffer to a single
//! `buffer_transfer` message, drives one of these directly.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::databuffer::DataBuffer;
use crate::message::Message;
use crate::simulator::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Registry metadata for a port queue, enough to resolve the
/// `parent:direction:function` coordinate strings the spec describes.
#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub uid: String,
    pub parent: String,
    pub direction: Direction,
    pub function: String,
}

impl QueueInfo {
    pub fn new(parent: impl Into<String>, direction: Direction, function: impl Into<String>) -> Self {
        Self {
            uid: format!("q-{}", Uuid::new_v4().simple()),
            parent: parent.into(),
            direction,
            function: function.into(),
        }
    }

    pub fn coordinate(&self) -> String {
        let dir = match self.direction {
            Direction::In => "in",
            Direction::Out => "out",
        };
        format!("{}:{}:{}", self.parent, dir, self.function)
    }
}

/// A pending buffer handoff: `(buffer, destination memory, destination PE,
/// destination queue)`.
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub buffer: DataBuffer,
    pub dst_memory: String,
    pub dst_pe: Option<String>,
    pub dst_queue: String,
}

/// A chunked-transfer output queue (spec §4.10). Each entry is drained
/// bandwidth-limited against an optional channel capacity snapshot; with no
/// capacity given the whole buffer is assumed to move in one `step`.
#[derive(Debug, Default)]
pub struct TransferQueue {
    pub info: Option<QueueInfo>,
    items: VecDeque<TransferItem>,
    scheduled: std::collections::HashSet<String>,
    dest_of: std::collections::HashMap<String, String>,
}

impl TransferQueue {
    pub fn new(parent: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            info: Some(QueueInfo::new(parent, Direction::Out, function)),
            items: VecDeque::new(),
            scheduled: std::collections::HashSet::new(),
            dest_of: std::collections::HashMap::new(),
        }
    }

    pub fn enqueue_transfer(
        &mut self,
        buffer: DataBuffer,
        dst_memory: impl Into<String>,
        dst_pe: Option<String>,
        dst_queue: impl Into<String>,
    ) {
        self.items.push_back(TransferItem {
            buffer,
            dst_memory: dst_memory.into(),
            dst_pe,
            dst_queue: dst_queue.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Advance the head transfer by one tick, as described in spec §4.10.
    ///
    /// Takes a bandwidth/latency snapshot rather than a live `&Channel`:
    /// the channel this queue drains against lives inside
    /// `sim.topology.channels`, so holding a borrow of it across the `&mut
    /// Simulator` calls below isn't possible. The caller reads
    /// `sim.channel(name)` into owned values before calling `step`.
    pub fn step(&mut self, sim: &mut Simulator, capacity: Option<u64>, latency: u64) {
        if self.items.is_empty() {
            return;
        }

        let head_id = self.items[0].buffer.id.clone();
        if !self.scheduled.contains(&head_id) {
            let head = &self.items[0];
            let scheduled = sim.buffer_pool.schedule_transfer(
                sim.ticks,
                &head.buffer.id,
                &head.dst_memory,
                head.dst_pe.clone(),
                head.dst_queue.clone(),
            );
            if let Some((dest, pending)) = scheduled {
                self.dest_of.insert(head_id.clone(), dest.id);
                for p in pending {
                    sim.deliver(&p.station, "in", p.message);
                }
            }
            self.scheduled.insert(head_id.clone());
            let head = &mut self.items[0];
            let remaining = head.buffer.size - head.buffer.bytes_received;
            head.buffer.add_received(remaining);
        }

        if let Some(0) = capacity {
            return;
        }

        let head = &mut self.items[0];
        let buffering = head.buffer.buffering_size();
        if buffering == 0 {
            return;
        }
        let send = capacity.map(|c| c.min(buffering)).unwrap_or(buffering);
        head.buffer.add_sent(send);
        let done = head.buffer.bytes_sent >= head.buffer.size;

        if done {
            if let Some(dest_id) = self.dest_of.remove(&head_id) {
                sim.buffer_pool
                    .record_expected_arrival(&dest_id, sim.ticks + latency);
            }
            self.scheduled.remove(&head_id);
            self.items.pop_front();
        }
    }
}

/// A plain FIFO of [`Message`]s, the normal port queue used by every
/// [`crate::resource::Resource`].
pub type MessageQueue = VecDeque<Message>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::databuffer::DataBuffer;
    use crate::metrics::Metrics;
    use crate::topology::Topology;

    fn stub() -> Simulator {
        Simulator::new(Topology::new(), BufferPool::new(), Metrics::default())
    }

    #[test]
    fn step_drains_at_capacity_then_completes() {
        let mut sim = stub();
        let buf = sim.buffer_pool.create(10, Some(vec![1; 10]), Some("mem0".to_string()));
        let mut q = TransferQueue::new("pe0", "out0");
        q.enqueue_transfer(buf, "mem1", Some("pe1".to_string()), "in0");

        q.step(&mut sim, Some(4), 2);
        assert!(!q.is_empty());
        q.step(&mut sim, Some(4), 2);
        q.step(&mut sim, Some(4), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn step_with_no_capacity_moves_whole_buffer_at_once() {
        let mut sim = stub();
        let buf = sim.buffer_pool.create(64, Some(vec![0; 64]), Some("mem0".to_string()));
        let mut q = TransferQueue::new("pe0", "out0");
        q.enqueue_transfer(buf, "mem1", None, "in0");
        q.step(&mut sim, None, 1);
        assert!(q.is_empty());
    }
}
