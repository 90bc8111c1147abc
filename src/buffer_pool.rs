//! # BufferPool
//!
//! The single source of truth for every [`DataBuffer`] in the simulation.
//! Resources never hand buffers to each other directly — they register,
//! transfer, and delete through the pool, which also fans out the trigger
//! messages that let a buffer's state transitions wake up semaphore waiters.
//!
//! Because a [`crate::simulator::Simulator`] owns both the pool and the
//! topology, pool methods that would need to reach back into the topology
//! (firing a trigger, delivering an arrived buffer) instead return the
//! pending work as plain data. The simulator applies it. This keeps the pool
//! a self-contained, borrow-friendly data structure instead of threading a
//! `&mut Simulator` through it the way the original did.

use std::collections::{HashMap, HashSet};

use crate::databuffer::{BufferRole, BufferState, DataBuffer, Trigger};
use crate::message::{Message, MessageKind, MessagePayload, TriggerAction};

/// A `sem_signal`/`sem_wait` message a trigger produced, addressed to a
/// named semaphore station. The caller is responsible for delivering it
/// (`Simulator::deliver`).
#[derive(Debug, Clone)]
pub struct PendingSemMessage {
    pub station: String,
    pub message: Message,
}

#[derive(Debug, Clone)]
struct TransferMeta {
    source_id: String,
    destination_pe: Option<String>,
    destination_queue: String,
}

/// Everything a `tick()` produced that must be applied by the simulator:
/// trigger-fired semaphore messages, and buffers that just arrived and
/// must be pushed into their destination PE's buffer inbox.
#[derive(Debug, Default)]
pub struct PoolTickResult {
    pub sem_messages: Vec<PendingSemMessage>,
    pub buffer_arrivals: Vec<(String, String, DataBuffer)>,
}

#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: HashMap<String, DataBuffer>,
    owner_of: HashMap<String, Option<String>>,
    owned_by: HashMap<Option<String>, HashSet<String>>,
    global_triggers: HashMap<String, Vec<Trigger>>,
    expected_arrival: HashMap<String, u64>,
    transfer_meta: HashMap<String, TransferMeta>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mut buffer: DataBuffer, owner: Option<String>) -> DataBuffer {
        if let Some(o) = &owner {
            buffer.owner_memory = Some(o.clone());
        }
        self.set_owner(&buffer.id, owner);
        self.buffers.insert(buffer.id.clone(), buffer.clone());
        buffer
    }

    pub fn create(&mut self, size: u64, content: Option<Vec<u8>>, owner: Option<String>) -> DataBuffer {
        let buf = DataBuffer::new(size, content);
        self.register(buf, owner)
    }

    pub fn get(&self, buffer_id: &str) -> Option<&DataBuffer> {
        self.buffers.get(buffer_id)
    }

    pub fn get_mut(&mut self, buffer_id: &str) -> Option<&mut DataBuffer> {
        self.buffers.get_mut(buffer_id)
    }

    pub fn exists(&self, buffer_id: &str) -> bool {
        self.buffers.contains_key(buffer_id)
    }

    pub fn owner(&self, buffer_id: &str) -> Option<String> {
        self.owner_of.get(buffer_id).cloned().flatten()
    }

    pub fn set_owner(&mut self, buffer_id: &str, owner: Option<String>) {
        let prev = self.owner_of.get(buffer_id).cloned().flatten();
        if prev == owner && self.buffers.contains_key(buffer_id) {
            return;
        }
        if let Some(set) = self.owned_by.get_mut(&prev) {
            set.remove(buffer_id);
        }
        self.owner_of.insert(buffer_id.to_string(), owner.clone());
        self.owned_by
            .entry(owner)
            .or_default()
            .insert(buffer_id.to_string());
    }

    /// Reassign ownership of an already-registered buffer.
    pub fn transfer(&mut self, buffer_id: &str, new_owner: Option<String>) -> crate::error::Result<()> {
        if !self.buffers.contains_key(buffer_id) {
            return Err(crate::error::SimError::UnknownBuffer(buffer_id.to_string()));
        }
        self.set_owner(buffer_id, new_owner);
        Ok(())
    }

    pub fn delete(&mut self, buffer_id: &str) -> Option<DataBuffer> {
        let buf = self.buffers.remove(buffer_id)?;
        if let Some(owner) = self.owner_of.remove(buffer_id).flatten() {
            if let Some(set) = self.owned_by.get_mut(&Some(owner)) {
                set.remove(buffer_id);
            }
        }
        self.global_triggers.remove(buffer_id);
        self.expected_arrival.remove(buffer_id);
        self.transfer_meta.remove(buffer_id);
        Some(buf)
    }

    pub fn bytes_owned(&self, owner: Option<&str>) -> u64 {
        let key = owner.map(|s| s.to_string());
        self.owned_by
            .get(&key)
            .map(|ids| ids.iter().filter_map(|id| self.buffers.get(id)).map(|b| b.size).sum())
            .unwrap_or(0)
    }

    pub fn total_bytes(&self) -> u64 {
        self.buffers.values().map(|b| b.size).sum()
    }

    /// Whether any buffer has a scheduled arrival that hasn't fired yet.
    /// Quiescence needs this: an arbiter or channel can hand a transfer off
    /// to the pool's own clock, leaving no trace in any port queue until the
    /// arrival tick is reached.
    pub fn has_pending_arrivals(&self) -> bool {
        !self.expected_arrival.is_empty()
    }

    pub fn set_global_triggers(&mut self, buffer_id: &str, triggers: Vec<Trigger>) {
        self.global_triggers.insert(buffer_id.to_string(), triggers);
    }

    pub fn add_global_trigger(&mut self, buffer_id: &str, trigger: Trigger) {
        self.global_triggers
            .entry(buffer_id.to_string())
            .or_default()
            .push(trigger);
    }

    /// Set a buffer's state and collect every trigger (pool-registered or
    /// attached to the buffer itself) that fires on this transition. Returns
    /// the `sem_signal`/`sem_wait` messages those triggers produce; the
    /// caller delivers them.
    pub fn set_state(&mut self, now_tick: u64, buffer_id: &str, state: BufferState) -> Vec<PendingSemMessage> {
        let Some(buf) = self.buffers.get_mut(buffer_id) else {
            return Vec::new();
        };
        buf.state = state;

        let mut triggers: Vec<Trigger> = self
            .global_triggers
            .get(buffer_id)
            .cloned()
            .unwrap_or_default();
        triggers.extend(buf.triggers.clone());

        triggers
            .into_iter()
            .filter(|t| t.on == state)
            .map(|t| {
                let kind = match t.action {
                    TriggerAction::Signal => MessageKind::SemSignal,
                    TriggerAction::Wait => MessageKind::SemWait,
                };
                let message = Message::new(
                    "buffer_pool",
                    t.station.clone(),
                    1,
                    kind,
                    MessagePayload::SemOp {
                        index: t.index,
                        buffer_id: Some(buffer_id.to_string()),
                        state: Some(state),
                    },
                    now_tick,
                );
                PendingSemMessage {
                    station: t.station,
                    message,
                }
            })
            .collect()
    }

    pub fn record_expected_arrival(&mut self, buffer_id: &str, tick: u64) {
        self.expected_arrival.insert(buffer_id.to_string(), tick);
    }

    /// Create a destination-role copy of `src_buffer_id` owned by
    /// `dst_memory`, mark both ends `transit`, and remember the transfer so
    /// a later [`Self::tick`] can complete it. Returns the new destination
    /// buffer and any trigger messages fired by the two `transit`
    /// transitions.
    pub fn schedule_transfer(
        &mut self,
        now_tick: u64,
        src_buffer_id: &str,
        dst_memory: &str,
        dst_pe: Option<String>,
        dst_queue: String,
    ) -> Option<(DataBuffer, Vec<PendingSemMessage>)> {
        let src = self.buffers.get(src_buffer_id)?.clone();
        let mut dest = DataBuffer::new(src.size, Some(src.content.clone()))
            .with_role(BufferRole::Destination)
            .with_owner(Some(dst_memory.to_string()))
            .with_destination(dst_pe.clone(), Some(dst_queue.clone()));
        dest.triggers = src.triggers.clone();
        let dest = self.register(dest, Some(dst_memory.to_string()));

        let mut pending = self.set_state(now_tick, src_buffer_id, BufferState::Transit);
        pending.extend(self.set_state(now_tick, &dest.id, BufferState::Transit));

        self.transfer_meta.insert(
            dest.id.clone(),
            TransferMeta {
                source_id: src_buffer_id.to_string(),
                destination_pe: dst_pe,
                destination_queue: dst_queue,
            },
        );
        Some((dest, pending))
    }

    /// Complete any scheduled transfer whose expected arrival is due:
    /// the destination buffer becomes `arrived`, the source is deallocated
    /// and removed, and the destination is queued for delivery into its
    /// target PE's buffer inbox.
    pub fn tick(&mut self, now_tick: u64) -> PoolTickResult {
        let mut result = PoolTickResult::default();
        let due: Vec<String> = self
            .expected_arrival
            .iter()
            .filter(|(_, &t)| t <= now_tick)
            .map(|(id, _)| id.clone())
            .collect();

        for bid in due {
            let meta = self.transfer_meta.get(&bid).cloned();

            result
                .sem_messages
                .extend(self.set_state(now_tick, &bid, BufferState::Arrived));

            if let Some(meta) = &meta {
                if self.buffers.contains_key(&meta.source_id) {
                    result
                        .sem_messages
                        .extend(self.set_state(now_tick, &meta.source_id, BufferState::Deallocated));
                    self.delete(&meta.source_id);
                }
            }

            if let (Some(meta), Some(buf)) = (meta, self.buffers.get(&bid).cloned()) {
                if let Some(pe) = meta.destination_pe {
                    result.buffer_arrivals.push((pe, meta.destination_queue, buf));
                }
            }
            self.expected_arrival.remove(&bid);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_transfer_moves_byte_accounting() {
        let mut pool = BufferPool::new();
        let buf = pool.create(100, Some(vec![0; 100]), Some("mem0".to_string()));
        assert_eq!(pool.bytes_owned(Some("mem0")), 100);
        pool.transfer(&buf.id, Some("mem1".to_string())).unwrap();
        assert_eq!(pool.bytes_owned(Some("mem0")), 0);
        assert_eq!(pool.bytes_owned(Some("mem1")), 100);
    }

    #[test]
    fn transfer_unknown_buffer_is_an_error() {
        let mut pool = BufferPool::new();
        assert!(pool.transfer("nope", Some("mem0".to_string())).is_err());
    }

    #[test]
    fn trigger_fires_only_on_matching_state() {
        let mut pool = BufferPool::new();
        let buf = pool.create(16, Some(vec![0; 16]), None);
        pool.add_global_trigger(
            &buf.id,
            Trigger {
                on: BufferState::Deallocated,
                action: TriggerAction::Signal,
                station: "sem0".to_string(),
                index: 2,
            },
        );
        assert!(pool.set_state(0, &buf.id, BufferState::Allocated).is_empty());
        let pending = pool.set_state(0, &buf.id, BufferState::Deallocated);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].station, "sem0");
    }

    #[test]
    fn schedule_transfer_completes_on_tick() {
        let mut pool = BufferPool::new();
        let src = pool.create(32, Some(vec![1; 32]), Some("mem0".to_string()));
        let (dest, _pending) = pool
            .schedule_transfer(0, &src.id, "mem1", Some("pe0".to_string()), "in0".to_string())
            .unwrap();
        assert_eq!(dest.state, BufferState::Transit);
        pool.record_expected_arrival(&dest.id, 5);

        let result = pool.tick(3);
        assert!(result.buffer_arrivals.is_empty());
        assert!(pool.exists(&src.id));

        let result = pool.tick(5);
        assert_eq!(result.buffer_arrivals.len(), 1);
        assert!(!pool.exists(&src.id));
        assert_eq!(pool.get(&dest.id).unwrap().state, BufferState::Arrived);
    }
}
