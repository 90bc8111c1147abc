//! # SemaphoreStation
//!
//! An array of counting semaphores with per-index FIFO waiter queues.
//! `sem_signal` increments (or, if someone is waiting, grants them
//! directly without touching the counter); `sem_wait` decrements
//! immediately if the count allows it, otherwise enqueues the request.
//! Every op gets an optional `sem_ack`; every satisfied wait gets a
//! `sem_granted`.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::delegate_ports;
use crate::error::{Result, SimError};
use crate::message::{Message, MessageKind, MessagePayload, SemAckAction};
use crate::resource::{Ports, Resource};
use crate::simulator::Simulator;

pub struct SemaphoreStation {
    name: String,
    ports: Ports,
    pub count: usize,
    values: Vec<i64>,
    waiters: Vec<VecDeque<(String, Uuid)>>,
}

impl SemaphoreStation {
    pub fn new(name: impl Into<String>, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(SimError::InvalidSemaphoreCount);
        }
        Ok(Self {
            name: name.into(),
            ports: Ports::new(&["in"], &["out"]),
            count,
            values: vec![0; count],
            waiters: (0..count).map(|_| VecDeque::new()).collect(),
        })
    }

    pub fn value(&self, index: usize) -> i64 {
        self.values[index]
    }

    fn grant_waiter(&mut self, idx: usize, sim: &Simulator) -> Option<Message> {
        let (dst, reply_to) = self.waiters[idx].pop_front()?;
        Some(Message::new(
            self.name.clone(),
            dst,
            1,
            MessageKind::SemGranted,
            MessagePayload::SemGranted { index: idx, reply_to },
            sim.ticks,
        ))
    }

    fn handle_signal(&mut self, idx: usize, req: &Message, sim: &Simulator) {
        let grant = self.grant_waiter(idx, sim);
        if grant.is_none() {
            self.values[idx] += 1;
        }
        if let Some(grant) = grant {
            self.ports.send("out", grant);
        }
        let ack = Message::new(
            self.name.clone(),
            req.src.clone(),
            1,
            MessageKind::SemAck,
            MessagePayload::SemAck {
                index: idx,
                action: SemAckAction::Signal,
                value: self.values[idx],
                reply_to: req.id,
            },
            sim.ticks,
        );
        self.ports.send("out", ack);
    }

    fn handle_wait(&mut self, idx: usize, req: &Message, sim: &Simulator) {
        if self.values[idx] > 0 {
            self.values[idx] -= 1;
            let grant = Message::new(
                self.name.clone(),
                req.src.clone(),
                1,
                MessageKind::SemGranted,
                MessagePayload::SemGranted {
                    index: idx,
                    reply_to: req.id,
                },
                sim.ticks,
            );
            self.ports.send("out", grant);
            let ack = Message::new(
                self.name.clone(),
                req.src.clone(),
                1,
                MessageKind::SemAck,
                MessagePayload::SemAck {
                    index: idx,
                    action: SemAckAction::WaitImmediate,
                    value: self.values[idx],
                    reply_to: req.id,
                },
                sim.ticks,
            );
            self.ports.send("out", ack);
        } else {
            self.waiters[idx].push_back((req.src.clone(), req.id));
            let ack = Message::new(
                self.name.clone(),
                req.src.clone(),
                1,
                MessageKind::SemAck,
                MessagePayload::SemAck {
                    index: idx,
                    action: SemAckAction::WaitEnqueued,
                    value: self.values[idx],
                    reply_to: req.id,
                },
                sim.ticks,
            );
            self.ports.send("out", ack);
        }
    }
}

impl Resource for SemaphoreStation {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        while let Some(req) = self.ports.recv("in") {
            let idx = match &req.payload {
                MessagePayload::SemOp { index, .. } => *index,
                _ => continue,
            };
            if idx >= self.count {
                continue;
            }
            match req.kind {
                MessageKind::SemSignal => self.handle_signal(idx, &req, sim),
                MessageKind::SemWait => self.handle_wait(idx, &req, sim),
                _ => {}
            }
        }
    }

    delegate_ports!(ports);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::metrics::Metrics;
    use crate::topology::Topology;

    fn sim_stub() -> Simulator {
        Simulator::new(Topology::new(), BufferPool::new(), Metrics::default())
    }

    #[test]
    fn signal_before_wait_is_consumed_immediately() {
        let mut station = SemaphoreStation::new("sem0", 4).unwrap();
        let mut sim = sim_stub();

        let signal = Message::new(
            "a", "sem0", 1, MessageKind::SemSignal,
            MessagePayload::SemOp { index: 0, buffer_id: None, state: None }, 0,
        );
        station.ports.push_in("in", signal);
        station.tick(&mut sim);
        assert_eq!(station.value(0), 1);

        let wait = Message::new(
            "b", "sem0", 1, MessageKind::SemWait,
            MessagePayload::SemOp { index: 0, buffer_id: None, state: None }, 1,
        );
        station.ports.push_in("in", wait);
        station.tick(&mut sim);
        assert_eq!(station.value(0), 0);
        assert!(station.ports.out_len("out") >= 2);
    }

    #[test]
    fn wait_enqueues_then_signal_grants_fifo() {
        let mut station = SemaphoreStation::new("sem0", 1).unwrap();
        let mut sim = sim_stub();

        let wait_a = Message::new("a", "sem0", 1, MessageKind::SemWait, MessagePayload::SemOp { index: 0, buffer_id: None, state: None }, 0);
        let wait_b = Message::new("b", "sem0", 1, MessageKind::SemWait, MessagePayload::SemOp { index: 0, buffer_id: None, state: None }, 0);
        station.ports.push_in("in", wait_a);
        station.ports.push_in("in", wait_b);
        station.tick(&mut sim);
        assert_eq!(station.waiters[0].len(), 2);

        let signal = Message::new("c", "sem0", 1, MessageKind::SemSignal, MessagePayload::SemOp { index: 0, buffer_id: None, state: None }, 1);
        station.ports.push_in("in", signal);
        station.tick(&mut sim);
        assert_eq!(station.waiters[0].len(), 1);
        assert_eq!(station.values[0], 0);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut station = SemaphoreStation::new("sem0", 2).unwrap();
        let mut sim = sim_stub();
        let bad = Message::new("a", "sem0", 1, MessageKind::SemWait, MessagePayload::SemOp { index: 99, buffer_id: None, state: None }, 0);
        station.ports.push_in("in", bad);
        station.tick(&mut sim);
        assert_eq!(station.ports.out_len("out"), 0);
    }
}
