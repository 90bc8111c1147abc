//! # Processing elements, generators, and clients
//!
//! Command-driven workers that produce, consume, and synchronize.
//! [`ProcessingElement`] is the general two-mode worker; the rest
//! are the specialized traffic sources and synchronization probes used to
//! assemble end-to-end topologies: [`BufferGenerator`] periodically injects
//! buffers into a memory, [`Compute`] drives request/response traffic
//! across a [`crate::bus::ReadBus`]/[`crate::bus::WriteBus`], and
//! [`SemaphoreClient`]/[`SemaphoreRecorder`] wait on a
//! [`crate::semaphore::SemaphoreStation`] index and record when they're
//! granted.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::databuffer::{BufferState, DataBuffer, Trigger};
use crate::delegate_ports;
use crate::error::{Result, SimError};
use crate::message::{Message, MessageKind, MessagePayload};
use crate::resource::{Ports, Resource};
use crate::simulator::Simulator;

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeMode {
    Dummy,
    Pro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeState {
    Idle,
    Busy,
    Backpressured,
}

struct InputSlot {
    remaining: u64,
    buffer_id: String,
}

/// Two-mode worker. `Dummy` transforms whatever lands on its numbered
/// message ports every tick with no state carried between ticks. `Pro` is
/// a three-state machine driven by a `cmd` port and a buffer inbox per
/// numbered input (populated by [`crate::buffer_pool::BufferPool::tick`]
/// delivery, not by message ports).
pub struct ProcessingElement {
    name: String,
    ports: Ports,
    mode: PeMode,
    in_n: usize,
    out_n: usize,
    pub output_target: String,
    pub backpressure_prob: f64,
    rng: StdRng,

    state: PeState,
    buffer_inboxes: Vec<VecDeque<DataBuffer>>,
    slots: Vec<InputSlot>,
    consume_rate: u64,
    expected_output: u64,
}

impl ProcessingElement {
    pub fn new(
        name: impl Into<String>,
        in_n: usize,
        out_n: usize,
        mode: PeMode,
        output_target: impl Into<String>,
    ) -> Result<Self> {
        if in_n == 0 || out_n == 0 {
            return Err(SimError::InvalidPortCount);
        }
        let in_ports: Vec<String> = (0..in_n).map(|i| format!("in{i}")).collect();
        let out_ports: Vec<String> = (0..out_n).map(|i| format!("out{i}")).collect();
        let in_refs: Vec<&str> = in_ports.iter().map(String::as_str).collect();
        let out_refs: Vec<&str> = out_ports.iter().map(String::as_str).collect();
        let mut ports = Ports::new(&in_refs, &out_refs);
        ports.inputs.insert("cmd".to_string(), Default::default());

        Ok(Self {
            name: name.into(),
            ports,
            mode,
            in_n,
            out_n,
            output_target: output_target.into(),
            backpressure_prob: 0.2,
            rng: StdRng::from_entropy(),
            state: PeState::Idle,
            buffer_inboxes: (0..in_n).map(|_| VecDeque::new()).collect(),
            slots: Vec::new(),
            consume_rate: 0,
            expected_output: 0,
        })
    }

    pub fn with_backpressure_prob(mut self, p: f64) -> Self {
        self.backpressure_prob = p.clamp(0.0, 1.0);
        self
    }

    /// Seed the backpressure RNG so scenarios stay deterministic in tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> PeState {
        self.state
    }

    fn emit_output(&mut self, sim: &mut Simulator, size: u64) {
        let buf = sim.buffer_pool.create(size, None, None);
        let msg = Message::new(
            self.name.clone(),
            self.output_target.clone(),
            size,
            MessageKind::BufferTransfer,
            MessagePayload::BufferTransfer { buffer: buf },
            sim.ticks,
        );
        self.ports.send("out0", msg);
    }

    fn tick_dummy(&mut self, sim: &mut Simulator) {
        let mut total = 0u64;
        for i in 0..self.in_n {
            if let Some(msg) = self.ports.recv(&format!("in{i}")) {
                total += msg.size;
            }
        }
        if total == 0 {
            return;
        }
        let out_size = (total * self.out_n as u64 / self.in_n as u64).max(1);
        self.emit_output(sim, out_size);
    }

    fn try_start(&mut self, sim: &mut Simulator) {
        if self.ports.peek_in("cmd").is_none() {
            return;
        }
        if self.buffer_inboxes.iter().any(|q| q.is_empty()) {
            return;
        }
        let cmd = self.ports.recv("cmd").expect("checked Some above");
        let rate = match cmd.payload {
            MessagePayload::Command { rate: Some(rate) } => rate,
            _ => 64,
        };
        self.consume_rate = rate.max(1);

        let mut total_in = 0u64;
        self.slots.clear();
        for inbox in &mut self.buffer_inboxes {
            let buf = inbox.pop_front().expect("checked non-empty above");
            total_in += buf.size;
            self.slots.push(InputSlot {
                remaining: buf.size,
                buffer_id: buf.id,
            });
        }
        self.expected_output = (total_in * self.out_n as u64 / self.in_n as u64).max(1);
        self.state = PeState::Busy;
    }

    fn tick_pro(&mut self, sim: &mut Simulator) {
        match self.state {
            PeState::Idle => self.try_start(sim),
            PeState::Backpressured => {
                if self.rng.gen::<f64>() < 0.5 {
                    self.state = PeState::Busy;
                }
            }
            PeState::Busy => {
                if self.rng.gen::<f64>() < self.backpressure_prob {
                    self.state = PeState::Backpressured;
                    return;
                }
                let mut budget = self.consume_rate;
                for slot in &mut self.slots {
                    if budget == 0 {
                        break;
                    }
                    let take = slot.remaining.min(budget);
                    slot.remaining -= take;
                    budget -= take;
                }
                if self.slots.iter().all(|s| s.remaining == 0) {
                    self.emit_output(sim, self.expected_output);
                    for slot in self.slots.drain(..) {
                        for pending in sim.buffer_pool.set_state(sim.ticks, &slot.buffer_id, BufferState::Deallocated) {
                            sim.deliver(&pending.station, "in", pending.message);
                        }
                        sim.buffer_pool.delete(&slot.buffer_id);
                    }
                    self.state = PeState::Idle;
                }
            }
        }
    }
}

impl Resource for ProcessingElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        match self.mode {
            PeMode::Dummy => self.tick_dummy(sim),
            PeMode::Pro => self.tick_pro(sim),
        }
    }

    fn deliver_buffer(&mut self, queue: &str, buffer: DataBuffer) {
        if let Some(idx) = queue.strip_prefix("in").and_then(|n| n.parse::<usize>().ok()) {
            if let Some(inbox) = self.buffer_inboxes.get_mut(idx) {
                inbox.push_back(buffer);
            }
        }
    }

    delegate_ports!(ports);
}

/// Periodically creates a [`DataBuffer`] and sends it to a target memory as
/// a `buffer_transfer` (spec §4.9/§4.6, original `BufferGenerator`).
pub struct BufferGenerator {
    name: String,
    ports: Ports,
    pub buffer_size: u64,
    pub target_memory: String,
    pub start_tick: u64,
    pub period: u64,
    pub total: Option<u64>,
    pub triggers: Vec<Trigger>,
    produced: u64,
    next_tick: u64,
}

impl BufferGenerator {
    pub fn new(name: impl Into<String>, buffer_size: u64, target_memory: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&["in"], &["out"]),
            buffer_size,
            target_memory: target_memory.into(),
            start_tick: 0,
            period: 10,
            total: None,
            triggers: Vec::new(),
            produced: 0,
            next_tick: 0,
        }
    }

    pub fn with_start_tick(mut self, tick: u64) -> Self {
        self.start_tick = tick;
        self.next_tick = tick;
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = period.max(1);
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_triggers(mut self, triggers: Vec<Trigger>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }
}

impl Resource for BufferGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        // Drain any acks routed back (the generator never acts on them, it
        // just keeps the in-queue from growing unbounded).
        while self.ports.recv("in").is_some() {}

        if let Some(total) = self.total {
            if self.produced >= total {
                return;
            }
        }
        if sim.ticks < self.next_tick {
            return;
        }

        let mut buf = sim.buffer_pool.create(self.buffer_size, None, None);
        buf.triggers = self.triggers.clone();
        if let Some(stored) = sim.buffer_pool.get_mut(&buf.id) {
            stored.triggers = self.triggers.clone();
        }
        let msg = Message::new(
            self.name.clone(),
            self.target_memory.clone(),
            buf.size,
            MessageKind::BufferTransfer,
            MessagePayload::BufferTransfer { buffer: buf },
            sim.ticks,
        );
        self.ports.send("out", msg);
        self.produced += 1;
        self.next_tick += self.period;
    }

    delegate_ports!(ports);
}

/// Read/write request generator that tracks issued vs. received counts
/// (spec §8 scenario 1, original `ComputeUnit`). Its own `in`/`out` ports
/// are wired to a [`crate::bus::ReadBus`]/[`crate::bus::WriteBus`]
/// requester pair.
pub struct Compute {
    name: String,
    ports: Ports,
    pub total_requests: u64,
    pub request_size: u64,
    pub issue_interval: u64,
    pub request_kind: MessageKind,
    issued: u64,
    received: u64,
    last_issue_tick: Option<u64>,
}

impl Compute {
    pub fn new(name: impl Into<String>, total_requests: u64, request_size: u64, issue_interval: u64) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&["in"], &["out"]),
            total_requests,
            request_size,
            issue_interval: issue_interval.max(1),
            request_kind: MessageKind::Read,
            issued: 0,
            received: 0,
            last_issue_tick: None,
        }
    }

    pub fn with_request_kind(mut self, kind: MessageKind) -> Self {
        self.request_kind = kind;
        self
    }

    pub fn progress(&self) -> (u64, u64) {
        (self.issued, self.received)
    }
}

impl Resource for Compute {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        while let Some(msg) = self.ports.recv("in") {
            if msg.kind == MessageKind::Resp {
                self.received += 1;
            }
        }

        if self.issued >= self.total_requests {
            return;
        }
        let due = match self.last_issue_tick {
            None => true,
            Some(t) => sim.ticks.saturating_sub(t) >= self.issue_interval,
        };
        if due {
            let req = Message::new(
                self.name.clone(),
                self.name.clone(),
                self.request_size,
                self.request_kind,
                MessagePayload::None,
                sim.ticks,
            );
            self.ports.send("out", req);
            self.issued += 1;
            self.last_issue_tick = Some(sim.ticks);
        }
    }

    delegate_ports!(ports);
}

/// Waits on a semaphore index, optionally re-issuing every `period` ticks,
/// and counts grants (spec §4.7, original `SemaphoreClient`).
pub struct SemaphoreClient {
    name: String,
    ports: Ports,
    pub station: String,
    pub index: usize,
    pub start_tick: u64,
    pub period: Option<u64>,
    next: Option<u64>,
    granted: u64,
}

impl SemaphoreClient {
    pub fn new(name: impl Into<String>, station: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&["in"], &["out"]),
            station: station.into(),
            index,
            start_tick: 0,
            period: None,
            next: Some(0),
            granted: 0,
        }
    }

    pub fn with_start_tick(mut self, tick: u64) -> Self {
        self.start_tick = tick;
        self.next = Some(tick);
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = Some(period.max(1));
        self
    }

    pub fn granted(&self) -> u64 {
        self.granted
    }
}

impl Resource for SemaphoreClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        while let Some(msg) = self.ports.recv("in") {
            if msg.kind == MessageKind::SemGranted {
                self.granted += 1;
            }
        }

        if let Some(next) = self.next {
            if sim.ticks >= next {
                let msg = Message::new(
                    self.name.clone(),
                    self.station.clone(),
                    1,
                    MessageKind::SemWait,
                    MessagePayload::SemOp {
                        index: self.index,
                        buffer_id: None,
                        state: None,
                    },
                    sim.ticks,
                );
                self.ports.send("out", msg);
                self.next = self.period.map(|p| next + p);
            }
        }
    }

    delegate_ports!(ports);
}

/// Like [`SemaphoreClient`], but immediately re-arms after every grant so
/// it never misses a signal. Used to record the tick of each grant for
/// fairness and latency assertions.
pub struct SemaphoreRecorder {
    name: String,
    ports: Ports,
    pub station: String,
    pub index: usize,
    pub start_tick: u64,
    armed: bool,
    pub grants: Vec<u64>,
}

impl SemaphoreRecorder {
    pub fn new(name: impl Into<String>, station: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&["in"], &["out"]),
            station: station.into(),
            index,
            start_tick: 0,
            armed: false,
            grants: Vec::new(),
        }
    }

    pub fn with_start_tick(mut self, tick: u64) -> Self {
        self.start_tick = tick;
        self
    }

    fn issue_wait(&mut self, sim: &Simulator) {
        let msg = Message::new(
            self.name.clone(),
            self.station.clone(),
            1,
            MessageKind::SemWait,
            MessagePayload::SemOp {
                index: self.index,
                buffer_id: None,
                state: None,
            },
            sim.ticks,
        );
        self.ports.send("out", msg);
        self.armed = true;
    }
}

impl Resource for SemaphoreRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        if !self.armed && sim.ticks >= self.start_tick {
            self.issue_wait(sim);
        }
        while let Some(msg) = self.ports.recv("in") {
            if msg.kind == MessageKind::SemGranted {
                self.grants.push(sim.ticks);
                self.issue_wait(sim);
            }
        }
    }

    delegate_ports!(ports);
}

/// Sends a `buffer_consume` for every buffer it receives, after a fixed
/// delay from the tick it was handed the buffer. Exists so a consumer of
/// a transferred buffer doesn't need to know the buffer's id in advance;
/// it only learns it once [`crate::buffer_pool::BufferPool::tick`]
/// delivers the arrived buffer to this resource's inbox.
pub struct Consumer {
    name: String,
    ports: Ports,
    pub consume_delay: u64,
    pending: Vec<(DataBuffer, Option<u64>)>,
}

impl Consumer {
    pub fn new(name: impl Into<String>, consume_delay: u64) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&[], &["out"]),
            consume_delay,
            pending: Vec::new(),
        }
    }
}

impl Resource for Consumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver_buffer(&mut self, _queue: &str, buffer: DataBuffer) {
        self.pending.push((buffer, None));
    }

    fn tick(&mut self, sim: &mut Simulator) {
        for (_, due) in self.pending.iter_mut() {
            if due.is_none() {
                *due = Some(sim.ticks + self.consume_delay);
            }
        }
        let now = sim.ticks;
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].1 == Some(now) {
                let (buf, _) = self.pending.remove(i);
                let target = buf.owner_memory.clone().unwrap_or_default();
                let msg = Message::new(
                    self.name.clone(),
                    target,
                    1,
                    MessageKind::BufferConsume,
                    MessagePayload::BufferConsume { buffer_id: buf.id },
                    now,
                );
                self.ports.send("out", msg);
            } else {
                i += 1;
            }
        }
    }

    delegate_ports!(ports);
}

/// Drains its `in` port and delivers each message directly to the
/// resource named in [`Message::dst`] on `dst_port`, bypassing
/// bandwidth/latency modeling. A [`crate::semaphore::SemaphoreStation`]
/// (and other resources that address replies by `dst` rather than by a
/// dedicated per-destination port) share a single `out` queue; this
/// fans that queue back out to the many distinct requesters it replies
/// to, the way [`crate::bus::ReadBus`]/[`crate::bus::WriteBus`] do
/// internally for their own `out_<dst>` ports, without requiring every
/// upstream resource to grow per-destination ports itself.
pub struct Fanout {
    name: String,
    ports: Ports,
    pub dst_port: String,
}

impl Fanout {
    pub fn new(name: impl Into<String>, dst_port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&["in"], &[]),
            dst_port: dst_port.into(),
        }
    }
}

impl Resource for Fanout {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        while let Some(msg) = self.ports.recv("in") {
            let dst = msg.dst.clone();
            let port = self.dst_port.clone();
            sim.deliver(&dst, &port, msg);
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

    fn stub() -> Simulator {
        Simulator::new(Topology::new(), BufferPool::new(), Metrics::default())
    }

    #[test]
    fn pe_requires_at_least_one_port_each_way() {
        assert!(ProcessingElement::new("pe0", 0, 1, PeMode::Dummy, "mem0").is_err());
        assert!(ProcessingElement::new("pe0", 1, 0, PeMode::Dummy, "mem0").is_err());
    }

    #[test]
    fn dummy_mode_combines_inputs_into_one_output() {
        let mut sim = stub();
        let mut pe = ProcessingElement::new("pe0", 2, 1, PeMode::Dummy, "mem0").unwrap();
        pe.ports.push_in("in0", Message::new("a", "pe0", 40, MessageKind::Data, MessagePayload::None, 0));
        pe.ports.push_in("in1", Message::new("b", "pe0", 60, MessageKind::Data, MessagePayload::None, 0));
        pe.tick(&mut sim);
        assert_eq!(pe.ports.out_len("out0"), 1);
    }

    #[test]
    fn dummy_mode_is_a_noop_with_no_input() {
        let mut sim = stub();
        let mut pe = ProcessingElement::new("pe0", 1, 1, PeMode::Dummy, "mem0").unwrap();
        pe.tick(&mut sim);
        assert_eq!(pe.ports.out_len("out0"), 0);
    }

    #[test]
    fn pro_mode_requires_every_input_slot_filled_to_start() {
        let mut sim = stub();
        let mut pe = ProcessingElement::new("pe0", 2, 1, PeMode::Pro, "mem0").unwrap();
        pe.ports.push_in("cmd", Message::new("ctl", "pe0", 1, MessageKind::Data, MessagePayload::None, 0));
        pe.deliver_buffer("in0", DataBuffer::new(10, Some(vec![0; 10])));
        pe.tick(&mut sim);
        assert_eq!(pe.state(), PeState::Idle);
    }

    #[test]
    fn pro_mode_runs_to_completion_without_backpressure() {
        let mut sim = stub();
        let mut pe = ProcessingElement::new("pe0", 1, 1, PeMode::Pro, "mem0")
            .unwrap()
            .with_backpressure_prob(0.0);
        pe.deliver_buffer("in0", DataBuffer::new(100, Some(vec![0; 100])));
        pe.ports.push_in("cmd", Message::new("ctl", "pe0", 1, MessageKind::Data, MessagePayload::None, 0));
        pe.tick(&mut sim);
        assert_eq!(pe.state(), PeState::Busy);

        for _ in 0..3 {
            pe.tick(&mut sim);
        }
        assert_eq!(pe.state(), PeState::Idle);
        assert_eq!(pe.ports.out_len("out0"), 1);
    }

    #[test]
    fn buffer_generator_produces_on_schedule() {
        let mut sim = stub();
        let mut gen = BufferGenerator::new("gen", 4096, "mem0").with_start_tick(2).with_period(5);
        gen.tick(&mut sim);
        sim.ticks = 2;
        gen.tick(&mut sim);
        assert_eq!(gen.produced(), 1);
        assert_eq!(gen.ports.out_len("out"), 1);
    }

    #[test]
    fn buffer_generator_respects_total() {
        let mut sim = stub();
        let mut gen = BufferGenerator::new("gen", 100, "mem0").with_total(1);
        gen.tick(&mut sim);
        sim.ticks = 100;
        gen.tick(&mut sim);
        assert_eq!(gen.produced(), 1);
    }

    #[test]
    fn compute_tracks_issued_and_received() {
        let mut sim = stub();
        let mut cpu = Compute::new("cpu0", 2, 64, 1);
        cpu.tick(&mut sim);
        assert_eq!(cpu.progress(), (1, 0));
        sim.ticks = 1;
        cpu.ports.push_in("in", Message::new("bus", "cpu0", 64, MessageKind::Resp, MessagePayload::None, 0));
        cpu.tick(&mut sim);
        assert_eq!(cpu.progress(), (2, 1));
        sim.ticks = 2;
        cpu.tick(&mut sim);
        assert_eq!(cpu.progress(), (2, 1));
    }

    #[test]
    fn semaphore_recorder_rearms_after_each_grant() {
        let mut sim = stub();
        let mut rec = SemaphoreRecorder::new("rec", "sem0", 0);
        rec.tick(&mut sim);
        assert_eq!(rec.ports.out_len("out"), 1);
        rec.ports.recv("out");

        rec.ports.push_in("in", Message::new("sem0", "rec", 1, MessageKind::SemGranted, MessagePayload::SemGranted { index: 0, reply_to: uuid::Uuid::new_v4() }, 1));
        sim.ticks = 1;
        rec.tick(&mut sim);
        assert_eq!(rec.grants, vec![1]);
        assert_eq!(rec.ports.out_len("out"), 1);
    }

    #[test]
    fn fanout_routes_by_message_dst() {
        let mut sim = stub();
        sim.topology.add(Box::new(SemaphoreClient::new("client_a", "sem0", 0))).unwrap();
        sim.topology.add(Box::new(SemaphoreClient::new("client_b", "sem0", 0))).unwrap();
        let mut fanout = Fanout::new("router", "in");
        fanout.ports.push_in("in", Message::new("sem0", "client_b", 1, MessageKind::SemGranted, MessagePayload::SemGranted { index: 0, reply_to: uuid::Uuid::new_v4() }, 0));
        fanout.tick(&mut sim);
        let b = sim.topology.resources.get("client_b").unwrap();
        assert_eq!(b.in_queues().get("in").unwrap().len(), 1);
        let a = sim.topology.resources.get("client_a").unwrap();
        assert_eq!(a.in_queues().get("in").unwrap().len(), 0);
    }
}
