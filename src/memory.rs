//! # Memory
//!
//! A latency-modeled request servicer. Every accepted request is answered
//! `latency` ticks later; buffer lifecycle messages (`buffer_transfer`,
//! `buffer_consume`) are serviced the same way, through the same inflight
//! queue, rather than as a special fast path. Occupancy is tracked with
//! independent fill/drain rates and turns into backpressure on whichever
//! channels feed this memory once `size_limit` is reached.

use std::collections::VecDeque;

use crate::databuffer::{BufferState, DataBuffer};
use crate::delegate_ports;
use crate::message::{Message, MessageKind, MessagePayload};
use crate::resource::{Ports, Resource};
use crate::simulator::Simulator;

/// A buffer-lifecycle side effect attached to an inflight reply, applied
/// only once that reply's `latency` delay has elapsed - ownership changes
/// and trigger firing are part of the answer, not the acknowledgement that
/// a request was accepted.
enum PendingEffect {
    None,
    FinishTransfer { buf_id: String, new_owner: String },
    FinishConsume { buf_id: String },
}

pub struct Memory {
    name: String,
    ports: Ports,
    pub latency: u64,
    pub max_issue_per_tick: usize,
    pub size_limit: u64,
    pub fill_rate: u64,
    pub drain_rate: u64,

    inflight: VecDeque<(u64, Message, PendingEffect)>,
    pub bytes_current: u64,
    bytes_in_tick: u64,
    bytes_out_tick: u64,
    pub backpressured: bool,
    inbound_channels: Vec<String>,
}

impl Memory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&["in"], &["out"]),
            latency: 20,
            max_issue_per_tick: 1,
            size_limit: 1_000_000,
            fill_rate: 1_000_000,
            drain_rate: 1_000_000,
            inflight: VecDeque::new(),
            bytes_current: 0,
            bytes_in_tick: 0,
            bytes_out_tick: 0,
            backpressured: false,
            inbound_channels: Vec::new(),
        }
    }

    pub fn with_latency(mut self, latency: u64) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_max_issue_per_tick(mut self, n: usize) -> Self {
        self.max_issue_per_tick = n.max(1);
        self
    }

    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit;
        self
    }

    pub fn with_fill_drain_rate(mut self, fill_rate: u64, drain_rate: u64) -> Self {
        self.fill_rate = fill_rate;
        self.drain_rate = drain_rate;
        self
    }

    pub fn register_inbound_channel(&mut self, channel: impl Into<String>) {
        let channel = channel.into();
        if !self.inbound_channels.contains(&channel) {
            self.inbound_channels.push(channel);
        }
    }

    pub fn total_allocated_bytes(&self, sim: &Simulator) -> u64 {
        sim.buffer_pool.bytes_owned(Some(&self.name))
    }
}

impl Resource for Memory {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        self.bytes_in_tick = 0;
        self.bytes_out_tick = 0;

        let mut issued = 0;
        while issued < self.max_issue_per_tick {
            let Some(req) = self.ports.recv("in") else {
                break;
            };
            self.bytes_in_tick += req.size;

            match req.kind {
                MessageKind::BufferTransfer => {
                    let buffer = match req.payload {
                        MessagePayload::BufferTransfer { buffer } => buffer,
                        _ => DataBuffer::new(req.size, None),
                    };
                    let buf_id = buffer.id.clone();
                    if !sim.buffer_pool.exists(&buf_id) {
                        sim.buffer_pool.register(buffer, None);
                    }
                    let ack = Message::new(
                        self.name.clone(),
                        req.src.clone(),
                        1,
                        MessageKind::BufferAck,
                        MessagePayload::BufferAck {
                            buffer_id: buf_id.clone(),
                        },
                        sim.ticks,
                    );
                    self.inflight.push_back((
                        sim.ticks + self.latency,
                        ack,
                        PendingEffect::FinishTransfer { buf_id, new_owner: self.name.clone() },
                    ));
                }
                MessageKind::BufferConsume => {
                    if let MessagePayload::BufferConsume { buffer_id } = &req.payload {
                        let ack = Message::new(
                            self.name.clone(),
                            req.src.clone(),
                            1,
                            MessageKind::BufferFreed,
                            MessagePayload::BufferFreed {
                                buffer_id: Some(buffer_id.clone()),
                            },
                            sim.ticks,
                        );
                        self.inflight.push_back((
                            sim.ticks + self.latency,
                            ack,
                            PendingEffect::FinishConsume { buf_id: buffer_id.clone() },
                        ));
                    }
                }
                kind => {
                    let resp = Message::new(
                        self.name.clone(),
                        req.src.clone(),
                        req.size,
                        MessageKind::Resp,
                        MessagePayload::Resp {
                            reply_to: req.id,
                            request_kind: kind,
                        },
                        sim.ticks,
                    );
                    self.inflight.push_back((sim.ticks + self.latency, resp, PendingEffect::None));
                }
            }
            issued += 1;
        }

        while let Some((ready, _, _)) = self.inflight.front() {
            if *ready > sim.ticks {
                break;
            }
            let (_, resp, effect) = self.inflight.pop_front().unwrap();
            match effect {
                PendingEffect::None => {}
                PendingEffect::FinishTransfer { buf_id, new_owner } => {
                    if sim.buffer_pool.exists(&buf_id) {
                        let _ = sim.buffer_pool.transfer(&buf_id, Some(new_owner));
                    }
                    for p in sim.buffer_pool.set_state(sim.ticks, &buf_id, BufferState::Responded) {
                        sim.deliver(&p.station, "in", p.message);
                    }
                }
                PendingEffect::FinishConsume { buf_id } => {
                    let owner = sim.buffer_pool.owner(&buf_id);
                    if owner.as_deref() == Some(self.name.as_str()) {
                        for p in sim.buffer_pool.set_state(sim.ticks, &buf_id, BufferState::Deallocated) {
                            sim.deliver(&p.station, "in", p.message);
                        }
                        sim.buffer_pool.delete(&buf_id);
                    }
                }
            }
            self.bytes_out_tick += resp.size;
            self.ports.send("out", resp);
        }

        let fill = self.bytes_in_tick.min(self.fill_rate);
        self.bytes_current = (self.bytes_current + fill).min(self.size_limit);
        let drain = self.bytes_out_tick.min(self.drain_rate).min(self.bytes_current);
        self.bytes_current = self.bytes_current.saturating_sub(drain);

        self.backpressured = self.bytes_current >= self.size_limit;
        for ch in self.inbound_channels.clone() {
            if let Some(channel) = sim.channel_mut(&ch) {
                channel.set_backpressure(self.backpressured);
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.inflight.is_empty()
    }

    delegate_ports!(ports);
}
