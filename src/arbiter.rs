//! # Arbiter
//!
//! Merges several upstream input ports into a single downstream output.
//! Shapes *which* message moves when; the actual bytes-per-tick limit is
//! enforced by whatever [`crate::link::Link`] or [`crate::channel::Channel`]
//! sits downstream of `out`. Forwards messages whole — no fragmentation.

use std::collections::HashMap;

use crate::channel::TransferMode;
use crate::delegate_ports;
use crate::message::{Message, MessagePayload};
use crate::resource::{Ports, Resource};
use crate::simulator::Simulator;

struct ActiveTransfer {
    port: String,
    buf_id: Option<String>,
    total: u64,
    progressed: u64,
    start: u64,
    last_update: u64,
    per_share_bw: u64,
    expected: u64,
}

pub struct Arbiter {
    name: String,
    ports: Ports,
    inputs: Vec<String>,
    rr_index: usize,
    active_port: Option<String>,
    downstream: Option<String>,
    available_from: u64,
    inflight_by_port: HashMap<String, bool>,
    active: Vec<ActiveTransfer>,
}

impl Arbiter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&[], &["out"]),
            inputs: Vec::new(),
            rr_index: 0,
            active_port: None,
            downstream: None,
            available_from: 0,
            inflight_by_port: HashMap::new(),
            active: Vec::new(),
        }
    }

    pub fn add_input(&mut self, port: impl Into<String>) {
        let port = port.into();
        if !self.ports.inputs.contains_key(&port) {
            self.ports.inputs.insert(port.clone(), Default::default());
            self.inputs.push(port);
        }
    }

    pub fn set_downstream_channel(&mut self, channel: impl Into<String>) {
        self.downstream = Some(channel.into());
    }

    fn next_nonempty_from(&self, start: usize) -> Option<usize> {
        if self.inputs.is_empty() {
            return None;
        }
        let n = self.inputs.len();
        (0..n)
            .map(|i| (start + i) % n)
            .find(|&idx| self.ports.in_len(&self.inputs[idx]) > 0)
    }

    fn buffer_id_of(msg: &Message) -> Option<String> {
        match &msg.payload {
            MessagePayload::BufferTransfer { buffer } => Some(buffer.id.clone()),
            _ => None,
        }
    }

    fn recompute_interleaving(&mut self, sim: &mut Simulator) {
        let Some(downstream) = self.downstream.clone() else {
            return;
        };
        if self.active.is_empty() {
            return;
        }
        let now = sim.ticks;
        let (bandwidth, latency) = match sim.channel(&downstream) {
            Some(c) => (c.bandwidth, c.latency),
            None => return,
        };
        let n = self.active.len().max(1) as u64;
        let share_bw = (bandwidth / n).max(1);

        for a in &mut self.active {
            let dt = now.saturating_sub(a.last_update);
            let prev_bw = if a.per_share_bw > 0 { a.per_share_bw } else { share_bw };
            a.progressed = (a.progressed + dt * prev_bw).min(a.total);
            let remaining = a.total.saturating_sub(a.progressed);
            let lat_elapsed = now.saturating_sub(a.start);
            let lat_rem = latency.saturating_sub(lat_elapsed);
            let data_ticks = if share_bw > 0 { remaining.div_ceil(share_bw) } else { 0 };
            a.expected = now + lat_rem + data_ticks;
            a.per_share_bw = share_bw;
            a.last_update = now;

            if let Some(buf_id) = &a.buf_id {
                sim.buffer_pool.record_expected_arrival(buf_id, a.expected);
            }
        }
    }

    fn tick_interleaving(&mut self, sim: &mut Simulator) {
        let now = sim.ticks;
        self.active.retain(|a| a.expected > now);
        let active_ports: std::collections::HashSet<String> =
            self.active.iter().map(|a| a.port.clone()).collect();
        for p in &self.inputs {
            if self.inflight_by_port.get(p).copied().unwrap_or(false) && !active_ports.contains(p) {
                self.inflight_by_port.insert(p.clone(), false);
            }
        }

        let start = self.rr_index;
        let mut idx = self.next_nonempty_from(start);
        let mut visited = 0;
        while let Some(i) = idx {
            if visited >= self.inputs.len() {
                break;
            }
            let port = self.inputs[i].clone();
            let inflight = self.inflight_by_port.get(&port).copied().unwrap_or(false);
            if self.ports.in_len(&port) > 0 && !inflight {
                let msg = self.ports.recv(&port).unwrap();
                let buf_id = Self::buffer_id_of(&msg);
                self.inflight_by_port.insert(port.clone(), true);
                self.active.push(ActiveTransfer {
                    port: port.clone(),
                    buf_id,
                    total: msg.size,
                    progressed: 0,
                    start: now,
                    last_update: now,
                    per_share_bw: 0,
                    expected: now,
                });
                self.ports.send("out", msg);
                self.recompute_interleaving(sim);
            }
            visited += 1;
            idx = self.next_nonempty_from(i + 1);
        }
        if !self.inputs.is_empty() {
            self.rr_index = (start + 1) % self.inputs.len();
        }

        if let Some(downstream) = self.downstream.clone() {
            let active_count = self.active.len();
            if let Some(channel) = sim.channel_mut(&downstream) {
                channel.set_active_state(active_count);
            }
        }
    }

    fn tick_blocking(&mut self, sim: &mut Simulator) {
        let now = sim.ticks;
        if self
            .active_port
            .as_ref()
            .map(|p| self.ports.in_len(p) == 0)
            .unwrap_or(true)
        {
            let idx = self.next_nonempty_from(self.rr_index);
            self.active_port = idx.map(|i| self.inputs[i].clone());
            if let Some(i) = idx {
                self.rr_index = (i + 1) % self.inputs.len();
            }
        }
        let Some(active_port) = self.active_port.clone() else {
            return;
        };

        if self.available_from <= now && self.ports.in_len(&active_port) > 0 {
            let msg = self.ports.recv(&active_port).unwrap();
            if let Some(downstream) = self.downstream.clone() {
                let size = msg.size;
                let start_time = now.max(self.available_from);
                if let Some(channel) = sim.channel(&downstream) {
                    let duration = channel.estimate_ticks(size);
                    let arrival = start_time + duration;
                    if let Some(buf_id) = Self::buffer_id_of(&msg) {
                        sim.buffer_pool.record_expected_arrival(&buf_id, arrival);
                    }
                    self.available_from = arrival;
                    self.inflight_by_port.insert(active_port.clone(), true);
                }
            }
            self.ports.send("out", msg);
        }

        if let Some(downstream) = self.downstream.clone() {
            let active_count = if self.available_from > now { 1 } else { 0 };
            if let Some(channel) = sim.channel_mut(&downstream) {
                channel.set_active_state(active_count);
            }
        }
    }
}

impl Resource for Arbiter {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, sim: &mut Simulator) {
        if self.inputs.is_empty() {
            return;
        }

        let now = sim.ticks;
        let channel_mode = match &self.downstream {
            Some(name) => sim.channel(name).map(|c| c.transfer_mode),
            None => None,
        }
        .unwrap_or(TransferMode::Interleaving);

        match channel_mode {
            TransferMode::Interleaving => self.tick_interleaving(sim),
            TransferMode::Blocking => {
                if self.available_from <= now {
                    for p in &self.inputs {
                        self.inflight_by_port.insert(p.clone(), false);
                    }
                }
                self.tick_blocking(sim);
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.active.is_empty() && !self.inflight_by_port.values().any(|&busy| busy)
    }

    delegate_ports!(ports);
}
