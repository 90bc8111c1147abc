//! # Bus, ReadBus, WriteBus
//!
//! Shared interconnects with bandwidth-limited round-robin arbitration.
//! [`Bus`] is the simple aggregate-bandwidth version; [`ReadBus`] and
//! [`WriteBus`] split requests and responses into independent pipelines
//! with their own latencies, and route responses back to the requester by
//! reading `Message::dst` and creating an `out_<dst>` port the first time
//! it's needed.

use std::collections::VecDeque;

use crate::delegate_ports;
use crate::message::Message;
use crate::resource::{Ports, Resource};
use crate::simulator::Simulator;

pub struct Bus {
    name: String,
    ports: Ports,
    pub bandwidth: u64,
    rr_order: Vec<String>,
    last_idx: usize,
}

impl Bus {
    pub fn new(name: impl Into<String>, bandwidth: u64) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&[], &["out"]),
            bandwidth,
            rr_order: Vec::new(),
            last_idx: 0,
        }
    }

    pub fn add_input(&mut self, port: impl Into<String>) {
        let port = port.into();
        if !self.ports.inputs.contains_key(&port) {
            self.ports.inputs.insert(port.clone(), Default::default());
            self.rr_order.push(port);
        }
    }
}

impl Resource for Bus {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, _sim: &mut Simulator) {
        for p in self.ports.inputs.keys() {
            if !self.rr_order.contains(p) {
                self.rr_order.push(p.clone());
            }
        }
        if self.rr_order.is_empty() {
            return;
        }

        let mut remaining = self.bandwidth;
        let n = self.rr_order.len();
        let start_idx = self.last_idx % n;
        let mut idx = start_idx;
        let mut spins = 0;
        let mut moved_any = false;

        while remaining > 0 && spins <= n {
            let port = self.rr_order[idx % n].clone();
            if let Some(msg) = self.ports.peek_in(&port) {
                if msg.size <= remaining {
                    let msg = self.ports.recv(&port).unwrap();
                    remaining -= msg.size;
                    self.ports.send("out", msg);
                    moved_any = true;
                }
            }
            idx += 1;
            if idx - start_idx >= n {
                spins += 1;
                if !moved_any {
                    break;
                }
                moved_any = false;
            }
        }
        self.last_idx = idx;
    }

    delegate_ports!(ports);
}

fn shift_pipeline(pipeline: &mut [VecDeque<Message>]) {
    for i in (1..pipeline.len()).rev() {
        let (head, tail) = pipeline.split_at_mut(i);
        let moved: Vec<Message> = head[i - 1].drain(..).collect();
        tail[0].extend(moved);
    }
}

pub struct ReadBus {
    name: String,
    ports: Ports,
    pub read_request_latency: u64,
    pub data_response_latency: u64,
    pub data_response_bandwidth: u64,
    requesters: Vec<String>,
    rr_idx: usize,
    req_pipeline: Vec<VecDeque<Message>>,
    resp_pipeline: Vec<VecDeque<Message>>,
}

impl ReadBus {
    pub fn new(
        name: impl Into<String>,
        read_request_latency: u64,
        data_response_latency: u64,
        data_response_bandwidth: u64,
    ) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&["in_mem_resp"], &["out_req"]),
            read_request_latency,
            data_response_latency,
            data_response_bandwidth,
            requesters: Vec::new(),
            rr_idx: 0,
            req_pipeline: (0..read_request_latency.max(1)).map(|_| VecDeque::new()).collect(),
            resp_pipeline: (0..data_response_latency.max(1)).map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn add_requester(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.requesters.contains(&name) {
            return;
        }
        self.ports.inputs.entry(format!("in_{name}")).or_default();
        self.ports.outputs.entry(format!("out_{name}")).or_default();
        self.requesters.push(name);
    }

    fn next_nonempty_from(&self, start: usize) -> Option<usize> {
        if self.requesters.is_empty() {
            return None;
        }
        let n = self.requesters.len();
        (0..n)
            .map(|i| (start + i) % n)
            .find(|&idx| self.ports.in_len(&format!("in_{}", self.requesters[idx])) > 0)
    }
}

impl Resource for ReadBus {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, _sim: &mut Simulator) {
        let mut capacity = self.data_response_bandwidth;
        if let Some(last) = self.resp_pipeline.last_mut() {
            let mut ready = Vec::new();
            while let Some(msg) = last.front() {
                if msg.size > capacity {
                    break;
                }
                let msg = last.pop_front().unwrap();
                capacity -= msg.size;
                ready.push(msg);
            }
            for msg in ready {
                let out_port = format!("out_{}", msg.dst);
                self.ports.outputs.entry(out_port.clone()).or_default();
                self.ports.send(&out_port, msg);
            }
        }
        shift_pipeline(&mut self.resp_pipeline);
        if let Some(first) = self.resp_pipeline.first_mut() {
            while let Some(msg) = self.ports.recv("in_mem_resp") {
                first.push_back(msg);
            }
        }

        if let Some(last) = self.req_pipeline.last_mut() {
            while let Some(msg) = last.pop_front() {
                self.ports.send("out_req", msg);
            }
        }
        shift_pipeline(&mut self.req_pipeline);
        if !self.requesters.is_empty() {
            let start = self.rr_idx;
            let mut idx = self.next_nonempty_from(start);
            let mut visited = 0;
            while let Some(i) = idx {
                if visited >= self.requesters.len() {
                    break;
                }
                let port = format!("in_{}", self.requesters[i]);
                if let Some(msg) = self.ports.recv(&port) {
                    self.req_pipeline[0].push_back(msg);
                }
                visited += 1;
                idx = self.next_nonempty_from(i + 1);
            }
            self.rr_idx = (start + 1) % self.requesters.len();
        }
    }

    fn is_idle(&self) -> bool {
        self.req_pipeline.iter().all(|q| q.is_empty()) && self.resp_pipeline.iter().all(|q| q.is_empty())
    }

    delegate_ports!(ports);
}

pub struct WriteBus {
    name: String,
    ports: Ports,
    pub write_request_latency: u64,
    pub write_bandwidth: u64,
    pub write_response_latency: u64,
    writers: Vec<String>,
    rr_idx: usize,
    req_pipeline: Vec<VecDeque<Message>>,
    resp_pipeline: Vec<VecDeque<Message>>,
}

impl WriteBus {
    pub fn new(
        name: impl Into<String>,
        write_request_latency: u64,
        write_bandwidth: u64,
        write_response_latency: u64,
    ) -> Self {
        Self {
            name: name.into(),
            ports: Ports::new(&["in_mem_resp"], &["out_mem"]),
            write_request_latency,
            write_bandwidth,
            write_response_latency,
            writers: Vec::new(),
            rr_idx: 0,
            req_pipeline: (0..write_request_latency.max(1)).map(|_| VecDeque::new()).collect(),
            resp_pipeline: (0..write_response_latency.max(1)).map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn add_writer(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.writers.contains(&name) {
            return;
        }
        self.ports.inputs.entry(format!("in_{name}")).or_default();
        self.ports.outputs.entry(format!("out_{name}")).or_default();
        self.writers.push(name);
    }

    fn next_nonempty_from(&self, start: usize) -> Option<usize> {
        if self.writers.is_empty() {
            return None;
        }
        let n = self.writers.len();
        (0..n)
            .map(|i| (start + i) % n)
            .find(|&idx| self.ports.in_len(&format!("in_{}", self.writers[idx])) > 0)
    }
}

impl Resource for WriteBus {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, _sim: &mut Simulator) {
        if let Some(last) = self.resp_pipeline.last_mut() {
            let ready: Vec<Message> = last.drain(..).collect();
            for msg in ready {
                let out_port = format!("out_{}", msg.dst);
                self.ports.outputs.entry(out_port.clone()).or_default();
                self.ports.send(&out_port, msg);
            }
        }
        shift_pipeline(&mut self.resp_pipeline);
        if let Some(first) = self.resp_pipeline.first_mut() {
            while let Some(msg) = self.ports.recv("in_mem_resp") {
                first.push_back(msg);
            }
        }

        let mut capacity = self.write_bandwidth;
        if let Some(last) = self.req_pipeline.last_mut() {
            let mut ready = Vec::new();
            while let Some(msg) = last.front() {
                if msg.size > capacity {
                    break;
                }
                let msg = last.pop_front().unwrap();
                capacity -= msg.size;
                ready.push(msg);
            }
            for msg in ready {
                self.ports.send("out_mem", msg);
            }
        }
        shift_pipeline(&mut self.req_pipeline);
        if !self.writers.is_empty() {
            let start = self.rr_idx;
            let mut idx = self.next_nonempty_from(start);
            let mut visited = 0;
            while let Some(i) = idx {
                if visited >= self.writers.len() {
                    break;
                }
                let port = format!("in_{}", self.writers[i]);
                if let Some(msg) = self.ports.recv(&port) {
                    self.req_pipeline[0].push_back(msg);
                }
                visited += 1;
                idx = self.next_nonempty_from(i + 1);
            }
            self.rr_idx = (start + 1) % self.writers.len();
        }
    }

    fn is_idle(&self) -> bool {
        self.req_pipeline.iter().all(|q| q.is_empty()) && self.resp_pipeline.iter().all(|q| q.is_empty())
    }

    delegate_ports!(ports);
}
