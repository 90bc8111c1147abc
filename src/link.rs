//! # Link
//!
//! A fixed point-to-point transport between two resource ports: a bandwidth
//! budget admits whole messages into a latency pipeline each tick, and
//! whatever reaches the last stage is delivered. Links are not
//! [`crate::resource::Resource`]s — the simulator ticks them in their own
//! phase, after every resource has ticked, so a message can only move at
//! most one hop (resource -> link -> resource) per cycle.

use std::collections::VecDeque;

use crate::error::{Result, SimError};
use crate::message::Message;
use crate::simulator::Simulator;

pub struct Link {
    pub name: String,
    pub src: String,
    pub src_port: String,
    pub dst: String,
    pub dst_port: String,
    pub bandwidth: u64,
    pub latency: u64,

    pipeline: Vec<VecDeque<Message>>,
    bytes_moved_this_tick: u64,
    utilization_sum: u64,
    ticks: u64,
}

impl Link {
    pub fn new(
        src: impl Into<String>,
        src_port: impl Into<String>,
        dst: impl Into<String>,
        dst_port: impl Into<String>,
        bandwidth: u64,
        latency: u64,
        name: Option<String>,
    ) -> Result<Self> {
        if bandwidth == 0 {
            return Err(SimError::InvalidBandwidth(bandwidth));
        }
        let src = src.into();
        let src_port = src_port.into();
        let dst = dst.into();
        let dst_port = dst_port.into();
        let name = name.unwrap_or_else(|| format!("{src}:{src_port}->{dst}:{dst_port}"));
        let stages = latency.max(1) as usize;
        Ok(Self {
            name,
            src,
            src_port,
            dst,
            dst_port,
            bandwidth,
            latency,
            pipeline: (0..stages).map(|_| VecDeque::new()).collect(),
            bytes_moved_this_tick: 0,
            utilization_sum: 0,
            ticks: 0,
        })
    }

    pub fn is_idle(&self) -> bool {
        self.pipeline.iter().all(|stage| stage.is_empty())
    }

    /// Total messages currently in flight across every pipeline stage.
    pub fn occupancy(&self) -> usize {
        self.pipeline.iter().map(VecDeque::len).sum()
    }

    pub fn utilization(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            (self.utilization_sum as f64 / self.ticks as f64 / self.bandwidth as f64).min(1.0)
        }
    }

    /// Pull whatever the source resource staged on its outbound port,
    /// advance the pipeline, and deliver whatever reached the far end.
    pub fn tick(&mut self, sim: &mut Simulator) {
        self.ticks += 1;
        self.bytes_moved_this_tick = 0;

        if self.latency >= 1 {
            if let Some(last) = self.pipeline.last_mut() {
                while let Some(msg) = last.pop_front() {
                    self.bytes_moved_this_tick += msg.size;
                    sim.metrics.messages_delivered += 1;
                    sim.metrics.bytes_transferred += msg.size;
                    sim.deliver(&self.dst, &self.dst_port, msg);
                }
            }
            for i in (1..self.pipeline.len()).rev() {
                let moved: Vec<Message> = self.pipeline[i - 1].drain(..).collect();
                self.pipeline[i].extend(moved);
            }

            let mut capacity = self.bandwidth;
            if let Some(outq) = sim.resource_out_queue_mut(&self.src, &self.src_port) {
                while let Some(msg) = outq.front() {
                    if msg.size > capacity {
                        break;
                    }
                    let msg = outq.pop_front().unwrap();
                    capacity -= msg.size;
                    self.pipeline[0].push_back(msg);
                }
            }
        } else {
            let mut capacity = self.bandwidth;
            if let Some(outq) = sim.resource_out_queue_mut(&self.src, &self.src_port) {
                let mut ready = Vec::new();
                while let Some(msg) = outq.front() {
                    if msg.size > capacity {
                        break;
                    }
                    let msg = outq.pop_front().unwrap();
                    capacity -= msg.size;
                    ready.push(msg);
                }
                for msg in ready {
                    self.bytes_moved_this_tick += msg.size;
                    sim.metrics.messages_delivered += 1;
                    sim.metrics.bytes_transferred += msg.size;
                    sim.deliver(&self.dst, &self.dst_port, msg);
                }
            }
        }

        self.utilization_sum += self.bytes_moved_this_tick;
    }
}
