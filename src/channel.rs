//! # Channel
//!
//! A resource-style transport: unlike [`crate::link::Link`], a `Channel`
//! does not move data on its own. An [`crate::arbiter::Arbiter`] queries it
//! for [`Self::estimate_ticks`] and pushes occupancy/backpressure state into
//! it; the channel's own `tick` is a trivial `in -> out` pass-through, and
//! `finalize_tick` folds that state into an occupancy average once per
//! cycle.

use crate::delegate_ports;
use crate::error::{Result, SimError};
use crate::resource::{Ports, Resource};
use crate::simulator::Simulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Interleaving,
    Blocking,
}

impl TransferMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "interleaving" => Ok(Self::Interleaving),
            "blocking" => Ok(Self::Blocking),
            _ => Err(SimError::InvalidTransferMode),
        }
    }
}

#[derive(Debug)]
pub struct Channel {
    name: String,
    pub bandwidth: u64,
    pub latency: u64,
    pub transfer_mode: TransferMode,
    ports: Ports,

    ticks: u64,
    busy_ticks: u64,
    active_count: usize,
    last_finalized_tick: Option<u64>,
    backpressured: bool,
}

impl Channel {
    pub fn new(name: impl Into<String>, bandwidth: u64, latency: u64, transfer_mode: TransferMode) -> Result<Self> {
        if bandwidth == 0 {
            return Err(SimError::InvalidBandwidth(bandwidth));
        }
        Ok(Self {
            name: name.into(),
            bandwidth,
            latency,
            transfer_mode,
            ports: Ports::new(&["in"], &["out"]),
            ticks: 0,
            busy_ticks: 0,
            active_count: 0,
            last_finalized_tick: None,
            backpressured: false,
        })
    }

    pub fn is_interleaving(&self) -> bool {
        self.transfer_mode == TransferMode::Interleaving
    }

    pub fn is_blocking(&self) -> bool {
        self.transfer_mode == TransferMode::Blocking
    }

    pub fn current_bandwidth(&self) -> u64 {
        if self.backpressured {
            0
        } else {
            self.bandwidth
        }
    }

    pub fn set_backpressure(&mut self, flag: bool) {
        self.backpressured = flag;
    }

    pub fn estimate_ticks(&self, size: u64) -> u64 {
        let bw = self.current_bandwidth();
        if bw == 0 {
            return u64::MAX / 2;
        }
        let data_ticks = size.max(1).div_ceil(bw);
        self.latency + data_ticks
    }

    pub fn set_active_state(&mut self, active_count: usize) {
        self.active_count = active_count;
    }

    pub fn avg_occupancy(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.busy_ticks as f64 / self.ticks as f64
        }
    }
}

impl Resource for Channel {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, _sim: &mut Simulator) {
        while let Some(msg) = self.ports.recv("in") {
            self.ports.send("out", msg);
        }
    }

    fn finalize_tick(&mut self, sim: &mut Simulator) {
        if self.last_finalized_tick == Some(sim.ticks) {
            return;
        }
        self.ticks += 1;
        if self.active_count > 0 {
            self.busy_ticks += 1;
        }
        self.last_finalized_tick = Some(sim.ticks);
    }

    delegate_ports!(ports);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_bandwidth() {
        assert!(Channel::new("c0", 0, 1, TransferMode::Interleaving).is_err());
    }

    #[test]
    fn backpressure_zeroes_current_bandwidth() {
        let mut c = Channel::new("c0", 64, 2, TransferMode::Interleaving).unwrap();
        assert_eq!(c.current_bandwidth(), 64);
        c.set_backpressure(true);
        assert_eq!(c.current_bandwidth(), 0);
        assert_eq!(c.estimate_ticks(128), u64::MAX / 2);
    }

    #[test]
    fn estimate_ticks_matches_bandwidth_and_latency() {
        let c = Channel::new("c0", 10, 3, TransferMode::Blocking).unwrap();
        assert_eq!(c.estimate_ticks(25), 3 + 3);
        assert_eq!(c.estimate_ticks(1), 3 + 1);
    }
}
