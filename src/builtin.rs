//! # Built-in example topology
//!
//! When the CLI is invoked with no `config` library, it wires up this small
//! topology instead: one [`Compute`] issuing reads through a [`ReadBus`] to
//! a [`Memory`], the way a benchmark binary falls back to a sensible default
//! configuration rather than refusing to run with no topology at all.
//!
//! This mirrors a small end-to-end scenario (`total_requests=50,
//! request_size=64`), sized down so a quiet default run finishes in well
//! under the default `--max-ticks 200`.

use crate::bus::ReadBus;
use crate::buffer_pool::BufferPool;
use crate::memory::Memory;
use crate::metrics::Metrics;
use crate::pe::Compute;
use crate::simulator::Simulator;
use crate::topology::Topology;

/// Requester name used by the built-in compute unit; also the bus's
/// requester key (`in_cpu0`/`out_cpu0`).
const CPU: &str = "cpu0";
const BUS: &str = "rbus";
const MEM: &str = "mem0";

/// Bandwidth high enough that it never gates the demo topology. The
/// `ReadBus`'s own `read_request_latency`/`data_response_latency` pipelines
/// are what shape timing here, not the connecting links.
const LINK_BANDWIDTH: u64 = 1 << 20;

/// Build the default demo topology: `cpu0` issues 50 64-byte reads one per
/// tick through `rbus` (request latency 5, response latency 5, response
/// bandwidth 128) to `mem0` (latency 10, one request serviced per tick).
pub fn default_topology() -> Simulator {
    let mut topology = Topology::new();

    let cpu = Compute::new(CPU, 50, 64, 1);
    let mut bus = ReadBus::new(BUS, 5, 5, 128);
    bus.add_requester(CPU);
    let mem = Memory::new(MEM).with_latency(10).with_max_issue_per_tick(1);

    topology.add(Box::new(cpu)).expect("cpu0 is the first resource registered");
    topology.add(Box::new(bus)).expect("rbus is the first resource registered");
    topology.add(Box::new(mem)).expect("mem0 is the first resource registered");

    topology
        .connect(CPU, "out", BUS, format!("in_{CPU}"), LINK_BANDWIDTH, 0)
        .expect("bandwidth is nonzero");
    topology
        .connect(BUS, "out_req", MEM, "in", LINK_BANDWIDTH, 0)
        .expect("bandwidth is nonzero");
    topology
        .connect(MEM, "out", BUS, "in_mem_resp", LINK_BANDWIDTH, 0)
        .expect("bandwidth is nonzero");
    topology
        .connect(BUS, format!("out_{CPU}"), CPU, "in", LINK_BANDWIDTH, 0)
        .expect("bandwidth is nonzero");

    Simulator::new(topology, BufferPool::new(), Metrics::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topology_delivers_every_request() {
        let mut sim = default_topology();
        sim.run(300, false);
        let cpu = sim
            .topology
            .resources
            .get(CPU)
            .expect("cpu0 was registered");
        // Compute doesn't expose progress() through the trait object; the
        // end-to-end assertion lives in the integration test instead. Here
        // we just confirm the topology ran without the bus/memory stalling
        // it into an unreachable state.
        let _ = cpu;
        assert!(sim.metrics.messages_delivered >= 100);
        assert!(sim.ticks <= 300);
    }

    #[test]
    fn default_topology_reaches_quiescence() {
        let mut sim = default_topology();
        sim.run(300, true);
        assert!(sim.is_quiescent());
    }
}
