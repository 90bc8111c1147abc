//! End-to-end: quiescence is not just "every port queue is empty" - a
//! resource's own latency pipeline and the buffer pool's scheduled arrivals
//! both have to drain too, since neither shows up in a queue until they fire.

use fabricsim::buffer_pool::BufferPool;
use fabricsim::memory::Memory;
use fabricsim::message::{Message, MessageKind, MessagePayload};
use fabricsim::metrics::Metrics;
use fabricsim::pe::BufferGenerator;
use fabricsim::simulator::Simulator;
use fabricsim::topology::Topology;

#[test]
fn quiescence_waits_for_memorys_own_latency_pipeline() {
    let mut topology = Topology::new();
    topology.add(Box::new(BufferGenerator::new("gen", 4096, "mem0").with_total(1))).unwrap();
    topology.add(Box::new(Memory::new("mem0").with_latency(10).with_max_issue_per_tick(1))).unwrap();
    topology.connect("gen", "out", "mem0", "in", 1_000_000, 1).unwrap();
    topology.connect("mem0", "out", "gen", "in", 1_000_000, 1).unwrap();

    let mut sim = Simulator::new(topology, BufferPool::new(), Metrics::default());

    // The generator fires its single buffer on tick 0 and the port queues
    // empty out again almost immediately, but mem0 is still holding the
    // transfer in its inflight pipeline for `latency` ticks - quiescence
    // must not be declared during that window.
    let mut saw_busy = false;
    for _ in 0..3 {
        sim.tick();
        if !sim.is_quiescent() {
            saw_busy = true;
        }
    }
    assert!(saw_busy, "memory's inflight pipeline should make the simulator non-quiescent for a few ticks");

    sim.run(30, true);
    assert!(sim.is_quiescent());
    assert_eq!(sim.buffer_pool.bytes_owned(Some("mem0")), 4096);
}

#[test]
fn quiescence_waits_for_pending_buffer_arrivals() {
    let topology = Topology::new();
    let mut pool = BufferPool::new();
    let buf = pool.create(2048, Some(vec![0u8; 2048]), None);
    pool.record_expected_arrival(&buf.id, 5);

    let mut sim = Simulator::new(topology, pool, Metrics::default());

    // No resources, no channels, no links - every queue-based check already
    // passes - but a buffer is still scheduled to arrive on tick 5.
    assert!(!sim.is_quiescent());

    for _ in 0..5 {
        sim.tick();
    }
    assert_eq!(sim.ticks, 5);
    assert!(!sim.buffer_pool.has_pending_arrivals());
    assert!(sim.is_quiescent());
}

#[test]
fn quiescence_is_immediate_for_an_unused_memory_responder() {
    let mut topology = Topology::new();
    topology
        .add(Box::new(Memory::new("mem0").with_latency(10).with_max_issue_per_tick(1)))
        .unwrap();
    let mut sim = Simulator::new(topology, BufferPool::new(), Metrics::default());

    assert!(sim.is_quiescent());

    let read = Message::new("cpu0", "mem0", 64, MessageKind::Read, MessagePayload::None, sim.ticks);
    sim.deliver("mem0", "in", read);

    sim.tick();
    assert!(!sim.is_quiescent(), "mem0's inflight reply hasn't resolved yet");

    sim.run(20, true);
    assert!(sim.is_quiescent());
}
