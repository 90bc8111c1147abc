//! End-to-end: a 4096-byte buffer lands in a memory, sits there owned, and
//! is fully freed once a `buffer_consume` arrives through a write bus.

mod common;

use fabricsim::bus::WriteBus;
use fabricsim::memory::Memory;
use fabricsim::message::{Message, MessageKind, MessagePayload};
use fabricsim::resource::Resource;

use common::{bare_simulator, pipe};

#[test]
fn consumed_buffer_is_fully_deallocated() {
    let mut sim = bare_simulator();

    let buf = sim.buffer_pool.create(4096, Some(vec![0u8; 4096]), None);
    let buffer_id = buf.id.clone();

    let mut mem = Memory::new("mem0").with_latency(10).with_max_issue_per_tick(1);
    let mut wbus = WriteBus::new("wbus", 2, 256, 2);
    wbus.add_writer("consumer");

    let transfer = Message::new(
        "gen",
        "mem0",
        buf.size,
        MessageKind::BufferTransfer,
        MessagePayload::BufferTransfer { buffer: buf },
        0,
    );
    mem.in_queues_mut()
        .entry("in".to_string())
        .or_default()
        .push_back(transfer);

    // Drive enough ticks (past the memory's own latency) for the transfer
    // to complete and ownership to land on mem0.
    for _ in 0..15 {
        mem.tick(&mut sim);
        sim.ticks += 1;
    }
    assert_eq!(sim.buffer_pool.bytes_owned(Some("mem0")), 4096);
    assert_eq!(sim.buffer_pool.owner(&buffer_id).as_deref(), Some("mem0"));

    // At tick 50, a consumer requests the buffer be freed through the
    // write bus.
    while sim.ticks < 50 {
        mem.tick(&mut sim);
        wbus.tick(&mut sim);
        pipe(&mut wbus, "out_mem", &mut mem, "in");
        pipe(&mut mem, "out", &mut wbus, "in_mem_resp");
        sim.ticks += 1;
    }

    let consume = Message::new(
        "consumer",
        "mem0",
        1,
        MessageKind::BufferConsume,
        MessagePayload::BufferConsume { buffer_id: buffer_id.clone() },
        sim.ticks,
    );
    wbus.in_queues_mut()
        .entry("in_consumer".to_string())
        .or_default()
        .push_back(consume);

    while sim.ticks < 120 {
        wbus.tick(&mut sim);
        mem.tick(&mut sim);
        pipe(&mut wbus, "out_mem", &mut mem, "in");
        pipe(&mut mem, "out", &mut wbus, "in_mem_resp");
        sim.ticks += 1;
    }

    assert_eq!(sim.buffer_pool.bytes_owned(Some("mem0")), 0);
    assert!(!sim.buffer_pool.exists(&buffer_id));
}
