//! End-to-end: a compute unit issuing reads through a read bus to a memory.
//!
//! `cpu0` issues 50 64-byte reads, one per tick, through `rbus` (request
//! latency 5, response latency 5, response bandwidth 128) to `mem0`
//! (latency 10, one request serviced per tick). Every request should be
//! issued and answered well within the default tick budget.

mod common;

use fabricsim::bus::ReadBus;
use fabricsim::memory::Memory;
use fabricsim::pe::Compute;
use fabricsim::resource::Resource;

use common::{bare_simulator, pipe};

#[test]
fn every_issued_read_is_eventually_received() {
    let mut sim = bare_simulator();

    let mut cpu = Compute::new("cpu0", 50, 64, 1);
    let mut bus = ReadBus::new("rbus", 5, 5, 128);
    bus.add_requester("cpu0");
    let mut mem = Memory::new("mem0").with_latency(10).with_max_issue_per_tick(1);

    for _ in 0..300 {
        cpu.tick(&mut sim);
        bus.tick(&mut sim);
        mem.tick(&mut sim);

        pipe(&mut cpu, "out", &mut bus, "in_cpu0");
        pipe(&mut bus, "out_req", &mut mem, "in");
        pipe(&mut mem, "out", &mut bus, "in_mem_resp");
        pipe(&mut bus, "out_cpu0", &mut cpu, "in");

        sim.ticks += 1;

        if cpu.progress() == (50, 50) {
            break;
        }
    }

    assert_eq!(cpu.progress(), (50, 50));
    assert!(sim.ticks <= 300);
}
