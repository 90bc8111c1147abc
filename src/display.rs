//! # Topology display
//!
//! A human-readable topology dump, printed once before a run starts so the
//! operator can sanity-check what was wired up.

use crate::resource::Resource as _;
use crate::topology::Topology;

/// Print every resource, channel, and link in `topo` to stdout.
pub fn show_topology(topo: &Topology) {
    println!("fabricsim topology:");

    println!("- resources:");
    for name in topo.resource_order() {
        let Some(resource) = topo.resources.get(name) else {
            continue;
        };
        println!("  - {name}: {}", resource.kind());
    }
    for name in topo.channel_order() {
        let Some(channel) = topo.channels.get(name) else {
            continue;
        };
        println!(
            "  - {name}: Channel (bw={}, lat={}, mode={:?})",
            channel.bandwidth, channel.latency, channel.transfer_mode
        );
    }

    println!("- links:");
    for link in &topo.links {
        println!(
            "  - {}:{} -> {}:{} (bw={}, lat={})",
            link.src, link.src_port, link.dst, link.dst_port, link.bandwidth, link.latency
        );
    }
}
