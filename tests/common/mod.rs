//! Shared scaffolding for integration tests that drive a handful of
//! concrete components by hand instead of through a full [`Topology`].
//!
//! `Resource` is never downcast by the simulator itself (see
//! `src/resource.rs`), so once a component is boxed into a `Topology` a test
//! can no longer get its concrete type back to read component-specific
//! state. These helpers let a test keep its components as plain owned
//! values, tick them directly, and move messages between their named ports
//! by hand - a zero-latency, unbounded-bandwidth stand-in for a `Link`.

use fabricsim::buffer_pool::BufferPool;
use fabricsim::metrics::Metrics;
use fabricsim::resource::Resource;
use fabricsim::simulator::Simulator;
use fabricsim::topology::Topology;

/// A `Simulator` with an empty topology, for tests that own their
/// components directly rather than registering them.
#[allow(dead_code)]
pub fn bare_simulator() -> Simulator {
    Simulator::new(Topology::new(), BufferPool::new(), Metrics::default())
}

/// Move every message waiting on `src`'s named output port onto `dst`'s
/// named input port.
#[allow(dead_code)]
pub fn pipe(src: &mut dyn Resource, src_port: &str, dst: &mut dyn Resource, dst_port: &str) {
    let moved: Vec<_> = src
        .out_queues_mut()
        .get_mut(src_port)
        .map(|q| q.drain(..).collect())
        .unwrap_or_default();
    if moved.is_empty() {
        return;
    }
    dst.in_queues_mut()
        .entry(dst_port.to_string())
        .or_default()
        .extend(moved);
}
