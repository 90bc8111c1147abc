//! # Resource
//!
//! The common contract every topology node implements: named input/output
//! port queues plus a per-tick callback. The simulator never downcasts a
//! `Resource` — all component-specific behavior lives behind this trait.

use std::collections::{HashMap, VecDeque};

use crate::databuffer::DataBuffer;
use crate::message::Message;
use crate::simulator::Simulator;

/// A node in the topology. `tick` runs every cycle in resource-registration
/// order; `finalize_tick` runs afterwards, once every resource (and every
/// link) has ticked, for bookkeeping that must see the whole cycle's
/// movement (occupancy averages, trigger delivery, ...).
pub trait Resource {
    fn name(&self) -> &str;

    /// Short type name for display purposes, analogous to Python's
    /// `__class__.__name__` (spec §6, `archsim/display.py`). Default strips
    /// the module path off `std::any::type_name`; no resource needs to
    /// override it.
    fn kind(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Advance this resource by one tick. Resources read from their own
    /// `in` queues and push onto their own `out` queues; the simulator moves
    /// whatever lands in an `out` queue across the connecting link or
    /// channel on the next phase.
    fn tick(&mut self, sim: &mut Simulator);

    /// Runs once per tick after every resource and link has ticked. Default
    /// no-op; components with end-of-cycle bookkeeping (occupancy sampling,
    /// deferred trigger delivery) override it.
    fn finalize_tick(&mut self, _sim: &mut Simulator) {}

    fn in_queues(&self) -> &HashMap<String, VecDeque<Message>>;
    fn in_queues_mut(&mut self) -> &mut HashMap<String, VecDeque<Message>>;
    fn out_queues(&self) -> &HashMap<String, VecDeque<Message>>;
    fn out_queues_mut(&mut self) -> &mut HashMap<String, VecDeque<Message>>;

    /// Delivers a buffer that finished arriving on the named logical queue
    /// (producer/consumer inbox, not a port). Default no-op: most resources
    /// never receive buffers this way. Processing elements with a buffer
    /// inbox (generators, compute units, producers/consumers) override it.
    fn deliver_buffer(&mut self, _queue: &str, _buffer: DataBuffer) {}

    /// Whether this resource holds any in-flight data beyond what's visible
    /// in its port queues - a latency pipeline stage, an inflight reply, an
    /// admitted-but-not-yet-arrived transfer. Default `true`: most resources
    /// keep no such hidden state and are fully described by their queues.
    /// Quiescence (`Simulator::is_quiescent`) folds this in so a resource
    /// mid-latency doesn't get mistaken for idle just because its queues
    /// happen to be empty between ticks.
    fn is_idle(&self) -> bool {
        true
    }
}

/// Shared port-queue storage, embedded by every concrete resource. Not a
/// trait itself: resources hold a `Ports` field and delegate the
/// `in_queues`/`out_queues` trait methods to it, the way the teacher's
/// transports delegate their buffered-read/write plumbing to a shared inner
/// type.
#[derive(Debug, Default)]
pub struct Ports {
    pub inputs: HashMap<String, VecDeque<Message>>,
    pub outputs: HashMap<String, VecDeque<Message>>,
}

impl Ports {
    pub fn new(input_names: &[&str], output_names: &[&str]) -> Self {
        let mut inputs = HashMap::new();
        for name in input_names {
            inputs.insert(name.to_string(), VecDeque::new());
        }
        let mut outputs = HashMap::new();
        for name in output_names {
            outputs.insert(name.to_string(), VecDeque::new());
        }
        Self { inputs, outputs }
    }

    /// Push a message onto a named output queue. Panics if `port` was never
    /// declared — a resource addressing a port it doesn't own is a
    /// construction bug, not a runtime condition.
    pub fn send(&mut self, port: &str, msg: Message) {
        self.outputs
            .get_mut(port)
            .unwrap_or_else(|| panic!("unknown output port '{port}'"))
            .push_back(msg);
    }

    pub fn recv(&mut self, port: &str) -> Option<Message> {
        self.inputs.get_mut(port).and_then(|q| q.pop_front())
    }

    pub fn peek_in(&self, port: &str) -> Option<&Message> {
        self.inputs.get(port).and_then(|q| q.front())
    }

    pub fn in_len(&self, port: &str) -> usize {
        self.inputs.get(port).map(|q| q.len()).unwrap_or(0)
    }

    pub fn out_len(&self, port: &str) -> usize {
        self.outputs.get(port).map(|q| q.len()).unwrap_or(0)
    }

    pub fn push_in(&mut self, port: &str, msg: Message) {
        self.inputs
            .entry(port.to_string())
            .or_default()
            .push_back(msg);
    }
}

/// Convenience macro-free delegation: concrete resources implement these
/// four methods with one line each, forwarding to an embedded `Ports`.
#[macro_export]
macro_rules! delegate_ports {
    ($field:ident) => {
        fn in_queues(&self) -> &std::collections::HashMap<String, std::collections::VecDeque<$crate::message::Message>> {
            &self.$field.inputs
        }
        fn in_queues_mut(
            &mut self,
        ) -> &mut std::collections::HashMap<String, std::collections::VecDeque<$crate::message::Message>> {
            &mut self.$field.inputs
        }
        fn out_queues(&self) -> &std::collections::HashMap<String, std::collections::VecDeque<$crate::message::Message>> {
            &self.$field.outputs
        }
        fn out_queues_mut(
            &mut self,
        ) -> &mut std::collections::HashMap<String, std::collections::VecDeque<$crate::message::Message>> {
            &mut self.$field.outputs
        }
    };
}
