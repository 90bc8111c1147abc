//! # Simulator
//!
//! The driver loop. Owns the [`Topology`], the [`BufferPool`], and the
//! running [`Metrics`], and ticks every component in a fixed phase order
//! each cycle:
//!
//! 1. every [`Resource`] ticks, in registration order
//! 2. every [`Channel`] ticks (pass-through `in -> out`)
//! 3. every [`Link`] ticks (bandwidth-limited pipeline)
//! 4. the tick counter advances
//! 5. the buffer pool advances: trigger-fired semaphore messages and
//!    newly-arrived buffers are delivered
//! 6. every resource and channel's `finalize_tick` runs
//! 7. the tracer, if any, observes the tick
//!
//! Resources live behind `Box<dyn Resource>` inside the topology, so ticking
//! one requires a `&mut Simulator` while the resource itself sits inside
//! `self.topology.resources`. Each phase below takes the resource (or link)
//! out of its collection, ticks it with `self` as the simulator reference,
//! then puts it back — the same "own it, recurse, return it" pattern the
//! teacher uses wherever a component needs mutable access to the thing that
//! contains it.

use std::collections::VecDeque;

use crate::buffer_pool::BufferPool;
use crate::channel::Channel;
use crate::databuffer::DataBuffer;
use crate::message::Message;
use crate::metrics::Metrics;
use crate::topology::Topology;
use crate::trace::Tracer;

pub struct Simulator {
    pub topology: Topology,
    pub buffer_pool: BufferPool,
    pub metrics: Metrics,
    pub ticks: u64,
    tracer: Option<Box<dyn Tracer>>,
}

impl Simulator {
    pub fn new(topology: Topology, buffer_pool: BufferPool, metrics: Metrics) -> Self {
        Self {
            topology,
            buffer_pool,
            metrics,
            ticks: 0,
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: Box<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn set_tracer(&mut self, tracer: Option<Box<dyn Tracer>>) {
        self.tracer = tracer;
    }

    /// Push a message onto a resource or channel's named `in` port. Silent
    /// no-op if `dst` doesn't exist — an unresolved destination is a routing
    /// condition the simulator tolerates, not a construction-time error.
    pub fn deliver(&mut self, dst: &str, port: &str, msg: Message) {
        if let Some(resource) = self.topology.resources.get_mut(dst) {
            resource.in_queues_mut().entry(port.to_string()).or_default().push_back(msg);
            return;
        }
        if let Some(channel) = self.topology.channels.get_mut(dst) {
            channel.in_queues_mut().entry(port.to_string()).or_default().push_back(msg);
        }
    }

    /// Hand an arrived buffer to a resource's logical buffer inbox (not a
    /// message port). Silent no-op if `name` doesn't exist or never
    /// overrides [`crate::resource::Resource::deliver_buffer`].
    pub fn deliver_buffer(&mut self, name: &str, queue: &str, buffer: DataBuffer) {
        if let Some(resource) = self.topology.resources.get_mut(name) {
            resource.deliver_buffer(queue, buffer);
        }
    }

    pub fn resource_out_queue_mut(&mut self, name: &str, port: &str) -> Option<&mut VecDeque<Message>> {
        if let Some(resource) = self.topology.resources.get_mut(name) {
            return resource.out_queues_mut().get_mut(port);
        }
        if let Some(channel) = self.topology.channels.get_mut(name) {
            return channel.out_queues_mut().get_mut(port);
        }
        None
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.topology.channels.get(name)
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.topology.channels.get_mut(name)
    }

    fn tick_resources(&mut self) {
        let order = self.topology.resource_order().to_vec();
        for name in order {
            if let Some(mut resource) = self.topology.resources.remove(&name) {
                resource.tick(self);
                self.topology.resources.insert(name, resource);
            }
        }
    }

    fn tick_channels(&mut self) {
        let order = self.topology.channel_order().to_vec();
        for name in order {
            if let Some(mut channel) = self.topology.channels.remove(&name) {
                channel.tick(self);
                self.topology.channels.insert(name, channel);
            }
        }
    }

    fn tick_links(&mut self) {
        let mut links = std::mem::take(&mut self.topology.links);
        for link in &mut links {
            link.tick(self);
        }
        self.topology.links = links;
    }

    fn finalize_resources_and_channels(&mut self) {
        let order = self.topology.resource_order().to_vec();
        for name in order {
            if let Some(mut resource) = self.topology.resources.remove(&name) {
                resource.finalize_tick(self);
                self.topology.resources.insert(name, resource);
            }
        }
        let order = self.topology.channel_order().to_vec();
        for name in order {
            if let Some(mut channel) = self.topology.channels.remove(&name) {
                channel.finalize_tick(self);
                self.topology.channels.insert(name, channel);
            }
        }
    }

    /// Advance the simulation by exactly one tick.
    pub fn tick(&mut self) {
        self.tick_resources();
        self.tick_channels();
        self.tick_links();

        self.ticks += 1;
        self.metrics.ticks = self.ticks;

        let result = self.buffer_pool.tick(self.ticks);
        for pending in result.sem_messages {
            self.deliver(&pending.station, "in", pending.message);
        }
        for (pe, queue, buffer) in result.buffer_arrivals {
            self.deliver_buffer(&pe, &queue, buffer);
        }

        self.finalize_resources_and_channels();

        if let Some(mut tracer) = self.tracer.take() {
            tracer.on_tick(self);
            self.tracer = Some(tracer);
        }
    }

    /// Run up to `max_ticks` cycles, stopping early if `until_quiescent` is
    /// set and every queue and pipeline has drained.
    pub fn run(&mut self, max_ticks: u64, until_quiescent: bool) {
        for _ in 0..max_ticks {
            self.tick();
            if until_quiescent && self.is_quiescent() {
                break;
            }
        }
    }

    /// True once every port queue, channel queue, and link pipeline stage is
    /// empty — nothing left to move, and nothing will arrive without a new
    /// external message.
    pub fn is_quiescent(&self) -> bool {
        let resources_idle = self.topology.resources.values().all(|r| {
            r.in_queues().values().all(|q| q.is_empty())
                && r.out_queues().values().all(|q| q.is_empty())
                && r.is_idle()
        });
        let channels_idle = self.topology.channels.values().all(|c| {
            c.in_queues().values().all(|q| q.is_empty()) && c.out_queues().values().all(|q| q.is_empty())
        });
        let links_idle = self.topology.links.iter().all(|l| l.is_idle());
        resources_idle && channels_idle && links_idle && !self.buffer_pool.has_pending_arrivals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TransferMode;
    use crate::message::{MessageKind, MessagePayload};
    use crate::semaphore::SemaphoreStation;

    fn stub() -> Simulator {
        Simulator::new(Topology::new(), BufferPool::new(), Metrics::default())
    }

    #[test]
    fn deliver_routes_to_resource_in_queue() {
        let mut sim = stub();
        sim.topology.add(Box::new(SemaphoreStation::new("sem0", 1).unwrap())).unwrap();
        let msg = Message::new(
            "a",
            "sem0",
            1,
            MessageKind::SemSignal,
            MessagePayload::SemOp { index: 0, buffer_id: None, state: None },
            0,
        );
        sim.deliver("sem0", "in", msg);
        sim.tick();
        let sem = sim.topology.resources.get("sem0").unwrap();
        assert_eq!(sem.out_queues().get("out").unwrap().len(), 1);
    }

    #[test]
    fn quiescent_with_no_resources_is_true() {
        let sim = stub();
        assert!(sim.is_quiescent());
    }

    #[test]
    fn tick_advances_counter_and_metrics() {
        let mut sim = stub();
        sim.tick();
        sim.tick();
        assert_eq!(sim.ticks, 2);
        assert_eq!(sim.metrics.ticks, 2);
    }

    #[test]
    fn channel_registration_allows_lookup_after_tick() {
        let mut sim = stub();
        sim.topology
            .add_channel(Channel::new("ch0", 8, 1, TransferMode::Interleaving).unwrap())
            .unwrap();
        sim.tick();
        assert!(sim.channel("ch0").is_some());
    }
}
