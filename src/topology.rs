//! # Topology
//!
//! The resource registry: every named [`Resource`], every [`Channel`]
//! (kept in its own map since arbiters need concrete access to its
//! scheduling API, not just the trait object), and the [`Link`]s wiring
//! them together.

use std::collections::HashMap;

use crate::channel::Channel;
use crate::error::{Result, SimError};
use crate::link::Link;
use crate::queue::QueueInfo;
use crate::resource::Resource;

#[derive(Default)]
pub struct Topology {
    pub resources: HashMap<String, Box<dyn Resource>>,
    pub channels: HashMap<String, Channel>,
    pub links: Vec<Link>,
    queues: HashMap<String, QueueInfo>,
    coord_to_uid: HashMap<String, String>,
    /// Registration order, so the simulator ticks resources and channels in
    /// a stable, reproducible order rather than at the mercy of hash-map
    /// iteration.
    resource_order: Vec<String>,
    channel_order: Vec<String>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: Box<dyn Resource>) -> Result<()> {
        let name = resource.name().to_string();
        if self.resources.contains_key(&name) || self.channels.contains_key(&name) {
            return Err(SimError::DuplicateResource(name));
        }
        self.resource_order.push(name.clone());
        self.resources.insert(name, resource);
        Ok(())
    }

    pub fn add_channel(&mut self, channel: Channel) -> Result<()> {
        use crate::resource::Resource as _;
        let name = channel.name().to_string();
        if self.resources.contains_key(&name) || self.channels.contains_key(&name) {
            return Err(SimError::DuplicateResource(name));
        }
        self.channel_order.push(name.clone());
        self.channels.insert(name, channel);
        Ok(())
    }

    pub fn resource_order(&self) -> &[String] {
        &self.resource_order
    }

    pub fn channel_order(&self) -> &[String] {
        &self.channel_order
    }

    pub fn register_queue(&mut self, info: QueueInfo) {
        self.coord_to_uid.insert(info.coordinate(), info.uid.clone());
        self.queues.insert(info.uid.clone(), info);
    }

    pub fn queue_by_uid(&self, uid: &str) -> Option<&QueueInfo> {
        self.queues.get(uid)
    }

    pub fn queue_by_coord(&self, parent: &str, direction: crate::queue::Direction, function: &str) -> Option<&QueueInfo> {
        let dir = match direction {
            crate::queue::Direction::In => "in",
            crate::queue::Direction::Out => "out",
        };
        let coord = format!("{parent}:{dir}:{function}");
        let uid = self.coord_to_uid.get(&coord)?;
        self.queues.get(uid)
    }

    pub fn connect(
        &mut self,
        src: impl Into<String>,
        src_port: impl Into<String>,
        dst: impl Into<String>,
        dst_port: impl Into<String>,
        bandwidth: u64,
        latency: u64,
    ) -> Result<()> {
        let link = Link::new(src, src_port, dst, dst_port, bandwidth, latency, None)?;
        self.links.push(link);
        Ok(())
    }
}
