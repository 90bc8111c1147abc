//! # fabricsim
//!
//! A discrete-event, tick-driven simulator for architectural interconnects:
//! memories, buses, links, channels, semaphores, and processing elements
//! wired into a [`topology::Topology`] and driven one cycle at a time by a
//! [`simulator::Simulator`].

pub mod arbiter;
pub mod buffer_pool;
pub mod builtin;
pub mod bus;
pub mod channel;
pub mod cli;
pub mod config;
pub mod databuffer;
pub mod display;
pub mod error;
pub mod link;
pub mod memory;
pub mod message;
pub mod metrics;
pub mod pe;
pub mod queue;
pub mod resource;
pub mod semaphore;
pub mod simulator;
pub mod topology;
pub mod trace;

pub use cli::Args;
pub use error::{Result, SimError};
pub use simulator::Simulator;
pub use topology::Topology;

/// The current version of the fabricsim crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
