//! # Error Taxonomy
//!
//! Construction-time mistakes (bad bandwidth, duplicate resource names, zero-size
//! buffers, ...) are programming errors and fail loudly through [`SimError`].
//! Everything that can legitimately happen during a running simulation — an
//! unresolved destination port, a malformed trigger, an out-of-range semaphore
//! index — is a silent drop deep inside the relevant component, never an `Err`
//! here. See the crate-level docs for the full policy.

use thiserror::Error;

/// Errors raised while building or driving a [`crate::simulator::Simulator`].
#[derive(Debug, Error)]
pub enum SimError {
    #[error("bandwidth must be > 0, got {0}")]
    InvalidBandwidth(u64),

    #[error("latency must be >= 0, got {0}")]
    InvalidLatency(i64),

    #[error("resource with name '{0}' already exists in this topology")]
    DuplicateResource(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("transfer_mode must be 'interleaving' or 'blocking'")]
    InvalidTransferMode,

    #[error("size must be > 0")]
    InvalidSize,

    #[error("semaphore count must be > 0")]
    InvalidSemaphoreCount,

    #[error("unknown buffer id '{0}'")]
    UnknownBuffer(String),

    #[error("a PE requires at least one input and one output queue")]
    InvalidPortCount,

    #[error("config library '{0}' does not export a `build` symbol")]
    ConfigSymbolMissing(String),

    #[error("failed to load config library '{0}': {1}")]
    ConfigLoadFailed(String, String),
}

pub type Result<T> = std::result::Result<T, SimError>;
