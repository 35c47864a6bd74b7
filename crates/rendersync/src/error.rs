//! Host error types.

use rendersync_core::{CoalescerError, ConfigurationError};
use thiserror::Error;

/// Errors raised while wiring or driving a host loop.
#[derive(Debug, Error)]
pub enum HostError {
    /// The coalescer could not be built or reached.
    #[error(transparent)]
    Coalescer(#[from] CoalescerError),

    /// The timer thread could not be spawned.
    #[error("failed to spawn timer thread: {0}")]
    TimerSpawn(String),

    /// The host loop's channel is closed.
    #[error("host loop is no longer receiving events")]
    Disconnected,
}

impl From<ConfigurationError> for HostError {
    fn from(error: ConfigurationError) -> Self {
        Self::Coalescer(error.into())
    }
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
