//! # Coalescer Error Types
//!
//! Only programming errors are errors here. Duplicate registrations,
//! requests for unknown targets and requests during a render are defined
//! no-ops and never show up in this module.

use thiserror::Error;

/// Invalid level-of-detail, shading or configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Requested LOD is outside `[0, max_lod]`.
    #[error("level of detail {lod} out of range: max is {max_lod}")]
    LodOutOfRange {
        /// The rejected LOD.
        lod: u32,
        /// The current maximum LOD.
        max_lod: u32,
    },

    /// Shading flag index does not address a stored LOD.
    #[error("shading index {index} out of range: {len} levels stored")]
    ShadingIndexOutOfRange {
        /// The rejected index.
        index: u32,
        /// Number of stored shading flags.
        len: usize,
    },

    /// Highest LOD exceeds what the settings can store.
    #[error("max level of detail {max_lod} exceeds the limit of {limit}")]
    MaxLodTooLarge {
        /// The rejected maximum.
        max_lod: u32,
        /// The largest accepted maximum.
        limit: u32,
    },

    /// Number of LODs must be at least one.
    #[error("invalid number of levels of detail: {0}")]
    InvalidLodCount(u32),

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(String),
}

/// Access to the process-wide coalescer in an invalid order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    /// Shutdown was requested but no instance exists.
    #[error("no coalescer instance exists")]
    NotInstantiated,

    /// Explicit init was requested but an instance already exists.
    #[error("coalescer instance already exists")]
    AlreadyInstantiated,

    /// The instance was shut down; it cannot be recreated in this process.
    #[error("coalescer instance was shut down")]
    TornDown,
}

/// Any error raised by the coalescer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoalescerError {
    /// See [`ConfigurationError`].
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// See [`LifecycleError`].
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Result type for coalescer operations.
pub type CoalescerResult<T> = Result<T, CoalescerError>;
