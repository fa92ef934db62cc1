//! Error types for zone partitioning
//!
//! Apart from `InvalidConfig`, none of these abort a batch. The orchestrator
//! matches on them to pick a recovery path and records them on the entity's
//! result.

use thiserror::Error;

/// Errors that can occur while partitioning entities into zones
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PartitionError {
    /// Configuration validation failed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input polygon has non-finite coordinates or a self-intersecting ring
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The sampler could not place as many interior points as requested
    #[error("insufficient samples: requested {requested}, produced {produced}")]
    InsufficientSamples { requested: usize, produced: usize },

    /// No accelerator could be probed
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The accelerator failed while generating a batch
    #[error("device runtime error: {0}")]
    DeviceRuntime(String),

    /// Polygon clipping failed on this input
    #[error("clipping failed: {0}")]
    ClippingFailed(String),

    /// An entity exceeded its processing budget
    #[error("entity '{entity}' timed out after {seconds}s")]
    EntityTimeout { entity: String, seconds: u64 },

    /// The worker computing an entity panicked
    #[error("worker panicked while partitioning '{entity}'")]
    WorkerPanicked { entity: String },
}

/// Result type alias for partitioning operations
pub type Result<T> = std::result::Result<T, PartitionError>;
