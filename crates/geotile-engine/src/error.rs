//! Error types for the tile engine.
//!
//! Only [`BodyError`] crosses the body's boundary, and only for configuration
//! mistakes. Layer and job failures are absorbed into tile dirty state.

use thiserror::Error;

/// A raster or elevation layer could not produce data for a request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayerError {
    /// The layer does not serve imagery (e.g. an elevation-only layer).
    #[error("layer `{layer}` has no imagery")]
    NoImagery {
        /// Layer name.
        layer: String,
    },

    /// The layer serves imagery but failed for this request.
    #[error("layer `{layer}` unavailable: {reason}")]
    Unavailable {
        /// Layer name.
        layer: String,
        /// Why the request failed.
        reason: String,
    },
}

/// A job manager refused a job.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum JobError {
    /// The queue is at capacity; try again next frame.
    #[error("job queue is full")]
    QueueFull,

    /// The manager has been shut down.
    #[error("job manager is shut down")]
    ShutDown,
}

/// Errors surfaced by [`Body`](crate::Body) operations.
#[derive(Debug, Error)]
pub enum BodyError {
    /// A raster request was made before a job manager was attached.
    #[error("job manager is not attached")]
    NoJobManager,

    /// The job manager rejected the job.
    #[error("job rejected: {0}")]
    JobRejected(#[from] JobError),

    /// The land model could not be built from configuration.
    #[error("invalid land model: {0}")]
    Land(#[from] geotile_geo::GeoError),

    /// Persisted state could not be parsed.
    #[error("failed to parse persisted body: {0}")]
    PersistParse(#[from] ron::error::SpannedError),

    /// Persisted state could not be serialized.
    #[error("failed to serialize persisted body: {0}")]
    PersistSerialize(#[from] ron::Error),

    /// Persisted state could not be read or written.
    #[error("persisted body I/O failed: {0}")]
    PersistIo(#[from] std::io::Error),
}

impl BodyError {
    /// Whether this error is a wiring mistake rather than transient back-pressure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, BodyError::NoJobManager | BodyError::Land(_))
    }
}
