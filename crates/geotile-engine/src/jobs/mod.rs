//! Background work: the job/manager interfaces and the raster build job.
//!
//! A body hands [`Job`]s to whatever [`JobManager`] the host attached. Jobs
//! never touch the body; they report back through a channel the body drains
//! under its own lock.

mod build_raster;
mod manual;
mod worker_pool;

pub use build_raster::{BuildRaster, JobOutcome};
pub use manual::ManualJobManager;
pub use worker_pool::WorkerPool;

use crate::error::JobError;

/// A unit of background work.
pub trait Job: Send {
    /// Short label for logs and thread diagnostics.
    fn name(&self) -> &str;

    /// Run the job to completion, consuming it.
    fn execute(self: Box<Self>);
}

/// Executes jobs, typically on other threads.
pub trait JobManager: Send + Sync {
    /// Queue a job. Implementations must eventually execute or drop it.
    fn add_job(&self, job: Box<dyn Job>) -> Result<(), JobError>;

    /// Jobs accepted but not yet finished.
    fn pending(&self) -> usize;
}
