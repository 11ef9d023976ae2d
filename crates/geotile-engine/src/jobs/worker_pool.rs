//! Fixed-size pool of named worker threads executing [`Job`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError, bounded};
use geotile_config::JobsConfig;
use tracing::{debug, trace};

use crate::error::JobError;
use crate::jobs::{Job, JobManager};

/// A [`JobManager`] backed by OS threads and a bounded queue.
///
/// Submissions beyond the queue capacity are rejected with
/// [`JobError::QueueFull`] rather than blocking the caller. Dropping the pool
/// lets queued jobs finish, then joins the workers.
pub struct WorkerPool {
    /// `None` once shut down.
    sender: Option<Sender<Box<dyn Job>>>,
    handles: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `thread_count` workers (at least one) sharing a queue of `capacity` jobs.
    pub fn new(thread_count: usize, capacity: usize) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<Box<dyn Job>>(capacity.max(1));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let thread_count = thread_count.max(1);
        let mut handles = Vec::with_capacity(thread_count);
        for i in 0..thread_count {
            let receiver = receiver.clone();
            let in_flight = Arc::clone(&in_flight);
            let handle = std::thread::Builder::new()
                .name(format!("geotile-job-{i}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        trace!(job = job.name(), "executing");
                        job.execute();
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                    }
                })?;
            handles.push(handle);
        }
        debug!(threads = thread_count, capacity, "worker pool started");

        Ok(Self {
            sender: Some(sender),
            handles,
            in_flight,
        })
    }

    /// Size the pool from configuration; zero threads means one per spare core.
    pub fn from_config(config: &JobsConfig) -> std::io::Result<Self> {
        let threads = match config.worker_threads {
            0 => default_thread_count(),
            n => n,
        };
        Self::new(threads, config.queue_capacity)
    }

    /// A pool sized to the machine: all cores but two, at least one.
    pub fn with_defaults() -> std::io::Result<Self> {
        Self::new(default_thread_count(), 256)
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Stop accepting jobs, drain the queue, and join all workers.
    pub fn shutdown(&mut self) {
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn default_thread_count() -> usize {
    let cpus = num_cpus::get().max(2);
    (cpus - 2).max(1)
}

impl JobManager for WorkerPool {
    fn add_job(&self, job: Box<dyn Job>) -> Result<(), JobError> {
        let sender = self.sender.as_ref().ok_or(JobError::ShutDown)?;
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        sender.try_send(job).map_err(|e| {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            match e {
                TrySendError::Full(_) => JobError::QueueFull,
                TrySendError::Disconnected(_) => JobError::ShutDown,
            }
        })
    }

    fn pending(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
