//! A job manager that only runs jobs when told to.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::JobError;
use crate::jobs::{Job, JobManager};

/// Queues jobs until the host runs them explicitly.
///
/// Useful for single-threaded hosts that pump work between frames, and for
/// driving job completion order deterministically.
#[derive(Default)]
pub struct ManualJobManager {
    queue: Mutex<VecDeque<Box<dyn Job>>>,
}

impl ManualJobManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Box<dyn Job>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.queue().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Run the oldest job. Returns `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        let job = self.queue().pop_front();
        match job {
            Some(job) => {
                job.execute();
                true
            }
            None => false,
        }
    }

    /// Run the newest job first.
    pub fn run_last(&self) -> bool {
        let job = self.queue().pop_back();
        match job {
            Some(job) => {
                job.execute();
                true
            }
            None => false,
        }
    }

    /// Run every queued job in submission order, including jobs queued while running.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Take all queued jobs without running them.
    pub fn take_all(&self) -> Vec<Box<dyn Job>> {
        self.queue().drain(..).collect()
    }

    /// Drop every queued job unexecuted. Returns how many were dropped.
    pub fn discard_all(&self) -> usize {
        self.take_all().len()
    }
}

impl JobManager for ManualJobManager {
    fn add_job(&self, job: Box<dyn Job>) -> Result<(), JobError> {
        self.queue().push_back(job);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Push {
        id: usize,
        log: Arc<Mutex<Vec<usize>>>,
    }

    impl Job for Push {
        fn name(&self) -> &str {
            "push"
        }

        fn execute(self: Box<Self>) {
            self.log.lock().unwrap().push(self.id);
        }
    }

    struct Count(Arc<AtomicUsize>);

    impl Job for Count {
        fn name(&self) -> &str {
            "count"
        }

        fn execute(self: Box<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_run_order() {
        let manager = ManualJobManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            manager.add_job(Box::new(Push { id, log: Arc::clone(&log) })).unwrap();
        }
        assert_eq!(manager.pending(), 3);
        assert!(manager.run_last());
        assert_eq!(manager.run_all(), 2);
        assert_eq!(*log.lock().unwrap(), vec![2, 0, 1]);
        assert!(!manager.run_next());
    }

    #[test]
    fn test_discard_drops_without_running() {
        let manager = ManualJobManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        manager.add_job(Box::new(Count(Arc::clone(&counter)))).unwrap();
        manager.add_job(Box::new(Count(Arc::clone(&counter)))).unwrap();
        assert_eq!(manager.discard_all(), 2);
        assert!(manager.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_take_all_hands_jobs_back() {
        let manager = ManualJobManager::new();
        let counter = Arc::new(AtomicUsize::new(0));
        manager.add_job(Box::new(Count(Arc::clone(&counter)))).unwrap();
        let jobs = manager.take_all();
        assert_eq!(jobs.len(), 1);
        for job in jobs {
            assert_eq!(job.name(), "count");
            job.execute();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
