//! Bounded worker pool
//!
//! Chunk jobs run on a fixed number of workers with a bounded queue in
//! front. When the queue is full, `submit` runs the job on the submitting
//! task instead of waiting or dropping it; in-flight work is therefore
//! never more than workers + queue + the one job the submitter is running.
//! That bound is what keeps a fast listing phase from piling up fetches
//! against an already overloaded backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A boxed chunk job
pub type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Fixed-size pool with a bounded queue and caller-runs overflow
pub struct WorkerPool {
    workers: usize,
    queue: usize,
    running: Arc<Semaphore>,
    waiting: Arc<Semaphore>,
    submitted: AtomicU64,
    inline_runs: AtomicU64,
}

impl WorkerPool {
    /// Pool with `workers` concurrent jobs and `queue` waiting slots
    pub fn new(workers: usize, queue: usize) -> Self {
        let workers = workers.max(1);
        let queue = queue.max(1);
        WorkerPool {
            workers,
            queue,
            running: Arc::new(Semaphore::new(workers)),
            waiting: Arc::new(Semaphore::new(queue)),
            submitted: AtomicU64::new(0),
            inline_runs: AtomicU64::new(0),
        }
    }

    /// Hand a job to the pool
    ///
    /// Returns once the job is queued, or, when the queue is full, once the
    /// job has run to completion on this task.
    pub async fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        match Arc::clone(&self.waiting).try_acquire_owned() {
            Ok(slot) => {
                let running = Arc::clone(&self.running);
                tokio::spawn(async move {
                    // The queue slot is held until a worker permit is ours,
                    // so a job is always covered by one of the two.
                    let permit = match running.acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => return,
                    };
                    drop(slot);
                    job.await;
                    drop(permit);
                });
            }
            Err(_) => {
                debug!("queue full, running chunk job on the submitter");
                self.inline_runs.fetch_add(1, Ordering::Relaxed);
                job.await;
            }
        }
    }

    /// Wait until every queued and running job has finished
    ///
    /// Returns false when the deadline passes with jobs still in flight;
    /// the job ends anyway and the stragglers are logged.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.active() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(
                    stuck = self.active(),
                    timeout_secs = timeout.as_secs(),
                    "pool drain timed out"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Jobs currently queued or running
    pub fn active(&self) -> usize {
        (self.workers - self.running.available_permits())
            + (self.queue - self.waiting.available_permits())
    }

    /// Total jobs handed in
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Jobs the submitter had to run itself
    pub fn inline_runs(&self) -> u64 {
        self.inline_runs.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn overflow_runs_on_the_submitter() {
        let pool = WorkerPool::new(2, 2);
        let gauge = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let gauge = Arc::clone(&gauge);
            let peak = Arc::clone(&peak);
            pool.submit(async move {
                let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                gauge.fetch_sub(1, Ordering::SeqCst);
            })
            .await;
        }
        assert!(pool.drain(Duration::from_secs(10)).await);
        assert_eq!(pool.submitted(), 8);
        assert!(pool.inline_runs() >= 1, "expected caller-runs overflow");
        // Two workers plus at most the one inline job.
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn drain_times_out_on_stuck_jobs() {
        let pool = WorkerPool::new(1, 1);
        pool.submit(async {
            tokio::time::sleep(Duration::from_millis(400)).await;
        })
        .await;
        assert!(!pool.drain(Duration::from_millis(50)).await);
        assert!(pool.drain(Duration::from_secs(10)).await);
    }

    #[tokio::test]
    async fn drain_of_idle_pool_is_immediate() {
        let pool = WorkerPool::new(4, 4);
        assert!(pool.drain(Duration::from_millis(10)).await);
        assert_eq!(pool.active(), 0);
    }
}
