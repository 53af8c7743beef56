/*!
 * Bounded worker pool
 *
 * Producer/consumer execution of independent sync actions: a bounded jobs
 * channel feeds N worker threads that publish onto a results channel.
 * Stopping closes the jobs channel, drains in-flight work, then lets the
 * results channel disconnect.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

use crate::cancel::CancelToken;
use crate::error::SyncError;

/// What the pool needs to know about a finished job to keep its counters
pub trait PoolResult: Send + 'static {
    fn succeeded(&self) -> bool;
    fn bytes_processed(&self) -> u64;
}

pub type PoolJob<T> = Box<dyn FnOnce() -> T + Send + 'static>;

/// Atomic throughput counters, shared with the workers
#[derive(Debug, Default)]
pub struct PoolCounters {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub bytes_processed: AtomicU64,
}

pub struct WorkerPool<T: PoolResult> {
    jobs_tx: Option<Sender<PoolJob<T>>>,
    results_rx: Receiver<T>,
    handles: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
    cancel: CancelToken,
}

impl<T: PoolResult> WorkerPool<T> {
    /// Spawn `num_workers` threads consuming from a jobs queue of
    /// `queue_capacity`
    pub fn start(num_workers: usize, queue_capacity: usize, cancel: CancelToken) -> Self {
        let workers = num_workers.max(1);
        let (jobs_tx, jobs_rx) = bounded::<PoolJob<T>>(queue_capacity.max(workers));
        let (results_tx, results_rx) = unbounded::<T>();
        let counters = Arc::new(PoolCounters::default());

        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let jobs_rx = jobs_rx.clone();
            let results_tx = results_tx.clone();
            let counters = counters.clone();
            handles.push(
                thread::Builder::new()
                    .name(format!("sync-worker-{index}"))
                    .spawn(move || {
                        for job in jobs_rx.iter() {
                            let outcome = job();
                            counters.completed.fetch_add(1, Ordering::Relaxed);
                            if outcome.succeeded() {
                                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                            } else {
                                counters.failed.fetch_add(1, Ordering::Relaxed);
                            }
                            counters
                                .bytes_processed
                                .fetch_add(outcome.bytes_processed(), Ordering::Relaxed);
                            if results_tx.send(outcome).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn worker thread"),
            );
        }
        // workers hold their own clones; dropping ours lets the results
        // channel disconnect once they finish
        drop(results_tx);

        Self {
            jobs_tx: Some(jobs_tx),
            results_rx,
            handles,
            counters,
            cancel,
        }
    }

    /// Queue one job; `false` when the pool is stopped or cancelled
    pub fn submit(&self, job: PoolJob<T>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Some(tx) = &self.jobs_tx else {
            return false;
        };
        match tx.send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => false,
        }
    }

    /// Non-blocking variant of `submit`
    pub fn try_submit(&self, job: PoolJob<T>) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() || self.jobs_tx.is_none() {
            return Err(SyncError::PoolClosed);
        }
        let tx = self.jobs_tx.as_ref().unwrap();
        match tx.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SyncError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(SyncError::PoolClosed),
        }
    }

    /// Results arrive here as workers finish; disconnects after `stop`
    pub fn results(&self) -> &Receiver<T> {
        &self.results_rx
    }

    pub fn counters(&self) -> &PoolCounters {
        &self.counters
    }

    /// Close the jobs channel and wait for in-flight work to drain
    ///
    /// Idempotent; `submit` after `stop` is rejected.
    pub fn stop(&mut self) {
        if let Some(tx) = self.jobs_tx.take() {
            drop(tx);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<T: PoolResult> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Outcome {
        ok: bool,
        bytes: u64,
    }

    impl PoolResult for Outcome {
        fn succeeded(&self) -> bool {
            self.ok
        }
        fn bytes_processed(&self) -> u64 {
            self.bytes
        }
    }

    #[test]
    fn executes_all_submitted_jobs() {
        let mut pool: WorkerPool<Outcome> = WorkerPool::start(4, 16, CancelToken::new());
        for i in 0..20u64 {
            assert!(pool.submit(Box::new(move || Outcome {
                ok: true,
                bytes: i,
            })));
        }
        pool.stop();

        let results: Vec<Outcome> = pool.results().iter().collect();
        assert_eq!(results.len(), 20);
        assert_eq!(pool.counters().submitted.load(Ordering::Relaxed), 20);
        assert_eq!(pool.counters().completed.load(Ordering::Relaxed), 20);
        assert_eq!(pool.counters().succeeded.load(Ordering::Relaxed), 20);
        assert_eq!(
            pool.counters().bytes_processed.load(Ordering::Relaxed),
            (0..20).sum::<u64>()
        );
    }

    #[test]
    fn counts_failures_separately() {
        let mut pool: WorkerPool<Outcome> = WorkerPool::start(2, 8, CancelToken::new());
        for i in 0..10u64 {
            pool.submit(Box::new(move || Outcome {
                ok: i % 2 == 0,
                bytes: 0,
            }));
        }
        pool.stop();
        let _ = pool.results().iter().count();

        assert_eq!(pool.counters().succeeded.load(Ordering::Relaxed), 5);
        assert_eq!(pool.counters().failed.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn submit_after_stop_is_rejected() {
        let mut pool: WorkerPool<Outcome> = WorkerPool::start(1, 4, CancelToken::new());
        pool.stop();
        assert!(!pool.submit(Box::new(|| Outcome { ok: true, bytes: 0 })));
        assert!(matches!(
            pool.try_submit(Box::new(|| Outcome { ok: true, bytes: 0 })),
            Err(SyncError::PoolClosed)
        ));
    }

    #[test]
    fn submit_after_cancel_is_rejected() {
        let cancel = CancelToken::new();
        let pool: WorkerPool<Outcome> = WorkerPool::start(1, 4, cancel.clone());
        cancel.cancel();
        assert!(!pool.submit(Box::new(|| Outcome { ok: true, bytes: 0 })));
    }

    #[test]
    fn stop_is_idempotent_and_drains_in_flight_work() {
        let mut pool: WorkerPool<Outcome> = WorkerPool::start(2, 8, CancelToken::new());
        for _ in 0..4 {
            pool.submit(Box::new(|| {
                thread::sleep(Duration::from_millis(10));
                Outcome { ok: true, bytes: 1 }
            }));
        }
        pool.stop();
        pool.stop();

        assert_eq!(pool.results().iter().count(), 4);
        assert_eq!(pool.counters().completed.load(Ordering::Relaxed), 4);
    }
}
