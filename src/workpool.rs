//! Fixed-size background worker pool.
//!
//! Runs fire-and-forget jobs for layers that push work off their hot path;
//! the sharded counter submits its shard-coalescing passes here.  Execution
//! rides a `rayon` pool; a bounded `crossbeam_channel` acts as a submit
//! semaphore so a runaway producer blocks instead of queueing unbounded
//! work, and a pending-job count with a condvar lets tests and shutdown
//! paths wait for quiet.

use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPool;
use tracing::{debug, error};

/// Handle to a pool of background workers.  Dropping the handle waits for
/// every submitted job to finish, then joins the workers.
pub struct WorkPool {
    pool: Arc<ThreadPool>,
    /// Each token in the channel is one free submission slot; submitters
    /// take a token, finished jobs return it.
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
    pending: Arc<(Mutex<usize>, Condvar)>,
}

impl WorkPool {
    /// Creates a pool of `threads` workers accepting up to `queue` queued
    /// jobs beyond the ones executing.  Both arguments must be at least 1;
    /// returns `None` if the workers cannot be spawned.
    pub fn new(threads: usize, queue: usize) -> Option<WorkPool> {
        if threads < 1 || queue < 1 {
            return None;
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .ok()?;

        // queue slots for waiting jobs plus one per worker for running ones.
        let capacity = queue + threads;
        let (slot_tx, slot_rx) = bounded(capacity);
        for _ in 0..capacity {
            slot_tx.send(()).ok()?;
        }

        Some(WorkPool {
            pool: Arc::new(pool),
            slot_tx,
            slot_rx,
            pending: Arc::new((Mutex::new(0), Condvar::new())),
        })
    }

    /// Submits one job.  Blocks while the pool is at capacity; never
    /// rejects.  The job's panics are contained by the worker thread and do
    /// not take the pool down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.slot_rx.recv().expect("workpool slot channel closed");

        // Count the job as pending before it is spawned so `quiesce` cannot
        // observe zero between submission and execution.
        {
            let (count, _) = &*self.pending;
            *count.lock().unwrap() += 1;
        }

        let pending = Arc::clone(&self.pending);
        let slot_tx = self.slot_tx.clone();
        self.pool.spawn(move || {
            // Contain panics so the slot token and pending count are always
            // restored; a lost background job must not wedge `quiesce`.
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
            if outcome.is_err() {
                error!("background job panicked");
            }

            let (count, quiet) = &*pending;
            let mut n = count.lock().unwrap();
            *n -= 1;
            if *n == 0 {
                quiet.notify_all();
            }
            drop(n);
            let _ = slot_tx.send(());
        });
    }

    /// Blocks until every submitted job has finished.  The pool stays
    /// usable afterwards.
    pub fn quiesce(&self) {
        let (count, quiet) = &*self.pending;
        let mut n = count.lock().unwrap();
        while *n > 0 {
            n = quiet.wait(n).unwrap();
        }
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        self.quiesce();
        debug!("workpool drained");
        // rayon joins its worker threads when the inner pool drops.
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn rejects_degenerate_shapes() {
        assert!(WorkPool::new(0, 1).is_none());
        assert!(WorkPool::new(1, 0).is_none());
        assert!(WorkPool::new(1, 1).is_some());
    }

    #[test]
    fn runs_every_submitted_job() {
        let pool = WorkPool::new(2, 4).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let ran = Arc::clone(&ran);
            pool.submit(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.quiesce();
        assert_eq!(ran.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn quiesce_leaves_the_pool_usable() {
        let pool = WorkPool::new(1, 1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        for round in 0..3 {
            let ran_clone = Arc::clone(&ran);
            pool.submit(move || {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            });
            pool.quiesce();
            assert_eq!(ran.load(Ordering::SeqCst), round + 1);
        }
    }

    #[test]
    fn drop_waits_for_in_flight_jobs() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkPool::new(1, 2).unwrap();
            let ran = Arc::clone(&ran);
            pool.submit(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
