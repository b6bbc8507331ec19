//! Sharded counter: a contention-tolerant integer.
//!
//! A counter that many writers bump concurrently would serialize on a
//! single key.  Here the running sum is spread over many shards, each a
//! write-once entry at `prefix + pack(random_id)` holding one packed
//! signed delta.  `add` writes a fresh shard at an effectively unique key,
//! so concurrent adders never conflict; reading sums the whole prefix.
//! A probabilistic background pass coalesces a window of shards into one
//! to bound storage and read cost; it never changes the total.
//!
//! Concurrency model: foreground operations run inside the caller's
//! transaction and surface their errors.  Coalescing is fire-and-forget
//! on a worker pool, at most one in flight per counter (a compare-and-swap
//! flag), with errors observed and logged but never propagated; a lost
//! coalesce costs performance, not correctness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::RngCore;
use tracing::{debug, warn};

use crate::kv::{
    CancelToken, Database, KvError, Retryable, Subspace, Transaction, TransientError,
};
use crate::slice::Slice;
use crate::tuple::Tuple;
use crate::workpool::WorkPool;

use core::fmt;

/// Size of a shard's random identifier.  Wide enough that two concurrent
/// adders colliding on a key is negligible.
pub const SHARD_ID_BYTES: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failures surfaced by counter operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    /// The shard sum left the signed 64-bit range.
    Overflow,
    /// The counter's subspace admits no upper range bound.
    UnboundedSubspace,
    /// The background worker pool could not be created.
    Pool,
    /// A transactional failure, including corrupt shard values.
    Kv(KvError),
}

impl fmt::Display for CounterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterError::Overflow => write!(f, "counter total overflows 64-bit range"),
            CounterError::UnboundedSubspace => {
                write!(f, "counter subspace has no upper range bound")
            }
            CounterError::Pool => write!(f, "background worker pool unavailable"),
            CounterError::Kv(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CounterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CounterError::Kv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<KvError> for CounterError {
    fn from(e: KvError) -> CounterError {
        CounterError::Kv(e)
    }
}

impl From<crate::tuple::TupleError> for CounterError {
    fn from(e: crate::tuple::TupleError) -> CounterError {
        CounterError::Kv(KvError::Corrupt(e))
    }
}

impl TransientError for CounterError {
    fn is_retryable(&self) -> bool {
        matches!(self, CounterError::Kv(e) if e.is_retryable())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shard-id strategy
// ─────────────────────────────────────────────────────────────────────────────

/// Source of shard identifiers and probability draws.
///
/// Exposed as a strategy so callers can pick their randomness discipline:
/// the default draws from the thread-local generator, deterministic tests
/// substitute a seeded or scripted source.  The counter serializes access
/// behind one mutex, so implementations need not be thread-safe, just
/// `Send`.
pub trait ShardIdSource: Send {
    /// Fresh random bytes naming one shard.
    fn shard_id(&mut self) -> [u8; SHARD_ID_BYTES];

    /// Uniform draw from `[0, 1)`, used for the coalesce trigger and the
    /// scan-direction coin.
    fn coin(&mut self) -> f64;
}

/// Default strategy: the `rand` thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngSource;

impl ShardIdSource for ThreadRngSource {
    fn shard_id(&mut self) -> [u8; SHARD_ID_BYTES] {
        let mut id = [0u8; SHARD_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut id);
        id
    }

    fn coin(&mut self) -> f64 {
        use rand::Rng;
        rand::thread_rng().gen::<f64>()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for one counter instance.  Only the subspace is required; the
/// defaults trade shard buildup against coalescing traffic.
#[derive(Debug, Clone, Copy)]
pub struct CounterOptions {
    /// Maximum number of shards one coalescing pass collapses.
    pub sample_size: usize,
    /// Probability that an `add` triggers a background coalesce.
    pub coalesce_probability: f64,
}

impl Default for CounterOptions {
    fn default() -> CounterOptions {
        CounterOptions { sample_size: 20, coalesce_probability: 0.1 }
    }
}

impl CounterOptions {
    pub fn new() -> CounterOptions {
        CounterOptions::default()
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> CounterOptions {
        self.sample_size = sample_size;
        self
    }

    pub fn with_coalesce_probability(mut self, probability: f64) -> CounterOptions {
        self.coalesce_probability = probability;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ShardedCounter
// ─────────────────────────────────────────────────────────────────────────────

/// A 64-bit signed counter stored as randomly keyed shards in a subspace.
pub struct ShardedCounter<D: Database> {
    db: Arc<D>,
    subspace: Subspace,
    /// Precomputed `[begin, end)` covering every shard key.
    bounds: (Slice, Slice),
    options: CounterOptions,
    /// One lock covers both draws an `add` makes (shard id, trigger coin).
    ids: Arc<Mutex<Box<dyn ShardIdSource>>>,
    /// Single-flight latch: at most one coalesce pass runs per counter.
    coalescing: Arc<AtomicBool>,
    pool: Arc<WorkPool>,
    /// Cancellation for background passes; fired by [`ShardedCounter::cancel`].
    cancel: CancelToken,
}

impl<D: Database> ShardedCounter<D> {
    /// A counter over `subspace` with default options and randomness.
    pub fn new(db: Arc<D>, subspace: Subspace) -> Result<ShardedCounter<D>, CounterError> {
        ShardedCounter::with_options(db, subspace, CounterOptions::default())
    }

    pub fn with_options(
        db: Arc<D>,
        subspace: Subspace,
        options: CounterOptions,
    ) -> Result<ShardedCounter<D>, CounterError> {
        ShardedCounter::with_id_source(db, subspace, options, Box::new(ThreadRngSource))
    }

    /// Full-control constructor: options plus a shard-id strategy.
    pub fn with_id_source(
        db: Arc<D>,
        subspace: Subspace,
        options: CounterOptions,
        ids: Box<dyn ShardIdSource>,
    ) -> Result<ShardedCounter<D>, CounterError> {
        let bounds = subspace.range().map_err(|_| CounterError::UnboundedSubspace)?;
        let pool = WorkPool::new(1, 2).ok_or(CounterError::Pool)?;
        Ok(ShardedCounter {
            db,
            subspace,
            bounds,
            options,
            ids: Arc::new(Mutex::new(ids)),
            coalescing: Arc::new(AtomicBool::new(false)),
            pool: Arc::new(pool),
            cancel: CancelToken::new(),
        })
    }

    #[inline]
    pub fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    // ── Foreground operations ────────────────────────────────────────────────

    /// Records `delta` as one fresh shard inside the caller's transaction.
    ///
    /// Conflict-free by construction: the write lands at an effectively
    /// unique key no other transaction has read.  With probability
    /// `coalesce_probability` a background coalesce is triggered; it is
    /// skipped outright while another pass is in flight.
    pub fn add(&self, tx: &mut D::Tx, delta: i64) -> Result<(), CounterError> {
        let (rid, trigger) = {
            let mut ids = self.ids.lock().unwrap();
            let rid = ids.shard_id();
            let trigger = ids.coin() < self.options.coalesce_probability;
            (rid, trigger)
        };
        tx.set(&self.shard_key(&rid), &pack_delta(delta));
        if trigger {
            self.trigger_coalesce();
        }
        Ok(())
    }

    /// Sums every shard through plain reads: the caller's transaction
    /// conflicts with any concurrent coalesce of these shards.
    pub fn get_transactional(&self, tx: &mut D::Tx) -> Result<i64, CounterError> {
        let (begin, end) = &self.bounds;
        sum_shards(tx.get_range(begin, end, 0, false)?)
    }

    /// Sums every shard through the snapshot view: sees a consistent total
    /// at the transaction's read version without taking read conflicts.
    pub fn get_snapshot(&self, tx: &mut D::Tx) -> Result<i64, CounterError> {
        let (begin, end) = &self.bounds;
        sum_shards(tx.snapshot_get_range(begin, end, 0, false)?)
    }

    /// Sets the counter to `total` by writing the correcting delta; the net
    /// effect commits atomically with the rest of the caller's transaction.
    pub fn set_total(&self, tx: &mut D::Tx, total: i64) -> Result<(), CounterError> {
        let current = self.get_snapshot(tx)?;
        let delta = total.checked_sub(current).ok_or(CounterError::Overflow)?;
        self.add(tx, delta)
    }

    /// Convenience: the current total under an automatically retried
    /// read-only transaction.
    pub fn total(&self, cancel: &CancelToken) -> Result<i64, CounterError> {
        self.db.read(cancel, |tx| self.get_transactional(tx))
    }

    // ── Background coalescing ────────────────────────────────────────────────

    /// Submits one coalescing pass unless one is already in flight.
    fn trigger_coalesce(&self) {
        if self
            .coalescing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let db = Arc::clone(&self.db);
        let subspace = self.subspace.clone();
        let bounds = self.bounds.clone();
        let ids = Arc::clone(&self.ids);
        let latch = Arc::clone(&self.coalescing);
        let cancel = self.cancel.clone();
        let sample_size = self.options.sample_size;
        self.pool.submit(move || {
            match coalesce_once(&*db, &subspace, &bounds, &ids, sample_size, &cancel) {
                Ok(merged) => debug!(merged, "coalesced counter shards"),
                // Cancellation means shutdown, not failure.
                Err(CounterError::Kv(KvError::Cancelled)) => {}
                Err(e) => warn!(error = %e, "background coalesce abandoned"),
            }
            latch.store(false, Ordering::Release);
        });
    }

    /// Blocks until every triggered background pass has finished.
    pub fn quiesce(&self) {
        self.pool.quiesce();
    }

    /// Stops future background passes at their next database round-trip.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn shard_key(&self, rid: &[u8; SHARD_ID_BYTES]) -> Slice {
        shard_key(&self.subspace, rid)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shard plumbing
// ─────────────────────────────────────────────────────────────────────────────

fn shard_key(subspace: &Subspace, rid: &[u8; SHARD_ID_BYTES]) -> Slice {
    subspace.pack(&Tuple::new().with(&rid[..]))
}

fn pack_delta(delta: i64) -> Slice {
    Tuple::new().with(delta).pack()
}

fn decode_delta(value: &Slice) -> Result<i64, CounterError> {
    Ok(Tuple::unpack(value)?.first::<i64>()?)
}

fn sum_shards(shards: Vec<(Slice, Slice)>) -> Result<i64, CounterError> {
    let mut total: i64 = 0;
    for (_, value) in &shards {
        total = total
            .checked_add(decode_delta(value)?)
            .ok_or(CounterError::Overflow)?;
    }
    Ok(total)
}

/// One coalescing pass in its own transaction.
///
/// Picks a random pivot key, scans up to `sample_size` shards on a random
/// side of it, reads each shard (entering its conflict range, so competing
/// coalesces conflict with each other but `add` never does), clears them,
/// and writes one fresh shard holding their sum.
fn coalesce_once<D: Database>(
    db: &D,
    subspace: &Subspace,
    bounds: &(Slice, Slice),
    ids: &Mutex<Box<dyn ShardIdSource>>,
    sample_size: usize,
    cancel: &CancelToken,
) -> Result<usize, CounterError> {
    let (pivot_rid, forward) = {
        let mut ids = ids.lock().unwrap();
        (ids.shard_id(), ids.coin() < 0.5)
    };
    let pivot = shard_key(subspace, &pivot_rid);
    let (begin, end) = bounds;

    let mut tx = db.begin(cancel)?;
    let shards = if forward {
        tx.get_range(&pivot, end, sample_size, false)?
    } else {
        tx.get_range(begin, &pivot, sample_size, true)?
    };
    if shards.is_empty() {
        return Ok(0);
    }

    let mut total: i64 = 0;
    for (key, value) in &shards {
        // The range scan above already entered these conflict ranges; the
        // point read pins each shard individually even when the underlying
        // binding narrows range conflicts.
        tx.get(key)?;
        total = total
            .checked_add(decode_delta(value)?)
            .ok_or(CounterError::Overflow)?;
        tx.clear(key);
    }

    let new_rid = ids.lock().unwrap().shard_id();
    tx.set(&shard_key(subspace, &new_rid), &pack_delta(total));
    tx.commit()?;
    Ok(shards.len())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
