//! Abstract interface to the ordered, transactional key/value store.
//!
//! Layers above the codec (the sharded counter, directories, anything that
//! stores state) talk to the database exclusively through the
//! [`Database`] / [`Transaction`] trait pair defined here, so they can run
//! against a native binding or against the in-memory store in
//! [`memdb`].
//!
//! Covers:
//! - [`CancelToken`]: cooperative cancellation, honored at every
//!   database round-trip
//! - [`Transaction`] / [`Database`]: reads (plain and snapshot), writes,
//!   commit
//! - [`Retryable`]: bounded automatic retry of conflicted transactions
//! - [`Subspace`]: a key prefix confining one layer's state
//! - [`KvError`]: the transactional failure taxonomy

pub mod memdb;

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::slice::{Slice, SliceError};
use crate::tuple::{Tuple, TupleError};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Transactional failures.  `Conflict` is the only retryable variant;
/// `Cancelled` is a distinguished outcome rather than a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    /// Another transaction committed a conflicting write first.
    Conflict,
    /// The operation's cancellation token fired; the in-flight transaction
    /// was abandoned without effect.
    Cancelled,
    /// The retry loop exhausted its attempt budget on conflicts.
    RetryLimit { attempts: usize },
    /// A stored value failed to decode.
    Corrupt(TupleError),
    /// The transaction was used after commit.
    Closed,
}

impl KvError {
    /// Whether a retry loop should run the transaction body again.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Conflict)
    }
}

impl fmt::Display for KvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KvError::Conflict => write!(f, "transaction conflict"),
            KvError::Cancelled => write!(f, "operation cancelled"),
            KvError::RetryLimit { attempts } => {
                write!(f, "transaction still conflicted after {attempts} attempts")
            }
            KvError::Corrupt(e) => write!(f, "stored value failed to decode: {e}"),
            KvError::Closed => write!(f, "transaction already committed"),
        }
    }
}

impl std::error::Error for KvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KvError::Corrupt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TupleError> for KvError {
    fn from(e: TupleError) -> KvError {
        KvError::Corrupt(e)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Cooperative cancellation signal, cheap to clone and share.
///
/// Cancellation takes effect at the next suspension point (every
/// transaction round-trip calls [`CancelToken::checkpoint`] before touching
/// the store) and abandons the in-flight transaction without effect.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Requests cancellation.  Idempotent.
    pub fn cancel(&self) {
        self.fired.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Returns `Err(Cancelled)` once the token has fired.
    #[inline]
    pub fn checkpoint(&self) -> Result<(), KvError> {
        if self.is_cancelled() {
            Err(KvError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction / Database traits
// ─────────────────────────────────────────────────────────────────────────────

/// One transaction against the store.
///
/// Plain reads enter the transaction's conflict set; `snapshot_*` reads see
/// the same consistent state but never cause this transaction to conflict
/// with later writers.  Writes are buffered until [`Transaction::commit`],
/// which applies them atomically or fails with a retryable
/// [`KvError::Conflict`].
///
/// A `limit` of 0 on range reads means "no limit".
pub trait Transaction {
    fn get(&mut self, key: &Slice) -> Result<Option<Slice>, KvError>;

    fn get_range(
        &mut self,
        begin: &Slice,
        end: &Slice,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<(Slice, Slice)>, KvError>;

    fn snapshot_get(&mut self, key: &Slice) -> Result<Option<Slice>, KvError>;

    fn snapshot_get_range(
        &mut self,
        begin: &Slice,
        end: &Slice,
        limit: usize,
        reverse: bool,
    ) -> Result<Vec<(Slice, Slice)>, KvError>;

    fn set(&mut self, key: &Slice, value: &Slice);

    fn clear(&mut self, key: &Slice);

    fn commit(&mut self) -> Result<(), KvError>;
}

/// A handle that can open transactions.
pub trait Database: Send + Sync + 'static {
    type Tx: Transaction;

    fn begin(&self, cancel: &CancelToken) -> Result<Self::Tx, KvError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry loops
// ─────────────────────────────────────────────────────────────────────────────

/// Attempt budget for the bounded retry loops.
pub const RETRY_ATTEMPTS: usize = 10;

/// Error types the retry loops understand: constructible from transaction
/// failures, and able to say whether another attempt could succeed.
/// Layer-specific error enums that wrap [`KvError`] implement this so their
/// operations can run under [`Retryable`] directly.
pub trait TransientError: From<KvError> + fmt::Display {
    fn is_retryable(&self) -> bool;
}

impl TransientError for KvError {
    fn is_retryable(&self) -> bool {
        KvError::is_retryable(self)
    }
}

/// Automatic re-execution of transaction bodies on retryable errors.
///
/// The body may run several times and must be idempotent up to its final
/// committed effect.  Non-retryable errors and cancellation surface
/// immediately.
pub trait Retryable: Database {
    /// Runs a read-only body; no commit is issued.
    fn read<T, E, F>(&self, cancel: &CancelToken, mut body: F) -> Result<T, E>
    where
        E: TransientError,
        F: FnMut(&mut Self::Tx) -> Result<T, E>,
    {
        for attempt in 1..=RETRY_ATTEMPTS {
            cancel.checkpoint()?;
            let mut tx = self.begin(cancel)?;
            match body(&mut tx) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    trace!(attempt, error = %e, "retrying read transaction");
                }
                Err(e) => return Err(e),
            }
        }
        Err(E::from(KvError::RetryLimit { attempts: RETRY_ATTEMPTS }))
    }

    /// Runs a body and commits; returns the body's value.
    fn read_write<T, E, F>(&self, cancel: &CancelToken, mut body: F) -> Result<T, E>
    where
        E: TransientError,
        F: FnMut(&mut Self::Tx) -> Result<T, E>,
    {
        for attempt in 1..=RETRY_ATTEMPTS {
            cancel.checkpoint()?;
            let mut tx = self.begin(cancel)?;
            let outcome = body(&mut tx).and_then(|value| tx.commit().map(|()| value).map_err(E::from));
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    trace!(attempt, error = %e, "retrying write transaction");
                }
                Err(e) => return Err(e),
            }
        }
        Err(E::from(KvError::RetryLimit { attempts: RETRY_ATTEMPTS }))
    }

    /// Runs a body for its effects and commits.
    fn write<E, F>(&self, cancel: &CancelToken, mut body: F) -> Result<(), E>
    where
        E: TransientError,
        F: FnMut(&mut Self::Tx) -> Result<(), E>,
    {
        self.read_write(cancel, |tx| body(tx))
    }
}

impl<D: Database> Retryable for D {}

// ─────────────────────────────────────────────────────────────────────────────
// Subspace
// ─────────────────────────────────────────────────────────────────────────────

/// A key prefix within which one layer confines all of its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subspace {
    prefix: Slice,
}

impl Subspace {
    pub fn new(prefix: Slice) -> Subspace {
        Subspace { prefix }
    }

    /// A subspace rooted at a packed tuple, the usual way layers carve up
    /// the key space.
    pub fn from_tuple(tuple: &Tuple) -> Subspace {
        Subspace { prefix: tuple.pack() }
    }

    #[inline]
    pub fn prefix(&self) -> &Slice {
        &self.prefix
    }

    /// `prefix` followed by the packed `tuple`.
    pub fn pack(&self, tuple: &Tuple) -> Slice {
        self.prefix.concat(&tuple.pack())
    }

    /// `prefix` followed by raw `suffix` bytes.
    pub fn key(&self, suffix: &Slice) -> Slice {
        self.prefix.concat(suffix)
    }

    /// The half-open key range `[begin, end)` covering every key in the
    /// subspace.  Fails when no upper bound exists (empty or all-`0xFF`
    /// prefix).
    pub fn range(&self) -> Result<(Slice, Slice), SliceError> {
        Ok((self.prefix.clone(), self.prefix.successor()?))
    }

    /// Whether `key` lies inside the subspace.
    pub fn contains(&self, key: &Slice) -> bool {
        key.starts_with(&self.prefix)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
