// ordkey: data-plane primitives for ordered, transactional KV stores

pub mod counter;
pub mod kv;
pub mod slice;
pub mod tuple;
pub mod workpool;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level convenience re-exports for the most common API entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable, zero-copy view over a shared byte buffer.
pub use slice::Slice;
/// Failures from slice accessors and textual parsers.
pub use slice::SliceError;

/// Ordered sequence of decoded tuple elements.
pub use tuple::Tuple;
/// Lazy tuple view over an encoded slice; decodes elements on demand.
pub use tuple::SlicedTuple;
/// One decoded tuple position.
pub use tuple::Element;
/// Append-only encoder emitting the order-preserving wire format.
pub use tuple::TupleWriter;
/// Coercion step behind the typed tuple accessors.
pub use tuple::FromElement;
/// The tuple codec's failure taxonomy.
pub use tuple::TupleError;

/// Handle that opens transactions against the store.
pub use kv::Database;
/// One transaction: plain and snapshot reads, buffered writes, commit.
pub use kv::Transaction;
/// Bounded automatic retry of conflicted transaction bodies.
pub use kv::Retryable;
/// Key prefix confining one layer's state.
pub use kv::Subspace;
/// Cooperative cancellation, honored at every database round-trip.
pub use kv::CancelToken;
/// Transactional failure taxonomy.
pub use kv::KvError;
/// In-memory ordered transactional store for tests and harnesses.
pub use kv::memdb::MemDb;

/// Contention-tolerant integer stored as randomly keyed shards.
pub use counter::ShardedCounter;
/// Tunables for one counter instance.
pub use counter::CounterOptions;
/// Counter failure taxonomy.
pub use counter::CounterError;
/// Strategy supplying shard identifiers and probability draws.
pub use counter::ShardIdSource;

/// Fixed-size pool running fire-and-forget background jobs.
pub use workpool::WorkPool;
