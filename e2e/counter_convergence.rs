//! E2E: counter convergence under concurrent writers.
//!
//! The headline scenario: 1000 concurrent increments and 100 concurrent
//! decrements, with background coalescing firing probabilistically along
//! the way, followed by one quiesced read.  Whatever interleaving the
//! scheduler produced, the total is exactly +900 and further coalescing
//! never moves it.

use std::sync::Arc;
use std::thread;

use ordkey::{
    CancelToken, CounterError, CounterOptions, Database, MemDb, Retryable, ShardedCounter,
    Subspace, Tuple,
};

fn counter_fixture(options: CounterOptions) -> (Arc<MemDb>, ShardedCounter<MemDb>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = Arc::new(MemDb::new());
    let subspace = Subspace::from_tuple(&Tuple::new().with("stats").with("hits"));
    let counter =
        ShardedCounter::with_options(Arc::clone(&db), subspace, options).unwrap();
    (db, counter)
}

fn add_many(
    db: &MemDb,
    counter: &ShardedCounter<MemDb>,
    cancel: &CancelToken,
    delta: i64,
    times: usize,
) -> Result<(), CounterError> {
    for _ in 0..times {
        db.write(cancel, |tx| counter.add(tx, delta))?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// The convergence scenario
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn concurrent_adds_converge_to_the_exact_sum() -> anyhow::Result<()> {
    let (db, counter) = counter_fixture(CounterOptions::default());
    let cancel = CancelToken::new();

    // 20 writers x 50 increments, 4 writers x 25 decrements.
    thread::scope(|scope| {
        let mut handles = Vec::new();
        for _ in 0..20 {
            handles.push(scope.spawn(|| add_many(&db, &counter, &cancel, 1, 50)));
        }
        for _ in 0..4 {
            handles.push(scope.spawn(|| add_many(&db, &counter, &cancel, -1, 25)));
        }
        for handle in handles {
            handle.join().expect("writer thread panicked").unwrap();
        }
    });

    // Quiesce the background coalescer, then read.
    counter.quiesce();
    assert_eq!(counter.total(&cancel)?, 900);

    // Coalescing along the way never changed the sum; a second quiesced
    // read sees the same value.
    counter.quiesce();
    assert_eq!(counter.total(&cancel)?, 900);
    Ok(())
}

#[test]
fn aggressive_coalescing_preserves_totals() -> anyhow::Result<()> {
    // Trigger a pass on (almost) every add to chase the coalescer through
    // many merge windows.
    let options = CounterOptions::new()
        .with_sample_size(5)
        .with_coalesce_probability(1.0);
    let (db, counter) = counter_fixture(options);
    let cancel = CancelToken::new();

    add_many(&db, &counter, &cancel, 3, 100)?;
    counter.quiesce();
    assert_eq!(counter.total(&cancel)?, 300);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// set_total and snapshot reads under the same machinery
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn set_total_lands_atomically_with_the_callers_transaction() -> anyhow::Result<()> {
    let (db, counter) = counter_fixture(CounterOptions::default());
    let cancel = CancelToken::new();

    add_many(&db, &counter, &cancel, 1, 10)?;
    db.write(&cancel, |tx| counter.set_total(tx, -5))?;
    counter.quiesce();
    assert_eq!(counter.total(&cancel)?, -5);
    Ok(())
}

#[test]
fn snapshot_and_transactional_reads_agree_when_quiet() -> anyhow::Result<()> {
    let (db, counter) = counter_fixture(CounterOptions::default());
    let cancel = CancelToken::new();

    add_many(&db, &counter, &cancel, 7, 12)?;
    counter.quiesce();

    let mut tx = db.begin(&cancel)?;
    let transactional = counter.get_transactional(&mut tx)?;
    let snapshot = counter.get_snapshot(&mut tx)?;
    assert_eq!(transactional, 84);
    assert_eq!(snapshot, 84);
    Ok(())
}
