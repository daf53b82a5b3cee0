use petek_stm::occ::{atomically, try_atomically, TVar};
use petek_stm::StmError;
use std::sync::Arc;
use std::thread;

#[test]
fn basic_read_write() {
    let account = TVar::new(100);

    atomically(|tx| {
        let v = tx.load(&account)?;
        tx.store(&account, v + 50)
    });

    let balance = atomically(|tx| tx.load(&account));
    assert_eq!(balance, 150);
}

#[test]
fn read_your_own_writes() {
    let var = TVar::new(10);

    atomically(|tx| {
        assert_eq!(tx.load(&var)?, 10);
        tx.store(&var, 20)?;
        assert_eq!(tx.load(&var)?, 20);
        tx.store(&var, 30)?;
        assert_eq!(tx.load(&var)?, 30);
        Ok(())
    });

    assert_eq!(atomically(|tx| tx.load(&var)), 30);
}

#[test]
fn repeated_loads_are_stable() {
    let var = TVar::new(7);
    atomically(|tx| {
        let a = tx.load(&var)?;
        let b = tx.load(&var)?;
        assert_eq!(a, b);
        Ok(())
    });
}

// S1: eight threads, a thousand read-modify-write increments each.
#[test]
fn concurrent_counter() {
    let _ = env_logger::builder().is_test(true).try_init();

    const THREADS: usize = 8;
    const INCREMENTS: usize = 1000;

    let counter = Arc::new(TVar::new(0usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    atomically(|tx| {
                        let v = tx.load(&counter)?;
                        tx.store(&counter, v + 1)
                    });
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker");
    }

    assert_eq!(atomically(|tx| tx.load(&counter)), THREADS * INCREMENTS);
}

// S2: sixteen threads drain a into b one unit at a time; the sum is
// invariant and the end state is exact.
#[test]
fn concurrent_transfer() {
    const THREADS: usize = 16;
    const ROUNDS: i64 = 500;

    let a = Arc::new(TVar::new(100i64));
    let b = Arc::new(TVar::new(100i64));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let a = Arc::clone(&a);
            let b = Arc::clone(&b);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    atomically(|tx| {
                        let x = tx.load(&a)?;
                        let y = tx.load(&b)?;
                        tx.store(&a, x - 1)?;
                        tx.store(&b, y + 1)
                    });
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker");
    }

    let (x, y) = atomically(|tx| Ok((tx.load(&a)?, tx.load(&b)?)));
    let moved = THREADS as i64 * ROUNDS;
    assert_eq!(x + y, 200);
    assert_eq!(x, 100 - moved);
    assert_eq!(y, 100 + moved);
}

// S3: a user error aborts the transaction and no write survives.
#[test]
fn user_error_rolls_back() {
    let status = TVar::new(String::from("Clean"));

    let result: Result<(), StmError> = try_atomically(|tx| {
        tx.store(&status, String::from("Dirty"))?;
        Err(StmError::User(String::from("Boom")))
    });
    assert!(matches!(result, Err(StmError::User(_))));

    assert_eq!(atomically(|tx| tx.load(&status)), "Clean");
}

// S3, panic flavor: unwinding out of the closure also leaves no trace.
#[test]
fn panic_rolls_back() {
    let status = Arc::new(TVar::new(String::from("Clean")));

    let inner = Arc::clone(&status);
    let outcome = std::panic::catch_unwind(move || {
        atomically(|tx| {
            tx.store(&inner, String::from("Dirty"))?;
            panic!("Boom");
            #[allow(unreachable_code)]
            Ok(())
        })
    });
    assert!(outcome.is_err());

    assert_eq!(atomically(|tx| tx.load(&status)), "Clean");
}

// Writes of an aborted transaction are invisible even when interleaved
// with winners (isolation of aborts).
#[test]
fn conflicting_writers_serialize() {
    let var = Arc::new(TVar::new(0));

    let t1 = {
        let var = Arc::clone(&var);
        thread::spawn(move || {
            for _ in 0..100 {
                atomically(|tx| {
                    let v = tx.load(&var)?;
                    tx.store(&var, v + 1)
                });
            }
        })
    };
    let t2 = {
        let var = Arc::clone(&var);
        thread::spawn(move || {
            for _ in 0..100 {
                atomically(|tx| {
                    let v = tx.load(&var)?;
                    tx.store(&var, v + 1)
                });
            }
        })
    };
    t1.join().expect("t1");
    t2.join().expect("t2");

    assert_eq!(atomically(|tx| tx.load(&var)), 200);
}

// Committing an empty transaction is a no-op on observable state.
#[test]
fn empty_commit_is_idempotent() {
    let var = TVar::new(42);
    for _ in 0..10 {
        atomically(|_tx| Ok(()));
    }
    assert_eq!(atomically(|tx| tx.load(&var)), 42);
}

// Transaction-scoped allocation: aborts destroy, commits adopt.
#[test]
fn alloc_follows_transaction_outcome() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DROPS: AtomicUsize = AtomicUsize::new(0);
    struct Probe;
    impl Drop for Probe {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    let result: Result<(), StmError> = try_atomically(|tx| {
        let _p = tx.alloc(Probe)?;
        Err(StmError::User(String::from("abort")))
    });
    assert!(result.is_err());
    assert_eq!(DROPS.load(Ordering::SeqCst), 1, "aborted alloc must be destroyed");

    let ptr = atomically(|tx| tx.alloc(Probe));
    assert_eq!(DROPS.load(Ordering::SeqCst), 1, "committed alloc is adopted");
    // Committed allocations are freed transactionally once unlinked.
    atomically(|tx| {
        // SAFETY: ptr is live, unpublished, and freed exactly once.
        unsafe { tx.free(ptr) };
        Ok(())
    });
    assert_eq!(DROPS.load(Ordering::SeqCst), 2);
}

// Clock ticks observed anywhere are strictly increasing and unique.
#[test]
fn clock_is_monotone_across_threads() {
    use petek_stm::clock;
    use std::collections::HashSet;

    const THREADS: usize = 8;
    const TICKS: usize = 1000;

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            thread::spawn(|| {
                let mut seen = Vec::with_capacity(TICKS);
                for _ in 0..TICKS {
                    seen.push(clock::tick());
                }
                seen
            })
        })
        .collect();

    let mut all = HashSet::new();
    for h in handles {
        let seen = h.join().expect("worker");
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "per-thread monotone");
        for v in seen {
            assert!(all.insert(v), "tick values must be unique");
        }
    }
}
