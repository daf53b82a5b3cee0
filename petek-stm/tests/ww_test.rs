use petek_stm::clock;
use petek_stm::ww::{atomically, try_atomically, TMVar, Transaction};
use petek_stm::StmError;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn basic_read_write() {
    let var = TMVar::new(10);
    atomically(|tx| {
        let v = tx.load(&var)?;
        tx.store(&var, v + 5)
    });
    assert_eq!(atomically(|tx| tx.load(&var)), 15);
}

#[test]
fn read_your_own_writes() {
    let var = TMVar::new(1);
    atomically(|tx| {
        tx.store(&var, 2)?;
        assert_eq!(tx.load(&var)?, 2);
        tx.store(&var, 3)?;
        assert_eq!(tx.load(&var)?, 3);
        Ok(())
    });
    assert_eq!(atomically(|tx| tx.load(&var)), 3);
}

#[test]
fn repeated_loads_are_stable() {
    let var = TMVar::new(9);
    atomically(|tx| {
        let a = tx.load(&var)?;
        let b = tx.load(&var)?;
        assert_eq!(a, b);
        Ok(())
    });
}

#[test]
fn user_error_rolls_back() {
    let var = TMVar::new(String::from("Clean"));
    let result: Result<(), StmError> = try_atomically(|tx| {
        tx.store(&var, String::from("Dirty"))?;
        Err(StmError::User(String::from("Boom")))
    });
    assert!(result.is_err());
    assert_eq!(atomically(|tx| tx.load(&var)), "Clean");
}

// Driving single attempts by hand: begin, write, commit, visibility.
#[test]
fn manual_context_single_thread() {
    let var = TMVar::new(0);

    let guard = petek_ebr::pin();
    let mut tx = Transaction::new(&guard).expect("begin");
    assert_eq!(tx.load(&var).expect("load"), 0);
    tx.store(&var, 41).expect("store");
    assert_eq!(tx.load(&var).expect("ryow"), 41);
    assert!(tx.commit());

    assert_eq!(atomically(|tx| tx.load(&var)), 41);
}

#[test]
fn manual_abort_restores_data() {
    let var = TMVar::new(7);

    let guard = petek_ebr::pin();
    let mut tx = Transaction::new(&guard).expect("begin");
    tx.store(&var, 99).expect("store");
    tx.abort();

    assert_eq!(atomically(|tx| tx.load(&var)), 7);
}

// A reader sees the committed version while a foreign record is in flight.
#[test]
fn in_flight_record_is_invisible() {
    let var = TMVar::new(5);

    let guard = petek_ebr::pin();
    let mut writer = Transaction::new(&guard).expect("begin writer");
    writer.store(&var, 6).expect("store");

    let mut reader = Transaction::new(&guard).expect("begin reader");
    assert_eq!(reader.load(&var).expect("load"), 5);
    assert!(reader.commit());

    assert!(writer.commit());

    assert_eq!(atomically(|tx| tx.load(&var)), 6);
}

// S5, deterministic core: the older transaction wounds the younger record
// holder and commits; the younger one aborts.
#[test]
fn older_wounds_younger() {
    let var = TMVar::new(0);

    let guard = petek_ebr::pin();
    let mut older = Transaction::new(&guard).expect("begin older");
    clock::tick();
    let mut younger = Transaction::new(&guard).expect("begin younger");
    assert!(older.start_ts() < younger.start_ts());

    // Younger takes the cell first.
    younger.store(&var, 2).expect("younger store");

    // Older contends: wounds the younger owner and takes over.
    older.store(&var, 1).expect("older store wins");
    assert!(older.commit(), "the older transaction always makes progress");

    // The wounded younger transaction cannot do anything but retry.
    assert!(matches!(younger.load(&var), Err(StmError::Retry)));
    assert!(!younger.commit());

    assert_eq!(atomically(|tx| tx.load(&var)), 1);
}

// The mirror case: a younger contender gives way to an older record holder.
#[test]
fn younger_yields_to_older() {
    let var = TMVar::new(0);

    let guard = petek_ebr::pin();
    let mut older = Transaction::new(&guard).expect("begin older");
    clock::tick();
    let mut younger = Transaction::new(&guard).expect("begin younger");

    older.store(&var, 1).expect("older store");

    // The younger writer self-aborts instead of waiting forever.
    assert!(matches!(
        younger.store(&var, 2),
        Err(StmError::Retry)
    ));
    assert!(!younger.commit());

    assert!(older.commit());

    assert_eq!(atomically(|tx| tx.load(&var)), 1);
}

// S5 proper: two threads contend for one cell over 10^5 rounds with
// alternating seniority. The attempt that is oldest at each moment must
// commit every single round; the younger one may lose and re-begin.
#[test]
fn oldest_always_commits_each_round() {
    const ROUNDS: usize = 100_000;

    let var = Arc::new(TMVar::new(0usize));
    let round_start = Arc::new(Barrier::new(2));
    let begun = Arc::new(Barrier::new(2));

    let worker = |idx: usize| {
        let var = Arc::clone(&var);
        let round_start = Arc::clone(&round_start);
        let begun = Arc::clone(&begun);
        thread::spawn(move || {
            let mut oldest_commits = 0usize;
            for round in 0..ROUNDS {
                round_start.wait();
                let i_am_oldest = round % 2 == idx;

                let guard = petek_ebr::pin();
                let mut tx;
                if i_am_oldest {
                    tx = Transaction::new(&guard).expect("begin");
                    begun.wait();
                } else {
                    begun.wait();
                    // A tick after the elder began makes this attempt
                    // strictly younger.
                    clock::tick();
                    tx = Transaction::new(&guard).expect("begin");
                }

                let committed = tx.store(&var, round).is_ok() && tx.commit();
                if i_am_oldest {
                    assert!(committed, "oldest attempt lost round {round}");
                    oldest_commits += 1;
                }
            }
            oldest_commits
        })
    };

    let a = worker(0);
    let b = worker(1);
    let total = a.join().expect("worker a") + b.join().expect("worker b");
    assert_eq!(total, ROUNDS, "the oldest attempt must commit every round");
}

// S1 under Wound-Wait.
#[test]
fn concurrent_counter() {
    const THREADS: usize = 8;
    const INCREMENTS: usize = 1000;

    let counter = Arc::new(TMVar::new(0usize));
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

// Two threads hammer one cell; progress holds and nothing is lost.
#[test]
fn two_thread_contention_progress() {
    const ROUNDS: usize = 10_000;

    let var = Arc::new(TMVar::new(0usize));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let var = Arc::clone(&var);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    atomically(|tx| {
                        let v = tx.load(&var)?;
                        tx.store(&var, v + 1)
                    });
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker");
    }
    assert_eq!(atomically(|tx| tx.load(&var)), 2 * ROUNDS);
}

// Transfers under Wound-Wait keep the sum invariant.
#[test]
fn concurrent_transfer() {
    const THREADS: usize = 8;
    const ROUNDS: i64 = 500;

    let a = Arc::new(TMVar::new(100i64));
    let b = Arc::new(TMVar::new(100i64));

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
    assert_eq!(x + y, 200);
    assert_eq!(x, 100 - THREADS as i64 * ROUNDS);
}
