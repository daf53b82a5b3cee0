//! Cross-subsystem smoke tests: transactions allocating from the thread
//! heap, retiring through EBR, across all three engine variants.

use petek::stm::StmError;
use std::sync::Arc;
use std::thread;

#[test]
fn counter_parity_across_variants() {
    use petek::stm::{lsa, occ, ww};

    let occ_var = occ::TVar::new(0);
    let lsa_var = lsa::TVar::new(0);
    let ww_var = ww::TMVar::new(0);

    for _ in 0..100 {
        occ::atomically(|tx| {
            let v = tx.load(&occ_var)?;
            tx.store(&occ_var, v + 1)
        });
        lsa::atomically(|tx| {
            let v = tx.load(&lsa_var)?;
            tx.store(&lsa_var, v + 1)
        });
        ww::atomically(|tx| {
            let v = tx.load(&ww_var)?;
            tx.store(&ww_var, v + 1)
        });
    }

    assert_eq!(occ::atomically(|tx| tx.load(&occ_var)), 100);
    assert_eq!(lsa::atomically(|tx| tx.load(&lsa_var)), 100);
    assert_eq!(ww::atomically(|tx| tx.load(&ww_var)), 100);
}

// String payloads exercise the destructor path through version retirement:
// every superseded version must drop its String exactly once, from
// whichever thread reclaims it.
#[test]
fn string_churn_reclaims_cleanly() {
    use petek::stm::occ::{atomically, TVar};

    const THREADS: usize = 4;
    const ROUNDS: usize = 500;

    let var = Arc::new(TVar::new(String::from("start")));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let var = Arc::clone(&var);
            thread::spawn(move || {
                for i in 0..ROUNDS {
                    atomically(|tx| {
                        let current = tx.load(&var)?;
                        tx.store(&var, format!("{t}:{i}:{}", current.len()))
                    });
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker");
    }

    let last = atomically(|tx| tx.load(&var));
    assert!(!last.is_empty());
    petek::ebr::flush();
}

#[test]
fn user_errors_propagate_from_every_variant() {
    use petek::stm::{lsa, occ, ww};

    let occ_var = occ::TVar::new(1);
    let result = occ::try_atomically(|tx| {
        tx.store(&occ_var, 2)?;
        Err::<(), _>(StmError::User(String::from("no")))
    });
    assert!(result.is_err());
    assert_eq!(occ::atomically(|tx| tx.load(&occ_var)), 1);

    let lsa_var = lsa::TVar::new(1);
    let result = lsa::try_atomically(|tx| {
        tx.store(&lsa_var, 2)?;
        Err::<(), _>(StmError::User(String::from("no")))
    });
    assert!(result.is_err());
    assert_eq!(lsa::atomically(|tx| tx.load(&lsa_var)), 1);

    let ww_var = ww::TMVar::new(1);
    let result = ww::try_atomically(|tx| {
        tx.store(&ww_var, 2)?;
        Err::<(), _>(StmError::User(String::from("no")))
    });
    assert!(result.is_err());
    assert_eq!(ww::atomically(|tx| tx.load(&ww_var)), 1);
}
