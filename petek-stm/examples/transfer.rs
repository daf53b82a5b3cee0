//! Concurrent account transfers with the optimistic engine: the sum of the
//! two balances is invariant no matter how the transfers interleave.

use petek_stm::occ::{atomically, TVar};
use std::sync::Arc;
use std::thread;

fn main() {
    let a = Arc::new(TVar::new(100i64));
    let b = Arc::new(TVar::new(100i64));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let a = Arc::clone(&a);
            let b = Arc::clone(&b);
            thread::spawn(move || {
                for _ in 0..1000 {
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
    println!("a = {x}, b = {y}, sum = {}", x + y);
    assert_eq!(x + y, 200);
}
