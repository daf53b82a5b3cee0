use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Heap-pool object whose drop decrements the counter it was created with,
/// so each test observes only its own reclamations.
struct Tracked {
    counter: Arc<AtomicIsize>,
}

impl Tracked {
    fn create(counter: &Arc<AtomicIsize>) -> *mut Tracked {
        counter.fetch_add(1, Ordering::SeqCst);
        let raw = petek_alloc::allocate(core::mem::size_of::<Tracked>())
            .expect("allocate")
            .as_ptr() as *mut Tracked;
        // SAFETY: fresh block of the right size.
        unsafe {
            raw.write(Tracked {
                counter: Arc::clone(counter),
            })
        };
        raw
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cycle empty critical sections until this counter's objects drain.
fn clean_up(counter: &Arc<AtomicIsize>) {
    for _ in 0..50 {
        drop(petek_ebr::pin());
        petek_ebr::flush();
        if counter.load(Ordering::SeqCst) == 0 {
            return;
        }
        thread::yield_now();
    }
}

#[test]
fn single_thread_basic_flow() {
    let alive = Arc::new(AtomicIsize::new(0));
    {
        let _guard = petek_ebr::pin();
        let obj = Tracked::create(&alive);
        assert_eq!(alive.load(Ordering::SeqCst), 1);
        // SAFETY: obj is unlinked (never shared) and retired once.
        unsafe { petek_ebr::retire_heap(obj) };
    }

    clean_up(&alive);
    assert_eq!(alive.load(Ordering::SeqCst), 0, "object should be reclaimed");
}

#[test]
fn deleter_never_runs_while_reader_pinned() {
    let freed = Arc::new(AtomicIsize::new(0));

    // Reader pins and parks; the writer retires an object and flushes hard.
    // The object must stay alive until the reader unpins.
    let (enter_tx, enter_rx) = std::sync::mpsc::channel::<()>();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

    let reader = thread::spawn(move || {
        let guard = petek_ebr::pin();
        enter_tx.send(()).expect("announce pin");
        release_rx.recv().expect("await release");
        drop(guard);
    });

    enter_rx.recv().expect("reader pinned");

    struct FlagOnDrop(Arc<AtomicIsize>);
    impl Drop for FlagOnDrop {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    {
        let _guard = petek_ebr::pin();
        let obj = Box::into_raw(Box::new(FlagOnDrop(Arc::clone(&freed))));
        // SAFETY: obj unlinked, retired once.
        unsafe { petek_ebr::retire_boxed(obj) };
    }

    for _ in 0..10 {
        petek_ebr::flush();
        thread::yield_now();
    }
    assert_eq!(
        freed.load(Ordering::SeqCst),
        0,
        "deleter ran while a reader was still pinned in an older epoch"
    );

    release_tx.send(()).expect("release reader");
    reader.join().expect("reader");

    for _ in 0..50 {
        petek_ebr::flush();
        if freed.load(Ordering::SeqCst) == 1 {
            break;
        }
        thread::yield_now();
    }
    assert_eq!(freed.load(Ordering::SeqCst), 1);
}

#[test]
fn multi_thread_stress_with_thread_heap() {
    let _ = env_logger::builder().is_test(true).try_init();

    const THREADS: usize = 8;
    const ITERS: usize = 5000;

    let alive = Arc::new(AtomicIsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let alive = Arc::clone(&alive);
            thread::spawn(move || {
                for j in 0..ITERS {
                    let guard = petek_ebr::pin();
                    let obj = Tracked::create(&alive);
                    // Touch the object before retiring it.
                    let _ = j;
                    // SAFETY: obj never escapes this thread before retire.
                    unsafe { petek_ebr::retire_heap(obj) };
                    drop(guard);
                }
                petek_ebr::flush();
            })
        })
        .collect();

    for h in handles {
        h.join().expect("worker");
    }

    clean_up(&alive);
    assert_eq!(alive.load(Ordering::SeqCst), 0);
}

#[test]
fn epoch_is_monotone() {
    let e0 = petek_ebr::global_epoch();
    drop(petek_ebr::pin());
    petek_ebr::flush();
    let e1 = petek_ebr::global_epoch();
    assert!(e1 >= e0);
}
