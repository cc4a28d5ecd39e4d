//! Background reclamation pool.
//!
//! Grounded on the teacher's `pool.rs` actor-thread-per-slot model (fixed
//! worker threads blocking on a channel) and on `lazyfree.c`'s hand-off
//! discipline: a job takes ownership of a collection the main thread no
//! longer wants and frees it off the hot path, while the main thread moves
//! on with a fresh empty collection in its place. `pending`/`freed` are
//! relaxed atomics the way the teacher tracks pool occupancy, not because
//! reclamation needs strict ordering with anything else.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam_channel::{unbounded, Sender};

/// A unit of deferred work: anything that can be dropped off the calling
/// thread. Typically a closure that drops an owned `HashMap`/`Vec` of
/// cache entries or compiled units.
pub type ReclaimJob = Box<dyn FnOnce() + Send + 'static>;

struct Counters {
    pending: AtomicUsize,
    freed: AtomicUsize,
}

/// A small fixed pool of worker threads that execute [`ReclaimJob`]s.
pub struct ReclamationPool {
    sender: Sender<ReclaimJob>,
    counters: Arc<Counters>,
    workers: usize,
}

impl ReclamationPool {
    /// Spawns `workers` threads (clamped to at least 1) waiting on a shared
    /// job queue.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = unbounded::<ReclaimJob>();
        let counters = Arc::new(Counters {
            pending: AtomicUsize::new(0),
            freed: AtomicUsize::new(0),
        });

        for id in 0..workers {
            let receiver = receiver.clone();
            let counters = Arc::clone(&counters);
            std::thread::Builder::new()
                .name(format!("script-reclaim-{id}"))
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                        counters.pending.fetch_sub(1, Ordering::Relaxed);
                        counters.freed.fetch_add(1, Ordering::Relaxed);
                    }
                })
                .expect("failed to spawn reclamation worker thread");
        }

        ReclamationPool { sender, counters, workers }
    }

    /// Returns the process-wide singleton, sized from
    /// [`crate::config::CacheConfig::reclamation_workers`] at first use.
    pub fn global() -> &'static ReclamationPool {
        static INSTANCE: OnceLock<ReclamationPool> = OnceLock::new();
        INSTANCE.get_or_init(|| ReclamationPool::new(crate::config::CacheConfig::from_env().reclamation_workers))
    }

    /// Hands `job` off to a worker thread. Never blocks the caller.
    pub fn submit(&self, job: ReclaimJob) {
        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        // An unbounded channel never disconnects while `self` is alive, so
        // send() cannot fail here.
        let _ = self.sender.send(job);
    }

    pub fn pending_objects(&self) -> usize {
        self.counters.pending.load(Ordering::Relaxed)
    }

    pub fn freed_objects(&self) -> usize {
        self.counters.freed.load(Ordering::Relaxed)
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }
}
