//! Bounded, byte-metered work queue, built the way
//! `jafreck-lz4r`'s `TPool` wraps a `rayon::ThreadPool` with its own
//! admission state instead of relying on `rayon`'s unbounded `spawn`. A
//! plain `crossbeam_channel::bounded` semaphore only counts slots; here
//! admission is gated on total in-flight *bytes*, so a `Mutex` + `Condvar`
//! pair tracks that budget directly.

use std::sync::{Arc, Condvar, Mutex};

struct QueueState {
    in_flight_bytes: u64,
    in_flight_jobs: u64,
}

/// Workers pop and run closures; there is no separate stop sentinel the way
/// a raw channel-based pool needs one — the producer simply stops calling
/// `push`, and `join` drains whatever is still in flight.
pub struct WorkQueue {
    pool: rayon::ThreadPool,
    state: Arc<(Mutex<QueueState>, Condvar)>,
    memory_limit: u64,
}

impl WorkQueue {
    /// `workers` is clamped to at least 1; `memory_limit` bounds total
    /// in-flight byte cost (the caller's `MAX_QUEUED_CHUNK_DATA`, ≈256 MiB).
    pub fn new(workers: usize, memory_limit: u64) -> std::io::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(Self {
            pool,
            state: Arc::new((
                Mutex::new(QueueState {
                    in_flight_bytes: 0,
                    in_flight_jobs: 0,
                }),
                Condvar::new(),
            )),
            memory_limit,
        })
    }

    /// Default worker count: hardware concurrency, minimum 1.
    pub fn default_workers() -> usize {
        num_cpus::get().max(1)
    }

    /// Blocks until `in_flight_bytes + cost <= memory_limit`, unless the
    /// queue is currently empty — in which case one oversize item is always
    /// admitted, to avoid deadlocking on an item larger than the limit.
    pub fn push(&self, cost: u64, job: impl FnOnce() + Send + 'static) {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        while state.in_flight_bytes > 0 && state.in_flight_bytes + cost > self.memory_limit {
            state = cvar.wait(state).unwrap();
        }
        state.in_flight_bytes += cost;
        state.in_flight_jobs += 1;
        drop(state);

        let shared = Arc::clone(&self.state);
        self.pool.spawn(move || {
            job();
            let (lock, cvar) = &*shared;
            let mut state = lock.lock().unwrap();
            state.in_flight_bytes -= cost;
            state.in_flight_jobs -= 1;
            cvar.notify_all();
        });
    }

    /// Blocks until every pushed job has finished.
    pub fn join(&self) {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        while state.in_flight_jobs > 0 {
            state = cvar.wait(state).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_all_pushed_jobs() {
        let queue = WorkQueue::new(4, 1024).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let c = Arc::clone(&counter);
            queue.push(10, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        queue.join();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn admits_a_single_oversize_item_when_empty() {
        let queue = WorkQueue::new(1, 10);
        let queue = queue.unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        queue.push(1_000_000, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        queue.join();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
