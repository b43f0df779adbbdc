//! Cooperative request-quota accounting.
//!
//! Collectors sharing one resource split its `max_batch` quota through
//! a [`BatchCounter`]: each acquires a slice at cycle start, may
//! rebalance mid-run, and returns the slice when done. All state
//! changes happen under one async mutex; quota availability is
//! broadcast through a zero-event notifier.

use std::cmp::max;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

#[derive(Debug)]
struct CounterState {
    /// Unallocated quota. Transiently negative when a minimum slice
    /// overshoots what is left.
    barrier: i64,
    active_tasks: usize,
    waiters: usize,
}

/// Per-resource batch quota shared by its collectors.
#[derive(Debug)]
pub struct BatchCounter {
    max_batch: usize,
    state: Mutex<CounterState>,
    zero_evt: Notify,
}

/// Lower and upper bound of the fair per-task slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinBatch {
    pub lo: usize,
    pub hi: usize,
}

fn min_batch(max_batch: usize, active_tasks: usize) -> MinBatch {
    let tasks = active_tasks.max(1);
    MinBatch {
        lo: max(max_batch / tasks, 1),
        hi: max(max_batch % tasks, 1),
    }
}

impl BatchCounter {
    pub fn new(max_batch: usize) -> Self {
        Self {
            max_batch,
            state: Mutex::new(CounterState {
                barrier: max_batch as i64,
                active_tasks: 0,
                waiters: 0,
            }),
            zero_evt: Notify::new(),
        }
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// Fair slice bounds for the current number of active tasks.
    pub async fn min_batch(&self) -> MinBatch {
        let state = self.state.lock().await;
        min_batch(self.max_batch, state.active_tasks)
    }

    /// Join the pool of active collectors and take a batch slice.
    /// Suspends while the remaining quota is below the fair minimum.
    pub async fn acquire_batch(&self) -> usize {
        let mut state = self.state.lock().await;
        state.active_tasks += 1;
        loop {
            let mb = min_batch(self.max_batch, state.active_tasks);
            if state.barrier >= mb.lo as i64 {
                let size = max(state.barrier, max(mb.lo, mb.hi) as i64);
                state.barrier -= size;
                debug!(size, barrier = state.barrier, "batch acquired");
                return size as usize;
            }
            state.waiters += 1;
            // Arm the notification before releasing the lock so a
            // release landing in between cannot be missed.
            let notified = self.zero_evt.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);
            trace!("batch quota exhausted, waiting");
            notified.await;
            state = self.state.lock().await;
            state.waiters -= 1;
        }
    }

    /// Return a slice and leave the active pool.
    pub async fn release_batch(&self, size: usize) {
        let mut state = self.state.lock().await;
        state.barrier += size as i64;
        state.active_tasks = state.active_tasks.saturating_sub(1);
        debug!(size, barrier = state.barrier, "batch released");
        self.zero_evt.notify_waiters();
    }

    /// Mid-run rebalance. With no collector waiting, the surplus quota
    /// is absorbed into the caller's slice; otherwise the caller trims
    /// itself by the fair minimum so a waiter can proceed. Returns the
    /// caller's new batch size.
    pub async fn recalc_limit(&self, current: usize) -> usize {
        let mut state = self.state.lock().await;
        let mb = min_batch(self.max_batch, state.active_tasks);
        if state.waiters == 0 && state.barrier >= 0 {
            let absorbed = current + state.barrier as usize;
            state.barrier = 0;
            if absorbed != current {
                debug!(from = current, to = absorbed, "absorbed surplus quota");
            }
            return absorbed;
        }
        if current > mb.lo {
            state.barrier += mb.lo as i64;
            self.zero_evt.notify_waiters();
            debug!(released = mb.lo, remaining = current - mb.lo, "trimmed batch for waiter");
            return current - mb.lo;
        }
        current
    }

    /// Quota not handed out right now. Test hook for the quiescence
    /// invariant `barrier + outstanding == max_batch`.
    pub async fn available(&self) -> i64 {
        self.state.lock().await.barrier
    }
}
