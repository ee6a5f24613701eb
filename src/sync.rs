//! Shared coordination state for the parallel search.
//!
//! Workers never talk to each other directly. They share a cancellation
//! token, a few atomic counters, one non-blocking exclusive gate and one
//! reset barrier.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

/// How often a barrier waiter re-checks the cancellation token.
const CANCELLATION_POLL: Duration = Duration::from_millis(20);

/// Cooperative cancellation flag shared by the controller, the workers and
/// the interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Iteration bookkeeping shared by all workers.
///
/// Only `iteration` is exact. The stagnation counter and the last reported
/// iteration tolerate lost updates between racing workers.
#[derive(Debug)]
pub struct SearchCounters {
    iteration: AtomicU64,
    no_improvement: AtomicU64,
    last_reported: AtomicU64,
}

impl Default for SearchCounters {
    fn default() -> Self {
        SearchCounters {
            iteration: AtomicU64::new(1),
            no_improvement: AtomicU64::new(0),
            last_reported: AtomicU64::new(0),
        }
    }
}

impl SearchCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next global iteration number. The first call returns 1.
    pub fn next_iteration(&self) -> u64 {
        self.iteration.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of iterations started so far.
    pub fn iterations_started(&self) -> u64 {
        self.iteration.load(Ordering::SeqCst) - 1
    }

    /// Iterations since the last improvement of the best solution.
    pub fn no_improvement(&self) -> u64 {
        self.no_improvement.load(Ordering::Relaxed)
    }

    pub fn record_improvement(&self) {
        self.no_improvement.store(0, Ordering::Relaxed);
    }

    pub fn record_no_improvement(&self) {
        self.no_improvement.fetch_add(1, Ordering::Relaxed);
    }

    /// Claim the progress report for `iteration`. Returns `true` for exactly
    /// one caller per reported value, unless a later iteration was already
    /// reported.
    pub fn claim_report(&self, iteration: u64) -> bool {
        let last = self.last_reported.load(Ordering::Relaxed);
        iteration > last
            && self
                .last_reported
                .compare_exchange(last, iteration, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }
}

/// Non-blocking mutual exclusion between penalty adaptation and population
/// restart. Contenders that lose simply skip their turn.
#[derive(Debug, Default)]
pub struct ExclusiveGate {
    lock: Mutex<()>,
}

impl ExclusiveGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the gate if nobody holds it. The gate reopens when the guard is
    /// dropped, including during unwinding.
    pub fn try_enter(&self) -> Option<MutexGuard<'_, ()>> {
        match self.lock.try_lock() {
            Ok(guard) => Some(guard),
            // The previous holder panicked; it no longer holds the gate.
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Role of a worker after arriving at the [`ResetBarrier`].
#[must_use]
pub enum Arrival<'a> {
    /// Last to arrive. Everybody else stays blocked until the guard is
    /// released or dropped.
    Leader(BarrierRelease<'a>),
    /// Released by the leader after its cycle completed.
    Released,
    /// The search was cancelled while waiting.
    Cancelled,
}

/// Generation-counted rendezvous of all workers, reused once per stagnation
/// cycle.
///
/// Waiters block until the generation changes, so a fast worker that re-enters
/// the barrier for the next cycle is never mistaken for a late arrival of the
/// current one.
#[derive(Debug)]
pub struct ResetBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl ResetBarrier {
    pub fn new(parties: usize) -> Self {
        ResetBarrier {
            parties: parties.max(1),
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Number of the cycles completed so far.
    pub fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    fn lock_state(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arrive at the barrier and wait for the other parties.
    pub fn arrive(&self, token: &CancellationToken) -> Arrival<'_> {
        let mut state = self.lock_state();
        state.arrived += 1;

        if state.arrived >= self.parties {
            return Arrival::Leader(BarrierRelease {
                barrier: self,
                released: false,
            });
        }

        let generation = state.generation;
        while state.generation == generation {
            if token.is_cancelled() {
                state.arrived -= 1;
                return Arrival::Cancelled;
            }
            state = self
                .released
                .wait_timeout(state, CANCELLATION_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Arrival::Released
    }

    fn release(&self) {
        let mut state = self.lock_state();
        state.arrived = 0;
        state.generation += 1;
        self.released.notify_all();
    }
}

/// Held by the barrier leader; releases the waiting workers when dropped.
pub struct BarrierRelease<'a> {
    barrier: &'a ResetBarrier,
    released: bool,
}

impl BarrierRelease<'_> {
    /// Release the waiting workers now.
    pub fn release(mut self) {
        self.barrier.release();
        self.released = true;
    }
}

impl Drop for BarrierRelease<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.barrier.release();
        }
    }
}

/// Everything the workers share besides the population.
#[derive(Debug)]
pub struct SharedSearch {
    pub token: CancellationToken,
    pub counters: SearchCounters,
    pub gate: ExclusiveGate,
    pub barrier: ResetBarrier,
}

impl SharedSearch {
    pub fn new(num_workers: usize, token: CancellationToken) -> Self {
        SharedSearch {
            token,
            counters: SearchCounters::new(),
            gate: ExclusiveGate::new(),
            barrier: ResetBarrier::new(num_workers),
        }
    }
}
