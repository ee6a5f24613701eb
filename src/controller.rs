//! Launches the workers, watches the clock and collects failures.

use crate::config::Config;
use crate::sync::{CancellationToken, SharedSearch};
use crate::worker::{Decoder, Educator, SharedPopulation, Worker, WorkerSettings};

use log::{error, info, warn};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// Shortest pause between two checks of the termination conditions.
const MIN_MONITOR_INTERVAL: Duration = Duration::from_millis(1);

/// A worker that stopped because of an error or a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub worker: usize,
    pub message: String,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {} failed: {}", self.worker, self.message)
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Iterations started by all workers together
    pub iterations: u64,
    pub elapsed: Duration,
    pub failures: Vec<WorkerFailure>,
    /// Completed reset barrier cycles
    pub reset_cycles: u64,
}

/// How many workers to launch and when to stop them.
#[derive(Debug, Clone, Copy)]
pub struct RunControls {
    pub num_threads: usize,
    /// Wall-clock budget of the worker phase, unbounded when `None`
    pub time_limit: Option<Duration>,
    pub monitor_interval: Duration,
}

impl RunControls {
    pub fn from_config(config: &Config) -> Self {
        RunControls {
            num_threads: config.effective_num_threads(),
            time_limit: config.effective_time_limit(),
            monitor_interval: config.monitor_interval,
        }
    }
}

/// Run `controls.num_threads` workers on `population` until the token is
/// cancelled, the time limit expires, or a worker stops the search.
///
/// `make_operators` builds the private decoder and educator of each worker
/// inside its own thread. Failures of individual workers cancel the run and
/// are returned in the report; they never abort the caller.
pub fn run_workers<P, D, E, F>(
    population: &P,
    settings: WorkerSettings,
    controls: RunControls,
    token: &CancellationToken,
    make_operators: F,
) -> RunReport
where
    P: SharedPopulation + ?Sized,
    D: Decoder,
    E: Educator,
    F: Fn(usize) -> (D, E) + Sync,
{
    let start = Instant::now();
    let num_threads = controls.num_threads.max(1);
    let shared = SharedSearch::new(num_threads, token.clone());
    info!("launching {} worker threads", num_threads);

    let failures: Vec<WorkerFailure> = thread::scope(|scope| {
        let handles: Vec<_> = (0..num_threads)
            .map(|id| {
                let shared = &shared;
                let make_operators = &make_operators;
                scope.spawn(move || run_isolated(id, population, shared, settings, make_operators))
            })
            .collect();

        monitor(&shared.token, start, &controls);
        shared.token.cancel();

        handles
            .into_iter()
            .enumerate()
            .filter_map(|(id, handle)| match handle.join() {
                Ok(slot) => slot,
                Err(payload) => Some(WorkerFailure {
                    worker: id,
                    message: panic_message(payload.as_ref()),
                }),
            })
            .collect()
    });

    for failure in &failures {
        error!("{}", failure);
    }
    if !failures.is_empty() {
        warn!(
            "{} of {} workers failed, reporting the best solution found so far",
            failures.len(),
            num_threads
        );
    }

    RunReport {
        iterations: shared.counters.iterations_started(),
        elapsed: start.elapsed(),
        failures,
        reset_cycles: shared.barrier.generation(),
    }
}

/// Run one worker, turning errors and panics into a failure record and a
/// cancellation of the whole run.
fn run_isolated<P, D, E, F>(
    id: usize,
    population: &P,
    shared: &SharedSearch,
    settings: WorkerSettings,
    make_operators: &F,
) -> Option<WorkerFailure>
where
    P: SharedPopulation + ?Sized,
    D: Decoder,
    E: Educator,
    F: Fn(usize) -> (D, E) + Sync,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let (decoder, educator) = make_operators(id);
        Worker::new(id, population, shared, settings, decoder, educator).run()
    }));

    let message = match outcome {
        Ok(Ok(())) => return None,
        Ok(Err(err)) => err.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };
    shared.token.cancel();
    Some(WorkerFailure {
        worker: id,
        message,
    })
}

/// Sleep until the token is cancelled or the time limit is reached.
fn monitor(token: &CancellationToken, start: Instant, controls: &RunControls) {
    let interval = controls.monitor_interval.max(MIN_MONITOR_INTERVAL);
    while !token.is_cancelled() {
        let pause = match controls.time_limit {
            Some(limit) => {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    info!("time limit of {:.2}s reached", limit.as_secs_f64());
                    return;
                }
                (limit - elapsed).min(interval)
            }
            None => interval,
        };
        thread::sleep(pause);
    }
}

/// Text of a panic payload, for the two payload types `panic!` produces.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
