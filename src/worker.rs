//! The per-thread evolutionary loop.

use crate::config::{Config, DEFAULT_INTERVAL, DEFAULT_RESET_INTERVAL};
use crate::error::SolverError;
use crate::genetic::crossover_ox;
use crate::individual::{Individual, Penalties};
use crate::sync::{Arrival, SharedSearch};

pub use crate::local_search::Educator;
pub use crate::split::Decoder;

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::ControlFlow;

/// The population as seen by the workers.
///
/// Implementations synchronize internally. `manage_penalties` and `restart`
/// are never called concurrently with each other.
pub trait SharedPopulation: Sync {
    /// Pick one individual by binary tournament and return a copy of it.
    fn binary_tournament(&self) -> Result<Individual, SolverError>;
    /// Store a copy of `individual`; returns whether it is a new best.
    fn add_individual(&self, individual: &Individual, update_feasible: bool) -> bool;
    fn penalties(&self) -> Penalties;
    fn manage_penalties(&self);
    fn restart(&self);
    fn print_state(&self, iteration: u64, nb_iter_no_improvement: u64);
}

/// Iteration thresholds of a worker, with zero intervals already replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub penalty_interval: u64,
    pub trace_interval: u64,
    /// Non-improving iterations before the workers meet at the reset barrier
    pub reset_threshold: u64,
    /// Non-improving iterations after which the search stops. Only set when
    /// the run has no time limit.
    pub stagnation_stop: Option<u64>,
    pub base_seed: u64,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        let or_default = |value: u64, default: u64| if value == 0 { default } else { value };
        let bound = config.max_iterations_without_improvement;

        WorkerSettings {
            penalty_interval: or_default(config.nb_iter_penalty_management, DEFAULT_INTERVAL),
            trace_interval: or_default(config.nb_iter_traces, DEFAULT_INTERVAL),
            reset_threshold: or_default(bound, DEFAULT_RESET_INTERVAL),
            stagnation_stop: config.effective_time_limit().map_or(Some(bound), |_| None),
            base_seed: config.seed,
        }
    }
}

/// One search thread: private decoder, educator and random stream, shared
/// population and coordination state.
pub struct Worker<'a, P: ?Sized, D, E> {
    id: usize,
    population: &'a P,
    shared: &'a SharedSearch,
    settings: WorkerSettings,
    decoder: D,
    educator: E,
    rng: ChaCha8Rng,
}

impl<'a, P, D, E> Worker<'a, P, D, E>
where
    P: SharedPopulation + ?Sized,
    D: Decoder,
    E: Educator,
{
    pub fn new(
        id: usize,
        population: &'a P,
        shared: &'a SharedSearch,
        settings: WorkerSettings,
        decoder: D,
        educator: E,
    ) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(settings.base_seed.wrapping_add(id as u64));
        Worker {
            id,
            population,
            shared,
            settings,
            decoder,
            educator,
            rng,
        }
    }

    /// Iterate until the run is cancelled or the search stagnates for good.
    pub fn run(&mut self) -> Result<(), SolverError> {
        debug!("worker {} started", self.id);
        while !self.shared.token.is_cancelled() {
            if self.step()?.is_break() {
                break;
            }
        }
        debug!("worker {} stopped", self.id);
        Ok(())
    }

    /// Run one iteration of the evolutionary loop.
    pub fn step(&mut self) -> Result<ControlFlow<()>, SolverError> {
        let shared = self.shared;
        let counters = &shared.counters;
        let iteration = counters.next_iteration();

        let parent1 = self.population.binary_tournament()?;
        let parent2 = self.population.binary_tournament()?;
        let penalties = self.population.penalties();

        let mut offspring =
            crossover_ox(&parent1, &parent2, &mut self.decoder, penalties, &mut self.rng);
        self.educator.educate(&mut offspring, penalties);
        let mut is_new_best = self.population.add_individual(&offspring, true);

        // Repair half of the infeasible offspring
        if !offspring.eval.is_feasible && self.rng.gen_bool(0.5) {
            self.educator.educate(&mut offspring, penalties.scaled(10.0));
            if offspring.eval.is_feasible {
                is_new_best |= self.population.add_individual(&offspring, false);
            }
        }

        if is_new_best {
            counters.record_improvement();
        } else {
            counters.record_no_improvement();
        }

        if iteration % self.settings.penalty_interval == 0 {
            if let Some(_gate) = shared.gate.try_enter() {
                self.population.manage_penalties();
            }
        }

        if iteration % self.settings.trace_interval == 0 && counters.claim_report(iteration) {
            self.population.print_state(iteration, counters.no_improvement());
        }

        let stagnation = counters.no_improvement();
        if stagnation < self.settings.reset_threshold {
            return Ok(ControlFlow::Continue(()));
        }

        if let Some(bound) = self.settings.stagnation_stop {
            if stagnation >= bound {
                info!(
                    "worker {}: no improvement in {} iterations, stopping the search",
                    self.id, stagnation
                );
                shared.token.cancel();
                return Ok(ControlFlow::Break(()));
            }
        }

        match shared.barrier.arrive(&shared.token) {
            Arrival::Leader(release) => {
                if let Some(_gate) = shared.gate.try_enter() {
                    self.population.restart();
                    counters.record_improvement();
                }
                release.release();
                Ok(ControlFlow::Continue(()))
            }
            Arrival::Released => Ok(ControlFlow::Continue(())),
            Arrival::Cancelled => Ok(ControlFlow::Break(())),
        }
    }
}
