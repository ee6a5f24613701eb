//! # PHGS-CVRP
//!
//! A parallel Rust implementation of the Hybrid Genetic Search algorithm for
//! the Capacitated Vehicle Routing Problem (CVRP).
//!
//! Based on the paper "Hybrid Genetic Search for the CVRP: Open-Source Implementation
//! and SWAP* Neighborhood" by Thibaut Vidal.
//!
//! Several worker threads share one population. Each worker repeatedly selects
//! two parents, recombines them with an ordered crossover, decodes the offspring
//! with Split, improves it by local search and inserts it back. When the search
//! stagnates, all workers meet at a barrier and the population is regenerated.

pub mod config;
pub mod controller;
pub mod error;
pub mod genetic;
pub mod individual;
pub mod local_search;
pub mod population;
pub mod problem;
pub mod solution;
pub mod split;
pub mod sync;
pub mod utils;
pub mod worker;

use crate::config::Config;
use crate::controller::{run_workers, RunControls, WorkerFailure};
use crate::individual::Individual;
use crate::local_search::LocalSearch;
use crate::population::Population;
use crate::problem::Problem;
use crate::solution::Solution;
use crate::split::Split;
use crate::sync::CancellationToken;
use crate::worker::WorkerSettings;

use log::info;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The main algorithm structure that orchestrates the hybrid genetic search.
pub struct HgsAlgorithm {
    pub problem: Arc<Problem>,
    pub population: Population,
    pub config: Config,
    pub best_solution: Option<Individual>,
    pub run_time: Duration,
    /// Time spent in the worker phase of the last run
    pub search_time: Duration,
    /// Iterations started by all workers together
    pub iterations: u64,
    pub failures: Vec<WorkerFailure>,
}

impl HgsAlgorithm {
    /// Create a new HGS instance for the given problem and configuration.
    ///
    /// A fleet size set in the configuration overrides the one of the problem.
    pub fn new(mut problem: Problem, config: Config) -> Self {
        if config.nb_vehicles.is_some() {
            problem.max_vehicles = config.nb_vehicles;
        }
        let problem = Arc::new(problem);

        HgsAlgorithm {
            population: Population::new(Arc::clone(&problem), &config),
            problem,
            config,
            best_solution: None,
            run_time: Duration::from_secs(0),
            search_time: Duration::from_secs(0),
            iterations: 0,
            failures: Vec::new(),
        }
    }

    /// Initialize the population with random, educated solutions.
    pub fn initialize(&mut self) {
        self.population.generate_population();
        self.best_solution = self.population.best_found();
    }

    /// Run the algorithm until the token is cancelled, the time limit expires
    /// or the search stagnates. Returns the best feasible solution, if any.
    ///
    /// The population is generated on the first call only; later calls resume
    /// the search from the current population. The time limit applies to the
    /// worker phase and starts once the population exists.
    ///
    /// Worker failures do not abort the run; they are kept in
    /// [`HgsAlgorithm::failures`].
    pub fn run(&mut self, token: &CancellationToken) -> Option<&Individual> {
        let start_time = Instant::now();

        if self.population.get_pop_size() == 0 {
            self.initialize();
        }

        let settings = WorkerSettings::from_config(&self.config);
        let controls = RunControls::from_config(&self.config);

        info!("----- STARTING PARALLEL GENETIC ALGORITHM");
        let problem = &self.problem;
        let granularity = self.config.granularity;
        let report = run_workers(&self.population, settings, controls, token, |id| {
            let seed = settings.base_seed.wrapping_add(id as u64);
            (
                Split::new(Arc::clone(problem)),
                LocalSearch::new(Arc::clone(problem), granularity, seed),
            )
        });

        self.run_time = start_time.elapsed();
        self.search_time = report.elapsed;
        self.iterations = report.iterations;
        self.failures = report.failures;
        self.best_solution = self.population.best_found();

        info!(
            "----- PARALLEL GENETIC ALGORITHM FINISHED. TIME SPENT: {:.2}s, ITERATIONS: {}, RESETS: {}",
            self.run_time.as_secs_f64(),
            self.iterations,
            report.reset_cycles
        );
        self.best_solution.as_ref()
    }

    /// The best solution in exported form.
    pub fn solution(&self) -> Option<Solution> {
        self.best_solution
            .as_ref()
            .map(|best| Solution::from_individual(best, &self.problem))
    }
}
