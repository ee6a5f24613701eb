//! Configuration parameters for the HGS-CVRP algorithm.

use crate::error::SolverError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Worker count used when none is configured.
pub const DEFAULT_NUM_THREADS: usize = 2;
/// Fallback interval for penalty management and progress traces.
pub const DEFAULT_INTERVAL: u64 = 100;
/// Fallback number of non-improving iterations before a reset.
pub const DEFAULT_RESET_INTERVAL: u64 = 1000;

/// Configuration settings for the HGS-CVRP algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum population size (μ)
    pub min_pop_size: usize,
    /// Number of individuals in a generation (λ)
    pub generation_size: usize,
    /// Number of elite individuals considered in fitness calculation
    pub n_elite: usize,
    /// Number of closest solutions considered in diversity calculation
    pub n_closest: usize,
    /// Granularity parameter for local search neighborhoods
    pub granularity: usize,
    /// Target proportion of feasible individuals
    pub target_feasible_ratio: f64,
    /// Multiplier applied to a penalty when too few individuals are feasible
    pub penalty_increase: f64,
    /// Multiplier applied to a penalty when too many individuals are feasible
    pub penalty_decrease: f64,
    /// Non-improving iterations before a population reset; without a time
    /// limit, also the number after which the search stops
    pub max_iterations_without_improvement: u64,
    /// Iterations between two penalty adaptations
    pub nb_iter_penalty_management: u64,
    /// Iterations between two progress traces
    pub nb_iter_traces: u64,
    /// Time limit of the worker phase; `None` or zero for no limit
    pub time_limit: Option<Duration>,
    /// Base seed; worker `i` uses `seed + i`
    pub seed: u64,
    /// Number of worker threads, 0 for the default
    pub num_threads: usize,
    /// Fleet size, if fixed
    pub nb_vehicles: Option<usize>,
    pub verbose: bool,
    /// How often the run controller checks the termination conditions
    pub monitor_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_pop_size: 25,
            generation_size: 40,
            n_elite: 4,
            n_closest: 5,
            granularity: 20,
            target_feasible_ratio: 0.2,
            penalty_increase: 1.2,
            penalty_decrease: 0.85,
            max_iterations_without_improvement: 20000,
            nb_iter_penalty_management: 100,
            nb_iter_traces: 500,
            time_limit: None,
            seed: 0,
            num_threads: 0,
            nb_vehicles: None,
            verbose: true,
            monitor_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Config::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SolverError> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot drive a meaningful search.
    pub fn validate(&self) -> Result<(), SolverError> {
        if self.min_pop_size == 0 {
            return Err(SolverError::InvalidConfig(
                "min_pop_size must be at least 1".into(),
            ));
        }
        if !(self.penalty_increase > 1.0) {
            return Err(SolverError::InvalidConfig(
                "penalty_increase must be greater than 1".into(),
            ));
        }
        if !(self.penalty_decrease > 0.0 && self.penalty_decrease < 1.0) {
            return Err(SolverError::InvalidConfig(
                "penalty_decrease must lie in (0, 1)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.target_feasible_ratio) {
            return Err(SolverError::InvalidConfig(
                "target_feasible_ratio must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// The wall-clock budget, with a zero duration read as unbounded.
    pub fn effective_time_limit(&self) -> Option<Duration> {
        self.time_limit.filter(|limit| !limit.is_zero())
    }

    /// Number of worker threads actually launched.
    pub fn effective_num_threads(&self) -> usize {
        if self.num_threads > 0 {
            self.num_threads
        } else {
            DEFAULT_NUM_THREADS
        }
    }

    /// Set the minimum population size.
    pub fn with_min_pop_size(mut self, size: usize) -> Self {
        self.min_pop_size = size;
        self
    }

    /// Set the generation size.
    pub fn with_generation_size(mut self, size: usize) -> Self {
        self.generation_size = size;
        self
    }

    /// Set the number of elite individuals.
    pub fn with_n_elite(mut self, n: usize) -> Self {
        self.n_elite = n;
        self
    }

    /// Set the number of closest solutions for diversity calculation.
    pub fn with_n_closest(mut self, n: usize) -> Self {
        self.n_closest = n;
        self
    }

    /// Set the granularity parameter.
    pub fn with_granularity(mut self, g: usize) -> Self {
        self.granularity = g;
        self
    }

    /// Set the target ratio of feasible individuals.
    pub fn with_target_feasible_ratio(mut self, ratio: f64) -> Self {
        self.target_feasible_ratio = ratio;
        self
    }

    /// Set the maximum iterations without improvement.
    pub fn with_max_iterations_without_improvement(mut self, iterations: u64) -> Self {
        self.max_iterations_without_improvement = iterations;
        self
    }

    /// Set the penalty management interval.
    pub fn with_penalty_management_interval(mut self, iterations: u64) -> Self {
        self.nb_iter_penalty_management = iterations;
        self
    }

    /// Set the progress trace interval.
    pub fn with_trace_interval(mut self, iterations: u64) -> Self {
        self.nb_iter_traces = iterations;
        self
    }

    /// Set the time limit. A zero duration means no limit.
    pub fn with_time_limit(mut self, duration: Duration) -> Self {
        self.time_limit = Some(duration).filter(|limit| !limit.is_zero());
        self
    }

    /// Set the base random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of worker threads.
    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Fix the fleet size.
    pub fn with_nb_vehicles(mut self, vehicles: usize) -> Self {
        self.nb_vehicles = Some(vehicles);
        self
    }

    /// Set the run controller's polling interval.
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }
}
