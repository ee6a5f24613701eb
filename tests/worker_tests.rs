//! Tests for the worker loop and the run controller, driven by an
//! instrumented population.

use phgs_cvrp::config::Config;
use phgs_cvrp::controller::{run_workers, RunControls};
use phgs_cvrp::error::SolverError;
use phgs_cvrp::individual::{Evaluation, Individual, Penalties};
use phgs_cvrp::sync::{CancellationToken, SharedSearch};
use phgs_cvrp::worker::{Decoder, Educator, SharedPopulation, Worker, WorkerSettings};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Population double that records every call the workers make.
#[derive(Default)]
struct MockPopulation {
    improving: AtomicBool,
    fail_selection: bool,
    added: AtomicUsize,
    repaired: AtomicUsize,
    penalty_updates: AtomicUsize,
    restarts: AtomicUsize,
    /// Set while `manage_penalties` or `restart` runs
    exclusive: AtomicBool,
    traces: Mutex<Vec<u64>>,
}

impl MockPopulation {
    fn enter_exclusive(&self) {
        assert!(
            !self.exclusive.swap(true, Ordering::SeqCst),
            "penalty management and restart overlapped"
        );
    }

    fn leave_exclusive(&self) {
        self.exclusive.store(false, Ordering::SeqCst);
    }
}

impl SharedPopulation for MockPopulation {
    fn binary_tournament(&self) -> Result<Individual, SolverError> {
        if self.fail_selection {
            return Err(SolverError::EmptyPopulation);
        }
        Ok(Individual::from_giant_tour(vec![1, 2, 3, 4, 5]))
    }

    fn add_individual(&self, _individual: &Individual, update_feasible: bool) -> bool {
        self.added.fetch_add(1, Ordering::SeqCst);
        if !update_feasible {
            self.repaired.fetch_add(1, Ordering::SeqCst);
        }
        self.improving.load(Ordering::SeqCst)
    }

    fn penalties(&self) -> Penalties {
        Penalties::new(1.0, 1.0)
    }

    fn manage_penalties(&self) {
        self.enter_exclusive();
        self.penalty_updates.fetch_add(1, Ordering::SeqCst);
        self.leave_exclusive();
    }

    fn restart(&self) {
        self.enter_exclusive();
        thread::sleep(Duration::from_millis(1));
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.leave_exclusive();
    }

    fn print_state(&self, iteration: u64, _nb_iter_no_improvement: u64) {
        self.traces.lock().unwrap().push(iteration);
    }
}

/// Puts the whole tour in one route; feasibility is fixed.
struct MockDecoder {
    feasible: bool,
}

impl Decoder for MockDecoder {
    fn decode(&mut self, individual: &mut Individual, _penalties: Penalties, _max_vehicles: usize) {
        individual.routes = vec![individual.giant_tour.clone()];
        individual.eval = Evaluation {
            penalized_cost: 10.0,
            nb_routes: 1,
            distance: 10.0,
            capacity_excess: if self.feasible { 0.0 } else { 1.0 },
            duration_excess: 0.0,
            is_feasible: self.feasible,
        };
    }
}

/// Optionally repairs individuals under strong penalties, optionally panics.
#[derive(Default)]
struct MockEducator {
    calls: usize,
    repairs: bool,
    panic_on_call: Option<usize>,
}

impl Educator for MockEducator {
    fn educate(&mut self, individual: &mut Individual, penalties: Penalties) {
        self.calls += 1;
        if self.panic_on_call == Some(self.calls) {
            panic!("educator exploded");
        }
        if self.repairs && penalties.capacity >= 10.0 {
            individual.eval.capacity_excess = 0.0;
            individual.eval.is_feasible = true;
        }
    }
}

fn settings(reset_threshold: u64, stagnation_stop: Option<u64>) -> WorkerSettings {
    WorkerSettings {
        penalty_interval: 100,
        trace_interval: 100,
        reset_threshold,
        stagnation_stop,
        base_seed: 1,
    }
}

fn feasible_operators() -> (MockDecoder, MockEducator) {
    (MockDecoder { feasible: true }, MockEducator::default())
}

#[test]
fn test_settings_replace_zero_intervals() {
    let config = Config::new()
        .with_penalty_management_interval(0)
        .with_trace_interval(0)
        .with_max_iterations_without_improvement(0)
        .with_seed(9);
    let settings = WorkerSettings::from_config(&config);

    assert_eq!(settings.penalty_interval, 100);
    assert_eq!(settings.trace_interval, 100);
    assert_eq!(settings.reset_threshold, 1000);
    assert_eq!(settings.stagnation_stop, Some(0));
    assert_eq!(settings.base_seed, 9);
}

#[test]
fn test_settings_stop_only_without_time_limit() {
    let config = Config::new().with_max_iterations_without_improvement(500);
    assert_eq!(WorkerSettings::from_config(&config).stagnation_stop, Some(500));

    let timed = config.with_time_limit(Duration::from_secs(10));
    let settings = WorkerSettings::from_config(&timed);
    assert_eq!(settings.stagnation_stop, None);
    assert_eq!(settings.reset_threshold, 500);
}

#[test]
fn test_zero_time_limit_means_unbounded() {
    let built = Config::new()
        .with_max_iterations_without_improvement(200)
        .with_time_limit(Duration::ZERO);
    assert_eq!(built.time_limit, None);

    // A zero limit can still arrive through a configuration file
    let mut loaded = Config::new().with_max_iterations_without_improvement(200);
    loaded.time_limit = Some(Duration::ZERO);

    for config in [&built, &loaded] {
        assert_eq!(config.effective_time_limit(), None);
        assert_eq!(WorkerSettings::from_config(config).stagnation_stop, Some(200));
        assert_eq!(RunControls::from_config(config).time_limit, None);
    }
}

#[test]
fn test_controller_runs_to_stagnation_with_zero_time_limit() {
    let mut config = Config::new()
        .with_num_threads(2)
        .with_max_iterations_without_improvement(200)
        .with_monitor_interval(Duration::from_millis(5));
    config.time_limit = Some(Duration::ZERO);

    let population = MockPopulation::default();
    let token = CancellationToken::new();
    let report = run_workers(
        &population,
        WorkerSettings::from_config(&config),
        RunControls::from_config(&config),
        &token,
        |_| feasible_operators(),
    );

    assert!(report.failures.is_empty());
    assert!(report.iterations >= 200);
    assert!(token.is_cancelled());
}

#[test]
fn test_stagnation_counter_follows_improvements() {
    let population = MockPopulation::default();
    let shared = SharedSearch::new(1, CancellationToken::new());
    let (decoder, educator) = feasible_operators();
    let mut worker = Worker::new(0, &population, &shared, settings(1000, None), decoder, educator);

    for _ in 0..3 {
        assert!(worker.step().unwrap().is_continue());
    }
    assert_eq!(shared.counters.no_improvement(), 3);

    population.improving.store(true, Ordering::SeqCst);
    worker.step().unwrap();
    assert_eq!(shared.counters.no_improvement(), 0);

    population.improving.store(false, Ordering::SeqCst);
    worker.step().unwrap();
    assert_eq!(shared.counters.no_improvement(), 1);
    assert_eq!(shared.counters.iterations_started(), 5);
}

#[test]
fn test_early_stop_without_time_limit() {
    let population = MockPopulation::default();
    let token = CancellationToken::new();
    let shared = SharedSearch::new(1, token.clone());
    let (decoder, educator) = feasible_operators();
    let mut worker = Worker::new(0, &population, &shared, settings(5, Some(5)), decoder, educator);

    worker.run().unwrap();

    assert!(token.is_cancelled());
    assert_eq!(shared.counters.iterations_started(), 5);
    assert_eq!(population.restarts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reset_instead_of_stop_with_time_limit() {
    let population = MockPopulation::default();
    let shared = SharedSearch::new(1, CancellationToken::new());
    let (decoder, educator) = feasible_operators();
    let mut worker = Worker::new(0, &population, &shared, settings(5, None), decoder, educator);

    for _ in 0..12 {
        assert!(worker.step().unwrap().is_continue());
    }

    // Restarts at iterations 5 and 10, each clearing the stagnation counter
    assert_eq!(population.restarts.load(Ordering::SeqCst), 2);
    assert_eq!(shared.barrier.generation(), 2);
    assert_eq!(shared.counters.no_improvement(), 2);
    assert!(!shared.token.is_cancelled());
}

#[test]
fn test_zero_bound_without_time_limit_stops_at_fallback_threshold() {
    let config = Config::new().with_max_iterations_without_improvement(0);
    let population = MockPopulation::default();
    let token = CancellationToken::new();
    let shared = SharedSearch::new(1, token.clone());
    let (decoder, educator) = feasible_operators();
    let mut worker = Worker::new(
        0,
        &population,
        &shared,
        WorkerSettings::from_config(&config),
        decoder,
        educator,
    );

    worker.run().unwrap();

    // The first stagnation event happens at the fallback reset threshold
    assert!(token.is_cancelled());
    assert_eq!(shared.counters.iterations_started(), 1000);
    assert_eq!(population.restarts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_penalty_and_trace_intervals() {
    let population = MockPopulation::default();
    let shared = SharedSearch::new(1, CancellationToken::new());
    let (decoder, educator) = feasible_operators();
    let worker_settings = WorkerSettings {
        penalty_interval: 3,
        trace_interval: 4,
        ..settings(1000, None)
    };
    let mut worker = Worker::new(0, &population, &shared, worker_settings, decoder, educator);

    for _ in 0..12 {
        worker.step().unwrap();
    }

    assert_eq!(population.penalty_updates.load(Ordering::SeqCst), 4);
    assert_eq!(*population.traces.lock().unwrap(), vec![4, 8, 12]);
}

#[test]
fn test_penalty_management_skipped_while_gate_held() {
    let population = MockPopulation::default();
    let shared = SharedSearch::new(1, CancellationToken::new());
    let (decoder, educator) = feasible_operators();
    let worker_settings = WorkerSettings {
        penalty_interval: 3,
        ..settings(1000, None)
    };
    let mut worker = Worker::new(0, &population, &shared, worker_settings, decoder, educator);

    let held = shared.gate.try_enter();
    assert!(held.is_some());
    for _ in 0..3 {
        worker.step().unwrap();
    }
    assert_eq!(population.penalty_updates.load(Ordering::SeqCst), 0);

    drop(held);
    for _ in 0..3 {
        worker.step().unwrap();
    }
    assert_eq!(population.penalty_updates.load(Ordering::SeqCst), 1);
}

#[test]
fn test_infeasible_offspring_are_sometimes_repaired() {
    let population = MockPopulation::default();
    let shared = SharedSearch::new(1, CancellationToken::new());
    let decoder = MockDecoder { feasible: false };
    let educator = MockEducator {
        repairs: true,
        ..MockEducator::default()
    };
    let mut worker = Worker::new(0, &population, &shared, settings(1000, None), decoder, educator);

    for _ in 0..40 {
        worker.step().unwrap();
    }

    let repaired = population.repaired.load(Ordering::SeqCst);
    assert!(repaired > 0 && repaired < 40, "repaired {} of 40", repaired);
    assert_eq!(population.added.load(Ordering::SeqCst), 40 + repaired);
}

#[test]
fn test_failure_isolation_reports_one_failure() {
    let population = MockPopulation::default();
    let token = CancellationToken::new();
    let controls = RunControls {
        num_threads: 3,
        time_limit: None,
        monitor_interval: Duration::from_millis(5),
    };

    let report = run_workers(&population, settings(1_000_000, None), controls, &token, |id| {
        let educator = MockEducator {
            panic_on_call: if id == 1 { Some(1) } else { None },
            ..MockEducator::default()
        };
        (MockDecoder { feasible: true }, educator)
    });

    assert!(token.is_cancelled());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].worker, 1);
    assert!(report.failures[0].message.contains("educator exploded"));
}

#[test]
fn test_worker_errors_are_captured() {
    let population = MockPopulation {
        fail_selection: true,
        ..MockPopulation::default()
    };
    let token = CancellationToken::new();
    let controls = RunControls {
        num_threads: 2,
        time_limit: None,
        monitor_interval: Duration::from_millis(5),
    };

    let report = run_workers(&population, settings(1000, None), controls, &token, |_| {
        feasible_operators()
    });

    assert!(!report.failures.is_empty() && report.failures.len() <= 2);
    for failure in &report.failures {
        assert_eq!(failure.message, SolverError::EmptyPopulation.to_string());
    }
}

#[test]
fn test_controller_stops_on_stagnation_without_time_limit() {
    let population = MockPopulation::default();
    let token = CancellationToken::new();
    let controls = RunControls {
        num_threads: 2,
        time_limit: None,
        monitor_interval: Duration::from_millis(5),
    };

    let report = run_workers(&population, settings(50, Some(50)), controls, &token, |_| {
        feasible_operators()
    });

    assert!(report.failures.is_empty());
    assert!(report.iterations >= 50);
    assert_eq!(population.restarts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_controller_honours_time_limit() {
    let population = MockPopulation::default();
    let token = CancellationToken::new();
    let controls = RunControls {
        num_threads: 2,
        time_limit: Some(Duration::from_millis(100)),
        monitor_interval: Duration::from_millis(10),
    };

    let report = run_workers(&population, settings(1_000_000, None), controls, &token, |_| {
        feasible_operators()
    });

    assert!(report.failures.is_empty());
    assert!(report.elapsed >= Duration::from_millis(100));
    assert!(report.elapsed < Duration::from_secs(10));
    assert!(report.iterations > 0);
}

#[test]
fn test_controller_honours_external_cancellation() {
    let population = MockPopulation::default();
    let token = CancellationToken::new();
    let controls = RunControls {
        num_threads: 2,
        time_limit: None,
        monitor_interval: Duration::from_millis(5),
    };

    let report = thread::scope(|scope| {
        let canceller = token.clone();
        scope.spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        run_workers(&population, settings(1_000_000, None), controls, &token, |_| {
            feasible_operators()
        })
    });

    assert!(report.failures.is_empty());
    assert!(report.elapsed >= Duration::from_millis(50));
}

#[test]
fn test_workers_restart_together_without_overlap() {
    let population = MockPopulation::default();
    let token = CancellationToken::new();
    let controls = RunControls {
        num_threads: 3,
        time_limit: Some(Duration::from_millis(300)),
        monitor_interval: Duration::from_millis(10),
    };
    let worker_settings = WorkerSettings {
        penalty_interval: 2,
        ..settings(20, None)
    };

    let report = run_workers(&population, worker_settings, controls, &token, |_| {
        feasible_operators()
    });

    // Overlapping restart and penalty management would have panicked a worker
    assert!(report.failures.is_empty());
    assert!(report.reset_cycles >= 1);
    assert!(population.restarts.load(Ordering::SeqCst) >= 1);
    assert!(population.restarts.load(Ordering::SeqCst) as u64 <= report.reset_cycles);
}
