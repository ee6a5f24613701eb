//! Integration tests for the full parallel HGS-CVRP algorithm.

use phgs_cvrp::config::Config;
use phgs_cvrp::problem::{Node, Problem};
use phgs_cvrp::sync::CancellationToken;
use phgs_cvrp::HgsAlgorithm;
use std::thread;
use std::time::Duration;

/// Creates a moderate size test problem with a depot and customers.
fn create_moderate_problem() -> Problem {
    let mut nodes = Vec::new();

    // Depot at (50, 50)
    nodes.push(Node::new(0, 50.0, 50.0, 0.0, true));

    // Create 20 customers in a grid pattern
    let mut id = 1;
    for i in 0..4 {
        for j in 0..5 {
            let x = i as f64 * 20.0 + 10.0;
            let y = j as f64 * 20.0 + 10.0;
            let demand = 1.0 + 0.1 * (id as f64 % 3.0);
            nodes.push(Node::new(id, x, y, demand, false));
            id += 1;
        }
    }

    Problem::new(
        "ModerateTestProblem".to_string(),
        nodes,
        0,    // depot index
        10.0, // vehicle capacity
        None, // no max vehicles constraint
    )
}

fn small_config() -> Config {
    Config::new()
        .with_min_pop_size(10)
        .with_generation_size(20)
        .with_num_threads(2)
        .with_monitor_interval(Duration::from_millis(10))
}

#[test]
fn test_algorithm_initialization() {
    let problem = create_moderate_problem();
    let mut algorithm = HgsAlgorithm::new(problem, small_config());
    algorithm.initialize();

    // Population should be initialized
    assert!(algorithm.population.get_pop_size() >= 10);

    // Best solution should be set and feasible
    assert!(algorithm.best_solution.as_ref().unwrap().is_feasible());
}

#[test]
fn test_algorithm_short_run() {
    let problem = create_moderate_problem();
    let config = small_config()
        .with_max_iterations_without_improvement(100)
        .with_time_limit(Duration::from_secs(1));

    let mut algorithm = HgsAlgorithm::new(problem, config);
    let vehicle_capacity = algorithm.problem.vehicle_capacity;
    let number_nodes = algorithm.problem.nodes.len();

    let token = CancellationToken::new();
    assert!(algorithm.run(&token).is_some());
    assert!(algorithm.failures.is_empty());

    let solution = algorithm.solution().unwrap();
    assert!(solution.is_feasible);
    assert!(solution.distance > 0.0);

    // Each route should respect capacity
    for route in &solution.routes {
        assert!(route.load <= vehicle_capacity);
    }

    // All customers should be visited exactly once
    let mut visited = vec![false; number_nodes];
    for route in &solution.routes {
        for &customer in &route.customers {
            assert!(!visited[customer], "Customer visited more than once");
            visited[customer] = true;
        }
    }

    for i in 1..number_nodes {
        assert!(visited[i], "Customer {} not visited", i);
    }
}

#[test]
fn test_algorithm_termination_time_limit() {
    let problem = create_moderate_problem();
    let time_limit = Duration::from_millis(300);

    let config = small_config()
        .with_max_iterations_without_improvement(1_000_000) // time is the limiting factor
        .with_time_limit(time_limit);

    let mut algorithm = HgsAlgorithm::new(problem, config);
    algorithm.run(&CancellationToken::new());

    assert!(algorithm.run_time >= time_limit);
    assert!(algorithm.run_time < Duration::from_secs(30));
    assert!(algorithm.iterations > 0);
}

#[test]
fn test_algorithm_termination_stagnation() {
    let problem = create_moderate_problem();

    // No time limit: the search ends once it stops improving
    let config = small_config().with_max_iterations_without_improvement(50);

    let mut algorithm = HgsAlgorithm::new(problem, config);
    let best = algorithm.run(&CancellationToken::new());

    assert!(best.is_some());
    assert!(algorithm.iterations >= 50);
    assert!(algorithm.failures.is_empty());
}

#[test]
fn test_algorithm_external_cancellation() {
    let problem = create_moderate_problem();
    let config = small_config().with_max_iterations_without_improvement(1_000_000);
    let mut algorithm = HgsAlgorithm::new(problem, config);

    let token = CancellationToken::new();
    let canceller = token.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        canceller.cancel();
    });

    let best = algorithm.run(&token).cloned();
    handle.join().unwrap();

    assert!(best.is_some());
    assert!(algorithm.run_time < Duration::from_secs(30));
}

#[test]
fn test_algorithm_improvement() {
    let problem = create_moderate_problem();
    let config = small_config()
        .with_min_pop_size(5)
        .with_generation_size(10)
        .with_max_iterations_without_improvement(200)
        .with_time_limit(Duration::from_secs(2));

    let mut algorithm = HgsAlgorithm::new(problem, config);
    algorithm.initialize();
    let initial_cost = algorithm.best_solution.as_ref().unwrap().get_cost();

    let final_cost = algorithm.run(&CancellationToken::new()).unwrap().get_cost();

    // The overall best never gets worse
    assert!(final_cost <= initial_cost);
}

#[test]
fn test_algorithm_multiple_runs_consistency() {
    let problem = create_moderate_problem();
    let config = small_config()
        .with_max_iterations_without_improvement(200)
        .with_time_limit(Duration::from_secs(1));

    let mut algorithm1 = HgsAlgorithm::new(problem.clone(), config.clone().with_seed(1));
    let cost1 = algorithm1.run(&CancellationToken::new()).unwrap().get_cost();

    let mut algorithm2 = HgsAlgorithm::new(problem, config.with_seed(2));
    let cost2 = algorithm2.run(&CancellationToken::new()).unwrap().get_cost();

    // Similar quality, not necessarily identical
    let ratio = cost1 / cost2;
    assert!(ratio > 0.8 && ratio < 1.25);
}

#[test]
fn test_algorithm_with_fixed_fleet() {
    let problem = create_moderate_problem();
    let config = small_config()
        .with_nb_vehicles(4)
        .with_max_iterations_without_improvement(100)
        .with_time_limit(Duration::from_secs(1));

    let mut algorithm = HgsAlgorithm::new(problem, config);
    assert_eq!(algorithm.problem.max_vehicles, Some(4));

    let best = algorithm.run(&CancellationToken::new()).cloned().unwrap();
    assert!(best.eval.nb_routes <= 4);
}

#[test]
fn test_algorithm_records_progress_traces() {
    let problem = create_moderate_problem();
    let config = small_config()
        .with_trace_interval(20)
        .with_max_iterations_without_improvement(1_000_000)
        .with_time_limit(Duration::from_millis(500));

    let mut algorithm = HgsAlgorithm::new(problem, config);
    algorithm.run(&CancellationToken::new());

    let stats = algorithm.population.feasible_stats();
    assert!(!stats.is_empty());
    assert!(stats.windows(2).all(|w| w[0].iteration < w[1].iteration));
    assert!(stats.iter().all(|s| s.iteration % 20 == 0));
    assert!(!algorithm.population.search_progress().is_empty());
}

#[test]
fn test_time_limit_starts_after_population_generation() {
    let problem = create_moderate_problem();
    let time_limit = Duration::from_millis(150);
    let config = Config::new()
        .with_num_threads(2)
        .with_max_iterations_without_improvement(1_000_000)
        .with_monitor_interval(Duration::from_millis(5))
        .with_time_limit(time_limit);

    let mut algorithm = HgsAlgorithm::new(problem, config);
    algorithm.run(&CancellationToken::new());

    // The workers get the whole budget; generation comes on top
    assert!(algorithm.search_time >= time_limit);
    assert!(algorithm.run_time > algorithm.search_time);
    assert!(algorithm.iterations > 0);
}

#[test]
fn test_second_run_resumes_existing_population() {
    let problem = create_moderate_problem();
    // Large generation size, so no survivor selection hides extra insertions
    let config = small_config()
        .with_min_pop_size(5)
        .with_generation_size(1000)
        .with_max_iterations_without_improvement(1_000_000);

    let mut algorithm = HgsAlgorithm::new(problem, config);
    algorithm.initialize();
    let generated = algorithm.population.get_pop_size();
    let initial_cost = algorithm.best_solution.as_ref().unwrap().get_cost();

    let token = CancellationToken::new();
    token.cancel();
    let best = algorithm.run(&token).cloned().unwrap();

    assert_eq!(algorithm.population.get_pop_size(), generated);
    assert!(best.get_cost() <= initial_cost);
    assert!(algorithm.failures.is_empty());
}
