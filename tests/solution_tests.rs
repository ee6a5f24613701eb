//! Tests for the exported solution representation.

use phgs_cvrp::individual::{Individual, Penalties};
use phgs_cvrp::problem::{Node, Problem};
use phgs_cvrp::solution::{Route, Solution};
use std::fs;

/// Creates a simple test problem with a depot and some customers.
fn create_test_problem() -> Problem {
    let nodes = vec![
        Node::new(0, 0.0, 0.0, 0.0, true),
        Node::new(1, 3.0, 4.0, 2.0, false),
        Node::new(2, 6.0, 8.0, 3.0, false),
        Node::new(3, -3.0, 4.0, 4.0, false),
        Node::new(4, -6.0, 8.0, 1.0, false),
    ];

    Problem::new(
        "TestProblem".to_string(),
        nodes,
        0,    // depot index
        6.0,  // vehicle capacity
        None, // no max vehicles constraint
    )
}

fn create_test_solution(problem: &Problem) -> Solution {
    let mut individual = Individual::new(problem);
    individual.routes = vec![vec![1, 2], vec![3, 4]];
    individual.evaluate_complete_cost(problem, Penalties::new(100.0, 1.0));
    Solution::from_individual(&individual, problem)
}

#[test]
fn test_route_creation() {
    let problem = create_test_problem();
    let route = Route::new(&problem, vec![1, 2]);

    // depot -> 1 -> 2 -> depot = 5 + 5 + 10
    assert!((route.distance - 20.0).abs() < 1e-9);
    assert_eq!(route.load, 5.0);
    assert!(!route.exceeds_capacity(problem.vehicle_capacity));
    assert!(route.exceeds_capacity(4.0));
}

#[test]
fn test_solution_from_individual() {
    let problem = create_test_problem();
    let solution = create_test_solution(&problem);

    assert_eq!(solution.get_route_count(), 2);
    assert!(solution.is_feasible);
    assert!((solution.distance - 40.0).abs() < 1e-9);
    assert_eq!(solution.cost, solution.distance);
    assert_eq!(solution.routes[1].customers, vec![3, 4]);
    assert_eq!(solution.routes[1].load, 5.0);
}

#[test]
fn test_write_cvrplib_format() {
    let problem = create_test_problem();
    let solution = create_test_solution(&problem);

    let mut buffer = Vec::new();
    solution.write_cvrplib(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();

    assert_eq!(text, "Route #1: 1 2\nRoute #2: 3 4\nCost 40\n");
}

#[test]
fn test_export_files() {
    let problem = create_test_problem();
    let solution = create_test_solution(&problem);
    let dir = std::env::temp_dir().join(format!("phgs_solution_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();

    let sol_path = dir.join("tiny.sol");
    solution.export_cvrplib(&sol_path).unwrap();
    assert!(fs::read_to_string(&sol_path).unwrap().starts_with("Route #1:"));

    let json_path = dir.join("tiny.json");
    solution.export_json(&json_path).unwrap();
    let parsed: Solution = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(parsed.routes, solution.routes);
    assert_eq!(parsed.cost, solution.cost);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_solution_debug_output() {
    let problem = create_test_problem();
    let solution = create_test_solution(&problem);

    let debug = format!("{:?}", solution);
    assert!(debug.contains("Cost: 40.00"));
    assert!(debug.contains("Routes: 2"));
    assert!(debug.contains("Route 0: [1, 2]"));
}
