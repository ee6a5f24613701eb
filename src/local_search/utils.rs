//! Utility functions for local search operations.

use crate::individual::Penalties;
use crate::problem::Problem;

/// Total distance of a route starting and ending at the depot.
pub fn route_distance(problem: &Problem, customers: &[usize]) -> f64 {
    let (first, last) = match (customers.first(), customers.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return 0.0,
    };

    let inner: f64 = customers
        .windows(2)
        .map(|w| problem.get_distance(w[0], w[1]))
        .sum();

    let depot = problem.depot_index;
    problem.get_distance(depot, first) + inner + problem.get_distance(last, depot)
}

/// Total demand served by a route.
pub fn route_load(problem: &Problem, customers: &[usize]) -> f64 {
    customers.iter().map(|&c| problem.nodes[c].demand).sum()
}

/// Distance plus weighted capacity and duration violations of a route.
pub fn route_penalized_cost(problem: &Problem, customers: &[usize], penalties: Penalties) -> f64 {
    if customers.is_empty() {
        return 0.0;
    }

    let distance = route_distance(problem, customers);
    let capacity_excess = (route_load(problem, customers) - problem.vehicle_capacity).max(0.0);
    let duration_excess = problem.duration_limit.map_or(0.0, |limit| {
        let service: f64 = customers
            .iter()
            .map(|&c| problem.nodes[c].service_duration)
            .sum();
        (distance + service - limit).max(0.0)
    });

    penalties.penalized_cost(distance, capacity_excess, duration_excess)
}
