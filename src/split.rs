//! Split algorithm implementation to convert a giant tour into routes.

use crate::individual::{Individual, Penalties};
use crate::problem::Problem;

use std::f64;
use std::sync::Arc;

/// Routes are never allowed to carry more than this multiple of the capacity.
const MAX_LOAD_FACTOR: f64 = 1.5;

/// Turns the giant tour of an individual into routes and evaluates it.
pub trait Decoder {
    /// Decode `individual` using at most `max_vehicles` routes when possible.
    fn decode(&mut self, individual: &mut Individual, penalties: Penalties, max_vehicles: usize);
}

/// Implements the Split algorithm to optimally partition a giant tour.
///
/// Each worker thread owns its own instance; the scratch buffers are reused
/// between calls.
pub struct Split {
    problem: Arc<Problem>,
    potential: Vec<Vec<f64>>,
    pred: Vec<Vec<usize>>,
}

impl Split {
    pub fn new(problem: Arc<Problem>) -> Self {
        Split {
            problem,
            potential: Vec::new(),
            pred: Vec::new(),
        }
    }

    /// Split the giant tour of `individual` into routes and evaluate it.
    ///
    /// The unlimited-fleet split is tried first; when it needs more than
    /// `max_vehicles` routes, the limited-fleet variant is used instead.
    /// `max_vehicles` is never taken below the bin-packing bound.
    pub fn split(&mut self, individual: &mut Individual, penalties: Penalties, max_vehicles: usize) {
        let problem = Arc::clone(&self.problem);
        let n = individual.giant_tour.len();

        if n == 0 {
            individual.routes.clear();
            individual.evaluate_complete_cost(&problem, penalties);
            return;
        }

        let max_vehicles = max_vehicles.max(problem.min_vehicles());

        let routes = match self.split_simple(&individual.giant_tour, penalties) {
            Some(routes) if routes.len() <= max_vehicles => routes,
            _ => self.split_limited_fleet(&individual.giant_tour, penalties, max_vehicles),
        };

        individual.routes = routes;
        individual.evaluate_complete_cost(&problem, penalties);
    }

    /// Penalized costs of the routes `tour[i..=j]` for every admissible `j`.
    fn route_costs<'a>(&'a self, tour: &'a [usize], i: usize, penalties: Penalties) -> RouteCosts<'a> {
        RouteCosts {
            problem: &self.problem,
            tour,
            start: i,
            next: i,
            load: 0.0,
            service: 0.0,
            distance: 0.0,
            penalties,
        }
    }

    /// Bellman split with an unlimited fleet.
    fn split_simple(&mut self, tour: &[usize], penalties: Penalties) -> Option<Vec<Vec<usize>>> {
        let n = tour.len();
        self.reset_buffers(1, n);

        self.potential[0][0] = 0.0;
        for i in 0..n {
            let base = self.potential[0][i];
            if !base.is_finite() {
                continue;
            }
            let costs: Vec<(usize, f64)> = self.route_costs(tour, i, penalties).collect();
            for (j, cost) in costs {
                if base + cost < self.potential[0][j + 1] {
                    self.potential[0][j + 1] = base + cost;
                    self.pred[0][j + 1] = i;
                }
            }
        }

        if !self.potential[0][n].is_finite() {
            return None;
        }

        let mut routes = Vec::new();
        let mut end = n;
        while end > 0 {
            let begin = self.pred[0][end];
            routes.push(tour[begin..end].to_vec());
            end = begin;
        }
        routes.reverse();
        Some(routes)
    }

    /// Bellman split using at most `max_vehicles` routes.
    fn split_limited_fleet(
        &mut self,
        tour: &[usize],
        penalties: Penalties,
        max_vehicles: usize,
    ) -> Vec<Vec<usize>> {
        let n = tour.len();
        self.reset_buffers(max_vehicles + 1, n);

        self.potential[0][0] = 0.0;
        for k in 0..max_vehicles {
            for i in k..n {
                let base = self.potential[k][i];
                if !base.is_finite() {
                    continue;
                }
                let costs: Vec<(usize, f64)> = self.route_costs(tour, i, penalties).collect();
                for (j, cost) in costs {
                    if base + cost < self.potential[k + 1][j + 1] {
                        self.potential[k + 1][j + 1] = base + cost;
                        self.pred[k + 1][j + 1] = i;
                    }
                }
            }
        }

        let mut best_k = 0;
        let mut best_cost = f64::INFINITY;
        for k in 1..=max_vehicles {
            if self.potential[k][n] < best_cost {
                best_cost = self.potential[k][n];
                best_k = k;
            }
        }

        if best_k == 0 {
            // The load bound made every partition infeasible; fall back to a
            // single overloaded route so the individual can still be penalized.
            return vec![tour.to_vec()];
        }

        let mut routes = Vec::with_capacity(best_k);
        let mut end = n;
        for k in (1..=best_k).rev() {
            let begin = self.pred[k][end];
            routes.push(tour[begin..end].to_vec());
            end = begin;
        }
        routes.reverse();
        routes
    }

    fn reset_buffers(&mut self, levels: usize, n: usize) {
        self.potential.resize(levels, Vec::new());
        self.pred.resize(levels, Vec::new());
        for (potential, pred) in self.potential.iter_mut().zip(self.pred.iter_mut()) {
            potential.clear();
            potential.resize(n + 1, f64::INFINITY);
            pred.clear();
            pred.resize(n + 1, 0);
        }
    }
}

impl Decoder for Split {
    fn decode(&mut self, individual: &mut Individual, penalties: Penalties, max_vehicles: usize) {
        self.split(individual, penalties, max_vehicles);
    }
}

/// Iterates over the routes starting at a fixed position of the giant tour,
/// yielding `(last index, penalized cost)` for each extension.
struct RouteCosts<'a> {
    problem: &'a Problem,
    tour: &'a [usize],
    start: usize,
    next: usize,
    load: f64,
    service: f64,
    distance: f64,
    penalties: Penalties,
}

impl Iterator for RouteCosts<'_> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let j = self.next;
        if j >= self.tour.len() {
            return None;
        }

        let problem = self.problem;
        let customer = self.tour[j];
        let load = self.load + problem.nodes[customer].demand;

        // Always allow a single-customer route, even when overloaded.
        if j > self.start && load > MAX_LOAD_FACTOR * problem.vehicle_capacity {
            return None;
        }

        self.distance += if j == self.start {
            problem.get_distance(problem.depot_index, customer)
        } else {
            problem.get_distance(self.tour[j - 1], customer)
        };
        self.load = load;
        self.service += problem.nodes[customer].service_duration;
        self.next += 1;

        let distance = self.distance + problem.get_distance(customer, problem.depot_index);
        let capacity_excess = (self.load - problem.vehicle_capacity).max(0.0);
        let duration_excess = problem
            .duration_limit
            .map_or(0.0, |limit| (distance + self.service - limit).max(0.0));

        Some((
            j,
            self.penalties
                .penalized_cost(distance, capacity_excess, duration_excess),
        ))
    }
}
