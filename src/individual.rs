//! Individual representation for the genetic algorithm population.

use crate::problem::Problem;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing costs and constraint violations.
pub const EPSILON: f64 = 1e-5;

/// Penalty coefficients applied to constraint violations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Penalties {
    /// Weight of one unit of load above the vehicle capacity
    pub capacity: f64,
    /// Weight of one unit of route duration above the duration limit
    pub duration: f64,
}

impl Penalties {
    pub fn new(capacity: f64, duration: f64) -> Self {
        Penalties { capacity, duration }
    }

    /// Both coefficients multiplied by `factor`.
    pub fn scaled(self, factor: f64) -> Self {
        Penalties {
            capacity: self.capacity * factor,
            duration: self.duration * factor,
        }
    }

    /// Cost of a route or solution with the given violations.
    #[inline]
    pub fn penalized_cost(&self, distance: f64, capacity_excess: f64, duration_excess: f64) -> f64 {
        distance + self.capacity * capacity_excess + self.duration * duration_excess
    }
}

/// Cost and feasibility of a decoded individual.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Distance plus weighted constraint violations
    pub penalized_cost: f64,
    /// Number of non-empty routes
    pub nb_routes: usize,
    /// Total travelled distance
    pub distance: f64,
    /// Sum of load above capacity over all routes
    pub capacity_excess: f64,
    /// Sum of duration above the limit over all routes
    pub duration_excess: f64,
    pub is_feasible: bool,
}

impl Default for Evaluation {
    fn default() -> Self {
        Evaluation {
            penalized_cost: f64::INFINITY,
            nb_routes: 0,
            distance: 0.0,
            capacity_excess: 0.0,
            duration_excess: 0.0,
            is_feasible: false,
        }
    }
}

/// An individual in the genetic algorithm population.
///
/// The giant tour is the genotype; routes, successor arrays and the
/// evaluation are derived from it by split and local search.
#[derive(Debug, Clone)]
pub struct Individual {
    /// Sequence of all customers without route delimiters
    pub giant_tour: Vec<usize>,
    /// Customers of each route, depot excluded
    pub routes: Vec<Vec<usize>>,
    /// Next node after each customer (the depot index at route ends)
    pub successors: Vec<usize>,
    /// Previous node before each customer (the depot index at route starts)
    pub predecessors: Vec<usize>,
    pub depot_index: usize,
    pub eval: Evaluation,
}

impl Individual {
    /// Create an individual visiting the customers in index order, not yet decoded.
    pub fn new(problem: &Problem) -> Self {
        let mut individual = Self::from_giant_tour(problem.customers().collect());
        individual.depot_index = problem.depot_index;
        individual.successors = vec![problem.depot_index; problem.nodes.len()];
        individual.predecessors = vec![problem.depot_index; problem.nodes.len()];
        individual
    }

    /// Create an individual with a uniformly shuffled giant tour.
    pub fn random<R: Rng + ?Sized>(problem: &Problem, rng: &mut R) -> Self {
        let mut individual = Self::new(problem);
        individual.giant_tour.shuffle(rng);
        individual
    }

    /// Create an individual from an explicit giant tour, depot at index 0.
    pub fn from_giant_tour(giant_tour: Vec<usize>) -> Self {
        let size = giant_tour.iter().copied().max().map_or(1, |m| m + 1);
        Individual {
            giant_tour,
            routes: Vec::new(),
            successors: vec![0; size],
            predecessors: vec![0; size],
            depot_index: 0,
            eval: Evaluation::default(),
        }
    }

    /// Recompute the evaluation and successor arrays from the routes, and
    /// rebuild the giant tour as the concatenation of the routes.
    pub fn evaluate_complete_cost(&mut self, problem: &Problem, penalties: Penalties) {
        let depot = problem.depot_index;
        self.depot_index = depot;
        self.routes.retain(|r| !r.is_empty());
        self.successors = vec![depot; problem.nodes.len()];
        self.predecessors = vec![depot; problem.nodes.len()];

        let mut eval = Evaluation {
            penalized_cost: 0.0,
            nb_routes: self.routes.len(),
            distance: 0.0,
            capacity_excess: 0.0,
            duration_excess: 0.0,
            is_feasible: false,
        };

        for route in &self.routes {
            let mut distance = problem.get_distance(depot, route[0]);
            let mut load = 0.0;
            let mut service = 0.0;

            for (pos, &customer) in route.iter().enumerate() {
                load += problem.nodes[customer].demand;
                service += problem.nodes[customer].service_duration;
                self.predecessors[customer] = if pos == 0 { depot } else { route[pos - 1] };
                self.successors[customer] = route.get(pos + 1).copied().unwrap_or(depot);
                if pos > 0 {
                    distance += problem.get_distance(route[pos - 1], customer);
                }
            }
            distance += problem.get_distance(route[route.len() - 1], depot);

            eval.distance += distance;
            eval.capacity_excess += (load - problem.vehicle_capacity).max(0.0);
            if let Some(limit) = problem.duration_limit {
                eval.duration_excess += (distance + service - limit).max(0.0);
            }
        }

        eval.penalized_cost =
            penalties.penalized_cost(eval.distance, eval.capacity_excess, eval.duration_excess);
        eval.is_feasible = eval.capacity_excess < EPSILON && eval.duration_excess < EPSILON;
        self.eval = eval;

        self.giant_tour.clear();
        for route in &self.routes {
            self.giant_tour.extend_from_slice(route);
        }
    }

    /// Fraction of customers whose neighbourhood (successor/predecessor pair)
    /// differs between the two individuals.
    pub fn broken_pairs_distance(&self, other: &Individual) -> f64 {
        let depot = self.depot_index;
        let mut differences = 0usize;

        for &j in &self.giant_tour {
            if self.successors[j] != other.successors[j]
                && self.successors[j] != other.predecessors[j]
            {
                differences += 1;
            }
            if self.predecessors[j] == depot
                && other.predecessors[j] != depot
                && other.successors[j] != depot
            {
                differences += 1;
            }
        }

        if self.giant_tour.is_empty() {
            0.0
        } else {
            differences as f64 / self.giant_tour.len() as f64
        }
    }

    /// Check if this individual is a clone of another.
    pub fn is_clone_of(&self, other: &Individual) -> bool {
        self.broken_pairs_distance(other) < EPSILON
    }

    /// Get the penalized cost of the individual.
    pub fn get_cost(&self) -> f64 {
        self.eval.penalized_cost
    }

    /// Check if the individual is feasible.
    pub fn is_feasible(&self) -> bool {
        self.eval.is_feasible
    }
}
