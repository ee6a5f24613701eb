//! Local search operators for the HGS-CVRP algorithm.

pub mod relocate;
pub mod swap;
pub mod two_opt;
pub mod two_opt_star;
pub mod utils;

use crate::individual::{Individual, Penalties, EPSILON};
use crate::problem::Problem;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use self::utils::route_penalized_cost;

/// Improves a decoded individual in place.
pub trait Educator {
    fn educate(&mut self, individual: &mut Individual, penalties: Penalties);
}

/// A route under modification, with its cached penalized cost.
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkingRoute {
    pub customers: Vec<usize>,
    pub cost: f64,
}

/// Manages the local search phase of the HGS-CVRP algorithm.
///
/// Moves are restricted to granular neighbourhoods: a customer `u` is only
/// moved next to one of its correlated vertices `v`. The search applies the
/// first improving move it finds and stops at a local optimum.
pub struct LocalSearch {
    pub granularity: usize,
    problem: Arc<Problem>,
    /// Preprocessed neighbours for each customer
    neighbours: Vec<Vec<usize>>,
    rng: ChaCha8Rng,
    pub(crate) routes: Vec<WorkingRoute>,
    pub(crate) route_of: Vec<usize>,
    pub(crate) position_of: Vec<usize>,
    pub(crate) penalties: Penalties,
    /// Number of moves applied during the last run
    pub move_count: usize,
}

impl LocalSearch {
    /// Create a new local search instance with its own random stream.
    pub fn new(problem: Arc<Problem>, granularity: usize, seed: u64) -> Self {
        let neighbours = problem.correlated_vertices(granularity);
        let n = problem.nodes.len();
        LocalSearch {
            granularity,
            problem,
            neighbours,
            rng: ChaCha8Rng::seed_from_u64(seed),
            routes: Vec::new(),
            route_of: vec![0; n],
            position_of: vec![0; n],
            penalties: Penalties::new(1.0, 1.0),
            move_count: 0,
        }
    }

    /// Run local search to improve an individual in place.
    pub fn run(&mut self, individual: &mut Individual, penalties: Penalties) {
        self.load_individual(individual, penalties);

        let mut order: Vec<usize> = self.problem.customers().collect();
        order.shuffle(&mut self.rng);
        for list in self.neighbours.iter_mut() {
            list.shuffle(&mut self.rng);
        }

        // Main local search loop
        let mut improvement = true;
        while improvement {
            improvement = false;

            for &u in &order {
                for idx in 0..self.neighbours[u].len() {
                    let v = self.neighbours[u][idx];

                    if self.relocate_move(u, v)
                        || self.swap_move(u, v)
                        || self.two_opt_move(u, v)
                        || self.two_opt_star_move(u, v)
                    {
                        improvement = true;
                    }
                }

                if self.relocate_to_empty_route(u) {
                    improvement = true;
                }
            }
        }

        self.export_individual(individual);
    }

    /// Copy the routes of the individual into the working structures.
    fn load_individual(&mut self, individual: &Individual, penalties: Penalties) {
        self.penalties = penalties;
        self.move_count = 0;
        self.routes.clear();

        for route in individual.routes.iter().filter(|r| !r.is_empty()) {
            let cost = route_penalized_cost(&self.problem, route, penalties);
            self.routes.push(WorkingRoute {
                customers: route.clone(),
                cost,
            });
        }

        // One spare empty route lets relocate open a new vehicle.
        if self.routes.len() < self.problem.fleet_size() {
            self.routes.push(WorkingRoute::default());
        }

        for r in 0..self.routes.len() {
            self.update_positions(r);
        }
    }

    /// Write the improved routes back and re-evaluate.
    fn export_individual(&self, individual: &mut Individual) {
        individual.routes = self
            .routes
            .iter()
            .filter(|r| !r.customers.is_empty())
            .map(|r| r.customers.clone())
            .collect();
        individual.evaluate_complete_cost(&self.problem, self.penalties);
    }

    /// Refresh route membership and positions after route `r` changed.
    pub(crate) fn update_positions(&mut self, r: usize) {
        for (pos, &c) in self.routes[r].customers.iter().enumerate() {
            self.route_of[c] = r;
            self.position_of[c] = pos;
        }
    }

    /// Penalized cost of an arbitrary customer sequence.
    pub(crate) fn cost_of(&self, customers: &[usize]) -> f64 {
        route_penalized_cost(&self.problem, customers, self.penalties)
    }

    /// Replace routes `r1` and `r2` (possibly equal) if the candidate
    /// sequences are strictly cheaper; returns whether the move was applied.
    pub(crate) fn apply_if_improving(
        &mut self,
        r1: usize,
        new_r1: Vec<usize>,
        r2: usize,
        new_r2: Option<Vec<usize>>,
    ) -> bool {
        let old_cost = if r1 == r2 {
            self.routes[r1].cost
        } else {
            self.routes[r1].cost + self.routes[r2].cost
        };

        let cost_r1 = self.cost_of(&new_r1);
        let cost_r2 = new_r2.as_ref().map(|r| self.cost_of(r));
        let new_cost = cost_r1 + cost_r2.unwrap_or(0.0);

        if new_cost > old_cost - EPSILON {
            return false;
        }

        self.routes[r1] = WorkingRoute {
            customers: new_r1,
            cost: cost_r1,
        };
        self.update_positions(r1);

        if let (Some(customers), Some(cost)) = (new_r2, cost_r2) {
            self.routes[r2] = WorkingRoute { customers, cost };
            self.update_positions(r2);
        }

        self.move_count += 1;
        true
    }
}

impl Educator for LocalSearch {
    fn educate(&mut self, individual: &mut Individual, penalties: Penalties) {
        self.run(individual, penalties);
    }
}
