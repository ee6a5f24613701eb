//! Solution representation for the CVRP.

use crate::error::SolverError;
use crate::individual::Individual;
use crate::local_search::utils::{route_distance, route_load};
use crate::problem::Problem;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Represents a route in a CVRP solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// The sequence of customer indices (excluding the depot)
    pub customers: Vec<usize>,
    /// The total load of the route
    pub load: f64,
    /// The total distance of the route
    pub distance: f64,
}

impl Route {
    pub fn new(problem: &Problem, customers: Vec<usize>) -> Self {
        Route {
            load: route_load(problem, &customers),
            distance: route_distance(problem, &customers),
            customers,
        }
    }

    /// Check if the route exceeds the vehicle capacity.
    pub fn exceeds_capacity(&self, capacity: f64) -> bool {
        self.load > capacity
    }
}

/// The exported form of an individual: non-empty routes with their loads and
/// distances.
#[derive(Clone, Serialize, Deserialize)]
pub struct Solution {
    pub routes: Vec<Route>,
    /// Penalized cost, equal to the distance for feasible solutions
    pub cost: f64,
    pub distance: f64,
    pub is_feasible: bool,
}

impl Solution {
    pub fn from_individual(individual: &Individual, problem: &Problem) -> Self {
        let routes = individual
            .routes
            .iter()
            .filter(|r| !r.is_empty())
            .map(|r| Route::new(problem, r.clone()))
            .collect();

        Solution {
            routes,
            cost: individual.eval.penalized_cost,
            distance: individual.eval.distance,
            is_feasible: individual.eval.is_feasible,
        }
    }

    /// Get the number of routes.
    pub fn get_route_count(&self) -> usize {
        self.routes.len()
    }

    /// Write the solution in the CVRPLIB format: one `Route #k:` line per
    /// route followed by the cost.
    pub fn write_cvrplib<W: Write>(&self, mut out: W) -> Result<(), SolverError> {
        for (k, route) in self.routes.iter().enumerate() {
            writeln!(out, "Route #{}: {}", k + 1, route.customers.iter().join(" "))?;
        }
        writeln!(out, "Cost {}", self.cost)?;
        Ok(())
    }

    /// Write the solution in the CVRPLIB format to `path`.
    pub fn export_cvrplib<P: AsRef<Path>>(&self, path: P) -> Result<(), SolverError> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_cvrplib(&mut file)?;
        file.flush()?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SolverError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the solution as pretty-printed JSON to `path`.
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<(), SolverError> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

impl fmt::Debug for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Solution:")?;
        writeln!(f, "  Cost: {:.2}", self.cost)?;
        writeln!(f, "  Distance: {:.2}", self.distance)?;
        writeln!(f, "  Feasible: {}", self.is_feasible)?;
        writeln!(f, "  Routes: {}", self.routes.len())?;

        for (i, route) in self.routes.iter().enumerate() {
            writeln!(
                f,
                "  Route {}: {:?} (Load: {:.2}, Distance: {:.2})",
                i, route.customers, route.load, route.distance
            )?;
        }

        Ok(())
    }
}
