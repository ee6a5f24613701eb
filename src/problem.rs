//! Problem definition and data structures for CVRP.

use crate::error::SolverError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::f64;
use std::fs;
use std::path::Path;

/// Represents a node (customer or depot) in the CVRP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub demand: f64,
    pub service_duration: f64,
    pub is_depot: bool,
}

impl Node {
    /// Create a new node without service duration.
    pub fn new(id: usize, x: f64, y: f64, demand: f64, is_depot: bool) -> Self {
        Node {
            id,
            x,
            y,
            demand,
            service_duration: 0.0,
            is_depot,
        }
    }

    /// Set the time spent serving this node.
    pub fn with_service_duration(mut self, duration: f64) -> Self {
        self.service_duration = duration;
        self
    }

    /// Calculate the Euclidean distance between two nodes.
    pub fn distance(&self, other: &Node) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Represents a CVRP problem instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub name: String,
    pub nodes: Vec<Node>,
    pub depot_index: usize,
    pub vehicle_capacity: f64,
    pub max_vehicles: Option<usize>,
    /// Maximum route duration (travel plus service), if constrained
    pub duration_limit: Option<f64>,
    pub distance_matrix: Vec<Vec<f64>>,
    pub total_demand: f64,
    pub max_demand: f64,
    pub max_distance: f64,
}

impl Problem {
    /// Create a new CVRP problem with Euclidean distances.
    pub fn new(
        name: String,
        nodes: Vec<Node>,
        depot_index: usize,
        vehicle_capacity: f64,
        max_vehicles: Option<usize>,
    ) -> Self {
        let distance_matrix = Self::compute_distance_matrix(&nodes);
        Self::with_distance_matrix(
            name,
            nodes,
            depot_index,
            vehicle_capacity,
            max_vehicles,
            distance_matrix,
        )
    }

    /// Create a new CVRP problem from an explicit distance matrix.
    pub fn with_distance_matrix(
        name: String,
        nodes: Vec<Node>,
        depot_index: usize,
        vehicle_capacity: f64,
        max_vehicles: Option<usize>,
        distance_matrix: Vec<Vec<f64>>,
    ) -> Self {
        let total_demand = nodes.iter().map(|n| n.demand).sum();
        let max_demand = nodes.iter().map(|n| n.demand).fold(0.0, f64::max);
        let max_distance = distance_matrix
            .iter()
            .flat_map(|row| row.iter().copied())
            .fold(0.0, f64::max);

        Problem {
            name,
            nodes,
            depot_index,
            vehicle_capacity,
            max_vehicles,
            duration_limit: None,
            distance_matrix,
            total_demand,
            max_demand,
            max_distance,
        }
    }

    /// Constrain the duration of every route.
    pub fn with_duration_limit(mut self, limit: f64) -> Self {
        self.duration_limit = Some(limit);
        self
    }

    /// Calculate the distance between two node indices.
    #[inline]
    pub fn get_distance(&self, from: usize, to: usize) -> f64 {
        self.distance_matrix[from][to]
    }

    /// Get the number of customers (excluding the depot).
    pub fn get_customer_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Get the depot node.
    pub fn get_depot(&self) -> &Node {
        &self.nodes[self.depot_index]
    }

    /// Indices of all customer nodes, in increasing order.
    pub fn customers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(move |&i| i != self.depot_index)
    }

    /// Whether routes are subject to a duration limit.
    pub fn is_duration_constrained(&self) -> bool {
        self.duration_limit.is_some()
    }

    /// Lower bound on the number of vehicles needed to carry the total demand.
    pub fn min_vehicles(&self) -> usize {
        if self.vehicle_capacity <= 0.0 {
            return 1;
        }
        ((self.total_demand / self.vehicle_capacity).ceil() as usize).max(1)
    }

    /// Fleet size used by split when the instance does not fix one.
    pub fn fleet_size(&self) -> usize {
        self.max_vehicles
            .unwrap_or_else(|| {
                ((1.3 * self.total_demand / self.vehicle_capacity).ceil() as usize).saturating_add(3)
            })
            .max(1)
    }

    /// Granular neighbour lists: for every customer, its `granularity` closest
    /// customers, symmetrized. The depot entry is empty.
    pub fn correlated_vertices(&self, granularity: usize) -> Vec<Vec<usize>> {
        let n = self.nodes.len();
        let mut sets = vec![BTreeSet::new(); n];

        for i in self.customers() {
            let mut by_distance: Vec<usize> = self.customers().filter(|&j| j != i).collect();
            by_distance.sort_by(|&a, &b| {
                self.get_distance(i, a)
                    .partial_cmp(&self.get_distance(i, b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            for &j in by_distance.iter().take(granularity) {
                sets[i].insert(j);
                sets[j].insert(i);
            }
        }

        sets.into_iter().map(|s| s.into_iter().collect()).collect()
    }

    /// Generate the full distance matrix for all nodes.
    fn compute_distance_matrix(nodes: &[Node]) -> Vec<Vec<f64>> {
        let n = nodes.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    matrix[i][j] = nodes[i].distance(&nodes[j]);
                }
            }
        }

        matrix
    }

    /// Round every distance to the nearest integer.
    pub fn round_distances(&mut self) {
        for row in self.distance_matrix.iter_mut() {
            for d in row.iter_mut() {
                *d = d.round();
            }
        }
        self.max_distance = self.max_distance.round();
    }

    /// Load a problem in CVRPLIB format from a file.
    pub fn from_cvrplib_file<P: AsRef<Path>>(path: P, round: bool) -> Result<Self, SolverError> {
        let content = fs::read_to_string(path)?;
        Self::from_cvrplib_str(&content, round)
    }

    /// Parse a problem in CVRPLIB format (EUC_2D only).
    pub fn from_cvrplib_str(content: &str, round: bool) -> Result<Self, SolverError> {
        let mut name = String::from("unnamed");
        let mut dimension: Option<usize> = None;
        let mut capacity: Option<f64> = None;
        let mut duration_limit: Option<f64> = None;
        let mut service_time = 0.0;
        let mut coords: Vec<(f64, f64)> = Vec::new();
        let mut demands: Vec<f64> = Vec::new();
        let mut depot_index = 0;

        let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

        while let Some(line) = lines.next() {
            let (key, value) = match line.split_once(':') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (line, ""),
            };

            match key {
                "NAME" => name = value.to_string(),
                "COMMENT" | "TYPE" => {}
                "DIMENSION" => dimension = Some(value.parse()?),
                "CAPACITY" => capacity = Some(value.parse()?),
                "DISTANCE" => duration_limit = Some(value.parse()?),
                "SERVICE_TIME" => service_time = value.parse()?,
                "EDGE_WEIGHT_TYPE" => {
                    if value != "EUC_2D" {
                        return Err(SolverError::Parse(format!(
                            "unsupported EDGE_WEIGHT_TYPE {}",
                            value
                        )));
                    }
                }
                "NODE_COORD_SECTION" => {
                    let dim = require_dimension(dimension)?;
                    for _ in 0..dim {
                        let row = next_row(&mut lines, "NODE_COORD_SECTION")?;
                        if row.len() < 3 {
                            return Err(SolverError::Parse(format!(
                                "expected `id x y`, got {:?}",
                                row
                            )));
                        }
                        coords.push((row[1].parse()?, row[2].parse()?));
                    }
                }
                "DEMAND_SECTION" => {
                    let dim = require_dimension(dimension)?;
                    for _ in 0..dim {
                        let row = next_row(&mut lines, "DEMAND_SECTION")?;
                        if row.len() < 2 {
                            return Err(SolverError::Parse(format!(
                                "expected `id demand`, got {:?}",
                                row
                            )));
                        }
                        demands.push(row[1].parse()?);
                    }
                }
                "DEPOT_SECTION" => {
                    let first = next_row(&mut lines, "DEPOT_SECTION")?;
                    let id: i64 = first[0].parse()?;
                    if id < 1 {
                        return Err(SolverError::Parse(format!("invalid depot id {}", id)));
                    }
                    depot_index = (id - 1) as usize;
                    // Only a single depot is supported; skip to the terminator.
                    for row in lines.by_ref() {
                        if row.starts_with("-1") {
                            break;
                        }
                    }
                }
                "EOF" => break,
                other => {
                    return Err(SolverError::Parse(format!("unexpected keyword {}", other)));
                }
            }
        }

        let dim = require_dimension(dimension)?;
        let capacity = capacity.ok_or_else(|| SolverError::Parse("missing CAPACITY".into()))?;
        if coords.len() != dim || demands.len() != dim {
            return Err(SolverError::Parse(format!(
                "expected {} coordinates and demands, found {} and {}",
                dim,
                coords.len(),
                demands.len()
            )));
        }
        if depot_index >= dim {
            return Err(SolverError::Parse(format!(
                "depot index {} out of range",
                depot_index + 1
            )));
        }

        let nodes = coords
            .into_iter()
            .zip(demands)
            .enumerate()
            .map(|(id, ((x, y), demand))| {
                let is_depot = id == depot_index;
                let service = if is_depot { 0.0 } else { service_time };
                Node::new(id, x, y, demand, is_depot).with_service_duration(service)
            })
            .collect();

        let mut problem = Problem::new(name, nodes, depot_index, capacity, None);
        if let Some(limit) = duration_limit {
            problem = problem.with_duration_limit(limit);
        }
        if round {
            problem.round_distances();
        }

        Ok(problem)
    }
}

fn require_dimension(dimension: Option<usize>) -> Result<usize, SolverError> {
    dimension.ok_or_else(|| SolverError::Parse("DIMENSION must precede data sections".into()))
}

fn next_row<'a, I>(lines: &mut I, section: &str) -> Result<Vec<&'a str>, SolverError>
where
    I: Iterator<Item = &'a str>,
{
    lines
        .next()
        .map(|l| l.split_whitespace().collect())
        .ok_or_else(|| SolverError::Parse(format!("unexpected end of file in {}", section)))
}
