//! Population management for the genetic algorithm.
//!
//! The population is shared by all worker threads. Individuals, statistics and
//! the random stream used for selection live behind one mutex; the penalty
//! coefficients sit behind a separate read-write lock because every worker reads
//! them once or twice per iteration.

use crate::config::Config;
use crate::error::SolverError;
use crate::individual::{Individual, Penalties, EPSILON};
use crate::local_search::LocalSearch;
use crate::problem::Problem;
use crate::split::Split;
use crate::worker::SharedPopulation;

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

/// Number of recent local search outcomes used to steer the penalties.
const FEASIBILITY_HISTORY: usize = 100;
const MIN_PENALTY: f64 = 0.1;
const MAX_PENALTY: f64 = 100_000.0;

/// One progress trace: the cost distribution of the feasible subpopulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeasibleStats {
    pub iteration: u64,
    pub average_cost: f64,
    pub min_cost: f64,
}

/// An individual together with its diversity bookkeeping.
#[derive(Debug, Clone)]
struct Member {
    id: u64,
    individual: Individual,
    /// Broken-pairs distances to the other members, ascending
    proximity: Vec<(f64, u64)>,
    biased_fitness: f64,
}

impl Member {
    fn add_proximity(&mut self, distance: f64, id: u64) {
        let pos = self.proximity.partition_point(|&(d, _)| d <= distance);
        self.proximity.insert(pos, (distance, id));
    }

    fn remove_proximity(&mut self, id: u64) {
        if let Some(pos) = self.proximity.iter().position(|&(_, other)| other == id) {
            self.proximity.remove(pos);
        }
    }

    /// Average distance to the `closest` nearest members.
    fn average_closest_distance(&self, closest: usize) -> f64 {
        let count = closest.min(self.proximity.len());
        if count == 0 {
            return 0.0;
        }
        self.proximity.iter().take(count).map(|&(d, _)| d).sum::<f64>() / count as f64
    }
}

struct PopulationState {
    /// Feasible individuals, sorted by penalized cost
    feasible_individuals: Vec<Member>,
    /// Infeasible individuals, sorted by penalized cost
    infeasible_individuals: Vec<Member>,
    feasibility_load: VecDeque<bool>,
    feasibility_duration: VecDeque<bool>,
    best_restart: Option<Individual>,
    best_overall: Option<Individual>,
    /// (seconds since start, cost) each time the overall best improved
    search_progress: Vec<(f64, f64)>,
    feasible_stats: Vec<FeasibleStats>,
    rng: ChaCha8Rng,
    next_id: u64,
}

/// Manages the population of individuals for the genetic algorithm.
pub struct Population {
    problem: Arc<Problem>,
    config: Config,
    state: Mutex<PopulationState>,
    penalties: RwLock<Penalties>,
    start_time: Instant,
}

impl Population {
    /// Create an empty population with the initial penalty coefficients.
    pub fn new(problem: Arc<Problem>, config: &Config) -> Self {
        let capacity_penalty = (problem.max_distance / problem.max_demand)
            .min(1000.0)
            .max(MIN_PENALTY);

        Population {
            problem,
            config: config.clone(),
            state: Mutex::new(PopulationState {
                feasible_individuals: Vec::new(),
                infeasible_individuals: Vec::new(),
                feasibility_load: VecDeque::from(vec![true; FEASIBILITY_HISTORY]),
                feasibility_duration: VecDeque::from(vec![true; FEASIBILITY_HISTORY]),
                best_restart: None,
                best_overall: None,
                search_progress: Vec::new(),
                feasible_stats: Vec::new(),
                rng: ChaCha8Rng::seed_from_u64(config.seed),
                next_id: 0,
            }),
            penalties: RwLock::new(Penalties::new(capacity_penalty, 1.0)),
            start_time: Instant::now(),
        }
    }

    fn state(&self) -> MutexGuard<'_, PopulationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current penalty coefficients.
    pub fn penalties(&self) -> Penalties {
        *self.penalties.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fill the population with `4 * min_pop_size` random, educated individuals.
    ///
    /// Generation stops early once the configured time limit has elapsed.
    pub fn generate_population(&self) {
        let seed: u64 = self.state().rng.gen();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut split = Split::new(Arc::clone(&self.problem));
        let mut local_search =
            LocalSearch::new(Arc::clone(&self.problem), self.config.granularity, rng.gen());

        let fleet = self.problem.fleet_size();
        for i in 0..4 * self.config.min_pop_size {
            // At least one individual, so selection never sees an empty population
            if let Some(limit) = self.config.effective_time_limit() {
                if i > 0 && self.start_time.elapsed() >= limit {
                    break;
                }
            }

            let penalties = self.penalties();
            let mut individual = Individual::random(&self.problem, &mut rng);
            split.split(&mut individual, penalties, fleet);
            local_search.run(&mut individual, penalties);
            self.add_individual(&individual, true);

            // Repair half of the infeasible individuals with stronger penalties
            if !individual.is_feasible() && rng.gen_bool(0.5) {
                local_search.run(&mut individual, penalties.scaled(10.0));
                if individual.is_feasible() {
                    self.add_individual(&individual, false);
                }
            }
        }
    }

    /// Insert a copy of `individual` into its subpopulation.
    ///
    /// With `update_feasible`, the individual also counts towards the
    /// feasibility statistics that drive [`Population::manage_penalties`].
    /// Returns whether it improved the best feasible solution of the
    /// current restart.
    pub fn add_individual(&self, individual: &Individual, update_feasible: bool) -> bool {
        let mut guard = self.state();
        let st = &mut *guard;

        if update_feasible {
            st.feasibility_load
                .push_back(individual.eval.capacity_excess < EPSILON);
            st.feasibility_duration
                .push_back(individual.eval.duration_excess < EPSILON);
            st.feasibility_load.pop_front();
            st.feasibility_duration.pop_front();
        }

        let id = st.next_id;
        st.next_id += 1;

        let subpop = if individual.is_feasible() {
            &mut st.feasible_individuals
        } else {
            &mut st.infeasible_individuals
        };

        let mut member = Member {
            id,
            individual: individual.clone(),
            proximity: Vec::with_capacity(subpop.len()),
            biased_fitness: 0.0,
        };
        for other in subpop.iter_mut() {
            let distance = individual.broken_pairs_distance(&other.individual);
            other.add_proximity(distance, id);
            member.add_proximity(distance, other.id);
        }

        let cost = individual.get_cost();
        let place = subpop.partition_point(|m| m.individual.get_cost() <= cost);
        subpop.insert(place, member);

        // Survivor selection
        let (mu, lambda) = (self.config.min_pop_size, self.config.generation_size);
        if subpop.len() > mu + lambda {
            while subpop.len() > mu {
                self.remove_worst_biased_fitness(subpop);
            }
        }

        if !individual.is_feasible() {
            return false;
        }

        let improves_restart = st
            .best_restart
            .as_ref()
            .map_or(true, |best| cost < best.get_cost() - EPSILON);
        if !improves_restart {
            return false;
        }

        st.best_restart = Some(individual.clone());
        let improves_overall = st
            .best_overall
            .as_ref()
            .map_or(true, |best| cost < best.get_cost() - EPSILON);
        if improves_overall {
            st.best_overall = Some(individual.clone());
            st.search_progress
                .push((self.start_time.elapsed().as_secs_f64(), cost));
        }
        true
    }

    /// Recompute the biased fitness of every member of `subpop`.
    fn update_biased_fitnesses(&self, subpop: &mut [Member]) {
        let n = subpop.len();
        if n == 0 {
            return;
        }
        if n == 1 {
            subpop[0].biased_fitness = 0.0;
            return;
        }

        // Members are sorted by cost, so the index is the fitness rank
        let mut ranking: Vec<(f64, usize)> = subpop
            .iter()
            .enumerate()
            .map(|(i, m)| (-m.average_closest_distance(self.config.n_closest), i))
            .collect();
        ranking.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let scale = (n - 1) as f64;
        for (div_rank, &(_, i)) in ranking.iter().enumerate() {
            let div_rank = div_rank as f64 / scale;
            let fit_rank = i as f64 / scale;
            subpop[i].biased_fitness = if n <= self.config.n_elite {
                fit_rank
            } else {
                fit_rank + (1.0 - self.config.n_elite as f64 / n as f64) * div_rank
            };
        }
    }

    /// Remove the member with the worst biased fitness, clones first. The
    /// cheapest member is never removed.
    fn remove_worst_biased_fitness(&self, subpop: &mut Vec<Member>) {
        self.update_biased_fitnesses(subpop);
        if subpop.len() <= 1 {
            return;
        }

        let mut worst = 1;
        let mut worst_is_clone = false;
        let mut worst_fitness = f64::NEG_INFINITY;
        for (i, member) in subpop.iter().enumerate().skip(1) {
            let is_clone = member.average_closest_distance(1) < EPSILON;
            if (is_clone && !worst_is_clone)
                || (is_clone == worst_is_clone && member.biased_fitness > worst_fitness)
            {
                worst = i;
                worst_is_clone = is_clone;
                worst_fitness = member.biased_fitness;
            }
        }

        let removed = subpop.remove(worst);
        for member in subpop.iter_mut() {
            member.remove_proximity(removed.id);
        }
    }

    /// Select an individual by binary tournament on biased fitness, across
    /// both subpopulations. Returns an owned copy.
    pub fn binary_tournament(&self) -> Result<Individual, SolverError> {
        let mut guard = self.state();
        let st = &mut *guard;

        self.update_biased_fitnesses(&mut st.feasible_individuals);
        self.update_biased_fitnesses(&mut st.infeasible_individuals);

        let n_feasible = st.feasible_individuals.len();
        let total = n_feasible + st.infeasible_individuals.len();
        if total == 0 {
            return Err(SolverError::EmptyPopulation);
        }

        let first = st.rng.gen_range(0..total);
        let second = st.rng.gen_range(0..total);
        let pick = |place: usize| {
            if place < n_feasible {
                &st.feasible_individuals[place]
            } else {
                &st.infeasible_individuals[place - n_feasible]
            }
        };

        let (a, b) = (pick(first), pick(second));
        let winner = if a.biased_fitness < b.biased_fitness { a } else { b };
        Ok(winner.individual.clone())
    }

    /// Adapt the penalty coefficients towards the target feasible ratio and
    /// re-rank the infeasible subpopulation. Callers guarantee exclusivity
    /// with respect to [`Population::restart`].
    pub fn manage_penalties(&self) {
        let mut guard = self.state();
        let st = &mut *guard;
        let mut penalties = self.penalties.write().unwrap_or_else(PoisonError::into_inner);

        let fraction = |history: &VecDeque<bool>| {
            history.iter().filter(|&&f| f).count() as f64 / history.len() as f64
        };
        let load_ratio = fraction(&st.feasibility_load);
        let duration_ratio = fraction(&st.feasibility_duration);

        penalties.capacity = self.adapt_penalty(penalties.capacity, load_ratio);
        penalties.duration = self.adapt_penalty(penalties.duration, duration_ratio);
        debug!(
            "penalties adapted: capacity {:.2} (feasible {:.2}), duration {:.2} (feasible {:.2})",
            penalties.capacity, load_ratio, penalties.duration, duration_ratio
        );

        for member in st.infeasible_individuals.iter_mut() {
            let eval = &mut member.individual.eval;
            eval.penalized_cost =
                penalties.penalized_cost(eval.distance, eval.capacity_excess, eval.duration_excess);
        }
        st.infeasible_individuals.sort_by(|a, b| {
            a.individual
                .get_cost()
                .partial_cmp(&b.individual.get_cost())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    fn adapt_penalty(&self, penalty: f64, feasible_ratio: f64) -> f64 {
        let target = self.config.target_feasible_ratio;
        if feasible_ratio < target - 0.05 && penalty < MAX_PENALTY {
            (penalty * self.config.penalty_increase).min(MAX_PENALTY)
        } else if feasible_ratio > target + 0.05 && penalty > MIN_PENALTY {
            (penalty * self.config.penalty_decrease).max(MIN_PENALTY)
        } else {
            penalty
        }
    }

    /// Discard every individual and generate a fresh population. The overall
    /// best solution survives. Callers guarantee exclusivity with respect to
    /// [`Population::manage_penalties`].
    pub fn restart(&self) {
        {
            let mut st = self.state();
            info!(
                "----- RESET: CREATING A NEW POPULATION (best of restart {})",
                st.best_restart
                    .as_ref()
                    .map_or("none".to_string(), |b| format!("{:.2}", b.get_cost()))
            );
            st.feasible_individuals.clear();
            st.infeasible_individuals.clear();
            st.best_restart = None;
        }
        self.generate_population();
    }

    /// Log a one-line summary of the search state and record the feasible
    /// cost statistics for this iteration.
    pub fn print_state(&self, iteration: u64, nb_iter_no_improvement: u64) {
        let penalties = self.penalties();
        let mut guard = self.state();
        let st = &mut *guard;
        let mu = self.config.min_pop_size;

        let summary = |subpop: &[Member]| -> (usize, f64, f64) {
            if subpop.is_empty() {
                return (0, -1.0, -1.0);
            }
            let count = mu.min(subpop.len());
            let average = subpop
                .iter()
                .take(count)
                .map(|m| m.individual.get_cost())
                .sum::<f64>()
                / count as f64;
            (subpop.len(), subpop[0].individual.get_cost(), average)
        };
        let diversity = |subpop: &[Member]| -> f64 {
            let count = mu.min(subpop.len());
            if count == 0 {
                return -1.0;
            }
            subpop
                .iter()
                .take(count)
                .map(|m| m.average_closest_distance(subpop.len()))
                .sum::<f64>()
                / count as f64
        };

        let (n_feas, best_feas, avg_feas) = summary(&st.feasible_individuals[..]);
        let (n_inf, best_inf, avg_inf) = summary(&st.infeasible_individuals[..]);
        let ratio = |history: &VecDeque<bool>| {
            history.iter().filter(|&&f| f).count() as f64 / history.len() as f64
        };

        info!(
            "It {:6} {:6} | T(s) {:.2} | Feas {} {:.2} {:.2} | Inf {} {:.2} {:.2} | Div {:.2} {:.2} | Feas {:.2} {:.2} | Pen {:.2} {:.2}",
            iteration,
            nb_iter_no_improvement,
            self.start_time.elapsed().as_secs_f64(),
            n_feas,
            best_feas,
            avg_feas,
            n_inf,
            best_inf,
            avg_inf,
            diversity(&st.feasible_individuals[..]),
            diversity(&st.infeasible_individuals[..]),
            ratio(&st.feasibility_load),
            ratio(&st.feasibility_duration),
            penalties.capacity,
            penalties.duration
        );

        if n_feas > 0 {
            let average_cost = st
                .feasible_individuals
                .iter()
                .map(|m| m.individual.get_cost())
                .sum::<f64>()
                / n_feas as f64;
            st.feasible_stats.push(FeasibleStats {
                iteration,
                average_cost,
                min_cost: best_feas,
            });
        }
    }

    /// The best feasible individual found since the population was created.
    pub fn best_found(&self) -> Option<Individual> {
        self.state().best_overall.clone()
    }

    /// Get the total population size.
    pub fn get_pop_size(&self) -> usize {
        let st = self.state();
        st.feasible_individuals.len() + st.infeasible_individuals.len()
    }

    /// Sizes of the feasible and infeasible subpopulations.
    pub fn subpopulation_sizes(&self) -> (usize, usize) {
        let st = self.state();
        (st.feasible_individuals.len(), st.infeasible_individuals.len())
    }

    /// (seconds since start, cost) for every improvement of the overall best.
    pub fn search_progress(&self) -> Vec<(f64, f64)> {
        self.state().search_progress.clone()
    }

    /// Feasible cost statistics recorded by progress traces, by iteration.
    pub fn feasible_stats(&self) -> Vec<FeasibleStats> {
        let mut stats = self.state().feasible_stats.clone();
        stats.sort_by_key(|s| s.iteration);
        stats
    }

    /// Write the search progress as `instance;seed;cost;time` lines.
    pub fn export_search_progress<P: AsRef<Path>>(
        &self,
        path: P,
        instance: &str,
    ) -> Result<(), SolverError> {
        let mut file = BufWriter::new(File::create(path)?);
        for (time, cost) in self.search_progress() {
            writeln!(file, "{};{};{};{}", instance, self.config.seed, cost, time)?;
        }
        file.flush()?;
        Ok(())
    }

    /// Write the recorded feasible statistics as CSV, sorted by iteration.
    pub fn export_feasible_stats<P: AsRef<Path>>(&self, path: P) -> Result<(), SolverError> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "Iteration,AvgFeasibleCost,MinFeasibleCost")?;
        for stat in self.feasible_stats() {
            writeln!(
                file,
                "{},{},{}",
                stat.iteration, stat.average_cost, stat.min_cost
            )?;
        }
        file.flush()?;
        Ok(())
    }
}

impl SharedPopulation for Population {
    fn binary_tournament(&self) -> Result<Individual, SolverError> {
        Population::binary_tournament(self)
    }

    fn add_individual(&self, individual: &Individual, update_feasible: bool) -> bool {
        Population::add_individual(self, individual, update_feasible)
    }

    fn penalties(&self) -> Penalties {
        Population::penalties(self)
    }

    fn manage_penalties(&self) {
        Population::manage_penalties(self)
    }

    fn restart(&self) {
        Population::restart(self)
    }

    fn print_state(&self, iteration: u64, nb_iter_no_improvement: u64) {
        Population::print_state(self, iteration, nb_iter_no_improvement)
    }
}
