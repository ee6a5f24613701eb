//! Genetic operators for the HGS-CVRP algorithm.

use crate::individual::{Individual, Penalties};
use crate::split::Decoder;
use rand::Rng;

/// Ordered crossover (OX) on giant tours with a fixed window.
///
/// Positions `start..=end` (walked circularly) are copied from `parent1`; the
/// remaining positions are filled, continuing circularly after the window,
/// with the customers of `parent2` in the order they appear from `end + 1`.
/// Customer identifiers must be smaller than `max(tour) + 1`; the tours must
/// be permutations of the same customers.
pub fn order_crossover(parent1: &[usize], parent2: &[usize], start: usize, end: usize) -> Vec<usize> {
    let n = parent1.len();
    debug_assert_eq!(n, parent2.len(), "parents must have the same length");
    debug_assert!(start < n && end < n, "crossover window out of bounds");

    let size = parent1.iter().copied().max().map_or(0, |m| m + 1);
    // Frequency table to track the customers already inserted
    let mut used = vec![false; size];
    let mut offspring = vec![0; n];

    // Copy from start to end
    let mut j = start;
    while j % n != (end + 1) % n {
        let customer = parent1[j % n];
        offspring[j % n] = customer;
        used[customer] = true;
        j += 1;
    }

    // Fill the remaining elements in the order given by the second parent
    for i in 1..=n {
        let customer = parent2[(end + i) % n];
        if !used[customer] {
            offspring[j % n] = customer;
            j += 1;
        }
    }

    offspring
}

/// Draw a crossover window: two distinct positions in `0..n`.
pub fn draw_window<R: Rng + ?Sized>(rng: &mut R, n: usize) -> (usize, usize) {
    debug_assert!(n >= 2, "crossover needs at least two customers");
    let start = rng.gen_range(0..n);
    let mut end = rng.gen_range(0..n);
    while end == start {
        end = rng.gen_range(0..n);
    }
    (start, end)
}

/// Build one offspring by OX crossover and decode it into routes.
///
/// Parent 1's route count is passed to the decoder as the fleet hint. With
/// fewer than two customers the offspring is a copy of parent 1's tour.
pub fn crossover_ox<D, R>(
    parent1: &Individual,
    parent2: &Individual,
    decoder: &mut D,
    penalties: Penalties,
    rng: &mut R,
) -> Individual
where
    D: Decoder + ?Sized,
    R: Rng + ?Sized,
{
    let n = parent1.giant_tour.len();
    let tour = if n < 2 {
        parent1.giant_tour.clone()
    } else {
        let (start, end) = draw_window(rng, n);
        order_crossover(&parent1.giant_tour, &parent2.giant_tour, start, end)
    };

    let mut offspring = Individual::from_giant_tour(tour);
    decoder.decode(&mut offspring, penalties, parent1.eval.nb_routes);
    offspring
}
