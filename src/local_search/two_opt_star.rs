//! 2-Opt* neighborhood for local search (inter-route).

use super::LocalSearch;

impl LocalSearch {
    /// Exchange route tails between the routes of `u` and `v`.
    ///
    /// Two reconnections are tried: tails swapped as-is, and the variant
    /// linking `u` directly to `v` with both heads reversed.
    pub fn two_opt_star_move(&mut self, u: usize, v: usize) -> bool {
        let (ru, rv) = (self.route_of[u], self.route_of[v]);
        if ru == rv {
            return false;
        }
        let (pu, pv) = (self.position_of[u], self.position_of[v]);

        let route_u = &self.routes[ru].customers;
        let route_v = &self.routes[rv].customers;

        // (u, x), (v, y) -> (u, y), (v, x)
        let mut tails_u: Vec<usize> = route_u[..=pu].to_vec();
        tails_u.extend_from_slice(&route_v[pv + 1..]);
        let mut tails_v: Vec<usize> = route_v[..=pv].to_vec();
        tails_v.extend_from_slice(&route_u[pu + 1..]);

        // (u, x), (v, y) -> (u, v), (x, y)
        let mut linked_u: Vec<usize> = route_u[..=pu].to_vec();
        linked_u.extend(route_v[..=pv].iter().rev());
        let mut linked_v: Vec<usize> = route_u[pu + 1..].iter().rev().copied().collect();
        linked_v.extend_from_slice(&route_v[pv + 1..]);

        if self.apply_if_improving(ru, tails_u, rv, Some(tails_v)) {
            return true;
        }
        self.apply_if_improving(ru, linked_u, rv, Some(linked_v))
    }
}
