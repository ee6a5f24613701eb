//! 2-Opt neighborhood for local search (intra-route).

use super::LocalSearch;

impl LocalSearch {
    /// Replace edges (u, x) and (v, y) by (u, v) and (x, y) when `u`
    /// precedes `v` in the same route, reversing the segment x..=v.
    pub fn two_opt_move(&mut self, u: usize, v: usize) -> bool {
        let (ru, rv) = (self.route_of[u], self.route_of[v]);
        let (pu, pv) = (self.position_of[u], self.position_of[v]);

        // Need at least one customer between u and v for the move to matter
        if ru != rv || pv <= pu + 1 {
            return false;
        }

        let mut route = self.routes[ru].customers.clone();
        route[pu + 1..=pv].reverse();

        self.apply_if_improving(ru, route, ru, None)
    }
}
